//! Device memory for the staged upload path.
//!
//! Every resident resource in the frame pipeline is filled the same way: a
//! host-visible staging buffer is written on the CPU, then the per-frame
//! upload pass copies it into a device-local resident buffer or image. The
//! constructors here encode those roles, so call sites say what a buffer is
//! for rather than picking memory locations by hand.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Wrapper around the gpu-allocator Vulkan allocator.
///
/// Owns every allocation handed out by the typed constructors. Must be shut
/// down before the device is destroyed; anything still alive at shutdown is
/// logged as a leak.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: debug_settings(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))
    }

    /// Allocate a host-visible staging buffer, mapped for CPU writes.
    ///
    /// Staging buffers are transfer sources only; the upload pass copies
    /// them into their resident counterparts.
    pub fn create_staging_buffer(&mut self, size: u64, name: &str) -> Result<GpuBuffer> {
        self.allocate_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            name,
        )
    }

    /// Allocate a device-local buffer that receives staged copies.
    ///
    /// `usage` names how the GPU reads it (uniform, index, vertex). The
    /// transfer-destination bit is added here.
    pub fn create_resident_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<GpuBuffer> {
        self.allocate_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            name,
        )
    }

    fn allocate_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            self.device
                .create_buffer(&buffer_info, None)
                .map_err(GpuError::from)?
        };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = self
            .inner()?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(GpuError::from)?;
        }

        Ok(GpuBuffer {
            buffer,
            allocation: Some(allocation),
            size,
        })
    }

    /// Free a buffer allocation and destroy the handle.
    pub fn free_buffer(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        if let Some(allocation) = buffer.allocation.take() {
            self.inner()?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
        }

        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
        }
        buffer.buffer = vk::Buffer::null();

        Ok(())
    }

    /// Allocate a device-local image (render targets, sampled textures).
    pub fn create_device_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        name: &str,
    ) -> Result<GpuImage> {
        self.allocate_image(create_info, MemoryLocation::GpuOnly, name)
    }

    /// Allocate a host-readable image for screenshot readback.
    ///
    /// The image must be linear-tiled so the CPU can walk its rows through
    /// the mapped pointer.
    pub fn create_readback_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        name: &str,
    ) -> Result<GpuImage> {
        debug_assert_eq!(create_info.tiling, vk::ImageTiling::LINEAR);
        self.allocate_image(create_info, MemoryLocation::GpuToCpu, name)
    }

    fn allocate_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        let image = unsafe {
            self.device
                .create_image(create_info, None)
                .map_err(GpuError::from)?
        };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        // Linear-tiled images behave like buffers for the allocator;
        // optimal tiling is opaque.
        let linear = create_info.tiling == vk::ImageTiling::LINEAR;

        let allocation = self
            .inner()?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(GpuError::from)?;
        }

        Ok(GpuImage {
            image,
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
        })
    }

    /// Free an image allocation and destroy the handle.
    pub fn free_image(&mut self, image: &mut GpuImage) -> Result<()> {
        if let Some(allocation) = image.allocation.take() {
            self.inner()?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
        }

        unsafe {
            self.device.destroy_image(image.image, None);
        }
        image.image = vk::Image::null();

        Ok(())
    }

    /// Shut down the allocator, releasing all GPU memory.
    ///
    /// Must happen before the Vulkan device is destroyed. Remaining
    /// allocations are freed and logged as leaks.
    pub fn shutdown(&mut self) {
        // Dropping the inner allocator frees its memory blocks.
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }
}

fn debug_settings() -> gpu_allocator::AllocatorDebugSettings {
    gpu_allocator::AllocatorDebugSettings {
        log_memory_information: cfg!(debug_assertions),
        log_leaks_on_shutdown: true,
        store_stack_traces: cfg!(debug_assertions),
        log_allocations: false,
        log_frees: false,
        log_stack_traces: false,
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A buffer with its allocation.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
}

impl GpuBuffer {
    /// Mapped pointer to the buffer memory, if host-visible.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|p| p.as_ptr() as *mut u8)
    }

    /// Copy `data` into the mapped buffer at `offset`.
    ///
    /// Fails on unmapped (device-local) buffers and on writes that would
    /// run past the end.
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(
                "Data range too large for buffer".to_string(),
            ));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }

        Ok(())
    }
}

/// An image with its allocation.
pub struct GpuImage {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

impl GpuImage {
    /// Mapped pointer to the image memory (linear-tiled, host-visible only).
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|p| p.as_ptr() as *mut u8)
    }
}
