//! GPU context management.

use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::GpuAllocator;
use crate::surface::SurfaceContext;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) allocator: Mutex<GpuAllocator>,

    // Queue families and queues
    pub(crate) graphics_queue_family: u32,
    pub(crate) present_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue. May alias the graphics queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get the present queue family index.
    pub fn present_queue_family(&self) -> u32 {
        self.present_queue_family
    }

    /// Whether presentation runs on a different queue family than graphics.
    pub fn separate_present_queue(&self) -> bool {
        self.graphics_queue_family != self.present_queue_family
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Shutdown allocator BEFORE destroying device
            // This frees all VkDeviceMemory allocations
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Lantern".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context and the surface for a window.
    ///
    /// The surface is created before the logical device so the present queue
    /// family can be selected against it.
    pub fn build_for_window<W>(self, window: &W) -> Result<(GpuContext, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        // Load Vulkan entry point
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        // Create Vulkan instance with this platform's surface extensions
        let instance = unsafe {
            create_instance(&entry, &self.app_name, display.as_raw(), self.enable_validation)
        }?;

        // Create the surface

        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        // Select best physical device
        let physical_device = unsafe { select_physical_device(&instance) }?;

        tracing::info!(
            "Selected GPU: {}",
            unsafe { device_name(&instance, physical_device) }
        );

        // Find queue families against the surface
        let queue_families =
            unsafe { find_queue_families(&instance, physical_device, &surface_loader, surface) }?;

        if queue_families.graphics != queue_families.present {
            tracing::info!(
                "Separate present queue family: graphics={} present={}",
                queue_families.graphics,
                queue_families.present
            );
        }

        // Create logical device
        let (device, graphics_queue, present_queue) =
            unsafe { create_device(&instance, physical_device, &queue_families)? };

        let device = Arc::new(device);

        // Create GPU allocator
        let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) }?;

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
        let surface_context =
            SurfaceContext::from_parts(entry.clone(), surface, surface_loader, swapchain_loader);

        let context = GpuContext {
            entry,
            instance,
            physical_device,
            device,
            allocator: Mutex::new(allocator),
            graphics_queue_family: queue_families.graphics,
            present_queue_family: queue_families.present,
            graphics_queue,
            present_queue,
        };

        Ok((context, surface_context))
    }
}

/// Queue family indices.
struct QueueFamilyIndices {
    graphics: u32,
    present: u32,
}

/// Read the device name for logging.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn device_name(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> String {
    let properties = instance.get_physical_device_properties(physical_device);
    CStr::from_ptr(properties.device_name.as_ptr())
        .to_string_lossy()
        .into_owned()
}

/// Find queue families for graphics and presentation.
///
/// Prefers a single family that can do both; falls back to the first
/// present-capable family otherwise.
///
/// # Safety
/// The instance, physical device, and surface must be valid.
unsafe fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<QueueFamilyIndices> {
    let queue_families = instance.get_physical_device_queue_family_properties(physical_device);

    let mut graphics_family = None;
    let mut present_family = None;

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;

        let supports_present = surface_loader
            .get_physical_device_surface_support(physical_device, i, surface)
            .unwrap_or(false);

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            if graphics_family.is_none() {
                graphics_family = Some(i);
            }
            // A family that does both wins outright
            if supports_present {
                return Ok(QueueFamilyIndices {
                    graphics: i,
                    present: i,
                });
            }
        }

        if supports_present && present_family.is_none() {
            present_family = Some(i);
        }
    }

    let graphics = graphics_family.ok_or(GpuError::NoSuitableDevice)?;
    let present = present_family.ok_or(GpuError::NoSuitableDevice)?;

    Ok(QueueFamilyIndices { graphics, present })
}

/// Required device extensions.
fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Create the logical device and retrieve queues.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: &QueueFamilyIndices,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    // Collect unique queue families
    let mut unique_families = std::collections::HashSet::new();
    unique_families.insert(queue_families.graphics);
    unique_families.insert(queue_families.present);

    // Create queue create infos
    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    // Get required extensions
    let extensions = required_device_extensions();
    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    // Enable Vulkan 1.3 features
    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true)
        .maintenance4(true);

    let features = vk::PhysicalDeviceFeatures::default();

    // Chain features together
    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(features)
        .push_next(&mut vulkan_1_3_features);

    // Create the device
    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(GpuError::from)?;

    // Get queue handles
    let graphics_queue = device.get_device_queue(queue_families.graphics, 0);
    let present_queue = device.get_device_queue(queue_families.present, 0);

    Ok((device, graphics_queue, present_queue))
}
