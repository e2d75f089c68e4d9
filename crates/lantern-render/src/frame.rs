//! Per-frame GPU resources and the frame ring.
//!
//! The ring holds `FRAME_LATENCY` slots, each owning every per-frame
//! resource the sequencer touches. All slots are created eagerly at
//! startup; steady-state rendering never allocates.

use ash::vk;
use lantern_gpu::command::CommandPool;
use lantern_gpu::descriptors::DescriptorPool;
use lantern_gpu::error::Result;
use lantern_gpu::memory::GpuAllocator;
use lantern_gpu::sync::{create_semaphore, create_signaled_fence, reset_fence, wait_for_fence};

use crate::resources::GpuMesh;

/// Number of frames the CPU may run ahead of the GPU.
pub const FRAME_LATENCY: usize = 3;

/// Descriptor set layouts for the four logical binding groups.
#[derive(Debug, Clone, Copy)]
pub struct BindingLayouts {
    pub view: vk::DescriptorSetLayout,
    pub sky: vk::DescriptorSetLayout,
    pub material: vk::DescriptorSetLayout,
    pub object: vk::DescriptorSetLayout,
}

/// Descriptor sets allocated per slot, one per binding group.
#[derive(Debug, Clone, Copy)]
pub struct BindingGroups {
    pub view: vk::DescriptorSet,
    pub sky: vk::DescriptorSet,
    pub material: vk::DescriptorSet,
    pub object: vk::DescriptorSet,
}

/// Everything one in-flight frame owns.
///
/// The in-flight fence gates reuse: a slot is only written to again after
/// the GPU has finished the submission recorded the last time this slot's
/// index came up.
pub struct FrameSlot {
    pub command_pool: CommandPool,
    pub upload_cmd: vk::CommandBuffer,
    pub graphics_cmd: vk::CommandBuffer,
    pub screenshot_cmd: vk::CommandBuffer,
    /// Signaled by the upload submission, waited on by graphics.
    pub upload_complete: vk::Semaphore,
    /// Signaled by the acquire, waited on by graphics.
    pub image_acquired: vk::Semaphore,
    /// Signaled by the ownership-transfer submission when the present
    /// queue family differs from graphics.
    pub swapchain_release: vk::Semaphore,
    /// Signaled by the graphics submission.
    pub render_complete: vk::Semaphore,
    pub in_flight: vk::Fence,
    pub descriptor_pool: DescriptorPool,
    pub bindings: BindingGroups,
    /// Overlay geometry rebuilt each time this slot comes around.
    pub overlay_mesh: Option<GpuMesh>,
}

impl FrameSlot {
    /// Create all resources for one slot.
    ///
    /// The fence starts signaled so the first tick through the ring does
    /// not block on work that was never submitted.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        graphics_queue_family: u32,
        layouts: &BindingLayouts,
    ) -> Result<Self> {
        let command_pool = CommandPool::new(
            device,
            graphics_queue_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let buffers =
            command_pool.allocate_command_buffers(device, vk::CommandBufferLevel::PRIMARY, 3)?;

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(2),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .descriptor_count(1),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1),
        ];
        let descriptor_pool = DescriptorPool::new(device, 4, &pool_sizes)?;
        let sets = descriptor_pool.allocate(
            device,
            &[layouts.view, layouts.sky, layouts.material, layouts.object],
        )?;

        Ok(Self {
            command_pool,
            upload_cmd: buffers[0],
            graphics_cmd: buffers[1],
            screenshot_cmd: buffers[2],
            upload_complete: create_semaphore(device)?,
            image_acquired: create_semaphore(device)?,
            swapchain_release: create_semaphore(device)?,
            render_complete: create_semaphore(device)?,
            in_flight: create_signaled_fence(device)?,
            descriptor_pool,
            bindings: BindingGroups {
                view: sets[0],
                sky: sets[1],
                material: sets[2],
                object: sets[3],
            },
            overlay_mesh: None,
        })
    }

    /// Block until the GPU has finished this slot's previous submission.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait(&self, device: &ash::Device) -> Result<()> {
        wait_for_fence(device, self.in_flight, u64::MAX)
    }

    /// Reset the in-flight fence for this tick's submission.
    ///
    /// # Safety
    /// The device must be valid and the fence must be signaled.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        reset_fence(device, self.in_flight)
    }

    /// Destroy all slot resources.
    ///
    /// # Safety
    /// The device must be valid and the GPU must be idle.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) {
        self.descriptor_pool.destroy(device);
        device.destroy_fence(self.in_flight, None);
        device.destroy_semaphore(self.upload_complete, None);
        device.destroy_semaphore(self.image_acquired, None);
        device.destroy_semaphore(self.swapchain_release, None);
        device.destroy_semaphore(self.render_complete, None);
        if let Some(mesh) = self.overlay_mesh.as_mut() {
            if let Err(e) = mesh.destroy(allocator) {
                tracing::warn!("Failed to free overlay mesh: {e}");
            }
        }
        self.command_pool.destroy(device);
    }
}

/// Index of the slot after `current` in a ring of `slot_count`.
pub(crate) fn next_slot(current: usize, slot_count: usize) -> usize {
    (current + 1) % slot_count
}

/// Fixed ring of frame slots.
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    current: usize,
}

impl FrameRing {
    /// Create all `FRAME_LATENCY` slots up front.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        graphics_queue_family: u32,
        layouts: &BindingLayouts,
    ) -> Result<Self> {
        let mut slots = Vec::with_capacity(FRAME_LATENCY);
        for _ in 0..FRAME_LATENCY {
            slots.push(FrameSlot::new(device, graphics_queue_family, layouts)?);
        }

        tracing::debug!(slots = FRAME_LATENCY, "Frame ring initialized");

        Ok(Self { slots, current: 0 })
    }

    /// The slot the next tick will use.
    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current]
    }

    /// Mutable access to the current slot.
    pub fn current_mut(&mut self) -> &mut FrameSlot {
        &mut self.slots[self.current]
    }

    /// Index of the current slot.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Read access to an arbitrary slot.
    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Number of slots in the ring.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the ring holds no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Rotate to the next slot. Called exactly once per completed tick.
    pub fn advance(&mut self) {
        self.current = next_slot(self.current, self.slots.len());
    }

    /// Destroy every slot.
    ///
    /// # Safety
    /// The device must be valid and the GPU must be idle.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) {
        for slot in &mut self.slots {
            slot.destroy(device, allocator);
        }
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_wraps_after_latency() {
        let mut index = 0;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(index);
            index = next_slot(index, FRAME_LATENCY);
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn single_slot_ring_stays_put() {
        assert_eq!(next_slot(0, 1), 0);
    }
}
