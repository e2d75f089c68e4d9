//! Command pools and queue submission.
//!
//! Each frame slot owns a pool for its upload, graphics, and screenshot
//! command buffers; a separate-present-queue setup adds one more pool on
//! the present family. Submissions are described as plain data so the
//! sequencer can spell out its synchronization in one place.

use crate::error::Result;
use crate::sync;
use ash::vk;

/// A command pool tied to one queue family.
pub struct CommandPool {
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool on `queue_family`.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = device.create_command_pool(&create_info, None)?;

        Ok(Self { pool })
    }

    /// Allocate `count` primary or secondary command buffers.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffers(
        &self,
        device: &ash::Device,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(level)
            .command_buffer_count(count);

        Ok(device.allocate_command_buffers(&alloc_info)?)
    }

    /// Reset the pool and every command buffer allocated from it.
    ///
    /// # Safety
    /// The device must be valid and none of the pool's command buffers may
    /// be pending execution.
    pub unsafe fn reset(
        &self,
        device: &ash::Device,
        flags: vk::CommandPoolResetFlags,
    ) -> Result<()> {
        device.reset_command_pool(self.pool, flags)?;
        Ok(())
    }

    /// Destroy the pool, freeing its command buffers.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    device.begin_command_buffer(cmd, &begin_info)?;
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.end_command_buffer(cmd)?;
    Ok(())
}

/// One queue submission: the command buffers plus the semaphores they wait
/// on and signal. `wait_stages` pairs with `wait_semaphores` by index.
#[derive(Default)]
pub struct SubmitDesc<'a> {
    pub commands: &'a [vk::CommandBuffer],
    pub wait_semaphores: &'a [vk::Semaphore],
    pub wait_stages: &'a [vk::PipelineStageFlags],
    pub signal_semaphores: &'a [vk::Semaphore],
}

/// Submit to a queue, optionally signaling `fence` on completion.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit(
    device: &ash::Device,
    queue: vk::Queue,
    desc: &SubmitDesc,
    fence: vk::Fence,
) -> Result<()> {
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(desc.commands)
        .wait_semaphores(desc.wait_semaphores)
        .wait_dst_stage_mask(desc.wait_stages)
        .signal_semaphores(desc.signal_semaphores);

    device.queue_submit(queue, &[submit_info], fence)?;
    Ok(())
}

/// Submit a recorded command buffer and block until its fence signals.
///
/// The fence is reset before the submit so the call can be repeated with the
/// same fence. No semaphores are involved; use this only for work that is
/// independent of the frame pipeline (readback).
///
/// # Safety
/// All handles must be valid and the fence must not be in use elsewhere.
pub unsafe fn submit_and_wait(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
    timeout_ns: u64,
) -> Result<()> {
    sync::reset_fence(device, fence)?;

    submit(
        device,
        queue,
        &SubmitDesc {
            commands: &[cmd],
            ..Default::default()
        },
        fence,
    )?;

    sync::wait_for_fence(device, fence, timeout_ns)
}
