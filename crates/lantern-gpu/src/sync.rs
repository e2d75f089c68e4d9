//! Fences and semaphores for the frame ring.
//!
//! Each frame slot owns four binary semaphores and one fence; the capture
//! path owns one more fence. Waiting and resetting are separate calls
//! because the sequencer leaves a fence signaled when an acquire skips
//! the frame.

use crate::error::Result;
use ash::vk;

/// Create a binary semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    Ok(device.create_semaphore(&create_info, None)?)
}

/// Create an unsignaled fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device) -> Result<vk::Fence> {
    let create_info = vk::FenceCreateInfo::default();
    Ok(device.create_fence(&create_info, None)?)
}

/// Create a fence that starts signaled.
///
/// Frame slots use these so the first wait on a slot that has never been
/// submitted passes immediately.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_signaled_fence(device: &ash::Device) -> Result<vk::Fence> {
    let create_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
    Ok(device.create_fence(&create_info, None)?)
}

/// Block until `fence` signals. `timeout_ns` of `u64::MAX` never times out.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    device.wait_for_fences(&[fence], true, timeout_ns)?;
    Ok(())
}

/// Return `fence` to the unsignaled state.
///
/// # Safety
/// The device and fence must be valid, and the fence must not be pending.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(&[fence])?;
    Ok(())
}
