//! Image layout transitions.
//!
//! Transitions are described as plain data and recorded separately, so the
//! upload, mip generation, and readback paths can build their barrier plans
//! without a device and tests can assert on them directly.

use ash::vk;

/// A planned image memory barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub aspect: vk::ImageAspectFlags,
    pub base_mip: u32,
    pub level_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
    pub src_queue_family: u32,
    pub dst_queue_family: u32,
}

impl Default for LayoutTransition {
    fn default() -> Self {
        Self {
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::UNDEFINED,
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
            aspect: vk::ImageAspectFlags::COLOR,
            base_mip: 0,
            level_count: 1,
            base_layer: 0,
            layer_count: 1,
            src_queue_family: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family: vk::QUEUE_FAMILY_IGNORED,
        }
    }
}

/// Record a single image barrier.
///
/// # Safety
/// The device, command buffer, and image must be valid.
pub unsafe fn record_image_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    transition: &LayoutTransition,
) {
    let barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(transition.src_stage)
        .src_access_mask(transition.src_access)
        .dst_stage_mask(transition.dst_stage)
        .dst_access_mask(transition.dst_access)
        .old_layout(transition.old_layout)
        .new_layout(transition.new_layout)
        .src_queue_family_index(transition.src_queue_family)
        .dst_queue_family_index(transition.dst_queue_family)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(transition.aspect)
                .base_mip_level(transition.base_mip)
                .level_count(transition.level_count)
                .base_array_layer(transition.base_layer)
                .layer_count(transition.layer_count),
        );

    let dependency_info =
        vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));

    device.cmd_pipeline_barrier2(cmd, &dependency_info);
}
