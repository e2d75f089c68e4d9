//! Bounded upload queues and the drain-and-record pass.
//!
//! Collaborators enqueue const-buffer, mesh, and texture uploads during a
//! tick; the frame sequencer drains all three queues into the current
//! slot's upload command buffer. Draining only records commands; submission
//! stays the sequencer's job.
//!
//! The drain is split into a pure planning step and a recording step. The
//! plan carries every copy, blit, and barrier as plain data, which is what
//! the tests assert on.

use crate::barrier::{record_image_barrier, LayoutTransition};
use crate::resources::{mip_extent, ConstBuffer, GpuMesh, GpuTexture};
use ash::vk;
use lantern_gpu::error::{GpuError, Result};

/// Capacity of each upload queue, sized for expected per-frame churn.
pub const UPLOAD_QUEUE_CAPACITY: usize = 16;

/// Fixed-capacity queue that rejects overflow instead of growing.
pub struct BoundedQueue<T> {
    items: Vec<T>,
    capacity: usize,
    name: &'static str,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            name,
        }
    }

    /// Append an item, failing if the queue is at capacity.
    pub fn push(&mut self, item: T) -> Result<()> {
        if self.items.len() >= self.capacity {
            return Err(GpuError::QueueFull(format!(
                "{} upload queue at capacity {}",
                self.name, self.capacity
            )));
        }
        self.items.push(item);
        Ok(())
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no items are pending.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove and return all pending items, resetting the count to zero.
    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }
}

/// A pending staging-to-resident buffer copy.
#[derive(Debug, Clone, Copy)]
pub struct BufferUpload {
    pub src: vk::Buffer,
    pub dst: vk::Buffer,
    pub size: u64,
}

/// A pending staging-to-image upload.
#[derive(Debug, Clone)]
pub struct TextureUpload {
    pub src: vk::Buffer,
    pub image: vk::Image,
    pub regions: Vec<vk::BufferImageCopy>,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub layer_count: u32,
    pub gen_mips: bool,
}

/// The three independent per-frame upload queues.
pub struct UploadQueues {
    const_buffers: BoundedQueue<BufferUpload>,
    meshes: BoundedQueue<BufferUpload>,
    textures: BoundedQueue<TextureUpload>,
}

impl Default for UploadQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadQueues {
    pub fn new() -> Self {
        Self {
            const_buffers: BoundedQueue::new("const buffer", UPLOAD_QUEUE_CAPACITY),
            meshes: BoundedQueue::new("mesh", UPLOAD_QUEUE_CAPACITY),
            textures: BoundedQueue::new("texture", UPLOAD_QUEUE_CAPACITY),
        }
    }

    /// Enqueue a const buffer whose staging half holds new data.
    ///
    /// Clears the buffer's dirty flag on success.
    pub fn enqueue_const_buffer(&mut self, buffer: &mut ConstBuffer) -> Result<()> {
        self.const_buffers.push(BufferUpload {
            src: buffer.staging.buffer,
            dst: buffer.resident.buffer,
            size: buffer.size,
        })?;
        buffer.mark_clean();
        Ok(())
    }

    /// Enqueue a mesh for its staging-to-resident copy.
    pub fn enqueue_mesh(&mut self, mesh: &GpuMesh) -> Result<()> {
        self.meshes.push(BufferUpload {
            src: mesh.staging.buffer,
            dst: mesh.resident.buffer,
            size: mesh.layout.total_size(),
        })
    }

    /// Enqueue a texture for its staging-to-image upload.
    pub fn enqueue_texture(&mut self, texture: &GpuTexture) -> Result<()> {
        self.textures.push(TextureUpload {
            src: texture.staging.buffer,
            image: texture.image.image,
            regions: texture.regions.clone(),
            width: texture.width,
            height: texture.height,
            mip_levels: texture.mip_levels,
            layer_count: texture.layer_count,
            gen_mips: texture.gen_mips,
        })
    }

    /// Whether all three queues are empty.
    pub fn is_empty(&self) -> bool {
        self.const_buffers.is_empty() && self.meshes.is_empty() && self.textures.is_empty()
    }

    /// Total pending items across the three queues.
    pub fn pending(&self) -> usize {
        self.const_buffers.len() + self.meshes.len() + self.textures.len()
    }

    /// Consume all pending entries and build the copy/barrier plan.
    ///
    /// After this call every queue is empty; calling again without new
    /// enqueues yields an empty plan.
    pub fn plan_drain(&mut self) -> DrainPlan {
        let mut buffer_copies = Vec::new();
        for upload in self.const_buffers.take() {
            buffer_copies.push(plan_buffer_copy(&upload));
        }
        for upload in self.meshes.take() {
            buffer_copies.push(plan_buffer_copy(&upload));
        }

        let texture_uploads = self
            .textures
            .take()
            .into_iter()
            .map(|upload| plan_texture_upload(&upload))
            .collect();

        DrainPlan {
            buffer_copies,
            texture_uploads,
        }
    }

    /// Drain all queues and record the resulting commands.
    ///
    /// Returns the plan so the caller can log what was recorded.
    ///
    /// # Safety
    /// The device and command buffer must be valid, and the command buffer
    /// must be in the recording state.
    pub unsafe fn drain_and_record(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
    ) -> DrainPlan {
        let plan = self.plan_drain();
        record_plan(device, cmd, &plan);
        plan
    }
}

/// A buffer copy with its source and destination handles.
#[derive(Debug, Clone, Copy)]
pub struct PlannedBufferCopy {
    pub src: vk::Buffer,
    pub dst: vk::Buffer,
    pub region: vk::BufferCopy,
}

/// One mip generation step: make the previous level a blit source, blit it
/// down a level, then hand the previous level to the shaders.
#[derive(Debug, Clone, Copy)]
pub struct MipStep {
    pub to_transfer_src: LayoutTransition,
    pub blit: vk::ImageBlit,
    pub to_shader_read: LayoutTransition,
}

/// A texture upload with its barriers, copies, and optional mip chain.
#[derive(Debug, Clone)]
pub struct PlannedTextureUpload {
    pub src: vk::Buffer,
    pub image: vk::Image,
    pub to_transfer_dst: LayoutTransition,
    pub regions: Vec<vk::BufferImageCopy>,
    pub mip_steps: Vec<MipStep>,
    pub finalize: LayoutTransition,
}

/// Everything one drain pass will record.
#[derive(Debug, Clone)]
pub struct DrainPlan {
    pub buffer_copies: Vec<PlannedBufferCopy>,
    pub texture_uploads: Vec<PlannedTextureUpload>,
}

impl DrainPlan {
    /// Whether the plan records nothing.
    pub fn is_empty(&self) -> bool {
        self.buffer_copies.is_empty() && self.texture_uploads.is_empty()
    }

    /// Number of copy commands (buffer copies plus per-texture copies).
    pub fn copy_count(&self) -> usize {
        self.buffer_copies.len() + self.texture_uploads.len()
    }
}

fn plan_buffer_copy(upload: &BufferUpload) -> PlannedBufferCopy {
    PlannedBufferCopy {
        src: upload.src,
        dst: upload.dst,
        region: vk::BufferCopy::default()
            .src_offset(0)
            .dst_offset(0)
            .size(upload.size),
    }
}

fn plan_texture_upload(upload: &TextureUpload) -> PlannedTextureUpload {
    // The whole image becomes a transfer target; previous contents are
    // discarded, so the old layout is UNDEFINED.
    let to_transfer_dst = LayoutTransition {
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        src_stage: vk::PipelineStageFlags2::NONE,
        src_access: vk::AccessFlags2::NONE,
        dst_stage: vk::PipelineStageFlags2::TRANSFER,
        dst_access: vk::AccessFlags2::TRANSFER_WRITE,
        level_count: upload.mip_levels,
        layer_count: upload.layer_count,
        ..Default::default()
    };

    let (mip_steps, finalize) = if upload.gen_mips {
        plan_mip_chain(
            upload.width,
            upload.height,
            upload.mip_levels,
            upload.layer_count,
        )
    } else {
        // No chain to build: everything the copy regions wrote goes
        // straight to the shaders.
        let finalize = LayoutTransition {
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
            dst_access: vk::AccessFlags2::SHADER_SAMPLED_READ,
            level_count: upload.mip_levels,
            layer_count: upload.layer_count,
            ..Default::default()
        };
        (Vec::new(), finalize)
    };

    PlannedTextureUpload {
        src: upload.src,
        image: upload.image,
        to_transfer_dst,
        regions: upload.regions.clone(),
        mip_steps,
        finalize,
    }
}

/// Build the per-level mip generation steps and the final-level transition.
///
/// Level i is produced by blitting level i-1 at half resolution, clamped to
/// 1. Each source level is synchronized individually so no level is read
/// before its writing blit completes.
pub fn plan_mip_chain(
    width: u32,
    height: u32,
    mip_levels: u32,
    layer_count: u32,
) -> (Vec<MipStep>, LayoutTransition) {
    let mut steps = Vec::with_capacity(mip_levels.saturating_sub(1) as usize);

    for level in 1..mip_levels {
        let (src_width, src_height) = mip_extent(width, height, level - 1);
        let (dst_width, dst_height) = mip_extent(width, height, level);

        let to_transfer_src = LayoutTransition {
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_access: vk::AccessFlags2::TRANSFER_READ,
            base_mip: level - 1,
            layer_count,
            ..Default::default()
        };

        let blit = vk::ImageBlit::default()
            .src_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(level - 1)
                    .base_array_layer(0)
                    .layer_count(layer_count),
            )
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: src_width as i32,
                    y: src_height as i32,
                    z: 1,
                },
            ])
            .dst_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(level)
                    .base_array_layer(0)
                    .layer_count(layer_count),
            )
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: dst_width as i32,
                    y: dst_height as i32,
                    z: 1,
                },
            ]);

        let to_shader_read = LayoutTransition {
            old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_READ,
            dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
            dst_access: vk::AccessFlags2::SHADER_SAMPLED_READ,
            base_mip: level - 1,
            layer_count,
            ..Default::default()
        };

        steps.push(MipStep {
            to_transfer_src,
            blit,
            to_shader_read,
        });
    }

    // The last level was only ever a blit destination
    let finalize = LayoutTransition {
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        src_stage: vk::PipelineStageFlags2::TRANSFER,
        src_access: vk::AccessFlags2::TRANSFER_WRITE,
        dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
        dst_access: vk::AccessFlags2::SHADER_SAMPLED_READ,
        base_mip: mip_levels - 1,
        layer_count,
        ..Default::default()
    };

    (steps, finalize)
}

/// Record a drain plan into a command buffer.
///
/// # Safety
/// The device and command buffer must be valid, and the command buffer must
/// be in the recording state.
unsafe fn record_plan(device: &ash::Device, cmd: vk::CommandBuffer, plan: &DrainPlan) {
    for copy in &plan.buffer_copies {
        device.cmd_copy_buffer(cmd, copy.src, copy.dst, std::slice::from_ref(&copy.region));
    }

    for upload in &plan.texture_uploads {
        record_image_barrier(device, cmd, upload.image, &upload.to_transfer_dst);

        device.cmd_copy_buffer_to_image(
            cmd,
            upload.src,
            upload.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &upload.regions,
        );

        for step in &upload.mip_steps {
            record_image_barrier(device, cmd, upload.image, &step.to_transfer_src);
            device.cmd_blit_image(
                cmd,
                upload.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                upload.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&step.blit),
                vk::Filter::LINEAR,
            );
            record_image_barrier(device, cmd, upload.image, &step.to_shader_read);
        }

        record_image_barrier(device, cmd, upload.image, &upload.finalize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::mip_level_count;
    use ash::vk::Handle;
    use lantern_gpu::memory::GpuBuffer;

    fn test_buffer(handle: u64, size: u64) -> GpuBuffer {
        GpuBuffer {
            buffer: vk::Buffer::from_raw(handle),
            allocation: None,
            size,
        }
    }

    fn test_const_buffer(size: u64) -> ConstBuffer {
        ConstBuffer::from_raw_parts(test_buffer(1, size), test_buffer(2, size), size)
    }

    #[test]
    fn bounded_queue_rejects_overflow() {
        let mut queue = BoundedQueue::new("test", UPLOAD_QUEUE_CAPACITY);
        for i in 0..UPLOAD_QUEUE_CAPACITY {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.len(), UPLOAD_QUEUE_CAPACITY);

        let err = queue.push(99).unwrap_err();
        assert!(matches!(err, GpuError::QueueFull(_)));
        // The rejected item is not silently dropped into the queue
        assert_eq!(queue.len(), UPLOAD_QUEUE_CAPACITY);
    }

    #[test]
    fn single_const_buffer_drain() {
        let mut queues = UploadQueues::new();
        let mut buffer = test_const_buffer(64);
        assert!(buffer.is_dirty());

        queues.enqueue_const_buffer(&mut buffer).unwrap();
        assert!(!buffer.is_dirty());

        let plan = queues.plan_drain();
        assert_eq!(plan.buffer_copies.len(), 1);
        assert!(plan.texture_uploads.is_empty());

        let copy = &plan.buffer_copies[0];
        assert_eq!(copy.src, vk::Buffer::from_raw(1));
        assert_eq!(copy.dst, vk::Buffer::from_raw(2));
        assert_eq!(copy.region.src_offset, 0);
        assert_eq!(copy.region.dst_offset, 0);
        assert_eq!(copy.region.size, 64);
    }

    #[test]
    fn drain_empties_queues_and_repeats_as_noop() {
        let mut queues = UploadQueues::new();
        let mut buffer = test_const_buffer(64);
        queues.enqueue_const_buffer(&mut buffer).unwrap();
        queues
            .meshes
            .push(BufferUpload {
                src: vk::Buffer::from_raw(3),
                dst: vk::Buffer::from_raw(4),
                size: 140,
            })
            .unwrap();

        assert_eq!(queues.pending(), 2);
        let plan = queues.plan_drain();
        assert_eq!(plan.buffer_copies.len(), 2);
        assert_eq!(queues.pending(), 0);

        let second = queues.plan_drain();
        assert!(second.is_empty());
        assert_eq!(second.copy_count(), 0);
    }

    #[test]
    fn mip_chain_halves_to_one() {
        let (width, height) = (256, 100);
        let levels = mip_level_count(width, height);
        let (steps, finalize) = plan_mip_chain(width, height, levels, 1);

        assert_eq!(steps.len(), (levels - 1) as usize);

        for (i, step) in steps.iter().enumerate() {
            let level = i as u32 + 1;
            let (src_w, src_h) = mip_extent(width, height, level - 1);
            let (dst_w, dst_h) = mip_extent(width, height, level);

            assert_eq!(step.blit.src_subresource.mip_level, level - 1);
            assert_eq!(step.blit.dst_subresource.mip_level, level);
            assert_eq!(step.blit.src_offsets[1].x, src_w as i32);
            assert_eq!(step.blit.src_offsets[1].y, src_h as i32);
            assert_eq!(step.blit.dst_offsets[1].x, dst_w as i32);
            assert_eq!(step.blit.dst_offsets[1].y, dst_h as i32);

            assert_eq!(step.to_transfer_src.base_mip, level - 1);
            assert_eq!(
                step.to_transfer_src.new_layout,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL
            );
            assert_eq!(step.to_shader_read.base_mip, level - 1);
            assert_eq!(
                step.to_shader_read.new_layout,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            );
        }

        // The last blit lands on a 1x1 level
        let last = steps.last().unwrap();
        assert_eq!(last.blit.dst_offsets[1].x, 1);
        assert_eq!(last.blit.dst_offsets[1].y, 1);

        assert_eq!(finalize.base_mip, levels - 1);
        assert_eq!(finalize.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(
            finalize.new_layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn texture_without_mips_finalizes_all_levels() {
        let mut queues = UploadQueues::new();
        queues
            .textures
            .push(TextureUpload {
                src: vk::Buffer::from_raw(7),
                image: vk::Image::from_raw(8),
                regions: vec![vk::BufferImageCopy::default()],
                width: 64,
                height: 64,
                mip_levels: 3,
                layer_count: 1,
                gen_mips: false,
            })
            .unwrap();

        let plan = queues.plan_drain();
        let upload = &plan.texture_uploads[0];

        assert_eq!(upload.to_transfer_dst.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(upload.to_transfer_dst.level_count, 3);
        assert!(upload.mip_steps.is_empty());
        assert_eq!(upload.finalize.base_mip, 0);
        assert_eq!(upload.finalize.level_count, 3);
    }
}
