//! The frame sequencer.
//!
//! Drives one tick of the acquire, upload, graphics, present sequence
//! against the frame ring. The CPU blocks in exactly one place per tick:
//! the in-flight fence of the slot about to be reused.
//!
//! The per-tick decisions (whether an upload submission happens, what the
//! graphics submission waits on, which layouts the swapchain image moves
//! between) are pure functions over the tick state so they can be tested
//! without a device.

use ash::vk;
use lantern_gpu::command::{
    begin_command_buffer, end_command_buffer, submit, CommandPool, SubmitDesc,
};
use lantern_gpu::error::Result;
use lantern_gpu::memory::GpuImage;
use lantern_gpu::{AcquireOutcome, GpuContext, SurfaceContext, Swapchain};

use crate::barrier::{record_image_barrier, LayoutTransition};
use crate::frame::{BindingGroups, BindingLayouts, FrameRing};
use crate::queue::UploadQueues;
use crate::resources::{GpuMesh, MeshData};

/// Depth attachment format used for the whole demo.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Decisions for one tick, computed before any recording happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    pub frame_index: usize,
    pub submit_upload: bool,
}

/// Decide what the tick will do given the pending upload state.
pub fn plan_tick(frame_index: usize, uploads_pending: bool) -> TickPlan {
    TickPlan {
        frame_index,
        submit_upload: uploads_pending,
    }
}

/// Wait semaphores and stages for the graphics submission.
///
/// Always waits on the acquire; waits on the upload submission only when
/// one was made this tick. Waiting at vertex input covers every stage that
/// reads uploaded data, since all of them come later in pipeline order.
pub fn graphics_wait_semaphores(
    image_acquired: vk::Semaphore,
    upload_complete: Option<vk::Semaphore>,
) -> (Vec<vk::Semaphore>, Vec<vk::PipelineStageFlags>) {
    let mut semaphores = vec![image_acquired];
    let mut stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

    if let Some(upload) = upload_complete {
        semaphores.push(upload);
        stages.push(vk::PipelineStageFlags::VERTEX_INPUT);
    }

    (semaphores, stages)
}

/// Transition the acquired swapchain image into color-attachment layout.
///
/// An image that has never been presented is still in its initial layout,
/// so the first touch of each image uses undefined as the old layout.
pub fn plan_color_target_transition(first_use: bool) -> LayoutTransition {
    LayoutTransition {
        old_layout: if first_use {
            vk::ImageLayout::UNDEFINED
        } else {
            vk::ImageLayout::PRESENT_SRC_KHR
        },
        new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        src_access: vk::AccessFlags2::NONE,
        dst_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        dst_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

/// Transition the swapchain image back to present layout.
///
/// When the graphics and present queue families differ this doubles as the
/// release half of the ownership transfer; the matching acquire is recorded
/// in the pre-built present-queue command buffer.
pub fn plan_present_transition(graphics_family: u32, present_family: u32) -> LayoutTransition {
    let (src_queue_family, dst_queue_family) = if graphics_family == present_family {
        (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED)
    } else {
        (graphics_family, present_family)
    };

    LayoutTransition {
        old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        dst_stage: vk::PipelineStageFlags2::NONE,
        dst_access: vk::AccessFlags2::NONE,
        src_queue_family,
        dst_queue_family,
        ..Default::default()
    }
}

/// Transition the depth target for this tick's rendering.
///
/// Depth contents from the previous tick are never reused, so the old
/// layout is always undefined.
pub fn plan_depth_target_transition() -> LayoutTransition {
    let fragment_tests = vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;

    LayoutTransition {
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        src_stage: fragment_tests,
        src_access: vk::AccessFlags2::NONE,
        dst_stage: fragment_tests,
        dst_access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        aspect: vk::ImageAspectFlags::DEPTH,
        ..Default::default()
    }
}

/// Context handed to the per-tick update callback.
///
/// Runs after the slot fence wait, so staging writes and enqueues made here
/// cannot race the GPU.
pub struct UpdateContext<'a> {
    pub frame_index: usize,
    pub uploads: &'a mut UploadQueues,
}

/// Context handed to the draw-recording callback.
///
/// Rendering has already begun on `cmd`; the callback only issues pipeline
/// binds and draws.
pub struct RecordContext<'a> {
    pub cmd: vk::CommandBuffer,
    pub image_index: u32,
    pub frame_index: usize,
    pub frame_count: u64,
    pub extent: vk::Extent2D,
    pub bindings: BindingGroups,
    pub overlay_mesh: Option<&'a GpuMesh>,
}

/// What a completed tick did.
#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    pub frame_index: usize,
    pub image_index: u32,
    pub upload_submitted: bool,
    pub copies_recorded: usize,
    pub suboptimal: bool,
}

/// Outcome of a tick.
pub enum TickOutcome {
    Completed(TickReport),
    /// The swapchain was out of date at acquire. Nothing was submitted and
    /// the ring did not advance.
    SkippedOutOfDate,
}

/// The depth attachment shared by all frames.
///
/// Depth is fully rewritten every tick, so one image suffices even with
/// multiple frames in flight.
struct DepthTarget {
    image: GpuImage,
    view: vk::ImageView,
}

impl DepthTarget {
    unsafe fn new(gpu: &GpuContext, extent: vk::Extent2D) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = gpu
            .allocator()
            .lock()
            .create_device_image(&create_info, "depth")?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let view = gpu.device().create_image_view(&view_info, None)?;

        Ok(Self { image, view })
    }

    unsafe fn destroy(&mut self, gpu: &GpuContext) {
        gpu.device().destroy_image_view(self.view, None);
        if let Err(e) = gpu.allocator().lock().free_image(&mut self.image) {
            tracing::warn!("Failed to free depth target: {e}");
        }
    }
}

/// Pre-recorded present-queue commands for swapchain ownership transfer.
///
/// Only exists when the graphics and present queue families differ. One
/// command buffer per swapchain image, recorded once at startup.
struct PresentOwnership {
    pool: CommandPool,
    cmds: Vec<vk::CommandBuffer>,
}

impl PresentOwnership {
    unsafe fn new(gpu: &GpuContext, swapchain: &Swapchain) -> Result<Self> {
        let pool = CommandPool::new(
            gpu.device(),
            gpu.present_queue_family(),
            vk::CommandPoolCreateFlags::empty(),
        )?;
        let cmds = pool.allocate_command_buffers(
            gpu.device(),
            vk::CommandBufferLevel::PRIMARY,
            swapchain.images.len() as u32,
        )?;

        // The acquire half of the transfer; must mirror the release barrier
        // recorded at the end of each graphics command buffer. Source scope
        // is ignored on the acquiring queue.
        let acquire = LayoutTransition {
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_queue_family: gpu.graphics_queue_family(),
            dst_queue_family: gpu.present_queue_family(),
            ..Default::default()
        };

        for (&image, &cmd) in swapchain.images.iter().zip(&cmds) {
            begin_command_buffer(
                gpu.device(),
                cmd,
                vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
            )?;
            record_image_barrier(gpu.device(), cmd, image, &acquire);
            end_command_buffer(gpu.device(), cmd)?;
        }

        tracing::debug!(
            images = cmds.len(),
            "Recorded swapchain ownership transfers for separate present queue"
        );

        Ok(Self { pool, cmds })
    }

    unsafe fn destroy(&self, device: &ash::Device) {
        self.pool.destroy(device);
    }
}

/// Owns the frame ring and upload queues and runs the tick sequence.
pub struct FrameSequencer {
    ring: FrameRing,
    uploads: UploadQueues,
    depth: DepthTarget,
    ownership: Option<PresentOwnership>,
    first_use: Vec<bool>,
    frame_count: u64,
    pub clear_color: [f32; 4],
}

impl FrameSequencer {
    /// Create the ring, depth target, and (if needed) ownership transfer
    /// commands. Everything is allocated here; ticks never allocate.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn new(
        gpu: &GpuContext,
        swapchain: &Swapchain,
        layouts: &BindingLayouts,
    ) -> Result<Self> {
        let ring = FrameRing::new(gpu.device(), gpu.graphics_queue_family(), layouts)?;
        let depth = DepthTarget::new(gpu, swapchain.extent)?;

        let ownership = if gpu.separate_present_queue() {
            Some(PresentOwnership::new(gpu, swapchain)?)
        } else {
            None
        };

        Ok(Self {
            ring,
            uploads: UploadQueues::new(),
            depth,
            ownership,
            first_use: vec![true; swapchain.images.len()],
            frame_count: 0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        })
    }

    /// The upload queues, for enqueues outside the update callback.
    pub fn uploads(&mut self) -> &mut UploadQueues {
        &mut self.uploads
    }

    /// Read access to the frame ring.
    pub fn ring(&self) -> &FrameRing {
        &self.ring
    }

    /// Total completed ticks.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Run one tick.
    ///
    /// `overlay` is this tick's overlay geometry, rebuilt from scratch by
    /// the caller; `update` runs after the fence wait and may write staging
    /// buffers and enqueue uploads; `record` issues the draw calls.
    ///
    /// # Safety
    /// All handles must be valid and all Vulkan calls must come from the
    /// thread driving this sequencer.
    pub unsafe fn tick<U, R>(
        &mut self,
        gpu: &GpuContext,
        surface: &SurfaceContext,
        swapchain: &Swapchain,
        overlay: Option<&MeshData>,
        update: U,
        record: R,
    ) -> Result<TickOutcome>
    where
        U: FnOnce(&mut UpdateContext) -> Result<()>,
        R: FnOnce(&mut RecordContext) -> Result<()>,
    {
        let device = gpu.device();
        let frame_index = self.ring.current_index();

        // Block until the GPU has released this slot.
        self.ring.current().wait(device)?;

        // Acquire before resetting the fence, so a skipped tick leaves the
        // slot signaled for its next turn.
        let (image_index, mut suboptimal) = match swapchain.acquire_next_image(
            &surface.swapchain_loader,
            self.ring.current().image_acquired,
            u64::MAX,
        )? {
            AcquireOutcome::Acquired { index, suboptimal } => (index, suboptimal),
            AcquireOutcome::OutOfDate => {
                tracing::warn!("Swapchain out of date at acquire, skipping tick");
                return Ok(TickOutcome::SkippedOutOfDate);
            }
        };

        self.ring.current().reset(device)?;

        // The fence wait made this slot's previous overlay geometry safe to
        // free; rebuild it from this tick's data and queue its copy.
        self.rebuild_overlay(gpu, overlay)?;

        {
            let mut ctx = UpdateContext {
                frame_index,
                uploads: &mut self.uploads,
            };
            update(&mut ctx)?;
        }

        let plan = plan_tick(frame_index, !self.uploads.is_empty());
        let mut copies_recorded = 0;
        if plan.submit_upload {
            let upload_cmd = self.ring.current().upload_cmd;
            let upload_complete = self.ring.current().upload_complete;

            self.ring
                .current()
                .command_pool
                .reset(device, vk::CommandPoolResetFlags::empty())?;
            begin_command_buffer(
                device,
                upload_cmd,
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            )?;
            let drained = self.uploads.drain_and_record(device, upload_cmd);
            copies_recorded = drained.copy_count();
            end_command_buffer(device, upload_cmd)?;

            submit(
                device,
                gpu.graphics_queue(),
                &SubmitDesc {
                    commands: &[upload_cmd],
                    signal_semaphores: &[upload_complete],
                    ..Default::default()
                },
                vk::Fence::null(),
            )?;

            tracing::trace!(copies = copies_recorded, "Submitted uploads");
        }

        self.record_graphics(gpu, swapchain, image_index, record)?;

        let slot = self.ring.current();
        let (wait_semaphores, wait_stages) = graphics_wait_semaphores(
            slot.image_acquired,
            plan.submit_upload.then_some(slot.upload_complete),
        );
        submit(
            device,
            gpu.graphics_queue(),
            &SubmitDesc {
                commands: &[slot.graphics_cmd],
                wait_semaphores: &wait_semaphores,
                wait_stages: &wait_stages,
                signal_semaphores: &[slot.render_complete],
            },
            slot.in_flight,
        )?;

        // Present, transferring image ownership first when the present
        // queue family is distinct.
        let present_wait = if let Some(ownership) = &self.ownership {
            submit(
                device,
                gpu.present_queue(),
                &SubmitDesc {
                    commands: &[ownership.cmds[image_index as usize]],
                    wait_semaphores: &[slot.render_complete],
                    wait_stages: &[vk::PipelineStageFlags::ALL_COMMANDS],
                    signal_semaphores: &[slot.swapchain_release],
                },
                vk::Fence::null(),
            )?;
            slot.swapchain_release
        } else {
            slot.render_complete
        };

        suboptimal |= swapchain.present(
            &surface.swapchain_loader,
            gpu.present_queue(),
            image_index,
            &[present_wait],
        )?;

        self.ring.advance();
        self.frame_count += 1;

        Ok(TickOutcome::Completed(TickReport {
            frame_index,
            image_index,
            upload_submitted: plan.submit_upload,
            copies_recorded,
            suboptimal,
        }))
    }

    unsafe fn rebuild_overlay(&mut self, gpu: &GpuContext, overlay: Option<&MeshData>) -> Result<()> {
        let slot = self.ring.current_mut();

        if let Some(mut old) = slot.overlay_mesh.take() {
            old.destroy(&mut gpu.allocator().lock())?;
        }

        if let Some(data) = overlay {
            let mesh = GpuMesh::new(&mut gpu.allocator().lock(), data, "overlay")?;
            self.uploads.enqueue_mesh(&mesh)?;
            slot.overlay_mesh = Some(mesh);
        }

        Ok(())
    }

    unsafe fn record_graphics<R>(
        &mut self,
        gpu: &GpuContext,
        swapchain: &Swapchain,
        image_index: u32,
        record: R,
    ) -> Result<()>
    where
        R: FnOnce(&mut RecordContext) -> Result<()>,
    {
        let device = gpu.device();
        let image = swapchain.images[image_index as usize];
        let first_use = self.first_use[image_index as usize];
        self.first_use[image_index as usize] = false;

        let slot = self.ring.current();
        let cmd = slot.graphics_cmd;

        device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        record_image_barrier(device, cmd, image, &plan_color_target_transition(first_use));
        record_image_barrier(device, cmd, self.depth.image.image, &plan_depth_target_transition());

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(swapchain.image_views[image_index as usize])
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            });

        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.depth.view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });

        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: swapchain.extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment))
            .depth_attachment(&depth_attachment);

        device.cmd_begin_rendering(cmd, &rendering_info);

        let mut ctx = RecordContext {
            cmd,
            image_index,
            frame_index: self.ring.current_index(),
            frame_count: self.frame_count,
            extent: swapchain.extent,
            bindings: slot.bindings,
            overlay_mesh: slot.overlay_mesh.as_ref(),
        };
        record(&mut ctx)?;

        device.cmd_end_rendering(cmd);

        record_image_barrier(
            device,
            cmd,
            image,
            &plan_present_transition(gpu.graphics_queue_family(), gpu.present_queue_family()),
        );

        end_command_buffer(device, cmd)?;
        Ok(())
    }

    /// Destroy everything the sequencer owns.
    ///
    /// # Safety
    /// The GPU must be idle.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) {
        self.ring.destroy(gpu.device(), &mut gpu.allocator().lock());
        self.depth.destroy(gpu);
        if let Some(ownership) = &self.ownership {
            ownership.destroy(gpu.device());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{next_slot, FRAME_LATENCY};
    use ash::vk::Handle;

    #[test]
    fn empty_queues_skip_upload_submission_across_ring_cycles() {
        let queues = UploadQueues::new();
        let mut index = 0;
        let mut seen = Vec::new();

        for _ in 0..5 {
            let plan = plan_tick(index, !queues.is_empty());
            assert!(!plan.submit_upload);
            seen.push(plan.frame_index);
            index = next_slot(index, FRAME_LATENCY);
        }

        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn pending_uploads_trigger_a_submission() {
        let plan = plan_tick(1, true);
        assert!(plan.submit_upload);
        assert_eq!(plan.frame_index, 1);
    }

    #[test]
    fn graphics_waits_on_acquire_alone_without_uploads() {
        let acquired = vk::Semaphore::from_raw(1);

        let (semaphores, stages) = graphics_wait_semaphores(acquired, None);
        assert_eq!(semaphores, vec![acquired]);
        assert_eq!(stages, vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT]);
    }

    #[test]
    fn graphics_waits_on_upload_when_one_was_submitted() {
        let acquired = vk::Semaphore::from_raw(1);
        let upload = vk::Semaphore::from_raw(2);

        let (semaphores, stages) = graphics_wait_semaphores(acquired, Some(upload));
        assert_eq!(semaphores, vec![acquired, upload]);
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1], vk::PipelineStageFlags::VERTEX_INPUT);
    }

    #[test]
    fn color_target_transition_tracks_prior_present() {
        let first = plan_color_target_transition(true);
        assert_eq!(first.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(first.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let later = plan_color_target_transition(false);
        assert_eq!(later.old_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn present_transition_releases_only_across_families() {
        let same = plan_present_transition(0, 0);
        assert_eq!(same.src_queue_family, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(same.dst_queue_family, vk::QUEUE_FAMILY_IGNORED);

        let split = plan_present_transition(0, 2);
        assert_eq!(split.src_queue_family, 0);
        assert_eq!(split.dst_queue_family, 2);
        assert_eq!(split.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn depth_transition_discards_previous_contents() {
        let t = plan_depth_target_transition();
        assert_eq!(t.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(t.aspect, vk::ImageAspectFlags::DEPTH);
    }
}
