//! Screenshot capture via a persistent readback image.
//!
//! Copies the just-presented swapchain image into a linear-tiled
//! host-visible image, then hands tightly packed RGBA bytes to the caller.
//! The readback image is created once and reused; its layout history is
//! tracked here so the first capture transitions from undefined and later
//! captures from general.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ash::vk;
use image::{ImageBuffer, Rgba};
use lantern_gpu::command::{begin_command_buffer, end_command_buffer, submit_and_wait};
use lantern_gpu::error::Result;
use lantern_gpu::memory::GpuImage;
use lantern_gpu::sync::create_fence;
use lantern_gpu::{GpuContext, GpuError};

use crate::barrier::{record_image_barrier, LayoutTransition};

/// Format of the readback image. Matches the swapchain's channel order and
/// texel size, which is all an image copy requires.
pub const READBACK_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// The four transitions one capture records.
#[derive(Debug, Clone, Copy)]
pub struct CaptureBarriers {
    pub swapchain_to_src: LayoutTransition,
    pub readback_to_dst: LayoutTransition,
    pub swapchain_back: LayoutTransition,
    pub readback_to_general: LayoutTransition,
}

/// Build the capture barriers.
///
/// `previously_used` selects the readback image's old layout: undefined on
/// the first capture, general afterwards.
pub fn plan_capture_barriers(previously_used: bool) -> CaptureBarriers {
    CaptureBarriers {
        swapchain_to_src: LayoutTransition {
            old_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_access: vk::AccessFlags2::TRANSFER_READ,
            ..Default::default()
        },
        readback_to_dst: LayoutTransition {
            old_layout: if previously_used {
                vk::ImageLayout::GENERAL
            } else {
                vk::ImageLayout::UNDEFINED
            },
            new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_access: vk::AccessFlags2::TRANSFER_WRITE,
            ..Default::default()
        },
        swapchain_back: LayoutTransition {
            old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_READ,
            dst_stage: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
            ..Default::default()
        },
        readback_to_general: LayoutTransition {
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::GENERAL,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_stage: vk::PipelineStageFlags2::HOST,
            dst_access: vk::AccessFlags2::HOST_READ,
            ..Default::default()
        },
    }
}

/// Swap a BGRA row into RGBA, appending to `out`.
fn bgra_to_rgba(row: &[u8], out: &mut Vec<u8>) {
    for px in row.chunks_exact(4) {
        out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
    }
}

/// Captures swapchain contents into host memory.
pub struct Screenshotter {
    image: GpuImage,
    fence: vk::Fence,
    width: u32,
    height: u32,
    used: bool,
}

impl Screenshotter {
    /// Create the persistent readback image and its dedicated fence.
    ///
    /// The fence is separate from the per-frame fences so a capture never
    /// perturbs the steady-state ring.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn new(gpu: &GpuContext, width: u32, height: u32) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(READBACK_FORMAT)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::LINEAR)
            .usage(vk::ImageUsageFlags::TRANSFER_DST)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = gpu
            .allocator()
            .lock()
            .create_readback_image(&create_info, "readback")?;

        Ok(Self {
            image,
            fence: create_fence(gpu.device())?,
            width,
            height,
            used: false,
        })
    }

    fn plan_barriers(&self) -> CaptureBarriers {
        plan_capture_barriers(self.used)
    }

    /// Copy the given swapchain image into `out` as tightly packed RGBA.
    ///
    /// Blocks on `frame_fence` first so the frame that wrote the image has
    /// finished, then on the capture's own fence. `out` is resized if it
    /// cannot hold the pixels.
    ///
    /// # Safety
    /// All handles must be valid; `cmd` must come from a pool whose
    /// buffers are individually resettable and must not be pending.
    pub unsafe fn capture(
        &mut self,
        gpu: &GpuContext,
        cmd: vk::CommandBuffer,
        frame_fence: vk::Fence,
        swapchain_image: vk::Image,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let device = gpu.device();

        device.wait_for_fences(&[frame_fence], true, u64::MAX)?;

        let barriers = self.plan_barriers();

        device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        record_image_barrier(device, cmd, swapchain_image, &barriers.swapchain_to_src);
        record_image_barrier(device, cmd, self.image.image, &barriers.readback_to_dst);

        let subresource = vk::ImageSubresourceLayers::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(0)
            .base_array_layer(0)
            .layer_count(1);
        let copy = vk::ImageCopy::default()
            .src_subresource(subresource)
            .dst_subresource(subresource)
            .extent(vk::Extent3D {
                width: self.width,
                height: self.height,
                depth: 1,
            });
        device.cmd_copy_image(
            cmd,
            swapchain_image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            self.image.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&copy),
        );

        record_image_barrier(device, cmd, swapchain_image, &barriers.swapchain_back);
        record_image_barrier(device, cmd, self.image.image, &barriers.readback_to_general);

        end_command_buffer(device, cmd)?;
        submit_and_wait(device, gpu.graphics_queue(), cmd, self.fence, u64::MAX)?;
        self.used = true;

        let layout = device.get_image_subresource_layout(
            self.image.image,
            vk::ImageSubresource::default().aspect_mask(vk::ImageAspectFlags::COLOR),
        );
        let base = self
            .image
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Readback image is not mapped".to_string()))?;

        out.clear();
        out.reserve(self.width as usize * self.height as usize * 4);
        for y in 0..self.height as usize {
            let row_offset = layout.offset as usize + y * layout.row_pitch as usize;
            let row = std::slice::from_raw_parts(
                base.add(row_offset),
                self.width as usize * 4,
            );
            bgra_to_rgba(row, out);
        }

        tracing::debug!(
            width = self.width,
            height = self.height,
            "Captured screenshot"
        );
        Ok(())
    }

    /// Dimensions of captured images.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Destroy the readback image and fence.
    ///
    /// # Safety
    /// The GPU must be idle.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) {
        gpu.device().destroy_fence(self.fence, None);
        if let Err(e) = gpu.allocator().lock().free_image(&mut self.image) {
            tracing::warn!("Failed to free readback image: {e}");
        }
    }

    #[cfg(test)]
    fn from_raw_parts(width: u32, height: u32) -> Self {
        Self {
            image: GpuImage {
                image: vk::Image::null(),
                allocation: None,
                format: READBACK_FORMAT,
                extent: vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                },
            },
            fence: vk::Fence::null(),
            width,
            height,
            used: false,
        }
    }

    #[cfg(test)]
    fn mark_used(&mut self) {
        self.used = true;
    }
}

/// Errors specific to encoding and saving screenshots.
#[derive(Debug)]
pub enum ScreenshotError {
    /// Failed to read pixel data back from the GPU.
    CaptureFailed(String),
    /// Pixel data did not match the stated dimensions.
    InvalidImageData,
    /// Failed to write the image file.
    SaveFailed(String),
}

impl std::fmt::Display for ScreenshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CaptureFailed(e) => write!(f, "Failed to capture screenshot: {e}"),
            Self::InvalidImageData => write!(f, "Invalid image data"),
            Self::SaveFailed(e) => write!(f, "Failed to save screenshot: {e}"),
        }
    }
}

impl std::error::Error for ScreenshotError {}

/// Save tightly packed RGBA pixels to an image file. The format follows
/// the file extension.
pub fn save_rgba(
    data: Vec<u8>,
    width: u32,
    height: u32,
    path: impl AsRef<Path>,
) -> std::result::Result<(), ScreenshotError> {
    let path = path.as_ref();

    let image = ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data)
        .ok_or(ScreenshotError::InvalidImageData)?;

    image
        .save(path)
        .map_err(|e| ScreenshotError::SaveFailed(e.to_string()))?;

    tracing::info!("Screenshot saved: {}", path.display());
    Ok(())
}

/// Which frames to capture and where the files go.
#[derive(Clone, Default)]
pub struct ScreenshotConfig {
    /// Output path pattern; `{}` is replaced with the frame number.
    pub output_pattern: String,
    /// Frame numbers to capture.
    pub frames: HashSet<u64>,
    /// Quit once every requested frame has been captured.
    pub exit_after_capture: bool,
}

impl ScreenshotConfig {
    pub fn new(pattern: impl Into<String>, frames: HashSet<u64>, exit_after: bool) -> Self {
        Self {
            output_pattern: pattern.into(),
            frames,
            exit_after_capture: exit_after,
        }
    }

    /// Whether any captures are configured.
    pub fn enabled(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Whether the given frame should be captured.
    pub fn should_capture(&self, frame: u64) -> bool {
        self.frames.contains(&frame)
    }

    /// Whether every requested frame is behind `current_frame`.
    pub fn all_captured(&self, current_frame: u64) -> bool {
        match self.frames.iter().max() {
            Some(&max) => current_frame > max,
            None => false,
        }
    }

    /// Output path for one frame.
    pub fn output_path(&self, frame: u64) -> PathBuf {
        PathBuf::from(self.output_pattern.replace("{}", &frame.to_string()))
    }
}

/// Parse frame numbers from a string like "0,5,10-15,20". Ranges are
/// inclusive; malformed parts are ignored.
pub fn parse_frame_indices(s: &str) -> HashSet<u64> {
    let mut frames = HashSet::new();

    for part in s.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.parse::<u64>(), end.parse::<u64>()) {
                frames.extend(start..=end);
            }
        } else if let Ok(frame) = part.parse::<u64>() {
            frames.insert(frame);
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_capture_transitions_from_undefined() {
        let shot = Screenshotter::from_raw_parts(640, 480);
        let barriers = shot.plan_barriers();
        assert_eq!(barriers.readback_to_dst.old_layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn repeat_capture_transitions_from_general() {
        let mut shot = Screenshotter::from_raw_parts(640, 480);
        shot.mark_used();

        let barriers = shot.plan_barriers();
        assert_eq!(barriers.readback_to_dst.old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(
            barriers.readback_to_general.new_layout,
            vk::ImageLayout::GENERAL
        );
    }

    #[test]
    fn swapchain_returns_to_present_layout() {
        let barriers = plan_capture_barriers(true);
        assert_eq!(
            barriers.swapchain_to_src.old_layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
        assert_eq!(
            barriers.swapchain_back.new_layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
    }

    #[test]
    fn bgra_swaps_to_rgba() {
        let mut out = Vec::new();
        bgra_to_rgba(&[1, 2, 3, 4, 10, 20, 30, 40], &mut out);
        assert_eq!(out, vec![3, 2, 1, 4, 30, 20, 10, 40]);
    }

    #[test]
    fn parse_single_and_list() {
        assert_eq!(parse_frame_indices("5"), HashSet::from([5]));
        assert_eq!(parse_frame_indices("0,5,10"), HashSet::from([0, 5, 10]));
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_frame_indices("3-6"), HashSet::from([3, 4, 5, 6]));
        assert_eq!(
            parse_frame_indices("0,5-7,10"),
            HashSet::from([0, 5, 6, 7, 10])
        );
    }

    #[test]
    fn config_paths_and_completion() {
        let config = ScreenshotConfig::new("frame_{}.png", HashSet::from([0, 5]), true);
        assert!(config.enabled());
        assert_eq!(config.output_path(5), PathBuf::from("frame_5.png"));
        assert!(config.should_capture(0));
        assert!(!config.should_capture(3));
        assert!(!config.all_captured(5));
        assert!(config.all_captured(6));
    }
}
