//! Surface management for windowed rendering.
//!
//! The surface is created alongside the GPU context (see
//! [`crate::context::GpuContextBuilder::build_for_window`]) so device
//! creation can pick a present-capable queue family against it.

use crate::context::GpuContext;
use crate::error::Result;
use crate::swapchain::{
    calculate_extent, select_present_mode, select_surface_format, Swapchain, SwapchainDesc,
};
use ash::vk;

/// Surface context for windowed rendering.
///
/// Holds the Vulkan surface and the extension loaders tied to it.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader.
    pub swapchain_loader: ash::khr::swapchain::Device,
    /// The Vulkan entry point (kept alive for surface_loader lifetime).
    #[allow(dead_code)]
    entry: ash::Entry,
}

impl SurfaceContext {
    pub(crate) fn from_parts(
        entry: ash::Entry,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        swapchain_loader: ash::khr::swapchain::Device,
    ) -> Self {
        Self {
            surface,
            surface_loader,
            swapchain_loader,
            entry,
        }
    }

    /// Create a swapchain for this surface.
    ///
    /// The surface is queried fresh on every call, so a swapchain built
    /// after a window change picks up the new limits.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Swapchain> {
        let physical = gpu.physical_device();
        let capabilities = self
            .surface_loader
            .get_physical_device_surface_capabilities(physical, self.surface)?;
        let formats = self
            .surface_loader
            .get_physical_device_surface_formats(physical, self.surface)?;
        let present_modes = self
            .surface_loader
            .get_physical_device_surface_present_modes(physical, self.surface)?;

        let format = select_surface_format(&formats);
        let present_mode = select_present_mode(&present_modes, vsync);
        let extent = calculate_extent(&capabilities, width, height);

        tracing::debug!(
            "Swapchain: {}x{} {:?} {:?}",
            extent.width,
            extent.height,
            format.format,
            present_mode
        );

        Swapchain::new(
            gpu.device(),
            &self.swapchain_loader,
            &SwapchainDesc {
                surface: self.surface,
                capabilities: &capabilities,
                format,
                present_mode,
                extent,
                graphics_queue_family: gpu.graphics_queue_family(),
                old_swapchain: None,
            },
        )
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// The surface must not be in use.
    pub unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
    }
}
