//! GPU error types.

use ash::vk;
use thiserror::Error;

/// Errors from the GPU layer and the frame pipeline built on it.
#[derive(Error, Debug)]
pub enum GpuError {
    /// A raw Vulkan call failed.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No device offered Vulkan 1.3 plus a presentable swapchain.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// The allocator could not satisfy a buffer or image request.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// The window surface could not be created.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// The presentation surface was lost and cannot be recovered.
    #[error("Surface lost: {0}")]
    SurfaceLost(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// A SPIR-V binary could not be read or was rejected.
    #[error("Shader loading failed: {0}")]
    ShaderLoad(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A bounded upload queue rejected an item because it was full.
    #[error("Queue full: {0}")]
    QueueFull(String),

    /// An operation ran against an object in the wrong state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Anything without a more specific variant.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
