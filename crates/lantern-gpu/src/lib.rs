//! Vulkan abstraction layer for the Lantern demo.
//!
//! This crate provides:
//! - Instance, device, and queue setup against a window surface
//! - Staging, resident, and readback allocations via gpu-allocator
//! - Command pools, plain-data submissions, and descriptor plumbing
//! - Swapchain, pipeline, and sync object helpers

pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{DescriptorPool, DescriptorSetLayoutBuilder, DescriptorWrite};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig, PipelineCacheFile};
pub use surface::SurfaceContext;
pub use swapchain::{AcquireOutcome, Swapchain};
pub use sync::{create_fence, create_semaphore, create_signaled_fence};
