//! Frame lifecycle and resource streaming for the Lantern demo.
//!
//! This crate provides:
//! - A fixed-latency frame ring and the per-tick sequencer
//! - Bounded upload queues with a testable drain plan
//! - Staged const buffers, meshes, and mip-mapped textures
//! - Screenshot capture through a persistent readback image
//! - Scene graph, overlay repacking, and mesh generators

pub mod barrier;
pub mod constants;
pub mod frame;
pub mod geometry;
pub mod layout;
pub mod overlay;
pub mod queue;
pub mod readback;
pub mod resources;
pub mod scene;
pub mod sequencer;

pub use barrier::LayoutTransition;
pub use constants::{ObjectConstants, SkyConstants, ViewConstants};
pub use frame::{BindingGroups, BindingLayouts, FrameRing, FrameSlot, FRAME_LATENCY};
pub use layout::{MeshLayout, PackedLayout, PackedLayoutBuilder, Region};
pub use overlay::{pack_overlay, DrawSpan, OverlayFrame, OverlayGeometry, OverlayVertex};
pub use queue::{BoundedQueue, DrainPlan, UploadQueues, UPLOAD_QUEUE_CAPACITY};
pub use readback::{
    parse_frame_indices, save_rgba, ScreenshotConfig, ScreenshotError, Screenshotter,
};
pub use resources::{
    ConstBuffer, GpuMesh, GpuTexture, IndexData, MeshData, TextureData, TextureRegion,
    VertexStream, MAX_REGION_COUNT,
};
pub use scene::{MeshInstance, NodeId, SceneGraph, SceneNode, Transform};
pub use sequencer::{
    FrameSequencer, RecordContext, TickOutcome, TickReport, UpdateContext, DEPTH_FORMAT,
};
