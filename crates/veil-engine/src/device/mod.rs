//! GPU device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue
//! - tracking the identity and lifetime of every resource unit
//! - holding the current pipeline state and current render target
//! - recording draws into per-surface frame queues
//! - caching render pipelines

mod context;
mod init;
mod pipeline;
mod queue;
mod state;
mod tracker;

pub use context::{RenderContext, SurfaceId};
pub use init::DeviceInit;
pub use tracker::{ResourceId, ResourceKind, ResourceStats, ResourceToken, ResourceTracker};

pub(crate) use pipeline::{TargetFormats, ACCUM_FORMAT, REVEAL_FORMAT};
pub(crate) use queue::{split_passes, DrawCall, FrameCommand, PassKind};
pub(crate) use state::{
    BufferBinding, IndexBinding, LayoutBinding, PipelineState, SamplerBinding, ShaderBinding,
    TextureBinding,
};
