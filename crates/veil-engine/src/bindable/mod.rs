//! GPU resource units.
//!
//! A [`Bindable`] is one piece of pipeline state or GPU-resident data. Binding
//! a unit writes it into the context's current pipeline state; the next
//! indexed draw snapshots that state. Units are created fully specified, are
//! not `Clone`, and release their resources exactly once when dropped.
//!
//! Binding order matters: every unit a draw depends on must be bound before
//! the draw is issued. [`Drawable`](crate::drawable::Drawable) binds its units
//! in insertion order for exactly this reason.

mod blend;
mod buffer;
mod constant_buffer;
mod depth;
mod input_layout;
mod rasterizer;
mod sampler;
mod shader;
pub mod slots;
mod texture;
mod topology;

use std::any::Any;

use crate::device::{RenderContext, ResourceId};
use crate::Result;

pub use blend::{evaluate_blend, BlendMode, Blender};
pub use buffer::{BufferUsage, IndexBuffer, VertexBuffer};
pub use constant_buffer::ConstantBuffer;
pub use depth::{DepthMode, DepthStencil, DEPTH_FORMAT};
pub use input_layout::{InputLayout, VertexElement};
pub use rasterizer::{CullMode, FillMode, Rasterizer, RasterizerDesc, Winding};
pub use sampler::{AddressMode, Filter, Sampler};
pub use shader::{PixelShader, VertexShader};
pub use texture::{Texture, TextureUsage};
pub use topology::Topology;

pub(crate) use blend::{accumulation_blend, resolve_blend, reveal_blend};
pub(crate) use input_layout::SlotLayout;

/// Pipeline stage a constant buffer is visible to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Pixel => "pixel",
        }
    }
}

/// One GPU resource unit.
///
/// `bind` fails only when the device has been removed.
pub trait Bindable: Any {
    /// Applies this unit to the context's current pipeline state.
    fn bind(&self, ctx: &RenderContext) -> Result<()>;

    /// Identity of the underlying resource.
    fn id(&self) -> ResourceId;
}
