use crate::device::{RenderContext, ResourceId, ResourceKind, ResourceToken};
use crate::Result;

use super::Bindable;

/// Depth buffer format of every render surface.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Selectable depth-stencil configurations.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum DepthMode {
    /// Test `less`, write depth.
    #[default]
    Default,
    /// Test `less`, never write. Used by transparent draws.
    ReadOnly,
    /// No test, no write.
    Disabled,
    /// No test, write depth.
    Always,
}

impl DepthMode {
    pub fn writes_depth(self) -> bool {
        matches!(self, Self::Default | Self::Always)
    }

    pub fn depth_stencil_state(self) -> wgpu::DepthStencilState {
        let depth_compare = match self {
            Self::Default | Self::ReadOnly => wgpu::CompareFunction::Less,
            Self::Disabled | Self::Always => wgpu::CompareFunction::Always,
        };
        wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: self.writes_depth(),
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

/// Depth-stencil state unit.
pub struct DepthStencil {
    token: ResourceToken,
    mode: DepthMode,
}

impl DepthStencil {
    pub fn new(ctx: &RenderContext, mode: DepthMode) -> Self {
        Self {
            token: ctx.tracker().acquire(ResourceKind::DepthStencil),
            mode,
        }
    }

    pub fn mode(&self) -> DepthMode {
        self.mode
    }
}

impl Bindable for DepthStencil {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        ctx.state_mut().depth = self.mode;
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.token.id()
    }
}
