use crate::device::{RenderContext, ResourceId, ResourceKind, ResourceToken};
use crate::error::RenderError;
use crate::Result;

use super::Bindable;

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum CullMode {
    /// Both faces are rasterized.
    DoubleSided,
    /// Back faces are culled.
    #[default]
    SingleSided,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

/// Which winding is considered front-facing.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum Winding {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct RasterizerDesc {
    pub cull: CullMode,
    pub fill: FillMode,
    pub winding: Winding,
}

impl RasterizerDesc {
    pub const DOUBLE_SIDED: Self = Self {
        cull: CullMode::DoubleSided,
        fill: FillMode::Solid,
        winding: Winding::CounterClockwise,
    };

    pub(crate) fn primitive_state(&self, topology: wgpu::PrimitiveTopology) -> wgpu::PrimitiveState {
        wgpu::PrimitiveState {
            topology,
            // Indices are always u32.
            strip_index_format: topology.is_strip().then_some(wgpu::IndexFormat::Uint32),
            front_face: match self.winding {
                Winding::CounterClockwise => wgpu::FrontFace::Ccw,
                Winding::Clockwise => wgpu::FrontFace::Cw,
            },
            cull_mode: match self.cull {
                CullMode::DoubleSided => None,
                CullMode::SingleSided => Some(wgpu::Face::Back),
            },
            polygon_mode: match self.fill {
                FillMode::Solid => wgpu::PolygonMode::Fill,
                FillMode::Wireframe => wgpu::PolygonMode::Line,
            },
            unclipped_depth: false,
            conservative: false,
        }
    }
}

/// Rasterizer state unit.
pub struct Rasterizer {
    token: ResourceToken,
    desc: RasterizerDesc,
}

impl Rasterizer {
    /// Fails with [`RenderError::Unsupported`] when wireframe is requested on a
    /// device without line polygon mode.
    pub fn new(ctx: &RenderContext, desc: RasterizerDesc) -> Result<Self> {
        if desc.fill == FillMode::Wireframe
            && !ctx.features().contains(wgpu::Features::POLYGON_MODE_LINE)
        {
            return Err(RenderError::Unsupported("wireframe fill"));
        }
        Ok(Self {
            token: ctx.tracker().acquire(ResourceKind::Rasterizer),
            desc,
        })
    }

    pub fn desc(&self) -> RasterizerDesc {
        self.desc
    }
}

impl Bindable for Rasterizer {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        ctx.state_mut().rasterizer = self.desc;
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.token.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_sided_disables_culling() {
        let p = RasterizerDesc::DOUBLE_SIDED.primitive_state(wgpu::PrimitiveTopology::TriangleList);
        assert_eq!(p.cull_mode, None);
        assert_eq!(p.strip_index_format, None);
    }

    #[test]
    fn strips_use_u32_restart_index() {
        let p = RasterizerDesc::default().primitive_state(wgpu::PrimitiveTopology::TriangleStrip);
        assert_eq!(p.strip_index_format, Some(wgpu::IndexFormat::Uint32));
        assert_eq!(p.cull_mode, Some(wgpu::Face::Back));
    }

    #[test]
    fn wireframe_and_winding_map_through() {
        let desc = RasterizerDesc {
            cull: CullMode::SingleSided,
            fill: FillMode::Wireframe,
            winding: Winding::Clockwise,
        };
        let p = desc.primitive_state(wgpu::PrimitiveTopology::LineList);
        assert_eq!(p.polygon_mode, wgpu::PolygonMode::Line);
        assert_eq!(p.front_face, wgpu::FrontFace::Cw);
    }
}
