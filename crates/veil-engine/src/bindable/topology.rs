use crate::device::{RenderContext, ResourceId, ResourceKind, ResourceToken};
use crate::Result;

use super::Bindable;

/// Primitive topology unit (point/line/triangle, list or strip).
pub struct Topology {
    token: ResourceToken,
    topology: wgpu::PrimitiveTopology,
}

impl Topology {
    pub fn new(ctx: &RenderContext, topology: wgpu::PrimitiveTopology) -> Self {
        Self {
            token: ctx.tracker().acquire(ResourceKind::Topology),
            topology,
        }
    }

    pub fn topology(&self) -> wgpu::PrimitiveTopology {
        self.topology
    }
}

impl Bindable for Topology {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        ctx.state_mut().topology = self.topology;
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.token.id()
    }
}
