use std::rc::Rc;

use crate::device::{RenderContext, ResourceId, ResourceKind, ResourceToken, ShaderBinding};
use crate::error::UsageError;
use crate::Result;

use super::Bindable;

/// Compiled module plus entry point. Shader contents are opaque to the engine.
struct ShaderProgram {
    token: ResourceToken,
    module: wgpu::ShaderModule,
    entry: Rc<str>,
}

impl ShaderProgram {
    fn from_wgsl(ctx: &RenderContext, kind: ResourceKind, source: &str, entry: &str) -> Self {
        let label = match kind {
            ResourceKind::VertexShader => "veil vertex shader",
            _ => "veil pixel shader",
        };
        let module = ctx.device().create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        Self {
            token: ctx.tracker().acquire(kind),
            module,
            entry: Rc::from(entry),
        }
    }

    fn from_bytes(ctx: &RenderContext, kind: ResourceKind, blob: &[u8], entry: &str) -> Result<Self> {
        let source =
            std::str::from_utf8(blob).map_err(|e| UsageError::ShaderEncoding(e.to_string()))?;
        Ok(Self::from_wgsl(ctx, kind, source, entry))
    }

    fn binding(&self) -> ShaderBinding {
        ShaderBinding {
            id: self.token.id(),
            module: self.module.clone(),
            entry: Rc::clone(&self.entry),
        }
    }
}

/// Vertex stage program.
pub struct VertexShader {
    program: ShaderProgram,
}

impl VertexShader {
    pub fn from_wgsl(ctx: &RenderContext, source: &str, entry: &str) -> Self {
        Self {
            program: ShaderProgram::from_wgsl(ctx, ResourceKind::VertexShader, source, entry),
        }
    }

    /// Creates the shader from an opaque blob (UTF-8 WGSL).
    pub fn from_bytes(ctx: &RenderContext, blob: &[u8], entry: &str) -> Result<Self> {
        Ok(Self {
            program: ShaderProgram::from_bytes(ctx, ResourceKind::VertexShader, blob, entry)?,
        })
    }

    pub fn entry_point(&self) -> &str {
        &self.program.entry
    }
}

impl Bindable for VertexShader {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        ctx.state_mut().vertex_shader = Some(self.program.binding());
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.program.token.id()
    }
}

/// Fragment stage program.
///
/// Programs used by transparent drawables write two outputs: the weighted
/// premultiplied color at location 0 and the coverage `α` at location 1.
pub struct PixelShader {
    program: ShaderProgram,
}

impl PixelShader {
    pub fn from_wgsl(ctx: &RenderContext, source: &str, entry: &str) -> Self {
        Self {
            program: ShaderProgram::from_wgsl(ctx, ResourceKind::PixelShader, source, entry),
        }
    }

    /// Creates the shader from an opaque blob (UTF-8 WGSL).
    pub fn from_bytes(ctx: &RenderContext, blob: &[u8], entry: &str) -> Result<Self> {
        Ok(Self {
            program: ShaderProgram::from_bytes(ctx, ResourceKind::PixelShader, blob, entry)?,
        })
    }

    pub fn entry_point(&self) -> &str {
        &self.program.entry
    }
}

impl Bindable for PixelShader {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        ctx.state_mut().pixel_shader = Some(self.program.binding());
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.program.token.id()
    }
}
