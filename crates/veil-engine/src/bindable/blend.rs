use crate::device::{RenderContext, ResourceId, ResourceKind, ResourceToken};
use crate::Result;

use super::Bindable;

/// Selectable blend configurations.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum BlendMode {
    /// Blending disabled; fragments replace the target.
    #[default]
    Default,
    /// `src + dst` on color and alpha.
    Additive,
    /// Weighted OIT accumulation. On the two-target OIT pass the first target
    /// sums `src + dst` and the second multiplies by `1 - src`.
    OitAccumulate,
    /// Composites a resolved OIT layer: `src * src_alpha + dst * (1 - src_alpha)`.
    OitResolve,
}

impl BlendMode {
    /// Blend state for a single color target.
    pub fn blend_state(self) -> Option<wgpu::BlendState> {
        match self {
            Self::Default => None,
            Self::Additive => Some(additive_blend()),
            Self::OitAccumulate => Some(accumulation_blend()),
            Self::OitResolve => Some(resolve_blend()),
        }
    }

    pub(crate) fn color_target(self, format: wgpu::TextureFormat) -> wgpu::ColorTargetState {
        wgpu::ColorTargetState {
            format,
            blend: self.blend_state(),
            write_mask: wgpu::ColorWrites::ALL,
        }
    }
}

fn additive_blend() -> wgpu::BlendState {
    let add = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: add,
        alpha: add,
    }
}

/// Accumulation target: `Σ src` on both color and alpha.
pub(crate) fn accumulation_blend() -> wgpu::BlendState {
    additive_blend()
}

/// Reveal target: `dst * (1 - src)`, a running product of `(1 - α)`.
pub(crate) fn reveal_blend() -> wgpu::BlendState {
    let product = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Zero,
        dst_factor: wgpu::BlendFactor::OneMinusSrc,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: product,
        alpha: product,
    }
}

pub(crate) fn resolve_blend() -> wgpu::BlendState {
    let over = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: over,
        alpha: over,
    }
}

/// CPU evaluation of a blend state for one RGBA fragment.
///
/// Mirrors the fixed-function blender for the factors and operations this
/// crate configures. Returns `None` for constant-color factors, which need
/// pass state this function does not have.
pub fn evaluate_blend(state: &wgpu::BlendState, src: [f32; 4], dst: [f32; 4]) -> Option<[f32; 4]> {
    let mut out = [0.0; 4];
    for (i, value) in out.iter_mut().enumerate() {
        let component = if i < 3 { &state.color } else { &state.alpha };
        *value = evaluate_component(component, i, src, dst)?;
    }
    Some(out)
}

fn evaluate_component(
    component: &wgpu::BlendComponent,
    channel: usize,
    src: [f32; 4],
    dst: [f32; 4],
) -> Option<f32> {
    let s = factor(component.src_factor, channel, src, dst)? * src[channel];
    let d = factor(component.dst_factor, channel, src, dst)? * dst[channel];
    Some(match component.operation {
        wgpu::BlendOperation::Add => s + d,
        wgpu::BlendOperation::Subtract => s - d,
        wgpu::BlendOperation::ReverseSubtract => d - s,
        wgpu::BlendOperation::Min => src[channel].min(dst[channel]),
        wgpu::BlendOperation::Max => src[channel].max(dst[channel]),
    })
}

fn factor(f: wgpu::BlendFactor, channel: usize, src: [f32; 4], dst: [f32; 4]) -> Option<f32> {
    use wgpu::BlendFactor as F;
    Some(match f {
        F::Zero => 0.0,
        F::One => 1.0,
        F::Src => src[channel],
        F::OneMinusSrc => 1.0 - src[channel],
        F::SrcAlpha => src[3],
        F::OneMinusSrcAlpha => 1.0 - src[3],
        F::Dst => dst[channel],
        F::OneMinusDst => 1.0 - dst[channel],
        F::DstAlpha => dst[3],
        F::OneMinusDstAlpha => 1.0 - dst[3],
        F::SrcAlphaSaturated => {
            if channel == 3 {
                1.0
            } else {
                src[3].min(1.0 - dst[3])
            }
        }
        _ => return None,
    })
}

/// Blend-state unit.
pub struct Blender {
    token: ResourceToken,
    mode: BlendMode,
}

impl Blender {
    pub fn new(ctx: &RenderContext, mode: BlendMode) -> Self {
        Self {
            token: ctx.tracker().acquire(ResourceKind::Blender),
            mode,
        }
    }

    pub fn mode(&self) -> BlendMode {
        self.mode
    }
}

impl Bindable for Blender {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        ctx.state_mut().blend = self.mode;
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.token.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: [f32; 4], b: [f32; 4]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6)
    }

    #[test]
    fn default_mode_disables_blending() {
        assert!(BlendMode::Default.blend_state().is_none());
        let target = BlendMode::Default.color_target(wgpu::TextureFormat::Bgra8Unorm);
        assert!(target.blend.is_none());
    }

    #[test]
    fn accumulation_sums_contributions() {
        let out = evaluate_blend(
            &accumulation_blend(),
            [0.5, 0.0, 0.0, 0.5],
            [0.25, 0.1, 0.0, 0.25],
        )
        .unwrap();
        assert!(approx(out, [0.75, 0.1, 0.0, 0.75]));
    }

    #[test]
    fn reveal_multiplies_visibility() {
        let out = evaluate_blend(&reveal_blend(), [0.5; 4], [1.0; 4]).unwrap();
        assert!(approx(out, [0.5; 4]));
        let out = evaluate_blend(&reveal_blend(), [0.5; 4], out).unwrap();
        assert!(approx(out, [0.25; 4]));
    }

    #[test]
    fn resolve_is_source_over() {
        let out = evaluate_blend(&resolve_blend(), [1.0, 0.0, 0.0, 0.75], [0.0, 0.0, 1.0, 1.0])
            .unwrap();
        assert!((out[0] - 0.75).abs() < 1e-6);
        assert!(out[1].abs() < 1e-6);
        assert!((out[2] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn constant_factors_are_not_evaluated() {
        let state = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Constant,
                dst_factor: wgpu::BlendFactor::Zero,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent::REPLACE,
        };
        assert!(evaluate_blend(&state, [1.0; 4], [0.0; 4]).is_none());
    }
}
