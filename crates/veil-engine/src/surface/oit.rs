//! Weighted blended order-independent transparency.
//!
//! Transparent draws go into two off-screen targets instead of the back
//! buffer. The accumulation target sums premultiplied, weighted color and
//! alpha; the reveal target keeps the running product of `1 - alpha`. A
//! full-screen resolve pass then composites `accum.rgb / accum.a` with
//! coverage `1 - reveal` over the opaque frame. Because both blends are
//! commutative the result does not depend on draw order.

use bytemuck::{Pod, Zeroable};

use crate::bindable::{
    accumulation_blend, resolve_blend, reveal_blend, slots, AddressMode, Bindable, BlendMode,
    Blender, BufferUsage, DepthMode, DepthStencil, Filter, IndexBuffer, InputLayout, PixelShader,
    Rasterizer, RasterizerDesc, Sampler, Topology, VertexBuffer, VertexElement, VertexShader,
};
use crate::device::{
    PipelineState, RenderContext, ResourceKind, ResourceToken, TextureBinding, ACCUM_FORMAT,
    REVEAL_FORMAT,
};
use crate::error::RenderError;
use crate::Result;

const RESOLVE_SHADER: &str = include_str!("shaders/oit_resolve.wgsl");

/// Lower bound of the accumulated alpha the resolve divides by.
pub const RESOLVE_EPSILON: f32 = 1e-5;

pub(crate) const ACCUM_CLEAR: wgpu::Color = wgpu::Color::TRANSPARENT;
/// Full visibility on every channel; only `r` is stored by the reveal target.
pub(crate) const REVEAL_CLEAR: wgpu::Color = wgpu::Color::WHITE;

/// Sums of one pixel's OIT targets.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OitSample {
    pub accum: [f32; 4],
    pub reveal: f32,
}

impl Default for OitSample {
    fn default() -> Self {
        Self {
            accum: [0.0; 4],
            reveal: 1.0,
        }
    }
}

impl OitSample {
    /// Adds one transparent fragment, premultiplied and weighted.
    pub fn accumulate(self, fragment: [f32; 4]) -> Self {
        let accum = blend(&accumulation_blend(), fragment, self.accum);
        let reveal = blend(&reveal_blend(), [fragment[3]; 4], [self.reveal; 4])[0];
        Self { accum, reveal }
    }

    /// Output of the resolve shader for this pixel.
    pub fn resolve(self) -> [f32; 4] {
        let [r, g, b, a] = self.accum;
        let a = a.max(RESOLVE_EPSILON);
        [r / a, g / a, b / a, 1.0 - self.reveal]
    }

    /// Resolved layer blended over the opaque color `dst`.
    pub fn composite(self, dst: [f32; 4]) -> [f32; 4] {
        blend(&resolve_blend(), self.resolve(), dst)
    }
}

/// Accumulates `fragments` in order, starting from cleared targets.
pub fn accumulate_all(fragments: &[[f32; 4]]) -> OitSample {
    fragments
        .iter()
        .fold(OitSample::default(), |s, f| s.accumulate(*f))
}

fn blend(state: &wgpu::BlendState, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    // Only plain factors are configured, so the evaluation always succeeds.
    crate::bindable::evaluate_blend(state, src, dst).unwrap_or(dst)
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct QuadVertex {
    pos: [f32; 2],
    uv: [f32; 2],
}

/// Triangle strip covering clip space.
const FULL_SCREEN_QUAD: [QuadVertex; 4] = [
    QuadVertex {
        pos: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        pos: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        pos: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        pos: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
];

const ACCUM_SLOT: u32 = 0;
const REVEAL_SLOT: u32 = 1;

/// Units of the resolve pass, bound in this order.
struct ResolveSet {
    vertices: VertexBuffer,
    indices: IndexBuffer,
    vertex_shader: VertexShader,
    pixel_shader: PixelShader,
    layout: InputLayout,
    topology: Topology,
    rasterizer: Rasterizer,
    sampler: Sampler,
    blender: Blender,
}

impl ResolveSet {
    fn new(ctx: &RenderContext) -> Result<Self> {
        let vertex_shader = VertexShader::from_wgsl(ctx, RESOLVE_SHADER, "vs_main");
        let layout = InputLayout::new(
            ctx,
            &vertex_shader,
            &[
                VertexElement::new("Position", wgpu::VertexFormat::Float32x2),
                VertexElement::new("TexCoord", wgpu::VertexFormat::Float32x2),
            ],
        )?;
        Ok(Self {
            vertices: VertexBuffer::new(ctx, &FULL_SCREEN_QUAD, BufferUsage::Static)?,
            indices: IndexBuffer::new(ctx, &[0, 1, 2, 3], BufferUsage::Static),
            pixel_shader: PixelShader::from_wgsl(ctx, RESOLVE_SHADER, "fs_main"),
            vertex_shader,
            layout,
            topology: Topology::new(ctx, wgpu::PrimitiveTopology::TriangleStrip),
            rasterizer: Rasterizer::new(ctx, RasterizerDesc::DOUBLE_SIDED)?,
            sampler: Sampler::new(ctx, Filter::Point, AddressMode::Clamp, 0)?,
            blender: Blender::new(ctx, BlendMode::OitResolve),
        })
    }

    fn units(&self) -> [&dyn Bindable; 9] {
        [
            &self.vertices,
            &self.indices,
            &self.vertex_shader,
            &self.pixel_shader,
            &self.layout,
            &self.topology,
            &self.rasterizer,
            &self.sampler,
            &self.blender,
        ]
    }

    fn index_count(&self) -> u32 {
        self.indices.len()
    }
}

struct Target {
    token: ResourceToken,
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Target {
    fn new(ctx: &RenderContext, label: &'static str, format: wgpu::TextureFormat, w: u32, h: u32) -> Self {
        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            token: ctx.tracker().acquire(ResourceKind::RenderTarget),
            _texture: texture,
            view,
        }
    }

    fn binding(&self) -> TextureBinding {
        TextureBinding {
            id: self.token.id(),
            view: self.view.clone(),
            dimension: wgpu::TextureViewDimension::D2,
        }
    }
}

/// OIT state of one render surface.
pub(crate) struct OitBlock {
    accum: Option<Target>,
    reveal: Option<Target>,
    read_only: DepthStencil,
    resolve: ResolveSet,
}

impl OitBlock {
    /// Creates the resolve set and, for non-zero sizes, the targets.
    pub fn new(ctx: &RenderContext, width: u32, height: u32) -> Result<Self> {
        let mut block = Self {
            accum: None,
            reveal: None,
            read_only: DepthStencil::new(ctx, DepthMode::ReadOnly),
            resolve: ResolveSet::new(ctx)?,
        };
        if width > 0 && height > 0 {
            block.allocate(ctx, width, height)?;
        }
        Ok(block)
    }

    /// (Re)creates both targets at `width` x `height`.
    ///
    /// On failure the block is left without targets and OIT draws are
    /// skipped until the next successful allocation.
    pub fn allocate(&mut self, ctx: &RenderContext, width: u32, height: u32) -> Result<()> {
        self.accum = None;
        self.reveal = None;

        let max = ctx.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::backend(
                "allocate OIT targets",
                format!("{width}x{height} is outside 1..={max}"),
            ));
        }

        self.accum = Some(Target::new(ctx, "veil oit accumulation", ACCUM_FORMAT, width, height));
        self.reveal = Some(Target::new(ctx, "veil oit reveal", REVEAL_FORMAT, width, height));
        log::debug!("allocated OIT targets {width}x{height}");
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        self.accum.is_some() && self.reveal.is_some()
    }

    /// Accumulation and reveal views, if allocated.
    pub fn views(&self) -> Option<(&wgpu::TextureView, &wgpu::TextureView)> {
        Some((&self.accum.as_ref()?.view, &self.reveal.as_ref()?.view))
    }

    /// Depth mode every OIT draw uses.
    pub fn depth_mode(&self) -> DepthMode {
        self.read_only.mode()
    }

    /// Binds the resolve units into a fresh pipeline state and returns it
    /// with the index count to draw. The caller's bound state is untouched.
    pub fn resolve_state(&self, ctx: &RenderContext) -> Result<Option<(PipelineState, u32)>> {
        let (Some(accum), Some(reveal)) = (&self.accum, &self.reveal) else {
            return Ok(None);
        };

        let saved = std::mem::take(&mut *ctx.state_mut());
        let bound = self.resolve.units().iter().try_for_each(|u| u.bind(ctx));
        let mut state = std::mem::replace(&mut *ctx.state_mut(), saved);
        bound?;

        state.textures[ACCUM_SLOT as usize] = Some(accum.binding());
        state.textures[REVEAL_SLOT as usize] = Some(reveal.binding());
        state.validate_indexed(self.resolve.index_count())?;
        Ok(Some((state, self.resolve.index_count())))
    }
}

// Bindings the resolve shader declares.
const _: () = {
    assert!(slots::texture_binding(ACCUM_SLOT) == 8);
    assert!(slots::texture_binding(REVEAL_SLOT) == 9);
    assert!(slots::sampler_binding(0) == 12);
};

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 4], b: [f32; 4]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn no_fragments_leave_the_background_unchanged() {
        let bg = [0.2, 0.4, 0.6, 1.0];
        let out = accumulate_all(&[]).composite(bg);
        assert!(close(out, bg));
    }

    #[test]
    fn result_is_independent_of_draw_order() {
        let a = [0.4, 0.0, 0.0, 0.4];
        let b = [0.0, 0.3, 0.0, 0.6];
        let c = [0.0, 0.0, 0.1, 0.2];
        let bg = [0.0, 0.0, 0.0, 1.0];

        let abc = accumulate_all(&[a, b, c]).composite(bg);
        let cab = accumulate_all(&[c, a, b]).composite(bg);
        let bca = accumulate_all(&[b, c, a]).composite(bg);
        assert!(close(abc, cab));
        assert!(close(abc, bca));
    }

    #[test]
    fn two_half_transparent_reds_over_black() {
        let red = [0.5, 0.0, 0.0, 0.5];
        let sample = accumulate_all(&[red, red]);
        assert!(close(sample.accum, [1.0, 0.0, 0.0, 1.0]));
        assert!((sample.reveal - 0.25).abs() < 1e-6);

        let out = sample.composite([0.0, 0.0, 0.0, 1.0]);
        assert!((out[0] - 0.75).abs() < 1e-6);
        assert!(out[1].abs() < 1e-6 && out[2].abs() < 1e-6);
    }

    #[test]
    fn opaque_fragment_fully_covers() {
        let out = accumulate_all(&[[0.0, 1.0, 0.0, 1.0]]).composite([1.0, 0.0, 0.0, 1.0]);
        assert!(close(out, [0.0, 1.0, 0.0, 1.0]));
    }

    #[test]
    fn resolve_guards_against_zero_alpha() {
        let s = OitSample {
            accum: [0.0; 4],
            reveal: 1.0,
        };
        assert!(s.resolve().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn cleared_targets_match_cpu_defaults() {
        let s = OitSample::default();
        assert_eq!(s.accum, [0.0; 4]);
        assert_eq!(s.reveal as f64, REVEAL_CLEAR.r);
        assert_eq!(
            [REVEAL_CLEAR.r, REVEAL_CLEAR.g, REVEAL_CLEAR.b, REVEAL_CLEAR.a],
            [1.0; 4]
        );
        assert_eq!(ACCUM_CLEAR, wgpu::Color::TRANSPARENT);
    }
}
