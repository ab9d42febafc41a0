//! Offscreen rendering scenarios. Each test returns early when no adapter
//! is available.

use std::rc::Rc;

use super::*;
use crate::bindable::{
    BufferUsage, ConstantBuffer, DepthStencil, IndexBuffer, InputLayout, PixelShader, ShaderStage,
    VertexBuffer, VertexElement, VertexShader,
};
use crate::drawable::{Drawable, DrawableBuilder};
use crate::error::UsageError;

const QUAD_SHADER: &str = r#"
struct Tint {
    color: vec4<f32>,
};

@group(1) @binding(4) var<uniform> tint: Tint;

@vertex
fn vs_main(@location(0) pos: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(pos, 0.0, 1.0);
}

@fragment
fn fs_opaque() -> @location(0) vec4<f32> {
    return tint.color;
}

struct OitOut {
    @location(0) accum: vec4<f32>,
    @location(1) reveal: vec4<f32>,
};

@fragment
fn fs_oit() -> OitOut {
    let c = tint.color;
    var out: OitOut;
    out.accum = vec4<f32>(c.rgb * c.a, c.a);
    out.reveal = vec4<f32>(c.a);
    return out;
}
"#;

const SIZE: u32 = 64;

fn setup() -> Option<(Rc<RenderContext>, RenderSurface<'static>)> {
    let ctx = RenderContext::headless().ok()?;
    let init = SurfaceInit {
        offscreen_size: (SIZE, SIZE),
        ..Default::default()
    };
    let surface = RenderSurface::offscreen(&ctx, &init).ok()?;
    Some((ctx, surface))
}

/// Full-screen quad colored by a pixel constant.
fn quad(ctx: &RenderContext, color: [f32; 4], transparent: bool) -> Drawable {
    let corners = [[-1.0f32, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];
    mesh(ctx, &corners, &[0, 1, 2, 2, 1, 3], color, transparent)
        .build()
        .unwrap()
}

/// Units of a flat-colored mesh, ready for extra units before `build`.
fn mesh(
    ctx: &RenderContext,
    corners: &[[f32; 2]],
    indices: &[u32],
    color: [f32; 4],
    transparent: bool,
) -> DrawableBuilder {
    let vs = VertexShader::from_wgsl(ctx, QUAD_SHADER, "vs_main");
    let ps = PixelShader::from_wgsl(ctx, QUAD_SHADER, if transparent { "fs_oit" } else { "fs_opaque" });
    let layout = InputLayout::new(
        ctx,
        &vs,
        &[VertexElement::new("Position", wgpu::VertexFormat::Float32x2)],
    )
    .unwrap();

    Drawable::builder()
        .bind(VertexBuffer::new(ctx, corners, BufferUsage::Static).unwrap())
        .bind(vs)
        .bind(ps)
        .bind(layout)
        .bind(ConstantBuffer::new(ctx, &color, ShaderStage::Pixel).unwrap())
        .index_buffer(IndexBuffer::new(ctx, indices, BufferUsage::Static))
        .transparent(transparent)
}

fn capture(surface: &mut RenderSurface<'_>) -> Image {
    surface.schedule_capture(CaptureStage::AfterOverlay).unwrap();
    surface.push_frame().unwrap();
    surface.take_capture().expect("capture after push_frame")
}

fn near(a: u8, b: u8) -> bool {
    a.abs_diff(b) <= 2
}

#[test]
fn opaque_quad_fills_the_target() {
    let Some((ctx, mut surface)) = setup() else {
        return;
    };
    surface.set_render_target().unwrap();
    surface.clear_buffer(Color::BLACK, true);
    quad(&ctx, [1.0, 0.0, 0.0, 1.0], false).draw(&ctx).unwrap();

    let image = capture(&mut surface);
    assert_eq!((image.width, image.height), (SIZE, SIZE));
    assert!(image.iter_pixels().all(|p| p == [0, 0, 255, 255]));
}

#[test]
fn two_transparent_quads_resolve_to_three_quarter_red() {
    let Some((ctx, mut surface)) = setup() else {
        return;
    };
    surface.set_render_target().unwrap();
    surface.enable_transparency().unwrap();
    surface.clear_buffer(Color::BLACK, true);

    let half_red = quad(&ctx, [1.0, 0.0, 0.0, 0.5], true);
    half_red.draw(&ctx).unwrap();
    half_red.draw(&ctx).unwrap();

    let image = capture(&mut surface);
    let [b, g, r, _] = image.pixel(SIZE / 2, SIZE / 2).unwrap();
    assert!(near(r, 191), "red was {r}");
    assert!(near(g, 0) && near(b, 0));
}

#[test]
fn enabled_transparency_without_draws_keeps_the_frame() {
    let Some((_ctx, mut surface)) = setup() else {
        return;
    };
    surface.set_render_target().unwrap();
    surface.enable_transparency().unwrap();
    surface.clear_buffer(Color::from_u8(0, 0, 255, 255), true);

    let image = capture(&mut surface);
    assert!(image.iter_pixels().all(|p| p == [255, 0, 0, 255]));
}

#[test]
fn transparent_draw_needs_transparency() {
    let Some((ctx, mut surface)) = setup() else {
        return;
    };
    surface.set_render_target().unwrap();
    let glass = quad(&ctx, [0.0, 1.0, 0.0, 0.5], true);

    let err = glass.draw(&ctx).unwrap_err();
    assert_eq!(err.as_usage(), Some(&UsageError::TransparencyDisabled));

    surface.enable_transparency().unwrap();
    surface.enable_transparency().unwrap();
    assert!(surface.is_transparency_enabled());
    glass.draw(&ctx).unwrap();

    surface.disable_transparency();
    surface.disable_transparency();
    let err = glass.draw(&ctx).unwrap_err();
    assert_eq!(err.as_usage(), Some(&UsageError::TransparencyDisabled));

    surface.enable_transparency().unwrap();
    glass.draw(&ctx).unwrap();
    surface.push_frame().unwrap();
}

#[test]
fn draw_without_render_target_fails() {
    let Some((ctx, surface)) = setup() else {
        return;
    };
    let opaque = quad(&ctx, [1.0; 4], false);
    assert_eq!(surface.state(), SurfaceState::Unbound);

    let err = opaque.draw(&ctx).unwrap_err();
    assert_eq!(err.as_usage(), Some(&UsageError::NoRenderTarget));

    surface.set_render_target().unwrap();
    surface.set_render_target().unwrap();
    assert_eq!(surface.state(), SurfaceState::Bound);
    opaque.draw(&ctx).unwrap();

    drop(surface);
    assert_eq!(ctx.current_target(), None);
}

#[test]
fn resize_is_idempotent_and_zero_is_deferred() {
    let Some((ctx, mut surface)) = setup() else {
        return;
    };
    surface.enable_transparency().unwrap();
    surface.set_render_target().unwrap();
    let red = quad(&ctx, [1.0, 0.0, 0.0, 1.0], false);

    surface.set_window_dimensions(32, 16).unwrap();
    let once = surface.perspective().uniform();
    surface.clear_buffer(Color::BLACK, true);
    red.draw(&ctx).unwrap();
    let first = capture(&mut surface);

    surface.set_window_dimensions(32, 16).unwrap();
    assert_eq!(surface.perspective().uniform(), once);
    surface.clear_buffer(Color::BLACK, true);
    red.draw(&ctx).unwrap();
    let second = capture(&mut surface);
    assert_eq!(first, second);

    assert_eq!(surface.dimensions(), (32, 16));
    assert_eq!(surface.perspective().dimensions(), (32, 16));

    surface.set_window_dimensions(0, 0).unwrap();
    assert_eq!(surface.dimensions(), (0, 0));
    assert_eq!(surface.perspective().dimensions(), (32, 16));
    surface.push_frame().unwrap();

    let too_big = ctx.limits().max_texture_dimension_2d + 1;
    assert!(surface.set_window_dimensions(too_big, 1).is_err());

    surface.set_window_dimensions(32, 16).unwrap();
    surface.clear_buffer(Color::WHITE, true);
    let image = capture(&mut surface);
    assert_eq!((image.width, image.height), (32, 16));
}

#[test]
fn push_frame_restores_previous_target() {
    let Some((ctx, mut a)) = setup() else {
        return;
    };
    let Ok(b) = RenderSurface::offscreen(&ctx, &SurfaceInit::default()) else {
        return;
    };
    b.set_render_target().unwrap();
    a.push_frame().unwrap();
    assert_eq!(ctx.current_target(), Some(b.id()));
}

struct WhiteOverlay;

impl Overlay for WhiteOverlay {
    fn render(
        &mut self,
        _device: &wgpu::Device,
        _queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
    ) {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("white overlay"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
    }
}

#[test]
fn capture_stage_brackets_the_overlay() {
    let Some((_ctx, mut surface)) = setup() else {
        return;
    };
    surface.bind_overlay(Box::new(WhiteOverlay));

    surface.clear_buffer(Color::BLACK, true);
    surface.schedule_capture(CaptureStage::BeforeOverlay).unwrap();
    surface.push_frame().unwrap();
    let before = surface.take_capture().unwrap();
    assert_eq!(before.pixel(0, 0), Some([0, 0, 0, 255]));

    surface.clear_buffer(Color::BLACK, true);
    let after = capture(&mut surface);
    assert_eq!(after.pixel(0, 0), Some([255, 255, 255, 255]));
    assert!(surface.take_capture().is_none());
}

#[test]
fn perspective_setters_keep_scale_positive() {
    let Some((_ctx, mut surface)) = setup() else {
        return;
    };
    assert_eq!(surface.scale(), DEFAULT_SCALE);
    surface.set_scale(-1.0);
    assert_eq!(surface.scale(), DEFAULT_SCALE);
    surface.set_scale(50.0);
    surface.set_center(Vec3::new(1.0, 0.0, 0.0));
    surface.set_observer(Quat::from_rotation_z(0.3) * 2.0);
    assert!((surface.observer().length() - 1.0).abs() < 1e-5);

    let w = surface.pixel_to_world(Vec2::new(SIZE as f32 / 2.0, SIZE as f32 / 2.0));
    assert!((w - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
}

#[test]
fn empty_geometry_is_skipped_at_push() {
    let Some((ctx, mut surface)) = setup() else {
        return;
    };
    let corners = [[-1.0f32, -1.0], [1.0, -1.0], [-1.0, 1.0]];
    let no_indices = mesh(&ctx, &corners, &[], [1.0, 0.0, 0.0, 1.0], false)
        .build()
        .unwrap();
    let no_vertices = mesh(&ctx, &[], &[0, 1, 2], [0.0, 1.0, 0.0, 1.0], false)
        .build()
        .unwrap();
    assert_eq!(no_indices.index_count(), 0);

    surface.set_render_target().unwrap();
    surface.clear_buffer(Color::BLACK, true);
    no_indices.draw(&ctx).unwrap();
    no_vertices.draw(&ctx).unwrap();

    let image = capture(&mut surface);
    assert!(image.iter_pixels().all(|p| p == [0, 0, 0, 255]));
    assert_eq!(ctx.pipeline_count(), 0);
}

#[test]
fn pipeline_cache_stays_bounded_across_rebuilds() {
    let Some((ctx, mut surface)) = setup() else {
        return;
    };
    surface.set_render_target().unwrap();

    for i in 0..20 {
        let q = quad(&ctx, [0.0, 0.0, 1.0, 1.0], false);
        q.draw(&ctx).unwrap();
        surface.push_frame().unwrap();
        assert_eq!(ctx.pipeline_count(), 1, "cycle {i}");
        drop(q);
    }

    surface.push_frame().unwrap();
    assert_eq!(ctx.pipeline_count(), 0);
}

#[test]
fn transparency_toggle_round_trip_restores_allocations() {
    let Some((ctx, mut surface)) = setup() else {
        return;
    };
    surface.set_render_target().unwrap();
    let glass = quad(&ctx, [0.0, 1.0, 0.0, 0.5], true);

    surface.enable_transparency().unwrap();
    let live = ctx.resource_stats().live();
    surface.clear_buffer(Color::BLACK, true);
    glass.draw(&ctx).unwrap();
    let before = capture(&mut surface);

    surface.disable_transparency();
    assert!(ctx.resource_stats().live() < live);
    surface.enable_transparency().unwrap();
    assert_eq!(ctx.resource_stats().live(), live);

    surface.clear_buffer(Color::BLACK, true);
    glass.draw(&ctx).unwrap();
    let after = capture(&mut surface);
    assert_eq!(before, after);
}

#[test]
fn later_opaque_draw_wins() {
    let Some((ctx, mut surface)) = setup() else {
        return;
    };
    let corners = [[-1.0f32, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];
    let layer = |color| {
        mesh(&ctx, &corners, &[0, 1, 2, 2, 1, 3], color, false)
            .bind(DepthStencil::new(&ctx, DepthMode::Always))
            .build()
            .unwrap()
    };
    let red = layer([1.0, 0.0, 0.0, 1.0]);
    let green = layer([0.0, 1.0, 0.0, 1.0]);
    surface.set_render_target().unwrap();

    surface.clear_buffer(Color::BLACK, true);
    red.draw(&ctx).unwrap();
    green.draw(&ctx).unwrap();
    let image = capture(&mut surface);
    assert!(image.iter_pixels().all(|p| p == [0, 255, 0, 255]));

    surface.clear_buffer(Color::BLACK, true);
    green.draw(&ctx).unwrap();
    red.draw(&ctx).unwrap();
    let image = capture(&mut surface);
    assert!(image.iter_pixels().all(|p| p == [0, 0, 255, 255]));
}

#[test]
fn state_follows_views_not_the_current_target() {
    let Some((ctx, mut a)) = setup() else {
        return;
    };
    let Ok(mut b) = RenderSurface::offscreen(&ctx, &SurfaceInit::default()) else {
        return;
    };
    assert_eq!(b.state(), SurfaceState::Unbound);
    b.set_window_dimensions(48, 48).unwrap();
    assert_eq!(b.state(), SurfaceState::Bound);
    assert!(!b.is_render_target());

    a.set_render_target().unwrap();
    assert_eq!(a.state(), SurfaceState::Bound);
    a.set_window_dimensions(0, 0).unwrap();
    assert_eq!(a.state(), SurfaceState::Unbound);
    assert!(a.is_render_target());

    a.set_window_dimensions(SIZE, SIZE).unwrap();
    assert_eq!(a.state(), SurfaceState::Bound);
}
