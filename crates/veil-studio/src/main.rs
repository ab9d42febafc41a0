//! Veil studio: an opaque backdrop with overlapping transparent panes,
//! composited through the order-independent transparency pass.

use std::rc::Rc;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use winit::window::WindowId;

use veil_engine::bindable::{
    BufferUsage, ConstantBuffer, IndexBuffer, InputLayout, PixelShader, ShaderStage, VertexBuffer,
    VertexElement, VertexShader,
};
use veil_engine::core::{App, AppControl, FrameCtx};
use veil_engine::device::{DeviceInit, RenderContext};
use veil_engine::drawable::Drawable;
use veil_engine::logging::{init_logging, LoggingConfig};
use veil_engine::paint::Color;
use veil_engine::surface::{RenderSurface, SurfaceInit};
use veil_engine::window::{Runtime, RuntimeConfig};

const SCENE_SHADER: &str = r#"
struct Perspective {
    orientation: vec4<f32>,
    center: vec4<f32>,
    scaling: vec4<f32>,
};

struct Model {
    offset: vec4<f32>,
    color: vec4<f32>,
};

@group(0) @binding(0) var<uniform> perspective: Perspective;
@group(1) @binding(1) var<uniform> model: Model;

struct VsOut {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

fn rotate(q: vec4<f32>, v: vec3<f32>) -> vec3<f32> {
    let t = 2.0 * cross(q.xyz, v);
    return v + q.w * t + cross(q.xyz, t);
}

@vertex
fn vs_main(@location(0) pos: vec3<f32>) -> VsOut {
    let world = pos + model.offset.xyz;
    let view = rotate(perspective.orientation, world - perspective.center.xyz);
    var out: VsOut;
    out.position = vec4<f32>(
        view.xy * 2.0 * perspective.scaling.xy,
        clamp(0.5 - view.z * 0.05, 0.0, 1.0),
        1.0,
    );
    out.color = model.color;
    return out;
}

@fragment
fn fs_opaque(in: VsOut) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color.rgb, 1.0);
}

struct OitOut {
    @location(0) accum: vec4<f32>,
    @location(1) reveal: vec4<f32>,
};

@fragment
fn fs_oit(in: VsOut) -> OitOut {
    let a = in.color.a;
    let depth = in.position.z;
    let weight = clamp(a * 3.0e3 * pow(1.0 - depth * 0.9, 3.0), 1.0e-2, 3.0e3);
    var out: OitOut;
    out.accum = vec4<f32>(in.color.rgb * a, a) * weight;
    out.reveal = vec4<f32>(a);
    return out;
}
"#;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Model {
    offset: [f32; 4],
    color: [f32; 4],
}

/// Square of side `2 * half` in the xy plane, at depth `z`.
fn square(half: f32, z: f32) -> [[f32; 3]; 4] {
    [[-half, -half, z], [half, -half, z], [-half, half, z], [half, half, z]]
}

fn pane(ctx: &RenderContext, half: f32, model: Model, transparent: bool) -> Result<Drawable> {
    let vs = VertexShader::from_wgsl(ctx, SCENE_SHADER, "vs_main");
    let ps = PixelShader::from_wgsl(ctx, SCENE_SHADER, if transparent { "fs_oit" } else { "fs_opaque" });
    let layout = InputLayout::new(
        ctx,
        &vs,
        &[VertexElement::new("Position", wgpu::VertexFormat::Float32x3)],
    )?;

    let drawable = Drawable::builder()
        .bind(VertexBuffer::new(ctx, &square(half, 0.0), BufferUsage::Static)?)
        .bind(vs)
        .bind(ps)
        .bind(layout)
        .bind(ConstantBuffer::new(ctx, &model, ShaderStage::Vertex)?)
        .index_buffer(IndexBuffer::new(ctx, &[0, 1, 2, 2, 1, 3], BufferUsage::Static))
        .transparent(transparent)
        .build()?;
    Ok(drawable)
}

struct Pane {
    drawable: Drawable,
    model: Model,
    phase: f32,
}

#[derive(Default)]
struct Studio {
    backdrop: Option<Drawable>,
    panes: Vec<Pane>,
    angle: f32,
    elapsed: f32,
}

impl Studio {
    fn build_scene(&mut self, ctx: &RenderContext) -> Result<()> {
        let backdrop = Model {
            offset: [0.0, 0.0, -4.0, 0.0],
            color: [0.08, 0.12, 0.18, 1.0],
        };
        self.backdrop = Some(pane(ctx, 4.0, backdrop, false).context("failed to build backdrop")?);

        let colors = [
            [0.95, 0.25, 0.2, 0.55],
            [0.2, 0.85, 0.35, 0.45],
            [0.25, 0.4, 0.95, 0.5],
        ];
        for (i, color) in colors.into_iter().enumerate() {
            let model = Model {
                offset: [0.0, 0.0, i as f32 - 1.0, 0.0],
                color,
            };
            let drawable = pane(ctx, 1.2, model, true).context("failed to build pane")?;
            self.panes.push(Pane {
                drawable,
                model,
                phase: i as f32 * std::f32::consts::TAU / 3.0,
            });
        }

        log::info!("scene ready: 1 backdrop, {} transparent panes", self.panes.len());
        Ok(())
    }

    fn draw(&mut self, frame: &mut FrameCtx<'_, '_>) -> veil_engine::Result<()> {
        self.elapsed += frame.dt();
        self.angle = (self.angle + frame.dt() * 0.4) % std::f32::consts::TAU;

        let surface = &mut *frame.surface;
        surface.set_observer(Quat::from_rotation_y(self.angle.sin() * 0.6));
        surface.clear_buffer(Color::from_u8(12, 14, 20, 255), true);

        let ctx = frame.context.as_ref();
        if let Some(backdrop) = &self.backdrop {
            backdrop.draw(ctx)?;
        }

        for pane in &mut self.panes {
            let t = self.elapsed + pane.phase;
            pane.model.offset[0] = t.cos() * 0.8;
            pane.model.offset[1] = t.sin() * 0.5;
            pane.drawable.update_constants(&pane.model)?;
            pane.drawable.draw(ctx)?;
        }
        Ok(())
    }
}

impl App for Studio {
    fn on_surface_created(
        &mut self,
        _window_id: WindowId,
        context: &Rc<RenderContext>,
        surface: &mut RenderSurface<'_>,
    ) -> AppControl {
        surface.set_center(Vec3::ZERO);
        surface.set_scale(160.0);

        let ready = surface
            .enable_transparency()
            .context("failed to enable transparency")
            .and_then(|()| self.build_scene(context));
        match ready {
            Ok(()) => AppControl::Continue,
            Err(e) => {
                log::error!("{e:#}");
                AppControl::Exit
            }
        }
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if let Err(e) = self.draw(ctx) {
            log::error!("draw failed: {e}");
            return AppControl::Exit;
        }
        AppControl::Continue
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default().with_target("veil_studio", log::LevelFilter::Debug));

    let config = RuntimeConfig {
        title: "Veil Studio".to_string(),
        ..Default::default()
    };

    Runtime::run(config, DeviceInit::default(), SurfaceInit::default(), Studio::default())
}
