//! Render surfaces.
//!
//! A [`RenderSurface`] owns a swap target (a window swap chain or an
//! offscreen texture), its depth buffer, the observer perspective and,
//! optionally, the OIT targets. Draws issued through the context while a
//! surface is the current render target are queued on that surface and
//! encoded, resolved and presented by [`RenderSurface::push_frame`].

mod capture;
mod init;
mod oit;
mod overlay;
mod perspective;
mod target;

use std::cell::Cell;
use std::rc::Rc;

use glam::{Quat, Vec2, Vec3};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::bindable::slots::{PERSPECTIVE_BINDING, PERSPECTIVE_GROUP, RESOURCE_GROUP};
use crate::bindable::DepthMode;
use crate::device::{
    split_passes, DrawCall, FrameCommand, PassKind, PipelineState, RenderContext, ResourceKind,
    ResourceToken, SurfaceId, TargetFormats,
};
use crate::error::RenderError;
use crate::image::Image;
use crate::paint::Color;
use crate::Result;

pub use capture::CaptureStage;
pub use init::SurfaceInit;
pub use oit::{accumulate_all, OitSample, RESOLVE_EPSILON};
pub use overlay::Overlay;
pub use perspective::{Perspective, PerspectiveUniform, DEFAULT_SCALE};

use capture::{channel_order, PendingCapture};
use oit::{OitBlock, ACCUM_CLEAR, REVEAL_CLEAR};
use target::{AcquiredFrame, DepthTarget, SwapTarget};

/// Lifecycle of a surface's back-buffer and depth views.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceState {
    /// Constructed but not yet addressed as a target, or minimized.
    Unbound,
    /// Views are sized and valid; draws may target the surface.
    Bound,
}

/// One presentable render target with depth, perspective and optional OIT.
pub struct RenderSurface<'w> {
    ctx: Rc<RenderContext>,
    id: SurfaceId,
    token: ResourceToken,

    target: SwapTarget<'w>,
    depth: DepthTarget,
    width: u32,
    height: u32,
    /// Set once the surface was made a render target or sized by a resize.
    addressed: Cell<bool>,

    perspective: Perspective,
    perspective_buffer: wgpu::Buffer,
    perspective_group: wgpu::BindGroup,

    oit: Option<OitBlock>,
    /// Depth and OIT targets were (re)created and still hold undefined data.
    fresh: bool,

    overlay: Option<Box<dyn Overlay + 'w>>,
    capture: Option<CaptureStage>,
    captured: Option<Image>,
}

impl<'w> RenderSurface<'w> {
    /// Creates a surface presenting to `window`.
    pub fn for_window(ctx: &Rc<RenderContext>, window: &'w Window, init: &SurfaceInit) -> Result<Self> {
        ctx.check_device()?;
        let size = window.inner_size();
        let target = SwapTarget::window(ctx, window, init)?;
        Ok(Self::assemble(ctx, target, size.width, size.height))
    }

    /// Creates a surface rendering into an offscreen texture of
    /// `init.offscreen_size`.
    pub fn offscreen(ctx: &Rc<RenderContext>, init: &SurfaceInit) -> Result<Self> {
        ctx.check_device()?;
        let (width, height) = init.offscreen_size;
        check_dimensions(ctx, width, height)?;
        if channel_order(init.offscreen_format).is_none() {
            return Err(RenderError::Unsupported("offscreen formats other than 8-bit RGBA/BGRA"));
        }
        let target = SwapTarget::offscreen(ctx, width, height, init.offscreen_format);
        Ok(Self::assemble(ctx, target, width, height))
    }

    fn assemble(ctx: &Rc<RenderContext>, target: SwapTarget<'w>, width: u32, height: u32) -> Self {
        let perspective = Perspective::new(width, height);
        let perspective_buffer = ctx.device().create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("veil perspective block"),
            contents: bytemuck::bytes_of(&perspective.uniform()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let perspective_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("veil perspective bind group"),
            layout: ctx.perspective_layout(),
            entries: &[wgpu::BindGroupEntry {
                binding: PERSPECTIVE_BINDING,
                resource: perspective_buffer.as_entire_binding(),
            }],
        });

        let id = ctx.register_surface();
        log::debug!("created surface {id:?} {width}x{height} {:?}", target.format());

        Self {
            ctx: Rc::clone(ctx),
            id,
            token: ctx.tracker().acquire(ResourceKind::RenderTarget),
            depth: DepthTarget::new(ctx, width, height),
            target,
            width,
            height,
            addressed: Cell::new(false),
            perspective,
            perspective_buffer,
            perspective_group,
            oit: None,
            fresh: true,
            overlay: None,
            capture: None,
            captured: None,
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn context(&self) -> &Rc<RenderContext> {
        &self.ctx
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.target.format()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// `Bound` once the surface has been addressed as a target and while its
    /// dimensions are non-zero. Independent of which surface is current.
    pub fn state(&self) -> SurfaceState {
        if self.addressed.get() && self.width > 0 && self.height > 0 {
            SurfaceState::Bound
        } else {
            SurfaceState::Unbound
        }
    }

    /// Makes this surface the context's current render target. Idempotent.
    pub fn set_render_target(&self) -> Result<()> {
        self.ctx.check_device()?;
        self.addressed.set(true);
        if self.ctx.make_current(self.id) != Some(self.id) {
            log::debug!("surface {:?} is now the render target", self.id);
        }
        Ok(())
    }

    pub fn is_render_target(&self) -> bool {
        self.ctx.current_target() == Some(self.id)
    }

    /// Applies a new pixel size.
    ///
    /// Zero dimensions only record the size; everything else waits for the
    /// next non-zero resize. A failure to reallocate the OIT targets is
    /// logged and leaves transparency enabled but without targets.
    pub fn set_window_dimensions(&mut self, width: u32, height: u32) -> Result<()> {
        self.ctx.check_device()?;
        if width == 0 || height == 0 {
            self.width = width;
            self.height = height;
            log::debug!("surface {:?} minimized", self.id);
            return Ok(());
        }
        check_dimensions(&self.ctx, width, height)?;
        self.width = width;
        self.height = height;
        self.addressed.set(true);

        self.target.resize(&self.ctx, width, height);
        self.depth = DepthTarget::new(&self.ctx, width, height);
        self.perspective.set_dimensions(width, height);
        self.write_perspective();

        if let Some(oit) = self.oit.as_mut() {
            if let Err(e) = oit.allocate(&self.ctx, width, height) {
                log::warn!("OIT targets unavailable after resize: {e}");
            }
        }
        self.fresh = true;
        log::debug!("surface {:?} resized to {width}x{height}", self.id);
        Ok(())
    }

    // ── transparency ──────────────────────────────────────────────────────

    /// Allocates the OIT block. No-op if already enabled.
    pub fn enable_transparency(&mut self) -> Result<()> {
        self.ctx.check_device()?;
        if self.oit.is_some() {
            return Ok(());
        }
        let block = OitBlock::new(&self.ctx, self.width, self.height)?;
        self.oit = Some(block);
        self.ctx.set_transparency(self.id, true);
        self.fresh = true;
        log::debug!("surface {:?} transparency enabled", self.id);
        Ok(())
    }

    /// Frees the OIT block. No-op if already disabled.
    pub fn disable_transparency(&mut self) {
        if self.oit.take().is_some() {
            self.ctx.set_transparency(self.id, false);
            log::debug!("surface {:?} transparency disabled", self.id);
        }
    }

    pub fn is_transparency_enabled(&self) -> bool {
        self.oit.is_some()
    }

    // ── clears ────────────────────────────────────────────────────────────

    /// Clears the color target to `color`; with `all`, also depth to 1.0
    /// and the OIT targets to their initial values.
    pub fn clear_buffer(&self, color: Color, all: bool) {
        self.ctx.push_command(self.id, FrameCommand::Clear { color, all });
    }

    pub fn clear_depth_buffer(&self) {
        self.ctx.push_command(self.id, FrameCommand::ClearDepth);
    }

    /// Resets accumulation to zero and reveal to one. No-op without OIT.
    pub fn clear_transparency_buffers(&self) {
        if self.oit.is_some() {
            self.ctx.push_command(self.id, FrameCommand::ClearTransparency);
        }
    }

    // ── perspective ───────────────────────────────────────────────────────

    pub fn perspective(&self) -> &Perspective {
        &self.perspective
    }

    /// Sets the observer orientation. `q` is normalized.
    pub fn set_observer(&mut self, q: Quat) {
        self.perspective.orientation = q.normalize();
        self.write_perspective();
    }

    pub fn observer(&self) -> Quat {
        self.perspective.orientation
    }

    pub fn set_center(&mut self, center: Vec3) {
        self.perspective.center = center;
        self.write_perspective();
    }

    pub fn center(&self) -> Vec3 {
        self.perspective.center
    }

    /// Sets pixels per world unit. Non-positive or non-finite values are ignored.
    pub fn set_scale(&mut self, scale: f32) {
        if !(scale.is_finite() && scale > 0.0) {
            log::warn!("ignoring invalid surface scale {scale}");
            return;
        }
        self.perspective.scale = scale;
        self.write_perspective();
    }

    pub fn scale(&self) -> f32 {
        self.perspective.scale
    }

    pub fn pixel_to_world(&self, pixel: Vec2) -> Vec3 {
        self.perspective.pixel_to_world(pixel)
    }

    fn write_perspective(&self) {
        self.ctx.queue().write_buffer(
            &self.perspective_buffer,
            0,
            bytemuck::bytes_of(&self.perspective.uniform()),
        );
    }

    // ── overlay & capture ─────────────────────────────────────────────────

    /// Binds the overlay rendered on top of every pushed frame.
    pub fn bind_overlay(&mut self, overlay: Box<dyn Overlay + 'w>) {
        self.overlay = Some(overlay);
    }

    pub fn take_overlay(&mut self) -> Option<Box<dyn Overlay + 'w>> {
        self.overlay.take()
    }

    /// Captures the next pushed frame at `stage`.
    pub fn schedule_capture(&mut self, stage: CaptureStage) -> Result<()> {
        if !self.target.supports_capture() || channel_order(self.format()).is_none() {
            return Err(RenderError::Unsupported("frame capture on this surface"));
        }
        self.capture = Some(stage);
        Ok(())
    }

    /// The most recent capture, if one completed.
    pub fn take_capture(&mut self) -> Option<Image> {
        self.captured.take()
    }

    // ── frame ─────────────────────────────────────────────────────────────

    /// Encodes the queued clears and draws, resolves OIT, renders the
    /// overlay, submits and presents.
    ///
    /// The surface is the current render target for the duration of the
    /// call; the previous target is restored afterwards.
    pub fn push_frame(&mut self) -> Result<()> {
        self.ctx.check_device()?;
        let previous = self.ctx.make_current(self.id);
        let result = self.present_frame();
        self.ctx.restore_current(previous);
        self.ctx.purge_pipelines();
        result?;
        self.ctx.check_device()
    }

    fn present_frame(&mut self) -> Result<()> {
        let commands = self.ctx.take_commands(self.id);
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }
        let Some(frame) = self.target.acquire(&self.ctx)? else {
            return Ok(());
        };

        let device = self.ctx.device();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("veil frame encoder"),
        });

        if std::mem::take(&mut self.fresh) {
            self.encode_initial_clear(&mut encoder);
        }

        for (kind, run) in split_passes(&commands) {
            match kind {
                PassKind::Clear => {
                    for command in run {
                        self.encode_clear(&mut encoder, &frame, command);
                    }
                }
                PassKind::Opaque => self.encode_opaque(&mut encoder, &frame, run),
                PassKind::Oit => self.encode_oit(&mut encoder, run),
            }
        }

        if self.oit.is_some() {
            self.encode_resolve(&mut encoder, &frame)?;
        }

        let order = channel_order(self.format());
        let mut pending = None;
        if let (Some(CaptureStage::BeforeOverlay), Some(order)) = (self.capture, order) {
            pending = Some(PendingCapture::record(device, &mut encoder, &frame.texture, order));
        }

        if let Some(overlay) = self.overlay.as_mut() {
            overlay.begin_frame();
            overlay.render(device, self.ctx.queue(), &mut encoder, &frame.view);
            overlay.end_frame();
        }

        if let (Some(CaptureStage::AfterOverlay), Some(order)) = (self.capture, order) {
            pending = Some(PendingCapture::record(device, &mut encoder, &frame.texture, order));
        }

        self.ctx.queue().submit(std::iter::once(encoder.finish()));

        if let Some(pending) = pending {
            self.capture = None;
            self.captured = Some(pending.finish(device)?);
        }

        frame.present();
        Ok(())
    }

    fn encode_initial_clear(&self, encoder: &mut wgpu::CommandEncoder) {
        depth_pass(encoder, &self.depth.view, wgpu::LoadOp::Clear(1.0));
        if let Some((accum, reveal)) = self.oit.as_ref().and_then(OitBlock::views) {
            oit_clear_pass(encoder, accum, reveal);
        }
    }

    fn encode_clear(&self, encoder: &mut wgpu::CommandEncoder, frame: &AcquiredFrame, command: &FrameCommand) {
        let oit_views = self.oit.as_ref().and_then(OitBlock::views);
        match command {
            FrameCommand::Clear { color, all } => {
                let depth = all.then(|| wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("veil clear pass"),
                    color_attachments: &[Some(color_attachment(
                        &frame.view,
                        wgpu::LoadOp::Clear((*color).into()),
                    ))],
                    depth_stencil_attachment: depth,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                    multiview_mask: None,
                });
                if let (true, Some((accum, reveal))) = (*all, oit_views) {
                    oit_clear_pass(encoder, accum, reveal);
                }
            }
            FrameCommand::ClearDepth => depth_pass(encoder, &self.depth.view, wgpu::LoadOp::Clear(1.0)),
            FrameCommand::ClearTransparency => {
                if let Some((accum, reveal)) = oit_views {
                    oit_clear_pass(encoder, accum, reveal);
                }
            }
            FrameCommand::Draw(_) => {}
        }
    }

    fn encode_opaque(&self, encoder: &mut wgpu::CommandEncoder, frame: &AcquiredFrame, run: &[FrameCommand]) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("veil scene pass"),
            color_attachments: &[Some(color_attachment(&frame.view, wgpu::LoadOp::Load))],
            depth_stencil_attachment: Some(load_depth(&self.depth.view)),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        let targets = TargetFormats::Color(self.format());
        for draw in draws(run) {
            self.encode_draw(&mut pass, &draw.state, draw.count, draw.state.depth, targets);
        }
    }

    fn encode_oit(&self, encoder: &mut wgpu::CommandEncoder, run: &[FrameCommand]) {
        let Some(oit) = self.oit.as_ref() else {
            return;
        };
        let Some((accum, reveal)) = oit.views() else {
            log::warn!("skipping {} OIT draws: targets not allocated", run.len());
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("veil oit accumulation pass"),
            color_attachments: &[
                Some(color_attachment(accum, wgpu::LoadOp::Load)),
                Some(color_attachment(reveal, wgpu::LoadOp::Load)),
            ],
            depth_stencil_attachment: Some(load_depth(&self.depth.view)),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        for draw in draws(run) {
            self.encode_draw(&mut pass, &draw.state, draw.count, oit.depth_mode(), TargetFormats::Oit);
        }
    }

    fn encode_resolve(&self, encoder: &mut wgpu::CommandEncoder, frame: &AcquiredFrame) -> Result<()> {
        let Some(oit) = self.oit.as_ref() else {
            return Ok(());
        };
        let Some((state, count)) = oit.resolve_state(&self.ctx)? else {
            return Ok(());
        };
        let Some(pipeline) = self.ctx.pipeline(&state, None, TargetFormats::Color(self.format())) else {
            return Ok(());
        };
        let resources = self.ctx.resource_bind_group(&state);
        let Some(index) = state.index_buffer.as_ref() else {
            return Ok(());
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("veil oit resolve pass"),
            color_attachments: &[Some(color_attachment(&frame.view, wgpu::LoadOp::Load))],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(PERSPECTIVE_GROUP, &self.perspective_group, &[]);
        pass.set_bind_group(RESOURCE_GROUP, &resources, &[]);
        set_vertex_buffers(&mut pass, &state);
        pass.set_index_buffer(index.buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..count, 0, 0..1);
        Ok(())
    }

    fn encode_draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        state: &PipelineState,
        count: u32,
        depth: DepthMode,
        targets: TargetFormats,
    ) {
        let Some(index) = state.index_buffer.as_ref() else {
            return;
        };
        if !has_geometry(state, count) {
            log::trace!("skipping draw without geometry");
            return;
        }
        let Some(pipeline) = self.ctx.pipeline(state, Some(depth), targets) else {
            return;
        };
        let resources = self.ctx.resource_bind_group(state);

        pass.set_pipeline(&pipeline);
        pass.set_bind_group(PERSPECTIVE_GROUP, &self.perspective_group, &[]);
        pass.set_bind_group(RESOURCE_GROUP, &resources, &[]);
        set_vertex_buffers(pass, state);
        pass.set_index_buffer(index.buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..count, 0, 0..1);
    }
}

impl Drop for RenderSurface<'_> {
    fn drop(&mut self) {
        self.disable_transparency();
        self.ctx.unregister_surface(self.id);
        log::debug!("dropped surface {:?} ({})", self.id, self.token.id());
    }
}

fn check_dimensions(ctx: &RenderContext, width: u32, height: u32) -> Result<()> {
    let max = ctx.limits().max_texture_dimension_2d;
    if width > max || height > max {
        return Err(RenderError::backend(
            "size render surface",
            format!("{width}x{height} exceeds the device limit of {max}"),
        ));
    }
    if width == 0 || height == 0 {
        return Err(crate::UsageError::ZeroDimensions.into());
    }
    Ok(())
}

fn draws(run: &[FrameCommand]) -> impl Iterator<Item = &DrawCall> {
    run.iter().filter_map(|c| match c {
        FrameCommand::Draw(d) => Some(d),
        _ => None,
    })
}

/// Whether the draw has elements and every buffer it reads is non-empty.
/// wgpu rejects slices of zero-sized buffers.
fn has_geometry(state: &PipelineState, count: u32) -> bool {
    let streams = state.input_layout.as_ref().map_or(0, |l| l.slots.len());
    count > 0
        && state.index_buffer.as_ref().is_some_and(|b| b.buffer.size() > 0)
        && state
            .vertex_buffers
            .iter()
            .take(streams)
            .flatten()
            .all(|b| b.buffer.size() > 0)
}

fn set_vertex_buffers(pass: &mut wgpu::RenderPass<'_>, state: &PipelineState) {
    let streams = state.input_layout.as_ref().map_or(0, |l| l.slots.len());
    for (slot, binding) in state.vertex_buffers.iter().take(streams).enumerate() {
        if let Some(b) = binding {
            pass.set_vertex_buffer(slot as u32, b.buffer.slice(..));
        }
    }
}

fn color_attachment(
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPassColorAttachment<'_> {
    wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load,
            store: wgpu::StoreOp::Store,
        },
        depth_slice: None,
    }
}

fn load_depth(view: &wgpu::TextureView) -> wgpu::RenderPassDepthStencilAttachment<'_> {
    wgpu::RenderPassDepthStencilAttachment {
        view,
        depth_ops: Some(wgpu::Operations {
            load: wgpu::LoadOp::Load,
            store: wgpu::StoreOp::Store,
        }),
        stencil_ops: None,
    }
}

fn depth_pass(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, load: wgpu::LoadOp<f32>) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("veil depth clear pass"),
        color_attachments: &[],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
}

fn oit_clear_pass(encoder: &mut wgpu::CommandEncoder, accum: &wgpu::TextureView, reveal: &wgpu::TextureView) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("veil oit clear pass"),
        color_attachments: &[
            Some(color_attachment(accum, wgpu::LoadOp::Clear(ACCUM_CLEAR))),
            Some(color_attachment(reveal, wgpu::LoadOp::Clear(REVEAL_CLEAR))),
        ],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
}

#[cfg(test)]
mod tests;
