use winit::window::Window;

use crate::bindable::DEPTH_FORMAT;
use crate::device::RenderContext;
use crate::error::RenderError;
use crate::Result;

use super::capture::channel_order;
use super::SurfaceInit;

/// What to do after a swap chain acquire failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum SurfaceErrorAction {
    /// The surface was reconfigured; skip this frame.
    Reconfigured,
    SkipFrame,
    Fatal,
}

/// Ranks a swap chain format; lower is better. Formats that frame capture
/// can read back come first, then those matching the sRGB preference.
fn format_rank(format: wgpu::TextureFormat, prefer_srgb: bool) -> (bool, bool) {
    (
        channel_order(format).is_none(),
        format.is_srgb() != prefer_srgb,
    )
}

/// Best color format offered by `caps`, or `None` if it offers nothing.
/// Ties keep the adapter's own ordering.
pub(crate) fn pick_color_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    caps.formats
        .iter()
        .copied()
        .min_by_key(|f| format_rank(*f, prefer_srgb))
}

/// The requested composite mode if supported, else `Opaque`, else the first
/// mode the surface offers.
pub(crate) fn pick_composite_alpha(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    let supported = |m: &wgpu::CompositeAlphaMode| caps.alpha_modes.contains(m);
    match requested.filter(supported) {
        Some(mode) => mode,
        None if supported(&wgpu::CompositeAlphaMode::Opaque) => wgpu::CompositeAlphaMode::Opaque,
        None => caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto),
    }
}

pub(crate) fn classify_surface_error(err: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigured,
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
        wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

/// Color target of one frame.
pub(crate) struct AcquiredFrame {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    surface_texture: Option<wgpu::SurfaceTexture>,
}

impl AcquiredFrame {
    pub fn present(self) {
        if let Some(st) = self.surface_texture {
            st.present();
        }
    }
}

/// Where a surface's frames go: a window swap chain or an offscreen texture.
pub(crate) enum SwapTarget<'w> {
    Window {
        surface: wgpu::Surface<'w>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
    },
}

impl<'w> SwapTarget<'w> {
    pub fn window(ctx: &RenderContext, window: &'w Window, init: &SurfaceInit) -> Result<Self> {
        let surface = ctx
            .instance()
            .create_surface(window)
            .map_err(|e| RenderError::backend("create window surface", e))?;

        if !ctx.adapter().is_surface_supported(&surface) {
            return Err(RenderError::Unsupported("presenting to this window"));
        }

        let caps = surface.get_capabilities(ctx.adapter());
        let format = pick_color_format(&caps, init.prefer_srgb)
            .ok_or(RenderError::Unsupported("any surface format"))?;
        let alpha_mode = pick_composite_alpha(&caps, init.alpha_mode);

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if init.allow_capture && caps.usages.contains(wgpu::TextureUsages::COPY_SRC) {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };

        if size.width > 0 && size.height > 0 {
            surface.configure(ctx.device(), &config);
        }
        log::debug!("window surface {format:?} {}x{}", size.width, size.height);

        Ok(Self::Window { surface, config })
    }

    pub fn offscreen(ctx: &RenderContext, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self::Offscreen {
            texture: offscreen_texture(ctx, width, height, format),
        }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        match self {
            Self::Window { config, .. } => config.format,
            Self::Offscreen { texture } => texture.format(),
        }
    }

    pub fn supports_capture(&self) -> bool {
        match self {
            Self::Window { config, .. } => config.usage.contains(wgpu::TextureUsages::COPY_SRC),
            Self::Offscreen { .. } => true,
        }
    }

    /// Resizes to non-zero `width` x `height`.
    pub fn resize(&mut self, ctx: &RenderContext, width: u32, height: u32) {
        match self {
            Self::Window { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(ctx.device(), config);
            }
            Self::Offscreen { texture } => {
                *texture = offscreen_texture(ctx, width, height, texture.format());
            }
        }
    }

    /// Acquires this frame's color target. `Ok(None)` means skip the frame.
    pub fn acquire(&self, ctx: &RenderContext) -> Result<Option<AcquiredFrame>> {
        match self {
            Self::Offscreen { texture } => Ok(Some(AcquiredFrame {
                texture: texture.clone(),
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                surface_texture: None,
            })),
            Self::Window { surface, config } => match surface.get_current_texture() {
                Ok(st) => Ok(Some(AcquiredFrame {
                    texture: st.texture.clone(),
                    view: st.texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    surface_texture: Some(st),
                })),
                Err(err) => match classify_surface_error(&err) {
                    SurfaceErrorAction::Reconfigured => {
                        log::debug!("surface {err}, reconfiguring");
                        surface.configure(ctx.device(), config);
                        Ok(None)
                    }
                    SurfaceErrorAction::SkipFrame => {
                        log::warn!("skipping frame: {err}");
                        Ok(None)
                    }
                    SurfaceErrorAction::Fatal => {
                        Err(RenderError::backend("acquire surface texture", err))
                    }
                },
            },
        }
    }
}

fn offscreen_texture(
    ctx: &RenderContext,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    ctx.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("veil offscreen target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    })
}

/// Depth buffer and view of one surface.
pub(crate) struct DepthTarget {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl DepthTarget {
    pub fn new(ctx: &RenderContext, width: u32, height: u32) -> Self {
        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("veil depth buffer"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: Vec<wgpu::TextureFormat>, alpha: Vec<wgpu::CompositeAlphaMode>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            alpha_modes: alpha,
            ..Default::default()
        }
    }

    #[test]
    fn capturable_formats_win_over_srgb() {
        use wgpu::TextureFormat as F;
        let c = caps(vec![F::Rgb10a2Unorm, F::Bgra8Unorm, F::Bgra8UnormSrgb], vec![]);
        assert_eq!(pick_color_format(&c, true), Some(F::Bgra8UnormSrgb));
        assert_eq!(pick_color_format(&c, false), Some(F::Bgra8Unorm));

        let wide = caps(vec![F::Rgba16Float, F::Rgba8Unorm], vec![]);
        assert_eq!(pick_color_format(&wide, true), Some(F::Rgba8Unorm));

        let only_wide = caps(vec![F::Rgba16Float], vec![]);
        assert_eq!(pick_color_format(&only_wide, true), Some(F::Rgba16Float));
        assert_eq!(pick_color_format(&caps(vec![], vec![]), true), None);
    }

    #[test]
    fn composite_alpha_prefers_request_then_opaque() {
        use wgpu::CompositeAlphaMode as M;
        let c = caps(vec![], vec![M::PreMultiplied, M::Opaque]);
        assert_eq!(pick_composite_alpha(&c, Some(M::PreMultiplied)), M::PreMultiplied);
        assert_eq!(pick_composite_alpha(&c, Some(M::PostMultiplied)), M::Opaque);
        assert_eq!(pick_composite_alpha(&c, None), M::Opaque);

        let inherit = caps(vec![], vec![M::Inherit]);
        assert_eq!(pick_composite_alpha(&inherit, None), M::Inherit);
        assert_eq!(pick_composite_alpha(&caps(vec![], vec![]), None), M::Auto);
    }

    #[test]
    fn lost_and_outdated_reconfigure() {
        assert_eq!(classify_surface_error(&wgpu::SurfaceError::Lost), SurfaceErrorAction::Reconfigured);
        assert_eq!(classify_surface_error(&wgpu::SurfaceError::Outdated), SurfaceErrorAction::Reconfigured);
        assert_eq!(classify_surface_error(&wgpu::SurfaceError::Timeout), SurfaceErrorAction::SkipFrame);
        assert_eq!(classify_surface_error(&wgpu::SurfaceError::OutOfMemory), SurfaceErrorAction::Fatal);
    }
}
