/// Initialization parameters for a render surface.
#[derive(Debug, Clone)]
pub struct SurfaceInit {
    /// Prefer an sRGB swap chain format among those frame capture can read.
    pub prefer_srgb: bool,

    /// Present mode (swap behavior).
    ///
    /// FIFO is broadly supported and paces presentation to vsync.
    pub present_mode: wgpu::PresentMode,

    /// Composite alpha mode for window surfaces. `None`, or a mode the
    /// window cannot do, selects `Opaque`.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Desired maximum frame latency for the surface.
    ///
    /// This value is a hint; support depends on platform/backend.
    pub desired_maximum_frame_latency: u32,

    /// Allow frame capture. Window surfaces then need copy-source support.
    pub allow_capture: bool,

    /// Size of offscreen surfaces, in pixels.
    pub offscreen_size: (u32, u32),

    /// Color format of offscreen surfaces.
    pub offscreen_format: wgpu::TextureFormat,
}

impl Default for SurfaceInit {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            desired_maximum_frame_latency: 2,
            allow_capture: true,
            offscreen_size: (256, 256),
            offscreen_format: wgpu::TextureFormat::Bgra8Unorm,
        }
    }
}
