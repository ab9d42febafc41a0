use std::rc::Rc;

use winit::window::{Window, WindowId};

use crate::device::RenderContext;
use crate::surface::RenderSurface;
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

/// Per-window handles and immutable window metadata.
pub struct WindowCtx<'a> {
    pub id:     WindowId,
    pub window: &'a Window,
}

impl<'a> WindowCtx<'a> {
    /// Returns the logical window size as `(width, height)` in logical pixels.
    pub fn logical_size(&self) -> (f32, f32) {
        let phys  = self.window.inner_size();
        let scale = self.window.scale_factor();
        let logi: winit::dpi::LogicalSize<f64> = phys.to_logical(scale);
        (logi.width as f32, logi.height as f32)
    }

    /// Returns the window size in physical pixels.
    pub fn physical_size(&self) -> (u32, u32) {
        let phys = self.window.inner_size();
        (phys.width, phys.height)
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }
}

/// Per-frame context passed to `core::App::on_frame`.
///
/// Lifetimes:
/// - `'a` is the duration of the callback invocation
/// - `'w` is the window-borrow lifetime carried by `RenderSurface<'w>`
pub struct FrameCtx<'a, 'w> {
    pub window:   WindowCtx<'a>,
    pub context:  &'a Rc<RenderContext>,
    pub surface:  &'a mut RenderSurface<'w>,
    pub time:     FrameTime,
    pub runtime:  &'a mut RuntimeCtx,
}

impl<'a, 'w> FrameCtx<'a, 'w> {
    /// Frame delta in seconds.
    pub fn dt(&self) -> f32 {
        self.time.dt
    }

    /// Asks the runtime to exit after this frame.
    pub fn exit(&mut self) {
        self.runtime.exit();
    }
}
