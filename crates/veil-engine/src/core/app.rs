use std::rc::Rc;

use winit::event::WindowEvent;
use winit::window::WindowId;

use crate::device::RenderContext;
use crate::surface::RenderSurface;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by hosts of the runtime.
pub trait App {
    /// Called once after a window's render surface was created, before its
    /// first frame. Drawables are usually built here.
    fn on_surface_created(
        &mut self,
        window_id: WindowId,
        context: &Rc<RenderContext>,
        surface: &mut RenderSurface<'_>,
    ) -> AppControl {
        let _ = (window_id, context, surface);
        AppControl::Continue
    }

    /// Called for window events.
    fn on_window_event(&mut self, window_id: WindowId, event: &WindowEvent) -> AppControl {
        let _ = (window_id, event);
        AppControl::Continue
    }

    /// Called once per frame per window, with the window's surface already
    /// bound as the render target. The runtime pushes the frame afterwards.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;
}
