use anyhow::{Context, Result};
use ouroboros::self_referencing;
use std::collections::HashMap;
use std::rc::Rc;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App as CoreApp, AppControl, FrameCtx, WindowCtx};
use crate::device::{DeviceInit, RenderContext};
use crate::surface::{RenderSurface, SurfaceInit};
use crate::time::{FrameClock, FramePacer};
use crate::{RenderError, Severity};

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    /// Frame-rate cap applied after each pushed frame. `None` leaves pacing
    /// to the present mode.
    pub target_fps: Option<f32>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "veil".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            target_fps: Some(60.0),
        }
    }
}

/// Runtime context passed to the application.
///
/// Commands are buffered and applied after the current callback returns.
#[derive(Default)]
pub struct RuntimeCtx {
    commands: Vec<Command>,
}

impl RuntimeCtx {
    pub fn create_window(&mut self, config: RuntimeConfig) {
        self.commands.push(Command::CreateWindow(config));
    }

    pub fn close_window(&mut self, id: WindowId) {
        self.commands.push(Command::CloseWindow(id));
    }

    pub fn exit(&mut self) {
        self.commands.push(Command::Exit);
    }
}

enum Command {
    CreateWindow(RuntimeConfig),
    CloseWindow(WindowId),
    Exit,
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Runs the event loop until every window is closed or the app exits.
    ///
    /// All windows share one [`RenderContext`], created with `device_init`
    /// when the first window appears.
    pub fn run<A>(
        initial: RuntimeConfig,
        device_init: DeviceInit,
        surface_init: SurfaceInit,
        app: A,
    ) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(initial, device_init, surface_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        Ok(())
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,
    pacer: FramePacer,

    window: Window,

    #[borrows(window)]
    #[covariant]
    surface: RenderSurface<'this>,
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    initial: RuntimeConfig,
    device_init: DeviceInit,
    surface_init: SurfaceInit,
    app: A,

    context: Option<Rc<RenderContext>>,
    windows: HashMap<WindowId, WindowEntry>,
    exit_requested: bool,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(initial: RuntimeConfig, device_init: DeviceInit, surface_init: SurfaceInit, app: A) -> Self {
        Self {
            initial,
            device_init,
            surface_init,
            app,
            context: None,
            windows: HashMap::new(),
            exit_requested: false,
        }
    }

    fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    fn context(&mut self) -> Result<Rc<RenderContext>> {
        if let Some(ctx) = &self.context {
            return Ok(Rc::clone(ctx));
        }
        let ctx = RenderContext::new_blocking(self.device_init.clone())
            .context("failed to initialize the render context")?;
        self.context = Some(Rc::clone(&ctx));
        Ok(ctx)
    }

    fn create_window_entry(
        &mut self,
        event_loop: &ActiveEventLoop,
        config: RuntimeConfig,
    ) -> Result<WindowId> {
        let attrs = Window::default_attributes()
            .with_title(config.title)
            .with_inner_size(config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let id = window.id();
        let ctx = self.context()?;
        let surface_init = self.surface_init.clone();

        let mut entry = WindowEntryTryBuilder {
            clock: FrameClock::default(),
            pacer: FramePacer::new(config.target_fps),
            window,
            surface_builder: |w| RenderSurface::for_window(&ctx, w, &surface_init),
        }
            .try_build()
            .context("failed to create a render surface for the window")?;

        let control = entry.with_surface_mut(|surface| self.app.on_surface_created(id, &ctx, surface));
        if control == AppControl::Exit {
            self.request_exit();
        }

        self.windows.insert(id, entry);
        log::debug!("window {id:?} ready");
        Ok(id)
    }

    fn destroy_window_entry(&mut self, id: WindowId) {
        self.windows.remove(&id);
    }

    fn resize(&mut self, id: WindowId, size: PhysicalSize<u32>) {
        let Some(entry) = self.windows.get_mut(&id) else {
            return;
        };
        let result = entry.with_surface_mut(|s| s.set_window_dimensions(size.width, size.height));
        if let Err(e) = result {
            log::error!("failed to resize window {id:?} to {}x{}: {e}", size.width, size.height);
        }
        entry.with_window(|w| w.request_redraw());
    }

    fn apply_commands(&mut self, event_loop: &ActiveEventLoop, mut ctx: RuntimeCtx) {
        for cmd in ctx.commands.drain(..) {
            match cmd {
                Command::CreateWindow(cfg) => {
                    if let Err(e) = self.create_window_entry(event_loop, cfg) {
                        log::error!("failed to create window: {e:#}");
                        self.request_exit();
                    }
                }
                Command::CloseWindow(id) => self.destroy_window_entry(id),
                Command::Exit => self.request_exit(),
            }
        }

        if self.windows.is_empty() {
            self.request_exit();
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }
}

/// Whether a failed frame should stop the runtime.
fn is_fatal(err: &RenderError) -> bool {
    err.severity() != Severity::Usage
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.windows.is_empty() {
            return;
        }

        if let Err(e) = self.create_window_entry(event_loop, self.initial.clone()) {
            log::error!("failed to create initial window: {e:#}");
            self.request_exit();
            event_loop.exit();
            return;
        }

        for entry in self.windows.values() {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw; the pacer caps the rate.
        for entry in self.windows.values() {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        if !self.windows.contains_key(&window_id) {
            return;
        }

        if self.app.on_window_event(window_id, &event) == AppControl::Exit {
            self.request_exit();
            event_loop.exit();
            return;
        }

        match &event {
            WindowEvent::CloseRequested => {
                self.destroy_window_entry(window_id);
                if self.windows.is_empty() {
                    self.request_exit();
                    event_loop.exit();
                }
            }

            WindowEvent::Resized(new_size) => self.resize(window_id, *new_size),

            WindowEvent::ScaleFactorChanged { .. } => {
                let new_size = self
                    .windows
                    .get(&window_id)
                    .map(|entry| entry.with_window(|w| w.inner_size()));
                if let Some(size) = new_size {
                    self.resize(window_id, size);
                }
            }

            WindowEvent::RedrawRequested => {
                let mut runtime_ctx = RuntimeCtx::default();
                let mut app_control = AppControl::Continue;
                let mut frame_result = Ok(());

                // Split borrows to avoid `self` capture inside `ouroboros` closures.
                let (app, windows, context) = (&mut self.app, &mut self.windows, &self.context);
                let (Some(entry), Some(context)) = (windows.get_mut(&window_id), context) else {
                    return;
                };

                entry.with_mut(|fields| {
                    if let Err(e) = fields.surface.set_render_target() {
                        frame_result = Err(e);
                        return;
                    }
                    let time = fields.clock.tick();

                    // Scope to ensure `ctx` is dropped before the frame is pushed.
                    {
                        let mut ctx = FrameCtx {
                            window: WindowCtx {
                                id: window_id,
                                window: fields.window,
                            },
                            context,
                            surface: fields.surface,
                            time,
                            runtime: &mut runtime_ctx,
                        };

                        app_control = app.on_frame(&mut ctx);
                    }

                    fields.window.pre_present_notify();
                    frame_result = fields.surface.push_frame();
                    fields.pacer.pace();
                });

                if let Err(e) = frame_result {
                    if is_fatal(&e) {
                        log::error!("frame failed on window {window_id:?}: {e}");
                        runtime_ctx.exit();
                    } else {
                        log::warn!("frame failed on window {window_id:?}: {e}");
                    }
                }

                if app_control == AppControl::Exit {
                    runtime_ctx.exit();
                }

                self.apply_commands(event_loop, runtime_ctx);
            }

            _ => {}
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }
}
