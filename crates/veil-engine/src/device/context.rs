use std::cell::{Cell, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use crate::bindable::slots::PERSPECTIVE_BINDING;
use crate::bindable::DepthMode;
use crate::error::{RenderError, UsageError};
use crate::Result;

use super::pipeline::{PipelineCache, TargetFormats};
use super::queue::{DrawCall, FrameCommand, FrameQueue};
use super::state::{PipelineState, ResourceSignature};
use super::{DeviceInit, ResourceStats, ResourceTracker};

/// Identity of one render surface within its context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SurfaceId(u64);

#[derive(Debug, Clone)]
struct LostDevice {
    reason: String,
    message: String,
}

/// Owns the wgpu device and everything shared by surfaces and resource units.
///
/// One context per process is the intended use. It is handed around as
/// `Rc<RenderContext>`, is not `Send`, and holds:
/// - the instance/adapter/device/queue
/// - the resource tracker issuing every unit's identity
/// - the current pipeline state written by `Bindable::bind`
/// - the current render target and each surface's frame queue
/// - the pipeline cache
pub struct RenderContext {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,

    tracker: ResourceTracker,
    state: RefCell<PipelineState>,

    /// Surface draws are routed to.
    current: Cell<Option<SurfaceId>>,
    frames: RefCell<HashMap<SurfaceId, FrameQueue>>,
    next_surface: Cell<u64>,

    pipelines: RefCell<PipelineCache>,
    perspective_layout: wgpu::BindGroupLayout,

    /// Written by the device-lost callback, possibly from another thread.
    lost: Arc<Mutex<Option<LostDevice>>>,
}

impl RenderContext {
    /// Creates the device and queue.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(init: DeviceInit) -> Result<Rc<Self>> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: init.force_fallback_adapter,
            })
            .await
            .map_err(|e| RenderError::backend("request adapter", e))?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        let required_features = init.features_for(adapter.features());
        let required_limits = init
            .required_limits
            .clone()
            .unwrap_or_else(|| wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()));

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(init.label),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| RenderError::backend("request device", e))?;

        let lost = Arc::new(Mutex::new(None));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("device lost ({reason:?}): {message}");
            if let Ok(mut slot) = flag.lock() {
                *slot = Some(LostDevice {
                    reason: format!("{reason:?}"),
                    message,
                });
            }
        });

        let perspective_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("veil perspective layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: PERSPECTIVE_BINDING,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        Ok(Rc::new(Self {
            instance,
            adapter,
            device,
            queue,
            tracker: ResourceTracker::new(),
            state: RefCell::new(PipelineState::default()),
            current: Cell::new(None),
            frames: RefCell::new(HashMap::new()),
            next_surface: Cell::new(1),
            pipelines: RefCell::new(PipelineCache::default()),
            perspective_layout,
            lost,
        }))
    }

    /// Blocking variant of [`RenderContext::new`].
    pub fn new_blocking(init: DeviceInit) -> Result<Rc<Self>> {
        pollster::block_on(Self::new(init))
    }

    /// Context on any available adapter, for offscreen rendering.
    pub fn headless() -> Result<Rc<Self>> {
        Self::new_blocking(DeviceInit {
            power_preference: wgpu::PowerPreference::LowPower,
            ..Default::default()
        })
    }

    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn features(&self) -> wgpu::Features {
        self.device.features()
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    /// Created/released counts of every resource unit and surface target.
    pub fn resource_stats(&self) -> ResourceStats {
        self.tracker.stats()
    }

    /// Number of distinct render pipelines built so far.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.borrow().len()
    }

    /// The surface draws are currently routed to.
    pub fn current_target(&self) -> Option<SurfaceId> {
        self.current.get()
    }

    /// Fails with a device-removed error once the device has been lost.
    pub fn check_device(&self) -> Result<()> {
        let lost = self.lost.lock().ok().and_then(|slot| slot.clone());
        match lost {
            Some(LostDevice { reason, message }) => Err(RenderError::DeviceLost { reason, message }),
            None => Ok(()),
        }
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, PipelineState> {
        self.state.borrow_mut()
    }

    /// Rebinds the default depth-stencil and blend states.
    pub fn reset_state(&self) {
        self.state.borrow_mut().restore_defaults();
    }

    /// Records an indexed draw of `count` elements on the current render
    /// target, using the pipeline state bound so far.
    ///
    /// `oit` routes the draw to the target's OIT accumulation pass, which
    /// requires transparency to be enabled there. The default depth and blend
    /// states are restored afterwards whether or not the draw was accepted.
    pub fn draw_indexed(&self, count: u32, oit: bool) -> Result<()> {
        let result = self.record_draw(count, oit);
        self.reset_state();
        result
    }

    fn record_draw(&self, count: u32, oit: bool) -> Result<()> {
        self.check_device()?;
        let target = self.current.get().ok_or(UsageError::NoRenderTarget)?;

        let mut frames = self.frames.borrow_mut();
        let frame = frames.get_mut(&target).ok_or(UsageError::NoRenderTarget)?;
        if oit && !frame.transparency {
            return Err(UsageError::TransparencyDisabled.into());
        }

        let state = self.state.borrow();
        state.validate_indexed(count)?;
        frame.commands.push(FrameCommand::Draw(DrawCall {
            state: state.clone(),
            count,
            oit,
        }));
        Ok(())
    }

    pub(crate) fn register_surface(&self) -> SurfaceId {
        let id = SurfaceId(self.next_surface.get());
        self.next_surface.set(id.0 + 1);
        self.frames.borrow_mut().insert(id, FrameQueue::default());
        log::debug!("registered surface {id:?}");
        id
    }

    pub(crate) fn unregister_surface(&self, id: SurfaceId) {
        self.release_current(id);
        self.frames.borrow_mut().remove(&id);
        log::debug!("unregistered surface {id:?}");
    }

    /// Makes `id` the current target, returning the previous one.
    pub(crate) fn make_current(&self, id: SurfaceId) -> Option<SurfaceId> {
        self.current.replace(Some(id))
    }

    /// Clears the current target if it is `id`.
    pub(crate) fn release_current(&self, id: SurfaceId) {
        if self.current.get() == Some(id) {
            self.current.set(None);
        }
    }

    pub(crate) fn restore_current(&self, previous: Option<SurfaceId>) {
        self.current.set(previous);
    }

    pub(crate) fn set_transparency(&self, id: SurfaceId, enabled: bool) {
        if let Some(frame) = self.frames.borrow_mut().get_mut(&id) {
            frame.transparency = enabled;
        }
    }

    pub(crate) fn push_command(&self, id: SurfaceId, command: FrameCommand) {
        if let Some(frame) = self.frames.borrow_mut().get_mut(&id) {
            frame.commands.push(command);
        }
    }

    pub(crate) fn take_commands(&self, id: SurfaceId) -> Vec<FrameCommand> {
        self.frames
            .borrow_mut()
            .get_mut(&id)
            .map(|frame| std::mem::take(&mut frame.commands))
            .unwrap_or_default()
    }

    pub(crate) fn perspective_layout(&self) -> &wgpu::BindGroupLayout {
        &self.perspective_layout
    }

    pub(crate) fn pipeline(
        &self,
        state: &PipelineState,
        depth: Option<DepthMode>,
        targets: TargetFormats,
    ) -> Option<wgpu::RenderPipeline> {
        self.pipelines.borrow_mut().pipeline(
            &self.device,
            &self.perspective_layout,
            state,
            depth,
            targets,
        )
    }

    /// Evicts cached pipelines built from shaders or input layouts that have
    /// since been dropped.
    pub(crate) fn purge_pipelines(&self) {
        let retired = self.tracker.take_retired();
        if retired.is_empty() {
            return;
        }
        let evicted = self.pipelines.borrow_mut().evict(&retired);
        if evicted > 0 {
            log::debug!("evicted {evicted} pipelines of {} retired units", retired.len());
        }
    }

    pub(crate) fn resource_layout(&self, signature: &ResourceSignature) -> wgpu::BindGroupLayout {
        self.pipelines.borrow_mut().resource_layout(&self.device, signature)
    }

    /// Builds the group-1 bind group for a recorded draw.
    pub(crate) fn resource_bind_group(&self, state: &PipelineState) -> wgpu::BindGroup {
        let layout = self.resource_layout(&state.signature());
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("veil resource bind group"),
            layout: &layout,
            entries: &state.bind_group_entries(),
        })
    }
}
