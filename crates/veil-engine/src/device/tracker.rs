use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Unique identity of one GPU resource unit within a context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of unit a token belongs to. Used for diagnostics only.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    ConstantBuffer,
    Blender,
    DepthStencil,
    VertexBuffer,
    IndexBuffer,
    Sampler,
    Texture,
    VertexShader,
    PixelShader,
    InputLayout,
    Topology,
    Rasterizer,
    RenderTarget,
}

impl ResourceKind {
    /// Kinds whose ids key cached render pipelines.
    fn keys_pipelines(self) -> bool {
        matches!(self, Self::VertexShader | Self::PixelShader | Self::InputLayout)
    }
}

/// Snapshot of the tracker counters.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct ResourceStats {
    pub created: u64,
    pub released: u64,
}

impl ResourceStats {
    pub fn live(&self) -> u64 {
        self.created - self.released
    }
}

#[derive(Debug, Default)]
struct Counters {
    next_id: Cell<u64>,
    created: Cell<u64>,
    released: Cell<u64>,
    /// Released pipeline-keying ids not yet collected by the context.
    retired: RefCell<Vec<ResourceId>>,
}

/// Issues [`ResourceToken`]s and counts their creation and release.
///
/// Every resource unit holds exactly one token; dropping the unit drops the
/// token, so `created - released` is the number of live units.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    counters: Rc<Counters>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new resource and returns its token.
    pub fn acquire(&self, kind: ResourceKind) -> ResourceToken {
        let c = &self.counters;
        let id = ResourceId(c.next_id.get());
        c.next_id.set(id.0 + 1);
        c.created.set(c.created.get() + 1);
        log::trace!("acquired {kind:?} {id}");

        ResourceToken {
            id,
            kind,
            counters: Rc::clone(&self.counters),
        }
    }

    /// Drains the ids of released shaders and input layouts.
    pub(crate) fn take_retired(&self) -> Vec<ResourceId> {
        std::mem::take(&mut *self.counters.retired.borrow_mut())
    }

    pub fn stats(&self) -> ResourceStats {
        ResourceStats {
            created: self.counters.created.get(),
            released: self.counters.released.get(),
        }
    }
}

/// Ownership receipt for one registered resource. Not `Clone`.
#[derive(Debug)]
pub struct ResourceToken {
    id: ResourceId,
    kind: ResourceKind,
    counters: Rc<Counters>,
}

impl ResourceToken {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

impl Drop for ResourceToken {
    fn drop(&mut self) {
        let released = &self.counters.released;
        released.set(released.get() + 1);
        if self.kind.keys_pipelines() {
            self.counters.retired.borrow_mut().push(self.id);
        }
        log::trace!("released {:?} {}", self.kind, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let tracker = ResourceTracker::new();
        let a = tracker.acquire(ResourceKind::Texture);
        let b = tracker.acquire(ResourceKind::Sampler);
        assert!(a.id() < b.id());
        assert_eq!(b.kind(), ResourceKind::Sampler);
    }

    #[test]
    fn dropping_a_token_releases_once() {
        let tracker = ResourceTracker::new();
        let a = tracker.acquire(ResourceKind::VertexBuffer);
        let b = tracker.acquire(ResourceKind::IndexBuffer);
        assert_eq!(tracker.stats().live(), 2);

        drop(a);
        assert_eq!(
            tracker.stats(),
            ResourceStats {
                created: 2,
                released: 1
            }
        );

        drop(b);
        assert_eq!(tracker.stats().live(), 0);
    }

    #[test]
    fn only_shaders_and_layouts_are_retired() {
        let tracker = ResourceTracker::new();
        let vs = tracker.acquire(ResourceKind::VertexShader);
        let layout = tracker.acquire(ResourceKind::InputLayout);
        let texture = tracker.acquire(ResourceKind::Texture);
        let (vs_id, layout_id) = (vs.id(), layout.id());

        drop(texture);
        drop(layout);
        drop(vs);
        assert_eq!(tracker.take_retired(), vec![layout_id, vs_id]);
        assert!(tracker.take_retired().is_empty());
    }

    #[test]
    fn clones_share_counters() {
        let tracker = ResourceTracker::new();
        let view = tracker.clone();
        let _t = tracker.acquire(ResourceKind::Blender);
        assert_eq!(view.stats().created, 1);
    }
}
