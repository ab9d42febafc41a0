//! Drawable scene objects.
//!
//! A [`Drawable`] owns an ordered list of resource units and draws itself by
//! binding each unit in order, then issuing one indexed draw. Transparent
//! drawables are routed to the current surface's OIT pass.

mod builder;

use std::any::Any;

use bytemuck::Pod;

use crate::bindable::{Bindable, ConstantBuffer, Texture, VertexBuffer};
use crate::device::RenderContext;
use crate::error::UsageError;
use crate::image::Image;
use crate::Result;

pub use builder::DrawableBuilder;

pub(crate) fn downcast<T: Bindable>(unit: &dyn Bindable) -> Option<&T> {
    (unit as &dyn Any).downcast_ref::<T>()
}

fn downcast_mut<T: Bindable>(unit: &mut dyn Bindable) -> Option<&mut T> {
    (unit as &mut dyn Any).downcast_mut::<T>()
}

/// A scene object built from resource units.
///
/// Units are dropped in reverse insertion order.
pub struct Drawable {
    units: Vec<Box<dyn Bindable>>,
    index_count: u32,
    transparent: bool,
    updates_enabled: bool,
}

impl Drawable {
    pub fn builder() -> DrawableBuilder {
        DrawableBuilder::new()
    }

    /// Binds every unit in order and draws the indexed geometry on the
    /// current render target.
    pub fn draw(&self, ctx: &RenderContext) -> Result<()> {
        for unit in &self.units {
            if let Err(e) = unit.bind(ctx) {
                ctx.reset_state();
                return Err(e);
            }
        }
        ctx.draw_indexed(self.index_count, self.transparent)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    pub fn updates_enabled(&self) -> bool {
        self.updates_enabled
    }

    /// First unit of type `T`.
    pub fn unit<T: Bindable>(&self) -> Option<&T> {
        self.units.iter().find_map(|u| downcast::<T>(u.as_ref()))
    }

    pub fn unit_mut<T: Bindable>(&mut self) -> Option<&mut T> {
        self.units
            .iter_mut()
            .find_map(|u| downcast_mut::<T>(u.as_mut()))
    }

    /// Rewrites the vertex buffer bound at input `slot`.
    pub fn update_vertices<V: Pod>(&self, slot: u32, vertices: &[V]) -> Result<()> {
        self.check_updates()?;
        self.units
            .iter()
            .filter_map(|u| downcast::<VertexBuffer>(u.as_ref()))
            .find(|vb| vb.slot() == slot)
            .ok_or(UsageError::MissingVertexStream(slot))?
            .update(vertices)
    }

    /// Rewrites the first dynamic texture.
    pub fn update_texture(&self, image: &Image) -> Result<()> {
        self.check_updates()?;
        self.units
            .iter()
            .filter_map(|u| downcast::<Texture>(u.as_ref()))
            .find(|t| t.is_dynamic())
            .ok_or(UsageError::MissingUnit("dynamic texture"))?
            .update(image)
    }

    /// Rewrites the first constant buffer holding a `T`.
    pub fn update_constants<T: Pod>(&self, data: &T) -> Result<()> {
        self.unit::<ConstantBuffer<T>>()
            .ok_or(UsageError::MissingUnit("constant buffer of that type"))?
            .update(data);
        Ok(())
    }

    /// Replaces the unit at `index`, returning the old one.
    ///
    /// The element count follows the index buffer. Replacing the only index
    /// buffer with another kind of unit is rejected and leaves the drawable
    /// unchanged.
    pub fn change_bind(&mut self, index: usize, unit: Box<dyn Bindable>) -> Result<Box<dyn Bindable>> {
        let len = self.units.len();
        let slot = self
            .units
            .get_mut(index)
            .ok_or(UsageError::UnitIndex { index, len })?;
        let old = std::mem::replace(slot, unit);

        match builder::index_count(&self.units) {
            Some(count) => {
                self.index_count = count;
                Ok(old)
            }
            None => {
                self.units[index] = old;
                Err(UsageError::MissingIndexBuffer.into())
            }
        }
    }

    fn check_updates(&self) -> Result<()> {
        if !self.updates_enabled {
            return Err(UsageError::UpdatesDisabled.into());
        }
        Ok(())
    }
}

impl Drop for Drawable {
    fn drop(&mut self) {
        while let Some(unit) = self.units.pop() {
            drop(unit);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::bindable::{BufferUsage, IndexBuffer, ShaderStage};
    use crate::device::{ResourceId, ResourceKind, ResourceToken, ResourceTracker};

    /// Unit that records its id when dropped.
    struct Marker {
        token: ResourceToken,
        dropped: Rc<RefCell<Vec<ResourceId>>>,
    }

    impl Marker {
        fn new(tracker: &ResourceTracker, dropped: &Rc<RefCell<Vec<ResourceId>>>) -> Self {
            Self {
                token: tracker.acquire(ResourceKind::Blender),
                dropped: Rc::clone(dropped),
            }
        }
    }

    impl Bindable for Marker {
        fn bind(&self, _ctx: &RenderContext) -> Result<()> {
            Ok(())
        }

        fn id(&self) -> ResourceId {
            self.token.id()
        }
    }

    impl Drop for Marker {
        fn drop(&mut self) {
            self.dropped.borrow_mut().push(self.token.id());
        }
    }

    #[test]
    fn build_requires_index_buffer() {
        let tracker = ResourceTracker::new();
        let dropped = Rc::default();
        let err = Drawable::builder()
            .bind(Marker::new(&tracker, &dropped))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.as_usage(), Some(&UsageError::MissingIndexBuffer));
        assert_eq!(tracker.stats().live(), 0);
    }

    #[test]
    fn units_drop_in_reverse_order_exactly_once() {
        let Ok(ctx) = RenderContext::headless() else {
            return;
        };
        let dropped = Rc::new(RefCell::new(Vec::new()));
        let a = Marker::new(ctx.tracker(), &dropped);
        let b = Marker::new(ctx.tracker(), &dropped);
        let (ida, idb) = (a.id(), b.id());
        let before = ctx.resource_stats();

        let drawable = Drawable::builder()
            .bind(a)
            .index_buffer(IndexBuffer::new(&ctx, &[0, 1, 2], BufferUsage::Static))
            .bind(b)
            .build()
            .unwrap();
        assert_eq!(drawable.len(), 3);
        drop(drawable);

        assert_eq!(*dropped.borrow(), vec![idb, ida]);
        let after = ctx.resource_stats();
        assert_eq!(after.released - before.released, 3);
        assert_eq!(after.live(), 0);
    }

    #[test]
    fn update_paths_follow_updates_flag() {
        let Ok(ctx) = RenderContext::headless() else {
            return;
        };
        let positions = [[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0]];

        let fixed = Drawable::builder()
            .bind(VertexBuffer::new(&ctx, &positions, BufferUsage::Dynamic).unwrap())
            .bind(ConstantBuffer::new(&ctx, &[1.0f32; 4], ShaderStage::Pixel).unwrap())
            .index_buffer(IndexBuffer::new(&ctx, &[0, 1, 2], BufferUsage::Static))
            .build()
            .unwrap();
        let err = fixed.update_vertices(0, &positions).unwrap_err();
        assert_eq!(err.as_usage(), Some(&UsageError::UpdatesDisabled));
        // Constants stay writable either way.
        fixed.update_constants(&[0.5f32; 4]).unwrap();

        let live = Drawable::builder()
            .bind(VertexBuffer::new(&ctx, &positions, BufferUsage::Dynamic).unwrap())
            .index_buffer(IndexBuffer::new(&ctx, &[0, 1, 2], BufferUsage::Static))
            .updates_enabled(true)
            .build()
            .unwrap();
        live.update_vertices(0, &positions).unwrap();
        let err = live.update_vertices(2, &positions).unwrap_err();
        assert_eq!(err.as_usage(), Some(&UsageError::MissingVertexStream(2)));
    }

    #[test]
    fn updates_need_a_dynamic_vertex_buffer() {
        let Ok(ctx) = RenderContext::headless() else {
            return;
        };
        let err = Drawable::builder()
            .bind(VertexBuffer::new(&ctx, &[[0.0f32; 2]; 3], BufferUsage::Static).unwrap())
            .index_buffer(IndexBuffer::new(&ctx, &[0, 1, 2], BufferUsage::Static))
            .updates_enabled(true)
            .build()
            .err()
            .unwrap();
        assert_eq!(err.as_usage(), Some(&UsageError::NoDynamicVertexBuffer));
    }

    #[test]
    fn change_bind_swaps_and_recounts() {
        let Ok(ctx) = RenderContext::headless() else {
            return;
        };
        let dropped = Rc::new(RefCell::new(Vec::new()));
        let mut drawable = Drawable::builder()
            .bind(Marker::new(ctx.tracker(), &dropped))
            .index_buffer(IndexBuffer::new(&ctx, &[0, 1, 2], BufferUsage::Static))
            .build()
            .unwrap();
        assert_eq!(drawable.index_count(), 3);

        let six = IndexBuffer::new(&ctx, &[0, 1, 2, 2, 1, 3], BufferUsage::Static);
        let old = drawable.change_bind(1, Box::new(six)).unwrap();
        assert_eq!(drawable.index_count(), 6);
        assert!(downcast::<IndexBuffer>(old.as_ref()).is_some());

        let err = drawable
            .change_bind(1, Box::new(Marker::new(ctx.tracker(), &dropped)))
            .err()
            .unwrap();
        assert_eq!(err.as_usage(), Some(&UsageError::MissingIndexBuffer));
        assert_eq!(drawable.index_count(), 6);
        assert!(drawable.unit::<IndexBuffer>().is_some());

        let err = drawable
            .change_bind(9, Box::new(Marker::new(ctx.tracker(), &dropped)))
            .err()
            .unwrap();
        assert_eq!(err.as_usage(), Some(&UsageError::UnitIndex { index: 9, len: 2 }));
    }
}
