use crate::bindable::{Bindable, IndexBuffer, VertexBuffer};
use crate::error::UsageError;
use crate::Result;

use super::{downcast, Drawable};

/// Collects the units of a [`Drawable`] in bind order.
#[derive(Default)]
pub struct DrawableBuilder {
    units: Vec<Box<dyn Bindable>>,
    transparent: bool,
    updates_enabled: bool,
}

impl DrawableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a unit. Units are bound in the order they were added.
    pub fn bind(mut self, unit: impl Bindable) -> Self {
        self.units.push(Box::new(unit));
        self
    }

    pub fn bind_boxed(mut self, unit: Box<dyn Bindable>) -> Self {
        self.units.push(unit);
        self
    }

    /// Appends the index buffer; its length becomes the draw's element count.
    pub fn index_buffer(self, indices: IndexBuffer) -> Self {
        self.bind(indices)
    }

    /// Routes draws through the OIT pass.
    pub fn transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Allows `update_vertices` and `update_texture` on the built drawable.
    pub fn updates_enabled(mut self, enabled: bool) -> Self {
        self.updates_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<Drawable> {
        let index_count = index_count(&self.units).ok_or(UsageError::MissingIndexBuffer)?;

        if self.updates_enabled {
            let dynamic = self
                .units
                .iter()
                .filter_map(|u| downcast::<VertexBuffer>(u.as_ref()))
                .any(VertexBuffer::is_dynamic);
            if !dynamic {
                return Err(UsageError::NoDynamicVertexBuffer.into());
            }
        }

        log::trace!(
            "built drawable: {} units, {index_count} indices, transparent={}",
            self.units.len(),
            self.transparent
        );

        Ok(Drawable {
            units: self.units,
            index_count,
            transparent: self.transparent,
            updates_enabled: self.updates_enabled,
        })
    }
}

/// Length of the last index buffer among `units`.
pub(super) fn index_count(units: &[Box<dyn Bindable>]) -> Option<u32> {
    units
        .iter()
        .rev()
        .find_map(|u| downcast::<IndexBuffer>(u.as_ref()))
        .map(IndexBuffer::len)
}
