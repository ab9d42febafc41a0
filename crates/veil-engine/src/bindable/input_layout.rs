use std::rc::Rc;

use crate::device::{LayoutBinding, RenderContext, ResourceId, ResourceKind, ResourceToken};
use crate::error::UsageError;
use crate::Result;

use super::{slots, Bindable, VertexShader};

/// One declared vertex attribute.
///
/// Attributes receive shader locations in declaration order; offsets are
/// packed per input slot in declaration order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexElement {
    pub name: &'static str,
    pub format: wgpu::VertexFormat,
    pub slot: u32,
}

impl VertexElement {
    pub const fn new(name: &'static str, format: wgpu::VertexFormat) -> Self {
        Self {
            name,
            format,
            slot: 0,
        }
    }

    /// Moves the attribute to a separate vertex stream.
    pub const fn in_slot(mut self, slot: u32) -> Self {
        self.slot = slot;
        self
    }
}

/// Packed attribute layout of one vertex input slot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SlotLayout {
    pub stride: u64,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl SlotLayout {
    pub fn buffer_layout(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &self.attributes,
        }
    }
}

/// Declared vertex input of one vertex shader.
pub struct InputLayout {
    token: ResourceToken,
    shader: ResourceId,
    slots: Rc<[SlotLayout]>,
}

impl InputLayout {
    pub fn new(ctx: &RenderContext, shader: &VertexShader, elements: &[VertexElement]) -> Result<Self> {
        let slots = pack_elements(elements)?;
        Ok(Self {
            token: ctx.tracker().acquire(ResourceKind::InputLayout),
            shader: Bindable::id(shader),
            slots: slots.into(),
        })
    }

    /// Number of vertex streams the layout reads.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn stride(&self, slot: u32) -> Option<u64> {
        self.slots.get(slot as usize).map(|s| s.stride)
    }

    pub fn shader(&self) -> ResourceId {
        self.shader
    }
}

impl Bindable for InputLayout {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        ctx.state_mut().input_layout = Some(LayoutBinding {
            id: self.token.id(),
            shader: self.shader,
            slots: Rc::clone(&self.slots),
        });
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.token.id()
    }
}

fn pack_elements(elements: &[VertexElement]) -> Result<Vec<SlotLayout>> {
    let mut slots: Vec<SlotLayout> = Vec::new();

    for (location, element) in elements.iter().enumerate() {
        slots::check_slot("vertex input", element.slot)?;
        let index = element.slot as usize;
        if slots.len() <= index {
            slots.resize_with(index + 1, || SlotLayout {
                stride: 0,
                attributes: Vec::new(),
            });
        }

        let slot = &mut slots[index];
        slot.attributes.push(wgpu::VertexAttribute {
            format: element.format,
            offset: slot.stride,
            shader_location: location as u32,
        });
        slot.stride += element.format.size();
    }

    if let Some(missing) = slots.iter().position(|s| s.attributes.is_empty()) {
        return Err(UsageError::SparseInputSlots(missing as u32).into());
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_elements_pack_offsets() {
        let slots = pack_elements(&[
            VertexElement::new("Position", wgpu::VertexFormat::Float32x3),
            VertexElement::new("Color", wgpu::VertexFormat::Unorm8x4),
            VertexElement::new("TexCoord", wgpu::VertexFormat::Float32x2),
        ])
        .unwrap();

        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].stride, 12 + 4 + 8);
        let offsets: Vec<u64> = slots[0].attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, [0, 12, 16]);
        let locations: Vec<u32> = slots[0].attributes.iter().map(|a| a.shader_location).collect();
        assert_eq!(locations, [0, 1, 2]);
    }

    #[test]
    fn split_streams_keep_global_locations() {
        let slots = pack_elements(&[
            VertexElement::new("Position", wgpu::VertexFormat::Float32x3),
            VertexElement::new("Normal", wgpu::VertexFormat::Float32x3).in_slot(1),
            VertexElement::new("Color", wgpu::VertexFormat::Float32x4).in_slot(1),
        ])
        .unwrap();

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].stride, 28);
        assert_eq!(slots[1].attributes[0].shader_location, 1);
        assert_eq!(slots[1].attributes[1].offset, 12);
        assert_eq!(slots[1].buffer_layout().array_stride, 28);
    }

    #[test]
    fn gaps_between_slots_are_rejected() {
        let err = pack_elements(&[
            VertexElement::new("Position", wgpu::VertexFormat::Float32x3),
            VertexElement::new("Color", wgpu::VertexFormat::Float32x4).in_slot(2),
        ])
        .unwrap_err();
        assert_eq!(err.as_usage(), Some(&UsageError::SparseInputSlots(1)));
    }

    #[test]
    fn slot_limit_is_enforced() {
        let err = pack_elements(&[
            VertexElement::new("Position", wgpu::VertexFormat::Float32x3).in_slot(slots::MAX_SLOTS),
        ])
        .unwrap_err();
        assert!(matches!(err.as_usage(), Some(UsageError::SlotOutOfRange { .. })));
    }
}
