use std::marker::PhantomData;

use bytemuck::Pod;

use crate::device::{BufferBinding, RenderContext, ResourceId, ResourceKind, ResourceToken};
use crate::error::UsageError;
use crate::Result;

use super::buffer::copy_aligned;
use super::{slots, Bindable, ShaderStage};

/// A fixed-size uniform block bound to one stage at one slot.
///
/// Always CPU-updatable. The GPU allocation is rounded up to 16 bytes to
/// satisfy uniform layout rules.
pub struct ConstantBuffer<T: Pod> {
    token: ResourceToken,
    buffer: wgpu::Buffer,
    queue: wgpu::Queue,
    stage: ShaderStage,
    slot: u32,
    _content: PhantomData<T>,
}

impl<T: Pod> ConstantBuffer<T> {
    /// Creates a constant buffer at the stage's default slot
    /// (vertex: 1, pixel: 0).
    pub fn new(ctx: &RenderContext, data: &T, stage: ShaderStage) -> Result<Self> {
        let slot = match stage {
            ShaderStage::Vertex => slots::DEFAULT_VERTEX_CONSTANT_SLOT,
            ShaderStage::Pixel => slots::DEFAULT_PIXEL_CONSTANT_SLOT,
        };
        Self::with_slot(ctx, data, stage, slot)
    }

    pub fn with_slot(ctx: &RenderContext, data: &T, stage: ShaderStage, slot: u32) -> Result<Self> {
        slots::check_slot("constant buffer", slot)?;
        if stage == ShaderStage::Vertex && slot == slots::RESERVED_VERTEX_CONSTANT_SLOT {
            return Err(UsageError::ReservedSlot {
                stage: stage.name(),
                slot,
            }
            .into());
        }

        let buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("veil constants: {}", short_type_name::<T>())),
            size: Self::gpu_size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let cb = Self {
            token: ctx.tracker().acquire(ResourceKind::ConstantBuffer),
            buffer,
            queue: ctx.queue().clone(),
            stage,
            slot,
            _content: PhantomData,
        };
        cb.update(data);
        Ok(cb)
    }

    /// Uploads new contents.
    pub fn update(&self, data: &T) {
        self.queue
            .write_buffer(&self.buffer, 0, &copy_aligned(bytemuck::bytes_of(data)));
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    fn gpu_size() -> u64 {
        (std::mem::size_of::<T>() as u64).max(1).next_multiple_of(16)
    }
}

impl<T: Pod> Bindable for ConstantBuffer<T> {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        let binding = Some(BufferBinding {
            id: self.token.id(),
            buffer: self.buffer.clone(),
        });
        let mut state = ctx.state_mut();
        match self.stage {
            ShaderStage::Vertex => state.vertex_constants[self.slot as usize] = binding,
            ShaderStage::Pixel => state.pixel_constants[self.slot as usize] = binding,
        }
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.token.id()
    }
}

fn short_type_name<T>() -> &'static str {
    let name = std::any::type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct Tint {
        rgb: [f32; 3],
    }

    #[test]
    fn gpu_size_rounds_to_sixteen() {
        assert_eq!(ConstantBuffer::<Tint>::gpu_size(), 16);
        assert_eq!(ConstantBuffer::<[f32; 4]>::gpu_size(), 16);
        assert_eq!(ConstantBuffer::<[f32; 5]>::gpu_size(), 32);
    }

    #[test]
    fn type_name_is_shortened() {
        assert_eq!(short_type_name::<Tint>(), "Tint");
    }
}
