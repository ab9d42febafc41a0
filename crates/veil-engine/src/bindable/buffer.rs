use std::borrow::Cow;

use bytemuck::Pod;
use wgpu::util::DeviceExt;

use crate::device::{BufferBinding, IndexBinding, RenderContext, ResourceId, ResourceKind, ResourceToken};
use crate::error::UsageError;
use crate::Result;

use super::{slots, Bindable};

/// Whether a buffer or texture may be rewritten after creation.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    #[default]
    Static,
    /// CPU-updatable through `update`.
    Dynamic,
}

impl BufferUsage {
    fn wgpu_usages(self, base: wgpu::BufferUsages) -> wgpu::BufferUsages {
        match self {
            Self::Static => base,
            Self::Dynamic => base | wgpu::BufferUsages::COPY_DST,
        }
    }
}

/// Pads `bytes` to the queue's copy alignment.
pub(crate) fn copy_aligned(bytes: &[u8]) -> Cow<'_, [u8]> {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    let rem = bytes.len() % align;
    if rem == 0 {
        Cow::Borrowed(bytes)
    } else {
        let mut padded = bytes.to_vec();
        padded.resize(bytes.len() + align - rem, 0);
        Cow::Owned(padded)
    }
}

/// Shared body of vertex and index buffers.
struct GpuBuffer {
    token: ResourceToken,
    buffer: wgpu::Buffer,
    queue: wgpu::Queue,
    byte_len: u64,
    usage: BufferUsage,
}

impl GpuBuffer {
    fn new(
        ctx: &RenderContext,
        kind: ResourceKind,
        label: &str,
        bytes: &[u8],
        base: wgpu::BufferUsages,
        usage: BufferUsage,
    ) -> Self {
        let buffer = ctx.device().create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: &copy_aligned(bytes),
            usage: usage.wgpu_usages(base),
        });

        Self {
            token: ctx.tracker().acquire(kind),
            buffer,
            queue: ctx.queue().clone(),
            byte_len: bytes.len() as u64,
            usage,
        }
    }

    fn write(&self, what: &'static str, bytes: &[u8]) -> Result<()> {
        if self.usage != BufferUsage::Dynamic {
            return Err(UsageError::NotDynamic(what).into());
        }
        if bytes.len() as u64 != self.byte_len {
            return Err(UsageError::SizeMismatch {
                expected: self.byte_len,
                actual: bytes.len() as u64,
            }
            .into());
        }
        self.queue.write_buffer(&self.buffer, 0, &copy_aligned(bytes));
        Ok(())
    }

    fn binding(&self) -> BufferBinding {
        BufferBinding {
            id: self.token.id(),
            buffer: self.buffer.clone(),
        }
    }
}

/// Vertex data bound to one input slot.
pub struct VertexBuffer {
    inner: GpuBuffer,
    slot: u32,
    stride: u64,
    len: u32,
}

impl VertexBuffer {
    /// Creates a vertex buffer bound to input slot 0.
    pub fn new<V: Pod>(ctx: &RenderContext, vertices: &[V], usage: BufferUsage) -> Result<Self> {
        Self::with_slot(ctx, vertices, usage, 0)
    }

    /// Creates a vertex buffer bound to `slot`, for layouts that split
    /// attributes (position, color, normal...) into separate streams.
    pub fn with_slot<V: Pod>(
        ctx: &RenderContext,
        vertices: &[V],
        usage: BufferUsage,
        slot: u32,
    ) -> Result<Self> {
        slots::check_slot("vertex input", slot)?;
        let inner = GpuBuffer::new(
            ctx,
            ResourceKind::VertexBuffer,
            "veil vertex buffer",
            bytemuck::cast_slice(vertices),
            wgpu::BufferUsages::VERTEX,
            usage,
        );
        Ok(Self {
            inner,
            slot,
            stride: std::mem::size_of::<V>() as u64,
            len: vertices.len() as u32,
        })
    }

    /// Replaces the whole vertex array. The byte size must not change.
    pub fn update<V: Pod>(&self, vertices: &[V]) -> Result<()> {
        self.inner.write("vertex buffer", bytemuck::cast_slice(vertices))
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_dynamic(&self) -> bool {
        self.inner.usage == BufferUsage::Dynamic
    }
}

impl Bindable for VertexBuffer {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        ctx.state_mut().vertex_buffers[self.slot as usize] = Some(self.inner.binding());
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.inner.token.id()
    }
}

/// Triangle/line/point indices (`u32`).
pub struct IndexBuffer {
    inner: GpuBuffer,
    len: u32,
}

impl IndexBuffer {
    pub fn new(ctx: &RenderContext, indices: &[u32], usage: BufferUsage) -> Self {
        let inner = GpuBuffer::new(
            ctx,
            ResourceKind::IndexBuffer,
            "veil index buffer",
            bytemuck::cast_slice(indices),
            wgpu::BufferUsages::INDEX,
            usage,
        );
        Self {
            inner,
            len: indices.len() as u32,
        }
    }

    /// Replaces the index array. The count must not change.
    pub fn update(&self, indices: &[u32]) -> Result<()> {
        self.inner.write("index buffer", bytemuck::cast_slice(indices))
    }

    /// Number of indices, i.e. the element count of an indexed draw.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Bindable for IndexBuffer {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        ctx.state_mut().index_buffer = Some(IndexBinding {
            id: self.inner.token.id(),
            buffer: self.inner.buffer.clone(),
            len: self.len,
        });
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.inner.token.id()
    }
}
