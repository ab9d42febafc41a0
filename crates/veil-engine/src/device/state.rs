//! Current pipeline state: everything bound since the context was created,
//! as seen by the next draw.

use std::rc::Rc;

use crate::bindable::slots::{self, MAX_SLOTS};
use crate::bindable::{BlendMode, DepthMode, RasterizerDesc, SlotLayout};
use crate::error::UsageError;
use crate::Result;

use super::ResourceId;

const SLOTS: usize = MAX_SLOTS as usize;

#[derive(Debug, Clone)]
pub(crate) struct ShaderBinding {
    pub id: ResourceId,
    pub module: wgpu::ShaderModule,
    pub entry: Rc<str>,
}

#[derive(Debug, Clone)]
pub(crate) struct LayoutBinding {
    pub id: ResourceId,
    /// Vertex shader the layout was declared for.
    pub shader: ResourceId,
    pub slots: Rc<[SlotLayout]>,
}

#[derive(Debug, Clone)]
pub(crate) struct BufferBinding {
    pub id: ResourceId,
    pub buffer: wgpu::Buffer,
}

#[derive(Debug, Clone)]
pub(crate) struct IndexBinding {
    pub id: ResourceId,
    pub buffer: wgpu::Buffer,
    pub len: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct TextureBinding {
    pub id: ResourceId,
    pub view: wgpu::TextureView,
    pub dimension: wgpu::TextureViewDimension,
}

#[derive(Debug, Clone)]
pub(crate) struct SamplerBinding {
    pub id: ResourceId,
    pub sampler: wgpu::Sampler,
}

/// Kind of one group-1 binding, as the bind group layout sees it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) enum BindingKind {
    VertexUniform,
    PixelUniform,
    Texture(TextureDim),
    Sampler,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) enum TextureDim {
    D2,
    Cube,
}

impl From<wgpu::TextureViewDimension> for TextureDim {
    fn from(d: wgpu::TextureViewDimension) -> Self {
        match d {
            wgpu::TextureViewDimension::Cube => Self::Cube,
            _ => Self::D2,
        }
    }
}

/// Sorted `(binding, kind)` list identifying a group-1 layout.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub(crate) struct ResourceSignature(pub Vec<(u32, BindingKind)>);

#[derive(Debug, Clone, Default)]
pub(crate) struct PipelineState {
    pub vertex_shader: Option<ShaderBinding>,
    pub pixel_shader: Option<ShaderBinding>,
    pub input_layout: Option<LayoutBinding>,
    pub vertex_buffers: [Option<BufferBinding>; SLOTS],
    pub index_buffer: Option<IndexBinding>,
    pub topology: wgpu::PrimitiveTopology,
    pub rasterizer: RasterizerDesc,
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub vertex_constants: [Option<BufferBinding>; SLOTS],
    pub pixel_constants: [Option<BufferBinding>; SLOTS],
    pub textures: [Option<TextureBinding>; SLOTS],
    pub samplers: [Option<SamplerBinding>; SLOTS],
}

impl PipelineState {
    /// Rebinds the default depth-stencil and blend states.
    pub fn restore_defaults(&mut self) {
        self.blend = BlendMode::Default;
        self.depth = DepthMode::Default;
    }

    /// Unbinds every shader input (textures and samplers).
    pub fn clear_shader_inputs(&mut self) {
        self.textures = Default::default();
        self.samplers = Default::default();
    }

    /// Checks that an indexed draw of `count` elements can be issued.
    pub fn validate_indexed(&self, count: u32) -> Result<()> {
        self.validate_program()?;
        let index = self
            .index_buffer
            .as_ref()
            .ok_or(UsageError::MissingBinding("index buffer"))?;
        if count > index.len {
            return Err(UsageError::IndexRange {
                count,
                len: index.len,
            }
            .into());
        }
        Ok(())
    }

    /// Checks shaders, input layout and vertex streams.
    pub fn validate_program(&self) -> Result<()> {
        let vs = self
            .vertex_shader
            .as_ref()
            .ok_or(UsageError::MissingBinding("vertex shader"))?;
        if self.pixel_shader.is_none() {
            return Err(UsageError::MissingBinding("pixel shader").into());
        }
        let layout = self
            .input_layout
            .as_ref()
            .ok_or(UsageError::MissingBinding("input layout"))?;
        if layout.shader != vs.id {
            return Err(UsageError::LayoutMismatch {
                layout: layout.id.get(),
                shader: vs.id.get(),
            }
            .into());
        }
        for slot in 0..layout.slots.len() {
            if self.vertex_buffers[slot].is_none() {
                return Err(UsageError::MissingVertexStream(slot as u32).into());
            }
        }
        Ok(())
    }

    /// Group-1 layout signature of the bound resources.
    pub fn signature(&self) -> ResourceSignature {
        let mut entries = Vec::new();
        for slot in 0..MAX_SLOTS {
            let i = slot as usize;
            if self.vertex_constants[i].is_some() {
                entries.push((slots::vertex_constant_binding(slot), BindingKind::VertexUniform));
            }
            if self.pixel_constants[i].is_some() {
                entries.push((slots::pixel_constant_binding(slot), BindingKind::PixelUniform));
            }
            if let Some(t) = &self.textures[i] {
                entries.push((slots::texture_binding(slot), BindingKind::Texture(t.dimension.into())));
            }
            if self.samplers[i].is_some() {
                entries.push((slots::sampler_binding(slot), BindingKind::Sampler));
            }
        }
        entries.sort_by_key(|(binding, _)| *binding);
        ResourceSignature(entries)
    }

    /// Group-1 bind group entries, in signature order.
    pub fn bind_group_entries(&self) -> Vec<wgpu::BindGroupEntry<'_>> {
        let mut entries = Vec::new();
        for slot in 0..MAX_SLOTS {
            let i = slot as usize;
            if let Some(b) = &self.vertex_constants[i] {
                entries.push(wgpu::BindGroupEntry {
                    binding: slots::vertex_constant_binding(slot),
                    resource: b.buffer.as_entire_binding(),
                });
            }
            if let Some(b) = &self.pixel_constants[i] {
                entries.push(wgpu::BindGroupEntry {
                    binding: slots::pixel_constant_binding(slot),
                    resource: b.buffer.as_entire_binding(),
                });
            }
            if let Some(t) = &self.textures[i] {
                entries.push(wgpu::BindGroupEntry {
                    binding: slots::texture_binding(slot),
                    resource: wgpu::BindingResource::TextureView(&t.view),
                });
            }
            if let Some(s) = &self.samplers[i] {
                entries.push(wgpu::BindGroupEntry {
                    binding: slots::sampler_binding(slot),
                    resource: wgpu::BindingResource::Sampler(&s.sampler),
                });
            }
        }
        entries.sort_by_key(|e| e.binding);
        entries
    }
}

impl ResourceSignature {
    pub fn layout_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        self.0
            .iter()
            .map(|&(binding, kind)| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: match kind {
                    BindingKind::VertexUniform => wgpu::ShaderStages::VERTEX,
                    _ => wgpu::ShaderStages::FRAGMENT,
                },
                ty: match kind {
                    BindingKind::VertexUniform | BindingKind::PixelUniform => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    BindingKind::Texture(dim) => wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: match dim {
                            TextureDim::D2 => wgpu::TextureViewDimension::D2,
                            TextureDim::Cube => wgpu::TextureViewDimension::Cube,
                        },
                        multisampled: false,
                    },
                    BindingKind::Sampler => {
                        wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                    }
                },
                count: None,
            })
            .collect()
    }
}
