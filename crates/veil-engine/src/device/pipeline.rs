//! Render pipeline and bind group layout cache.
//!
//! Pipelines are keyed by everything that shapes them: the shader pair, the
//! input layout, fixed-function state, the color targets of the pass and the
//! group-1 resource signature. Cached objects live as long as the context.

use std::collections::{HashMap, HashSet};

use crate::bindable::{accumulation_blend, reveal_blend, BlendMode, DepthMode, RasterizerDesc};

use super::state::{PipelineState, ResourceSignature};
use super::ResourceId;

/// Color attachments of the pass a pipeline renders into.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) enum TargetFormats {
    /// One color target of the given format.
    Color(wgpu::TextureFormat),
    /// The two OIT accumulation targets.
    Oit,
}

/// Formats of the OIT accumulation and reveal targets.
pub(crate) const ACCUM_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub(crate) const REVEAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct PipelineKey {
    vertex_shader: ResourceId,
    pixel_shader: ResourceId,
    input_layout: ResourceId,
    topology: wgpu::PrimitiveTopology,
    rasterizer: RasterizerDesc,
    blend: BlendMode,
    depth: Option<DepthMode>,
    targets: TargetFormats,
    signature: ResourceSignature,
}

impl PipelineKey {
    fn uses_any(&self, ids: &HashSet<ResourceId>) -> bool {
        [self.vertex_shader, self.pixel_shader, self.input_layout]
            .iter()
            .any(|id| ids.contains(id))
    }
}

#[derive(Default)]
pub(crate) struct PipelineCache {
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    layouts: HashMap<ResourceSignature, wgpu::BindGroupLayout>,
}

impl PipelineCache {
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Drops every pipeline built from one of `retired`. Returns how many
    /// were removed.
    pub fn evict(&mut self, retired: &[ResourceId]) -> usize {
        let retired: HashSet<ResourceId> = retired.iter().copied().collect();
        let before = self.pipelines.len();
        self.pipelines.retain(|key, _| !key.uses_any(&retired));
        before - self.pipelines.len()
    }

    /// Returns the group-1 layout for `signature`, creating it on first use.
    pub fn resource_layout(
        &mut self,
        device: &wgpu::Device,
        signature: &ResourceSignature,
    ) -> wgpu::BindGroupLayout {
        self.layouts
            .entry(signature.clone())
            .or_insert_with(|| {
                log::debug!("creating resource layout with {} entries", signature.0.len());
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("veil resource layout"),
                    entries: &signature.layout_entries(),
                })
            })
            .clone()
    }

    /// Returns the pipeline matching `state` for a pass with `targets`.
    ///
    /// `state` must have passed [`PipelineState::validate_program`].
    /// `depth` is `None` for passes without a depth attachment.
    pub fn pipeline(
        &mut self,
        device: &wgpu::Device,
        perspective_layout: &wgpu::BindGroupLayout,
        state: &PipelineState,
        depth: Option<DepthMode>,
        targets: TargetFormats,
    ) -> Option<wgpu::RenderPipeline> {
        let vs = state.vertex_shader.as_ref()?;
        let ps = state.pixel_shader.as_ref()?;
        let layout = state.input_layout.as_ref()?;
        let signature = state.signature();

        let key = PipelineKey {
            vertex_shader: vs.id,
            pixel_shader: ps.id,
            input_layout: layout.id,
            topology: state.topology,
            rasterizer: state.rasterizer,
            blend: state.blend,
            depth,
            targets,
            signature,
        };
        if let Some(p) = self.pipelines.get(&key) {
            return Some(p.clone());
        }

        let resource_layout = self.resource_layout(device, &key.signature);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("veil pipeline layout"),
            bind_group_layouts: &[perspective_layout, &resource_layout],
            immediate_size: 0,
        });

        let buffers: Vec<_> = layout.slots.iter().map(|s| s.buffer_layout()).collect();
        let color_targets = color_targets(targets, state.blend);

        log::debug!(
            "creating pipeline vs={} ps={} layout={} blend={:?} depth={:?} targets={:?}",
            vs.id,
            ps.id,
            layout.id,
            state.blend,
            depth,
            targets
        );

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("veil pipeline"),
            layout: Some(&pipeline_layout),

            vertex: wgpu::VertexState {
                module: &vs.module,
                entry_point: Some(&*vs.entry),
                compilation_options: Default::default(),
                buffers: &buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: &ps.module,
                entry_point: Some(&*ps.entry),
                compilation_options: Default::default(),
                targets: &color_targets,
            }),

            primitive: state.rasterizer.primitive_state(state.topology),
            depth_stencil: depth.map(DepthMode::depth_stencil_state),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.pipelines.insert(key, pipeline.clone());
        Some(pipeline)
    }
}

/// Color target states for a pass. OIT passes always use the accumulation
/// and reveal blends regardless of the bound blender.
fn color_targets(targets: TargetFormats, blend: BlendMode) -> Vec<Option<wgpu::ColorTargetState>> {
    match targets {
        TargetFormats::Color(format) => vec![Some(blend.color_target(format))],
        TargetFormats::Oit => vec![
            Some(wgpu::ColorTargetState {
                format: ACCUM_FORMAT,
                blend: Some(accumulation_blend()),
                write_mask: wgpu::ColorWrites::ALL,
            }),
            Some(wgpu::ColorTargetState {
                format: REVEAL_FORMAT,
                blend: Some(reveal_blend()),
                write_mask: wgpu::ColorWrites::ALL,
            }),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oit_pass_has_accumulation_and_reveal_targets() {
        let targets = color_targets(TargetFormats::Oit, BlendMode::Default);
        assert_eq!(targets.len(), 2);

        let accum = targets[0].as_ref().unwrap();
        assert_eq!(accum.format, ACCUM_FORMAT);
        assert_eq!(accum.blend, Some(accumulation_blend()));

        let reveal = targets[1].as_ref().unwrap();
        assert_eq!(reveal.format, REVEAL_FORMAT);
        assert_eq!(reveal.blend, Some(reveal_blend()));
    }

    #[test]
    fn keys_match_any_of_their_program_ids() {
        let tracker = crate::device::ResourceTracker::new();
        let ids: Vec<ResourceId> = (0..4)
            .map(|_| tracker.acquire(crate::device::ResourceKind::VertexShader).id())
            .collect();
        let key = PipelineKey {
            vertex_shader: ids[0],
            pixel_shader: ids[1],
            input_layout: ids[2],
            topology: wgpu::PrimitiveTopology::TriangleList,
            rasterizer: RasterizerDesc::default(),
            blend: BlendMode::Default,
            depth: Some(DepthMode::Default),
            targets: TargetFormats::Oit,
            signature: ResourceSignature::default(),
        };
        assert!(key.uses_any(&HashSet::from([ids[2]])));
        assert!(key.uses_any(&HashSet::from([ids[3], ids[1]])));
        assert!(!key.uses_any(&HashSet::from([ids[3]])));
    }

    #[test]
    fn color_pass_uses_bound_blend() {
        let targets = color_targets(
            TargetFormats::Color(wgpu::TextureFormat::Bgra8Unorm),
            BlendMode::OitResolve,
        );
        assert_eq!(targets.len(), 1);
        assert_eq!(
            targets[0].as_ref().unwrap().blend,
            BlendMode::OitResolve.blend_state()
        );
    }
}
