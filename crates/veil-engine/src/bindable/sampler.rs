use crate::device::{RenderContext, ResourceId, ResourceKind, ResourceToken, SamplerBinding};
use crate::Result;

use super::{slots, Bindable};

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum Filter {
    Point,
    #[default]
    Linear,
    Anisotropic,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum AddressMode {
    #[default]
    Wrap,
    Mirror,
    Clamp,
    /// Transparent black outside `[0, 1]`. Falls back to `Clamp` on devices
    /// without border addressing.
    Border,
    /// Approximated with `Mirror`; wgpu has no mirror-once mode.
    MirrorOnce,
}

const MAX_ANISOTROPY: u16 = 16;

/// Texture sampler at a pixel-stage slot.
pub struct Sampler {
    token: ResourceToken,
    sampler: wgpu::Sampler,
    slot: u32,
}

impl Sampler {
    pub fn new(ctx: &RenderContext, filter: Filter, address: AddressMode, slot: u32) -> Result<Self> {
        slots::check_slot("sampler", slot)?;

        let border_supported = ctx
            .features()
            .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        let address_mode = wgpu_address_mode(address, border_supported);
        if address == AddressMode::Border && !border_supported {
            log::warn!("border addressing unsupported; sampler falls back to clamp");
        }

        let desc = sampler_descriptor(filter, address_mode);
        let sampler = ctx.device().create_sampler(&desc);

        Ok(Self {
            token: ctx.tracker().acquire(ResourceKind::Sampler),
            sampler,
            slot,
        })
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl Bindable for Sampler {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        ctx.state_mut().samplers[self.slot as usize] = Some(SamplerBinding {
            id: self.token.id(),
            sampler: self.sampler.clone(),
        });
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.token.id()
    }
}

fn wgpu_address_mode(mode: AddressMode, border_supported: bool) -> wgpu::AddressMode {
    match mode {
        AddressMode::Wrap => wgpu::AddressMode::Repeat,
        AddressMode::Mirror | AddressMode::MirrorOnce => wgpu::AddressMode::MirrorRepeat,
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Border if border_supported => wgpu::AddressMode::ClampToBorder,
        AddressMode::Border => wgpu::AddressMode::ClampToEdge,
    }
}

fn sampler_descriptor(filter: Filter, address: wgpu::AddressMode) -> wgpu::SamplerDescriptor<'static> {
    let (texel, mip, anisotropy) = match filter {
        Filter::Point => (wgpu::FilterMode::Nearest, wgpu::MipmapFilterMode::Nearest, 1),
        Filter::Linear => (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Linear, 1),
        // Anisotropy requires every filter to be linear.
        Filter::Anisotropic => (
            wgpu::FilterMode::Linear,
            wgpu::MipmapFilterMode::Linear,
            MAX_ANISOTROPY,
        ),
    };

    wgpu::SamplerDescriptor {
        label: Some("veil sampler"),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: texel,
        min_filter: texel,
        mipmap_filter: mip,
        anisotropy_clamp: anisotropy,
        border_color: (address == wgpu::AddressMode::ClampToBorder)
            .then_some(wgpu::SamplerBorderColor::TransparentBlack),
        ..Default::default()
    }
}
