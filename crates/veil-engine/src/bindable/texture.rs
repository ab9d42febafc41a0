use wgpu::util::DeviceExt;

use crate::device::{RenderContext, ResourceId, ResourceKind, ResourceToken, TextureBinding};
use crate::error::UsageError;
use crate::image::Image;
use crate::Result;

use super::{slots, Bindable, BufferUsage};

/// Static textures are uploaded once; dynamic ones accept `update`.
pub type TextureUsage = BufferUsage;

/// Pixel format matching the BGRA byte order of [`Image`].
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

/// Shader-readable 2-D or cube texture at a pixel-stage slot.
pub struct Texture {
    token: ResourceToken,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    queue: wgpu::Queue,
    dimension: wgpu::TextureViewDimension,
    usage: TextureUsage,
    slot: u32,
}

impl Texture {
    /// Creates a 2-D texture from a BGRA image.
    pub fn from_image(ctx: &RenderContext, image: &Image, usage: TextureUsage, slot: u32) -> Result<Self> {
        slots::check_slot("texture", slot)?;
        check_image(image)?;

        let texture = ctx.device().create_texture_with_data(
            ctx.queue(),
            &descriptor(image.width, image.height, 1),
            wgpu::util::TextureDataOrder::LayerMajor,
            &image.pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self::assemble(
            ctx,
            texture,
            view,
            wgpu::TextureViewDimension::D2,
            usage,
            slot,
        ))
    }

    /// Creates a cube texture from six square faces in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn cube(ctx: &RenderContext, faces: &[Image; 6], slot: u32) -> Result<Self> {
        slots::check_slot("texture", slot)?;
        let size = faces[0].width;
        for face in faces {
            check_image(face)?;
            if face.width != size || face.height != size {
                return Err(UsageError::CubeFaces.into());
            }
        }

        let data: Vec<u8> = faces.iter().flat_map(|f| f.pixels.iter().copied()).collect();
        let texture = ctx.device().create_texture_with_data(
            ctx.queue(),
            &descriptor(size, size, 6),
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("veil cube view"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        Ok(Self::assemble(
            ctx,
            texture,
            view,
            wgpu::TextureViewDimension::Cube,
            TextureUsage::Static,
            slot,
        ))
    }

    fn assemble(
        ctx: &RenderContext,
        texture: wgpu::Texture,
        view: wgpu::TextureView,
        dimension: wgpu::TextureViewDimension,
        usage: TextureUsage,
        slot: u32,
    ) -> Self {
        Self {
            token: ctx.tracker().acquire(ResourceKind::Texture),
            texture,
            view,
            queue: ctx.queue().clone(),
            dimension,
            usage,
            slot,
        }
    }

    /// Replaces the pixels of a dynamic 2-D texture. Dimensions must match.
    pub fn update(&self, image: &Image) -> Result<()> {
        if self.usage != TextureUsage::Dynamic || self.dimension != wgpu::TextureViewDimension::D2 {
            return Err(UsageError::NotDynamic("texture").into());
        }
        check_image(image)?;
        let (width, height) = self.dimensions();
        if (image.width, image.height) != (width, height) {
            return Err(UsageError::SizeMismatch {
                expected: width as u64 * height as u64 * 4,
                actual: image.pixels.len() as u64,
            }
            .into());
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.row_bytes()),
                rows_per_image: Some(image.height),
            },
            self.texture.size(),
        );
        Ok(())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    pub fn is_cube(&self) -> bool {
        self.dimension == wgpu::TextureViewDimension::Cube
    }

    pub fn is_dynamic(&self) -> bool {
        self.usage == TextureUsage::Dynamic
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl Bindable for Texture {
    fn bind(&self, ctx: &RenderContext) -> Result<()> {
        ctx.check_device()?;
        ctx.state_mut().textures[self.slot as usize] = Some(TextureBinding {
            id: self.token.id(),
            view: self.view.clone(),
            dimension: self.dimension,
        });
        Ok(())
    }

    fn id(&self) -> ResourceId {
        self.token.id()
    }
}

fn check_image(image: &Image) -> Result<()> {
    image.validate()?;
    if image.width == 0 || image.height == 0 {
        return Err(UsageError::ZeroDimensions.into());
    }
    Ok(())
}

fn descriptor(width: u32, height: u32, layers: u32) -> wgpu::TextureDescriptor<'static> {
    wgpu::TextureDescriptor {
        label: Some("veil texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: layers,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    }
}
