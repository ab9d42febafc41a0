//! Frame capture readback.

use std::sync::mpsc;

use crate::error::RenderError;
use crate::image::{Image, BYTES_PER_PIXEL};
use crate::Result;

/// Point in `push_frame` at which a scheduled capture is taken.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CaptureStage {
    /// After the scene and the OIT resolve, before the overlay renders.
    BeforeOverlay,
    /// After the overlay, just before present.
    AfterOverlay,
}

/// Channel order of a capturable color format.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum ChannelOrder {
    Bgra,
    Rgba,
}

pub(crate) fn channel_order(format: wgpu::TextureFormat) -> Option<ChannelOrder> {
    use wgpu::TextureFormat as F;
    match format {
        F::Bgra8Unorm | F::Bgra8UnormSrgb => Some(ChannelOrder::Bgra),
        F::Rgba8Unorm | F::Rgba8UnormSrgb => Some(ChannelOrder::Rgba),
        _ => None,
    }
}

/// Row pitch of the readback buffer, rounded up to the copy alignment.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL as u32;
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Strips row padding and converts to BGRA.
pub(crate) fn unpack_rows(
    data: &[u8],
    width: u32,
    height: u32,
    padded_row: u32,
    order: ChannelOrder,
) -> Vec<u8> {
    let row = width as usize * BYTES_PER_PIXEL;
    let mut pixels = Vec::with_capacity(row * height as usize);
    for chunk in data.chunks(padded_row as usize).take(height as usize) {
        pixels.extend_from_slice(&chunk[..row]);
    }
    if order == ChannelOrder::Rgba {
        for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.swap(0, 2);
        }
    }
    pixels
}

/// A texture-to-buffer copy recorded into a frame's encoder.
pub(crate) struct PendingCapture {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
    order: ChannelOrder,
}

impl PendingCapture {
    /// Records a copy of `texture` into a new readback buffer.
    pub fn record(
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        order: ChannelOrder,
    ) -> Self {
        let (width, height) = (texture.width(), texture.height());
        let padded_row = padded_bytes_per_row(width);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("veil capture readback"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        Self {
            buffer,
            width,
            height,
            padded_row,
            order,
        }
    }

    /// Maps the buffer and waits for the copy. Call after the encoder was
    /// submitted.
    pub fn finish(self, device: &wgpu::Device) -> Result<Image> {
        let slice = self.buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| RenderError::backend("wait for capture readback", e))?;

        rx.recv()
            .map_err(|e| RenderError::backend("receive capture map result", e))?
            .map_err(|e| RenderError::backend("map capture buffer", e))?;

        let pixels = {
            let mapped = slice.get_mapped_range();
            unpack_rows(&mapped, self.width, self.height, self.padded_row, self.order)
        };
        self.buffer.unmap();

        Image::new(self.width, self.height, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
    }

    #[test]
    fn unpack_drops_padding_and_swizzles_rgba() {
        let padded = padded_bytes_per_row(2) as usize;
        let mut data = vec![0u8; padded * 2];
        data[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[padded..padded + 8].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let bgra = unpack_rows(&data, 2, 2, padded as u32, ChannelOrder::Bgra);
        assert_eq!(bgra, (1..=16).collect::<Vec<u8>>());

        let swapped = unpack_rows(&data, 2, 2, padded as u32, ChannelOrder::Rgba);
        assert_eq!(&swapped[..4], &[3, 2, 1, 4]);
        assert_eq!(swapped.len(), 16);
    }

    #[test]
    fn only_8bit_color_formats_are_capturable() {
        assert_eq!(channel_order(wgpu::TextureFormat::Bgra8UnormSrgb), Some(ChannelOrder::Bgra));
        assert_eq!(channel_order(wgpu::TextureFormat::Rgba8Unorm), Some(ChannelOrder::Rgba));
        assert_eq!(channel_order(wgpu::TextureFormat::Rgba16Float), None);
    }
}
