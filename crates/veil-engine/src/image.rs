//! Raw pixel arrays exchanged with image collaborators.
//!
//! The engine never decodes files. Textures consume and frame captures
//! produce row-major, 4-channel, 8-bit pixels in B-G-R-A order.

use crate::error::{Result, UsageError};

/// Bytes per pixel in [`Image::pixels`].
pub const BYTES_PER_PIXEL: usize = 4;

/// A row-major BGRA8 pixel array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Image {
    /// Wraps `pixels`, checking that the length matches `width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let image = Self {
            width,
            height,
            pixels,
        };
        image.validate()?;
        Ok(image)
    }

    /// Creates an image filled with one BGRA value.
    pub fn filled(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: bgra.repeat(count),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    pub fn row_bytes(&self) -> u32 {
        self.width * BYTES_PER_PIXEL as u32
    }

    pub fn validate(&self) -> Result<()> {
        if self.pixels.len() != self.byte_len() {
            return Err(UsageError::ImageSize {
                width: self.width,
                height: self.height,
                expected: self.byte_len(),
                actual: self.pixels.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Returns the BGRA value at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.pixels
            .get(at..at + BYTES_PER_PIXEL)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }

    /// Iterates pixels in row-major order.
    pub fn iter_pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.pixels
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }
}
