// src/pixel.rs
//
// The decoded intermediate representation shared by all codecs: interleaved
// RGBA8 samples. Produced by decode, consumed by encode, owned by exactly
// one task and never reused across requests.

use image::RgbaImage;

use crate::error::{PixpressError, Result};

/// Raw decoded image data: width, height and 4 x width x height RGBA bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Build from interleaved RGBA8 samples. The buffer length must be
    /// exactly 4 * width * height.
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                PixpressError::decode_failed("pixels", "pixel buffer size overflow")
            })?;
        if data.len() != expected {
            return Err(PixpressError::decode_failed(
                "pixels",
                format!(
                    "pixel buffer length {} does not match {}x{} RGBA ({} expected)",
                    data.len(),
                    width,
                    height,
                    expected
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build from interleaved RGB8 samples, expanding an opaque alpha channel.
    pub fn from_rgb8(width: u32, height: u32, rgb: &[u8]) -> Result<Self> {
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| {
                PixpressError::decode_failed("pixels", "pixel buffer size overflow")
            })?;
        if rgb.len() != pixels * 3 {
            return Err(PixpressError::decode_failed(
                "pixels",
                format!(
                    "pixel buffer length {} does not match {}x{} RGB",
                    rgb.len(),
                    width,
                    height
                ),
            ));
        }
        let mut data = Vec::with_capacity(pixels * 4);
        for chunk in rgb.chunks_exact(3) {
            data.extend_from_slice(chunk);
            data.push(0xFF);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Drop alpha and return a tightly packed RGB copy, for encoders that
    /// take opaque input only (JPEG).
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.data.len() / 4 * 3);
        for chunk in self.data.chunks_exact(4) {
            rgb.extend_from_slice(&chunk[..3]);
        }
        rgb
    }

    /// True when any sample is not fully opaque.
    pub fn has_transparency(&self) -> bool {
        self.data.chunks_exact(4).any(|px| px[3] != 0xFF)
    }

    pub(crate) fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .expect("PixelBuffer length is validated at construction")
    }

    pub(crate) fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba8_validates_length() {
        assert!(PixelBuffer::from_rgba8(2, 2, vec![0; 16]).is_ok());
        assert!(PixelBuffer::from_rgba8(2, 2, vec![0; 15]).is_err());
        assert!(PixelBuffer::from_rgba8(2, 2, vec![0; 12]).is_err());
    }

    #[test]
    fn test_from_rgb8_expands_alpha() {
        let buffer = PixelBuffer::from_rgb8(2, 1, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(buffer.data(), &[1, 2, 3, 255, 4, 5, 6, 255]);
        assert!(!buffer.has_transparency());
    }

    #[test]
    fn test_to_rgb8_strips_alpha() {
        let buffer = PixelBuffer::from_rgba8(1, 2, vec![9, 8, 7, 255, 1, 2, 3, 128]).unwrap();
        assert_eq!(buffer.to_rgb8(), vec![9, 8, 7, 1, 2, 3]);
        assert!(buffer.has_transparency());
    }

    #[test]
    fn test_pixel_count() {
        let buffer = PixelBuffer::from_rgba8(3, 2, vec![0; 24]).unwrap();
        assert_eq!(buffer.pixel_count(), 6);
    }
}
