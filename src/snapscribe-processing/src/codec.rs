//! JPEG compression backends
//!
//! `FrameEncoder` never touches pixels itself; it hands assembled buffers to a
//! `JpegCodec`. The default codec is built on the `image` crate.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use tracing::debug;

use crate::encoder::EncodeError;

/// Chroma value used where the NV21 buffer runs short
const NEUTRAL_CHROMA: u8 = 128;

pub trait JpegCodec: Send + Sync {
    /// Compress an NV21 buffer (Y plane, then interleaved V/U) covering the
    /// full `width` x `height` rectangle
    fn compress_nv21(
        &self,
        nv21: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>, EncodeError>;

    /// Decode `jpeg`, rotate it clockwise by `degrees` and re-encode
    fn rotate(&self, jpeg: &[u8], degrees: u32, quality: u8) -> Result<Vec<u8>, EncodeError>;
}

/// Codec backed by the `image` crate's JPEG decoder and encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageJpegCodec;

impl JpegCodec for ImageJpegCodec {
    fn compress_nv21(
        &self,
        nv21: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>, EncodeError> {
        let rgb = nv21_to_rgb(nv21, width, height)?;
        encode_rgb(&rgb, quality)
    }

    fn rotate(&self, jpeg: &[u8], degrees: u32, quality: u8) -> Result<Vec<u8>, EncodeError> {
        let img = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?;
        let rotated = match degrees % 360 {
            0 => img,
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            other => return Err(EncodeError::UnsupportedRotation(other)),
        };

        debug!(
            "rotated JPEG by {} degrees to {}x{}",
            degrees,
            rotated.width(),
            rotated.height()
        );
        encode_rgb(&rotated.to_rgb8(), quality)
    }
}

/// Convert an NV21 buffer to RGB using full-range BT.601 coefficients
pub fn nv21_to_rgb(nv21: &[u8], width: u32, height: u32) -> Result<RgbImage, EncodeError> {
    let w = width as usize;
    let h = height as usize;
    let y_size = w * h;

    if w == 0 || h == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }
    if nv21.len() < y_size {
        return Err(EncodeError::ShortBuffer {
            expected: y_size,
            actual: nv21.len(),
        });
    }

    // Interleaved VU rows cover two luma rows each, one V/U pair per two columns
    let chroma_row = (w + 1) / 2 * 2;
    let chroma = |idx: usize| nv21.get(idx).copied().unwrap_or(NEUTRAL_CHROMA);

    let mut rgb = RgbImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels_mut() {
        let (xu, yu) = (x as usize, y as usize);
        let luma = nv21[yu * w + xu] as f32;
        let base = y_size + (yu / 2) * chroma_row + (xu / 2) * 2;
        let v = chroma(base) as f32 - 128.0;
        let u = chroma(base + 1) as f32 - 128.0;

        let r = luma + 1.402 * v;
        let g = luma - 0.344_136 * u - 0.714_136 * v;
        let b = luma + 1.772 * u;
        pixel.0 = [clamp_channel(r), clamp_channel(g), clamp_channel(b)];
    }

    Ok(rgb)
}

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn encode_rgb(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

/// Encode any image as JPEG; used by tests and tools that need sample input
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    encode_rgb(&image.to_rgb8(), quality)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_nv21_stays_gray() {
        // 2x2 luma of 100 with neutral chroma
        let nv21 = [100, 100, 100, 100, 128, 128];
        let rgb = nv21_to_rgb(&nv21, 2, 2).unwrap();
        for pixel in rgb.pixels() {
            assert_eq!(pixel.0, [100, 100, 100]);
        }
    }

    #[test]
    fn test_missing_chroma_is_neutral() {
        let nv21 = [50u8; 16];
        let rgb = nv21_to_rgb(&nv21, 4, 4).unwrap();
        assert_eq!(rgb.get_pixel(3, 3).0, [50, 50, 50]);
    }

    #[test]
    fn test_short_luma_is_rejected() {
        let result = nv21_to_rgb(&[0u8; 3], 2, 2);
        assert!(matches!(result, Err(EncodeError::ShortBuffer { expected: 4, actual: 3 })));
    }

    #[test]
    fn test_zero_size_is_rejected() {
        assert!(nv21_to_rgb(&[], 0, 4).is_err());
    }

    #[test]
    fn test_rotate_odd_angle_fails() {
        let img = DynamicImage::new_rgb8(4, 2);
        let jpeg = encode_jpeg(&img, 80).unwrap();
        let result = ImageJpegCodec.rotate(&jpeg, 45, 80);
        assert!(matches!(result, Err(EncodeError::UnsupportedRotation(45))));
    }

    #[test]
    fn test_compress_nv21_decodes() {
        let nv21 = vec![128u8; 8 * 6 + 8 * 3];
        let jpeg = ImageJpegCodec.compress_nv21(&nv21, 8, 6, 75).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }
}
