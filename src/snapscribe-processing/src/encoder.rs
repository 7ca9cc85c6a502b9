//! Frame to JPEG encoding
//!
//! Converts a camera frame of any pixel format into an upright JPEG buffer:
//! - PackedJpeg: bytes are read out verbatim, rotated only when needed
//! - PlanarYuv420: planes are assembled as NV21 and compressed
//! - Other: treated as YUV 4:2:0 at a fixed quality

use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use snapscribe_capture::{Frame, PixelFormat, Plane};

use crate::codec::{ImageJpegCodec, JpegCodec};

/// Default JPEG quality for uploads
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Quality used for frames of unrecognized format, whatever the caller asked
pub const FALLBACK_JPEG_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("frame has {found} plane(s), expected {expected}")]
    MissingPlanes { expected: usize, found: usize },

    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("short pixel buffer: expected at least {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },

    #[error("unsupported rotation: {0} degrees")]
    UnsupportedRotation(u32),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Upright JPEG bytes produced from a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Always 0: rotation is corrected before the buffer leaves the encoder
    pub fn rotation_degrees(&self) -> u32 {
        0
    }

    /// Standard base64 without line wrapping, as expected in JSON payloads
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Encodes frames to JPEG through a pluggable codec
#[derive(Clone)]
pub struct FrameEncoder {
    codec: Arc<dyn JpegCodec>,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::with_codec(Arc::new(ImageJpegCodec))
    }

    pub fn with_codec(codec: Arc<dyn JpegCodec>) -> Self {
        Self { codec }
    }

    /// Encode `frame` at `quality` (clamped to 1..=100).
    ///
    /// The frame is released exactly once, right after its planes are read
    /// and before any compression work, on every exit path.
    pub fn encode(&self, mut frame: Frame, quality: u8) -> Result<EncodedImage, EncodeError> {
        let quality = quality.clamp(1, 100);
        let format = frame.format();
        let (width, height) = frame.dimensions();
        let rotation = frame.rotation_degrees();
        let planes = frame.take_planes();
        frame.close();

        let bytes = match format {
            PixelFormat::PackedJpeg => {
                let jpeg = planes
                    .into_iter()
                    .next()
                    .map(|plane| plane.data)
                    .ok_or(EncodeError::MissingPlanes {
                        expected: 1,
                        found: 0,
                    })?;
                self.rotate_if_needed(jpeg, rotation, quality)
            }
            PixelFormat::PlanarYuv420 => {
                self.yuv420_to_jpeg(&planes, width, height, rotation, quality)?
            }
            PixelFormat::Other(code) => {
                debug!(
                    "unrecognized pixel format {:#x}, encoding as YUV 4:2:0 at quality {}",
                    code, FALLBACK_JPEG_QUALITY
                );
                self.yuv420_to_jpeg(&planes, width, height, rotation, FALLBACK_JPEG_QUALITY)?
            }
        };

        debug!(
            "encoded {:?} frame {}x{} (rotation {}) to {} JPEG bytes",
            format,
            width,
            height,
            rotation,
            bytes.len()
        );
        Ok(EncodedImage::new(bytes))
    }

    fn yuv420_to_jpeg(
        &self,
        planes: &[Plane],
        width: u32,
        height: u32,
        rotation: u32,
        quality: u8,
    ) -> Result<Vec<u8>, EncodeError> {
        let nv21 = assemble_nv21(planes)?;
        let jpeg = self.codec.compress_nv21(&nv21, width, height, quality)?;
        Ok(self.rotate_if_needed(jpeg, rotation, quality))
    }

    /// Rotate to upright. A failed decode keeps the original bytes.
    fn rotate_if_needed(&self, jpeg: Vec<u8>, rotation: u32, quality: u8) -> Vec<u8> {
        if rotation % 360 == 0 {
            return jpeg;
        }

        match self.codec.rotate(&jpeg, rotation, quality) {
            Ok(rotated) => rotated,
            Err(e) => {
                warn!("rotation by {} degrees failed, keeping original bytes: {}", rotation, e);
                jpeg
            }
        }
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Concatenate Y, V and U planes into one NV21-ordered buffer
pub fn assemble_nv21(planes: &[Plane]) -> Result<Vec<u8>, EncodeError> {
    let [y, u, v] = match planes {
        [y, u, v, ..] => [y, u, v],
        _ => {
            return Err(EncodeError::MissingPlanes {
                expected: 3,
                found: planes.len(),
            })
        }
    };

    let mut nv21 = Vec::with_capacity(y.len() + u.len() + v.len());
    nv21.extend_from_slice(&y.data);
    nv21.extend_from_slice(&v.data);
    nv21.extend_from_slice(&u.data);
    Ok(nv21)
}
