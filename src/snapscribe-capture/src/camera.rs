//! File-backed camera
//!
//! Stands in for the device camera: JPEG files become packed frames, raw
//! I420 dumps become planar YUV frames. Every frame handed out carries a
//! release primitive that is counted, so callers can check nothing leaks.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::CaptureError;
use crate::frame::{Frame, PixelFormat, Plane};

/// Format code used for raw dumps of unknown layout
pub const RAW_FORMAT_CODE: i32 = 0x20;

/// Boolean "capture allowed" signal owned by the UI layer
pub trait PermissionGate: Send + Sync {
    fn capture_allowed(&self) -> bool;
}

/// Fixed permission answer
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub bool);

impl PermissionGate for StaticPermission {
    fn capture_allowed(&self) -> bool {
        self.0
    }
}

/// What to capture and how the sensor was oriented
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub path: PathBuf,
    pub rotation_degrees: u32,
    /// Required for raw YUV inputs, ignored for JPEG
    pub size: Option<(u32, u32)>,
}

impl CaptureRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rotation_degrees: 0,
            size: None,
        }
    }

    pub fn rotation(mut self, degrees: u32) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }
}

/// Camera producing frames from files on disk
pub struct FileCamera {
    permission: Arc<dyn PermissionGate>,
    acquired: Arc<AtomicU64>,
    released: Arc<AtomicU64>,
}

impl FileCamera {
    pub fn new(permission: Arc<dyn PermissionGate>) -> Self {
        Self {
            permission,
            acquired: Arc::new(AtomicU64::new(0)),
            released: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn permission(&self) -> &dyn PermissionGate {
        self.permission.as_ref()
    }

    /// Number of frames handed out so far
    pub fn frames_acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Number of frames whose release primitive has run
    pub fn frames_released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Frames handed out but not yet released
    pub fn frames_outstanding(&self) -> u64 {
        self.frames_acquired().saturating_sub(self.frames_released())
    }

    /// Capture a single frame
    pub fn capture(&self, request: &CaptureRequest) -> Result<Frame, CaptureError> {
        if !self.permission.capture_allowed() {
            return Err(CaptureError::PermissionDenied);
        }

        let extension = request
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let frame = match extension.as_str() {
            "jpg" | "jpeg" => Self::load_jpeg(&request.path)?,
            "yuv" | "i420" => Self::load_i420(&request.path, request.size, PixelFormat::PlanarYuv420)?,
            "raw" => Self::load_i420(&request.path, request.size, PixelFormat::Other(RAW_FORMAT_CODE))?,
            other => {
                return Err(CaptureError::UnsupportedInput(format!(
                    "{:?} (extension '{}')",
                    request.path, other
                )))
            }
        };

        self.acquired.fetch_add(1, Ordering::SeqCst);
        let released = self.released.clone();
        let frame = frame
            .with_rotation(request.rotation_degrees)
            .on_release(move || {
                let total = released.fetch_add(1, Ordering::SeqCst) + 1;
                trace!("camera frame released ({} total)", total);
            });

        debug!("captured {:?} from {:?}", frame, request.path);
        Ok(frame)
    }

    fn load_jpeg(path: &Path) -> Result<Frame, CaptureError> {
        let bytes = std::fs::read(path)?;
        let (width, height) = image::ImageReader::with_format(
            Cursor::new(&bytes),
            image::ImageFormat::Jpeg,
        )
        .into_dimensions()?;

        Ok(Frame::new(
            PixelFormat::PackedJpeg,
            width,
            height,
            vec![Plane::packed(bytes)],
        ))
    }

    fn load_i420(
        path: &Path,
        size: Option<(u32, u32)>,
        format: PixelFormat,
    ) -> Result<Frame, CaptureError> {
        let (width, height) = size.ok_or_else(|| {
            CaptureError::UnsupportedInput(format!("{:?}: raw YUV input needs a frame size", path))
        })?;

        let bytes = std::fs::read(path)?;
        let planes = split_i420(&bytes, width, height)?;
        Ok(Frame::new(format, width, height, planes))
    }
}

/// Split a tightly packed I420 buffer into Y, U and V planes
///
/// Chroma comes out semi-planar the way camera HALs hand it over: the V plane
/// holds interleaved V/U samples with a pixel stride of 2, and the U plane is
/// the same interleaved run starting one byte later. Reading Y, then V, then U
/// back to back therefore yields an NV21 buffer.
pub fn split_i420(bytes: &[u8], width: u32, height: u32) -> Result<Vec<Plane>, CaptureError> {
    let w = width as usize;
    let h = height as usize;
    let chroma_w = (w + 1) / 2;
    let chroma_h = (h + 1) / 2;

    let y_size = w
        .checked_mul(h)
        .ok_or_else(|| CaptureError::FrameAcquisition("frame size overflow".to_string()))?;
    let chroma_size = chroma_w * chroma_h;
    let expected = y_size + 2 * chroma_size;

    if bytes.len() < expected {
        return Err(CaptureError::FrameAcquisition(format!(
            "short YUV buffer: expected {} bytes for {}x{}, got {}",
            expected,
            width,
            height,
            bytes.len()
        )));
    }

    let (y, rest) = bytes.split_at(y_size);
    let (u, rest) = rest.split_at(chroma_size);
    let v = &rest[..chroma_size];

    let vu: Vec<u8> = v.iter().zip(u).flat_map(|(&v, &u)| [v, u]).collect();
    let uv = vu.get(1..).unwrap_or_default().to_vec();

    Ok(vec![
        Plane::new(y.to_vec(), w, 1),
        Plane::new(uv, chroma_w * 2, 2),
        Plane::new(vu, chroma_w * 2, 2),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn camera(allowed: bool) -> FileCamera {
        FileCamera::new(Arc::new(StaticPermission(allowed)))
    }

    #[test]
    fn test_split_i420() {
        let bytes: Vec<u8> = (0..24).collect();
        let planes = split_i420(&bytes, 4, 4).unwrap();
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[0].len(), 16);
        // V plane: V/U interleaved, U plane: same run shifted by one
        assert_eq!(planes[2].data, vec![20, 16, 21, 17, 22, 18, 23, 19]);
        assert_eq!(planes[1].data, vec![16, 21, 17, 22, 18, 23, 19]);
        assert_eq!(planes[1].pixel_stride, 2);
        assert_eq!(planes[2].row_stride, 4);
    }

    #[test]
    fn test_split_i420_short_buffer() {
        assert!(split_i420(&[0; 10], 4, 4).is_err());
    }

    #[test]
    fn test_capture_jpeg_counts_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpg");
        ImageBuffer::from_pixel(6, 3, Rgb([200u8, 10, 10]))
            .save(&path)
            .unwrap();

        let cam = camera(true);
        let frame = cam
            .capture(&CaptureRequest::new(&path).rotation(90))
            .unwrap();
        assert_eq!(frame.format(), PixelFormat::PackedJpeg);
        assert_eq!(frame.dimensions(), (6, 3));
        assert_eq!(frame.rotation_degrees(), 90);
        assert_eq!(cam.frames_outstanding(), 1);

        drop(frame);
        assert_eq!(cam.frames_released(), 1);
        assert_eq!(cam.frames_outstanding(), 0);
    }

    #[test]
    fn test_capture_raw_is_other_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.raw");
        std::fs::write(&path, vec![128u8; 24]).unwrap();

        let frame = camera(true)
            .capture(&CaptureRequest::new(&path).size(4, 4))
            .unwrap();
        assert_eq!(frame.format(), PixelFormat::Other(RAW_FORMAT_CODE));
        assert_eq!(frame.planes().len(), 3);
    }

    #[test]
    fn test_capture_requires_permission() {
        let result = camera(false).capture(&CaptureRequest::new("missing.jpg"));
        assert!(matches!(result, Err(CaptureError::PermissionDenied)));
    }

    #[test]
    fn test_yuv_needs_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.yuv");
        std::fs::write(&path, vec![0u8; 24]).unwrap();

        let result = camera(true).capture(&CaptureRequest::new(&path));
        assert!(matches!(result, Err(CaptureError::UnsupportedInput(_))));
    }
}
