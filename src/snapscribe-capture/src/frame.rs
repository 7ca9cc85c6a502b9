//! Owned camera frames
//!
//! A `Frame` wraps a raw image buffer delivered by the camera subsystem. It is
//! a single-use handle: whichever path consumes it owns it, and the camera's
//! release primitive runs exactly once when the frame is dropped or closed.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Mutex;
use tracing::debug;

/// Pixel layout of a camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Single plane holding already compressed JPEG bytes
    PackedJpeg,
    /// Three planes: Y, U, V
    PlanarYuv420,
    /// Anything else the camera may hand out, tagged with its raw format code
    Other(i32),
}

/// One pixel plane of a frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes between the starts of two consecutive rows
    pub row_stride: usize,
    /// Bytes between two consecutive pixels of a row
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Plane holding packed (compressed) bytes without a pixel grid
    pub fn packed(data: Vec<u8>) -> Self {
        Self::new(data, 0, 0)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

/// Camera frame awaiting encoding or recognition
pub struct Frame {
    format: PixelFormat,
    width: u32,
    height: u32,
    rotation_degrees: u32,
    planes: Vec<Plane>,
    timestamp: DateTime<Utc>,
    // Mutex keeps `Frame: Sync` with a `Send`-only closure
    release: Mutex<Option<ReleaseFn>>,
}

impl Frame {
    /// Create a frame with no rotation and a no-op release primitive
    pub fn new(format: PixelFormat, width: u32, height: u32, planes: Vec<Plane>) -> Self {
        Self {
            format,
            width,
            height,
            rotation_degrees: 0,
            planes,
            timestamp: Utc::now(),
            release: Mutex::new(None),
        }
    }

    /// Set the clockwise rotation needed to make the frame upright
    pub fn with_rotation(mut self, degrees: u32) -> Self {
        self.rotation_degrees = degrees % 360;
        self
    }

    /// Install the camera's release primitive, run once when the frame goes away
    pub fn on_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = Mutex::new(Some(Box::new(release)));
        self
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn rotation_degrees(&self) -> u32 {
        self.rotation_degrees
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Move the plane buffers out so the frame can be released early
    pub fn take_planes(&mut self) -> Vec<Plane> {
        std::mem::take(&mut self.planes)
    }

    /// Release the frame now
    pub fn close(self) {}
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation_degrees", &self.rotation_degrees)
            .field("planes", &self.planes.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        let release = self
            .release
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(release) = release {
            debug!(
                "releasing {:?} frame {}x{}",
                self.format, self.width, self.height
            );
            release();
        }
    }
}
