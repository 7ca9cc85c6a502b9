//! Capture error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture permission not granted")]
    PermissionDenied,

    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("frame acquisition failed: {0}")]
    FrameAcquisition(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
