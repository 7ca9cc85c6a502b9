use std::time::Duration;
use thiserror::Error;

use snapscribe_processing::EncodeError;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("failed to initialize OCR engine: {0}")]
    EngineInitFailed(String),

    #[error("frame conversion error: {0}")]
    ConversionError(String),

    #[error("OCR processing error: {0}")]
    ProcessingError(String),

    #[error("encoding error: {0}")]
    EncodeError(#[from] EncodeError),

    #[error("timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("{0}")]
    HttpError(#[from] reqwest::Error),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("malformed response: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OcrError>;
