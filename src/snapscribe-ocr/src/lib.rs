//! OCR dispatch for Snapscribe
//!
//! This crate routes captured frames either to an on-device recognizer or to
//! the Cloud Vision `images:annotate` endpoint and delivers exactly one text
//! result per frame.

mod dispatcher;
mod engine;
mod error;
mod result;
pub mod vision;

pub use dispatcher::{Delivery, OcrDispatcher, Recognizer};
pub use engine::{check_tesseract, luma_from_plane, TesseractRecognizer, TextRecognizer};
pub use error::{OcrError, Result};
pub use result::{OcrResult, NO_TEXT_FOUND};
pub use vision::{CloudVisionClient, VisionConfig, VisionTransport};

/// Dispatcher with the default `image`-backed encoder at `jpeg_quality`
pub fn create_dispatcher(jpeg_quality: u8) -> OcrDispatcher {
    OcrDispatcher::new(snapscribe_processing::FrameEncoder::new(), jpeg_quality)
}
