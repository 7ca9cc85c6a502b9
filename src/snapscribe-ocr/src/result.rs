//! Recognition outcome delivered to the UI layer
//!
//! Every dispatch produces exactly one `OcrResult`. Failures are values, not
//! errors: the UI renders whatever `Display` gives, which is the same text for
//! recognized content and for failure notices. `is_error` lets programmatic
//! callers tell them apart without inspecting strings.

use std::fmt;

/// Shown when the cloud service found nothing readable
pub const NO_TEXT_FOUND: &str = "(No text found)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrResult {
    /// Recognized text, possibly empty
    Text(String),
    /// Cloud response carried no text or only whitespace
    NoTextFound,
    /// Frame had no image data to recognize
    NoImage,
    /// On-device recognizer failed
    RecognitionFailed(String),
    /// Encoding, transport or parsing failure on the cloud path
    VisionApiError(String),
    /// The camera could not deliver a frame
    CaptureFailed(String),
}

impl OcrResult {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            OcrResult::NoImage
                | OcrResult::RecognitionFailed(_)
                | OcrResult::VisionApiError(_)
                | OcrResult::CaptureFailed(_)
        )
    }

    /// Recognized text, if any was recognized
    pub fn text(&self) -> Option<&str> {
        match self {
            OcrResult::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for OcrResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrResult::Text(text) => f.write_str(text),
            OcrResult::NoTextFound => f.write_str(NO_TEXT_FOUND),
            OcrResult::NoImage => f.write_str("Image is null"),
            OcrResult::RecognitionFailed(msg) => write!(f, "Recognition failed: {}", msg),
            OcrResult::VisionApiError(msg) => write!(f, "Vision API error: {}", msg),
            OcrResult::CaptureFailed(msg) => write!(f, "Error capturing image: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_strings() {
        assert_eq!(OcrResult::NoTextFound.to_string(), "(No text found)");
        assert_eq!(
            OcrResult::VisionApiError("timeout".into()).to_string(),
            "Vision API error: timeout"
        );
        assert_eq!(
            OcrResult::RecognitionFailed("model busy".into()).to_string(),
            "Recognition failed: model busy"
        );
        assert_eq!(
            OcrResult::CaptureFailed("camera closed".into()).to_string(),
            "Error capturing image: camera closed"
        );
        assert_eq!(OcrResult::Text(String::new()).to_string(), "");
    }

    #[test]
    fn test_error_classification() {
        assert!(!OcrResult::Text("hi".into()).is_error());
        assert!(!OcrResult::NoTextFound.is_error());
        assert!(OcrResult::NoImage.is_error());
        assert!(OcrResult::VisionApiError("x".into()).is_error());
        assert_eq!(OcrResult::Text("hi".into()).text(), Some("hi"));
        assert_eq!(OcrResult::NoTextFound.text(), None);
    }
}
