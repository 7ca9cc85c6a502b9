//! OCR dispatch
//!
//! Routes one frame to one recognizer and delivers exactly one `OcrResult`.
//! The on-device path hands the raw frame to the recognizer; the cloud path
//! encodes first (which releases the frame) and only then calls the service.
//! Work runs on background tasks; the caller decides where to apply the
//! result.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, info_span, warn, Instrument};

use snapscribe_capture::Frame;
use snapscribe_processing::encoder::DEFAULT_JPEG_QUALITY;
use snapscribe_processing::FrameEncoder;

use crate::engine::TextRecognizer;
use crate::result::OcrResult;
use crate::vision::CloudVisionClient;

/// Recognition backend for one dispatch
#[derive(Clone)]
pub enum Recognizer {
    OnDevice(Arc<dyn TextRecognizer>),
    Cloud(Arc<CloudVisionClient>),
}

impl Recognizer {
    pub fn name(&self) -> &str {
        match self {
            Recognizer::OnDevice(recognizer) => recognizer.name(),
            Recognizer::Cloud(_) => "cloud-vision",
        }
    }
}

/// Single pending result of a dispatch
///
/// Resolves exactly once. If the background task dies before producing a
/// result, it resolves to a failure instead of hanging.
#[must_use = "a delivery does nothing unless awaited"]
pub struct Delivery {
    rx: oneshot::Receiver<OcrResult>,
}

impl Future for Delivery {
    type Output = OcrResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<OcrResult> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                OcrResult::RecognitionFailed("recognition task ended without a result".to_string())
            })
        })
    }
}

/// Dispatches frames to recognizers
#[derive(Clone)]
pub struct OcrDispatcher {
    encoder: FrameEncoder,
    jpeg_quality: u8,
}

impl OcrDispatcher {
    pub fn new(encoder: FrameEncoder, jpeg_quality: u8) -> Self {
        Self {
            encoder,
            jpeg_quality,
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Recognize `frame` on a background task.
    ///
    /// Must be called from within a Tokio runtime. The frame is owned by the
    /// dispatch from here on and released exactly once. Dropping the returned
    /// `Delivery` does not cancel the work.
    pub fn dispatch(&self, frame: Frame, recognizer: &Recognizer) -> Delivery {
        let (tx, rx) = oneshot::channel();
        debug!("dispatching {:?} to {}", frame, recognizer.name());
        let span = info_span!(
            "dispatch",
            recognizer = %recognizer.name(),
            format = ?frame.format()
        );

        match recognizer {
            Recognizer::OnDevice(on_device) => {
                let on_device = on_device.clone();
                tokio::spawn(
                    async move {
                        let result = recognize_on_device(on_device.as_ref(), frame).await;
                        deliver(tx, result);
                    }
                    .instrument(span),
                );
            }
            Recognizer::Cloud(client) => {
                let client = client.clone();
                let encoder = self.encoder.clone();
                let quality = self.jpeg_quality;
                tokio::spawn(
                    async move {
                        let result = recognize_in_cloud(&client, encoder, frame, quality).await;
                        deliver(tx, result);
                    }
                    .instrument(span),
                );
            }
        }

        Delivery { rx }
    }

    /// Callback form of [`dispatch`](Self::dispatch): `on_result` runs exactly once
    pub fn dispatch_with<F>(&self, frame: Frame, recognizer: &Recognizer, on_result: F)
    where
        F: FnOnce(OcrResult) + Send + 'static,
    {
        let delivery = self.dispatch(frame, recognizer);
        tokio::spawn(async move {
            on_result(delivery.await);
        });
    }
}

impl Default for OcrDispatcher {
    fn default() -> Self {
        Self::new(FrameEncoder::new(), DEFAULT_JPEG_QUALITY)
    }
}

fn deliver(tx: oneshot::Sender<OcrResult>, result: OcrResult) {
    if tx.send(result).is_err() {
        debug!("result receiver dropped before delivery");
    }
}

async fn recognize_on_device(recognizer: &dyn TextRecognizer, frame: Frame) -> OcrResult {
    if frame.planes().is_empty() {
        frame.close();
        return OcrResult::NoImage;
    }

    match recognizer.recognize(&frame).await {
        Ok(text) => {
            frame.close();
            OcrResult::Text(text)
        }
        Err(e) => {
            frame.close();
            warn!("on-device recognition failed: {}", e);
            OcrResult::RecognitionFailed(e.to_string())
        }
    }
}

async fn recognize_in_cloud(
    client: &CloudVisionClient,
    encoder: FrameEncoder,
    frame: Frame,
    quality: u8,
) -> OcrResult {
    // Encoding releases the frame before anything goes on the wire
    let image = match tokio::task::spawn_blocking(move || encoder.encode(frame, quality)).await {
        Ok(Ok(image)) => image,
        Ok(Err(e)) => {
            warn!("frame encoding failed: {}", e);
            return OcrResult::VisionApiError(e.to_string());
        }
        Err(e) => return OcrResult::VisionApiError(format!("encoding task failed: {}", e)),
    };

    match client.annotate(&image).await {
        Ok(Some(text)) if !text.trim().is_empty() => OcrResult::Text(text),
        Ok(_) => OcrResult::NoTextFound,
        Err(e) => {
            warn!("vision request failed: {}", e);
            OcrResult::VisionApiError(e.to_string())
        }
    }
}
