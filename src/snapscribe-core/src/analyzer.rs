//! Continuous frame analysis
//!
//! Keeps only the latest frame: a frame submitted while another is waiting
//! replaces it, and the replaced frame is released right away. At most one
//! frame is being recognized at a time.
//!
//! This serves the automatic capture mode, which is retired: the binary never
//! builds an analyzer, and a `Session` keeps an attached one disabled.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use snapscribe_capture::Frame;
use snapscribe_ocr::{OcrDispatcher, OcrResult, Recognizer};

const RESULT_CHANNEL_CAPACITY: usize = 16;

struct Shared {
    pending: Mutex<Option<Frame>>,
    wake: Notify,
    enabled: AtomicBool,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Shared {
    fn take_pending(&self) -> Option<Frame> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

/// Handle for feeding frames to the analysis worker
///
/// Dropping the handle stops the worker after its current frame.
pub struct FrameAnalyzer {
    shared: Arc<Shared>,
}

impl FrameAnalyzer {
    /// Start the worker. Must be called from within a Tokio runtime.
    ///
    /// Analysis starts disabled.
    pub fn spawn(
        dispatcher: OcrDispatcher,
        recognizer: Recognizer,
    ) -> (Self, mpsc::Receiver<OcrResult>, JoinHandle<()>) {
        let shared = Arc::new(Shared {
            pending: Mutex::new(None),
            wake: Notify::new(),
            enabled: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        });
        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

        let worker = tokio::spawn(run_worker(shared.clone(), dispatcher, recognizer, tx));

        (Self { shared }, rx, worker)
    }

    /// Offer a frame, replacing any frame still waiting
    pub fn submit(&self, frame: Frame) {
        let stale = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(frame);

        if let Some(stale) = stale {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Dropping stale frame {:?}", stale);
            stale.close();
        }
        self.shared.wake.notify_one();
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Frames replaced before the worker got to them
    pub fn frames_dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for FrameAnalyzer {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(frame) = self.shared.take_pending() {
            frame.close();
        }
        self.shared.wake.notify_one();
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    dispatcher: OcrDispatcher,
    recognizer: Recognizer,
    tx: mpsc::Sender<OcrResult>,
) {
    loop {
        shared.wake.notified().await;
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }

        let Some(frame) = shared.take_pending() else {
            continue;
        };

        if !shared.enabled.load(Ordering::SeqCst) {
            trace!("Analysis disabled, releasing {:?}", frame);
            frame.close();
            continue;
        }

        let result = dispatcher.dispatch(frame, &recognizer).await;
        if tx.send(result).await.is_err() {
            debug!("Analysis result receiver closed");
            break;
        }
    }
    debug!("Frame analyzer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use snapscribe_capture::{PixelFormat, Plane};
    use snapscribe_ocr::TextRecognizer;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Reports each frame it starts on, then waits for a permit
    struct GatedRecognizer {
        started: mpsc::UnboundedSender<u32>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl TextRecognizer for GatedRecognizer {
        async fn recognize(&self, frame: &Frame) -> snapscribe_ocr::Result<String> {
            let _ = self.started.send(frame.width());
            let _permit = self.gate.acquire().await.unwrap();
            Ok(format!("frame-{}", frame.width()))
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    fn frame(id: u32, released: &Arc<AtomicUsize>) -> Frame {
        let released = released.clone();
        Frame::new(
            PixelFormat::PackedJpeg,
            id,
            1,
            vec![Plane::packed(vec![0xFF, 0xD8])],
        )
        .on_release(move || {
            released.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn gated() -> (Recognizer, mpsc::UnboundedReceiver<u32>, Arc<Semaphore>) {
        let (started, started_rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(0));
        let recognizer = Recognizer::OnDevice(Arc::new(GatedRecognizer {
            started,
            gate: gate.clone(),
        }));
        (recognizer, started_rx, gate)
    }

    async fn wait_for(counter: &Arc<AtomicUsize>, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_keeps_only_latest_frame() {
        let (recognizer, mut started, gate) = gated();
        let (analyzer, mut results, _worker) =
            FrameAnalyzer::spawn(OcrDispatcher::default(), recognizer);
        analyzer.set_enabled(true);

        let released = Arc::new(AtomicUsize::new(0));
        analyzer.submit(frame(1, &released));
        assert_eq!(started.recv().await, Some(1));

        // Frame 1 is in flight; 2 waits and is then replaced by 3
        analyzer.submit(frame(2, &released));
        analyzer.submit(frame(3, &released));
        assert_eq!(analyzer.frames_dropped(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        gate.add_permits(2);
        assert_eq!(results.recv().await, Some(OcrResult::Text("frame-1".into())));
        assert_eq!(started.recv().await, Some(3));
        assert_eq!(results.recv().await, Some(OcrResult::Text("frame-3".into())));

        wait_for(&released, 3).await;
    }

    #[tokio::test]
    async fn test_disabled_releases_without_recognizing() {
        let (recognizer, mut started, _gate) = gated();
        let (analyzer, mut results, _worker) =
            FrameAnalyzer::spawn(OcrDispatcher::default(), recognizer);
        assert!(!analyzer.is_enabled());

        let released = Arc::new(AtomicUsize::new(0));
        analyzer.submit(frame(7, &released));
        wait_for(&released, 1).await;

        assert!(started.try_recv().is_err());
        assert!(results.try_recv().is_err());
        assert_eq!(analyzer.frames_dropped(), 0);
    }

    #[tokio::test]
    async fn test_drop_stops_worker_and_releases_pending() {
        let (recognizer, mut started, gate) = gated();
        let (analyzer, _results, worker) =
            FrameAnalyzer::spawn(OcrDispatcher::default(), recognizer);
        analyzer.set_enabled(true);

        let released = Arc::new(AtomicUsize::new(0));
        analyzer.submit(frame(1, &released));
        assert_eq!(started.recv().await, Some(1));
        analyzer.submit(frame(2, &released));

        drop(analyzer);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        gate.add_permits(1);
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
        wait_for(&released, 2).await;
    }
}
