//! Capture mode state machine
//!
//! Tracks which capture mode the user is in, the last recognition result shown
//! to them, whether continuous analysis runs, and whether the camera capture
//! use case is bound. All state lives on the session task; nothing here is
//! shared across threads.

use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use snapscribe_ocr::OcrResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Home screen, no capture surface
    None,
    /// Single-shot captures on user request
    Manual,
    /// Continuous recognition, retired and never entered
    Auto,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureMode::None => "home",
            CaptureMode::Manual => "manual",
            CaptureMode::Auto => "auto",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    SelectManual,
    SelectAuto,
    Home,
}

/// Transient message for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    FeatureUnavailable,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::FeatureUnavailable => f.write_str("This feature has been removed"),
        }
    }
}

/// Outcome of applying a `ModeEvent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed { from: CaptureMode, to: CaptureMode },
    Refused(Notice),
    Ignored,
}

/// Why a manual capture cannot start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CaptureBlocked {
    #[error("manual capture mode is not active")]
    NotInManualMode,

    #[error("camera capture is not bound; camera permission may be missing")]
    NoCaptureHandle,

    #[error("a capture is already in progress")]
    CaptureInFlight,
}

/// Bound camera capture use case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureHandle(u64);

#[derive(Debug)]
pub struct ModeController {
    mode: CaptureMode,
    last_result: Option<OcrResult>,
    analysis_enabled: bool,
    permission_granted: bool,
    capture_handle: Option<CaptureHandle>,
    capture_in_flight: bool,
    next_handle: u64,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            mode: CaptureMode::None,
            last_result: None,
            analysis_enabled: false,
            permission_granted: false,
            capture_handle: None,
            capture_in_flight: false,
            next_handle: 1,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn last_result(&self) -> Option<&OcrResult> {
        self.last_result.as_ref()
    }

    pub fn analysis_enabled(&self) -> bool {
        self.analysis_enabled
    }

    pub fn capture_handle(&self) -> Option<CaptureHandle> {
        self.capture_handle
    }

    pub fn capture_in_flight(&self) -> bool {
        self.capture_in_flight
    }

    /// Apply a user event
    ///
    /// | from   | event        | to     |
    /// |--------|--------------|--------|
    /// | None   | SelectManual | Manual |
    /// | None   | SelectAuto   | None (refused with a notice) |
    /// | Manual | Home         | None   |
    ///
    /// Every other pair is ignored.
    pub fn handle(&mut self, event: ModeEvent) -> Transition {
        let from = self.mode;
        let transition = match (from, event) {
            (CaptureMode::None, ModeEvent::SelectManual) => {
                self.last_result = None;
                self.analysis_enabled = false;
                self.mode = CaptureMode::Manual;
                self.bind_capture();
                Transition::Changed {
                    from,
                    to: CaptureMode::Manual,
                }
            }
            (CaptureMode::None, ModeEvent::SelectAuto) => {
                Transition::Refused(Notice::FeatureUnavailable)
            }
            (CaptureMode::Manual, ModeEvent::Home) => {
                self.last_result = None;
                self.analysis_enabled = false;
                self.release_capture();
                self.mode = CaptureMode::None;
                Transition::Changed {
                    from,
                    to: CaptureMode::None,
                }
            }
            _ => Transition::Ignored,
        };

        match transition {
            Transition::Changed { from, to } => info!("Capture mode {} -> {}", from, to),
            Transition::Refused(notice) => info!("{:?} refused: {}", event, notice),
            Transition::Ignored => debug!("{:?} ignored in {} mode", event, from),
        }
        transition
    }

    /// Record the camera permission answer
    pub fn set_permission(&mut self, granted: bool) {
        self.permission_granted = granted;
        if granted {
            if self.mode == CaptureMode::Manual {
                self.bind_capture();
            }
        } else {
            self.release_capture();
        }
    }

    /// Reserve the single outstanding manual capture
    pub fn begin_capture(&mut self) -> Result<CaptureHandle, CaptureBlocked> {
        if self.mode != CaptureMode::Manual {
            return Err(CaptureBlocked::NotInManualMode);
        }
        let handle = self.capture_handle.ok_or(CaptureBlocked::NoCaptureHandle)?;
        if self.capture_in_flight {
            return Err(CaptureBlocked::CaptureInFlight);
        }
        self.capture_in_flight = true;
        Ok(handle)
    }

    /// Store the result of the outstanding capture
    ///
    /// A result arriving after the user went home is dropped so the home
    /// screen stays clear.
    pub fn finish_capture(&mut self, result: OcrResult) {
        self.capture_in_flight = false;
        if self.mode == CaptureMode::Manual {
            self.last_result = Some(result);
        } else {
            debug!("Dropping result delivered in {} mode", self.mode);
        }
    }

    /// Store a camera failure as the last result
    pub fn capture_failed(&mut self, err: impl fmt::Display) {
        self.finish_capture(OcrResult::CaptureFailed(err.to_string()));
    }

    fn bind_capture(&mut self) {
        if !self.permission_granted || self.capture_handle.is_some() {
            return;
        }
        let handle = CaptureHandle(self.next_handle);
        self.next_handle += 1;
        debug!("Bound capture handle {:?}", handle);
        self.capture_handle = Some(handle);
    }

    fn release_capture(&mut self) {
        if let Some(handle) = self.capture_handle.take() {
            debug!("Released capture handle {:?}", handle);
        }
    }
}
