//! Interactive capture session
//!
//! The session task is the only writer of UI state. It applies mode events to
//! the controller, takes frames from the camera for manual captures, hands
//! them to the dispatcher and writes the delivered result back itself.

use anyhow::Result;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use snapscribe_capture::{CaptureRequest, FileCamera, StaticPermission};
use snapscribe_ocr::{
    create_dispatcher, CloudVisionClient, OcrDispatcher, OcrResult, Recognizer,
    TesseractRecognizer,
};

use crate::analyzer::FrameAnalyzer;
use crate::config::{Backend, Config};
use crate::mode::{CaptureBlocked, ModeController, ModeEvent, Transition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    Mode(ModeEvent),
    Capture(CaptureRequest),
}

/// One line typed into the interactive console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Event(UserEvent),
    Status,
    Help,
    Quit,
}

pub const CONSOLE_HELP: &str = "commands: manual | auto | capture <file> [rotation] [WxH] | home | status | help | quit";

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err("empty command".to_string());
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "manual" => ConsoleCommand::Event(UserEvent::Mode(ModeEvent::SelectManual)),
            "auto" => ConsoleCommand::Event(UserEvent::Mode(ModeEvent::SelectAuto)),
            "home" => ConsoleCommand::Event(UserEvent::Mode(ModeEvent::Home)),
            "status" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            "capture" => {
                let path = words
                    .next()
                    .ok_or_else(|| "capture needs a file path".to_string())?;
                let mut request = CaptureRequest::new(path);
                for arg in words.by_ref() {
                    if let Some((w, h)) = arg.split_once(['x', 'X']) {
                        let width = w.parse().map_err(|_| format!("bad size '{}'", arg))?;
                        let height = h.parse().map_err(|_| format!("bad size '{}'", arg))?;
                        request = request.size(width, height);
                    } else {
                        let degrees = arg
                            .parse()
                            .map_err(|_| format!("bad rotation '{}'", arg))?;
                        request = request.rotation(degrees);
                    }
                }
                ConsoleCommand::Event(UserEvent::Capture(request))
            }
            other => return Err(format!("unknown command '{}'", other)),
        };

        if words.next().is_some() {
            return Err(format!("too many arguments for '{}'", verb));
        }
        Ok(command)
    }
}

/// What the user should see after an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Transition(Transition),
    Result(OcrResult),
    Blocked(CaptureBlocked),
}

impl fmt::Display for SessionUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionUpdate::Transition(Transition::Changed { to, .. }) => {
                write!(f, "Mode: {}", to)
            }
            SessionUpdate::Transition(Transition::Refused(notice)) => write!(f, "{}", notice),
            SessionUpdate::Transition(Transition::Ignored) => f.write_str("Nothing to do"),
            SessionUpdate::Result(result) => write!(f, "{}", result),
            SessionUpdate::Blocked(reason) => write!(f, "Cannot capture: {}", reason),
        }
    }
}

/// Build the recognizer selected by `backend`
pub fn build_recognizer(config: &Config, backend: Backend) -> Result<Recognizer> {
    let recognizer = match backend {
        Backend::Cloud => {
            let client = CloudVisionClient::new(config.vision_config()?)?;
            Recognizer::Cloud(Arc::new(client))
        }
        Backend::OnDevice => Recognizer::OnDevice(Arc::new(TesseractRecognizer::new(
            config.tesseract.program.clone(),
            config.tesseract.language.clone(),
        ))),
    };
    Ok(recognizer)
}

pub struct Session {
    controller: ModeController,
    camera: FileCamera,
    dispatcher: OcrDispatcher,
    recognizer: Recognizer,
    analyzer: Option<FrameAnalyzer>,
}

impl Session {
    pub fn new(camera: FileCamera, dispatcher: OcrDispatcher, recognizer: Recognizer) -> Self {
        let mut controller = ModeController::new();
        controller.set_permission(camera.permission().capture_allowed());
        Self {
            controller,
            camera,
            dispatcher,
            recognizer,
            analyzer: None,
        }
    }

    /// Session wired from configuration, using `backend` for recognition
    pub fn from_config(config: &Config, backend: Backend) -> Result<Self> {
        let recognizer = build_recognizer(config, backend)?;
        let camera = FileCamera::new(Arc::new(StaticPermission(config.general.capture_allowed)));
        let dispatcher = create_dispatcher(config.encoder.jpeg_quality);
        info!(
            "Session ready (recognizer: {}, quality: {})",
            recognizer.name(),
            dispatcher.jpeg_quality()
        );
        Ok(Self::new(camera, dispatcher, recognizer))
    }

    /// Attach a continuous analyzer; its enabled flag follows the controller
    pub fn with_analyzer(mut self, analyzer: FrameAnalyzer) -> Self {
        analyzer.set_enabled(self.controller.analysis_enabled());
        self.analyzer = Some(analyzer);
        self
    }

    pub fn controller(&self) -> &ModeController {
        &self.controller
    }

    pub fn camera(&self) -> &FileCamera {
        &self.camera
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }

    pub async fn handle(&mut self, event: UserEvent) -> SessionUpdate {
        self.controller
            .set_permission(self.camera.permission().capture_allowed());

        match event {
            UserEvent::Mode(mode_event) => {
                let transition = self.controller.handle(mode_event);
                self.sync_analyzer();
                SessionUpdate::Transition(transition)
            }
            UserEvent::Capture(request) => self.capture(request).await,
        }
    }

    async fn capture(&mut self, request: CaptureRequest) -> SessionUpdate {
        if let Err(blocked) = self.controller.begin_capture() {
            debug!("Capture refused: {}", blocked);
            return SessionUpdate::Blocked(blocked);
        }

        let frame = match self.camera.capture(&request) {
            Ok(frame) => frame,
            Err(e) => {
                self.controller.capture_failed(&e);
                return SessionUpdate::Result(OcrResult::CaptureFailed(e.to_string()));
            }
        };

        let result = self.dispatcher.dispatch(frame, &self.recognizer).await;
        self.controller.finish_capture(result.clone());
        SessionUpdate::Result(result)
    }

    fn sync_analyzer(&self) {
        if let Some(analyzer) = &self.analyzer {
            analyzer.set_enabled(self.controller.analysis_enabled());
        }
    }

    /// One-line summary for the `status` command
    pub fn status(&self) -> String {
        let last = self
            .controller
            .last_result()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "mode={} recognizer={} bound={} frames={}/{} last={}",
            self.controller.mode(),
            self.recognizer.name(),
            self.controller.capture_handle().is_some(),
            self.camera.frames_released(),
            self.camera.frames_acquired(),
            last
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{CaptureMode, Notice};
    use async_trait::async_trait;
    use snapscribe_capture::Frame;
    use snapscribe_ocr::TextRecognizer;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct EchoRecognizer;

    #[async_trait]
    impl TextRecognizer for EchoRecognizer {
        async fn recognize(&self, frame: &Frame) -> snapscribe_ocr::Result<String> {
            Ok(format!("{}x{}", frame.width(), frame.height()))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn session(allowed: bool) -> Session {
        Session::new(
            FileCamera::new(Arc::new(StaticPermission(allowed))),
            OcrDispatcher::default(),
            Recognizer::OnDevice(Arc::new(EchoRecognizer)),
        )
    }

    fn write_jpeg(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("shot.jpg");
        image::RgbImage::new(6, 4).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_manual_capture_flow() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(&dir);
        let mut session = session(true);

        session.handle(UserEvent::Mode(ModeEvent::SelectManual)).await;
        let update = session
            .handle(UserEvent::Capture(CaptureRequest::new(&path)))
            .await;

        assert_eq!(update, SessionUpdate::Result(OcrResult::Text("6x4".into())));
        assert_eq!(
            session.controller().last_result(),
            Some(&OcrResult::Text("6x4".into()))
        );
        assert_eq!(session.camera().frames_acquired(), 1);
        assert_eq!(session.camera().frames_outstanding(), 0);

        session.handle(UserEvent::Mode(ModeEvent::Home)).await;
        assert_eq!(session.controller().mode(), CaptureMode::None);
        assert!(session.controller().last_result().is_none());
    }

    #[tokio::test]
    async fn test_auto_shows_notice() {
        let mut session = session(true);
        let update = session.handle(UserEvent::Mode(ModeEvent::SelectAuto)).await;
        assert_eq!(
            update,
            SessionUpdate::Transition(Transition::Refused(Notice::FeatureUnavailable))
        );
        assert_eq!(update.to_string(), "This feature has been removed");
        assert_eq!(session.controller().mode(), CaptureMode::None);
    }

    #[tokio::test]
    async fn test_capture_outside_manual_mode() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(&dir);
        let mut session = session(true);

        let update = session
            .handle(UserEvent::Capture(CaptureRequest::new(&path)))
            .await;
        assert_eq!(update, SessionUpdate::Blocked(CaptureBlocked::NotInManualMode));
        assert_eq!(session.camera().frames_acquired(), 0);
    }

    #[tokio::test]
    async fn test_capture_without_permission() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(&dir);
        let mut session = session(false);

        session.handle(UserEvent::Mode(ModeEvent::SelectManual)).await;
        let update = session
            .handle(UserEvent::Capture(CaptureRequest::new(&path)))
            .await;
        assert_eq!(update, SessionUpdate::Blocked(CaptureBlocked::NoCaptureHandle));
    }

    #[tokio::test]
    async fn test_camera_failure_is_shown() {
        let dir = TempDir::new().unwrap();
        let mut session = session(true);

        session.handle(UserEvent::Mode(ModeEvent::SelectManual)).await;
        let update = session
            .handle(UserEvent::Capture(CaptureRequest::new(
                dir.path().join("missing.jpg"),
            )))
            .await;

        let shown = update.to_string();
        assert!(shown.starts_with("Error capturing image: "), "{}", shown);
        assert!(session
            .controller()
            .last_result()
            .map(|r| r.is_error())
            .unwrap_or(false));
        assert!(!session.controller().capture_in_flight());
    }

    #[tokio::test]
    async fn test_analyzer_stays_disabled() {
        let (analyzer, _results, _worker) = FrameAnalyzer::spawn(
            OcrDispatcher::default(),
            Recognizer::OnDevice(Arc::new(EchoRecognizer)),
        );
        analyzer.set_enabled(true);

        let mut session = session(true).with_analyzer(analyzer);
        assert!(!session.analyzer.as_ref().unwrap().is_enabled());

        session.handle(UserEvent::Mode(ModeEvent::SelectManual)).await;
        session.handle(UserEvent::Mode(ModeEvent::Home)).await;
        assert!(!session.analyzer.as_ref().unwrap().is_enabled());
    }

    #[test]
    fn test_parse_console_commands() {
        assert_eq!(
            "manual".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Event(UserEvent::Mode(ModeEvent::SelectManual)))
        );
        assert_eq!("QUIT".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Quit));
        assert_eq!(
            "capture shot.yuv 90 640x480".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Event(UserEvent::Capture(
                CaptureRequest::new("shot.yuv").rotation(90).size(640, 480)
            )))
        );
        assert!("capture".parse::<ConsoleCommand>().is_err());
        assert!("capture a.jpg sideways".parse::<ConsoleCommand>().is_err());
        assert!("home now".parse::<ConsoleCommand>().is_err());
        assert!("".parse::<ConsoleCommand>().is_err());
        assert!("zoom".parse::<ConsoleCommand>().is_err());
    }

    #[tokio::test]
    async fn test_status_line() {
        let session = session(true);
        let status = session.status();
        assert!(status.starts_with("mode=home recognizer=echo"), "{}", status);
    }
}
