//! Colored log lines tagged by pipeline stage
//!
//! Each event is tagged with the stage whose crate emitted it (capture,
//! encode, OCR, session), followed by the spans it happened in with their
//! fields, e.g. `dispatch{recognizer=cloud-vision}:`. A single capture can
//! then be followed across crates in one terminal.

use owo_colors::{OwoColorize, Style};
use std::fmt;
use std::io;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{
    format::{FormatEvent, FormatFields, Writer},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

/// Pipeline stage a log line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Encode,
    Ocr,
    Session,
    /// Dependencies such as reqwest or hyper
    External,
}

impl Stage {
    /// Stage for an event target such as `snapscribe_ocr::vision`
    pub fn for_target(target: &str) -> Self {
        let krate = target.split("::").next().unwrap_or(target);
        match krate {
            "snapscribe_capture" => Stage::Capture,
            "snapscribe_processing" => Stage::Encode,
            "snapscribe_ocr" => Stage::Ocr,
            "snapscribe_core" | "snapscribe" => Stage::Session,
            _ => Stage::External,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Capture => "CAPTURE",
            Stage::Encode => "ENCODE",
            Stage::Ocr => "OCR",
            Stage::Session => "SESSION",
            Stage::External => "EXT",
        }
    }

    fn style(&self) -> Style {
        match self {
            Stage::Capture => Style::new().green().bold(),
            Stage::Encode => Style::new().yellow().bold(),
            Stage::Ocr => Style::new().cyan().bold(),
            Stage::Session => Style::new().magenta().bold(),
            Stage::External => Style::new().dimmed(),
        }
    }
}

/// Formatter writing `HH:MM:SS.mmm [STAGE] LEVEL span{fields}: message`
pub struct StageFormatter;

impl<S, N> FormatEvent<S, N> for StageFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let stage = Stage::for_target(metadata.target());

        let now = chrono::Local::now();
        write!(writer, "{} ", now.format("%H:%M:%S%.3f").dimmed())?;

        let tag = format!("[{:7}]", stage.as_str());
        write!(writer, "{} ", tag.style(stage.style()))?;

        let level = match *metadata.level() {
            Level::ERROR => "ERROR".red().bold().to_string(),
            Level::WARN => "WARN ".yellow().bold().to_string(),
            Level::INFO => "INFO ".green().to_string(),
            Level::DEBUG => "DEBUG".blue().to_string(),
            Level::TRACE => "TRACE".dimmed().to_string(),
        };
        write!(writer, "{} ", level)?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name().bold())?;
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{}}}", fields)?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the stage-tagged subscriber on stderr
///
/// `RUST_LOG` directives are honored on top of `level`. Stdout stays free
/// for recognized text.
pub fn init_logger(level: Level) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(StageFormatter)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
