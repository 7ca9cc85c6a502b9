//! Snapscribe - camera text capture CLI
//!
//! Takes frames from image files, encodes them and recognizes their text
//! either on-device (tesseract) or through Cloud Vision.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use snapscribe_capture::{CaptureRequest, FileCamera, StaticPermission};
use snapscribe_core::colored_logger::init_logger;
use snapscribe_core::config::{Backend, Config, API_KEY_ENV};
use snapscribe_core::mode::ModeEvent;
use snapscribe_core::session::{ConsoleCommand, Session, SessionUpdate, UserEvent, CONSOLE_HELP};
use snapscribe_ocr::check_tesseract;
use snapscribe_processing::FrameEncoder;

#[derive(Parser)]
#[command(name = "snapscribe")]
#[command(about = "Capture frames and recognize their text on-device or in the cloud")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Plain log lines without stage tags and colors
    #[arg(long, global = true)]
    plain: bool,
}

#[derive(clap::Args)]
struct FrameArgs {
    /// Image file (.jpg, or raw I420 .yuv/.raw with --width/--height)
    #[arg(short, long)]
    input: PathBuf,

    /// Clockwise rotation that makes the frame upright
    #[arg(short, long, default_value = "0")]
    rotation: u32,

    /// Frame width for raw inputs
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Frame height for raw inputs
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// JPEG quality (1-100), defaults to the configured value
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,
}

impl FrameArgs {
    fn request(&self) -> CaptureRequest {
        let request = CaptureRequest::new(&self.input).rotation(self.rotation);
        match (self.width, self.height) {
            (Some(width), Some(height)) => request.size(width, height),
            _ => request,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Capture one frame and print its text
    Capture {
        #[command(flatten)]
        frame: FrameArgs,

        /// Recognition backend, defaults to the configured one
        #[arg(short, long, value_enum)]
        backend: Option<Backend>,
    },

    /// Encode one frame to an upright JPEG
    Encode {
        #[command(flatten)]
        frame: FrameArgs,

        /// Output JPEG path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Line-driven capture session
    Interactive {
        /// Recognition backend, defaults to the configured one
        #[arg(short, long, value_enum)]
        backend: Option<Backend>,
    },

    /// Check recognizers and configuration
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    if cli.plain {
        FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    } else {
        init_logger(level)?;
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(profile) = &cli.profile {
        config = config.apply_profile(profile)?;
    }

    match cli.command {
        Commands::Capture { frame, backend } => cmd_capture(config, frame, backend),
        Commands::Encode { frame, output } => cmd_encode(config, frame, output),
        Commands::Interactive { backend } => cmd_interactive(config, backend),
        Commands::Check => cmd_check(&config, cli.config),
    }
}

#[tokio::main]
async fn cmd_capture(mut config: Config, frame: FrameArgs, backend: Option<Backend>) -> Result<()> {
    if let Some(quality) = frame.quality {
        config.encoder.jpeg_quality = quality;
    }
    let backend = backend.unwrap_or(config.general.backend);

    let mut session = Session::from_config(&config, backend)?;
    session.handle(UserEvent::Mode(ModeEvent::SelectManual)).await;
    let update = session.handle(UserEvent::Capture(frame.request())).await;
    session.handle(UserEvent::Mode(ModeEvent::Home)).await;

    match update {
        SessionUpdate::Result(result) if !result.is_error() => {
            println!("{}", result);
            Ok(())
        }
        other => bail!("{}", other),
    }
}

fn cmd_encode(config: Config, frame: FrameArgs, output: PathBuf) -> Result<()> {
    let quality = frame.quality.unwrap_or(config.encoder.jpeg_quality);
    let camera = FileCamera::new(Arc::new(StaticPermission(config.general.capture_allowed)));

    let captured = camera
        .capture(&frame.request())
        .with_context(|| format!("Failed to capture {:?}", frame.input))?;
    let (width, height) = captured.dimensions();

    let encoded = FrameEncoder::new()
        .encode(captured, quality)
        .context("Failed to encode frame")?;
    std::fs::write(&output, encoded.bytes())
        .with_context(|| format!("Failed to write {:?}", output))?;

    info!(
        "Encoded {}x{} frame (rotation {}) to {:?}: {} bytes",
        width,
        height,
        frame.rotation,
        output,
        encoded.len()
    );
    Ok(())
}

#[tokio::main]
async fn cmd_interactive(config: Config, backend: Option<Backend>) -> Result<()> {
    let backend = backend.unwrap_or(config.general.backend);
    let mut session = Session::from_config(&config, backend)?;

    println!("{}", CONSOLE_HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read command")?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(ConsoleCommand::Quit) => break,
            Ok(ConsoleCommand::Help) => println!("{}", CONSOLE_HELP),
            Ok(ConsoleCommand::Status) => println!("{}", session.status()),
            Ok(ConsoleCommand::Event(event)) => println!("{}", session.handle(event).await),
            Err(e) => println!("{} (type 'help' for commands)", e),
        }
    }

    if session.camera().frames_outstanding() > 0 {
        warn!(
            "{} frames still held at shutdown",
            session.camera().frames_outstanding()
        );
    }
    info!(
        "Session closed after {} captures",
        session.camera().frames_acquired()
    );
    Ok(())
}

fn cmd_check(config: &Config, config_path: Option<PathBuf>) -> Result<()> {
    println!("checking recognizers...\n");

    let config_path = config_path.unwrap_or_else(Config::default_path);
    println!(
        "  config:    {:?} ({})",
        config_path,
        if config_path.exists() { "found" } else { "defaults" }
    );

    let tesseract_ok = check_tesseract(&config.tesseract.program);
    println!(
        "  tesseract: {}",
        if tesseract_ok { "OK" } else { "NOT FOUND" }
    );

    let api_key_ok = config.resolve_api_key().is_some();
    println!(
        "  api key:   {}",
        if api_key_ok { "present" } else { "missing" }
    );
    println!("  backend:   {:?}", config.general.backend);

    println!();

    if !tesseract_ok {
        println!("WARNING: on-device recognition needs the tesseract executable.");
        println!("Install it and make sure '{}' is in your PATH.", config.tesseract.program);
    }
    if !api_key_ok {
        println!("WARNING: cloud recognition needs an API key.");
        println!("Set {} or vision.api_key in the config file.", API_KEY_ENV);
    }
    if tesseract_ok && api_key_ok {
        println!("all checks passed!");
    }

    Ok(())
}
