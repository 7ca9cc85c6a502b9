use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;
use std::process::{Command, Stdio};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use snapscribe_capture::{Frame, PixelFormat, Plane};

use crate::error::{OcrError, Result};

/// On-device text recognition working directly on camera frames
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize text in `frame`. The frame stays owned by the caller,
    /// which releases it once this returns.
    async fn recognize(&self, frame: &Frame) -> Result<String>;

    fn name(&self) -> &str;
}

/// Local recognizer running the `tesseract` executable
pub struct TesseractRecognizer {
    program: String,
    language: String,
}

impl TesseractRecognizer {
    pub fn new(program: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
        }
    }

    /// English recognizer using `tesseract` from PATH
    pub fn english() -> Self {
        Self::new("tesseract", "eng")
    }

    async fn run(&self, png: Vec<u8>) -> Result<String> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(["stdin", "stdout", "-l", self.language.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OcrError::EngineInitFailed(format!("failed to spawn {}: {}", self.program, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OcrError::ProcessingError("failed to open recognizer stdin".to_string()))?;
        stdin.write_all(&png).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ProcessingError(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim().chars().take(300).collect::<String>()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        debug!("{} recognized {} characters", self.program, text.len());
        Ok(text)
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::english()
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, frame: &Frame) -> Result<String> {
        let input = RecognizerInput::from_frame(frame);
        let png = tokio::task::spawn_blocking(move || input.to_png())
            .await
            .map_err(|e| OcrError::ProcessingError(format!("image conversion task failed: {}", e)))??;
        self.run(png).await
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Owned copy of what the recognizer needs from a frame
struct RecognizerInput {
    format: PixelFormat,
    width: u32,
    height: u32,
    rotation: u32,
    first_plane: Plane,
}

impl RecognizerInput {
    fn from_frame(frame: &Frame) -> Self {
        Self {
            format: frame.format(),
            width: frame.width(),
            height: frame.height(),
            rotation: frame.rotation_degrees(),
            first_plane: frame.planes().first().cloned().unwrap_or_default(),
        }
    }

    fn to_png(&self) -> Result<Vec<u8>> {
        let image = upright(self.to_image()?, self.rotation)?;
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(png)
    }

    fn to_image(&self) -> Result<DynamicImage> {
        match self.format {
            PixelFormat::PackedJpeg => Ok(image::load_from_memory_with_format(
                &self.first_plane.data,
                ImageFormat::Jpeg,
            )?),
            // Text only needs luma, which is the first plane of any 4:2:0 layout
            PixelFormat::PlanarYuv420 | PixelFormat::Other(_) => Ok(DynamicImage::ImageLuma8(
                luma_from_plane(&self.first_plane, self.width, self.height)?,
            )),
        }
    }
}

/// Build a grayscale image from a luma plane honoring its strides
pub fn luma_from_plane(plane: &Plane, width: u32, height: u32) -> Result<GrayImage> {
    let row_stride = plane.row_stride.max(width as usize);
    let pixel_stride = plane.pixel_stride.max(1);
    let last = (height as usize)
        .checked_sub(1)
        .map(|rows| rows * row_stride + (width as usize).saturating_sub(1) * pixel_stride);

    match last {
        Some(last) if width > 0 && last < plane.data.len() => {}
        _ => {
            return Err(OcrError::ConversionError(format!(
                "luma plane of {} bytes cannot hold a {}x{} frame",
                plane.data.len(),
                width,
                height
            )))
        }
    }

    Ok(GrayImage::from_fn(width, height, |x, y| {
        let idx = y as usize * row_stride + x as usize * pixel_stride;
        image::Luma([plane.data[idx]])
    }))
}

fn upright(image: DynamicImage, rotation: u32) -> Result<DynamicImage> {
    match rotation % 360 {
        0 => Ok(image),
        90 => Ok(image.rotate90()),
        180 => Ok(image.rotate180()),
        270 => Ok(image.rotate270()),
        other => Err(OcrError::ConversionError(format!(
            "unsupported rotation: {} degrees",
            other
        ))),
    }
}

/// Check if a recognizer executable is available
pub fn check_tesseract(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
