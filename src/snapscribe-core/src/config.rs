//! Configuration management
//!
//! TOML configuration with named profiles. Every section is optional; a
//! missing file means defaults.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use snapscribe_ocr::vision::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use snapscribe_ocr::VisionConfig;
use snapscribe_processing::encoder::DEFAULT_JPEG_QUALITY;

/// Environment variable overriding `vision.api_key`
pub const API_KEY_ENV: &str = "VISION_API_KEY";

/// Which recognizer handles manual captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    Cloud,
    OnDevice,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub vision: VisionSection,

    #[serde(default)]
    pub tesseract: TesseractConfig,

    /// Named profiles that can override base config
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,

    /// Answer of the capture permission gate
    #[serde(default = "default_true")]
    pub capture_allowed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// JPEG quality for uploads (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionSection {
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Whole-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_language_hints")]
    pub language_hints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesseractConfig {
    #[serde(default = "default_tesseract_program")]
    pub program: String,

    #[serde(default = "default_tesseract_language")]
    pub language: String,
}

/// Profile for overriding settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub general: Option<GeneralConfig>,
    pub encoder: Option<EncoderConfig>,
    pub vision: Option<VisionSection>,
    pub tesseract: Option<TesseractConfig>,
}

fn default_backend() -> Backend { Backend::Cloud }
fn default_true() -> bool { true }
fn default_jpeg_quality() -> u8 { DEFAULT_JPEG_QUALITY }
fn default_base_url() -> String { DEFAULT_BASE_URL.to_string() }
fn default_timeout_secs() -> u64 { DEFAULT_TIMEOUT.as_secs() }
fn default_language_hints() -> Vec<String> { vec!["en".to_string()] }
fn default_tesseract_program() -> String { "tesseract".to_string() }
fn default_tesseract_language() -> String { "eng".to_string() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            capture_allowed: true,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for VisionSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            language_hints: default_language_hints(),
        }
    }
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            program: default_tesseract_program(),
            language: default_tesseract_language(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {:?}", path.as_ref()))?;
        let config: Config = toml::from_str(&content).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// `<data_local_dir>/Snapscribe/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Snapscribe")
            .join("config.toml")
    }

    /// Apply a named profile, merging settings
    ///
    /// Profile settings override base configuration values.
    pub fn apply_profile(mut self, profile_name: &str) -> Result<Self> {
        let profile = self
            .profiles
            .get(profile_name)
            .with_context(|| format!("Profile '{}' not found", profile_name))?
            .clone();

        if let Some(general) = profile.general {
            self.general = general;
        }
        if let Some(encoder) = profile.encoder {
            self.encoder = encoder;
        }
        if let Some(vision) = profile.vision {
            self.vision = vision;
        }
        if let Some(tesseract) = profile.tesseract {
            self.tesseract = tesseract;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.encoder.jpeg_quality) {
            bail!(
                "encoder.jpeg_quality must be within 1..=100, got {}",
                self.encoder.jpeg_quality
            );
        }
        if self.vision.timeout_secs == 0 {
            bail!("vision.timeout_secs must be positive");
        }
        Ok(())
    }

    /// API key from the environment, falling back to the config file
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(std::env::var(API_KEY_ENV).ok())
    }

    fn resolve_api_key_with(&self, from_env: Option<String>) -> Option<String> {
        from_env
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.vision.api_key.clone().filter(|key| !key.trim().is_empty()))
    }

    /// Settings for the cloud client; fails without an API key
    pub fn vision_config(&self) -> Result<VisionConfig> {
        let api_key = self.resolve_api_key().with_context(|| {
            format!(
                "no Cloud Vision API key: set {} or vision.api_key in the config file",
                API_KEY_ENV
            )
        })?;

        Ok(VisionConfig {
            api_key,
            base_url: self.vision.base_url.clone(),
            timeout: Duration::from_secs(self.vision.timeout_secs),
            language_hints: self.vision.language_hints.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.general.backend, Backend::Cloud);
        assert!(config.general.capture_allowed);
        assert_eq!(config.encoder.jpeg_quality, 90);
        assert_eq!(config.vision.timeout_secs, 30);
        assert_eq!(config.vision.language_hints, vec!["en".to_string()]);
        assert_eq!(config.vision.base_url, "https://vision.googleapis.com/");
    }

    #[test]
    fn test_partial_file_and_profile() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[general]
backend = "on-device"

[vision]
api_key = "file-key"

[profiles.fast.encoder]
jpeg_quality = 60
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.general.backend, Backend::OnDevice);
        assert_eq!(config.vision.timeout_secs, 30);
        assert_eq!(config.encoder.jpeg_quality, 90);

        let fast = config.apply_profile("fast").unwrap();
        assert_eq!(fast.encoder.jpeg_quality, 60);
        assert_eq!(fast.vision.api_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn test_unknown_profile() {
        assert!(Config::default().apply_profile("missing").is_err());
    }

    #[test]
    fn test_rejects_bad_quality() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[encoder]\njpeg_quality = 0\n").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_api_key_precedence() {
        let mut config = Config::default();
        assert_eq!(config.resolve_api_key_with(None), None);

        config.vision.api_key = Some("file-key".into());
        assert_eq!(config.resolve_api_key_with(None).as_deref(), Some("file-key"));
        assert_eq!(
            config.resolve_api_key_with(Some("env-key".into())).as_deref(),
            Some("env-key")
        );
        assert_eq!(
            config.resolve_api_key_with(Some("  ".into())).as_deref(),
            Some("file-key")
        );
    }
}
