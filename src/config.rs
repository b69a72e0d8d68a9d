//! Run configuration, read once before the capture loop starts.
//!
//! Every section is optional in the TOML file; missing values fall back to
//! the defaults below.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    ocr::Language,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ocr: OcrSettings,
    pub capture: CaptureSettings,
    pub cooldown: CooldownSettings,
    pub web: WebSettings,
    pub annotate: AnnotateSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub languages: Vec<Language>,
    /// Use a GPU execution provider when one is available.
    pub use_gpu: bool,
    pub model_dir: PathBuf,
    pub threads: usize,
    pub max_side_len: u32,
    pub use_classifier: bool,
    /// TensorRT engine cache.
    pub cache_dir: Option<PathBuf>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            languages: Language::ALL.to_vec(),
            use_gpu: true,
            model_dir: PathBuf::from("models"),
            threads: 4,
            max_side_len: 1024,
            use_classifier: true,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// `/dev/video<device>`
    pub device: usize,
    pub width: u32,
    pub height: u32,
    /// Replay this image instead of opening a camera.
    pub image: Option<PathBuf>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: 0,
            width: 640,
            height: 480,
            image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownSettings {
    /// Seconds before the same text is annotated again. Zero or negative
    /// disables suppression.
    pub seconds: f64,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self { seconds: 3.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    pub host: String,
    /// First port tried; the next few are tried if it is taken.
    pub port: u16,
    pub jpeg_quality: u8,
    pub title: String,
    /// Seconds the page stays up after the capture loop ends.
    pub linger_secs: u64,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            jpeg_quality: 80,
            title: "Real-Time OCR".to_string(),
            linger_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotateSettings {
    pub font_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ocr.languages.is_empty() {
            return Err(Error::Config("ocr.languages must not be empty".into()));
        }
        if self.ocr.threads == 0 {
            return Err(Error::Config("ocr.threads must be at least 1".into()));
        }
        if !(1..=100).contains(&self.web.jpeg_quality) {
            return Err(Error::Config(format!(
                "web.jpeg_quality must be within 1..=100, got {}",
                self.web.jpeg_quality
            )));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(Error::Config("capture size must be non-zero".into()));
        }
        if self.cooldown.seconds.is_nan() {
            return Err(Error::Config("cooldown.seconds must be a number".into()));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let text = std::fs::read_to_string(path)?;
    let config = AppConfig::from_toml(&text)?;
    log::debug!("Loaded configuration from {path:?}");
    Ok(config)
}
