use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("onnx runtime error: {0}")]
    Ort(#[from] ort::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The capture device could not be opened or stopped producing frames.
    #[error("capture failed: {0}")]
    Capture(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid font file {path:?}")]
    Font { path: PathBuf },

    #[error("unexpected model output: {0}")]
    Model(String),

    #[error("model file {path:?} is missing")]
    MissingModel { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;
