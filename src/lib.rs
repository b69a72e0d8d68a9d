//! Live webcam OCR: frames are run through an ONNX OCR pipeline, text that
//! was not seen in the last few seconds is boxed and labelled, and the result
//! is streamed to a browser.

pub mod annotate;
pub mod capture;
mod classifier;
pub mod config;
pub mod cooldown;
pub mod detection;
mod detector;
pub mod display;
pub mod error;
pub mod geometry;
pub mod ocr;
pub mod pipeline;
mod recognizer;
pub mod session;
pub mod web;

pub use annotate::Annotator;
pub use capture::{FrameSource, StillImage};
pub use config::AppConfig;
pub use cooldown::CooldownFilter;
pub use detection::{Detection, Quad};
pub use display::DisplaySink;
pub use error::{Error, Result};
pub use ocr::{DetectionOptions, Language, OcrEngine, OcrEngineBuilder, TextReader};
pub use pipeline::{Pipeline, RunSummary};
pub use recognizer::TextLine;
pub use web::WebDisplay;

#[cfg(feature = "webcam")]
pub use capture::Webcam;

pub use ort as runtime;
