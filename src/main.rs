use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use camocr::{
    config::{load_config, AppConfig},
    ocr::parse_languages,
    Annotator, CooldownFilter, DisplaySink, FrameSource, OcrEngineBuilder, Pipeline, StillImage,
    WebDisplay,
};
use clap::Parser;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Real-time OCR on a webcam feed, viewed in the browser.
#[derive(Parser, Debug)]
#[command(name = "camocr", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OCR languages, e.g. `--lang en,hi`
    #[arg(short, long = "lang", value_delimiter = ',')]
    languages: Vec<String>,

    /// Run OCR on the CPU even if a GPU provider is available
    #[arg(long)]
    cpu: bool,

    /// Directory holding det.onnx, cls.onnx and rec_<lang>.onnx
    #[arg(long)]
    models: Option<PathBuf>,

    /// Webcam index (/dev/video<N>)
    #[arg(short, long)]
    device: Option<usize>,

    /// Replay an image file instead of opening the webcam
    #[arg(long)]
    image: Option<PathBuf>,

    /// Seconds before the same text is annotated again
    #[arg(long)]
    cooldown: Option<f64>,

    /// Address the UI listens on
    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// TrueType font for labels
    #[arg(long)]
    font: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) -> camocr::Result<()> {
        if !self.languages.is_empty() {
            config.ocr.languages = parse_languages(&self.languages)?;
        }
        if self.cpu {
            config.ocr.use_gpu = false;
        }
        if let Some(models) = &self.models {
            config.ocr.model_dir = models.clone();
        }
        if let Some(device) = self.device {
            config.capture.device = device;
        }
        if let Some(image) = &self.image {
            config.capture.image = Some(image.clone());
        }
        if let Some(cooldown) = self.cooldown {
            config.cooldown.seconds = cooldown;
        }
        if let Some(host) = &self.host {
            config.web.host = host.clone();
        }
        if let Some(port) = self.port {
            config.web.port = port;
        }
        if let Some(font) = &self.font {
            config.annotate.font_path = Some(font.clone());
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("loading {path:?}"))?,
        None => AppConfig::default(),
    };
    args.apply(&mut config)?;
    config.validate()?;

    let mut display = WebDisplay::start(&config.web, &config.ocr.languages, config.ocr.use_gpu)
        .context("starting the web UI")?;

    let mut builder = OcrEngineBuilder::new()
        .languages(config.ocr.languages.iter().copied())
        .use_gpu(config.ocr.use_gpu)
        .model_dir(&config.ocr.model_dir)
        .threads(config.ocr.threads)
        .max_side_len(config.ocr.max_side_len)
        .use_classifier(config.ocr.use_classifier);
    if let Some(cache) = &config.ocr.cache_dir {
        std::fs::create_dir_all(cache).with_context(|| format!("creating {cache:?}"))?;
        builder = builder.with_engine_cache_path(cache);
    }
    let mut engine = match builder.build() {
        Ok(engine) => engine,
        Err(err) => {
            display.report_error(&format!("Failed to load OCR models: {err}"));
            display.linger(Duration::from_secs(config.web.linger_secs));
            return Err(err).context("building the OCR engine");
        }
    };
    tracing::info!(
        languages = ?engine.languages().collect::<Vec<_>>(),
        providers = ?engine.providers(),
        "OCR engine loaded"
    );

    let source = match open_source(&config) {
        Ok(source) => source,
        Err(err) => {
            display.report_error(camocr::pipeline::CAPTURE_FAILED);
            display.linger(Duration::from_secs(config.web.linger_secs));
            return Err(err).context("opening the capture source");
        }
    };

    let mut pipeline = Pipeline::new(
        CooldownFilter::from_secs_f64(config.cooldown.seconds),
        Annotator::load(config.annotate.font_path.as_deref()),
    );
    let outcome = pipeline.run_until_stopped(source, &mut engine, &mut display);
    display.finish(&outcome, Duration::from_secs(config.web.linger_secs));
    let summary = outcome.context("running the capture loop")?;
    tracing::info!(
        frames = summary.frames,
        annotations = summary.annotations,
        "Done"
    );

    Ok(())
}

fn open_source(config: &AppConfig) -> camocr::Result<Box<dyn FrameSource>> {
    if let Some(image) = &config.capture.image {
        return Ok(Box::new(StillImage::open(image)?));
    }
    open_webcam(config)
}

#[cfg(feature = "webcam")]
fn open_webcam(config: &AppConfig) -> camocr::Result<Box<dyn FrameSource>> {
    let camera = camocr::Webcam::open(
        config.capture.device,
        config.capture.width,
        config.capture.height,
    )?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "webcam"))]
fn open_webcam(_config: &AppConfig) -> camocr::Result<Box<dyn FrameSource>> {
    Err(camocr::Error::Capture(
        "built without webcam support, pass --image".to_string(),
    ))
}
