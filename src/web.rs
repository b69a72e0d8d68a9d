//! Browser UI: an MJPEG stream of the annotated frames, a Stop button and a
//! status line, served by axum on its own runtime.

use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use image::{codecs::jpeg::JpegEncoder, RgbImage};
use serde::Serialize;
use tokio::{net::TcpListener, runtime::Runtime, sync::watch};
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{
    config::WebSettings,
    display::DisplaySink,
    error::{Error, Result},
    ocr::Language,
    pipeline::RunSummary,
};

const BOUNDARY: &str = "frame";
const MAX_PORT_ATTEMPTS: u16 = 10;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<style>
  body { font-family: sans-serif; margin: 2rem; }
  #status.error { color: #c00; }
  img { max-width: 100%; border: 1px solid #ccc; }
</style>
</head>
<body>
<h1>{{title}}</h1>
<p>Languages: {{languages}} &middot; GPU: {{gpu}}</p>
<img src="/stream" alt="annotated webcam stream">
<p>Press 'Stop' to exit</p>
<button id="stop">Stop</button>
<p id="status"></p>
<script>
  const status = document.getElementById("status");
  async function refresh() {
    try {
      const response = await fetch("/status");
      const body = await response.json();
      status.textContent = `${body.message} (${body.frames} frames)`;
      status.className = body.level;
    } catch (e) {
      // Server gone: keep the last error on screen.
      if (status.className !== "error") {
        status.textContent = "Webcam stopped";
        status.className = "info";
      }
    }
  }
  document.getElementById("stop").onclick = async () => {
    await fetch("/stop", { method: "POST" });
    refresh();
  };
  setInterval(refresh, 1000);
  refresh();
</script>
</body>
</html>
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub running: bool,
    pub level: StatusLevel,
    pub message: String,
    pub frames: u64,
    pub languages: Vec<Language>,
    pub use_gpu: bool,
    pub stop_requested: bool,
}

impl Status {
    fn starting(languages: &[Language], use_gpu: bool) -> Self {
        Self {
            running: false,
            level: StatusLevel::Info,
            message: "Waiting for the first frame".to_string(),
            frames: 0,
            languages: languages.to_vec(),
            use_gpu,
            stop_requested: false,
        }
    }
}

/// State shared between the capture loop and the HTTP handlers.
#[derive(Clone)]
struct AppState {
    title: Arc<str>,
    latest_frame: Arc<watch::Sender<Option<Bytes>>>,
    status: Arc<watch::Sender<Status>>,
    stop: Arc<AtomicBool>,
    /// Set by Ctrl-C. Ends the capture loop and any linger afterwards.
    interrupted: Arc<watch::Sender<bool>>,
}

impl AppState {
    fn new(title: &str, status: Status) -> Self {
        Self {
            title: Arc::from(title),
            latest_frame: Arc::new(watch::Sender::new(None)),
            status: Arc::new(watch::Sender::new(status)),
            stop: Arc::new(AtomicBool::new(false)),
            interrupted: Arc::new(watch::Sender::new(false)),
        }
    }

    fn publish(&self, jpeg: Bytes) {
        self.latest_frame.send_replace(Some(jpeg));
        self.status.send_modify(|status| {
            if !status.running && status.level == StatusLevel::Info {
                status.running = true;
                status.message = "Streaming".to_string();
            }
            status.frames += 1;
        });
    }

    fn set_message(&self, level: StatusLevel, message: &str) {
        self.status.send_modify(|status| {
            status.level = level;
            status.message = message.to_string();
            if level == StatusLevel::Error {
                status.running = false;
            }
        });
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn interrupt(&self) {
        self.request_stop();
        self.interrupted.send_replace(true);
    }

    fn snapshot(&self) -> Status {
        let mut status = self.status.borrow().clone();
        status.stop_requested = self.stop_requested();
        status
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/stream", get(stream))
        .route("/status", get(status))
        .route("/stop", post(stop))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let status = state.snapshot();
    let languages = status
        .languages
        .iter()
        .map(|language| language.code())
        .collect::<Vec<_>>()
        .join(", ");
    Html(
        INDEX_HTML
            .replace("{{title}}", &escape_html(&state.title))
            .replace("{{languages}}", &languages)
            .replace("{{gpu}}", if status.use_gpu { "on" } else { "off" }),
    )
}

async fn stream(State(state): State<AppState>) -> Response {
    let parts = WatchStream::new(state.latest_frame.subscribe())
        .filter_map(|frame| frame)
        .map(|jpeg| Ok::<_, Infallible>(multipart_part(&jpeg)));

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(state.snapshot())
}

async fn stop(State(state): State<AppState>) -> Json<Status> {
    info!("Stop requested from the browser");
    state.request_stop();
    state.set_message(StatusLevel::Info, "Stopping");
    Json(state.snapshot())
}

fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(frame)?;
    Ok(buffer)
}

/// Tries `port` and the following ports until one binds.
async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let mut last_error = None;
    for attempt in 0..MAX_PORT_ATTEMPTS {
        let Some(candidate) = port.checked_add(attempt) else {
            break;
        };
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                if attempt > 0 {
                    warn!("Port {port} unavailable, using {candidate}");
                }
                return Ok(listener);
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(match last_error {
        Some(err) => Error::Io(err),
        None => Error::Config(format!("no usable port from {port}")),
    })
}

/// Serves the UI until dropped.
pub struct WebDisplay {
    state: AppState,
    addr: SocketAddr,
    jpeg_quality: u8,
    shutdown: watch::Sender<bool>,
    runtime: Option<Runtime>,
}

impl WebDisplay {
    pub fn start(settings: &WebSettings, languages: &[Language], use_gpu: bool) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("camocr-web")
            .enable_all()
            .build()?;

        let state = AppState::new(&settings.title, Status::starting(languages, use_gpu));
        let listener = runtime.block_on(bind(&settings.host, settings.port))?;
        let addr = listener.local_addr()?;

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let app = router(state.clone());
        runtime.spawn(async move {
            let graceful = async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("Web server failed: {err}");
            }
        });

        let ctrl_c = state.clone();
        runtime.spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping");
                ctrl_c.interrupt();
            }
        });

        info!("Open http://{addr} to watch the stream");
        Ok(Self {
            state,
            addr,
            jpeg_quality: settings.jpeg_quality,
            shutdown,
            runtime: Some(runtime),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn status(&self) -> Status {
        self.state.snapshot()
    }

    /// Publishes how the capture loop ended, then keeps the page up for
    /// `linger` so the browser can still show it.
    pub fn finish(&mut self, outcome: &Result<RunSummary>, linger: Duration) {
        match outcome {
            Ok(_) => self.notify("Webcam stopped"),
            // Already reported by the loop.
            Err(Error::Capture(_)) => {}
            Err(err) => self.report_error(&format!("OCR failed: {err}")),
        }
        self.linger(linger);
    }

    /// Blocks for up to `timeout` while the server keeps answering. Returns
    /// early on Ctrl-C, immediately if Ctrl-C already ended the loop.
    pub fn linger(&self, timeout: Duration) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        if timeout.is_zero() {
            return;
        }
        let mut interrupted = self.state.interrupted.subscribe();
        if *interrupted.borrow() {
            return;
        }
        info!(
            "Still serving http://{} for {}s, press Ctrl-C to exit",
            self.addr,
            timeout.as_secs()
        );
        runtime.block_on(async {
            let _ = tokio::time::timeout(timeout, interrupted.wait_for(|done| *done)).await;
        });
    }
}

impl DisplaySink for WebDisplay {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        let jpeg = encode_jpeg(frame, self.jpeg_quality)?;
        self.state.publish(Bytes::from(jpeg));
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.state.stop_requested()
    }

    fn report_error(&mut self, message: &str) {
        error!("{message}");
        self.state.set_message(StatusLevel::Error, message);
    }

    fn notify(&mut self, message: &str) {
        info!("{message}");
        self.state.set_message(StatusLevel::Info, message);
    }
}

impl Drop for WebDisplay {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
        }
    }
}
