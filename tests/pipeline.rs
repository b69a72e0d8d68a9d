use std::{
    cell::Cell,
    collections::VecDeque,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use camocr::{
    annotate::BOX_COLOR, pipeline::CAPTURE_FAILED, Annotator, CooldownFilter, Detection,
    DisplaySink, Error, FrameSource, Pipeline, Quad, Result, TextReader,
};
use geo::coord;
use image::{Rgb, RgbImage};

struct FakeCamera {
    frames: usize,
    released: Arc<AtomicBool>,
}

impl FakeCamera {
    fn new(frames: usize) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        (
            Self {
                frames,
                released: released.clone(),
            },
            released,
        )
    }
}

impl FrameSource for FakeCamera {
    fn read(&mut self) -> Result<RgbImage> {
        if self.frames == 0 {
            return Err(Error::Capture("device unplugged".into()));
        }
        self.frames -= 1;
        Ok(RgbImage::new(64, 32))
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Returns scripted detections, one batch per frame, then nothing.
#[derive(Default)]
struct ScriptedReader {
    batches: VecDeque<Result<Vec<Detection>>>,
    calls: usize,
}

impl ScriptedReader {
    fn every_frame(detections: Vec<Detection>, frames: usize) -> Self {
        Self {
            batches: (0..frames).map(|_| Ok(detections.clone())).collect(),
            calls: 0,
        }
    }
}

impl TextReader for ScriptedReader {
    fn read_text(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        self.calls += 1;
        self.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Default)]
struct RecordingDisplay {
    shown: Vec<RgbImage>,
    errors: Vec<String>,
    stop_after: Option<usize>,
}

impl DisplaySink for RecordingDisplay {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        self.shown.push(frame.clone());
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.stop_after
            .is_some_and(|limit| self.shown.len() >= limit)
    }

    fn report_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn notify(&mut self, _message: &str) {}
}

fn detection(text: &str) -> Detection {
    let quad = Quad::from_points([
        coord! { x: 4.0, y: 4.0 },
        coord! { x: 30.0, y: 4.0 },
        coord! { x: 30.0, y: 20.0 },
        coord! { x: 4.0, y: 20.0 },
    ]);
    Detection::new(quad, text, 0.95)
}

fn pipeline() -> Pipeline {
    Pipeline::new(CooldownFilter::default(), Annotator::new(None))
}

#[test]
fn stops_after_the_requested_frame() {
    let (camera, released) = FakeCamera::new(100);
    let mut reader = ScriptedReader::default();
    let mut display = RecordingDisplay::default();
    let checks = Rc::new(Cell::new(0));

    let summary = pipeline()
        .run(camera, &mut reader, &mut display, || {
            checks.set(checks.get() + 1);
            checks.get() == 3
        })
        .unwrap();

    assert_eq!(summary.frames, 3);
    assert_eq!(display.shown.len(), 3);
    assert_eq!(reader.calls, 3);
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn sink_stop_control_ends_the_loop() {
    let (camera, released) = FakeCamera::new(100);
    let mut reader = ScriptedReader::default();
    let mut display = RecordingDisplay {
        stop_after: Some(2),
        ..RecordingDisplay::default()
    };

    let summary = pipeline()
        .run_until_stopped(camera, &mut reader, &mut display)
        .unwrap();

    assert_eq!(summary.frames, 2);
    assert!(display.errors.is_empty());
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn repeated_text_is_annotated_once_per_window() {
    let (camera, _) = FakeCamera::new(100);
    let mut reader = ScriptedReader::every_frame(vec![detection("Exit")], 3);
    let mut display = RecordingDisplay {
        stop_after: Some(3),
        ..RecordingDisplay::default()
    };

    let summary = pipeline()
        .run_until_stopped(camera, &mut reader, &mut display)
        .unwrap();

    assert_eq!(summary.annotations, 1);
    assert_eq!(*display.shown[0].get_pixel(4, 4), BOX_COLOR);
    assert_eq!(*display.shown[1].get_pixel(4, 4), Rgb([0, 0, 0]));
    assert_eq!(*display.shown[2].get_pixel(4, 4), Rgb([0, 0, 0]));
}

#[test]
fn capture_failure_is_reported_and_releases_the_camera() {
    let (camera, released) = FakeCamera::new(2);
    let mut reader = ScriptedReader::default();
    let mut display = RecordingDisplay::default();

    let result = pipeline().run(camera, &mut reader, &mut display, || false);

    assert!(matches!(result, Err(Error::Capture(_))));
    assert_eq!(display.shown.len(), 2);
    assert_eq!(display.errors, vec![CAPTURE_FAILED.to_string()]);
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn ocr_failure_aborts_but_still_releases_the_camera() {
    let (camera, released) = FakeCamera::new(100);
    let mut reader = ScriptedReader {
        batches: VecDeque::from([
            Ok(vec![detection("fine")]),
            Err(Error::Model("inference blew up".into())),
        ]),
        calls: 0,
    };
    let mut display = RecordingDisplay::default();

    let result = pipeline().run(camera, &mut reader, &mut display, || false);

    assert!(matches!(result, Err(Error::Model(_))));
    assert_eq!(display.shown.len(), 1);
    assert!(display.errors.is_empty());
    assert!(released.load(Ordering::SeqCst));
}
