//! The capture loop: read a frame, run OCR, annotate what is new, show it.

use std::time::Instant;

use image::RgbImage;
use tracing::instrument;

use crate::{
    annotate::Annotator,
    capture::FrameSource,
    cooldown::CooldownFilter,
    detection::Detection,
    display::DisplaySink,
    error::Result,
    ocr::TextReader,
};

pub const CAPTURE_FAILED: &str = "Failed to capture from webcam";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub annotations: u64,
}

pub struct Pipeline {
    filter: CooldownFilter,
    annotator: Annotator,
}

impl Pipeline {
    pub fn new(filter: CooldownFilter, annotator: Annotator) -> Self {
        Self { filter, annotator }
    }

    pub fn filter(&self) -> &CooldownFilter {
        &self.filter
    }

    /// Draws every detection the filter accepts at `now`, then evicts expired
    /// entries. Returns the number drawn.
    pub fn process_frame(
        &mut self,
        frame: &mut RgbImage,
        detections: &[Detection],
        now: Instant,
    ) -> usize {
        let mut drawn = 0;
        for detection in detections {
            if !self.filter.accept(&detection.text, now) {
                continue;
            }
            log::debug!(
                "New text {:?} ({:.2}) at {:?}",
                detection.text,
                detection.confidence,
                detection.quad.top_left()
            );
            self.annotator.draw(frame, detection);
            drawn += 1;
        }
        self.filter.evict(now);
        drawn
    }

    /// Runs until `should_stop` returns true after a displayed frame. The
    /// source is dropped when this returns, whichever way it returns.
    pub fn run<S, R, D>(
        &mut self,
        source: S,
        reader: &mut R,
        sink: &mut D,
        mut should_stop: impl FnMut() -> bool,
    ) -> Result<RunSummary>
    where
        S: FrameSource,
        R: TextReader + ?Sized,
        D: DisplaySink + ?Sized,
    {
        self.run_loop(source, reader, sink, |_| should_stop())
    }

    /// Runs until the display sink reports a stop request.
    pub fn run_until_stopped<S, R, D>(
        &mut self,
        source: S,
        reader: &mut R,
        sink: &mut D,
    ) -> Result<RunSummary>
    where
        S: FrameSource,
        R: TextReader + ?Sized,
        D: DisplaySink + ?Sized,
    {
        self.run_loop(source, reader, sink, |sink| sink.stop_requested())
    }

    #[instrument(level = "info", skip_all)]
    fn run_loop<S, R, D>(
        &mut self,
        mut source: S,
        reader: &mut R,
        sink: &mut D,
        mut should_stop: impl FnMut(&D) -> bool,
    ) -> Result<RunSummary>
    where
        S: FrameSource,
        R: TextReader + ?Sized,
        D: DisplaySink + ?Sized,
    {
        let mut summary = RunSummary::default();
        loop {
            let mut frame = match source.read() {
                Ok(frame) => frame,
                Err(err) => {
                    log::error!("{err}");
                    sink.report_error(CAPTURE_FAILED);
                    return Err(err);
                }
            };

            let now = Instant::now();
            let detections = reader.read_text(&frame)?;
            summary.annotations += self.process_frame(&mut frame, &detections, now) as u64;

            sink.show(&frame)?;
            summary.frames += 1;

            if should_stop(&*sink) {
                log::info!(
                    "Stopped after {} frames, {} annotations",
                    summary.frames,
                    summary.annotations
                );
                return Ok(summary);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use geo::coord;
    use image::Rgb;

    use super::*;
    use crate::{annotate::BOX_COLOR, detection::Quad};

    fn detection(text: &str, x: f32) -> Detection {
        let quad = Quad::from_points([
            coord! { x: x, y: 2.0 },
            coord! { x: x + 6.0, y: 2.0 },
            coord! { x: x + 6.0, y: 8.0 },
            coord! { x: x, y: 8.0 },
        ]);
        Detection::new(quad, text, 0.9)
    }

    fn pipeline(seconds: f64) -> Pipeline {
        Pipeline::new(CooldownFilter::from_secs_f64(seconds), Annotator::new(None))
    }

    #[test]
    fn only_new_text_is_drawn() {
        let start = Instant::now();
        let mut pipeline = pipeline(3.0);
        let detections = [detection("Exit", 1.0), detection("Push", 20.0)];

        let mut first = RgbImage::new(40, 12);
        assert_eq!(pipeline.process_frame(&mut first, &detections, start), 2);
        assert_eq!(*first.get_pixel(1, 2), BOX_COLOR);
        assert_eq!(*first.get_pixel(20, 2), BOX_COLOR);

        let mut second = RgbImage::new(40, 12);
        let later = start + Duration::from_secs(1);
        assert_eq!(pipeline.process_frame(&mut second, &detections, later), 0);
        assert!(second.pixels().all(|pixel| *pixel == Rgb([0, 0, 0])));
    }

    #[test]
    fn first_raw_variant_wins_inside_the_window() {
        let start = Instant::now();
        let mut pipeline = pipeline(3.0);
        let mut frame = RgbImage::new(40, 12);
        let detections = [detection("EXIT", 1.0), detection("exit ", 20.0)];

        assert_eq!(pipeline.process_frame(&mut frame, &detections, start), 1);
        assert_eq!(*frame.get_pixel(1, 2), BOX_COLOR);
        assert_eq!(*frame.get_pixel(20, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn expired_entries_are_evicted_each_frame() {
        let start = Instant::now();
        let mut pipeline = pipeline(3.0);
        let mut frame = RgbImage::new(40, 12);

        pipeline.process_frame(&mut frame, &[detection("a", 1.0)], start);
        assert!(pipeline.filter().contains("a"));

        pipeline.process_frame(&mut frame, &[], start + Duration::from_secs(5));
        assert!(pipeline.filter().is_empty());
    }
}
