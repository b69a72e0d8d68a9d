//! Box and label drawing for accepted detections.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};

use crate::{
    detection::Detection,
    error::{Error, Result},
};

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const TEXT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const BOX_THICKNESS: u32 = 2;
const TEXT_SCALE: f32 = 24.0;
const TEXT_OFFSET: i32 = 10;

/// Fonts tried when none is configured.
const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    pub fn from_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let font = FontVec::try_from_vec(bytes).map_err(|_| Error::Font {
            path: path.to_path_buf(),
        })?;
        Ok(Self::new(Some(font)))
    }

    /// Uses the configured font if given, otherwise the first system font
    /// found. Falls back to boxes only.
    pub fn load(font_path: Option<&Path>) -> Self {
        let candidates = font_path
            .map(|path| vec![path.to_path_buf()])
            .unwrap_or_else(|| FALLBACK_FONTS.iter().map(PathBuf::from).collect());

        for path in candidates.iter().filter(|path| path.is_file()) {
            match Self::from_font_file(path) {
                Ok(annotator) => {
                    log::debug!("Using label font {path:?}");
                    return annotator;
                }
                Err(err) => log::warn!("{err}"),
            }
        }
        log::warn!("No usable font found, labels will not be drawn");
        Self::new(None)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Rectangle over the quad plus the raw text just above it. For an upright
    /// quad the rectangle runs from its top-left to its bottom-right corner.
    pub fn draw(&self, frame: &mut RgbImage, detection: &Detection) {
        let Some(rect) = box_rect(frame, detection) else {
            return;
        };

        draw_hollow_rect_mut(frame, rect, BOX_COLOR);
        for inset in 1..BOX_THICKNESS {
            let (width, height) = (rect.width(), rect.height());
            if width <= 2 * inset || height <= 2 * inset {
                break;
            }
            let inner = Rect::at(rect.left() + inset as i32, rect.top() + inset as i32)
                .of_size(width - 2 * inset, height - 2 * inset);
            draw_hollow_rect_mut(frame, inner, BOX_COLOR);
        }

        if let Some(font) = &self.font {
            draw_text_mut(
                frame,
                TEXT_COLOR,
                rect.left(),
                rect.top() - TEXT_OFFSET,
                PxScale::from(TEXT_SCALE),
                font,
                &detection.text,
            );
        }
    }
}

/// Axis aligned bounds of the quad, clamped to the frame. `None` when it lies
/// entirely outside.
fn box_rect(frame: &RgbImage, detection: &Detection) -> Option<Rect> {
    let (frame_width, frame_height) = (frame.width() as i32, frame.height() as i32);
    let (min, max) = detection.quad.bounds();

    let left = (min.x as i32).max(0);
    let top = (min.y as i32).max(0);
    let right = (max.x as i32).min(frame_width - 1);
    let bottom = (max.y as i32).min(frame_height - 1);
    if left > right || top > bottom {
        return None;
    }

    let width = (right - left + 1).max(1) as u32;
    let height = (bottom - top + 1).max(1) as u32;
    Some(Rect::at(left, top).of_size(width, height))
}
