//! Text line orientation classifier (0° vs 180°).

use std::path::Path;

use float_ord::FloatOrd;
use image::{imageops::FilterType, RgbImage};
use ort::{inputs, Session};
use tracing::instrument;

use crate::{
    error::{Error, Result},
    geometry::normalized_tensor,
    session::{open_session, ExecutionProvider},
};

const DEST_WIDTH: u32 = 192;
const DEST_HEIGHT: u32 = 48;

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub upside_down: bool,
    pub score: f32,
}

pub struct OrientationClassifier {
    session: Session,
}

impl OrientationClassifier {
    pub fn init(model: &Path, threads: usize, providers: &[ExecutionProvider]) -> Result<Self> {
        let session = open_session(model, threads, providers, None)?;
        Ok(Self { session })
    }

    /// Classifies each crop. With `majority` set every crop gets the
    /// orientation most crops agree on.
    #[instrument(level = "debug", skip(self, crops))]
    pub fn classify(&self, crops: &[RgbImage], majority: bool) -> Result<Vec<Orientation>> {
        let orientations = crops
            .iter()
            .map(|crop| self.classify_one(crop))
            .collect::<Result<Vec<_>>>()?;
        Ok(if majority {
            apply_majority(orientations)
        } else {
            orientations
        })
    }

    fn classify_one(&self, crop: &RgbImage) -> Result<Orientation> {
        let resized = image::imageops::resize(crop, DEST_WIDTH, DEST_HEIGHT, FilterType::Nearest);
        let input = normalized_tensor(&resized, &MEAN_VALUES, &NORM_VALUES);
        let outputs = self.session.run(inputs!["x" => input]?)?;
        let (_, output) = outputs
            .first_key_value()
            .ok_or_else(|| Error::Model("classifier produced no outputs".into()))?;
        let scores = output.try_extract_tensor::<f32>()?;

        scores
            .iter()
            .enumerate()
            .max_by_key(|(_, score)| FloatOrd(**score))
            .map(|(index, score)| Orientation {
                upside_down: index == 1,
                score: *score,
            })
            .ok_or_else(|| Error::Model("classifier produced an empty tensor".into()))
    }
}

fn apply_majority(mut orientations: Vec<Orientation>) -> Vec<Orientation> {
    let flipped = orientations.iter().filter(|it| it.upside_down).count();
    let upside_down = flipped * 2 >= orientations.len() && flipped > 0;
    for orientation in orientations.iter_mut() {
        orientation.upside_down = upside_down;
    }
    orientations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orientation(upside_down: bool) -> Orientation {
        Orientation {
            upside_down,
            score: 0.9,
        }
    }

    #[test]
    fn majority_flips_everything() {
        let result = apply_majority(vec![orientation(true), orientation(true), orientation(false)]);
        assert!(result.iter().all(|it| it.upside_down));
    }

    #[test]
    fn minority_is_overruled() {
        let result = apply_majority(vec![orientation(true), orientation(false), orientation(false)]);
        assert!(result.iter().all(|it| !it.upside_down));
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(apply_majority(Vec::new()).is_empty());
    }
}
