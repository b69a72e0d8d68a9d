//! DB (differentiable binarization) text region detector.

use std::path::Path;

use geo::MinimumRotatedRect;
use image::{imageops::FilterType, RgbImage};
use imageproc::{
    contours::find_contours,
    contrast::{threshold_mut, ThresholdType},
    distance_transform::Norm,
    morphology::dilate_mut,
};
use ndarray::ArrayView2;
use ort::{inputs, Session};
use tracing::instrument;

use crate::{
    detection::Quad,
    error::{Error, Result},
    geometry::{
        contour_polygon, longest_edge, mean_score, normalized_tensor, plan_resize,
        probability_image, unclip, ResizePlan,
    },
    session::{open_session, ExecutionProvider},
    DetectionOptions,
};

const MEAN_VALUES: [f32; 3] = [0.485, 0.456, 0.406];
const NORM_VALUES: [f32; 3] = [1.0 / 0.229, 1.0 / 0.224, 1.0 / 0.225];

const MAX_CANDIDATES: usize = 1000;
const MIN_SIDE: f32 = 3.0;

/// A detected text region in frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    pub quad: Quad,
    pub polygon: geo::Polygon<f32>,
    pub score: f32,
}

pub struct TextDetector {
    session: Session,
}

impl TextDetector {
    pub fn init(
        model: &Path,
        threads: usize,
        providers: &[ExecutionProvider],
        cache_path: Option<&Path>,
    ) -> Result<Self> {
        let session = open_session(model, threads, providers, cache_path)?;
        Ok(Self { session })
    }

    #[instrument(level = "debug", skip(self, frame))]
    pub fn detect(
        &self,
        frame: &RgbImage,
        max_side_len: u32,
        options: &DetectionOptions,
    ) -> Result<Vec<TextRegion>> {
        let plan = plan_resize(frame.width(), frame.height(), max_side_len);
        let resized = image::imageops::resize(frame, plan.width, plan.height, FilterType::Nearest);
        let input = normalized_tensor(&resized, &MEAN_VALUES, &NORM_VALUES);

        let outputs = self.session.run(inputs!["x" => input]?)?;
        let (_, output) = outputs
            .first_key_value()
            .ok_or_else(|| Error::Model("detector produced no outputs".into()))?;
        let probabilities = output.try_extract_tensor::<f32>()?;
        let shape = probabilities.shape();
        if shape.len() < 2 {
            return Err(Error::Model(format!("detector output shape {shape:?}")));
        }
        let (height, width) = (shape[shape.len() - 2], shape[shape.len() - 1]);
        let map = probabilities
            .to_shape((height, width))
            .map_err(|err| Error::Model(err.to_string()))?;

        Ok(extract_regions(map.view(), plan, options))
    }
}

/// Turns a probability map into scored, unclipped regions scaled back to the
/// source frame.
#[instrument(level = "trace", skip(map))]
pub(crate) fn extract_regions(
    map: ArrayView2<f32>,
    plan: ResizePlan,
    options: &DetectionOptions,
) -> Vec<TextRegion> {
    let mut mask = probability_image(map);
    threshold_mut(
        &mut mask,
        (options.box_threshold * 255.0) as u8,
        ThresholdType::Binary,
    );
    dilate_mut(&mut mask, Norm::L1, 2);

    find_contours::<i32>(&mask)
        .into_iter()
        .take(MAX_CANDIDATES)
        .filter(|contour| contour.points.len() > 2)
        .filter_map(|contour| contour_polygon(&contour.points).minimum_rotated_rect())
        .filter(|rect| longest_edge(rect) >= MIN_SIDE)
        .filter_map(|rect| {
            let score = mean_score(&rect, map);
            (score >= options.box_score_threshold).then_some((rect, score))
        })
        .filter_map(|(rect, score)| Some((unclip(rect, options.unclip_ratio)?, score)))
        .filter(|(rect, _)| longest_edge(rect) >= MIN_SIDE + 2.0)
        .filter_map(|(rect, score)| {
            let polygon = geo::Scale::scale_around_point(
                &rect,
                plan.factor_x,
                plan.factor_y,
                geo::Coord::zero(),
            );
            let quad = Quad::from_polygon(&polygon)?;
            Some(TextRegion {
                quad,
                polygon,
                score,
            })
        })
        .collect()
}
