//! Image and polygon helpers shared by the detection and recognition stages.

use geo::{
    point, Area, BoundingRect, Contains, Coord, EuclideanLength, HasDimensions, LineString,
    MinimumRotatedRect, Polygon, Translate,
};
use geo_clipper::{Clipper, EndType, JoinType};
use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::point::Point;
use ndarray::{s, Array4, ArrayView2, Axis};
use tracing::instrument;

/// Converts an RGB image into a `1x3xHxW` tensor of `(pixel - mean) * norm`
/// with pixels scaled to `[0, 1]`.
#[instrument(level = "trace", skip(image))]
pub(crate) fn normalized_tensor(
    image: &RgbImage,
    mean: &[f32; 3],
    norm: &[f32; 3],
) -> Array4<f32> {
    let (width, height) = image.dimensions();
    Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| {
            let value = image.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0;
            (value - mean[channel]) * norm[channel]
        },
    )
}

/// Renders a probability map in `[0, 1]` as an 8-bit grayscale image.
pub(crate) fn probability_image(map: ArrayView2<f32>) -> GrayImage {
    let height = map.len_of(Axis(0)) as u32;
    let width = map.len_of(Axis(1)) as u32;
    GrayImage::from_fn(width, height, |x, y| {
        let p = map[[y as usize, x as usize]].clamp(0.0, 1.0);
        Luma([(p * 255.0) as u8])
    })
}

pub(crate) fn contour_polygon(points: &[Point<i32>]) -> Polygon<f32> {
    let ring = points
        .iter()
        .map(|point| Coord {
            x: point.x as f32,
            y: point.y as f32,
        })
        .collect::<Vec<_>>();
    Polygon::new(LineString::new(ring), vec![])
}

/// Length of the longest edge, truncated to whole pixels.
pub(crate) fn longest_edge(polygon: &Polygon<f32>) -> f32 {
    polygon
        .exterior()
        .lines()
        .map(|line| line.euclidean_length() as i32)
        .max()
        .unwrap_or(0) as f32
}

/// Mean of the probability map over the pixels inside `polygon`.
pub(crate) fn mean_score(polygon: &Polygon<f32>, map: ArrayView2<f32>) -> f32 {
    let Some(bounds) = polygon.bounding_rect() else {
        return 0.0;
    };
    let (rows, cols) = map.dim();
    let min = bounds.min();
    let max = bounds.max();
    let x0 = (min.x.max(0.0) as usize).min(cols);
    let y0 = (min.y.max(0.0) as usize).min(rows);
    let x1 = (max.x.max(0.0) as usize).clamp(x0, cols);
    let y1 = (max.y.max(0.0) as usize).clamp(y0, rows);

    let local = polygon.translate(-(x0 as f32), -(y0 as f32));
    let (sum, count) = map
        .slice(s![y0..y1, x0..x1])
        .indexed_iter()
        .filter(|((y, x), _)| local.contains(&point! { x: *x as f32, y: *y as f32 }))
        .fold((0.0f32, 0usize), |(sum, count), (_, value)| {
            (sum + *value, count + 1)
        });

    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Grows a shrunk text kernel back to the full text region.
pub(crate) fn unclip(polygon: Polygon<f32>, ratio: f32) -> Option<Polygon<f32>> {
    let perimeter = polygon.exterior().euclidean_length();
    if perimeter <= 0.0 {
        return None;
    }
    let distance = polygon.unsigned_area() * ratio / perimeter;
    let grown = polygon.offset(distance, JoinType::Round(0.25), EndType::ClosedPolygon, 1.0);

    if grown.is_empty() {
        None
    } else {
        grown.minimum_rotated_rect()
    }
}

/// Target size for the detection model and the factors mapping model
/// coordinates back to the source frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePlan {
    pub width: u32,
    pub height: u32,
    pub factor_x: f32,
    pub factor_y: f32,
}

/// Fits `width x height` inside `max_side` keeping the aspect ratio, then
/// floors both sides to a multiple of 32 (minimum 32) as the DB model needs.
pub fn plan_resize(width: u32, height: u32, max_side: u32) -> ResizePlan {
    let (width, height) = (width.max(1), height.max(1));
    let (target_width, target_height) = if width >= height {
        let target = width.min(max_side);
        (target, (target as u64 * height as u64 / width as u64) as u32)
    } else {
        let target = height.min(max_side);
        ((target as u64 * width as u64 / height as u64) as u32, target)
    };
    let floor32 = |side: u32| (side / 32 * 32).max(32);
    let (target_width, target_height) = (floor32(target_width), floor32(target_height));
    let plan = ResizePlan {
        width: target_width,
        height: target_height,
        factor_x: width as f32 / target_width as f32,
        factor_y: height as f32 / target_height as f32,
    };
    log::debug!("Resizing {width}x{height} for detection: {plan:?}");
    plan
}

/// Crops the axis aligned bounds of `region`, clamped to the image.
pub(crate) fn crop_region(image: &RgbImage, region: &Polygon<f32>) -> Option<RgbImage> {
    let rect = region.bounding_rect()?;
    let x = (rect.min().x.max(0.0) as u32).min(image.width());
    let y = (rect.min().y.max(0.0) as u32).min(image.height());
    let width = (rect.width().max(0.0) as u32).min(image.width() - x);
    let height = (rect.height().max(0.0) as u32).min(image.height() - y);
    if width == 0 || height == 0 {
        log::trace!("Skipping empty crop at {rect:?}");
        return None;
    }
    Some(imageops::crop_imm(image, x, y, width, height).to_image())
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use ndarray::Array2;

    use super::*;

    #[test]
    fn landscape_frame_is_floored_to_multiples_of_32() {
        let plan = plan_resize(1280, 720, 1024);
        assert_eq!((plan.width, plan.height), (1024, 576));
        assert_eq!(plan.factor_x, 1.25);
        assert_eq!(plan.factor_y, 1.25);
    }

    #[test]
    fn small_frame_keeps_minimum_side() {
        let plan = plan_resize(20, 10, 1024);
        assert_eq!((plan.width, plan.height), (32, 32));
    }

    #[test]
    fn portrait_frame_limits_height() {
        let plan = plan_resize(480, 960, 640);
        assert_eq!((plan.width, plan.height), (320, 640));
    }

    #[test]
    fn mean_score_averages_inside_polygon() {
        let mut map = Array2::<f32>::zeros((10, 10));
        map.slice_mut(s![2..6, 2..6]).fill(1.0);
        let square = polygon![
            (x: 2.0f32, y: 2.0),
            (x: 6.0, y: 2.0),
            (x: 6.0, y: 6.0),
            (x: 2.0, y: 6.0),
        ];
        let score = mean_score(&square, map.view());
        assert!(score > 0.9, "score was {score}");
    }

    #[test]
    fn mean_score_outside_map_is_zero() {
        let map = Array2::<f32>::ones((4, 4));
        let far = polygon![
            (x: 40.0f32, y: 40.0),
            (x: 50.0, y: 40.0),
            (x: 50.0, y: 50.0),
            (x: 40.0, y: 50.0),
        ];
        assert_eq!(mean_score(&far, map.view()), 0.0);
    }

    #[test]
    fn crop_is_clamped_to_image() {
        let image = RgbImage::new(20, 10);
        let region = polygon![
            (x: 15.0f32, y: 5.0),
            (x: 40.0, y: 5.0),
            (x: 40.0, y: 30.0),
            (x: 15.0, y: 30.0),
        ];
        let crop = crop_region(&image, &region).unwrap();
        assert_eq!(crop.dimensions(), (5, 5));
    }

    #[test]
    fn tensor_is_channel_first() {
        let image = RgbImage::from_pixel(3, 2, image::Rgb([255, 0, 128]));
        let tensor = normalized_tensor(&image, &[0.5; 3], &[2.0; 3]);
        assert_eq!(tensor.shape(), &[1, 3, 2, 3]);
        assert_eq!(tensor[[0, 0, 1, 2]], 1.0);
        assert_eq!(tensor[[0, 1, 0, 0]], -1.0);
    }
}
