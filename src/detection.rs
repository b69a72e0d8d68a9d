use geo::{Coord, Polygon};

/// Four corners of a text region, ordered top-left, top-right, bottom-right,
/// bottom-left in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad(pub [Coord<f32>; 4]);

impl Quad {
    /// Orders four arbitrary corners of a (possibly rotated) rectangle: the
    /// two leftmost points form the left edge, the upper one of each pair is
    /// the top corner. Every input point is kept exactly once.
    pub fn from_points(points: [Coord<f32>; 4]) -> Self {
        let mut sorted = points;
        sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        let (top_left, bottom_left) = upper_first(sorted[0], sorted[1]);
        let (top_right, bottom_right) = upper_first(sorted[2], sorted[3]);
        Self([top_left, top_right, bottom_right, bottom_left])
    }

    /// Takes the first four exterior points of a polygon, `None` if it has
    /// fewer.
    pub fn from_polygon(polygon: &Polygon<f32>) -> Option<Self> {
        let coords = polygon.exterior().0.as_slice();
        if coords.len() < 4 {
            return None;
        }
        Some(Self::from_points([coords[0], coords[1], coords[2], coords[3]]))
    }

    pub fn top_left(&self) -> Coord<f32> {
        self.0[0]
    }

    pub fn top_right(&self) -> Coord<f32> {
        self.0[1]
    }

    pub fn bottom_right(&self) -> Coord<f32> {
        self.0[2]
    }

    pub fn bottom_left(&self) -> Coord<f32> {
        self.0[3]
    }

    /// Axis aligned `(min, max)` corners.
    pub fn bounds(&self) -> (Coord<f32>, Coord<f32>) {
        let mut min = self.0[0];
        let mut max = self.0[0];
        for point in &self.0[1..] {
            min.x = min.x.min(point.x);
            min.y = min.y.min(point.y);
            max.x = max.x.max(point.x);
            max.y = max.y.max(point.y);
        }
        (min, max)
    }
}

fn upper_first(a: Coord<f32>, b: Coord<f32>) -> (Coord<f32>, Coord<f32>) {
    if a.y <= b.y {
        (a, b)
    } else {
        (b, a)
    }
}

/// One OCR result for one text region of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub quad: Quad,
    pub text: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(quad: Quad, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            quad,
            text: text.into(),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use geo::{coord, polygon};

    use super::*;

    #[test]
    fn orders_shuffled_corners() {
        let quad = Quad::from_points([
            coord! { x: 50.0, y: 20.0 },
            coord! { x: 10.0, y: 40.0 },
            coord! { x: 10.0, y: 20.0 },
            coord! { x: 50.0, y: 40.0 },
        ]);
        assert_eq!(quad.top_left(), coord! { x: 10.0, y: 20.0 });
        assert_eq!(quad.top_right(), coord! { x: 50.0, y: 20.0 });
        assert_eq!(quad.bottom_right(), coord! { x: 50.0, y: 40.0 });
        assert_eq!(quad.bottom_left(), coord! { x: 10.0, y: 40.0 });
    }

    #[test]
    fn from_polygon_uses_exterior_ring() {
        let rect = polygon![
            (x: 0.0f32, y: 0.0),
            (x: 0.0, y: 8.0),
            (x: 30.0, y: 8.0),
            (x: 30.0, y: 0.0),
        ];
        let quad = Quad::from_polygon(&rect).unwrap();
        assert_eq!(quad.top_left(), coord! { x: 0.0, y: 0.0 });
        assert_eq!(quad.bottom_right(), coord! { x: 30.0, y: 8.0 });
        let (min, max) = quad.bounds();
        assert_eq!((min.x, min.y, max.x, max.y), (0.0, 0.0, 30.0, 8.0));
    }

    #[test]
    fn diamond_keeps_four_distinct_corners() {
        let quad = Quad::from_points([
            coord! { x: 5.0, y: 0.0 },
            coord! { x: 10.0, y: 5.0 },
            coord! { x: 5.0, y: 10.0 },
            coord! { x: 0.0, y: 5.0 },
        ]);
        assert_eq!(quad.top_left(), coord! { x: 5.0, y: 0.0 });
        assert_eq!(quad.top_right(), coord! { x: 10.0, y: 5.0 });
        assert_eq!(quad.bottom_right(), coord! { x: 5.0, y: 10.0 });
        assert_eq!(quad.bottom_left(), coord! { x: 0.0, y: 5.0 });

        let (min, max) = quad.bounds();
        assert_eq!((min.x, min.y, max.x, max.y), (0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn tilted_box_orders_clockwise() {
        let quad = Quad::from_points([
            coord! { x: 42.0, y: 18.0 },
            coord! { x: 2.0, y: 10.0 },
            coord! { x: 40.0, y: 28.0 },
            coord! { x: 0.0, y: 20.0 },
        ]);
        assert_eq!(quad.top_left(), coord! { x: 2.0, y: 10.0 });
        assert_eq!(quad.top_right(), coord! { x: 42.0, y: 18.0 });
        assert_eq!(quad.bottom_right(), coord! { x: 40.0, y: 28.0 });
        assert_eq!(quad.bottom_left(), coord! { x: 0.0, y: 20.0 });
    }
}
