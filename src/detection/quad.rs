use nalgebra::Point2;

use crate::detection::rect::Rect;

/// A recognized rectangle as four corners in normalized image space.
///
/// Perspective makes the corners an arbitrary quadrilateral, so they are kept
/// as points rather than folded into a [`Rect`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub top_left: Point2<f32>,
    pub top_right: Point2<f32>,
    pub bottom_right: Point2<f32>,
    pub bottom_left: Point2<f32>,
}

impl Quad {
    pub fn new(
        top_left: Point2<f32>,
        top_right: Point2<f32>,
        bottom_right: Point2<f32>,
        bottom_left: Point2<f32>,
    ) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Corners in clockwise order starting at the top left.
    pub fn corners(&self) -> [Point2<f32>; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    pub fn is_finite(&self) -> bool {
        self.corners()
            .iter()
            .all(|p| p.x.is_finite() && p.y.is_finite())
    }

    /// Smallest axis-aligned box containing all four corners.
    pub fn bounding_rect(&self) -> Rect {
        let corners = self.corners();
        let (mut x_min, mut y_min) = (f32::INFINITY, f32::INFINITY);
        let (mut x_max, mut y_max) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in &corners {
            x_min = x_min.min(p.x);
            y_min = y_min.min(p.y);
            x_max = x_max.max(p.x);
            y_max = y_max.max(p.y);
        }
        Rect::new(x_min, y_min, x_max, y_max)
    }
}
