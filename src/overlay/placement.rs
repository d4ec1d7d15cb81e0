use nalgebra::Vector3;

use crate::detection::Rect;

/// Marker geometry in the marker's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Vector3<f32>,
    pub width: f32,
    pub height: f32,
}

impl Placement {
    /// Map a normalized image box onto the marker plane.
    ///
    /// The box is re-centered on the image center (subtract 0.5) and flipped
    /// vertically, since image y grows downward and world y upward. A plane
    /// at one unit in front of the viewer spans one unit per image width, so
    /// coordinates scale linearly with `depth`. Width and height are given as
    /// a scale of the host plane primitive whose native edge is
    /// `plane_extent`.
    pub fn from_bbox(bbox: &Rect, depth: f32, plane_extent: f32) -> Self {
        let x_min = bbox.x_min - 0.5;
        let y_min = bbox.y_min - 0.5;
        let x_max = bbox.x_max - 0.5;
        let y_max = bbox.y_max - 0.5;

        let x_center = (x_max - x_min) / 2.0 + x_min;
        let y_center = -((y_max - y_min) / 2.0 + y_min);

        Self {
            position: Vector3::new(x_center * depth, y_center * depth, 0.0),
            width: (x_max - x_min) * depth / plane_extent,
            height: (y_max - y_min) * depth / plane_extent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_box() {
        let p = Placement::from_bbox(&Rect::new(0.4, 0.4, 0.6, 0.6), 1.0, 10.0);
        assert!(p.position.norm() < 1e-6);
        assert!((p.width - 0.02).abs() < 1e-6);
        assert!((p.height - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_top_left_box_maps_up_and_left() {
        let p = Placement::from_bbox(&Rect::new(0.1, 0.1, 0.3, 0.3), 1.0, 10.0);
        assert!((p.position.x + 0.3).abs() < 1e-6);
        assert!((p.position.y - 0.3).abs() < 1e-6);
        assert_eq!(p.position.z, 0.0);
    }

    #[test]
    fn test_depth_scales_linearly() {
        let near = Placement::from_bbox(&Rect::new(0.1, 0.2, 0.3, 0.6), 1.0, 10.0);
        let far = Placement::from_bbox(&Rect::new(0.1, 0.2, 0.3, 0.6), 2.0, 10.0);
        assert!((far.position - near.position * 2.0).norm() < 1e-6);
        assert!((far.width - near.width * 2.0).abs() < 1e-6);
        assert!((far.height - near.height * 2.0).abs() < 1e-6);
    }
}
