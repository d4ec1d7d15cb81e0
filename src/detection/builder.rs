//! Builder for creating Detection objects from various box formats.

use crate::detection::rect::Rect;
use crate::detection::types::Detection;

/// Builder for creating `Detection` objects.
///
/// Boxes are clipped to `[0, 1]` on build, so callers may pass decoder output
/// straight through.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    identifier: String,
    class_id: usize,
    bbox: Rect,
    confidence: f32,
}

impl DetectionBuilder {
    /// Create a new detection builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set label and class index.
    pub fn class(mut self, identifier: impl Into<String>, class_id: usize) -> Self {
        self.identifier = identifier.into();
        self.class_id = class_id;
        self
    }

    /// Set bounding box in TLBR format (x_min, y_min, x_max, y_max).
    pub fn tlbr(mut self, x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        self.bbox = Rect::new(x_min, y_min, x_max, y_max);
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::from_center(cx, cy, w, h);
        self
    }

    pub fn rect(mut self, bbox: Rect) -> Self {
        self.bbox = bbox;
        self
    }

    /// Set the confidence score.
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Build the final `Detection`.
    pub fn build(self) -> Detection {
        Detection::new(self.identifier, self.class_id, self.confidence, self.bbox.clip())
    }
}
