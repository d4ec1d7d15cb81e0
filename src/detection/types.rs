use ndarray::Array2;

use crate::detection::quad::Quad;
use crate::detection::rect::Rect;

/// A single post-processed detection in normalized image space.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Label of the detected class, possibly a comma-separated synonym list
    pub identifier: String,
    /// Index of the detected class in the network's class tensor
    pub class_id: usize,
    /// Sigmoid confidence in `[0, 1]`
    pub confidence: f32,
    /// Bounding box, clipped to `[0, 1]`
    pub bbox: Rect,
}

impl Detection {
    pub fn new(identifier: impl Into<String>, class_id: usize, confidence: f32, bbox: Rect) -> Self {
        Self {
            identifier: identifier.into(),
            class_id,
            confidence,
            bbox,
        }
    }

    /// Short label for display: the identifier up to its first comma.
    pub fn display_name(&self) -> &str {
        self.identifier
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
    }
}

/// Raw results of one inference call.
///
/// `box_offsets` has shape `[anchors, 4]` holding `(dx, dy, dw, dh)` per
/// anchor; `class_logits` has shape `[anchors, classes]`. `rectangles` holds
/// the output of rectangle recognition, when that request kind is enabled.
#[derive(Debug, Clone)]
pub struct RawOutput {
    pub box_offsets: Array2<f32>,
    pub class_logits: Array2<f32>,
    pub rectangles: Vec<Quad>,
}

impl RawOutput {
    pub fn new(box_offsets: Array2<f32>, class_logits: Array2<f32>) -> Self {
        Self {
            box_offsets,
            class_logits,
            rectangles: Vec::new(),
        }
    }

    /// Output of a backend that only runs rectangle recognition.
    pub fn rectangles_only(rectangles: Vec<Quad>) -> Self {
        Self {
            box_offsets: Array2::zeros((0, 4)),
            class_logits: Array2::zeros((0, 0)),
            rectangles,
        }
    }

    pub fn with_rectangles(mut self, rectangles: Vec<Quad>) -> Self {
        self.rectangles = rectangles;
        self
    }

    pub fn num_anchors(&self) -> usize {
        self.box_offsets.nrows()
    }
}
