//! Anchor-relative box decoding.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::detection::anchor::{AnchorBook, AnchorBox};
use crate::detection::rect::Rect;
use crate::error::ConfigError;

/// Divisors applied to raw offsets before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeScales {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for DecodeScales {
    fn default() -> Self {
        Self {
            x: 10.0,
            y: 10.0,
            width: 5.0,
            height: 5.0,
        }
    }
}

impl DecodeScales {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("decode_scales.x", self.x),
            ("decode_scales.y", self.y),
            ("decode_scales.width", self.width),
            ("decode_scales.height", self.height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::invalid(field, format!("{value} must be finite and > 0")));
            }
        }
        Ok(())
    }
}

/// Turns per-anchor `(dx, dy, dw, dh)` offsets into absolute boxes.
#[derive(Debug, Clone)]
pub struct BoxDecoder {
    anchors: AnchorBook,
    scales: DecodeScales,
}

impl BoxDecoder {
    pub fn new(anchors: AnchorBook, scales: DecodeScales) -> Self {
        Self { anchors, scales }
    }

    pub fn anchors(&self) -> &AnchorBook {
        &self.anchors
    }

    /// Decode one anchor. Returns `None` when the index is out of range.
    ///
    /// The result is clipped to `[0, 1]`; it may still be degenerate or
    /// non-finite if the offsets were.
    pub fn decode(&self, index: usize, offsets: ArrayView1<'_, f32>) -> Option<Rect> {
        let anchor = self.anchors.at(index)?;
        if offsets.len() != 4 {
            return None;
        }
        Some(self.decode_with(&anchor, [offsets[0], offsets[1], offsets[2], offsets[3]]))
    }

    fn decode_with(&self, anchor: &AnchorBox, [dx, dy, dw, dh]: [f32; 4]) -> Rect {
        let cx = anchor.center_x + dx / self.scales.x * anchor.width;
        let cy = anchor.center_y + dy / self.scales.y * anchor.height;
        let w = anchor.width * (dw / self.scales.width).exp();
        let h = anchor.height * (dh / self.scales.height).exp();
        Rect::from_center(cx, cy, w, h).clip()
    }
}
