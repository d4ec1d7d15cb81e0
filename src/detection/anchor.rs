//! Prior boxes the network predicts offsets against.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

/// One prior box in normalized image space, center/size form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorBox {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

impl AnchorBox {
    pub fn new(center_x: f32, center_y: f32, width: f32, height: f32) -> Self {
        Self {
            center_x,
            center_y,
            width,
            height,
        }
    }
}

/// Parameters of the SSD multiple-grid anchor layout.
///
/// The defaults reproduce the 1917 anchors of SSD MobileNet at 300x300.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsdAnchorParams {
    pub feature_map_sizes: Vec<usize>,
    pub min_scale: f32,
    pub max_scale: f32,
    pub aspect_ratios: Vec<f32>,
    /// Aspect ratio of the extra box whose scale sits between two layers.
    pub interpolated_scale_aspect_ratio: f32,
    /// Use three fixed boxes in the first layer instead of the full set.
    pub reduce_boxes_in_lowest_layer: bool,
}

impl Default for SsdAnchorParams {
    fn default() -> Self {
        Self {
            feature_map_sizes: vec![19, 10, 5, 3, 2, 1],
            min_scale: 0.2,
            max_scale: 0.95,
            aspect_ratios: vec![1.0, 2.0, 0.5, 3.0, 1.0 / 3.0],
            interpolated_scale_aspect_ratio: 1.0,
            reduce_boxes_in_lowest_layer: true,
        }
    }
}

impl SsdAnchorParams {
    /// Generate anchors ordered by layer, then row, column and box spec.
    pub fn generate(&self) -> Vec<AnchorBox> {
        let num_layers = self.feature_map_sizes.len();
        let mut scales: Vec<f32> = (0..num_layers)
            .map(|i| {
                if num_layers > 1 {
                    self.min_scale
                        + (self.max_scale - self.min_scale) * i as f32 / (num_layers - 1) as f32
                } else {
                    self.min_scale
                }
            })
            .collect();
        scales.push(1.0);

        let mut anchors = Vec::new();
        for (layer, &size) in self.feature_map_sizes.iter().enumerate() {
            let scale = scales[layer];
            let scale_next = scales[layer + 1];

            let mut box_specs: Vec<(f32, f32)> = Vec::new();
            if layer == 0 && self.reduce_boxes_in_lowest_layer {
                box_specs.extend([(0.1, 1.0), (scale, 2.0), (scale, 0.5)]);
            } else {
                box_specs.extend(self.aspect_ratios.iter().map(|&ar| (scale, ar)));
                if self.interpolated_scale_aspect_ratio > 0.0 {
                    box_specs.push((
                        (scale * scale_next).sqrt(),
                        self.interpolated_scale_aspect_ratio,
                    ));
                }
            }

            let stride = 1.0 / size as f32;
            for row in 0..size {
                let center_y = (row as f32 + 0.5) * stride;
                for col in 0..size {
                    let center_x = (col as f32 + 0.5) * stride;
                    for &(box_scale, aspect) in &box_specs {
                        let ratio = aspect.sqrt();
                        anchors.push(AnchorBox::new(
                            center_x,
                            center_y,
                            box_scale * ratio,
                            box_scale / ratio,
                        ));
                    }
                }
            }
        }
        anchors
    }
}

/// Where the anchor table comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnchorSpec {
    /// Generated from SSD layout parameters.
    Ssd(SsdAnchorParams),
    /// Explicit model-specific table.
    Table { anchors: Vec<AnchorBox> },
}

impl Default for AnchorSpec {
    fn default() -> Self {
        AnchorSpec::Ssd(SsdAnchorParams::default())
    }
}

/// Immutable, validated anchor table.
#[derive(Debug, Clone)]
pub struct AnchorBook {
    anchors: Box<[AnchorBox]>,
}

impl AnchorBook {
    /// Build the table and check it against the anchor count the network
    /// emits. Any mismatch is a configuration error.
    pub fn load(spec: &AnchorSpec, expected: usize) -> Result<Self, ConfigError> {
        let anchors = match spec {
            AnchorSpec::Ssd(params) => params.generate(),
            AnchorSpec::Table { anchors } => anchors.clone(),
        };

        if anchors.len() != expected {
            return Err(ConfigError::AnchorCountMismatch {
                expected,
                got: anchors.len(),
            });
        }

        for (index, anchor) in anchors.iter().enumerate() {
            let values = [anchor.center_x, anchor.center_y, anchor.width, anchor.height];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(ConfigError::InvalidAnchor {
                    index,
                    reason: "non-finite value".to_string(),
                });
            }
            if anchor.width <= 0.0 || anchor.height <= 0.0 {
                return Err(ConfigError::InvalidAnchor {
                    index,
                    reason: format!("size {}x{} is not positive", anchor.width, anchor.height),
                });
            }
        }

        info!(count = anchors.len(), "anchor book loaded");
        Ok(Self {
            anchors: anchors.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn at(&self, index: usize) -> Option<AnchorBox> {
        self.anchors.get(index).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnchorBox> {
        self.anchors.iter()
    }
}
