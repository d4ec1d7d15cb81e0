//! Overlay configuration.
//!
//! Everything here is read once at startup. [`OverlayConfig::validate`] is the
//! fail-fast point for bad values; nothing downstream re-checks them.

use serde::{Deserialize, Serialize};

use crate::detection::{AnchorSpec, DecodeScales, SuppressionScope};
use crate::error::ConfigError;
use crate::overlay::SlotAssignment;

/// Kind of vision request the inference backend should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Classification,
    RectangleRecognition,
}

impl RequestKind {
    const fn bit(self) -> u8 {
        match self {
            RequestKind::Classification => 1 << 0,
            RequestKind::RectangleRecognition => 1 << 1,
        }
    }
}

/// Set of [`RequestKind`]s. Serializes as a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<RequestKind>", into = "Vec<RequestKind>")]
pub struct RequestKinds {
    bits: u8,
}

impl RequestKinds {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub const fn classification() -> Self {
        Self {
            bits: RequestKind::Classification.bit(),
        }
    }

    pub fn with(mut self, kind: RequestKind) -> Self {
        self.bits |= kind.bit();
        self
    }

    pub fn contains(&self, kind: RequestKind) -> bool {
        self.bits & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Bitmask form handed to native backends: bit 0 classification, bit 1
    /// rectangle recognition.
    pub fn bits(&self) -> u8 {
        self.bits
    }
}

impl From<Vec<RequestKind>> for RequestKinds {
    fn from(kinds: Vec<RequestKind>) -> Self {
        kinds.into_iter().fold(Self::empty(), Self::with)
    }
}

impl From<RequestKinds> for Vec<RequestKind> {
    fn from(kinds: RequestKinds) -> Self {
        [RequestKind::Classification, RequestKind::RectangleRecognition]
            .into_iter()
            .filter(|k| kinds.contains(*k))
            .collect()
    }
}

/// Configuration for the whole overlay pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub request_kinds: RequestKinds,
    /// Upper bound on detections per cycle; also the size of the slot pool.
    pub max_observations: usize,
    /// Minimum confidence for a detection to occupy a slot (inclusive).
    pub confidence_threshold: f32,
    /// IoU at or above which a lower-ranked box is suppressed.
    pub nms_overlap_threshold: f32,
    /// Minimum confidence for an anchor to enter suppression (inclusive).
    pub candidate_threshold: f32,
    /// Distance of the marker plane in front of the camera, in world units.
    pub display_depth: f32,
    /// Native edge length of the host's marker plane primitive.
    pub plane_extent: f32,
    pub num_anchors: usize,
    /// Width of the class tensor, background included.
    pub num_classes: usize,
    pub background_class: Option<usize>,
    pub anchors: AnchorSpec,
    pub decode_scales: DecodeScales,
    pub suppression_scope: SuppressionScope,
    pub slot_assignment: SlotAssignment,
    /// Maximum `1 - IoU` cost for a detection to keep its previous slot.
    /// Only used by [`SlotAssignment::IouMatched`].
    pub match_threshold: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            request_kinds: RequestKinds::classification(),
            max_observations: 10,
            confidence_threshold: 0.65,
            nms_overlap_threshold: 0.5,
            candidate_threshold: 0.3,
            display_depth: 1.0,
            plane_extent: 10.0,
            num_anchors: 1917,
            num_classes: 91,
            background_class: Some(0),
            anchors: AnchorSpec::default(),
            decode_scales: DecodeScales::default(),
            suppression_scope: SuppressionScope::default(),
            slot_assignment: SlotAssignment::default(),
            match_threshold: 0.7,
        }
    }
}

impl OverlayConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_kinds.is_empty() {
            return Err(ConfigError::NoRequestKinds);
        }
        if self.max_observations == 0 {
            return Err(ConfigError::invalid("max_observations", "must be at least 1"));
        }
        unit_interval("confidence_threshold", self.confidence_threshold)?;
        unit_interval("nms_overlap_threshold", self.nms_overlap_threshold)?;
        unit_interval("candidate_threshold", self.candidate_threshold)?;
        unit_interval("match_threshold", self.match_threshold)?;
        positive("display_depth", self.display_depth)?;
        positive("plane_extent", self.plane_extent)?;
        self.decode_scales.validate()?;

        if self.num_anchors == 0 {
            return Err(ConfigError::invalid("num_anchors", "must be at least 1"));
        }
        if self.num_classes == 0 {
            return Err(ConfigError::invalid("num_classes", "must be at least 1"));
        }
        if let Some(background) = self.background_class {
            if background >= self.num_classes {
                return Err(ConfigError::BackgroundOutOfRange {
                    background,
                    num_classes: self.num_classes,
                });
            }
            if self.num_classes == 1 {
                return Err(ConfigError::invalid(
                    "num_classes",
                    "only the background class is present",
                ));
            }
        }
        Ok(())
    }
}

fn unit_interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")))
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be finite and > 0")))
    }
}
