//! Greedy non-maximum suppression.

use serde::{Deserialize, Serialize};

use crate::detection::types::Detection;

/// Which already-kept detections a candidate is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionScope {
    /// Only detections of the same class suppress each other.
    #[default]
    PerClass,
    /// Any overlapping detection suppresses, regardless of class.
    ClassAgnostic,
}

/// Prunes overlapping detections and ranks the survivors.
#[derive(Debug, Clone)]
pub struct Suppressor {
    pub min_confidence: f32,
    pub overlap_threshold: f32,
    pub max_observations: usize,
    pub scope: SuppressionScope,
}

impl Suppressor {
    pub fn new(
        min_confidence: f32,
        overlap_threshold: f32,
        max_observations: usize,
        scope: SuppressionScope,
    ) -> Self {
        Self {
            min_confidence,
            overlap_threshold,
            max_observations,
            scope,
        }
    }

    /// Run suppression.
    ///
    /// Steps:
    /// 1. drop candidates with a non-finite score or a box that cannot be
    ///    rendered, and those below `min_confidence` (equal is kept);
    /// 2. stable sort by descending confidence;
    /// 3. keep a candidate only if its IoU with every kept detection in scope
    ///    is below `overlap_threshold`;
    /// 4. stop at `max_observations`.
    ///
    /// The output is a fixed point: suppressing it again changes nothing.
    pub fn suppress(&self, candidates: Vec<Detection>) -> Vec<Detection> {
        let mut ranked: Vec<Detection> = candidates
            .into_iter()
            .filter(|d| {
                d.confidence.is_finite()
                    && d.confidence >= self.min_confidence
                    && d.bbox.is_renderable()
            })
            .collect();

        // Vec::sort_by is stable, equal scores keep their input order.
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut kept: Vec<Detection> = Vec::with_capacity(self.max_observations.min(ranked.len()));
        for candidate in ranked {
            if kept.len() >= self.max_observations {
                break;
            }
            let overlaps = kept.iter().any(|k| {
                self.in_scope(k, &candidate) && k.bbox.iou(&candidate.bbox) >= self.overlap_threshold
            });
            if !overlaps {
                kept.push(candidate);
            }
        }
        kept
    }

    #[inline]
    fn in_scope(&self, kept: &Detection, candidate: &Detection) -> bool {
        match self.scope {
            SuppressionScope::PerClass => kept.class_id == candidate.class_id,
            SuppressionScope::ClassAgnostic => true,
        }
    }
}
