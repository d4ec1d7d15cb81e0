//! Raw network output to ranked detections.

use tracing::{trace, warn};

use crate::config::OverlayConfig;
use crate::detection::anchor::AnchorBook;
use crate::detection::decode::BoxDecoder;
use crate::detection::score::{LabelMap, ScoreSigmoid};
use crate::detection::suppress::Suppressor;
use crate::detection::types::{Detection, RawOutput};
use crate::error::{ConfigError, PostprocessError};

/// Decode, score and suppress in one step.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    decoder: BoxDecoder,
    scorer: ScoreSigmoid,
    suppressor: Suppressor,
    labels: LabelMap,
    num_classes: usize,
}

impl PostProcessor {
    pub fn new(
        decoder: BoxDecoder,
        scorer: ScoreSigmoid,
        suppressor: Suppressor,
        labels: LabelMap,
        num_classes: usize,
    ) -> Self {
        Self {
            decoder,
            scorer,
            suppressor,
            labels,
            num_classes,
        }
    }

    /// Build from configuration, loading and validating the anchor table.
    pub fn from_config(config: &OverlayConfig, labels: LabelMap) -> Result<Self, ConfigError> {
        config.validate()?;
        let anchors = AnchorBook::load(&config.anchors, config.num_anchors)?;
        Ok(Self::new(
            BoxDecoder::new(anchors, config.decode_scales),
            ScoreSigmoid::new(config.background_class),
            Suppressor::new(
                config.candidate_threshold,
                config.nms_overlap_threshold,
                config.max_observations,
                config.suppression_scope,
            ),
            labels,
            config.num_classes,
        ))
    }

    pub fn suppressor(&self) -> &Suppressor {
        &self.suppressor
    }

    /// Ranked detections for `raw`, or an empty list if the tensors are
    /// malformed.
    pub fn postprocess(&self, raw: &RawOutput) -> Vec<Detection> {
        match self.try_postprocess(raw) {
            Ok(detections) => detections,
            Err(e) => {
                warn!(error = %e, "discarding malformed inference output");
                Vec::new()
            }
        }
    }

    pub fn try_postprocess(&self, raw: &RawOutput) -> Result<Vec<Detection>, PostprocessError> {
        self.check_shapes(raw)?;

        let min_confidence = self.suppressor.min_confidence;
        let mut candidates = Vec::new();
        for (index, (offsets, logits)) in raw
            .box_offsets
            .rows()
            .into_iter()
            .zip(raw.class_logits.rows())
            .enumerate()
        {
            let Some(score) = self.scorer.best(logits) else {
                continue;
            };
            if score.confidence < min_confidence {
                continue;
            }
            let Some(bbox) = self.decoder.decode(index, offsets) else {
                continue;
            };
            candidates.push(Detection::new(
                self.labels.name(score.class_id),
                score.class_id,
                score.confidence,
                bbox,
            ));
        }

        let candidate_count = candidates.len();
        let detections = self.suppressor.suppress(candidates);
        trace!(
            candidates = candidate_count,
            kept = detections.len(),
            "postprocess complete"
        );
        Ok(detections)
    }

    fn check_shapes(&self, raw: &RawOutput) -> Result<(), PostprocessError> {
        let expected = self.decoder.anchors().len();
        let (box_rows, box_cols) = raw.box_offsets.dim();
        if box_rows != expected {
            return Err(PostprocessError::AnchorCount {
                expected,
                got: box_rows,
            });
        }
        if box_cols != 4 {
            return Err(PostprocessError::BoxWidth(box_cols));
        }
        let (class_rows, class_cols) = raw.class_logits.dim();
        if class_rows != expected || class_cols != self.num_classes {
            return Err(PostprocessError::ClassShape {
                expected_anchors: expected,
                expected_classes: self.num_classes,
                got_anchors: class_rows,
                got_classes: class_cols,
            });
        }
        Ok(())
    }
}
