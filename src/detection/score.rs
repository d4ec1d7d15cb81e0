//! Class scoring: sigmoid over logits and label lookup.

use ndarray::ArrayView1;

#[inline]
pub fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

/// Best non-background class of one anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassScore {
    pub class_id: usize,
    pub confidence: f32,
}

/// Picks the winning class per anchor and converts its logit to a probability.
#[derive(Debug, Clone, Copy)]
pub struct ScoreSigmoid {
    background_class: Option<usize>,
}

impl ScoreSigmoid {
    pub fn new(background_class: Option<usize>) -> Self {
        Self { background_class }
    }

    /// Argmax over `logits` skipping the background index. Ties keep the
    /// lower class index. Returns `None` if no class has a finite logit.
    pub fn best(&self, logits: ArrayView1<'_, f32>) -> Option<ClassScore> {
        let mut best: Option<(usize, f32)> = None;
        for (class_id, &logit) in logits.iter().enumerate() {
            if Some(class_id) == self.background_class || !logit.is_finite() {
                continue;
            }
            match best {
                Some((_, top)) if logit <= top => {}
                _ => best = Some((class_id, logit)),
            }
        }
        // sigmoid is monotonic, so the argmax over logits is the argmax over
        // probabilities.
        best.map(|(class_id, logit)| ClassScore {
            class_id,
            confidence: sigmoid(logit),
        })
    }
}

/// Class-index to label table.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// One label per line, line `i` naming class `i`.
    pub fn from_lines(text: &str) -> Self {
        Self {
            labels: text.lines().map(|line| line.trim().to_string()).collect(),
        }
    }

    /// Label for `class_id`, or `class_<id>` when the table has no entry.
    pub fn name(&self, class_id: usize) -> String {
        match self.labels.get(class_id) {
            Some(label) if !label.is_empty() => label.clone(),
            _ => format!("class_{class_id}"),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
