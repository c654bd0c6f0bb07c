use std::fmt;

use serde::{Deserialize, Serialize};

use crate::inference::{Detection, InferenceResult};

/// Thresholds governing when an inference result fires downstream actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatingConfig {
    pub min_confidence: f32,
    pub target_labels: Vec<String>,
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            target_labels: Vec::new(),
        }
    }
}

/// Decision returned by the evaluator for one inference result.
#[derive(Debug)]
pub enum GateOutcome<'a> {
    Fire(&'a Detection),
    NoFire(SkipReason),
}

impl GateOutcome<'_> {
    pub fn is_fire(&self) -> bool {
        matches!(self, GateOutcome::Fire(_))
    }
}

/// Why a result did not fire. These are normal outcomes, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoDetections,
    BelowThreshold { best: f32, required: f32 },
    LabelNotAllowed { label: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoDetections => write!(f, "no detections returned"),
            SkipReason::BelowThreshold { best, required } => write!(
                f,
                "best confidence {:.2} below threshold {:.2}",
                best, required
            ),
            SkipReason::LabelNotAllowed { label } => {
                write!(f, "label '{}' not in target set", label)
            }
        }
    }
}

/// Pure decision function selecting whether a result fires.
pub struct GatingEvaluator {
    min_confidence: f32,
    allowed_labels: Vec<String>,
}

impl GatingEvaluator {
    pub fn new(config: &GatingConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            allowed_labels: config
                .target_labels
                .iter()
                .map(|label| label.to_lowercase())
                .collect(),
        }
    }

    /// Applies threshold and allow-list checks to the best detection.
    ///
    /// Reads nothing but its inputs, so concurrent calls are safe.
    pub fn evaluate<'a>(&self, result: &'a InferenceResult) -> GateOutcome<'a> {
        let best = match result.best_detection() {
            Some(detection) => detection,
            None => return GateOutcome::NoFire(SkipReason::NoDetections),
        };

        if best.confidence < self.min_confidence {
            return GateOutcome::NoFire(SkipReason::BelowThreshold {
                best: best.confidence,
                required: self.min_confidence,
            });
        }

        if !self.allowed_labels.is_empty() {
            let label = best.label.to_lowercase();
            if !self.allowed_labels.iter().any(|allowed| *allowed == label) {
                return GateOutcome::NoFire(SkipReason::LabelNotAllowed {
                    label: best.label.clone(),
                });
            }
        }

        GateOutcome::Fire(best)
    }
}
