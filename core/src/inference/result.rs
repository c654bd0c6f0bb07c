use serde::{Deserialize, Serialize};

use super::detection::Detection;

/// Timing and provenance attached to one inference call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_info: Option<String>,
    pub detection_count: usize,
    pub inference_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Full output of one inference call, consumed read-only downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceResult {
    pub detections: Vec<Detection>,
    pub metadata: InferenceMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_image: Option<String>,
}

impl InferenceResult {
    pub fn new(detections: Vec<Detection>, metadata: InferenceMetadata) -> Self {
        Self {
            detections,
            metadata,
            encoded_image: None,
        }
    }

    /// Highest-confidence detection; equal scores keep the earliest one.
    ///
    /// Detector output order carries no meaning, so the first-seen rule is
    /// arbitrary but fixed.
    pub fn best_detection(&self) -> Option<&Detection> {
        let mut best: Option<&Detection> = None;
        for detection in &self.detections {
            match best {
                Some(current) if detection.confidence > current.confidence => {
                    best = Some(detection);
                }
                None => best = Some(detection),
                _ => {}
            }
        }
        best
    }
}
