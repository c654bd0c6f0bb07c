use anyhow::ensure;
use edgecore::inference::{Detection, InferenceMetadata, InferenceResult};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration for generating synthetic inference results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub detections: usize,
    pub label: String,
    pub confidence_floor: f32,
    pub confidence_ceil: f32,
    pub seed: u64,
    pub image_chars: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            detections: 3,
            label: "debris".to_string(),
            confidence_floor: 0.35,
            confidence_ceil: 0.95,
            seed: 0,
            image_chars: 0,
        }
    }
}

pub fn build_inference_result(config: &GeneratorConfig) -> anyhow::Result<InferenceResult> {
    ensure!(
        config.confidence_floor <= config.confidence_ceil,
        "confidence floor {} above ceiling {}",
        config.confidence_floor,
        config.confidence_ceil
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut detections = Vec::with_capacity(config.detections);
    for _ in 0..config.detections {
        let confidence = rng.gen_range(config.confidence_floor..=config.confidence_ceil);
        let x_min = rng.gen_range(0..1216);
        let y_min = rng.gen_range(0..656);
        let width = rng.gen_range(32..=64);
        let height = rng.gen_range(32..=64);
        detections.push(Detection::new(
            &config.label,
            confidence,
            x_min,
            y_min,
            x_min + width,
            y_min + height,
        ));
    }

    let metadata = InferenceMetadata {
        detection_count: detections.len(),
        note: Some("synthetic inference result".to_string()),
        ..InferenceMetadata::default()
    };
    let encoded_image = if config.image_chars > 0 {
        Some(filler_image(config.image_chars))
    } else {
        None
    };

    Ok(InferenceResult {
        detections,
        metadata,
        encoded_image,
    })
}

/// Opaque stand-in for a base64 snapshot.
fn filler_image(chars: usize) -> String {
    "QkFTRTY0ZmlsbGVy".chars().cycle().take(chars).collect()
}
