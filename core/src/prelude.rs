use serde::{Deserialize, Serialize};

/// Where an inference result came from and how the frame was captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContext {
    pub source: String,
    pub capture_from_camera: bool,
}

impl EventContext {
    pub fn new(source: &str, capture_from_camera: bool) -> Self {
        Self {
            source: source.to_string(),
            capture_from_camera,
        }
    }
}

/// Physical deployment site reported in backend event payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            id: "EDGE-LOCATION-001".to_string(),
            name: "Edge Surveillance Node".to_string(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

/// Common error type for pipeline components.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("hardware unavailable: {0}")]
    HardwareUnavailable(String),
    #[error("configuration incomplete: {0}")]
    ConfigurationIncomplete(String),
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
