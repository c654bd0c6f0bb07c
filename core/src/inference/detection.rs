use serde::{Deserialize, Serialize};

/// One labeled, confidence-scored bounding box from the detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl Detection {
    pub fn new(label: &str, confidence: f32, x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> i32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> i32 {
        self.y_max - self.y_min
    }
}
