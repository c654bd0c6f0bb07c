pub mod detection;
pub mod result;

pub use detection::Detection;
pub use result::{InferenceMetadata, InferenceResult};
