pub mod notifier;
pub mod telemetry;

pub use notifier::{BackendConfig, BackendNotifier, EVENT_TYPE, MAX_ENCODED_IMAGE_BYTES};
pub use telemetry::{TelemetryConfig, TelemetryPublisher};
