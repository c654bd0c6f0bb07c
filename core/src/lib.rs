//! Detection gating and actuation core for the edge surveillance node.
//!
//! The modules carry an inference result from the gating decision through
//! relay actuation and best-effort outbound dispatch, with each leg
//! degrading independently of the others.

pub mod actuator;
pub mod dispatch;
pub mod gating;
pub mod inference;
pub mod metrics;
pub mod pipeline;
pub mod prelude;
pub mod tasks;
pub mod throttle;

pub use prelude::{EventContext, Location, PipelineError, PipelineResult};
