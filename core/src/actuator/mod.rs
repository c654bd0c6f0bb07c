pub mod controller;
pub mod line;

pub use controller::{duration_from_secs, ActuatorConfig, ActuatorController, ActuatorStatus};
pub use line::{MockLine, OutputLine, SysfsLine};
