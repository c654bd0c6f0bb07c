use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::actuator::line::{OutputLine, SysfsLine};
use crate::tasks::TaskGroup;
use crate::throttle::CooldownGate;

/// GPIO configuration for the pulsed output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub enabled: bool,
    pub pin: u32,
    pub active_high: bool,
    pub duration_seconds: f64,
    pub cooldown_seconds: f64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pin: 17,
            active_high: true,
            duration_seconds: 3.0,
            cooldown_seconds: 5.0,
        }
    }
}

/// Externally visible controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorStatus {
    pub enabled: bool,
    pub active: bool,
}

const MIN_HOLD: Duration = Duration::from_millis(100);

/// Converts operator-supplied seconds into a hold duration. Negative and
/// non-finite values collapse to zero; `trigger` floors the hold later.
pub fn duration_from_secs(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
}

enum LineSlot {
    Disabled,
    Ready { line: Box<dyn OutputLine>, active: bool },
}

/// Owns the physical output line and its pulse and cooldown discipline.
///
/// Clones share one line. State changes only under the internal lock, and
/// the lock is never held across a pulse's hold period, so status reads
/// never wait on a running pulse.
#[derive(Clone)]
pub struct ActuatorController {
    inner: Arc<ControllerState>,
}

struct ControllerState {
    slot: Mutex<LineSlot>,
    gate: CooldownGate,
    default_hold: Duration,
    tasks: TaskGroup,
}

impl ActuatorController {
    /// Builds the controller, probing the hardware once. A failed probe
    /// leaves a permanently disabled controller; nothing retries later.
    pub fn from_config(config: &ActuatorConfig, tasks: TaskGroup) -> Self {
        if !config.enabled {
            info!("actuator disabled via configuration");
            return Self::disabled(config, tasks);
        }
        match SysfsLine::open(config.pin, config.active_high) {
            Ok(line) => {
                info!("actuator ready on {}", line.describe());
                Self::with_line(config, Box::new(line), tasks)
            }
            Err(err) => {
                warn!("actuator unavailable, controller disabled: {}", err);
                Self::disabled(config, tasks)
            }
        }
    }

    /// Builds the controller around an already-open line.
    pub fn with_line(config: &ActuatorConfig, line: Box<dyn OutputLine>, tasks: TaskGroup) -> Self {
        Self::build(config, LineSlot::Ready { line, active: false }, tasks)
    }

    /// Builds a controller that ignores every operation.
    pub fn disabled(config: &ActuatorConfig, tasks: TaskGroup) -> Self {
        Self::build(config, LineSlot::Disabled, tasks)
    }

    fn build(config: &ActuatorConfig, slot: LineSlot, tasks: TaskGroup) -> Self {
        Self {
            inner: Arc::new(ControllerState {
                slot: Mutex::new(slot),
                gate: CooldownGate::new(duration_from_secs(config.cooldown_seconds)),
                default_hold: duration_from_secs(config.duration_seconds),
                tasks,
            }),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, LineSlot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(*self.lock_slot(), LineSlot::Ready { .. })
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.lock_slot(), LineSlot::Ready { active: true, .. })
    }

    pub fn status(&self) -> ActuatorStatus {
        match *self.lock_slot() {
            LineSlot::Ready { active, .. } => ActuatorStatus {
                enabled: true,
                active,
            },
            LineSlot::Disabled => ActuatorStatus {
                enabled: false,
                active: false,
            },
        }
    }

    /// Drives the line on. Idempotent; no-op when disabled.
    pub fn activate(&self) {
        self.set_active(true);
    }

    /// Drives the line off. Idempotent; no-op when disabled.
    pub fn deactivate(&self) {
        self.set_active(false);
    }

    fn set_active(&self, on: bool) {
        let request = if on { "activation" } else { "deactivation" };
        let mut slot = self.lock_slot();
        match &mut *slot {
            LineSlot::Disabled => {
                debug!("actuator {} ignored; controller is disabled", request);
            }
            LineSlot::Ready { active, .. } if *active == on => {}
            LineSlot::Ready { line, active } => match line.set(on) {
                Ok(()) => {
                    *active = on;
                    info!(
                        "actuator {} ({})",
                        if on { "activated" } else { "deactivated" },
                        line.describe()
                    );
                }
                Err(err) => warn!("failed to drive {}: {}", line.describe(), err),
            },
        }
    }

    /// Schedules one cooldown-gated pulse and reports whether it was
    /// scheduled.
    ///
    /// The pulse activates, holds for at least 100 ms, then deactivates on
    /// every exit path.
    pub fn trigger(&self, duration: Option<Duration>) -> bool {
        if !self.is_enabled() {
            debug!("pulse skipped; actuator disabled");
            return false;
        }
        if !self.inner.gate.try_pass() {
            debug!(
                "pulse skipped by cooldown ({:.2}s)",
                self.inner.gate.cooldown().as_secs_f64()
            );
            return false;
        }

        let hold = duration.unwrap_or(self.inner.default_hold).max(MIN_HOLD);
        let controller = self.clone();
        self.inner.tasks.spawn(async move {
            let _release = PulseGuard(controller.clone());
            controller.activate();
            tokio::time::sleep(hold).await;
        });
        true
    }

    /// Drives the line off, releases it, and disables the controller
    /// permanently.
    pub fn shutdown(&self) {
        let mut slot = self.lock_slot();
        if let LineSlot::Ready { line, active } = &mut *slot {
            if *active {
                if let Err(err) = line.set(false) {
                    warn!("failed to drive {} low during shutdown: {}", line.describe(), err);
                }
            }
            if let Err(err) = line.close() {
                warn!("failed to release {}: {}", line.describe(), err);
            }
            info!("actuator shut down");
        }
        *slot = LineSlot::Disabled;
    }
}

/// Drives the line off when a pulse ends, panic included.
struct PulseGuard(ActuatorController);

impl Drop for PulseGuard {
    fn drop(&mut self) {
        self.0.deactivate();
    }
}
