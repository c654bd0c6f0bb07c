use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Serializes the go/no-go decision for one rate-limited destination.
///
/// Elapsed time is measured on the monotonic clock, so wall-clock
/// adjustments can neither skip a cooldown nor stretch it.
pub struct CooldownGate {
    cooldown: Duration,
    last_pass: Mutex<Option<Instant>>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_pass: Mutex::new(None),
        }
    }

    /// Checks the window and records the pass timestamp in one step.
    ///
    /// Returns false while the previous pass is still inside the cooldown
    /// window. A zero cooldown always passes.
    pub fn try_pass(&self) -> bool {
        if self.cooldown.is_zero() {
            return true;
        }
        let now = Instant::now();
        let mut last = self.last_pass.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(previous) if now.duration_since(previous) < self.cooldown => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
