use std::sync::Mutex;

use serde::Serialize;

/// Running counters for pipeline activity.
pub struct PipelineMetrics {
    inner: Mutex<Counters>,
}

#[derive(Default)]
struct Counters {
    received: usize,
    fired: usize,
    no_fire: usize,
    pulses: usize,
    backend_attempts: usize,
    backend_failures: usize,
    telemetry_attempts: usize,
    telemetry_failures: usize,
}

/// Point-in-time copy of the counters, serializable for status replies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub received: usize,
    pub fired: usize,
    pub no_fire: usize,
    pub pulses: usize,
    pub backend_attempts: usize,
    pub backend_failures: usize,
    pub telemetry_attempts: usize,
    pub telemetry_failures: usize,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counters::default()),
        }
    }

    pub fn record_received(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.received += 1;
        }
    }

    pub fn record_fired(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.fired += 1;
        }
    }

    pub fn record_no_fire(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.no_fire += 1;
        }
    }

    pub fn record_pulse(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.pulses += 1;
        }
    }

    pub fn record_backend_attempt(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.backend_attempts += 1;
        }
    }

    pub fn record_backend_failure(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.backend_failures += 1;
        }
    }

    pub fn record_telemetry_attempt(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.telemetry_attempts += 1;
        }
    }

    pub fn record_telemetry_failure(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.telemetry_failures += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(counters) = self.inner.lock() {
            MetricsSnapshot {
                received: counters.received,
                fired: counters.fired,
                no_fire: counters.no_fire,
                pulses: counters.pulses,
                backend_attempts: counters.backend_attempts,
                backend_failures: counters.backend_failures,
                telemetry_attempts: counters.telemetry_attempts,
                telemetry_failures: counters.telemetry_failures,
            }
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
