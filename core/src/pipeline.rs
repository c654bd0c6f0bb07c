use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::actuator::{duration_from_secs, ActuatorController, ActuatorStatus};
use crate::dispatch::{BackendNotifier, TelemetryPublisher};
use crate::gating::{GateOutcome, GatingEvaluator};
use crate::inference::InferenceResult;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::prelude::EventContext;
use crate::tasks::TaskGroup;

/// Single entry point that runs the gate and fans out to the actuator and
/// the outbound dispatchers.
///
/// Every collaborator is handed in at construction; the coordinator owns
/// no policy of its own beyond the order of the legs.
pub struct DetectionPipeline {
    evaluator: GatingEvaluator,
    actuator: ActuatorController,
    notifier: BackendNotifier,
    telemetry: TelemetryPublisher,
    metrics: Arc<PipelineMetrics>,
    tasks: TaskGroup,
}

impl DetectionPipeline {
    pub fn new(
        evaluator: GatingEvaluator,
        actuator: ActuatorController,
        notifier: BackendNotifier,
        telemetry: TelemetryPublisher,
        metrics: Arc<PipelineMetrics>,
        tasks: TaskGroup,
    ) -> Self {
        Self {
            evaluator,
            actuator,
            notifier,
            telemetry,
            metrics,
            tasks,
        }
    }

    /// Runs one inference result through the pipeline. Never blocks on
    /// hardware holds or network delivery, and never returns an error;
    /// each leg degrades on its own.
    pub fn evaluate_and_act(&self, result: InferenceResult, context: EventContext) {
        self.metrics.record_received();
        let result = Arc::new(result);

        // Observability leg; independent of the gating decision.
        self.telemetry.publish(result.clone(), &context);

        match self.evaluator.evaluate(&result) {
            GateOutcome::Fire(best) => {
                info!(
                    "detection '{}' fired the pipeline (confidence {:.2}, {} detections)",
                    best.label,
                    best.confidence,
                    result.detections.len()
                );
                self.metrics.record_fired();
                if self.actuator.trigger(None) {
                    self.metrics.record_pulse();
                }
                self.notifier.notify(result.clone(), &context);
            }
            GateOutcome::NoFire(reason) => {
                debug!("pipeline hold: {}", reason);
                self.metrics.record_no_fire();
            }
        }
    }

    pub fn actuator_status(&self) -> ActuatorStatus {
        self.actuator.status()
    }

    /// Manual override: latch the actuator on.
    pub fn activate(&self) {
        self.actuator.activate();
    }

    /// Manual override: latch the actuator off.
    pub fn deactivate(&self) {
        self.actuator.deactivate();
    }

    /// Manual pulse request; reports whether a pulse was scheduled.
    pub fn pulse(&self, duration_seconds: Option<f64>) -> bool {
        let hold = duration_seconds.map(duration_from_secs);
        if self.actuator.trigger(hold) {
            self.metrics.record_pulse();
            return true;
        }
        false
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Waits for in-flight background work, bounded, then releases the
    /// actuator for good. Abandoned work keeps running detached.
    pub async fn shutdown(&self, drain_deadline: Duration) -> bool {
        let drained = self.tasks.drain(drain_deadline).await;
        if !drained {
            warn!(
                "drain deadline elapsed with {} unit(s) of background work still running",
                self.tasks.active()
            );
        }
        self.actuator.shutdown();
        drained
    }
}
