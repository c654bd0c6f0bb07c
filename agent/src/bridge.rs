use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use edgecore::inference::InferenceResult;
use edgecore::pipeline::DetectionPipeline;
use edgecore::EventContext;
use log::debug;
use serde::Deserialize;
use serde_json::json;
use warp::{http::StatusCode, Filter};

/// Inference result ingest body plus its capture context.
#[derive(Debug, Deserialize)]
struct IngestRequest {
    #[serde(flatten)]
    result: InferenceResult,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    capture_from_camera: bool,
}

impl IngestRequest {
    fn context(&self) -> EventContext {
        let source = match &self.source {
            Some(source) => source.clone(),
            None if self.capture_from_camera => "camera".to_string(),
            None => "image_base64".to_string(),
        };
        EventContext::new(&source, self.capture_from_camera)
    }
}

/// Manual actuator override body.
#[derive(Debug, Deserialize)]
struct ActuatorCommand {
    action: ActuatorAction,
    #[serde(default)]
    duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ActuatorAction {
    Activate,
    Deactivate,
    Pulse,
}

/// HTTP face of the pipeline: result ingest, manual control, and health.
#[derive(Clone)]
pub struct Bridge {
    pipeline: Arc<DetectionPipeline>,
    actuator_configured: bool,
}

impl Bridge {
    pub fn new(pipeline: Arc<DetectionPipeline>, actuator_configured: bool) -> Self {
        Self {
            pipeline,
            actuator_configured,
        }
    }

    /// Binds the bridge and serves it on a detached unit of work.
    pub fn serve(&self, addr: SocketAddr) -> anyhow::Result<SocketAddr> {
        let (bound, server) = warp::serve(self.routes())
            .try_bind_ephemeral(addr)
            .with_context(|| format!("binding HTTP bridge to {}", addr))?;
        tokio::spawn(server);
        Ok(bound)
    }

    pub fn routes(
        &self,
    ) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        let bridge = self.clone();
        let state = warp::any().map(move || bridge.clone());

        let ingest = warp::path("inference")
            .and(warp::post())
            .and(warp::body::json())
            .and(state.clone())
            .and_then(|request: IngestRequest, bridge: Bridge| async move {
                let context = request.context();
                debug!(
                    "ingested inference result ({} detections, source {})",
                    request.result.detections.len(),
                    context.source
                );
                bridge.pipeline.evaluate_and_act(request.result, context);
                Ok::<_, warp::Rejection>(warp::reply::with_status(
                    warp::reply::json(&json!({"status": "ok"})),
                    StatusCode::OK,
                ))
            });

        let actuator_control = warp::path("actuator")
            .and(warp::post())
            .and(warp::body::json())
            .and(state.clone())
            .and_then(|command: ActuatorCommand, bridge: Bridge| async move {
                match command.action {
                    ActuatorAction::Activate => bridge.pipeline.activate(),
                    ActuatorAction::Deactivate => bridge.pipeline.deactivate(),
                    ActuatorAction::Pulse => {
                        bridge.pipeline.pulse(command.duration_seconds);
                    }
                }
                Ok::<_, warp::Rejection>(warp::reply::json(&bridge.pipeline.actuator_status()))
            });

        let actuator_status = warp::path("actuator")
            .and(warp::get())
            .and(state.clone())
            .map(|bridge: Bridge| warp::reply::json(&bridge.pipeline.actuator_status()));

        let health = warp::path("healthz").and(warp::get()).and(state).map(
            |bridge: Bridge| {
                let actuator = bridge.pipeline.actuator_status();
                let status = if bridge.actuator_configured && !actuator.enabled {
                    "degraded"
                } else {
                    "ok"
                };
                warp::reply::json(&json!({
                    "status": status,
                    "actuator": actuator,
                    "metrics": bridge.pipeline.metrics(),
                }))
            },
        );

        ingest.or(actuator_control).or(actuator_status).or(health)
    }
}
