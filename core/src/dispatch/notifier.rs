use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::inference::InferenceResult;
use crate::metrics::PipelineMetrics;
use crate::prelude::{EventContext, Location, PipelineError, PipelineResult};
use crate::tasks::TaskGroup;
use crate::throttle::CooldownGate;

/// Event type reported for every fired detection.
pub const EVENT_TYPE: &str = "illegal_dumping";

/// Hard byte cap for the encoded snapshot carried in backend payloads.
pub const MAX_ENCODED_IMAGE_BYTES: usize = 131_072;

/// Backend ingest endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub event_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: f64,
    pub cooldown_seconds: f64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            event_url: None,
            api_key: None,
            timeout_seconds: 5.0,
            cooldown_seconds: 15.0,
        }
    }
}

struct EventTarget {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

/// Debounced, non-blocking dispatch of fired detection events.
///
/// Without an event URL the notifier stays inert and every call becomes a
/// debug-logged no-op.
pub struct BackendNotifier {
    target: Option<EventTarget>,
    gate: CooldownGate,
    device_id: String,
    location: Location,
    tasks: TaskGroup,
    metrics: Arc<PipelineMetrics>,
}

impl BackendNotifier {
    pub fn new(
        config: &BackendConfig,
        device_id: &str,
        location: &Location,
        tasks: TaskGroup,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let target = match &config.event_url {
            Some(url) if !url.is_empty() => {
                let timeout =
                    Duration::try_from_secs_f64(config.timeout_seconds).unwrap_or(Duration::from_secs(5));
                match reqwest::Client::builder().timeout(timeout).build()
                {
                    Ok(client) => {
                        info!("backend notifier targeting {}", url);
                        Some(EventTarget {
                            url: url.clone(),
                            api_key: config.api_key.clone(),
                            client,
                        })
                    }
                    Err(err) => {
                        warn!("backend notifier inert; building HTTP client failed: {}", err);
                        None
                    }
                }
            }
            _ => {
                info!(
                    "backend notifier inert; {}",
                    PipelineError::ConfigurationIncomplete("backend.event_url not set".to_string())
                );
                None
            }
        };
        Self {
            target,
            gate: CooldownGate::new(
                Duration::try_from_secs_f64(config.cooldown_seconds).unwrap_or(Duration::ZERO),
            ),
            device_id: device_id.to_string(),
            location: location.clone(),
            tasks,
            metrics,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    /// Posts one fired detection event unless the cooldown window is still
    /// closed.
    ///
    /// The cooldown timestamp is recorded before the request is attempted,
    /// so a failed attempt still holds the window closed. Delivery happens
    /// on a detached unit of work; the caller never waits on the network.
    pub fn notify(&self, result: Arc<InferenceResult>, context: &EventContext) {
        let target = match &self.target {
            Some(target) => target,
            None => {
                debug!("backend notification skipped; notifier not configured");
                return;
            }
        };
        if !self.gate.try_pass() {
            debug!(
                "backend notification suppressed by cooldown ({:.2}s)",
                self.gate.cooldown().as_secs_f64()
            );
            return;
        }

        self.metrics.record_backend_attempt();
        let payload = self.event_payload(&result, context);
        let client = target.client.clone();
        let url = target.url.clone();
        let api_key = target.api_key.clone();
        let device_id = self.device_id.clone();
        let metrics = self.metrics.clone();
        self.tasks.spawn(async move {
            match post_event(client, &url, api_key.as_deref(), &device_id, &payload).await {
                Ok(status) => info!("posted detection event to {} (status {})", url, status),
                Err(err) => {
                    metrics.record_backend_failure();
                    warn!("failed to post detection event: {}", err);
                }
            }
        });
    }

    fn event_payload(&self, result: &InferenceResult, context: &EventContext) -> serde_json::Value {
        let confidence = result
            .best_detection()
            .map(|detection| detection.confidence)
            .unwrap_or(0.0);
        json!({
            "location_id": self.location.id,
            "event_type": EVENT_TYPE,
            "coordinates": {
                "lat": self.location.latitude,
                "lng": self.location.longitude,
            },
            "confidence_score": confidence,
            "metadata": {
                "device_id": self.device_id,
                "capture_from_camera": context.capture_from_camera,
                "detections": result.detections,
                "inference": result.metadata,
                "encoded_image": result.encoded_image.as_deref().map(capped_image),
            },
        })
    }
}

async fn post_event(
    client: reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    device_id: &str,
    payload: &serde_json::Value,
) -> PipelineResult<reqwest::StatusCode> {
    let mut request = client.post(url).header("x-device-id", device_id).json(payload);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }
    let response = request
        .send()
        .await
        .map_err(|err| PipelineError::DeliveryFailed(format!("POST {}: {}", url, err)))?;
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::DeliveryFailed(format!(
            "POST {}: status {}",
            url, status
        )));
    }
    Ok(status)
}

/// Caps the encoded snapshot without splitting a UTF-8 character.
fn capped_image(encoded: &str) -> &str {
    if encoded.len() <= MAX_ENCODED_IMAGE_BYTES {
        return encoded;
    }
    let mut end = MAX_ENCODED_IMAGE_BYTES;
    while !encoded.is_char_boundary(end) {
        end -= 1;
    }
    &encoded[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{Detection, InferenceMetadata};
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use warp::http::StatusCode;
    use warp::Filter;

    type Captured = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn capture_server(status: u16) -> (SocketAddr, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let filter = warp::post()
            .and(warp::header::optional::<String>("x-device-id"))
            .and(warp::body::json())
            .map(move |device: Option<String>, body: serde_json::Value| {
                sink.lock().unwrap().push((device, body));
                warp::reply::with_status(
                    warp::reply::json(&serde_json::json!({"ok": true})),
                    StatusCode::from_u16(status).unwrap(),
                )
            });
        let (addr, server) = warp::serve(filter).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (addr, captured)
    }

    fn notifier_for(
        url: Option<String>,
        cooldown_seconds: f64,
        tasks: &TaskGroup,
        metrics: &Arc<PipelineMetrics>,
    ) -> BackendNotifier {
        let config = BackendConfig {
            event_url: url,
            api_key: Some("event-key".to_string()),
            timeout_seconds: 5.0,
            cooldown_seconds,
        };
        BackendNotifier::new(
            &config,
            "edge-test-01",
            &Location::default(),
            tasks.clone(),
            metrics.clone(),
        )
    }

    fn debris_result(confidence: f32, image_chars: usize) -> Arc<InferenceResult> {
        let mut result = InferenceResult::new(
            vec![Detection::new("debris", confidence, 5, 5, 50, 50)],
            InferenceMetadata {
                detection_count: 1,
                inference_ms: 12.5,
                ..InferenceMetadata::default()
            },
        );
        if image_chars > 0 {
            result.encoded_image = Some("a".repeat(image_chars));
        }
        Arc::new(result)
    }

    #[tokio::test]
    async fn notify_posts_event_with_capped_image() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let (addr, captured) = capture_server(200).await;
        let notifier = notifier_for(
            Some(format!("http://{}/event", addr)),
            0.0,
            &tasks,
            &metrics,
        );

        notifier.notify(
            debris_result(0.75, MAX_ENCODED_IMAGE_BYTES + 4096),
            &EventContext::new("camera", true),
        );
        assert!(tasks.drain(Duration::from_secs(5)).await);

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (device, body) = &captured[0];
        assert_eq!(device.as_deref(), Some("edge-test-01"));
        assert_eq!(body["event_type"], EVENT_TYPE);
        assert_eq!(body["location_id"], "EDGE-LOCATION-001");
        assert_eq!(body["metadata"]["capture_from_camera"], true);
        assert_eq!(
            body["metadata"]["encoded_image"].as_str().unwrap().len(),
            MAX_ENCODED_IMAGE_BYTES
        );
        assert!((body["confidence_score"].as_f64().unwrap() - 0.75).abs() < 1e-6);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.backend_attempts, 1);
        assert_eq!(snapshot.backend_failures, 0);
    }

    #[tokio::test]
    async fn cooldown_drops_back_to_back_events() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let (addr, captured) = capture_server(200).await;
        let notifier = notifier_for(
            Some(format!("http://{}/event", addr)),
            60.0,
            &tasks,
            &metrics,
        );
        let context = EventContext::new("camera", true);

        notifier.notify(debris_result(0.8, 0), &context);
        notifier.notify(debris_result(0.9, 0), &context);
        assert!(tasks.drain(Duration::from_secs(5)).await);

        assert_eq!(captured.lock().unwrap().len(), 1);
        assert_eq!(metrics.snapshot().backend_attempts, 1);
    }

    #[tokio::test]
    async fn failed_attempt_still_holds_the_window_closed() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let (addr, _captured) = capture_server(500).await;
        let notifier = notifier_for(
            Some(format!("http://{}/event", addr)),
            60.0,
            &tasks,
            &metrics,
        );
        let context = EventContext::new("camera", false);

        notifier.notify(debris_result(0.8, 0), &context);
        assert!(tasks.drain(Duration::from_secs(5)).await);
        notifier.notify(debris_result(0.9, 0), &context);
        assert!(tasks.drain(Duration::from_secs(5)).await);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.backend_attempts, 1);
        assert_eq!(snapshot.backend_failures, 1);
    }

    #[tokio::test]
    async fn unconfigured_notifier_is_inert() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let notifier = notifier_for(None, 0.0, &tasks, &metrics);

        assert!(!notifier.is_configured());
        notifier.notify(debris_result(0.9, 0), &EventContext::new("camera", true));
        assert!(tasks.drain(Duration::from_millis(50)).await);
        assert_eq!(metrics.snapshot().backend_attempts, 0);
    }

    #[test]
    fn capped_image_respects_the_byte_limit() {
        let short = "a".repeat(100);
        assert_eq!(capped_image(&short).len(), 100);

        let long = "a".repeat(MAX_ENCODED_IMAGE_BYTES + 1);
        assert_eq!(capped_image(&long).len(), MAX_ENCODED_IMAGE_BYTES);
    }

    #[test]
    fn capped_image_never_splits_a_character() {
        // Multi-byte characters straddling the cap are dropped whole.
        let long = "é".repeat(MAX_ENCODED_IMAGE_BYTES);
        let capped = capped_image(&long);
        assert!(capped.len() <= MAX_ENCODED_IMAGE_BYTES);
        assert!(capped.chars().all(|c| c == 'é'));
    }

    #[test]
    fn payload_reports_zero_confidence_without_detections() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let notifier = notifier_for(
            Some("http://127.0.0.1:9/event".to_string()),
            0.0,
            &tasks,
            &metrics,
        );
        let result = InferenceResult::default();
        let payload = notifier.event_payload(&result, &EventContext::new("camera", false));
        assert_eq!(payload["confidence_score"], 0.0);
        assert!(payload["metadata"]["encoded_image"].is_null());
    }
}
