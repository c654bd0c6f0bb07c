use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::inference::InferenceResult;
use crate::metrics::PipelineMetrics;
use crate::prelude::{EventContext, PipelineError, PipelineResult};
use crate::tasks::TaskGroup;

/// Telemetry store settings; the REST URL and key come from the store
/// project, the table is ours.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub rest_url: Option<String>,
    pub api_key: Option<String>,
    pub table: String,
    pub timeout_seconds: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rest_url: None,
            api_key: None,
            table: "edge_inference_events".to_string(),
            timeout_seconds: 5.0,
        }
    }
}

struct RecordTarget {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

/// Publishes one observability record per inference result, fired or not.
///
/// Unlike the backend notifier there is no cooldown and no image cap; the
/// store receives the full record for offline analysis.
pub struct TelemetryPublisher {
    target: Option<RecordTarget>,
    device_id: String,
    tasks: TaskGroup,
    metrics: Arc<PipelineMetrics>,
}

impl TelemetryPublisher {
    pub fn new(
        config: &TelemetryConfig,
        device_id: &str,
        tasks: TaskGroup,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let target = if !config.enabled {
            debug!("telemetry publishing disabled");
            None
        } else {
            match (&config.rest_url, &config.api_key) {
                (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
                    let timeout = Duration::try_from_secs_f64(config.timeout_seconds)
                        .unwrap_or(Duration::from_secs(5));
                    match reqwest::Client::builder().timeout(timeout).build() {
                        Ok(client) => {
                            info!("telemetry publishing to table '{}'", config.table);
                            Some(RecordTarget {
                                url: format!(
                                    "{}/rest/v1/{}",
                                    url.trim_end_matches('/'),
                                    config.table
                                ),
                                api_key: key.clone(),
                                client,
                            })
                        }
                        Err(err) => {
                            warn!("telemetry inert; building HTTP client failed: {}", err);
                            None
                        }
                    }
                }
                _ => {
                    warn!(
                        "telemetry enabled but inert; {}",
                        PipelineError::ConfigurationIncomplete(
                            "telemetry.rest_url or telemetry.api_key not set".to_string()
                        )
                    );
                    None
                }
            }
        };
        Self {
            target,
            device_id: device_id.to_string(),
            tasks,
            metrics,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    /// Publishes one record for the given result on a detached unit of
    /// work. The capture timestamp is taken here, not at delivery time.
    pub fn publish(&self, result: Arc<InferenceResult>, context: &EventContext) {
        let target = match &self.target {
            Some(target) => target,
            None => {
                debug!("telemetry record skipped; publisher not configured");
                return;
            }
        };

        self.metrics.record_telemetry_attempt();
        let record = json!({
            "device_id": self.device_id,
            "captured_at": Utc::now().to_rfc3339(),
            "source": context.source,
            "capture_from_camera": context.capture_from_camera,
            "detection_count": result.detections.len(),
            "detections": result.detections,
            "metadata": result.metadata,
            "encoded_image": result.encoded_image,
        });
        let payload = serde_json::Value::Array(vec![record]);
        let client = target.client.clone();
        let url = target.url.clone();
        let api_key = target.api_key.clone();
        let metrics = self.metrics.clone();
        self.tasks.spawn(async move {
            match post_record(client, &url, &api_key, &payload).await {
                Ok(()) => debug!("published inference record to {}", url),
                Err(err) => {
                    metrics.record_telemetry_failure();
                    warn!("failed to publish inference telemetry: {}", err);
                }
            }
        });
    }
}

async fn post_record(
    client: reqwest::Client,
    url: &str,
    api_key: &str,
    payload: &serde_json::Value,
) -> PipelineResult<()> {
    let response = client
        .post(url)
        .header("apikey", api_key)
        .bearer_auth(api_key)
        .header("Prefer", "return=minimal")
        .json(payload)
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
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{Detection, InferenceMetadata};
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use warp::http::StatusCode;
    use warp::Filter;

    type Captured = Arc<Mutex<Vec<(Option<String>, Option<String>, serde_json::Value)>>>;

    async fn record_server(status: u16) -> (SocketAddr, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let filter = warp::post()
            .and(warp::path("rest"))
            .and(warp::path("v1"))
            .and(warp::path("edge_inference_events"))
            .and(warp::header::optional::<String>("apikey"))
            .and(warp::header::optional::<String>("prefer"))
            .and(warp::body::json())
            .map(
                move |apikey: Option<String>, prefer: Option<String>, body: serde_json::Value| {
                    sink.lock().unwrap().push((apikey, prefer, body));
                    warp::reply::with_status(
                        warp::reply::json(&serde_json::json!({})),
                        StatusCode::from_u16(status).unwrap(),
                    )
                },
            );
        let (addr, server) = warp::serve(filter).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (addr, captured)
    }

    fn publisher_for(
        rest_url: Option<String>,
        enabled: bool,
        tasks: &TaskGroup,
        metrics: &Arc<PipelineMetrics>,
    ) -> TelemetryPublisher {
        let config = TelemetryConfig {
            enabled,
            rest_url,
            api_key: Some("service-key".to_string()),
            ..TelemetryConfig::default()
        };
        TelemetryPublisher::new(&config, "edge-test-01", tasks.clone(), metrics.clone())
    }

    fn result_with_detections(count: usize) -> Arc<InferenceResult> {
        let detections = (0..count)
            .map(|i| Detection::new("debris", 0.42, i as i32, 0, i as i32 + 10, 10))
            .collect();
        let mut result = InferenceResult::new(detections, InferenceMetadata::default());
        result.encoded_image = Some("b".repeat(200_000));
        Arc::new(result)
    }

    #[tokio::test]
    async fn publishes_single_record_array_with_full_image() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let (addr, captured) = record_server(201).await;
        let publisher = publisher_for(Some(format!("http://{}", addr)), true, &tasks, &metrics);

        publisher.publish(result_with_detections(2), &EventContext::new("camera", true));
        assert!(tasks.drain(Duration::from_secs(5)).await);

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (apikey, prefer, body) = &captured[0];
        assert_eq!(apikey.as_deref(), Some("service-key"));
        assert_eq!(prefer.as_deref(), Some("return=minimal"));

        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record["device_id"], "edge-test-01");
        assert_eq!(record["detection_count"], 2);
        assert_eq!(record["source"], "camera");
        // Telemetry carries the untruncated snapshot.
        assert_eq!(record["encoded_image"].as_str().unwrap().len(), 200_000);
        chrono::DateTime::parse_from_rfc3339(record["captured_at"].as_str().unwrap()).unwrap();

        assert_eq!(metrics.snapshot().telemetry_attempts, 1);
    }

    #[tokio::test]
    async fn zero_detection_results_are_still_published() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let (addr, captured) = record_server(201).await;
        let publisher = publisher_for(Some(format!("http://{}", addr)), true, &tasks, &metrics);

        publisher.publish(
            Arc::new(InferenceResult::default()),
            &EventContext::new("image_base64", false),
        );
        assert!(tasks.drain(Duration::from_secs(5)).await);

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].2[0]["detection_count"], 0);
    }

    #[tokio::test]
    async fn consecutive_results_are_not_throttled() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let (addr, captured) = record_server(201).await;
        let publisher = publisher_for(Some(format!("http://{}", addr)), true, &tasks, &metrics);
        let context = EventContext::new("camera", true);

        publisher.publish(result_with_detections(1), &context);
        publisher.publish(result_with_detections(1), &context);
        assert!(tasks.drain(Duration::from_secs(5)).await);

        assert_eq!(captured.lock().unwrap().len(), 2);
        assert_eq!(metrics.snapshot().telemetry_attempts, 2);
    }

    #[tokio::test]
    async fn failures_are_counted_and_dropped() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let (addr, _captured) = record_server(503).await;
        let publisher = publisher_for(Some(format!("http://{}", addr)), true, &tasks, &metrics);

        publisher.publish(result_with_detections(1), &EventContext::new("camera", true));
        assert!(tasks.drain(Duration::from_secs(5)).await);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.telemetry_attempts, 1);
        assert_eq!(snapshot.telemetry_failures, 1);
    }

    #[tokio::test]
    async fn disabled_publisher_is_inert() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let publisher = publisher_for(Some("http://127.0.0.1:9".to_string()), false, &tasks, &metrics);

        assert!(!publisher.is_configured());
        publisher.publish(result_with_detections(1), &EventContext::new("camera", true));
        assert!(tasks.drain(Duration::from_millis(50)).await);
        assert_eq!(metrics.snapshot().telemetry_attempts, 0);
    }

    #[tokio::test]
    async fn enabled_but_incomplete_config_is_inert() {
        let tasks = TaskGroup::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let publisher = publisher_for(None, true, &tasks, &metrics);

        assert!(!publisher.is_configured());
        publisher.publish(result_with_detections(1), &EventContext::new("camera", true));
        assert!(tasks.drain(Duration::from_millis(50)).await);
        assert_eq!(metrics.snapshot().telemetry_attempts, 0);
    }
}
