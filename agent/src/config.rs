use anyhow::Context;
use edgecore::actuator::ActuatorConfig;
use edgecore::dispatch::{BackendConfig, TelemetryConfig};
use edgecore::gating::GatingConfig;
use edgecore::Location;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

/// Bind address for the HTTP bridge.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("parsing bind address {}:{}", self.host, self.port))
    }
}

/// Top-level agent configuration, loadable from YAML.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub device_id: String,
    pub server: ServerConfig,
    pub location: Location,
    pub gating: GatingConfig,
    pub actuator: ActuatorConfig,
    pub backend: BackendConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device_id: "edge-raspi-01".to_string(),
            server: ServerConfig::default(),
            location: Location::default(),
            gating: GatingConfig::default(),
            actuator: ActuatorConfig::default(),
            backend: BackendConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading agent config {}", path_ref.display()))?;
        let config: AgentConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing agent config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(min_confidence: f32, target_labels: Vec<String>) -> Self {
        let mut config = Self::default();
        config.gating.min_confidence = min_confidence;
        config.gating.target_labels = target_labels;
        config
    }
}
