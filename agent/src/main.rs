use anyhow::Context;
use clap::Parser;
use config::AgentConfig;
use edgecore::actuator::{ActuatorController, MockLine};
use edgecore::dispatch::{BackendNotifier, TelemetryPublisher};
use edgecore::gating::GatingEvaluator;
use edgecore::metrics::PipelineMetrics;
use edgecore::pipeline::DetectionPipeline;
use edgecore::tasks::TaskGroup;
use edgecore::EventContext;
use log::info;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;

mod bridge;
mod config;
mod generator;

#[derive(Parser)]
#[command(author, version, about = "Edge agent driving the detection-action pipeline")]
struct Args {
    /// Run one synthetic inference result through the pipeline on a mock line
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load the agent config from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Minimum firing confidence when no config file is given
    #[arg(long, default_value_t = 0.5)]
    min_confidence: f32,
    /// Allow-list label applied when no config file is given (repeatable)
    #[arg(long = "target-label")]
    target_labels: Vec<String>,
    /// Keep the HTTP bridge alive for incoming inference results
    #[arg(long, default_value_t = false)]
    serve: bool,
}

const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let agent_config = match &args.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::from_args(args.min_confidence, args.target_labels.clone()),
    };

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating agent runtime")?;
    runtime.block_on(run(args, agent_config))
}

async fn run(args: Args, config: AgentConfig) -> anyhow::Result<()> {
    let tasks = TaskGroup::new();
    let metrics = Arc::new(PipelineMetrics::new());

    // Offline runs never touch real hardware.
    let mock_line = if args.offline {
        Some(MockLine::new())
    } else {
        None
    };
    let actuator = match &mock_line {
        Some(line) => {
            ActuatorController::with_line(&config.actuator, Box::new(line.clone()), tasks.clone())
        }
        None => ActuatorController::from_config(&config.actuator, tasks.clone()),
    };
    let notifier = BackendNotifier::new(
        &config.backend,
        &config.device_id,
        &config.location,
        tasks.clone(),
        metrics.clone(),
    );
    let telemetry = TelemetryPublisher::new(
        &config.telemetry,
        &config.device_id,
        tasks.clone(),
        metrics.clone(),
    );
    let evaluator = GatingEvaluator::new(&config.gating);
    let pipeline = Arc::new(DetectionPipeline::new(
        evaluator,
        actuator,
        notifier,
        telemetry,
        metrics,
        tasks.clone(),
    ));
    info!("pipeline assembled for device {}", config.device_id);

    if args.offline {
        let result = generator::build_inference_result(&generator::GeneratorConfig::default())?;
        pipeline.evaluate_and_act(result, EventContext::new("synthetic", false));
        tasks.drain(DRAIN_DEADLINE).await;

        let snapshot = pipeline.metrics();
        let line_pulses = mock_line.as_ref().map(|line| line.pulses()).unwrap_or(0);
        println!(
            "Offline run -> received {}, fired {}, pulses {} (line pulses {}), backend attempts {}, telemetry attempts {}",
            snapshot.received,
            snapshot.fired,
            snapshot.pulses,
            line_pulses,
            snapshot.backend_attempts,
            snapshot.telemetry_attempts
        );

        let report = format!(
            "received={} fired={} pulses={} line_pulses={} backend_attempts={} telemetry_attempts={}\n",
            snapshot.received,
            snapshot.fired,
            snapshot.pulses,
            line_pulses,
            snapshot.backend_attempts,
            snapshot.telemetry_attempts
        );
        let report_path = PathBuf::from("tools/data/offline_events.log");
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(report_path)?;
        file.write_all(report.as_bytes())?;
    }

    if args.serve {
        let bridge = bridge::Bridge::new(pipeline.clone(), config.actuator.enabled);
        let bound = bridge.serve(config.server.bind_address()?)?;
        println!("[bridge] listening on http://{} (Ctrl+C to stop)", bound);
        signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
    }

    let drained = pipeline.shutdown(DRAIN_DEADLINE).await;
    if !drained {
        println!("[agent] drain deadline elapsed; abandoning remaining background work");
    }
    Ok(())
}
