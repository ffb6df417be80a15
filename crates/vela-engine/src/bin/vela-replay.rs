//! vela-replay: run recorded decision inputs through the execution core.
//!
//! Reads one JSON document `{intent, market, features, measured_latency_ms}`
//! or an array of them, runs `place` on each in order and prints the
//! outcomes with every audit event as JSON. `--trace-events` also writes
//! each audit event to the `vela::audit` log target as it happens.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;
use vela_core::{
    DecisionFeatures, EventSink, MarketSpec, OrderIntent, RecordedEvent, RecordingSink,
};
use vela_engine::{AppConfig, ExecutionCore, PlaceOutcome};
use vela_telemetry::{TeeSink, TracingEventSink};

/// Replay decision inputs through the vela execution core
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via VELA_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// JSON input document
    #[arg(short, long)]
    input: String,

    /// Append the prometheus text exposition to the report
    #[arg(long)]
    metrics: bool,

    /// Also log every audit event under the vela::audit target
    #[arg(long)]
    trace_events: bool,
}

#[derive(Debug, Deserialize)]
struct ReplayInput {
    intent: OrderIntent,
    market: MarketSpec,
    #[serde(default)]
    features: DecisionFeatures,
    #[serde(default)]
    measured_latency_ms: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayDocument {
    Many(Vec<ReplayInput>),
    One(Box<ReplayInput>),
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    generated_at: String,
    outcomes: Vec<PlaceOutcome>,
    events: Vec<RecordedEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    vela_telemetry::init_logging()?;

    let config_path = args.config.or_else(|| std::env::var("VELA_CONFIG").ok());
    let config = match &config_path {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            AppConfig::from_file(path)?
        }
        None => AppConfig::load()?,
    };

    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read input {}", args.input))?;
    let inputs = match serde_json::from_str::<ReplayDocument>(&raw)
        .with_context(|| format!("failed to parse input {}", args.input))?
    {
        ReplayDocument::Many(inputs) => inputs,
        ReplayDocument::One(input) => vec![*input],
    };

    let recorder = Arc::new(RecordingSink::new());
    let sink: Arc<dyn EventSink> = if args.trace_events {
        Arc::new(TeeSink::new(vec![
            recorder.clone() as Arc<dyn EventSink>,
            Arc::new(TracingEventSink),
        ]))
    } else {
        recorder.clone()
    };
    let core = ExecutionCore::new(config, sink)?;

    let outcomes: Vec<PlaceOutcome> = inputs
        .iter()
        .map(|input| {
            core.place(
                &input.intent,
                &input.market,
                &input.features,
                input.measured_latency_ms,
            )
        })
        .collect();
    info!(decisions = outcomes.len(), "replay complete");

    let report = ReplayReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        outcomes,
        events: recorder.events(),
        metrics: if args.metrics {
            Some(vela_telemetry::Metrics::render()?)
        } else {
            None
        },
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
