use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use crowd_vision::{
    AlertRecord, EngineConfig, EventSink, FrameResult, IngestWorker, MemoryEventLog, SharedState,
    SystemEvent, TracingSink, TrackedDetection,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Replays recorded tracker output through the crowd aggregation engine.
#[derive(Debug, Parser)]
#[command(name = "crowd_replay", version, about)]
struct Args {
    /// JSON-lines file, one frame per line.
    input: PathBuf,

    /// Engine configuration (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Zone definitions in zones.json format; replaces zones from the config.
    #[arg(long)]
    zones: Option<PathBuf>,

    /// Write the final heatmap as a PNG.
    #[arg(long)]
    heatmap_out: Option<PathBuf>,

    /// Write the final summary as JSON.
    #[arg(long)]
    summary_out: Option<PathBuf>,

    /// Depth of the ingest queue.
    #[arg(long, default_value_t = 32)]
    queue_depth: usize,

    /// Spacing of synthetic timestamps for frames that carry none.
    #[arg(long, default_value_t = 1000)]
    frame_interval_ms: i64,
}

/// One line of the input file.
#[derive(Debug, Deserialize)]
struct RecordedFrame {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    detections: Vec<TrackedDetection>,
}

/// Logs every event and keeps alerts for the final report.
struct ReplaySink {
    log: MemoryEventLog,
}

impl EventSink for ReplaySink {
    fn alert_raised(&self, alert: &AlertRecord) {
        TracingSink.alert_raised(alert);
        self.log.alert_raised(alert);
    }

    fn system_event(&self, event: &SystemEvent) {
        TracingSink.system_event(event);
        self.log.system_event(event);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Setup ---
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("crowd_vision=info,crowd_replay=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    // --- 2. Engine Configuration ---
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let mut config = EngineConfig::default();
            config.apply_env_overrides().context("applying environment overrides")?;
            config
        }
    };
    if let Some(path) = &args.zones {
        config
            .load_zones_json(path)
            .with_context(|| format!("loading zones {}", path.display()))?;
    }

    let sink = Arc::new(ReplaySink {
        log: MemoryEventLog::new(config.alert_log_capacity),
    });
    let state = Arc::new(
        SharedState::with_sink(&config, sink.clone()).context("building engine state")?,
    );

    // --- 3. Worker & Update Listener ---
    let worker = IngestWorker::spawn(Arc::clone(&state), args.queue_depth);
    let mut updates = worker.subscribe();
    let listener = tokio::spawn(async move {
        let mut frames = 0u64;
        loop {
            match updates.recv().await {
                Ok(update) => {
                    frames += 1;
                    tracing::debug!(
                        timestamp = %update.snapshot.timestamp,
                        total = update.snapshot.total_count,
                        "Frame aggregated"
                    );
                    for alert in &update.alerts {
                        tracing::info!(
                            alert_id = alert.id,
                            source = %alert.source(),
                            actual_count = alert.actual_count,
                            "Alert in update stream"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Update listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        frames
    });

    // --- 4. Main Replay Loop ---
    let file = tokio::fs::File::open(&args.input)
        .await
        .with_context(|| format!("opening {}", args.input.display()))?;
    let mut lines = tokio::io::BufReader::new(file).lines();
    let start = Utc::now();
    let mut line_number = 0usize;
    let mut submitted = 0i64;

    while let Some(line) = lines.next_line().await.context("reading input")? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let frame: RecordedFrame = serde_json::from_str(&line)
            .with_context(|| format!("parsing frame on line {line_number}"))?;
        let timestamp = frame.timestamp.unwrap_or_else(|| {
            start + Duration::milliseconds(submitted * args.frame_interval_ms)
        });
        worker
            .submit(FrameResult::new(frame.detections, timestamp))
            .await
            .context("submitting frame")?;
        submitted += 1;
    }

    // --- 5. Drain & Report ---
    let processed = worker.shutdown().await.context("stopping ingest worker")?;
    let observed = listener.await.context("joining update listener")?;
    tracing::info!(
        processed,
        observed,
        alerts = sink.log.alert_count(),
        "Replay complete"
    );

    if let Some(path) = &args.heatmap_out {
        state
            .heatmap_snapshot()
            .save_png(path)
            .with_context(|| format!("writing heatmap {}", path.display()))?;
        tracing::info!(path = %path.display(), "Heatmap written");
    }

    let summary = serde_json::to_string_pretty(&state.summary())?;
    if let Some(path) = &args.summary_out {
        tokio::fs::write(path, &summary)
            .await
            .with_context(|| format!("writing summary {}", path.display()))?;
    }
    println!("{summary}");
    Ok(())
}
