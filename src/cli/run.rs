use crate::config::parse::{load_config, ConfigError};
use crate::config::Config;
use crate::engine::{CatalogEngine, ContentKind, EngineError, RetrievalEngine};
use crate::pipeline::{format_bytes, StatsSnapshot};
use crate::stream::{StreamError, StreamPhase, StreamRequest, WaveformProvider};
use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tracing::{info, warn};

/// Log the stream statistics every this many yielded batches.
const STATS_LOG_INTERVAL: u64 = 50;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Overrides for the configured time span, taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    stream_id: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    interrupted: bool,
    /// Queue ran dry while the stream was still live
    starved: bool,
    stats: StatsSnapshot,
}

/// Starvation only means something while the producer is still running.
fn queue_starved(stats: &StatsSnapshot, phase: StreamPhase) -> bool {
    !phase.is_terminal() && stats.is_starved()
}

fn require_config_path(config_path: Option<PathBuf>) -> PathBuf {
    match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/wavestream/config.yml");
            eprintln!("  /etc/wavestream/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'wavestream config init' to generate one.");
            std::process::exit(1);
        }
    }
}

pub async fn run(
    config_path: Option<PathBuf>,
    options: RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config_path(config_path);
    run_stream(&config_path, &options).await.map_err(|e| e.into())
}

pub async fn span(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config_path(config_path);
    let (_, engine) = load_engine(&config_path)?;

    let (start, end) = engine.get_time_span(&[ContentKind::Waveform]).await?;
    println!("Traces      {}", engine.len());
    println!("Start       {}", start.to_rfc3339());
    println!("End         {}", end.to_rfc3339());
    println!("Duration    {}", end - start);
    Ok(())
}

fn load_engine(config_path: &Path) -> Result<(Config, CatalogEngine), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    info!(catalogs = config.provider.catalogs.len(), "Loading trace catalogs");
    let engine = CatalogEngine::load(&config.provider.catalogs)?;
    info!(traces = engine.len(), "Trace catalogs loaded");

    Ok((config, engine))
}

async fn run_stream(config_path: &Path, options: &RunOptions) -> Result<(), RunError> {
    let (config, engine) = load_engine(config_path)?;

    let mut provider = WaveformProvider::new(Arc::new(engine), (&config.provider).into());
    provider.prepare(config.stations());

    let mut request = StreamRequest::from(&config.stream);
    if let Some(start) = options.start_time {
        request = request.with_start_time(start);
    }
    if let Some(end) = options.end_time {
        request = request.with_end_time(end);
    }

    let mut stream = provider.iter_batches(request).await?;
    let stats = stream.stats();
    let mut interrupted = false;

    loop {
        let batch = tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                interrupted = true;
                break;
            }
            batch = stream.next_batch() => batch?,
        };

        let Some(batch) = batch else {
            break;
        };

        info!(
            batch = batch.i_batch(),
            total = ?batch.n_batches(),
            start = %batch.start_time(),
            traces = batch.traces().len(),
            bytes = %format_bytes(batch.cumulative_bytes() as f64),
            "Processing batch"
        );

        let snapshot = stats.snapshot();
        if snapshot.yielded_batches % STATS_LOG_INTERVAL == 0 {
            info!(
                queue = snapshot.queue_size,
                queue_max = snapshot.queue_size_max,
                rate = %format!("{}/s", format_bytes(snapshot.bytes_per_second)),
                "Stream progress"
            );
            if snapshot.is_starved() {
                warn!(
                    queue = snapshot.queue_size,
                    "Prefetch queue is running dry, waveform loading is the bottleneck"
                );
            }
        }
    }

    let snapshot = stats.snapshot();
    let summary = RunSummary {
        stream_id: stream.id().to_string(),
        start_time: stream.span().start,
        end_time: stream.span().end,
        interrupted,
        starved: queue_starved(&snapshot, stream.phase()),
        stats: snapshot,
    };
    stream.close().await;

    print_summary(&summary, options.json)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<(), RunError> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let status = if summary.interrupted {
        style("interrupted").yellow()
    } else {
        style("complete").green()
    };
    println!(
        "Stream {} {} ({} to {})",
        style(&summary.stream_id).bold(),
        status,
        summary.start_time.to_rfc3339(),
        summary.end_time.to_rfc3339()
    );

    let queue = format!(
        "{} / {}",
        summary.stats.queue_size, summary.stats.queue_size_max
    );
    let queue = if summary.starved {
        style(queue).red()
    } else {
        style(queue).green()
    };
    println!("Queue              {}", queue);
    for line in summary.stats.to_string().lines().skip(1) {
        println!("{}", line);
    }
    Ok(())
}
