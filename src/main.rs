use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wavestream::cli::run::RunOptions;
use wavestream::config::resolve_config_path;

#[derive(Parser)]
#[command(name = "wavestream")]
#[command(about = "Windowed waveform streaming with background prefetch", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream all batches of the configured time span
    Run {
        /// Override the configured start time (RFC 3339)
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Override the configured end time (RFC 3339)
        #[arg(long)]
        end: Option<DateTime<Utc>>,
        /// Print the final statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the time extent of the configured catalogs
    Span,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wavestream=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run { start, end, json }) => {
            let options = RunOptions {
                start_time: start,
                end_time: end,
                json,
            };
            wavestream::cli::run::run(config_path, options).await?;
        }
        None => {
            wavestream::cli::run::run(config_path, RunOptions::default()).await?;
        }
        Some(Commands::Span) => {
            wavestream::cli::run::span(config_path).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                wavestream::cli::config::init(stdout)?;
            }
            ConfigAction::Validate => {
                wavestream::cli::config::validate(config_path)?;
            }
        },
    }

    Ok(())
}
