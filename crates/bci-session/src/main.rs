//! BCI demo: simulated epochs and closed-loop adaptive sessions
//!
//! # Usage
//!
//! ```bash
//! # One simulated epoch as JSON
//! bci-demo simulate --class target --noise 0.3
//!
//! # Ten-trial adaptive session driven by the trial stream
//! bci-demo session --trials 10 --interval-ms 200
//!
//! # Load settings from a JSON file
//! bci-demo --config service.json session
//! ```

use anyhow::{Context, Result};
use bci_core::StimulusClass;
use bci_session::api::{self, SimulateRequest};
use bci_session::{build_pipeline, InMemoryStore, ServiceConfig, SessionService};
use bci_simulation::{spawn_trial_stream, StreamCommand, StreamConfig};
use clap::{Parser, Subcommand};
use rand::Rng;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Simulated P300 speller with adaptive difficulty
#[derive(Parser, Debug)]
#[command(name = "bci-demo")]
#[command(author, version, about = "Simulated BCI experiment pipeline", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSON service configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print one simulated epoch as JSON
    Simulate {
        /// Stimulus class: target or non-target
        #[arg(long, default_value = "target")]
        class: StimulusClass,

        /// Background noise level in [0, 1]
        #[arg(short, long)]
        noise: Option<f64>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run a closed-loop session and print the summary
    Session {
        /// Number of trials to run
        #[arg(short, long, default_value = "20")]
        trials: u32,

        #[arg(short, long, default_value = "demo-player")]
        participant: String,

        /// Override the calibrated pause between trials
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Background noise level in [0, 1]
        #[arg(short, long)]
        noise: Option<f64>,

        #[arg(long)]
        seed: Option<u64>,
    },
}

fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mut config = match &cli.config {
        Some(path) => ServiceConfig::from_json_file(path)?,
        None => ServiceConfig::default(),
    };

    match cli.command {
        Commands::Simulate { class, noise, seed } => {
            if let Some(noise) = noise {
                config.simulation.noise_level = noise;
            }
            run_simulate(&config, class, seed)
        }
        Commands::Session {
            trials,
            participant,
            interval_ms,
            noise,
            seed,
        } => {
            if let Some(noise) = noise {
                config.simulation.noise_level = noise;
            }
            if seed.is_some() {
                config.simulation.seed = seed;
            }
            run_session(config, trials, &participant, interval_ms).await
        }
    }
}

fn run_simulate(config: &ServiceConfig, class: StimulusClass, seed: Option<u64>) -> Result<()> {
    let request = SimulateRequest {
        class,
        sampling_rate_hz: config.simulation.sampling_rate_hz,
        duration_ms: config.simulation.duration_ms,
        noise_level: config.simulation.noise_level,
        seed: seed.or(config.simulation.seed),
    };
    let response = api::simulate(&request)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_session(config: ServiceConfig, trials: u32, participant: &str, interval_ms: Option<u64>) -> Result<()> {
    info!("BCI demo v{}", env!("CARGO_PKG_VERSION"));

    let pipeline = Arc::new(build_pipeline(&config).context("Failed to build pipeline")?);
    let service = SessionService::new(Arc::new(InMemoryStore::new()), pipeline, &config)?;

    let session = service.create_session(participant).await?;
    let calibration = service.get_calibration(session.id).await?;

    let stream_config = StreamConfig {
        simulation: config.simulation.clone(),
        trial_interval_ms: interval_ms.unwrap_or(calibration.trial_interval_ms),
        object_count: calibration.object_count,
        max_trials: Some(trials),
        ..StreamConfig::default()
    };
    let (mut trial_rx, control, stream_task) = spawn_trial_stream(stream_config)?;
    control.send(StreamCommand::Start).await?;

    let mut rng = rand::thread_rng();
    loop {
        let trial = match trial_rx.recv().await {
            Ok(trial) => trial,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Session lagged, skipped {} trials", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let response_time_ms = rng.gen_range(250.0..900.0);
        match service
            .submit_epoch(session.id, trial.trial_number, &trial.epoch, response_time_ms)
            .await
        {
            Ok(outcome) => {
                info!(
                    trial = outcome.trial.trial_number,
                    correct = outcome.trial.correct,
                    flash_speed = outcome.calibration.flash_speed,
                    objects = outcome.calibration.object_count,
                    "{}",
                    outcome.notification()
                );
                // The stream may already have finished; a closed channel is fine here
                let _ = control
                    .send(StreamCommand::SetObjectCount(outcome.calibration.object_count))
                    .await;
            }
            Err(e) => warn!(trial = trial.trial_number, "Trial failed, try again: {}", e),
        }
    }

    stream_task.await.context("Trial stream task panicked")??;

    let summary = json!({
        "session": service.get_session(session.id).await?,
        "calibration": service.get_calibration(session.id).await?,
        "smoothedDecision": service.smoothed_decision(session.id).await?,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
