//! CLI entry point for interrogator-daq.
//!
//! Provides command-line access to:
//! - a simulated acquisition run (scheduler + mock session + ingestion pipeline)
//! - one-shot ingestion from the drop directory
//! - decoding a single artifact without deleting it
//!
//! # Usage
//!
//! ```bash
//! interrogator-daq simulate --duration-ms 5000
//! interrogator-daq ingest
//! interrogator-daq parse csvs/peaks_000000.csv
//! interrogator-daq spectrum csvs/spectrum_000000.csv --gain 2
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use interrogator_daq::acquisition::{AcquisitionCycle, AcquisitionScheduler, Schedule, WindowCallback};
use interrogator_daq::config::{DaqConfig, DEFAULT_CONFIG_PATH};
use interrogator_daq::error::{AppResult, DaqError};
use interrogator_daq::ingest::{
    aggregate, parse_peaks, parse_spectrum, IngestOutcome, IngestionPipeline, ParseOutcome,
    SpectrumFrame,
};
use interrogator_daq::logging;
use interrogator_daq::session::mock::SyntheticArtifact;
use interrogator_daq::session::{with_session, MockSession};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "interrogator-daq")]
#[command(about = "Time-boxed acquisition and artifact ingestion for optical interrogators", long_about = None)]
struct Cli {
    /// Configuration file (TOML); INTERROGATOR_* environment variables override it
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the acquisition loop against a simulated interrogator
    Simulate {
        /// Total run duration (overrides acquisition.duration_ms)
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Interval between window starts (overrides acquisition.period_ms)
        #[arg(long)]
        period_ms: Option<u64>,

        /// Acquisition window length (overrides acquisition.acq_window_ms)
        #[arg(long)]
        window_ms: Option<u64>,
    },

    /// Wait for one artifact in the drop directory and ingest it
    Ingest,

    /// Decode and aggregate a peak artifact without deleting it
    Parse {
        /// Artifact to decode
        file: PathBuf,
    },

    /// Convert a spectrum artifact to dB without deleting it
    Spectrum {
        /// Artifact to decode
        file: PathBuf,

        /// Gain index (overrides session.gain)
        #[arg(long)]
        gain: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = DaqConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    logging::init(&config.application)?;

    match cli.command {
        Commands::Simulate {
            duration_ms,
            period_ms,
            window_ms,
        } => simulate(config, duration_ms, period_ms, window_ms).await,
        Commands::Ingest => ingest_once(&config).await,
        Commands::Parse { file } => parse_file(&config, file),
        Commands::Spectrum { file, gain } => spectrum_file(&config, file, gain),
    }
}

/// Prints each ingestion outcome as one JSON line as soon as it is produced.
struct EmitJson {
    pipeline: IngestionPipeline,
}

#[async_trait]
impl WindowCallback for EmitJson {
    type Output = IngestOutcome;

    async fn on_window_complete(&mut self, cycle: &AcquisitionCycle) -> AppResult<IngestOutcome> {
        let outcome = self.pipeline.on_window_complete(cycle).await?;
        print_json(&outcome).map_err(|e| DaqError::Callback(e.to_string()))?;
        Ok(outcome)
    }
}

async fn simulate(
    config: DaqConfig,
    duration_ms: Option<u64>,
    period_ms: Option<u64>,
    window_ms: Option<u64>,
) -> Result<()> {
    let acq = &config.acquisition;
    let schedule = Schedule::from_millis(
        duration_ms.unwrap_or(acq.duration_ms),
        period_ms.unwrap_or(acq.period_ms),
        window_ms.unwrap_or(acq.acq_window_ms),
    )?;

    let scheduler = AcquisitionScheduler::new(acq.mode);
    let stop = scheduler.stop_signal();
    let pipeline = IngestionPipeline::from_config(&config)?.with_cancel(stop.clone());
    let mut callback = EmitJson { pipeline };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current window");
            stop.trigger();
        }
    });

    let mut session = MockSession::new().with_artifacts(SyntheticArtifact {
        extension: config.artifacts.extension.clone(),
        ..SyntheticArtifact::default()
    });

    let report = with_session(
        &mut session,
        &config.session_settings(),
        &config.retry_policy(),
        move |s| {
            Box::pin(async move {
                Ok(scheduler
                    .run_schedule(s, &schedule, &mut callback)
                    .await)
            })
        },
    )
    .await?;

    for (iteration, err) in report.failures() {
        warn!(iteration, error = %err, "Iteration failed");
    }
    info!(
        iterations = report.iterations(),
        readings = report.outputs().count(),
        stopped = report.stopped,
        "Simulation finished"
    );
    Ok(())
}

async fn ingest_once(config: &DaqConfig) -> Result<()> {
    let mut pipeline = IngestionPipeline::open_from_config(config)?;
    let outcome = pipeline.ingest_next().await?;
    print_json(&outcome)
}

fn parse_file(config: &DaqConfig, file: PathBuf) -> Result<()> {
    let layout = config.layout();
    match parse_peaks(&file, &layout)? {
        ParseOutcome::NoData => print_json(&IngestOutcome::NoData { path: file }),
        ParseOutcome::Blocks(blocks) => {
            let mut reading = aggregate(&blocks, layout.channels);
            reading.source = Some(file);
            print_json(&IngestOutcome::Reading(reading))
        }
    }
}

fn spectrum_file(config: &DaqConfig, file: PathBuf, gain: Option<usize>) -> Result<()> {
    let gain = gain.unwrap_or(config.session.gain);
    match parse_spectrum(&file, &config.layout())? {
        ParseOutcome::NoData => print_json(&IngestOutcome::NoData { path: file }),
        ParseOutcome::Blocks(blocks) => {
            let frames = blocks
                .iter()
                .map(|block| SpectrumFrame::from_block(block, gain))
                .collect::<AppResult<Vec<_>>>()?;
            print_json(&IngestOutcome::Spectrum {
                source: file,
                frames,
            })
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
