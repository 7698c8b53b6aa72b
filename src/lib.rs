//! Core library for the interrogator-daq application.
//!
//! This library drives time-boxed acquisition cycles against an optical
//! interrogator and turns the artifacts it writes into per-channel readings.
//!
//! - [`acquisition`]: the periodic scheduler that arms and disarms a session.
//! - [`session`]: the instrument session contract, retry policy and a mock session.
//! - [`ingest`]: watcher, validator, parser, aggregator and the ingestion pipeline.
//! - [`config`], [`logging`], [`error`]: the ambient stack shared by the binary and tests.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod session;
pub mod signal;

pub use acquisition::{AcquisitionMode, AcquisitionScheduler, RunReport, Schedule, WindowCallback};
pub use config::DaqConfig;
pub use error::{AppResult, DaqError};
pub use ingest::{AggregatedReading, ArtifactLayout, IngestOutcome, IngestionPipeline};
pub use session::{with_session, HardwareSession, MockSession, RetryPolicy, SessionSettings};
pub use signal::StopSignal;
