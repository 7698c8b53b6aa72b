//! Artifact ingestion.
//!
//! The interrogator writes one text artifact per acquisition window into a drop
//! directory. Ingestion turns each artifact into an in-memory reading and removes it:
//!
//! ```text
//! watcher::ArtifactWatcher → validator::validate → parser::parse_peaks
//!                          → aggregator::aggregate → delete artifact → AggregatedReading
//! ```
//!
//! [`pipeline::IngestionPipeline`] composes the stages and is the default
//! window callback for the acquisition scheduler.

pub mod aggregator;
pub mod layout;
pub mod parser;
pub mod pipeline;
pub mod spectrum;
pub mod validator;
pub mod watcher;

pub use aggregator::{aggregate, AggregatedReading};
pub use layout::ArtifactLayout;
pub use parser::{
    parse_peaks, parse_spectrum, ChannelBlock, ChannelRow, ParseOutcome, PeakList, SpectrumBlock,
    SpectrumRow,
};
pub use pipeline::{IngestOutcome, IngestionPipeline};
pub use spectrum::{to_decibels, SpectrumFrame};
pub use validator::{validate, Validation};
pub use watcher::ArtifactWatcher;
