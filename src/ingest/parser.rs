//! Channel record parser.
//!
//! Artifacts are comma-separated text: one header row, then repeating blocks of
//! `layout.channels` rows that share a timestamp. Each row reads
//!
//! ```text
//! timestamp, channelId, laserTempInt, laserTempFrac, {int,frac}, {int,frac}, ...
//! ```
//!
//! Because the brace groups contain a comma, the CSV reader splits every peak into two
//! fields (`{1534` and `9}`). After stripping the braces the numeric tokens are paired
//! back up: `("1534", "9")` decodes to `1534.9`. Spectrum artifacts use the same layout
//! but only the first token of each pair carries the raw sample.
//!
//! Decoding is forgiving at row level (a bad row becomes an empty list) and strict at
//! file level (an unreadable file is a [`DaqError::Parse`]).

use crate::error::{AppResult, DaqError};
use crate::ingest::layout::ArtifactLayout;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::Path;
use tracing::{debug, trace};

/// Decoded wavelengths for one channel within one block. Empty when no peaks were detected.
pub type PeakList = Vec<f64>;

/// Number of leading positional fields before the peak tokens.
const POSITIONAL_FIELDS: usize = 4;

/// One channel's row inside a peak block.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRow {
    /// Channel identifier as written by the instrument
    pub channel_id: String,
    /// Decoded peak wavelengths
    pub peaks: PeakList,
}

/// One timestamp-aligned group of channel rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBlock {
    /// Timestamp shared by the block (row 0)
    pub timestamp: String,
    /// Laser temperature in °C (row 0), when present and numeric
    pub laser_temperature: Option<f64>,
    /// One row per channel, in file order
    pub rows: Vec<ChannelRow>,
}

impl ChannelBlock {
    /// Peak list of the channel at `position`.
    pub fn peaks(&self, position: usize) -> Option<&PeakList> {
        self.rows.get(position).map(|row| &row.peaks)
    }
}

/// One channel's raw spectrum samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumRow {
    /// Channel identifier as written by the instrument
    pub channel_id: String,
    /// Raw ADC samples
    pub samples: Vec<u64>,
}

/// One timestamp-aligned group of spectrum rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumBlock {
    /// Timestamp shared by the block (row 0)
    pub timestamp: String,
    /// Laser temperature in °C (row 0), when present and numeric
    pub laser_temperature: Option<f64>,
    /// One row per channel, in file order
    pub rows: Vec<SpectrumRow>,
}

/// Result of parsing a readable artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    /// The file contained no rows at all, not even a header.
    NoData,
    /// Complete blocks in file order; empty for a header-only file.
    Blocks(Vec<T>),
}

/// Parse a peak-mode artifact.
pub fn parse_peaks(path: &Path, layout: &ArtifactLayout) -> AppResult<ParseOutcome<ChannelBlock>> {
    read_blocks(path, layout, |records| {
        let head = &records[0];
        let block = ChannelBlock {
            timestamp: field(head, 0).to_string(),
            laser_temperature: laser_temperature(head),
            rows: records
                .iter()
                .map(|record| ChannelRow {
                    channel_id: field(record, 1).to_string(),
                    peaks: decode_peaks(record),
                })
                .collect(),
        };
        debug!(
            timestamp = %block.timestamp,
            laser_temperature = ?block.laser_temperature,
            "Decoded peak block"
        );
        block
    })
}

/// Parse a spectrum-mode artifact.
pub fn parse_spectrum(
    path: &Path,
    layout: &ArtifactLayout,
) -> AppResult<ParseOutcome<SpectrumBlock>> {
    read_blocks(path, layout, |records| SpectrumBlock {
        timestamp: field(&records[0], 0).to_string(),
        laser_temperature: laser_temperature(&records[0]),
        rows: records
            .iter()
            .map(|record| SpectrumRow {
                channel_id: field(record, 1).to_string(),
                samples: decode_samples(record),
            })
            .collect(),
    })
}

fn read_blocks<T, F>(path: &Path, layout: &ArtifactLayout, mut build: F) -> AppResult<ParseOutcome<T>>
where
    F: FnMut(&[StringRecord]) -> T,
{
    if layout.channels == 0 {
        return Err(DaqError::Configuration(
            "artifact layout must have at least one channel".to_string(),
        ));
    }

    let parse_error = |err: csv::Error| DaqError::Parse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(parse_error)?;
    let mut records = reader.records();

    match records.next() {
        None => {
            debug!(path = %path.display(), "Empty artifact");
            return Ok(ParseOutcome::NoData);
        }
        Some(header) => {
            header.map_err(parse_error)?;
        }
    }

    let mut blocks = Vec::new();
    loop {
        let chunk = records
            .by_ref()
            .take(layout.channels)
            .collect::<Result<Vec<_>, _>>()
            .map_err(parse_error)?;
        // A short trailing block is end-of-stream, not an error.
        if chunk.len() < layout.channels {
            if !chunk.is_empty() {
                trace!(rows = chunk.len(), "Ignoring incomplete trailing block");
            }
            break;
        }
        blocks.push(build(&chunk));
    }

    Ok(ParseOutcome::Blocks(blocks))
}

fn field(record: &StringRecord, index: usize) -> &str {
    record.get(index).unwrap_or_default()
}

fn laser_temperature(record: &StringRecord) -> Option<f64> {
    let int = record.get(2).filter(|t| is_digits(t))?;
    let frac = record.get(3).filter(|t| is_digits(t))?;
    format!("{int}.{frac}").parse().ok()
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Peak tokens with braces stripped, keeping only purely numeric ones.
fn numeric_tokens(record: &StringRecord) -> Vec<&str> {
    record
        .iter()
        .skip(POSITIONAL_FIELDS)
        .map(|token| token.trim_matches(|c| c == '{' || c == '}'))
        .filter(|token| is_digits(token))
        .collect()
}

/// Pair `(integer, fraction)` tokens into wavelengths. An odd trailing token is dropped.
fn decode_peaks(record: &StringRecord) -> PeakList {
    let tokens = numeric_tokens(record);
    if tokens.len() < 2 {
        return PeakList::new();
    }

    tokens
        .chunks_exact(2)
        .map(|pair| format!("{}.{}", pair[0], pair[1]).parse::<f64>().ok())
        .collect::<Option<PeakList>>()
        .unwrap_or_else(|| {
            debug!(channel = field(record, 1), "Undecodable peak tokens, treating as empty");
            PeakList::new()
        })
}

/// Integer part of every token pair, i.e. every other numeric token.
fn decode_samples(record: &StringRecord) -> Vec<u64> {
    numeric_tokens(record)
        .into_iter()
        .step_by(2)
        .map(|token| token.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}
