//! Peak aggregation across the blocks of one artifact.
//!
//! For every channel and peak position the aggregator averages the values found in
//! each block. Lists of different lengths are aligned by position; a block that has no
//! value at a position simply does not contribute to that position's mean.
//!
//! A position with no present value in any block is kept as `None` (`null` in JSON) so
//! later positions keep their index. Trailing empty positions are trimmed, so a channel
//! with no values at all is an empty sequence.
//!
//! Values `<= 0.0` (and non-finite values) are treated as "no reading" and excluded.
//!
//! Known limitation: this conflates a genuine zero (or negative) value with a missing
//! one, and is likely a latent defect. It is kept only because existing artifacts use
//! zero to mark an empty peak slot and have no other marker.

use crate::ingest::parser::ChannelBlock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Decimal places kept in aggregated wavelengths.
const ROUND_DECIMALS: i32 = 4;

/// One averaged reading per channel for one artifact.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedReading {
    /// Artifact the reading was built from, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Number of blocks averaged
    pub blocks: usize,
    /// Mean wavelength per peak position, one sequence per channel in channel order.
    /// `None` marks a position with no present value.
    pub channels: Vec<Vec<Option<f64>>>,
}

impl AggregatedReading {
    /// Whether no channel produced any value.
    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(Vec::is_empty)
    }
}

/// Average `blocks` into one reading of exactly `channels` sequences.
///
/// Positions at which no block has a present value are `None`; trailing ones are dropped.
pub fn aggregate(blocks: &[ChannelBlock], channels: usize) -> AggregatedReading {
    let averaged = (0..channels)
        .map(|channel| {
            let lists: Vec<&Vec<f64>> = blocks
                .iter()
                .filter_map(|block| block.peaks(channel))
                .collect();
            let width = lists.iter().map(|list| list.len()).max().unwrap_or(0);

            let mut means: Vec<Option<f64>> = (0..width)
                .map(|position| {
                    let present: Vec<f64> = lists
                        .iter()
                        .filter_map(|list| list.get(position).copied())
                        .filter(|value| is_present(*value))
                        .collect();
                    mean(&present).map(round)
                })
                .collect();
            while means.last() == Some(&None) {
                means.pop();
            }
            means
        })
        .collect();

    AggregatedReading {
        source: None,
        blocks: blocks.len(),
        channels: averaged,
    }
}

fn is_present(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn round(value: f64) -> f64 {
    let scale = 10f64.powi(ROUND_DECIMALS);
    (value * scale).round() / scale
}
