//! Spectrum-mode amplitude conversion.
//!
//! Raw ADC counts are converted to dB with a per-gain calibration factor:
//! `dB = 10·log10(raw · GAIN_CALIBRATION[gain])`. A zero count maps to `-inf`.

use crate::error::{AppResult, DaqError};
use crate::ingest::parser::SpectrumBlock;
use serde::{Deserialize, Serialize};

/// ADC-to-power factor for each instrument gain setting.
pub const GAIN_CALIBRATION: [f64; 6] = [
    2.36161e-05,
    1.50849e-05,
    1.01289e-05,
    6.4699e-06,
    4.356e-06,
    2.9059e-06,
];

/// Converted spectrum for one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    /// Block timestamp
    pub timestamp: String,
    /// Amplitudes in dB, one sequence per channel
    pub channels: Vec<Vec<f64>>,
}

/// Convert raw samples to decibels for the given gain index.
pub fn to_decibels(raw: &[u64], gain: usize) -> AppResult<Vec<f64>> {
    let factor = GAIN_CALIBRATION.get(gain).copied().ok_or_else(|| {
        DaqError::Configuration(format!(
            "Invalid gain {}. Must be 0-{}",
            gain,
            GAIN_CALIBRATION.len() - 1
        ))
    })?;

    Ok(raw
        .iter()
        .map(|&sample| 10.0 * (sample as f64 * factor).log10())
        .collect())
}

impl SpectrumFrame {
    /// Convert every channel of `block`.
    pub fn from_block(block: &SpectrumBlock, gain: usize) -> AppResult<Self> {
        let channels = block
            .rows
            .iter()
            .map(|row| to_decibels(&row.samples, gain))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self {
            timestamp: block.timestamp.clone(),
            channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parser::SpectrumRow;

    #[test]
    fn test_unit_power_is_zero_db() {
        // raw * factor == 1.0
        let raw = (1.0 / GAIN_CALIBRATION[4]).round() as u64;
        let db = to_decibels(&[raw], 4).unwrap();
        assert!(db[0].abs() < 1e-3, "got {}", db[0]);
    }

    #[test]
    fn test_known_value_gain_one() {
        let db = to_decibels(&[1000], 1).unwrap();
        let expected = 10.0 * (1000.0 * 1.50849e-05f64).log10();
        assert!((db[0] - expected).abs() < 1e-12);
        assert!(db[0] < 0.0);
    }

    #[test]
    fn test_zero_sample_is_negative_infinity() {
        let db = to_decibels(&[0], 0).unwrap();
        assert_eq!(db[0], f64::NEG_INFINITY);
    }

    #[test]
    fn test_gain_out_of_range() {
        assert!(matches!(
            to_decibels(&[1], 6),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_frame_from_block() {
        let block = SpectrumBlock {
            timestamp: "t".into(),
            laser_temperature: None,
            rows: vec![
                SpectrumRow {
                    channel_id: "1".into(),
                    samples: vec![100, 200],
                },
                SpectrumRow {
                    channel_id: "2".into(),
                    samples: vec![],
                },
            ],
        };
        let frame = SpectrumFrame::from_block(&block, 1).unwrap();
        assert_eq!(frame.channels.len(), 2);
        assert_eq!(frame.channels[0].len(), 2);
        assert!(frame.channels[0][1] > frame.channels[0][0]);
        assert!(frame.channels[1].is_empty());
    }
}
