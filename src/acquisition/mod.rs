//! Acquisition timing loop.
//!
//! See [`scheduler::AcquisitionScheduler`] for the loop itself.

pub mod scheduler;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use scheduler::{
    AcquisitionCycle, AcquisitionScheduler, CycleOutcome, CycleRecord, FnCallback, RunReport,
    Schedule, WindowCallback,
};

/// Which export the session is armed for during each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// Detected peak wavelengths
    #[default]
    Peaks,
    /// Full spectrum amplitudes
    Spectrum,
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionMode::Peaks => write!(f, "peaks"),
            AcquisitionMode::Spectrum => write!(f, "spectrum"),
        }
    }
}
