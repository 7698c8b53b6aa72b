//! Mock interrogator session.
//!
//! Simulates an instrument without hardware: it enforces the session usage contract,
//! counts every call for assertions, can be told to fail chosen attempts, and can drop
//! a synthetic artifact into the configured output directory each time an acquisition
//! window is disarmed.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut session = MockSession::new().with_artifacts(SyntheticArtifact::default());
//! session.connect().await?;
//! session.configure(&settings).await?;
//! session.start_peaks_collection().await?;
//! session.stop_collection().await?; // writes peaks_000000.csv into settings.output_path
//! ```

use crate::acquisition::AcquisitionMode;
use crate::error::{AppResult, DaqError};
use crate::session::{HardwareSession, SessionSettings};
use async_trait::async_trait;
use chrono::Local;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Content written by [`MockSession`] after each acquisition window.
#[derive(Debug, Clone)]
pub struct SyntheticArtifact {
    /// Number of timestamp blocks per file
    pub blocks: usize,
    /// Peak wavelengths per channel, repeated in every block
    pub peaks: Vec<Vec<f64>>,
    /// Raw spectrum samples per channel, used when armed for spectrum collection
    pub spectrum: Vec<Vec<u32>>,
    /// Artifact extension, without the dot
    pub extension: String,
}

impl Default for SyntheticArtifact {
    fn default() -> Self {
        Self {
            blocks: 3,
            peaks: vec![
                vec![1534.9, 1550.12],
                vec![1541.3],
                vec![],
                vec![1529.75, 1547.5, 1560.01],
            ],
            spectrum: vec![vec![1200, 1800, 2400, 1800]; 4],
            extension: "csv".to_string(),
        }
    }
}

impl SyntheticArtifact {
    fn render(&self, mode: AcquisitionMode) -> String {
        let mut out = String::from("Timestamp,Channel,LaserTemperature,,Data\n");
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let rows: Vec<String> = match mode {
            AcquisitionMode::Peaks => self.peaks.iter().map(|p| peak_tokens(p)).collect(),
            AcquisitionMode::Spectrum => self
                .spectrum
                .iter()
                .map(|samples| {
                    samples
                        .iter()
                        .map(|s| format!("{{{s},0}}"))
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .collect(),
        };

        for _ in 0..self.blocks {
            for (idx, tokens) in rows.iter().enumerate() {
                let _ = write!(out, "{timestamp},{},25,3", idx + 1);
                if !tokens.is_empty() {
                    out.push(',');
                    out.push_str(tokens);
                }
                out.push('\n');
            }
        }
        out
    }
}

fn peak_tokens(peaks: &[f64]) -> String {
    peaks
        .iter()
        .map(|value| {
            let text = value.to_string();
            let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), "0"));
            format!("{{{int},{frac}}}")
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// In-process stand-in for an interrogator session.
#[derive(Debug, Default)]
pub struct MockSession {
    connected: bool,
    settings: Option<SessionSettings>,
    armed: Option<AcquisitionMode>,
    artifact: Option<SyntheticArtifact>,
    artifacts_written: usize,

    failing_connects: u32,
    failing_starts: HashSet<usize>,
    failing_stops: HashSet<usize>,

    connect_attempts: u32,
    start_calls: usize,
    stop_calls: usize,
    disconnect_calls: usize,
}

impl MockSession {
    /// Create a mock that accepts every call and writes no artifacts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `count` connection attempts with a connection error.
    pub fn with_failing_connects(mut self, count: u32) -> Self {
        self.failing_connects = count;
        self
    }

    /// Fail the start calls with these zero-based indices.
    pub fn with_failing_starts(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.failing_starts.extend(calls);
        self
    }

    /// Fail the stop calls with these zero-based indices.
    pub fn with_failing_stops(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.failing_stops.extend(calls);
        self
    }

    /// Write `artifact` into the output path after every disarm.
    pub fn with_artifacts(mut self, artifact: SyntheticArtifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Whether the session is currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether an acquisition is currently armed.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Total connect calls, including failed ones.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    /// Total start calls (peaks and spectrum), including failed ones.
    pub fn start_count(&self) -> usize {
        self.start_calls
    }

    /// Total stop calls, including failed ones.
    pub fn stop_count(&self) -> usize {
        self.stop_calls
    }

    /// Total disconnect calls.
    pub fn disconnect_count(&self) -> usize {
        self.disconnect_calls
    }

    /// Number of artifacts dropped so far.
    pub fn artifacts_written(&self) -> usize {
        self.artifacts_written
    }

    fn ensure_ready(&self) -> AppResult<&SessionSettings> {
        if !self.connected {
            return Err(DaqError::SessionUsage(
                "Tried to use interrogator without being connected to it. Call connect() first."
                    .to_string(),
            ));
        }
        self.settings.as_ref().ok_or_else(|| {
            DaqError::SessionUsage(
                "Tried to use interrogator without being configured. Call configure() first."
                    .to_string(),
            )
        })
    }

    fn arm(&mut self, mode: AcquisitionMode) -> AppResult<()> {
        self.ensure_ready()?;
        let call = self.start_calls;
        self.start_calls += 1;
        if self.failing_starts.contains(&call) {
            return Err(DaqError::Hardware(format!(
                "Failed to enable {mode} collection"
            )));
        }
        self.armed = Some(mode);
        debug!(%mode, "Mock session armed");
        Ok(())
    }

    fn drop_artifact(&mut self, dir: &Path, mode: AcquisitionMode) -> AppResult<Option<PathBuf>> {
        let Some(artifact) = &self.artifact else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;

        let name = format!("{mode}_{:06}.{}", self.artifacts_written, artifact.extension);
        let staging = dir.join(format!(".{name}.part"));
        let target = dir.join(name);
        std::fs::write(&staging, artifact.render(mode))?;
        std::fs::rename(&staging, &target)?;

        self.artifacts_written += 1;
        Ok(Some(target))
    }
}

#[async_trait]
impl HardwareSession for MockSession {
    async fn connect(&mut self) -> AppResult<()> {
        self.connect_attempts += 1;
        if self.connect_attempts <= self.failing_connects {
            return Err(DaqError::Connection("interrogator not ready".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    async fn configure(&mut self, settings: &SessionSettings) -> AppResult<()> {
        if !self.connected {
            return Err(DaqError::SessionUsage(
                "Tried to configure interrogator before connect()".to_string(),
            ));
        }
        self.settings = Some(settings.clone());
        Ok(())
    }

    async fn start_peaks_collection(&mut self) -> AppResult<()> {
        self.arm(AcquisitionMode::Peaks)
    }

    async fn start_spectrum_collection(&mut self) -> AppResult<()> {
        self.arm(AcquisitionMode::Spectrum)
    }

    async fn stop_collection(&mut self) -> AppResult<()> {
        let output = self.ensure_ready()?.output_path.clone();
        let call = self.stop_calls;
        self.stop_calls += 1;
        if self.failing_stops.contains(&call) {
            return Err(DaqError::Hardware("stopWaveMode rejected".to_string()));
        }

        if let Some(mode) = self.armed.take() {
            if let Some(path) = self.drop_artifact(&output, mode)? {
                debug!(path = %path.display(), "Mock session wrote artifact");
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> AppResult<()> {
        self.disconnect_calls += 1;
        self.connected = false;
        self.armed = None;
        Ok(())
    }
}
