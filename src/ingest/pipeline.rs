//! Ingestion pipeline: watch → validate → parse → aggregate → delete.
//!
//! The pipeline handles one artifact end-to-end before looking for the next. The drop
//! directory is expected to be empty between cycles: it is cleared when the pipeline is
//! built and every consumed or rejected artifact is deleted.
//!
//! Outcomes per artifact:
//!
//! | Artifact                     | Result                                    | File        |
//! |------------------------------|-------------------------------------------|-------------|
//! | valid peak artifact          | `Ok(IngestOutcome::Reading)`              | deleted     |
//! | valid spectrum artifact      | `Ok(IngestOutcome::Spectrum)`             | deleted     |
//! | structurally too small       | `Ok(IngestOutcome::Rejected)`             | deleted     |
//! | no rows at all               | `Ok(IngestOutcome::NoData)`               | deleted     |
//! | unreadable / corrupt         | `Err(DaqError::Parse)`                    | kept or quarantined |
//!
//! An unreadable artifact left in place is skipped by every later wait, so newer
//! artifacts behind it are still consumed. A failed delete is logged and does not
//! discard the outcome that was already decoded.

use crate::acquisition::{AcquisitionCycle, AcquisitionMode, WindowCallback};
use crate::config::DaqConfig;
use crate::error::{AppResult, DaqError};
use crate::ingest::aggregator::{aggregate, AggregatedReading};
use crate::ingest::layout::ArtifactLayout;
use crate::ingest::parser::{parse_peaks, parse_spectrum, ParseOutcome};
use crate::ingest::spectrum::{SpectrumFrame, GAIN_CALIBRATION};
use crate::ingest::validator::{validate, Validation};
use crate::ingest::watcher::ArtifactWatcher;
use crate::signal::StopSignal;
use async_trait::async_trait;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What one ingested artifact produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Averaged peak wavelengths.
    Reading(AggregatedReading),
    /// Converted spectrum, one frame per block.
    Spectrum {
        /// Artifact the frames were built from
        source: PathBuf,
        /// Frames in file order
        frames: Vec<SpectrumFrame>,
    },
    /// Artifact failed structural validation and was deleted.
    Rejected {
        /// Deleted artifact
        path: PathBuf,
        /// Validation message
        reason: String,
    },
    /// Artifact contained no rows and was deleted.
    NoData {
        /// Deleted artifact
        path: PathBuf,
    },
}

impl IngestOutcome {
    /// The aggregated reading, if this outcome carries one.
    pub fn reading(&self) -> Option<&AggregatedReading> {
        match self {
            IngestOutcome::Reading(reading) => Some(reading),
            _ => None,
        }
    }
}

/// Consumes artifacts from one drop directory.
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    watcher: ArtifactWatcher,
    layout: ArtifactLayout,
    mode: AcquisitionMode,
    gain: usize,
    quarantine_dir: Option<PathBuf>,
}

impl IngestionPipeline {
    /// Pipeline over `drop_dir` in peak mode.
    ///
    /// Creates the directory if needed and removes any files already in it.
    pub fn new(drop_dir: impl Into<PathBuf>, layout: ArtifactLayout) -> AppResult<Self> {
        let pipeline = Self::open(drop_dir, layout)?;
        clear_directory(pipeline.drop_dir());
        Ok(pipeline)
    }

    /// Like [`new`](Self::new) but keeps artifacts already in the directory.
    pub fn open(drop_dir: impl Into<PathBuf>, layout: ArtifactLayout) -> AppResult<Self> {
        let drop_dir = drop_dir.into();
        fs::create_dir_all(&drop_dir)?;

        Ok(Self {
            watcher: ArtifactWatcher::new(drop_dir, layout.clone()),
            layout,
            mode: AcquisitionMode::Peaks,
            gain: 1,
            quarantine_dir: None,
        })
    }

    /// Pipeline configured from the `[artifacts]`, `[acquisition]` and `[session]` sections.
    /// Clears the drop directory like [`new`](Self::new).
    pub fn from_config(config: &DaqConfig) -> AppResult<Self> {
        let pipeline = Self::open_from_config(config)?;
        clear_directory(pipeline.drop_dir());
        Ok(pipeline)
    }

    /// Configured pipeline that keeps artifacts already in the drop directory.
    pub fn open_from_config(config: &DaqConfig) -> AppResult<Self> {
        let artifacts = &config.artifacts;
        let mut pipeline = Self::open(&artifacts.drop_dir, config.layout())?
            .with_mode(config.acquisition.mode)
            .with_gain(config.session.gain)?
            .with_unlock_poll(Duration::from_millis(artifacts.unlock_poll_ms))
            .with_timeout(artifacts.wait_timeout_ms.map(Duration::from_millis));
        pipeline.quarantine_dir = artifacts.quarantine_dir.clone();
        Ok(pipeline)
    }

    /// Decode artifacts as peaks or spectra.
    pub fn with_mode(mut self, mode: AcquisitionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Gain index used for spectrum amplitude conversion.
    pub fn with_gain(mut self, gain: usize) -> AppResult<Self> {
        if gain >= GAIN_CALIBRATION.len() {
            return Err(DaqError::Configuration(format!(
                "Invalid gain {}. Must be 0-{}",
                gain,
                GAIN_CALIBRATION.len() - 1
            )));
        }
        self.gain = gain;
        Ok(self)
    }

    /// Move unreadable artifacts into `dir` instead of leaving them in the drop directory.
    pub fn with_quarantine_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.quarantine_dir = Some(dir.into());
        self
    }

    /// Bound each wait for an artifact.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.watcher = self.watcher.with_timeout(timeout);
        self
    }

    /// Interval between exclusive-open attempts.
    pub fn with_unlock_poll(mut self, interval: Duration) -> Self {
        self.watcher = self.watcher.with_unlock_poll(interval);
        self
    }

    /// Abort pending waits when `cancel` fires.
    pub fn with_cancel(mut self, cancel: StopSignal) -> Self {
        self.watcher = self.watcher.with_cancel(cancel);
        self
    }

    /// Directory being consumed.
    pub fn drop_dir(&self) -> &Path {
        self.watcher.dir()
    }

    /// Wait for the next artifact and ingest it.
    pub async fn ingest_next(&mut self) -> AppResult<IngestOutcome> {
        let path = self.watcher.await_artifact().await?;
        self.ingest_file(&path)
    }

    /// Ingest an artifact that is already known to be complete.
    pub fn ingest_file(&mut self, path: &Path) -> AppResult<IngestOutcome> {
        match validate(path, &self.layout) {
            Validation::Valid => {}
            Validation::Rejected(reason) => {
                warn!(path = %path.display(), reason = %reason, "Invalid artifact");
                if discard(path) {
                    info!(path = %path.display(), "Deleted invalid artifact");
                }
                return Ok(IngestOutcome::Rejected {
                    path: path.to_path_buf(),
                    reason,
                });
            }
            Validation::Unreadable(reason) => {
                self.retain(path);
                return Err(DaqError::Parse {
                    path: path.to_path_buf(),
                    reason,
                });
            }
        }

        let outcome = match self.decode(path) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.retain(path);
                return Err(err);
            }
        };

        if discard(path) {
            info!(path = %path.display(), "Processed and deleted artifact");
        }
        Ok(outcome)
    }

    fn decode(&self, path: &Path) -> AppResult<IngestOutcome> {
        let no_data = || {
            warn!(path = %path.display(), "Artifact has no data");
            IngestOutcome::NoData {
                path: path.to_path_buf(),
            }
        };

        match self.mode {
            AcquisitionMode::Peaks => match parse_peaks(path, &self.layout)? {
                ParseOutcome::NoData => Ok(no_data()),
                ParseOutcome::Blocks(blocks) => {
                    let mut reading = aggregate(&blocks, self.layout.channels);
                    reading.source = Some(path.to_path_buf());
                    debug!(blocks = reading.blocks, channels = ?reading.channels, "Aggregated reading");
                    Ok(IngestOutcome::Reading(reading))
                }
            },
            AcquisitionMode::Spectrum => match parse_spectrum(path, &self.layout)? {
                ParseOutcome::NoData => Ok(no_data()),
                ParseOutcome::Blocks(blocks) => {
                    let frames = blocks
                        .iter()
                        .map(|block| SpectrumFrame::from_block(block, self.gain))
                        .collect::<AppResult<Vec<_>>>()?;
                    Ok(IngestOutcome::Spectrum {
                        source: path.to_path_buf(),
                        frames,
                    })
                }
            },
        }
    }

    /// Keep a bad artifact for inspection, in quarantine when configured. An artifact
    /// that stays in the drop directory is skipped by later waits.
    fn retain(&mut self, path: &Path) {
        if !self.quarantine(path) {
            self.watcher.skip(path);
        }
    }

    fn quarantine(&self, path: &Path) -> bool {
        let Some(quarantine) = &self.quarantine_dir else {
            warn!(path = %path.display(), "Leaving unreadable artifact in place");
            return false;
        };
        let Some(name) = path.file_name() else {
            return false;
        };

        let target = quarantine.join(name);
        match fs::create_dir_all(quarantine).and_then(|()| fs::rename(path, &target)) {
            Ok(()) => {
                warn!(
                    path = %path.display(),
                    quarantine = %target.display(),
                    "Moved unreadable artifact to quarantine"
                );
                true
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Failed to quarantine unreadable artifact, leaving it in place"
                );
                false
            }
        }
    }
}

#[async_trait]
impl WindowCallback for IngestionPipeline {
    type Output = IngestOutcome;

    async fn on_window_complete(&mut self, cycle: &AcquisitionCycle) -> AppResult<IngestOutcome> {
        debug!(iteration = cycle.iteration, "Ingesting artifact for window");
        self.ingest_next().await
    }
}

/// Delete a consumed artifact. Returns `false` (and logs) when it could not be removed.
fn discard(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to delete artifact");
            false
        }
    }
}

/// Remove every file in `dir`. Failures are logged, not fatal.
fn clear_directory(dir: &Path) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "Tried to clear drop directory but got an error");
            return;
        }
    };

    let mut cleared = 0usize;
    for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
        if !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => cleared += 1,
            Err(err) => warn!(path = %path.display(), error = %err, "Failed to remove stale artifact"),
        }
    }
    if cleared > 0 {
        info!(dir = %dir.display(), cleared, "Cleared drop directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const HEADER: &str = "Timestamp,Channel,LaserTemperature,,Data\n";

    fn block(ts: &str, peaks: [&str; 4]) -> String {
        peaks
            .iter()
            .enumerate()
            .map(|(idx, tokens)| format!("{ts},{},25,3{tokens}\n", idx + 1))
            .collect()
    }

    fn pipeline(dir: &Path) -> IngestionPipeline {
        IngestionPipeline::new(dir, ArtifactLayout::default())
            .unwrap()
            .with_timeout(Some(Duration::from_secs(5)))
    }

    #[test]
    fn test_new_creates_and_clears_drop_dir() {
        let root = tempfile::tempdir().unwrap();
        let drop_dir = root.path().join("csvs");
        fs::create_dir_all(drop_dir.join("nested")).unwrap();
        fs::write(drop_dir.join("stale.csv"), "x").unwrap();

        let pipeline = pipeline(&drop_dir);
        assert_eq!(pipeline.drop_dir(), drop_dir.as_path());
        assert!(!drop_dir.join("stale.csv").exists());
        assert!(drop_dir.join("nested").is_dir());
    }

    #[test]
    fn test_open_keeps_existing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("peaks_000000.csv"), "x").unwrap();

        IngestionPipeline::open(dir.path(), ArtifactLayout::default()).unwrap();
        assert!(dir.path().join("peaks_000000.csv").exists());
    }

    #[test]
    fn test_from_config_applies_sections() {
        let root = tempfile::tempdir().unwrap();
        let mut config = DaqConfig::default();
        config.artifacts.drop_dir = root.path().join("drop");
        config.artifacts.quarantine_dir = Some(root.path().join("quarantine"));
        config.acquisition.mode = AcquisitionMode::Spectrum;
        config.session.gain = 3;

        let pipeline = IngestionPipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.drop_dir(), root.path().join("drop").as_path());
        assert_eq!(pipeline.mode, AcquisitionMode::Spectrum);
        assert_eq!(pipeline.gain, 3);
        assert_eq!(pipeline.quarantine_dir, Some(root.path().join("quarantine")));
    }

    #[tokio::test]
    async fn test_reading_from_valid_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path());
        let path = dir.path().join("peaks_000000.csv");
        let content = format!(
            "{HEADER}{}{}",
            block("t0", [",{1534,9}", ",{1541,3}", "", ",{1529,75}"]),
            block("t1", [",{1535,1}", ",{0,0}", "", ",{1529,85}"]),
        );
        fs::write(&path, content).unwrap();

        let outcome = pipeline.ingest_next().await.unwrap();
        let reading = outcome.reading().unwrap();
        assert_eq!(reading.source.as_deref(), Some(path.as_path()));
        assert_eq!(reading.blocks, 2);
        assert_eq!(reading.channels[0], vec![Some(1535.0)]);
        assert_eq!(reading.channels[1], vec![Some(1541.3)]);
        assert!(reading.channels[2].is_empty());
        assert_eq!(reading.channels[3], vec![Some(1529.8)]);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_short_artifact_rejected_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path());
        let path = dir.path().join("peaks_000000.csv");
        fs::write(&path, format!("{HEADER}t,1,25,3,{{1534,9}}\n")).unwrap();

        let outcome = pipeline.ingest_next().await.unwrap();
        match outcome {
            IngestOutcome::Rejected { path: rejected, reason } => {
                assert_eq!(rejected, path);
                assert!(reason.contains("Insufficient rows"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_header_and_three_rows_rejected_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path());
        let path = dir.path().join("peaks_000000.csv");
        let rows: String = block("t0", [",{1534,9}"; 4])
            .lines()
            .take(3)
            .map(|row| format!("{row}\n"))
            .collect();
        fs::write(&path, format!("{HEADER}{rows}")).unwrap();

        match pipeline.ingest_file(&path).unwrap() {
            IngestOutcome::Rejected { reason, .. } => {
                assert_eq!(reason, "Insufficient rows (need at least 5, found 4)");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_blank_rows_yield_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path());
        let path = dir.path().join("peaks_000000.csv");
        fs::write(&path, "\n\n\n\n\n").unwrap();

        let outcome = pipeline.ingest_file(&path).unwrap();
        assert_eq!(outcome, IngestOutcome::NoData { path: path.clone() });
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_artifact_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path());
        let path = dir.path().join("peaks_000000.csv");
        let mut bytes = HEADER.as_bytes().to_vec();
        for _ in 0..4 {
            bytes.extend_from_slice(b"t,1,25,3,{\xff,9}\n");
        }
        fs::write(&path, bytes).unwrap();

        let err = pipeline.ingest_file(&path).unwrap_err();
        assert!(matches!(err, DaqError::Parse { .. }));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_artifact_does_not_block_later_ones() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path());
        let corrupt = dir.path().join("peaks_000000.csv");
        let valid = dir.path().join("peaks_000001.csv");
        let mut bytes = HEADER.as_bytes().to_vec();
        for _ in 0..4 {
            bytes.extend_from_slice(b"t,1,25,3,{\xff,9}\n");
        }
        fs::write(&corrupt, bytes).unwrap();
        fs::write(&valid, format!("{HEADER}{}", block("t0", [",{1534,9}"; 4]))).unwrap();

        let err = pipeline.ingest_next().await.unwrap_err();
        assert!(matches!(err, DaqError::Parse { .. }));

        let outcome = pipeline.ingest_next().await.unwrap();
        assert_eq!(outcome.reading().unwrap().source.as_deref(), Some(valid.as_path()));
        assert!(corrupt.exists());
        assert!(!valid.exists());

        let mut pipeline = pipeline.with_timeout(Some(Duration::from_millis(200)));
        let result = pipeline.ingest_next().await;
        assert!(matches!(result, Err(DaqError::WaitTimedOut(_))));
    }

    #[test]
    #[traced_test]
    fn test_failed_delete_is_logged_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let undeletable = dir.path().join("peaks_000000.csv");
        fs::create_dir(&undeletable).unwrap();

        assert!(!discard(&undeletable));
        assert!(logs_contain("Failed to delete artifact"));
        assert!(discard(&dir.path().join("already_gone.csv")));
    }

    #[test]
    fn test_corrupt_artifact_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let quarantine = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path()).with_quarantine_dir(quarantine.path());
        let path = dir.path().join("peaks_000000.csv");
        let mut bytes = HEADER.as_bytes().to_vec();
        for _ in 0..4 {
            bytes.extend_from_slice(b"t,1,25,3,{\xff,9}\n");
        }
        fs::write(&path, bytes).unwrap();

        assert!(pipeline.ingest_file(&path).is_err());
        assert!(!path.exists());
        assert!(quarantine.path().join("peaks_000000.csv").exists());
    }

    #[test]
    fn test_spectrum_mode_produces_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path())
            .with_mode(AcquisitionMode::Spectrum)
            .with_gain(1)
            .unwrap();
        let path = dir.path().join("spectrum_000000.csv");
        let content = format!("{HEADER}{}", block("t0", [",{1000,0}"; 4]));
        fs::write(&path, content).unwrap();

        match pipeline.ingest_file(&path).unwrap() {
            IngestOutcome::Spectrum { source, frames } => {
                assert_eq!(source, path);
                assert_eq!(frames.len(), 1);
                assert_eq!(frames[0].channels.len(), 4);
                assert_eq!(frames[0].channels[0].len(), 1);
            }
            other => panic!("expected spectrum, got {other:?}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_invalid_gain_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = pipeline(dir.path()).with_gain(6);
        assert!(matches!(result, Err(DaqError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_wait_timeout_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path()).with_timeout(Some(Duration::from_millis(100)));
        let result = pipeline.ingest_next().await;
        assert!(matches!(result, Err(DaqError::WaitTimedOut(_))));
    }
}
