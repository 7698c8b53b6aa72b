//! Drop-directory watcher.
//!
//! [`ArtifactWatcher::await_artifact`] returns the next finished artifact in the drop
//! directory:
//!
//! 1. A `notify` watch is registered on the directory.
//! 2. The directory is scanned; if matching files exist, the first by name is taken.
//! 3. Otherwise the call blocks until a matching file is created (or renamed into place).
//! 4. The candidate is polled for exclusive read/write access until the writer has
//!    released it.
//!
//! Registering the watch before scanning closes the gap in which a file created right
//! after the scan would go unnoticed.
//!
//! Paths handed to [`ArtifactWatcher::skip`] are never returned again. The pipeline uses
//! this for unreadable artifacts it leaves in place, so a later, valid artifact is not
//! shadowed by an earlier corrupt one.
//!
//! # Liveness
//!
//! By default both waits are unbounded: if the instrument never writes an artifact, or
//! never releases one, the call never returns. [`with_timeout`](ArtifactWatcher::with_timeout)
//! and [`with_cancel`](ArtifactWatcher::with_cancel) bound them.
//!
//! The exclusive-open check is best-effort. On Windows the open requests no sharing and
//! fails while the writer holds the file; elsewhere a writer that does not lock can still
//! race the reader, so writers should create artifacts under another name and rename.

use crate::error::{AppResult, DaqError};
use crate::ingest::layout::ArtifactLayout;
use crate::signal::StopSignal;
use notify::{event::ModifyKind, Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Default interval between exclusive-open attempts.
pub const DEFAULT_UNLOCK_POLL: Duration = Duration::from_millis(100);

/// Locates and waits for artifacts in one drop directory.
#[derive(Debug, Clone)]
pub struct ArtifactWatcher {
    dir: PathBuf,
    layout: ArtifactLayout,
    unlock_poll: Duration,
    timeout: Option<Duration>,
    cancel: StopSignal,
    skipped: HashSet<PathBuf>,
}

impl ArtifactWatcher {
    /// Watcher with unbounded waits and the default poll interval.
    pub fn new(dir: impl Into<PathBuf>, layout: ArtifactLayout) -> Self {
        Self {
            dir: dir.into(),
            layout,
            unlock_poll: DEFAULT_UNLOCK_POLL,
            timeout: None,
            cancel: StopSignal::new(),
            skipped: HashSet::new(),
        }
    }

    /// Interval between exclusive-open attempts.
    pub fn with_unlock_poll(mut self, interval: Duration) -> Self {
        self.unlock_poll = interval;
        self
    }

    /// Bound the whole wait (locate + unlock). `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort the wait when `cancel` is triggered.
    pub fn with_cancel(mut self, cancel: StopSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Never return `path` again, even while it stays in the directory.
    pub fn skip(&mut self, path: impl Into<PathBuf>) {
        self.skipped.insert(path.into());
    }

    /// Directory being watched.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Wait for the next finished artifact and return its path.
    ///
    /// # Errors
    ///
    /// - [`DaqError::WaitTimedOut`] when the configured timeout elapses
    /// - [`DaqError::Cancelled`] when the cancel signal fires
    /// - [`DaqError::Watch`] / [`DaqError::Io`] when the directory cannot be watched or read
    pub async fn await_artifact(&self) -> AppResult<PathBuf> {
        let wait = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, self.locate_unlocked()).await {
                    Ok(result) => result,
                    Err(_) => Err(DaqError::WaitTimedOut(limit)),
                },
                None => self.locate_unlocked().await,
            }
        };

        tokio::select! {
            result = wait => result,
            _ = self.cancel.triggered() => Err(DaqError::Cancelled),
        }
    }

    async fn locate_unlocked(&self) -> AppResult<PathBuf> {
        let path = self.locate().await?;
        self.wait_unlocked(&path).await?;
        info!(path = %path.display(), "Detected artifact");
        Ok(path)
    }

    async fn locate(&self) -> AppResult<PathBuf> {
        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(100);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Use blocking send since we're in the notify callback thread
            let _ = tx.blocking_send(res);
        })?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;

        if let Some(existing) = self.scan()? {
            info!(path = %existing.display(), "Found existing artifact");
            return Ok(existing);
        }

        info!(dir = %self.dir.display(), "Waiting for artifact...");
        while let Some(event_result) = rx.recv().await {
            match event_result {
                Ok(event) => {
                    if let Some(path) = self.candidate(&event) {
                        return Ok(path);
                    }
                }
                Err(e) => warn!("Drop directory watcher error: {}", e),
            }
        }

        Err(DaqError::Watch(notify::Error::generic(
            "notification channel closed",
        )))
    }

    /// First matching file in the directory, by name.
    fn scan(&self) -> AppResult<Option<PathBuf>> {
        let mut found: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| self.is_candidate(path))
            .collect();
        found.sort();
        Ok(found.into_iter().next())
    }

    fn candidate(&self, event: &Event) -> Option<PathBuf> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)) => event
                .paths
                .iter()
                .rev()
                .find(|path| self.is_candidate(path))
                .cloned(),
            _ => None,
        }
    }

    fn is_candidate(&self, path: &Path) -> bool {
        self.layout.matches(path) && !self.skipped.contains(path) && path.is_file()
    }

    async fn wait_unlocked(&self, path: &Path) -> AppResult<()> {
        let mut attempts = 0u64;
        loop {
            match open_exclusive(path) {
                Ok(()) => {
                    if attempts > 0 {
                        debug!(path = %path.display(), attempts, "Artifact released by writer");
                    }
                    return Ok(());
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(err.into()),
                Err(_) => {
                    attempts += 1;
                    sleep(self.unlock_poll).await;
                }
            }
        }
    }
}

/// Open `path` for read and write without sharing, then close it again.
fn open_exclusive(path: &Path) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.share_mode(0);
    }
    options.open(path).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn watcher(dir: &Path) -> ArtifactWatcher {
        ArtifactWatcher::new(dir, ArtifactLayout::default())
            .with_timeout(Some(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_existing_artifacts_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("peaks_000002.csv"), "x").unwrap();
        fs::write(dir.path().join("peaks_000001.csv"), "x").unwrap();
        fs::write(dir.path().join("aaa.txt"), "x").unwrap();

        let path = watcher(dir.path()).await_artifact().await.unwrap();
        assert_eq!(path, dir.path().join("peaks_000001.csv"));
    }

    #[tokio::test]
    async fn test_skipped_artifact_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("peaks_000000.csv"), "x").unwrap();
        fs::write(dir.path().join("peaks_000001.csv"), "x").unwrap();

        let mut watcher = watcher(dir.path());
        watcher.skip(dir.path().join("peaks_000000.csv"));
        let path = watcher.await_artifact().await.unwrap();
        assert_eq!(path, dir.path().join("peaks_000001.csv"));
    }

    #[tokio::test]
    async fn test_waits_for_new_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let drop_dir = dir.path().to_path_buf();
        let writer = tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            let staging = drop_dir.join(".peaks_000000.csv.part");
            fs::write(&staging, "header\n").unwrap();
            fs::rename(&staging, drop_dir.join("peaks_000000.csv")).unwrap();
        });

        let path = watcher(dir.path()).await_artifact().await.unwrap();
        assert_eq!(path, dir.path().join("peaks_000000.csv"));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_ignores_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let drop_dir = dir.path().to_path_buf();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            fs::write(drop_dir.join("notes.txt"), "x").unwrap();
        });

        let result = ArtifactWatcher::new(dir.path(), ArtifactLayout::default())
            .with_timeout(Some(Duration::from_millis(400)))
            .await_artifact()
            .await;
        assert!(matches!(result, Err(DaqError::WaitTimedOut(_))));
    }

    #[tokio::test]
    async fn test_cancel_aborts_wait() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = StopSignal::new();
        let remote = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            remote.trigger();
        });

        let result = ArtifactWatcher::new(dir.path(), ArtifactLayout::default())
            .with_cancel(cancel)
            .await_artifact()
            .await;
        assert!(matches!(result, Err(DaqError::Cancelled)));
    }

    #[tokio::test]
    async fn test_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = watcher(&dir.path().join("absent")).await_artifact().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_vanished_artifact_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = watcher(dir.path())
            .wait_unlocked(&dir.path().join("gone.csv"))
            .await;
        assert!(matches!(result, Err(DaqError::Io(_))));
    }
}
