//! Instrument session contract.
//!
//! The acquisition core never talks to the interrogator directly. It drives a
//! [`HardwareSession`], which owns the vendor handshake, register configuration and
//! export toggling. Implementations must reject `start_*`/`stop_collection` with
//! [`DaqError::SessionUsage`] until both `connect` and `configure` have succeeded.
//!
//! # Lifecycle
//!
//! ```text
//! connect() → configure(settings) → { start_*() → stop_collection() }* → disconnect()
//! ```
//!
//! [`with_session`] scopes that lifecycle: the session is always disconnected on the
//! way out, whether the body succeeds or fails.

pub mod mock;
pub mod retry;

use crate::error::{AppResult, DaqError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

pub use mock::MockSession;
pub use retry::{connect_with_retry, RetryPolicy};

/// Parameters pushed to the instrument by [`HardwareSession::configure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Instrument output divider
    pub output_divider: u32,
    /// Maximum samples per artifact file
    pub max_samples_per_file: u32,
    /// Peak detection threshold in dB
    pub threshold: f64,
    /// Gain setting
    pub gain: usize,
    /// Detection bandwidth
    pub bandwidth: f64,
    /// Directory the instrument writes artifacts into
    pub output_path: PathBuf,
}

/// Connection to an interrogator that can be armed for timed acquisitions.
#[async_trait]
pub trait HardwareSession: Send {
    /// Establish the connection. Implementations may fail transiently;
    /// see [`connect_with_retry`].
    async fn connect(&mut self) -> AppResult<()>;

    /// Push acquisition parameters. Requires a prior `connect`.
    async fn configure(&mut self, settings: &SessionSettings) -> AppResult<()>;

    /// Arm peak export.
    async fn start_peaks_collection(&mut self) -> AppResult<()>;

    /// Arm spectrum export.
    async fn start_spectrum_collection(&mut self) -> AppResult<()>;

    /// Disarm whichever export is active.
    async fn stop_collection(&mut self) -> AppResult<()>;

    /// Close the connection. Safe to call when not connected.
    async fn disconnect(&mut self) -> AppResult<()>;
}

/// Connect (with retry), configure, run `body`, then disconnect on every exit path.
///
/// The body's error takes precedence over a disconnect error; a failed disconnect
/// after a successful body is returned as the result.
///
/// ```rust,ignore
/// let report = with_session(&mut session, &settings, &policy, |s| {
///     Box::pin(async move { scheduler.run_schedule(s, &schedule, &mut pipeline).await })
/// })
/// .await?;
/// ```
pub async fn with_session<S, T, F>(
    session: &mut S,
    settings: &SessionSettings,
    policy: &RetryPolicy,
    body: F,
) -> AppResult<T>
where
    S: HardwareSession + ?Sized,
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, AppResult<T>>,
{
    let result = match connect_and_configure(session, settings, policy).await {
        Ok(()) => body(session).await,
        Err(err) => Err(err),
    };

    match session.disconnect().await {
        Ok(()) => info!("Session released"),
        Err(err) => {
            if result.is_ok() {
                return Err(err);
            }
            warn!(error = %err, "Disconnect failed while unwinding session");
        }
    }

    result
}

async fn connect_and_configure<S>(
    session: &mut S,
    settings: &SessionSettings,
    policy: &RetryPolicy,
) -> AppResult<()>
where
    S: HardwareSession + ?Sized,
{
    connect_with_retry(session, policy).await?;
    session.configure(settings).await.map_err(|err| match err {
        DaqError::SessionUsage(_) | DaqError::Configuration(_) => err,
        other => DaqError::Hardware(format!("configure failed: {other}")),
    })?;
    info!(
        output_path = %settings.output_path.display(),
        divider = settings.output_divider,
        max_samples = settings.max_samples_per_file,
        "Configured interrogator parameters"
    );
    Ok(())
}
