//! Periodic acquisition scheduler.
//!
//! The scheduler owns the timing loop: every `period` it arms the session for one
//! `acq_window`, disarms it, then hands control to a [`WindowCallback`] (normally the
//! ingestion pipeline) before waiting for the next slot.
//!
//! ```text
//! t0        t0+period   t0+2·period
//! |--window--|cb|        |--window--|cb|        |--window--|cb| ...
//! ```
//!
//! # Timing
//!
//! Target times are anchored to `t0` (`target = t0 + i·period`), so a slow cycle does not
//! shift the whole schedule. If an iteration is already late when its slot comes up, the
//! lag is logged and the cycle starts immediately; iterations are never skipped to catch
//! up. Drift compensation is best-effort, not hard real-time.
//!
//! # Failure isolation
//!
//! Session and callback failures are captured as [`CycleOutcome::Failed`] in the
//! [`RunReport`] and the loop moves on. Only an invalid [`Schedule`] aborts a run, and it
//! does so before touching the session.
//!
//! # Stopping
//!
//! [`AcquisitionScheduler::stop`] (or triggering the shared [`StopSignal`]) is observed at
//! the next iteration boundary. An armed window always runs to completion.

use crate::acquisition::AcquisitionMode;
use crate::error::{AppResult, DaqError};
use crate::session::HardwareSession;
use crate::signal::StopSignal;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{info, warn};

/// Validated timing parameters for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Total run duration, measured from the first iteration's target
    pub duration: Duration,
    /// Interval between window starts
    pub period: Duration,
    /// Length of each armed window
    pub acq_window: Duration,
}

impl Schedule {
    /// Periodic schedule. Fails with [`DaqError::Configuration`] if `period < acq_window`
    /// or the window is zero.
    pub fn periodic(duration: Duration, period: Duration, acq_window: Duration) -> AppResult<Self> {
        if acq_window.is_zero() {
            return Err(DaqError::Configuration(
                "acquisition window must be > 0".to_string(),
            ));
        }
        if period < acq_window {
            return Err(DaqError::Configuration(format!(
                "period ({}ms) must be >= acquisition window ({}ms)",
                period.as_millis(),
                acq_window.as_millis()
            )));
        }
        Ok(Self {
            duration,
            period,
            acq_window,
        })
    }

    /// Back-to-back windows with no idle gap.
    pub fn continuous(duration: Duration, acq_window: Duration) -> AppResult<Self> {
        Self::periodic(duration, acq_window, acq_window)
    }

    /// Millisecond convenience constructor for [`periodic`](Self::periodic).
    pub fn from_millis(duration_ms: u64, period_ms: u64, acq_window_ms: u64) -> AppResult<Self> {
        Self::periodic(
            Duration::from_millis(duration_ms),
            Duration::from_millis(period_ms),
            Duration::from_millis(acq_window_ms),
        )
    }
}

/// Timing facts for one loop pass. Offsets are relative to the run start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionCycle {
    /// Zero-based iteration index
    pub iteration: usize,
    /// When the iteration was scheduled to start
    pub target_offset: Duration,
    /// When it actually started
    pub start_offset: Duration,
    /// `start_offset - target_offset`
    pub lag: Duration,
}

/// Result of one iteration.
#[derive(Debug)]
pub enum CycleOutcome<T> {
    /// Window and callback both succeeded.
    Completed {
        /// Callback output
        output: T,
        /// Wall-clock cost of arm + window + disarm + callback
        elapsed: Duration,
    },
    /// Session or callback failed; the loop continued.
    Failed(DaqError),
}

/// One executed iteration and how it ended.
#[derive(Debug)]
pub struct CycleRecord<T> {
    /// Timing of the iteration
    pub cycle: AcquisitionCycle,
    /// Outcome of the iteration
    pub outcome: CycleOutcome<T>,
}

/// Everything a run produced, including the per-iteration error log.
#[derive(Debug)]
pub struct RunReport<T> {
    /// Executed iterations, in order
    pub cycles: Vec<CycleRecord<T>>,
    /// Time from run start until the loop exited
    pub total_elapsed: Duration,
    /// Whether the loop ended because a stop was requested
    pub stopped: bool,
}

impl<T> RunReport<T> {
    /// Number of executed iterations.
    pub fn iterations(&self) -> usize {
        self.cycles.len()
    }

    /// Outputs of the successful iterations.
    pub fn outputs(&self) -> impl Iterator<Item = &T> {
        self.cycles.iter().filter_map(|record| match &record.outcome {
            CycleOutcome::Completed { output, .. } => Some(output),
            CycleOutcome::Failed(_) => None,
        })
    }

    /// Failed iterations with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &DaqError)> {
        self.cycles.iter().filter_map(|record| match &record.outcome {
            CycleOutcome::Failed(err) => Some((record.cycle.iteration, err)),
            CycleOutcome::Completed { .. } => None,
        })
    }
}

/// Work run synchronously after each acquisition window.
///
/// A slow callback delays the next iteration; it is never preempted.
#[async_trait]
pub trait WindowCallback: Send {
    /// Value produced per successful window
    type Output: Send;

    /// Called after the session has been disarmed.
    async fn on_window_complete(&mut self, cycle: &AcquisitionCycle) -> AppResult<Self::Output>;
}

/// Adapts a plain closure into a [`WindowCallback`].
pub struct FnCallback<F>(pub F);

#[async_trait]
impl<F, T> WindowCallback for FnCallback<F>
where
    F: FnMut(&AcquisitionCycle) -> AppResult<T> + Send,
    T: Send,
{
    type Output = T;

    async fn on_window_complete(&mut self, cycle: &AcquisitionCycle) -> AppResult<T> {
        (self.0)(cycle)
    }
}

/// Drives a [`HardwareSession`] through timed acquisition windows.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionScheduler {
    mode: AcquisitionMode,
    stop: StopSignal,
}

impl AcquisitionScheduler {
    /// Scheduler arming the session for `mode` each window.
    pub fn new(mode: AcquisitionMode) -> Self {
        Self {
            mode,
            stop: StopSignal::new(),
        }
    }

    /// Scheduler observing an externally owned stop signal.
    pub fn with_stop_signal(mode: AcquisitionMode, stop: StopSignal) -> Self {
        Self { mode, stop }
    }

    /// Handle that can stop the loop from another task or thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Request the loop to end at the next iteration boundary.
    pub fn stop(&self) {
        self.stop.trigger();
        info!("Collection stop requested");
    }

    /// Periodic collection.
    ///
    /// # Errors
    ///
    /// Only [`DaqError::Configuration`], raised before any session call when
    /// `period_ms < acq_window_ms`. Per-iteration failures are in the report.
    pub async fn run<S, C>(
        &self,
        session: &mut S,
        duration_ms: u64,
        period_ms: u64,
        acq_window_ms: u64,
        callback: &mut C,
    ) -> AppResult<RunReport<C::Output>>
    where
        S: HardwareSession + ?Sized,
        C: WindowCallback + ?Sized,
    {
        let schedule = Schedule::from_millis(duration_ms, period_ms, acq_window_ms)?;
        Ok(self.run_schedule(session, &schedule, callback).await)
    }

    /// Back-to-back collection: `period == acq_window`.
    pub async fn continuous<S, C>(
        &self,
        session: &mut S,
        duration_ms: u64,
        acq_window_ms: u64,
        callback: &mut C,
    ) -> AppResult<RunReport<C::Output>>
    where
        S: HardwareSession + ?Sized,
        C: WindowCallback + ?Sized,
    {
        self.run(session, duration_ms, acq_window_ms, acq_window_ms, callback)
            .await
    }

    /// Run an already validated schedule.
    pub async fn run_schedule<S, C>(
        &self,
        session: &mut S,
        schedule: &Schedule,
        callback: &mut C,
    ) -> RunReport<C::Output>
    where
        S: HardwareSession + ?Sized,
        C: WindowCallback + ?Sized,
    {
        info!(
            duration_ms = schedule.duration.as_millis() as u64,
            period_ms = schedule.period.as_millis() as u64,
            acq_window_ms = schedule.acq_window.as_millis() as u64,
            mode = %self.mode,
            "Starting periodic collection"
        );

        let t0 = Instant::now();
        let end = t0 + schedule.duration;
        let mut target = t0;
        let mut cycles = Vec::new();
        let mut armed = false;
        let mut stopped = false;

        for iteration in 0usize.. {
            if self.stop.is_triggered() {
                info!(iteration, "Stop request observed");
                stopped = true;
                break;
            }

            let now = Instant::now();
            if now >= end || target >= end {
                info!("Collection complete after {} iterations", iteration);
                break;
            }

            if now > target {
                let lag_ms = (now - target).as_secs_f64() * 1000.0;
                warn!(iteration, lag_ms, "Iteration {} is {:.1}ms behind schedule", iteration, lag_ms);
            } else {
                sleep_until(target).await;
            }

            let started = Instant::now();
            let cycle = AcquisitionCycle {
                iteration,
                target_offset: target - t0,
                start_offset: started - t0,
                lag: started.saturating_duration_since(target),
            };

            let outcome = self
                .run_cycle(session, schedule.acq_window, callback, &cycle, &mut armed)
                .await;
            match &outcome {
                CycleOutcome::Completed { elapsed, .. } => info!(
                    iteration,
                    "Iteration {}: took {:.1}ms",
                    iteration,
                    elapsed.as_secs_f64() * 1000.0
                ),
                CycleOutcome::Failed(err) => {
                    warn!(iteration, error = %err, "Error in iteration {}", iteration)
                }
            }
            cycles.push(CycleRecord { cycle, outcome });

            target += schedule.period;
        }

        if armed {
            match session.stop_collection().await {
                Ok(()) => info!("Session disarmed on loop exit"),
                Err(err) => warn!(error = %err, "Failed to disarm session on loop exit"),
            }
        }

        let total_elapsed = t0.elapsed();
        info!(
            "Total time: {:.3}s (target: {:.3}s)",
            total_elapsed.as_secs_f64(),
            schedule.duration.as_secs_f64()
        );

        RunReport {
            cycles,
            total_elapsed,
            stopped,
        }
    }

    async fn run_cycle<S, C>(
        &self,
        session: &mut S,
        acq_window: Duration,
        callback: &mut C,
        cycle: &AcquisitionCycle,
        armed: &mut bool,
    ) -> CycleOutcome<C::Output>
    where
        S: HardwareSession + ?Sized,
        C: WindowCallback + ?Sized,
    {
        let started = Instant::now();

        let arm = match self.mode {
            AcquisitionMode::Peaks => session.start_peaks_collection().await,
            AcquisitionMode::Spectrum => session.start_spectrum_collection().await,
        };
        if let Err(err) = arm {
            return CycleOutcome::Failed(err);
        }
        *armed = true;

        sleep(acq_window).await;

        if let Err(err) = session.stop_collection().await {
            return CycleOutcome::Failed(err);
        }
        *armed = false;

        match callback.on_window_complete(cycle).await {
            Ok(output) => CycleOutcome::Completed {
                output,
                elapsed: started.elapsed(),
            },
            Err(err) => CycleOutcome::Failed(err),
        }
    }
}
