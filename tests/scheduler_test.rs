//! Scheduler timing through the public API, with tokio's clock paused.

use interrogator_daq::acquisition::{
    AcquisitionCycle, AcquisitionMode, AcquisitionScheduler, CycleOutcome, FnCallback,
};
use interrogator_daq::error::{AppResult, DaqError};
use interrogator_daq::session::{with_session, HardwareSession, MockSession, RetryPolicy, SessionSettings};
use std::path::PathBuf;
use std::time::Duration;

fn settings() -> SessionSettings {
    SessionSettings {
        output_divider: 10,
        max_samples_per_file: 100,
        threshold: -20.0,
        gain: 1,
        bandwidth: 60.0,
        output_path: PathBuf::from("unused"),
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_delay: Duration::from_millis(10),
    }
}

fn start_offsets() -> FnCallback<impl FnMut(&AcquisitionCycle) -> AppResult<Duration> + Send> {
    FnCallback(|cycle: &AcquisitionCycle| Ok::<Duration, DaqError>(cycle.start_offset))
}

#[tokio::test(start_paused = true)]
async fn test_periodic_run_inside_session() {
    let mut session = MockSession::new().with_failing_connects(2);
    let scheduler = AcquisitionScheduler::new(AcquisitionMode::Peaks);
    let mut callback = start_offsets();

    let report = with_session(&mut session, &settings(), &policy(), move |s| {
        Box::pin(async move { scheduler.run(s, 2500, 1000, 500, &mut callback).await })
    })
    .await
    .unwrap();

    let offsets: Vec<Duration> = report.outputs().copied().collect();
    assert_eq!(
        offsets,
        vec![
            Duration::ZERO,
            Duration::from_millis(1000),
            Duration::from_millis(2000)
        ]
    );
    assert!(!report.stopped);
    assert_eq!(session.connect_attempts(), 3);
    assert_eq!(session.start_count(), 3);
    assert_eq!(session.stop_count(), 3);
    assert_eq!(session.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_schedule_touches_no_hardware() {
    let mut session = MockSession::new();
    let scheduler = AcquisitionScheduler::new(AcquisitionMode::Peaks);
    let mut callback = start_offsets();

    let result = with_session(&mut session, &settings(), &policy(), move |s| {
        Box::pin(async move { scheduler.run(s, 2000, 400, 500, &mut callback).await })
    })
    .await;

    assert!(matches!(result, Err(DaqError::Configuration(_))));
    assert_eq!(session.start_count(), 0);
    assert_eq!(session.stop_count(), 0);
    assert_eq!(session.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_isolated_per_iteration() {
    let mut session = MockSession::new().with_failing_starts([1]);
    session.connect().await.unwrap();
    session.configure(&settings()).await.unwrap();

    let scheduler = AcquisitionScheduler::new(AcquisitionMode::Peaks);
    let mut callback = start_offsets();
    let report = scheduler
        .run(&mut session, 3000, 1000, 200, &mut callback)
        .await
        .unwrap();

    assert_eq!(report.iterations(), 3);
    assert!(matches!(
        report.cycles[1].outcome,
        CycleOutcome::Failed(DaqError::Hardware(_))
    ));
    let failed: Vec<usize> = report.failures().map(|(iteration, _)| iteration).collect();
    assert_eq!(failed, vec![1]);
    assert_eq!(report.outputs().count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_another_task() {
    let mut session = MockSession::new();
    session.connect().await.unwrap();
    session.configure(&settings()).await.unwrap();

    let scheduler = AcquisitionScheduler::new(AcquisitionMode::Peaks);
    let stop = scheduler.stop_signal();
    tokio::spawn(async move {
        // Mid-window of the third iteration.
        tokio::time::sleep(Duration::from_millis(2300)).await;
        stop.trigger();
    });

    let mut callback = start_offsets();
    let report = scheduler
        .run(&mut session, 10_000, 1000, 500, &mut callback)
        .await
        .unwrap();

    assert!(report.stopped);
    assert_eq!(report.iterations(), 3);
    assert!(!session.is_armed());
}
