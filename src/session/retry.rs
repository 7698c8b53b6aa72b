//! Bounded connection retry.
//!
//! Interrogators frequently refuse the first few connection attempts after power-up
//! or after a previous client disconnected. [`connect_with_retry`] retries on a fixed
//! backoff and converts exhaustion into [`DaqError::Connection`].

use crate::error::{AppResult, DaqError};
use crate::session::HardwareSession;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Defines a policy for retrying an operation.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// The maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// The delay between attempts.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_delay: Duration::from_secs(3),
        }
    }
}

/// Connects `session`, retrying according to `policy`.
///
/// Usage errors are not retried: they indicate a programming error rather than a
/// transient instrument condition.
pub async fn connect_with_retry<S>(session: &mut S, policy: &RetryPolicy) -> AppResult<()>
where
    S: HardwareSession + ?Sized,
{
    info!("Connecting to interrogator...");
    for attempt in 1..=policy.max_attempts {
        match session.connect().await {
            Ok(()) => {
                info!(attempt, "Interrogator ready");
                return Ok(());
            }
            Err(err @ DaqError::SessionUsage(_)) => return Err(err),
            Err(err) => debug!(attempt, error = %err, "Connection attempt failed"),
        }

        if attempt < policy.max_attempts {
            warn!(
                "Failed to connect to interrogator. Retrying in {:?}...",
                policy.backoff_delay
            );
            sleep(policy.backoff_delay).await;
        }
    }

    Err(DaqError::Connection(format!(
        "Failed to connect after {} attempts",
        policy.max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MockSession;

    #[tokio::test(start_paused = true)]
    async fn test_retry_logic_succeeds() {
        let mut session = MockSession::new().with_failing_connects(1);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(10),
        };

        let result = connect_with_retry(&mut session, &policy).await;
        assert!(result.is_ok());
        assert_eq!(session.connect_attempts(), 2);
        assert!(session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_logic_fails() {
        let mut session = MockSession::new().with_failing_connects(4);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(10),
        };

        let result = connect_with_retry(&mut session, &policy).await;
        assert!(matches!(result, Err(DaqError::Connection(_))));
        assert_eq!(session.connect_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_only_between_attempts() {
        let mut session = MockSession::new().with_failing_connects(10);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_delay: Duration::from_millis(100),
        };

        let started = tokio::time::Instant::now();
        let _ = connect_with_retry(&mut session, &policy).await;
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }
}
