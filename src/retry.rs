use std::{future::Future, time::Duration};

use log::debug;

use crate::error::SprintError;

/// Bounded retry with a fixed delay between attempts. First success returns
/// immediately; exhaustion wraps the last failure.
pub struct Retry {
    attempts: u32,
    delay: Duration,
}

impl Retry {
    pub fn timed(attempts: u32, delay_ms: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            delay: Duration::from_millis(delay_ms),
        }
    }

    pub async fn on<T, F, Fut>(&self, mut op: F) -> Result<T, SprintError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SprintError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.attempts => {
                    return Err(SprintError::RetryExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => debug!("attempt {attempt}/{} failed: {err}", self.attempts),
            }
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn flaky(calls: &AtomicU32, fail_first: u32) -> impl Future<Output = Result<u32, SprintError>> + '_ {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n <= fail_first {
                Err(SprintError::Protocol(format!("boom {n}")))
            } else {
                Ok(n)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_of_three_attempts() {
        let calls = AtomicU32::new(0);
        let result = Retry::timed(3, 500).on(|| flaky(&calls, 2)).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_failure_when_exhausted() {
        let calls = AtomicU32::new(0);
        let result = Retry::timed(2, 500).on(|| flaky(&calls, 2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            Err(SprintError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, SprintError::Protocol(ref msg) if msg == "boom 2"));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result = Retry::timed(3, 500).on(|| flaky(&calls, 0)).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
