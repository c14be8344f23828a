//! Bounded retry around transport calls.
//!
//! Only [`ControlPlaneError::Transport`] is retried; classification results
//! (`NotFound`, `Conflict`, `Api`) are terminal decisions and pass through on
//! the first attempt.

use crate::error::{ControlPlaneError, Result};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the initial attempt (1 => no retries).
    pub maximum_attempts: u32,
    /// Initial backoff interval in milliseconds (before the first retry).
    pub initial_interval_ms: u64,
    /// Backoff multiplier (typically >= 1.0).
    pub backoff_coefficient: f64,
    /// Optional maximum interval between retries in milliseconds.
    pub maximum_interval_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: 3,
            initial_interval_ms: 250,
            backoff_coefficient: 2.0,
            maximum_interval_ms: Some(5_000),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            maximum_attempts: 1,
            initial_interval_ms: 0,
            backoff_coefficient: 1.0,
            maximum_interval_ms: None,
        }
    }

    fn interval(&self, attempt: u32) -> Duration {
        let base = self.initial_interval_ms as f64 * self.backoff_coefficient.powi(attempt as i32);
        let capped = match self.maximum_interval_ms {
            Some(max) => base.min(max as f64),
            None => base,
        };
        Duration::from_millis(capped as u64)
    }

    /// Runs `f` until it succeeds, fails terminally, or the attempt budget is
    /// exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.maximum_attempts.max(1);
        let mut last: Option<ControlPlaneError> = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.interval(attempt - 1)).await;
            }
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        error = %e,
                        "transient control-plane failure, retrying"
                    );
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        // Unreachable unless maximum_attempts was 0; report the last failure.
        Err(last.unwrap_or_else(|| {
            ControlPlaneError::Transport(format!("{operation}: no attempts executed"))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> RetryPolicy {
        RetryPolicy {
            maximum_attempts: 3,
            initial_interval_ms: 1,
            backoff_coefficient: 1.0,
            maximum_interval_ms: None,
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let out = quick()
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ControlPlaneError::Transport("connection refused".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .expect("third attempt succeeds");
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempt_budget() {
        let calls = AtomicU32::new(0);
        let err = quick()
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ControlPlaneError::Transport("timeout".into())) }
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn conflict_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = quick()
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(ControlPlaneError::Conflict {
                        resource: "domain '*'".into(),
                    })
                }
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = quick()
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(ControlPlaneError::NotFound {
                        resource: "route 'weather'".into(),
                    })
                }
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
