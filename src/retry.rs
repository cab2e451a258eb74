use std::future::Future;
use std::time::Duration;

use log::warn;

use crate::error::{CidashError, Result};

/// Bounded exponential backoff shared by every upstream call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Runs `operation` until it succeeds, the predicate rejects the error,
    /// or attempts run out. A rate-limit error carrying a server-specified
    /// Retry-After sleeps that long instead of the computed backoff.
    pub async fn run<T, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&CidashError) -> bool,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !is_retryable(&err) || attempt + 1 >= self.max_attempts {
                        return Err(err);
                    }

                    let delay = err.retry_after().unwrap_or_else(|| self.backoff(attempt));
                    warn!(
                        "Attempt {} failed ({err}), retrying in {}ms...",
                        attempt + 1,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .mul_f64(self.backoff_factor.powi(attempt as i32));
        delay.min(self.max_delay)
    }
}
