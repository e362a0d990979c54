//! Async retry with exponential backoff for transient store contention

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Upper bound on a single backoff sleep.
const MAX_DELAY_MS: u64 = 2_000;

/// Errors that may succeed when the same operation is retried.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 20,
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << (attempt.saturating_sub(1)).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(MAX_DELAY_MS))
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or attempts run out.
///
/// Returns `Ok((value, attempts))` on success, or `Err((error, attempts))` on failure.
pub async fn retry_transient<T, E, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<(T, u32), (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok((value, attempts)),
            Err(e) => {
                if !e.is_transient() || attempts >= policy.max_attempts.max(1) {
                    return Err((e, attempts));
                }
                let delay = policy.delay(attempts);
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after transient store error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
