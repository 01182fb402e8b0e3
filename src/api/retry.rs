//! Retry and backoff for idempotent session API calls.
//!
//! Only reads are retried. The photo upload is never retried automatically;
//! the user retries it from the booth screen.

use std::future::Future;
use std::time::Duration;

use super::client::ApiError;

/// Default number of retry attempts for transient network errors.
pub const DEFAULT_NETWORK_RETRIES: u32 = 3;

/// Base delay for exponential backoff (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Maximum delay cap for exponential backoff (30 seconds).
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Retry configuration for transient network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_NETWORK_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.backoff_base, self.backoff_max)
    }
}

/// True for connection failures, timeouts, broken bodies and 502/503/504.
pub fn is_transient_network_error(error: &reqwest::Error) -> bool {
    if error.is_connect() || error.is_timeout() || error.is_body() {
        return true;
    }
    matches!(error.status().map(|s| s.as_u16()), Some(502..=504))
}

/// True for API errors worth retrying.
pub fn is_transient(error: &ApiError) -> bool {
    match error {
        ApiError::Http(e) => is_transient_network_error(e),
        ApiError::Status { status, .. } => matches!(status, 502..=504),
        ApiError::Timeout => true,
        _ => false,
    }
}

/// min(base * 2^attempt + base/2 (capped at 500ms), max)
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let jitter_ms = (base.as_millis() as u64).min(1000);
    let jitter = Duration::from_millis(jitter_ms / 2);
    exponential.saturating_add(jitter).min(max)
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
///
/// Exhausted retries surface as [`ApiError::NetworkError`] carrying the last
/// failure message and the number of attempts made.
pub async fn with_network_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => {
                if attempt >= policy.max_retries {
                    log::error!(
                        "Network error after {} attempts. Giving up. Error: {}",
                        attempt + 1,
                        e
                    );
                    return Err(ApiError::NetworkError {
                        message: e.to_string(),
                        attempts: attempt + 1,
                    });
                }
                let delay = policy.backoff(attempt);
                log::warn!(
                    "Network error (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt + 1,
                    policy.max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
