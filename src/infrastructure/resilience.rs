//! Resilience patterns for external API calls

use crate::application::errors::VulnerabilityError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Retry configuration for exponential backoff
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Execute a function with exponential backoff retry logic.
///
/// Non-retryable errors are returned as they are. A retryable error that is still
/// failing after `max_attempts` surfaces as `UpstreamUnavailable`.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, VulnerabilityError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, VulnerabilityError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if !error.is_retryable() {
                    return Err(error);
                }

                if attempts >= max_attempts {
                    return Err(VulnerabilityError::UpstreamUnavailable {
                        attempts,
                        message: error.to_string(),
                    });
                }

                tracing::debug!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying upstream call"
                );
                tokio::time::sleep(delay).await;

                delay = std::cmp::min(
                    Duration::from_millis(
                        (delay.as_millis() as f64 * config.backoff_multiplier) as u64,
                    ),
                    config.max_delay,
                );
            }
        }
    }
}

/// Process-wide admission control for the CVE registry.
///
/// Each admission reserves the next free slot, `interval` after the previous one, and
/// sleeps until it. A caller whose slot lies more than `max_wait` ahead is denied.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    max_wait: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval,
            max_wait,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for an admission slot
    pub async fn acquire(&self) -> Result<(), VulnerabilityError> {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = std::cmp::max(*next, now);
            if slot.duration_since(now) > self.max_wait {
                tracing::warn!(
                    wait_ms = slot.duration_since(now).as_millis() as u64,
                    max_wait_ms = self.max_wait.as_millis() as u64,
                    "Rate limiter denied upstream call"
                );
                return Err(VulnerabilityError::UpstreamRateLimited {
                    max_wait_ms: self.max_wait.as_millis() as u64,
                });
            }
            *next = slot + self.interval;
            slot
        };

        tokio::time::sleep_until(slot).await;
        Ok(())
    }
}
