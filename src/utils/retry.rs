//! Retry utilities for handling transient failures
//!
//! Bounded exponential backoff with optional jitter. The error type decides
//! through [`Retryable`] whether another attempt is worthwhile; permanent
//! failures are returned after the first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::StorageError;
use crate::utils::jitter::generate_jitter_percent;

/// Errors that can tell whether retrying may help
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            ..Self::default()
        }
    }
}

/// Execute an operation with retry logic
///
/// Returns the first success, the first non-retryable error, or the last
/// error once `max_attempts` is exhausted.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
    operation_name: &str,
) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded on attempt {}/{}",
                        operation_name, attempt, max_attempts
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_retryable() => {
                debug!(
                    "Operation '{}' failed with non-retryable error: {}",
                    operation_name, err
                );
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                warn!(
                    "Operation '{}' failed after {} attempts: {}",
                    operation_name, max_attempts, err
                );
                return Err(err);
            }
            Err(err) => {
                let delay = calculate_delay(config, attempt);
                warn!(
                    "Operation '{}' failed on attempt {}/{}, retrying in {:?}: {}",
                    operation_name, attempt, max_attempts, delay, err
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Calculate delay with exponential backoff and optional jitter
pub(crate) fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponential_delay = config.initial_delay.as_millis() as f64
        * config.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

    let delay_ms = exponential_delay.min(config.max_delay.as_millis() as f64) as u64;

    let final_delay = if config.jitter {
        // Up to 25% jitter so parallel workers do not retry in lockstep
        delay_ms + generate_jitter_percent(delay_ms, 25)
    } else {
        delay_ms
    };

    Duration::from_millis(final_delay)
}
