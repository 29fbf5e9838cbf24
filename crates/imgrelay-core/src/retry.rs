//! Bounded retry with exponential backoff for pull, push and listing calls.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use imgrelay_registry::RegistryError;
use imgrelay_runtime::RuntimeError;
use imgrelay_schema::RetrySection;
use std::fmt::Display;
use std::time::Duration;
use tracing::warn;

/// Errors that can tell whether repeating the call might succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for RegistryError {
    fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Http(_) | RegistryError::Unknown { .. })
    }
}

impl Retryable for RuntimeError {
    fn is_retryable(&self) -> bool {
        matches!(self, RuntimeError::Transfer { .. } | RuntimeError::Io(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub backoff: Duration,
}

/// Upper bound for a single delay between attempts.
const MAX_DELAY: Duration = Duration::from_secs(30);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn from_config(section: &RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            backoff: Duration::from_millis(section.backoff_ms),
        }
    }

    /// Delays between attempts, without jitter so runs are reproducible.
    pub fn delays(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(MAX_DELAY.max(self.backoff))
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. The last error is returned.
    pub fn run<T, E>(&self, what: &str, mut op: impl FnMut() -> Result<T, E>) -> Result<T, E>
    where
        E: Retryable + Display,
    {
        let mut delays = self.delays();
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    let delay = delays.next_backoff().unwrap_or(MAX_DELAY);
                    warn!(
                        "{what} failed (attempt {attempt}/{}): {e}; retrying in {}ms",
                        self.max_attempts,
                        delay.as_millis()
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
