use std::time::Duration;

use tracing::{error, warn};

use crate::error::{Error, Result};
use crate::shutdown::Shutdown;

/// Bounded exponential backoff.
///
/// The delay after failed attempt `n` (1-based) is
/// `initial_delay * multiplier^(n-1)`, capped at `max_delay`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
            multiplier: 2,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds or the attempts run out.
    ///
    /// Sleeps between attempts are cut short by `shutdown`, which ends the
    /// retry with [`Error::Cancelled`].
    ///
    /// # Errors
    ///
    /// [`Error::StorageUnavailable`] wrapping the last failure once every
    /// attempt has failed, or straight away for a permanent error such as
    /// [`Error::Corrupt`].
    pub fn run<T, F>(&self, what: &str, shutdown: &Shutdown, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempt >= attempts || err.is_permanent() {
                error!("Failed to connect to {what} after {attempt} attempts: {err}");
                return Err(Error::StorageUnavailable {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }
            let delay = self.delay_after(attempt);
            warn!(
                "{what} connection attempt {attempt} failed: {err}. Retrying in {:.1} seconds...",
                delay.as_secs_f64()
            );
            if shutdown.wait(delay) {
                return Err(Error::Cancelled);
            }
            attempt += 1;
        }
    }
}
