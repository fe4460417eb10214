//! Shared "retry on busy" helper.
//!
//! Scan start, transport enable/disable and hardware reset all retry the
//! same way when the stack reports a transient resource error: a bounded
//! number of attempts with a growing sleep in between. Non-transient errors
//! are returned immediately.

use std::time::Duration;

use log::warn;

use crate::error::TransportError;
use crate::utils::clock::Clock;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BackoffKind {
    /// `initial * attempt`
    Linear,
    /// `initial * 2^(attempt - 1)`
    Exponential,
}

/// Retry schedule for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Backoff {
    pub max_attempts: u32,
    pub initial: Duration,
    pub kind: BackoffKind,
    pub max_delay: Duration,
}

impl Backoff {
    /// Delay of `initial * attempt`.
    pub const fn linear(max_attempts: u32, initial: Duration) -> Self {
        Self {
            max_attempts,
            initial,
            kind: BackoffKind::Linear,
            max_delay: Duration::from_secs(30),
        }
    }

    pub const fn exponential(max_attempts: u32, initial: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial,
            kind: BackoffKind::Exponential,
            max_delay,
        }
    }

    /// Sleep before the retry following failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.kind {
            BackoffKind::Linear => self.initial.saturating_mul(attempt),
            BackoffKind::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.initial.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent. Returns the last error in the latter cases.
pub fn retry_transient<T, F>(
    clock: &dyn Clock,
    backoff: &Backoff,
    what: &str,
    mut op: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Result<T, TransportError>,
{
    let attempts = backoff.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = backoff.delay_for(attempt);
                warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    what, e, attempt, attempts, delay
                );
                clock.sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("{} still busy after {} attempts", what, attempts);
                }
                return Err(e);
            }
        }
    }
}
