//! Time source used for recovery delays and the rolling retry window.
//!
//! Recovery paths sleep for fixed settle/backoff periods. Routing those
//! through [`Clock`] keeps the policy testable without wall-clock waits.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Convert milliseconds to Duration.
pub const fn ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Time source for retry delays and the rolling failure window.
pub trait Clock: Send {
    fn now(&self) -> Instant;

    /// Block the calling context for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time and `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually driven clock for tests. `sleep` advances time instantly and is
/// recorded so tests can assert on backoff schedules. Clones share state.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    now: Instant,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState {
                now: Instant::now(),
                sleeps: Vec::new(),
            })),
        }
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.inner.lock() {
            state.now += by;
        }
    }

    /// Every duration passed to `sleep`, oldest first.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner
            .lock()
            .map(|s| s.sleeps.clone())
            .unwrap_or_default()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.inner
            .lock()
            .map(|s| s.now)
            .unwrap_or_else(|poisoned| poisoned.into_inner().now)
    }

    fn sleep(&self, duration: Duration) {
        if let Ok(mut state) = self.inner.lock() {
            state.now += duration;
            state.sleeps.push(duration);
        }
    }
}
