// rentscan/src/recovery/policy.rs

use std::fmt;
use std::time::{Duration, Instant};

use log::info;

use crate::config::RecoveryConfig;
use crate::error::TransportError;
use crate::gatt::DiscoveryFailure;
use crate::types::Address;

/// Recovery actions, ordered by how much state they throw away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecoveryLevel {
    /// Re-run discovery on the same connection.
    RetryInPlace,
    /// Drop the connection and scan again.
    RestartScan,
    /// Disable and re-enable the BLE stack.
    FullStackReset,
    /// Reset the controller.
    EmergencyReset,
}

impl fmt::Display for RecoveryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryLevel::RetryInPlace => "retry-in-place",
            RecoveryLevel::RestartScan => "restart-scan",
            RecoveryLevel::FullStackReset => "full-stack-reset",
            RecoveryLevel::EmergencyReset => "emergency-reset",
        };
        f.write_str(s)
    }
}

/// Something that went wrong and needs a recovery decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Failure {
    Discovery(DiscoveryFailure),
    /// `connect_create` itself was refused.
    ConnectCreate(TransportError),
    /// The connection attempt completed with an error.
    ConnectFailed(TransportError),
    /// Scan start still failing after its busy retries.
    ScanStart(TransportError),
    /// Too many consecutive message handler failures.
    MessageProcessing,
    /// Operator-requested recovery.
    Manual(RecoveryLevel),
}

impl Failure {
    fn is_connect(&self) -> bool {
        matches!(self, Failure::ConnectCreate(_) | Failure::ConnectFailed(_))
    }

    /// Controller state needs a teardown before anything is retried.
    pub fn is_stale_state(&self) -> bool {
        match self {
            Failure::ConnectCreate(e) | Failure::ConnectFailed(e) => e.is_stale_state(),
            _ => false,
        }
    }
}

/// Retry and escalation counters shared by every connection attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionAttemptState {
    /// Connect failures against the current target.
    pub retry_count: u32,
    pub discovery_retry_count: u32,
    /// Failures of any kind inside the rolling window.
    pub total_retry_count: u32,
    /// First failure of a window that did not start at a full reset.
    pub window_start: Option<Instant>,
    /// Full or emergency reset. Opens the window until it runs out.
    pub last_full_reset: Option<Instant>,
    pub target: Option<Address>,
    pub full_resets_since_success: u32,
    pub emergency_resets_used: u32,
}

impl ConnectionAttemptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start of the rolling window: the last full reset, or the first
    /// failure counted after the previous window ran out.
    pub fn window_origin(&self) -> Option<Instant> {
        self.window_start.or(self.last_full_reset)
    }

    fn window_open(&self, now: Instant, window: Duration) -> bool {
        self.window_origin()
            .is_some_and(|start| now.saturating_duration_since(start) <= window)
    }

    /// Failures counted in the window that contains `now`.
    pub fn total_in_window(&self, now: Instant, window: Duration) -> u32 {
        if self.window_open(now, window) {
            self.total_retry_count
        } else {
            0
        }
    }

    /// Count `failure`. Manual recoveries are not failures.
    pub fn record_failure(&mut self, failure: &Failure, now: Instant, window: Duration) {
        if matches!(failure, Failure::Manual(_)) {
            return;
        }
        if !self.window_open(now, window) {
            self.window_start = Some(now);
            self.total_retry_count = 0;
        }
        self.total_retry_count += 1;
        match failure {
            Failure::Discovery(_) => self.discovery_retry_count += 1,
            f if f.is_connect() => self.retry_count += 1,
            _ => {}
        }
    }

    /// A new target resets the per-target counter.
    pub fn record_target(&mut self, target: Address) {
        if self.target != Some(target) {
            self.target = Some(target);
            self.retry_count = 0;
        }
    }

    /// A connection came up, so the connect retries start over.
    pub fn record_connected(&mut self, target: Address) {
        self.target = Some(target);
        self.retry_count = 0;
    }

    /// Discovery reached an active subscription. Everything but the
    /// emergency budget starts over.
    pub fn record_session_established(&mut self) {
        self.retry_count = 0;
        self.discovery_retry_count = 0;
        self.total_retry_count = 0;
        self.window_start = None;
        self.full_resets_since_success = 0;
    }

    /// A full reset went through. Retry counters restart and the window opens at `now`.
    pub fn record_full_reset(&mut self, now: Instant) {
        self.clear_retries(now);
        self.full_resets_since_success += 1;
    }

    pub fn record_emergency_reset(&mut self, now: Instant) {
        self.clear_retries(now);
        self.full_resets_since_success = 0;
        self.emergency_resets_used += 1;
    }

    fn clear_retries(&mut self, now: Instant) {
        self.retry_count = 0;
        self.discovery_retry_count = 0;
        self.total_retry_count = 0;
        self.window_start = None;
        self.last_full_reset = Some(now);
    }
}

/// Pure mapping from a failure and the counters to a recovery level.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryPolicy {
    config: RecoveryConfig,
}

impl RecoveryPolicy {
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Choose the recovery level for `failure` given the counters at `now`.
    pub fn classify_and_recover(
        &self,
        failure: &Failure,
        state: &ConnectionAttemptState,
        now: Instant,
    ) -> RecoveryLevel {
        let level = match failure {
            Failure::Manual(level) => *level,
            _ => self.escalate(self.base_level(failure, state, now), state),
        };
        info!("{:?} -> {}", failure, level);
        level
    }

    /// No emergency resets left; full resets are all that remain.
    pub fn emergency_exhausted(&self, state: &ConnectionAttemptState) -> bool {
        state.emergency_resets_used >= self.config.max_emergency_resets
    }

    fn base_level(
        &self,
        failure: &Failure,
        state: &ConnectionAttemptState,
        now: Instant,
    ) -> RecoveryLevel {
        let total = state.total_in_window(now, self.config.retry_window);
        if total + 1 >= self.config.total_retry_threshold {
            return RecoveryLevel::FullStackReset;
        }

        match failure {
            Failure::Discovery(_) => match state.discovery_retry_count {
                0 => RecoveryLevel::RetryInPlace,
                n if n >= self.config.max_target_retries => RecoveryLevel::FullStackReset,
                _ => RecoveryLevel::RestartScan,
            },
            f if f.is_connect() => {
                if state.retry_count >= self.config.max_target_retries {
                    RecoveryLevel::FullStackReset
                } else {
                    RecoveryLevel::RestartScan
                }
            }
            // Scan start exhaustion and message processing.
            _ => RecoveryLevel::FullStackReset,
        }
    }

    fn escalate(&self, level: RecoveryLevel, state: &ConnectionAttemptState) -> RecoveryLevel {
        if level == RecoveryLevel::FullStackReset
            && state.full_resets_since_success >= self.config.full_resets_before_emergency
            && !self.emergency_exhausted(state)
        {
            RecoveryLevel::EmergencyReset
        } else {
            level
        }
    }
}
