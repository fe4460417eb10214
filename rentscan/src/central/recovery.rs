// rentscan/src/central/recovery.rs
//! Carrying out recovery decisions against the transport.

use log::{debug, error, info, warn};

use crate::central::{Central, DISCONNECT_REASON, Enabled};
use crate::error::TransportError;
use crate::recovery::{Failure, RecoveryLevel};
use crate::transport::{ConnState, TransportResult};
use crate::utils::retry_transient;
use crate::{Error, Result};

/// The most recent recovery and whether it got scanning going again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RecoveryRecord {
    pub failure: Failure,
    pub level: RecoveryLevel,
    pub succeeded: bool,
}

impl Central<Enabled> {
    /// Classify `failure`, update the counters and execute the chosen level.
    ///
    /// Discovery state is always torn down before the link is touched. A
    /// stale-state connect failure first disconnects whatever link the stack
    /// still holds for the target, so the retry never meets it again. On
    /// success scanning is running again (or discovery restarted for
    /// [`RecoveryLevel::RetryInPlace`]) and any earlier fatal flag is cleared.
    /// On failure the central is flagged fatal and [`Error::RecoveryFailed`]
    /// is returned.
    pub fn recover(&mut self, failure: Failure) -> Result<RecoveryLevel> {
        let now = self.clock.now();
        let level = self
            .policy
            .classify_and_recover(&failure, &self.attempts, now);
        let window = self.policy.config().retry_window;
        self.attempts.record_failure(&failure, now, window);

        if failure.is_stale_state() {
            self.clear_stale_link();
        }
        let outcome = match level {
            RecoveryLevel::RetryInPlace => self.retry_in_place(),
            RecoveryLevel::RestartScan => self.restart_scan(),
            RecoveryLevel::FullStackReset => self.full_stack_reset(),
            RecoveryLevel::EmergencyReset => self.emergency_reset(),
        };

        self.last_recovery = Some(RecoveryRecord {
            failure,
            level,
            succeeded: outcome.is_ok(),
        });
        match outcome {
            Ok(()) => {
                info!("recovery {} complete", level);
                self.fatal = false;
                Ok(level)
            }
            Err(source) => {
                error!("recovery {} failed: {}", level, source);
                self.fatal = true;
                Err(Error::RecoveryFailed { level, source })
            }
        }
    }

    fn clear_stale_link(&mut self) {
        self.engine.teardown();
        let Some(peer) = self.attempts.target else {
            return;
        };
        let Some(conn) = self.transport.conn_lookup(&peer) else {
            debug!("no link left over for {}", peer);
            return;
        };
        if self.orchestrator.tracked() == Some(conn) {
            self.orchestrator.forget();
        }
        warn!("{} to {} left over after stale connect, disconnecting", conn, peer);
        if let Err(e) = self.transport.disconnect(conn, DISCONNECT_REASON) {
            debug!("disconnect of leftover {}: {}", conn, e);
        }
    }

    fn retry_in_place(&mut self) -> TransportResult<()> {
        self.engine.teardown();
        self.clock.sleep(self.config.retry_delay);

        let Some((conn, _)) = self.orchestrator.connection() else {
            return self.restart_scan();
        };
        let still_connected = self
            .transport
            .conn_info(conn)
            .is_ok_and(|info| info.state == ConnState::Connected);
        if !still_connected {
            warn!("{} gone before discovery retry", conn);
            return self.restart_scan();
        }

        let stage = self.engine.on_connected(&mut *self.transport, conn);
        match stage.failure() {
            Some(f) => {
                warn!("discovery retry rejected ({:?}), restarting scan", f);
                self.restart_scan()
            }
            None => Ok(()),
        }
    }

    fn restart_scan(&mut self) -> TransportResult<()> {
        self.teardown_link();
        self.clock.sleep(self.config.retry_delay);
        self.resume_scan()
    }

    fn full_stack_reset(&mut self) -> TransportResult<()> {
        self.teardown_link();
        self.power_cycle()?;
        let now = self.clock.now();
        self.attempts.record_full_reset(now);
        self.resume_scan()
    }

    fn emergency_reset(&mut self) -> TransportResult<()> {
        self.teardown_link();
        let backoff = self.config.power_retry;
        let transport = &mut self.transport;
        let reset = retry_transient(&*self.clock, &backoff, "hardware reset", || {
            transport.hardware_reset()
        });
        match reset {
            Ok(()) => {
                self.orchestrator.reset();
                self.clock.sleep(self.config.settle_delay);
            }
            Err(TransportError::NotSupported) => {
                warn!("hardware reset unsupported, power cycling instead");
                self.power_cycle()?;
            }
            Err(e) => return Err(e),
        }
        let now = self.clock.now();
        self.attempts.record_emergency_reset(now);
        self.resume_scan()
    }

    /// Disable, settle, enable. Busy errors are retried.
    fn power_cycle(&mut self) -> TransportResult<()> {
        let backoff = self.config.power_retry;
        let transport = &mut self.transport;
        retry_transient(&*self.clock, &backoff, "disable", || transport.disable())?;
        self.orchestrator.reset();
        self.clock.sleep(self.config.settle_delay);
        let transport = &mut self.transport;
        retry_transient(&*self.clock, &backoff, "enable", || transport.enable())
    }

    /// Scan again without feeding a failure back into recovery.
    fn resume_scan(&mut self) -> TransportResult<()> {
        self.orchestrator
            .start_scan(&mut *self.transport, &*self.clock)
            .map(|_| ())
    }
}
