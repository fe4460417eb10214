// rentscan/src/central/status.rs
//! Diagnostic snapshots shown by the shell.

use std::fmt;

use crate::central::{Central, Enabled, RecoveryRecord};
use crate::gatt::{DiscoveryStage, ServiceHandleRange, SubscriptionState};
use crate::types::{Address, ConnHandle, Handle};

/// Handles discovered on the current connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HandleSnapshot {
    pub service: Option<ServiceHandleRange>,
    pub rx_value: Option<Handle>,
    pub tx_value: Option<Handle>,
    pub ccc: Option<Handle>,
    pub subscription: Option<SubscriptionState>,
}

fn opt<T: fmt::Display>(v: &Option<T>) -> String {
    v.as_ref()
        .map(|x| x.to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for HandleSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.service {
            Some(r) => writeln!(f, "service: {}..{}", r.start(), r.end())?,
            None => writeln!(f, "service: -")?,
        }
        writeln!(f, "rx value: {}", opt(&self.rx_value))?;
        writeln!(f, "tx value: {}", opt(&self.tx_value))?;
        writeln!(f, "ccc: {}", opt(&self.ccc))?;
        match &self.subscription {
            Some(s) => write!(
                f,
                "subscription: {:?} on {} via {}{}",
                s.phase,
                s.value_handle,
                s.ccc_handle,
                if s.degraded { " (guessed ccc)" } else { "" }
            ),
            None => write!(f, "subscription: -"),
        }
    }
}

/// Point-in-time view of the central for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CentralStatus {
    pub scanning: bool,
    pub connection: Option<ConnHandle>,
    pub peer: Option<Address>,
    pub connecting: bool,
    pub stage: DiscoveryStage,
    pub handles: HandleSnapshot,
    pub degraded: bool,
    pub retry_count: u32,
    pub discovery_retry_count: u32,
    pub total_retry_count: u32,
    pub full_resets_since_success: u32,
    pub emergency_resets_used: u32,
    /// No emergency resets left.
    pub emergency_exhausted: bool,
    pub last_recovery: Option<RecoveryRecord>,
    /// The last recovery could not restore scanning.
    pub fatal: bool,
    pub message_errors: u32,
    pub decode_errors: u32,
    pub messages_received: u64,
}

impl fmt::Display for CentralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.connection, self.peer) {
            (Some(c), Some(p)) => writeln!(f, "connected: {} ({})", p, c)?,
            _ if self.connecting => writeln!(f, "connected: no (connecting)")?,
            _ => writeln!(f, "connected: no")?,
        }
        writeln!(f, "scanning: {}", if self.scanning { "yes" } else { "no" })?;
        writeln!(f, "discovery: {:?}", self.stage)?;
        writeln!(f, "{}", self.handles)?;
        writeln!(
            f,
            "retries: target {} discovery {} window {}",
            self.retry_count, self.discovery_retry_count, self.total_retry_count
        )?;
        writeln!(
            f,
            "resets: full {} emergency {}{}",
            self.full_resets_since_success,
            self.emergency_resets_used,
            if self.emergency_exhausted { " (exhausted)" } else { "" }
        )?;
        if let Some(r) = &self.last_recovery {
            writeln!(
                f,
                "last recovery: {} after {:?}{}",
                r.level,
                r.failure,
                if r.succeeded { "" } else { " (failed)" }
            )?;
        }
        write!(
            f,
            "messages: {} received, {} malformed, {} handler errors{}",
            self.messages_received,
            self.decode_errors,
            self.message_errors,
            if self.fatal { "\nFATAL: recovery failed" } else { "" }
        )
    }
}

impl Central<Enabled> {
    /// Copy of the handle table for display.
    pub fn handles(&self) -> HandleSnapshot {
        let t = self.engine.handles();
        HandleSnapshot {
            service: t.range(),
            rx_value: t.rx_value(),
            tx_value: t.tx_value(),
            ccc: t.ccc(),
            subscription: t.subscription().copied(),
        }
    }

    /// Snapshot of connection, discovery and recovery state.
    pub fn status(&self) -> CentralStatus {
        let connection = self.orchestrator.connection();
        CentralStatus {
            scanning: self.orchestrator.is_scanning(),
            connection: connection.map(|(c, _)| c),
            peer: connection.map(|(_, p)| p),
            connecting: self.orchestrator.pending().is_some(),
            stage: self.engine.stage(),
            handles: self.handles(),
            degraded: self.engine.is_degraded(),
            retry_count: self.attempts.retry_count,
            discovery_retry_count: self.attempts.discovery_retry_count,
            total_retry_count: self.attempts.total_retry_count,
            full_resets_since_success: self.attempts.full_resets_since_success,
            emergency_resets_used: self.attempts.emergency_resets_used,
            emergency_exhausted: self.policy.emergency_exhausted(&self.attempts),
            last_recovery: self.last_recovery,
            fatal: self.fatal,
            message_errors: self.message_errors,
            decode_errors: self.decode_errors,
            messages_received: self.messages_received,
        }
    }
}
