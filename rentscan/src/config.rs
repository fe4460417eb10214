// rentscan/src/config.rs
//! Tunables for the central. `Default` reproduces the gateway firmware values.

use std::time::Duration;

use uuid::Uuid;

use crate::constants::{
    GATEWAY_ERROR_RESET_THRESHOLD, RENTSCAN_DEVICE_NAME, RENTSCAN_RX_UUID, RENTSCAN_SERVICE_UUID,
    RENTSCAN_TX_UUID,
};
use crate::transport::{ConnParams, ScanParams};
use crate::types::NotifyKind;
use crate::utils::{Backoff, ms};

/// Service and characteristic identities of the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceUuids {
    pub service: Uuid,
    pub rx: Uuid,
    pub tx: Uuid,
}

impl Default for ServiceUuids {
    fn default() -> Self {
        Self {
            service: RENTSCAN_SERVICE_UUID,
            rx: RENTSCAN_RX_UUID,
            tx: RENTSCAN_TX_UUID,
        }
    }
}

/// Knobs for the fallback paths of discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveryConfig {
    /// When canonical CCC discovery comes back empty, subscribe with
    /// `tx_value + offset` as a degraded best guess. `None` fails instead.
    pub ccc_fallback_offset: Option<u16>,
    /// Repeat RX characteristic discovery once without a UUID filter.
    pub unfiltered_char_retry: bool,
    pub notify_kind: NotifyKind,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ccc_fallback_offset: Some(1),
            unfiltered_char_retry: true,
            notify_kind: NotifyKind::Notify,
        }
    }
}

/// Thresholds for the escalation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecoveryConfig {
    /// Failures inside `retry_window` that force a full stack reset.
    pub total_retry_threshold: u32,
    pub retry_window: Duration,
    /// Per-target failures before a full stack reset.
    pub max_target_retries: u32,
    /// Full resets without an established session before trying an emergency reset.
    pub full_resets_before_emergency: u32,
    pub max_emergency_resets: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            total_retry_threshold: 5,
            retry_window: Duration::from_secs(60),
            max_target_retries: 2,
            full_resets_before_emergency: 2,
            max_emergency_resets: 2,
        }
    }
}

/// Central configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CentralConfig {
    /// Complete local name that identifies a target in advertisements.
    pub device_name: String,
    pub uuids: ServiceUuids,
    pub scan: ScanParams,
    pub conn: ConnParams,
    /// Busy retries for scan start.
    pub scan_retry: Backoff,
    /// Busy retries for enable/disable/hardware reset.
    pub power_retry: Backoff,
    /// Pause before retrying discovery or restarting the scan.
    pub retry_delay: Duration,
    /// Pause between taking the stack down and bringing it back.
    pub settle_delay: Duration,
    pub recovery: RecoveryConfig,
    pub discovery: DiscoveryConfig,
    pub health_check_period: Duration,
    /// Consecutive message handler failures that trigger a full reset.
    pub message_error_threshold: u32,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            device_name: RENTSCAN_DEVICE_NAME.to_string(),
            uuids: ServiceUuids::default(),
            scan: ScanParams::default(),
            conn: ConnParams::default(),
            scan_retry: Backoff::linear(3, ms(1000)),
            power_retry: Backoff::exponential(4, ms(100), ms(1000)),
            retry_delay: ms(1000),
            settle_delay: ms(100),
            recovery: RecoveryConfig::default(),
            discovery: DiscoveryConfig::default(),
            health_check_period: ms(30_000),
            message_error_threshold: GATEWAY_ERROR_RESET_THRESHOLD,
        }
    }
}
