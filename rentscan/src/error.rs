// rentscan/src/error.rs
//! Crate and transport error types.

use thiserror::Error;

use crate::recovery::RecoveryLevel;
use crate::types::Handle;

/// Errors reported by the BLE transport (controller / host stack).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportError {
    /// Resource temporarily unavailable. Retried in place with backoff.
    #[error("transport busy, try again")]
    Busy,

    /// The controller still believes a connection exists for the target.
    #[error("stale connection state")]
    StaleConnection,

    #[error("already subscribed")]
    AlreadySubscribed,

    #[error("not connected")]
    NotConnected,

    #[error("attribute not found")]
    NotFound,

    #[error("out of memory")]
    NoMemory,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("operation not supported")]
    NotSupported,

    #[error("hci error status {0:#04x}")]
    Hci(u8),

    #[error("att error {0:#04x}")]
    Att(u8),

    #[error("transport error code {0}")]
    Os(i32),
}

/// HCI status "Connection Already Exists".
const HCI_CONNECTION_ALREADY_EXISTS: u8 = 0x0B;

impl TransportError {
    /// Transient resource exhaustion that may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Busy | TransportError::NoMemory)
    }

    /// Controller bookkeeping disagrees with the host about an existing
    /// connection. Must be answered with a clean teardown, never a blind retry.
    pub fn is_stale_state(&self) -> bool {
        matches!(
            self,
            TransportError::StaleConnection | TransportError::Hci(HCI_CONNECTION_ALREADY_EXISTS)
        )
    }

    /// Map a negative errno as returned by POSIX-flavoured host stacks.
    pub fn from_errno(err: i32) -> Self {
        match err.unsigned_abs() {
            2 => TransportError::NotFound,
            11 => TransportError::Busy,
            12 => TransportError::NoMemory,
            22 => TransportError::InvalidArgument,
            95 | 134 => TransportError::NotSupported,
            107 | 128 => TransportError::NotConnected,
            114 => TransportError::AlreadySubscribed,
            _ => TransportError::Os(err),
        }
    }
}

/// Common error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("no transport configured")]
    TransportMissing,

    #[error("invalid message length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("{field} length {actual} exceeds maximum {max}")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("unknown command code {0:#04x}")]
    UnknownCommand(u8),

    #[error("unknown rental status {0:#04x}")]
    UnknownStatus(u8),

    #[error("invalid handle range: start {start} must be below end {end}")]
    InvalidHandleRange { start: Handle, end: Handle },

    #[error("{0} handle already recorded for this connection")]
    HandleAlreadySet(&'static str),

    #[error("not connected")]
    NotConnected,

    #[error("rx characteristic not discovered")]
    RxHandleUnknown,

    #[error("no subscription recorded for this connection")]
    NoSubscription,

    #[error("best-guess ccc fallback requires canonical discovery to be exhausted first")]
    FallbackNotPermitted,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("{level:?} recovery failed: {source}")]
    RecoveryFailed {
        level: RecoveryLevel,
        source: TransportError,
    },

    #[error("central state lock poisoned")]
    StatePoisoned,

    #[error("message handler failed: {0}")]
    Handler(String),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
