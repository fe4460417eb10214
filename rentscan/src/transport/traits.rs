// rentscan/src/transport/traits.rs
//! The [`Transport`] trait and the values passing through it.

use std::time::Duration;

use uuid::Uuid;

use crate::constants::{
    BLE_CONN_INTERVAL_MAX, BLE_CONN_INTERVAL_MIN, BLE_CONN_SUPERVISION_TIMEOUT, BLE_SCAN_INTERVAL,
    BLE_SCAN_WINDOW,
};
use crate::error::TransportError;
use crate::types::{Address, ConnHandle, Handle, NotifyKind};

/// Result type for transport primitives.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Scan parameters in controller units (0.625 ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanParams {
    pub active: bool,
    pub interval: u16,
    pub window: u16,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            active: true,
            interval: BLE_SCAN_INTERVAL,
            window: BLE_SCAN_WINDOW,
        }
    }
}

/// Initial connection parameters. Intervals in 1.25 ms units, timeout in 10 ms units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnParams {
    pub interval_min: u16,
    pub interval_max: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
}

impl ConnParams {
    pub fn supervision_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.supervision_timeout) * 10)
    }
}

impl Default for ConnParams {
    fn default() -> Self {
        Self {
            interval_min: BLE_CONN_INTERVAL_MIN,
            interval_max: BLE_CONN_INTERVAL_MAX,
            latency: 0,
            supervision_timeout: BLE_CONN_SUPERVISION_TIMEOUT,
        }
    }
}

/// Link state as reported by a fresh `conn_info` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnInfo {
    pub peer: Address,
    pub state: ConnState,
}

/// Which GATT discovery procedure to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverKind {
    Primary,
    Characteristic,
    Descriptor,
}

/// One discovery request. `uuid: None` lists every attribute of `kind` in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverRequest {
    pub kind: DiscoverKind,
    pub uuid: Option<Uuid>,
    pub start: Handle,
    pub end: Handle,
}

/// Declaration type of a discovered attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Service { end_handle: Handle },
    /// `value_handle` is `None` when the stack does not report it; the value
    /// then follows the declaration.
    Characteristic { value_handle: Option<Handle> },
    Descriptor,
}

/// One attribute delivered by a discovery procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub handle: Handle,
    pub uuid: Uuid,
    pub kind: AttributeKind,
}

/// What [`Transport::subscribe`] writes and registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeParams {
    pub value_handle: Handle,
    pub ccc_handle: Handle,
    pub kind: NotifyKind,
}

/// Advertising report handed up from a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvReport {
    pub address: Address,
    pub rssi: i8,
    pub connectable: bool,
    pub data: Vec<u8>,
}

/// Asynchronous completions from the stack, delivered through
/// [`Transport::poll_event`] in the order they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    DeviceFound {
        report: AdvReport,
    },
    Connected {
        conn: ConnHandle,
        result: TransportResult<()>,
    },
    Disconnected {
        conn: ConnHandle,
        reason: u8,
    },
    /// `attr: None` means the current discovery procedure is exhausted.
    DiscoveryResult {
        conn: ConnHandle,
        attr: Option<Attribute>,
    },
    SubscribeComplete {
        conn: ConnHandle,
        value_handle: Handle,
        result: TransportResult<()>,
    },
    /// `data: None` means the peer disabled notifications.
    Notification {
        conn: ConnHandle,
        value_handle: Handle,
        data: Option<Vec<u8>>,
    },
}

/// Transport trait abstracts the BLE host stack away from the discovery and
/// recovery logic. Requests complete asynchronously through events.
pub trait Transport: Send {
    /// Bring the stack up.
    fn enable(&mut self) -> TransportResult<()>;

    /// Take the stack down. Existing connections are dropped.
    fn disable(&mut self) -> TransportResult<()>;

    /// Reset the controller itself. Not every backend can.
    fn hardware_reset(&mut self) -> TransportResult<()> {
        Err(TransportError::NotSupported)
    }

    fn scan_start(&mut self, params: &ScanParams) -> TransportResult<()>;

    fn scan_stop(&mut self) -> TransportResult<()>;

    /// Begin connecting. The outcome arrives as [`TransportEvent::Connected`].
    fn connect_create(
        &mut self,
        peer: &Address,
        params: &ConnParams,
    ) -> TransportResult<ConnHandle>;

    fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> TransportResult<()>;

    /// Fresh link state. Never cached by callers.
    fn conn_info(&self, conn: ConnHandle) -> TransportResult<ConnInfo>;

    /// Connection object the stack still holds for `peer`, in any state.
    /// Used to tear down a link the controller kept after a stale-state
    /// connect failure. Backends that cannot look links up by address
    /// report none.
    fn conn_lookup(&self, _peer: &Address) -> Option<ConnHandle> {
        None
    }

    /// Start a discovery procedure. Results arrive as
    /// [`TransportEvent::DiscoveryResult`], terminated by `attr: None`.
    ///
    /// A new request on a connection stops the procedure already running
    /// there: nothing more is delivered for the superseded procedure, its
    /// terminating `attr: None` included. Backends whose stack cannot abort
    /// a procedure must hold the new request back until the old one has
    /// ended and drop the old procedure's remaining results.
    fn discover(&mut self, conn: ConnHandle, req: &DiscoverRequest) -> TransportResult<()>;

    /// Write the CCC and register for notifications. Completion arrives as
    /// [`TransportEvent::SubscribeComplete`].
    fn subscribe(&mut self, conn: ConnHandle, params: &SubscribeParams) -> TransportResult<()>;

    fn write_without_response(
        &mut self,
        conn: ConnHandle,
        handle: Handle,
        data: &[u8],
    ) -> TransportResult<()>;

    /// Add a peer to the controller allow list.
    fn allow_list_add(&mut self, _peer: &Address) -> TransportResult<()> {
        Err(TransportError::NotSupported)
    }

    fn allow_list_clear(&mut self) -> TransportResult<()> {
        Err(TransportError::NotSupported)
    }

    /// Next pending event, if any. Never blocks.
    fn poll_event(&mut self) -> Option<TransportEvent>;
}
