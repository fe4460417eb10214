// rentscan/src/central/orchestrator.rs
//! Scan and connect sequencing.
//!
//! Tracks at most one connection (pending or established) and keeps the
//! scanner off while it exists. Discovery state lives in the engine; the
//! caller tears that down whenever this reports a connection going away.

use log::{debug, info, warn};

use crate::config::CentralConfig;
use crate::error::TransportError;
use crate::protocol::TargetMatcher;
use crate::transport::{
    AdvReport, ConnParams, ConnState, ScanParams, Transport, TransportResult,
};
use crate::types::{Address, ConnHandle};
use crate::utils::{Backoff, Clock, retry_transient};

/// HCI "Remote User Terminated Connection".
pub const DISCONNECT_REASON: u8 = 0x13;

/// What [`Orchestrator::start_scan`] found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Started,
    AlreadyScanning,
    ConnectPending,
    Connected,
}

/// Result of matching a connect completion against the pending attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(Address),
    /// The attempt to `peer` failed; nothing is tracked any more.
    Failed {
        peer: Address,
        error: TransportError,
    },
    /// Not the connection being waited for.
    Ignored,
}

/// Scan-or-connect state for the single RentScan peer.
pub struct Orchestrator {
    matcher: TargetMatcher,
    scan: ScanParams,
    conn_params: ConnParams,
    scan_retry: Backoff,
    scanning: bool,
    pending: Option<(ConnHandle, Address)>,
    connected: Option<(ConnHandle, Address)>,
}

impl Orchestrator {
    pub fn new(config: &CentralConfig) -> Self {
        Self {
            matcher: TargetMatcher::from_config(config),
            scan: config.scan,
            conn_params: config.conn,
            scan_retry: config.scan_retry,
            scanning: false,
            pending: None,
            connected: None,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Connection attempt still waiting for its completion.
    pub fn pending(&self) -> Option<(ConnHandle, Address)> {
        self.pending
    }

    /// Established connection.
    pub fn connection(&self) -> Option<(ConnHandle, Address)> {
        self.connected
    }

    /// Pending or established connection handle.
    pub fn tracked(&self) -> Option<ConnHandle> {
        self.connected.or(self.pending).map(|(c, _)| c)
    }

    /// Forget a tracked connection the transport no longer reports as
    /// connected. The link itself is left alone; the caller clears discovery
    /// state and then disconnects the returned handle.
    pub fn reap_stale(&mut self, transport: &dyn Transport) -> Option<ConnHandle> {
        let (conn, _) = self.connected?;
        match transport.conn_info(conn) {
            Ok(info) if info.state == ConnState::Connected => None,
            _ => {
                warn!("{} is no longer connected, tearing it down", conn);
                self.connected = None;
                Some(conn)
            }
        }
    }

    /// Start scanning unless something already occupies the radio.
    pub fn start_scan(
        &mut self,
        transport: &mut dyn Transport,
        clock: &dyn Clock,
    ) -> TransportResult<ScanOutcome> {
        if self.scanning {
            return Ok(ScanOutcome::AlreadyScanning);
        }
        if self.pending.is_some() {
            debug!("connect pending, not scanning");
            return Ok(ScanOutcome::ConnectPending);
        }
        if self.connected.is_some() {
            return Ok(ScanOutcome::Connected);
        }

        let params = self.scan;
        retry_transient(clock, &self.scan_retry, "scan start", || {
            transport.scan_start(&params)
        })?;
        self.scanning = true;
        info!("scan started");
        Ok(ScanOutcome::Started)
    }

    /// Stop scanning. Failures are logged, the scanner counts as off either way.
    pub fn stop_scan(&mut self, transport: &mut dyn Transport) {
        if self.scanning {
            if let Err(e) = transport.scan_stop() {
                warn!("scan stop failed: {}", e);
            }
            self.scanning = false;
        }
    }

    /// Radio was reset underneath us: nothing is scanning or connected.
    pub fn reset(&mut self) {
        self.scanning = false;
        self.pending = None;
        self.connected = None;
    }

    /// Connect to a matching advertiser. `Ok(None)` when the report is not
    /// a target or a connection already exists.
    pub fn on_device_found(
        &mut self,
        transport: &mut dyn Transport,
        report: &AdvReport,
    ) -> TransportResult<Option<ConnHandle>> {
        if !self.matcher.matches(report) {
            return Ok(None);
        }
        if self.pending.is_some() || self.connected.is_some() {
            debug!("ignoring {}: connection already in progress", report.address);
            return Ok(None);
        }

        info!("target {} found (rssi {})", report.address, report.rssi);
        self.stop_scan(transport);
        let conn = transport.connect_create(&report.address, &self.conn_params)?;
        self.pending = Some((conn, report.address));
        Ok(Some(conn))
    }

    /// Match a connect completion against the pending attempt.
    pub fn on_connect_result(
        &mut self,
        conn: ConnHandle,
        result: TransportResult<()>,
    ) -> ConnectOutcome {
        let Some((pending, addr)) = self.pending else {
            debug!("connect result for untracked {}", conn);
            return ConnectOutcome::Ignored;
        };
        if pending != conn {
            debug!("connect result for stale {}", conn);
            return ConnectOutcome::Ignored;
        }
        self.pending = None;
        match result {
            Ok(()) => {
                info!("connected to {} as {}", addr, conn);
                self.connected = Some((conn, addr));
                ConnectOutcome::Connected(addr)
            }
            Err(error) => {
                warn!("connection to {} failed: {}", addr, error);
                ConnectOutcome::Failed { peer: addr, error }
            }
        }
    }

    /// Returns true when `conn` was the tracked connection.
    pub fn on_disconnected(&mut self, conn: ConnHandle) -> bool {
        if self.tracked() != Some(conn) {
            return false;
        }
        self.pending = None;
        self.connected = None;
        true
    }

    /// Forget the tracked connection and return it so the caller can disconnect it.
    pub fn forget(&mut self) -> Option<ConnHandle> {
        let conn = self.tracked();
        self.pending = None;
        self.connected = None;
        conn
    }
}
