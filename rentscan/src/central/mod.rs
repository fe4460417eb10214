// rentscan/src/central/mod.rs
//! The RentScan central: scanning, connecting, discovery and recovery wired
//! to one [`Transport`].
//!
//! `Central<Disabled>` only holds configuration. [`Central::enable`] brings
//! the stack up and yields a `Central<Enabled>` that processes transport
//! events serially through [`Central::process_pending`].

/// Builder for [`Central<Disabled>`].
pub mod builder;
pub mod orchestrator;
pub mod recovery;
pub mod status;

use std::marker::PhantomData;

use log::{debug, info, warn};

use crate::config::CentralConfig;
use crate::gatt::{DiscoveryEngine, DiscoveryStage};
use crate::protocol::RentalMessage;
use crate::recovery::{ConnectionAttemptState, Failure, RecoveryPolicy};
use crate::transport::{AdvReport, ConnState, Transport, TransportEvent, TransportResult};
use crate::types::{Address, ConnHandle, Handle};
use crate::utils::{Clock, bytes_to_hex_spaced, retry_transient};
use crate::{Error, Result};

pub use builder::CentralBuilder;
pub use orchestrator::{ConnectOutcome, DISCONNECT_REASON, Orchestrator, ScanOutcome};
pub use recovery::RecoveryRecord;
pub use status::{CentralStatus, HandleSnapshot};

/// Type-state: configured, stack not brought up.
pub struct Disabled;
/// Type-state: stack up, events can be processed.
pub struct Enabled;

/// Upper bound on events handled by one `process_pending` call.
const MAX_EVENTS_PER_PASS: usize = 1024;

/// BLE central for one RentScan peer, in type-state `State`.
pub struct Central<State = Disabled> {
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
    config: CentralConfig,
    engine: DiscoveryEngine,
    orchestrator: Orchestrator,
    policy: RecoveryPolicy,
    attempts: ConnectionAttemptState,
    last_recovery: Option<RecoveryRecord>,
    fatal: bool,
    message_errors: u32,
    decode_errors: u32,
    messages_received: u64,
    _state: PhantomData<State>,
}

impl<S> Central<S> {
    pub fn config(&self) -> &CentralConfig {
        &self.config
    }

    /// Retry and escalation counters.
    pub fn attempts(&self) -> &ConnectionAttemptState {
        &self.attempts
    }

    /// Discovery state of the current connection.
    pub fn engine(&self) -> &DiscoveryEngine {
        &self.engine
    }

    fn into_state<T>(self) -> Central<T> {
        Central {
            transport: self.transport,
            clock: self.clock,
            config: self.config,
            engine: self.engine,
            orchestrator: self.orchestrator,
            policy: self.policy,
            attempts: self.attempts,
            last_recovery: self.last_recovery,
            fatal: self.fatal,
            message_errors: self.message_errors,
            decode_errors: self.decode_errors,
            messages_received: self.messages_received,
            _state: PhantomData,
        }
    }
}

impl Central<Disabled> {
    pub fn builder() -> CentralBuilder {
        CentralBuilder::new()
    }

    pub(crate) fn new(
        transport: Box<dyn Transport>,
        clock: Box<dyn Clock>,
        config: CentralConfig,
    ) -> Self {
        Self {
            engine: DiscoveryEngine::new(config.uuids, config.discovery),
            orchestrator: Orchestrator::new(&config),
            policy: RecoveryPolicy::new(config.recovery),
            transport,
            clock,
            config,
            attempts: ConnectionAttemptState::new(),
            last_recovery: None,
            fatal: false,
            message_errors: 0,
            decode_errors: 0,
            messages_received: 0,
            _state: PhantomData,
        }
    }

    /// Bring the stack up. Busy errors are retried with the power backoff.
    pub fn enable(mut self) -> Result<Central<Enabled>> {
        let backoff = self.config.power_retry;
        let transport = &mut self.transport;
        retry_transient(&*self.clock, &backoff, "enable", || transport.enable())?;
        info!("bluetooth enabled");
        Ok(self.into_state())
    }
}

impl Central<Enabled> {
    /// Drop every connection and take the stack down.
    pub fn disable(mut self) -> Result<Central<Disabled>> {
        self.teardown_link();
        let backoff = self.config.power_retry;
        let transport = &mut self.transport;
        retry_transient(&*self.clock, &backoff, "disable", || transport.disable())?;
        info!("bluetooth disabled");
        Ok(self.into_state())
    }

    pub fn transport(&self) -> &dyn Transport {
        &*self.transport
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Established connection that a fresh `conn_info` confirms.
    pub fn is_connected(&self) -> bool {
        self.orchestrator.connection().is_some_and(|(conn, _)| {
            self.transport
                .conn_info(conn)
                .is_ok_and(|info| info.state == ConnState::Connected)
        })
    }

    /// Start scanning. A no-op while scanning, connecting or connected.
    /// Scan start that stays busy is handed to recovery.
    pub fn start_scan(&mut self) -> Result<()> {
        self.reap_stale();
        match self
            .orchestrator
            .start_scan(&mut *self.transport, &*self.clock)
        {
            Ok(outcome) => {
                debug!("start scan: {:?}", outcome);
                Ok(())
            }
            Err(e) => {
                warn!("scan start failed: {}", e);
                self.recover(Failure::ScanStart(e)).map(|_| ())
            }
        }
    }

    /// Stop scanning without touching any connection.
    pub fn stop_scan(&mut self) {
        self.orchestrator.stop_scan(&mut *self.transport);
    }

    /// Disconnect the current peer and forget its discovery state.
    pub fn disconnect(&mut self) -> Result<()> {
        let conn = self.orchestrator.forget().ok_or(Error::NotConnected)?;
        self.engine.teardown();
        self.transport.disconnect(conn, DISCONNECT_REASON)?;
        info!("{} disconnected on request", conn);
        Ok(())
    }

    /// Restart scanning if nothing is connected. Called periodically.
    pub fn health_check(&mut self) -> Result<()> {
        if self.is_connected() || self.orchestrator.pending().is_some() {
            return Ok(());
        }
        if !self.orchestrator.is_scanning() {
            info!("health check: not connected, starting scan");
        }
        self.start_scan()
    }

    /// Drain and handle every queued transport event. Returns the decoded
    /// messages received from the peer, oldest first.
    pub fn process_pending(&mut self) -> Result<Vec<RentalMessage>> {
        let mut messages = Vec::new();
        for _ in 0..MAX_EVENTS_PER_PASS {
            let Some(event) = self.transport.poll_event() else {
                break;
            };
            if let Some(msg) = self.handle_event(event)? {
                messages.push(msg);
            }
        }
        Ok(messages)
    }

    /// Handle one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<Option<RentalMessage>> {
        match event {
            TransportEvent::DeviceFound { report } => {
                self.on_device_found(&report)?;
                Ok(None)
            }
            TransportEvent::Connected { conn, result } => {
                self.on_connect_result(conn, result)?;
                Ok(None)
            }
            TransportEvent::Disconnected { conn, reason } => {
                self.on_disconnected(conn, reason)?;
                Ok(None)
            }
            TransportEvent::DiscoveryResult { conn, attr } => {
                let before = self.engine.stage();
                let after = self
                    .engine
                    .on_discovery_result(&mut *self.transport, conn, attr);
                self.on_stage_change(before, after)?;
                Ok(None)
            }
            TransportEvent::SubscribeComplete { conn, result, .. } => {
                let before = self.engine.stage();
                let after = self.engine.on_subscribe_result(conn, result);
                self.on_stage_change(before, after)?;
                Ok(None)
            }
            TransportEvent::Notification {
                conn,
                value_handle,
                data,
            } => Ok(self.on_notification(conn, value_handle, data.as_deref())),
        }
    }

    /// Write a message to the peer's RX characteristic.
    pub fn send_message(&mut self, msg: &RentalMessage) -> Result<()> {
        let (conn, _) = self.orchestrator.connection().ok_or(Error::NotConnected)?;
        let rx = self.engine.handles().rx_value().ok_or(Error::RxHandleUnknown)?;
        self.transport.write_without_response(conn, rx, &msg.encode())?;
        debug!("sent {:?} to {}", msg.cmd, conn);
        Ok(())
    }

    /// Subscribe with explicit handles on the current connection.
    pub fn subscribe_manual(
        &mut self,
        value_handle: Handle,
        ccc_handle: Handle,
    ) -> Result<DiscoveryStage> {
        let before = self.engine.stage();
        let after = self
            .engine
            .subscribe_manual(&mut *self.transport, value_handle, ccc_handle)?;
        self.on_stage_change(before, after)?;
        Ok(after)
    }

    /// Re-issue the recorded subscription if the peer dropped it.
    pub fn resubscribe(&mut self) -> Result<DiscoveryStage> {
        let before = self.engine.stage();
        let after = self.engine.resubscribe(&mut *self.transport)?;
        self.on_stage_change(before, after)?;
        Ok(after)
    }

    /// Add `peer` to the controller allow list.
    pub fn allow_list_add(&mut self, peer: &Address) -> Result<()> {
        self.transport.allow_list_add(peer)?;
        info!("{} added to allow list", peer);
        Ok(())
    }

    pub fn allow_list_clear(&mut self) -> Result<()> {
        self.transport.allow_list_clear()?;
        info!("allow list cleared");
        Ok(())
    }

    /// Count a failed message handler run. Reaching the configured threshold
    /// resets the stack and the counter.
    pub fn record_message_error(&mut self) -> Result<Option<crate::recovery::RecoveryLevel>> {
        self.message_errors += 1;
        if self.message_errors < self.config.message_error_threshold {
            debug!("message error {}/{}", self.message_errors, self.config.message_error_threshold);
            return Ok(None);
        }
        warn!("{} consecutive message errors, resetting", self.message_errors);
        self.message_errors = 0;
        self.recover(Failure::MessageProcessing).map(Some)
    }

    /// A handled message breaks the run of consecutive failures.
    pub fn record_message_ok(&mut self) {
        self.message_errors = 0;
    }

    /// Clear the message and decode error counters.
    pub fn reset_errors(&mut self) {
        self.message_errors = 0;
        self.decode_errors = 0;
        info!("error counters reset");
    }

    fn on_device_found(&mut self, report: &AdvReport) -> Result<()> {
        self.reap_stale();
        match self
            .orchestrator
            .on_device_found(&mut *self.transport, report)
        {
            Ok(Some(_)) => {
                self.attempts.record_target(report.address);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.attempts.record_target(report.address);
                warn!("connect to {} refused: {}", report.address, e);
                self.recover(Failure::ConnectCreate(e)).map(|_| ())
            }
        }
    }

    fn on_connect_result(&mut self, conn: ConnHandle, result: TransportResult<()>) -> Result<()> {
        match self.orchestrator.on_connect_result(conn, result) {
            ConnectOutcome::Connected(addr) => {
                self.attempts.record_connected(addr);
                let before = self.engine.stage();
                let after = self.engine.on_connected(&mut *self.transport, conn);
                self.on_stage_change(before, after)
            }
            ConnectOutcome::Failed { peer, error } => {
                self.attempts.record_target(peer);
                self.recover(Failure::ConnectFailed(error)).map(|_| ())
            }
            ConnectOutcome::Ignored => Ok(()),
        }
    }

    fn on_disconnected(&mut self, conn: ConnHandle, reason: u8) -> Result<()> {
        self.engine.on_disconnected(conn);
        if !self.orchestrator.on_disconnected(conn) {
            debug!("disconnect of untracked {} (reason {:#04x})", conn, reason);
            return Ok(());
        }
        info!("{} disconnected (reason {:#04x})", conn, reason);
        self.engine.teardown();
        self.start_scan()
    }

    fn on_notification(
        &mut self,
        conn: ConnHandle,
        value_handle: Handle,
        data: Option<&[u8]>,
    ) -> Option<RentalMessage> {
        let bytes = self.engine.on_notification(conn, value_handle, data)?;
        match RentalMessage::decode(&bytes) {
            Ok(msg) => {
                self.messages_received += 1;
                debug!("received {:?} for tag {}", msg.cmd, msg.tag_id.to_hex());
                Some(msg)
            }
            Err(e) => {
                self.decode_errors += 1;
                warn!("dropping malformed notification ({} bytes): {}", bytes.len(), e);
                debug!("malformed payload: {}", bytes_to_hex_spaced(&bytes));
                None
            }
        }
    }

    fn on_stage_change(&mut self, before: DiscoveryStage, after: DiscoveryStage) -> Result<()> {
        if before == after {
            return Ok(());
        }
        match after {
            DiscoveryStage::Complete => {
                info!("session established");
                self.attempts.record_session_established();
                self.fatal = false;
                Ok(())
            }
            DiscoveryStage::Failed(failure) => {
                self.recover(Failure::Discovery(failure)).map(|_| ())
            }
            _ => Ok(()),
        }
    }

    /// Drop a connection that died without a disconnect event. Discovery
    /// state goes before the link is touched.
    fn reap_stale(&mut self) {
        let Some(conn) = self.orchestrator.reap_stale(&*self.transport) else {
            return;
        };
        self.engine.teardown();
        if let Err(e) = self.transport.disconnect(conn, DISCONNECT_REASON) {
            debug!("disconnect of dead {}: {}", conn, e);
        }
    }

    /// Discovery state, connection and scanner all cleared, in that order.
    fn teardown_link(&mut self) {
        self.engine.teardown();
        if let Some(conn) = self.orchestrator.forget() {
            if let Err(e) = self.transport.disconnect(conn, DISCONNECT_REASON) {
                debug!("disconnect of {} during teardown: {}", conn, e);
            }
        }
        self.orchestrator.stop_scan(&mut *self.transport);
    }
}
