// rentscan/src/gatt/discovery.rs
//! Staged GATT discovery and subscription for one connection.
//!
//! The engine walks service → RX characteristic → TX characteristic → CCC
//! descriptor → subscribe, one request at a time. Every completion from the
//! transport comes back through [`DiscoveryEngine::on_discovery_result`] or
//! [`DiscoveryEngine::on_subscribe_result`]; results for any connection other
//! than the tracked one are dropped without touching state.
//!
//! A match starts the next procedure at once. [`Transport::discover`]
//! guarantees the superseded procedure delivers nothing more, so the next
//! `attr: None` always belongs to the request just issued.

use log::{debug, info, warn};

use crate::config::{DiscoveryConfig, ServiceUuids};
use crate::constants::CCC_UUID;
use crate::error::TransportError;
use crate::gatt::handles::{HandleTable, ServiceHandleRange, SubscriptionPhase, SubscriptionState};
use crate::transport::{
    Attribute, AttributeKind, DiscoverKind, DiscoverRequest, SubscribeParams, Transport,
};
use crate::types::{ConnHandle, Handle};
use crate::{Error, Result};

/// Why discovery stopped short of an active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DiscoveryFailure {
    ServiceNotFound,
    RxNotFound,
    TxNotFound,
    CccNotFound,
    SubscribeFailed,
    /// The transport refused to start a discovery procedure.
    RequestRejected,
}

/// Where discovery stands on the tracked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DiscoveryStage {
    #[default]
    Idle,
    FindingService,
    FindingRxChar,
    FindingTxChar,
    FindingCcc,
    Subscribing,
    Complete,
    Failed(DiscoveryFailure),
}

impl DiscoveryStage {
    /// `Complete` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DiscoveryStage::Complete | DiscoveryStage::Failed(_))
    }

    pub fn failure(&self) -> Option<DiscoveryFailure> {
        match self {
            DiscoveryStage::Failed(f) => Some(*f),
            _ => None,
        }
    }
}

/// Staged discovery for one connection at a time. Owns the handle table;
/// other components reset it only through [`DiscoveryEngine::teardown`].
pub struct DiscoveryEngine {
    uuids: ServiceUuids,
    config: DiscoveryConfig,
    stage: DiscoveryStage,
    conn: Option<ConnHandle>,
    table: HandleTable,
    outstanding: u8,
    unfiltered_retry_used: bool,
    canonical_ccc_exhausted: bool,
}

impl DiscoveryEngine {
    pub fn new(uuids: ServiceUuids, config: DiscoveryConfig) -> Self {
        Self {
            uuids,
            config,
            stage: DiscoveryStage::Idle,
            conn: None,
            table: HandleTable::new(),
            outstanding: 0,
            unfiltered_retry_used: false,
            canonical_ccc_exhausted: false,
        }
    }

    pub fn stage(&self) -> DiscoveryStage {
        self.stage
    }

    /// Connection whose results are currently accepted.
    pub fn conn(&self) -> Option<ConnHandle> {
        self.conn
    }

    pub fn handles(&self) -> &HandleTable {
        &self.table
    }

    /// Discovery procedures started and not yet finished. Never above one.
    pub fn outstanding_requests(&self) -> u8 {
        self.outstanding
    }

    /// CCC discovery came back empty, so the guessed fallback is allowed.
    pub fn canonical_ccc_exhausted(&self) -> bool {
        self.canonical_ccc_exhausted
    }

    /// The active subscription uses a guessed CCC handle.
    pub fn is_degraded(&self) -> bool {
        self.table.subscription().is_some_and(|s| s.degraded)
    }

    /// Drop all per-connection state and return to `Idle`.
    pub fn teardown(&mut self) {
        if self.stage != DiscoveryStage::Idle || self.conn.is_some() {
            debug!("discovery teardown from {:?}", self.stage);
        }
        self.stage = DiscoveryStage::Idle;
        self.conn = None;
        self.table.clear();
        self.outstanding = 0;
        self.unfiltered_retry_used = false;
        self.canonical_ccc_exhausted = false;
    }

    /// Start discovery on a freshly established connection.
    pub fn on_connected(
        &mut self,
        transport: &mut dyn Transport,
        conn: ConnHandle,
    ) -> DiscoveryStage {
        self.teardown();
        self.conn = Some(conn);
        info!("{}: discovering service {}", conn, self.uuids.service);
        let req = DiscoverRequest {
            kind: DiscoverKind::Primary,
            uuid: Some(self.uuids.service),
            start: Handle::FIRST,
            end: Handle::LAST,
        };
        self.request(transport, req, DiscoveryStage::FindingService)
    }

    /// Feed one discovery result. `None` means the running procedure is exhausted.
    pub fn on_discovery_result(
        &mut self,
        transport: &mut dyn Transport,
        conn: ConnHandle,
        attr: Option<Attribute>,
    ) -> DiscoveryStage {
        if self.conn != Some(conn) {
            debug!("ignoring discovery result for stale {}", conn);
            return self.stage;
        }
        if attr.is_none() {
            self.outstanding = 0;
        }

        match self.stage {
            DiscoveryStage::FindingService => self.on_service(transport, attr),
            DiscoveryStage::FindingRxChar => self.on_rx_char(transport, attr),
            DiscoveryStage::FindingTxChar => self.on_tx_char(transport, attr),
            DiscoveryStage::FindingCcc => self.on_ccc(transport, attr),
            stage => {
                debug!("{}: discovery result ignored in {:?}", conn, stage);
                stage
            }
        }
    }

    /// Completion of a subscribe request.
    pub fn on_subscribe_result(
        &mut self,
        conn: ConnHandle,
        result: std::result::Result<(), TransportError>,
    ) -> DiscoveryStage {
        if self.conn != Some(conn) {
            debug!("ignoring subscribe result for stale {}", conn);
            return self.stage;
        }
        match (self.stage, result) {
            (DiscoveryStage::Subscribing | DiscoveryStage::Complete, Ok(()))
            | (
                DiscoveryStage::Subscribing | DiscoveryStage::Complete,
                Err(TransportError::AlreadySubscribed),
            ) => self.mark_subscribed(),
            (DiscoveryStage::Subscribing | DiscoveryStage::Complete, Err(e)) => {
                warn!("{}: subscribe failed: {}", conn, e);
                if let Some(sub) = self.table.subscription_mut() {
                    sub.phase = SubscriptionPhase::Unsubscribed;
                }
                self.fail(DiscoveryFailure::SubscribeFailed)
            }
            (stage, _) => {
                debug!("{}: subscribe result ignored in {:?}", conn, stage);
                stage
            }
        }
    }

    /// Subscribe with `tx_value + offset` as the CCC. Only allowed once
    /// canonical CCC discovery has come back empty on this connection.
    pub fn subscribe_best_guess(
        &mut self,
        transport: &mut dyn Transport,
    ) -> Result<DiscoveryStage> {
        if !self.canonical_ccc_exhausted {
            return Err(Error::FallbackNotPermitted);
        }
        let offset = self
            .config
            .ccc_fallback_offset
            .ok_or(Error::FallbackNotPermitted)?;
        let tx = self.table.tx_value().ok_or(Error::NotConnected)?;
        let ccc = tx.offset(offset).ok_or(Error::FallbackNotPermitted)?;
        warn!(
            "ccc not discovered, subscribing with guessed ccc {} (tx {} + {})",
            ccc, tx, offset
        );
        Ok(self.subscribe(transport, tx, ccc, true))
    }

    /// Subscribe with caller-supplied handles. Used for manual recovery from the shell.
    pub fn subscribe_manual(
        &mut self,
        transport: &mut dyn Transport,
        value_handle: Handle,
        ccc_handle: Handle,
    ) -> Result<DiscoveryStage> {
        if self.conn.is_none() {
            return Err(Error::NotConnected);
        }
        let degraded = self.table.ccc() != Some(ccc_handle);
        info!("manual subscribe tx {} ccc {}", value_handle, ccc_handle);
        Ok(self.subscribe(transport, value_handle, ccc_handle, degraded))
    }

    /// Re-issue the recorded subscription. A no-op while it is active or in flight.
    pub fn resubscribe(&mut self, transport: &mut dyn Transport) -> Result<DiscoveryStage> {
        if self.conn.is_none() {
            return Err(Error::NotConnected);
        }
        let sub = *self.table.subscription().ok_or(Error::NoSubscription)?;
        if sub.phase != SubscriptionPhase::Unsubscribed {
            debug!("resubscribe skipped, subscription {:?}", sub.phase);
            return Ok(self.stage);
        }
        Ok(self.subscribe(transport, sub.value_handle, sub.ccc_handle, sub.degraded))
    }

    /// Filter an incoming notification. Returns the payload only for an
    /// active subscription on the tracked connection. A `None` payload is the
    /// peer turning notifications off.
    pub fn on_notification(
        &mut self,
        conn: ConnHandle,
        value_handle: Handle,
        data: Option<&[u8]>,
    ) -> Option<Vec<u8>> {
        if self.conn != Some(conn) {
            debug!("dropping notification from stale {}", conn);
            return None;
        }
        let sub = self.table.subscription_mut()?;
        if sub.value_handle != value_handle {
            debug!("dropping notification on unexpected handle {}", value_handle);
            return None;
        }
        match data {
            None => {
                info!("{}: peer unsubscribed from {}", conn, value_handle);
                sub.phase = SubscriptionPhase::Unsubscribed;
                None
            }
            Some(_) if !sub.is_active() => None,
            Some(bytes) => Some(bytes.to_vec()),
        }
    }

    /// Reset if `conn` is the tracked connection, or nothing is tracked.
    pub fn on_disconnected(&mut self, conn: ConnHandle) {
        match self.conn {
            Some(tracked) if tracked != conn => {
                debug!("ignoring disconnect of untracked {}", conn);
            }
            _ => self.teardown(),
        }
    }

    fn on_service(
        &mut self,
        transport: &mut dyn Transport,
        attr: Option<Attribute>,
    ) -> DiscoveryStage {
        let Some(attr) = attr else {
            return self.fail(DiscoveryFailure::ServiceNotFound);
        };
        let AttributeKind::Service { end_handle } = attr.kind else {
            return self.stage;
        };
        if attr.uuid != self.uuids.service {
            return self.stage;
        }

        let range = match ServiceHandleRange::new(attr.handle, end_handle) {
            Ok(r) => r,
            Err(e) => {
                warn!("service declaration unusable: {}", e);
                return self.fail(DiscoveryFailure::ServiceNotFound);
            }
        };
        if self.table.set_range(range).is_err() {
            return self.fail(DiscoveryFailure::ServiceNotFound);
        }
        info!("service found, handles {}..{}", range.start(), range.end());
        self.outstanding = 0;

        let Some(start) = range.start().next() else {
            return self.fail(DiscoveryFailure::RxNotFound);
        };
        let req = self.char_request(Some(self.uuids.rx), start, range.end());
        self.request(transport, req, DiscoveryStage::FindingRxChar)
    }

    fn on_rx_char(
        &mut self,
        transport: &mut dyn Transport,
        attr: Option<Attribute>,
    ) -> DiscoveryStage {
        let Some(range) = self.table.range() else {
            return self.fail(DiscoveryFailure::ServiceNotFound);
        };
        let Some(attr) = attr else {
            if self.config.unfiltered_char_retry && !self.unfiltered_retry_used {
                self.unfiltered_retry_used = true;
                warn!("rx characteristic not found by uuid, listing all characteristics");
                let Some(start) = range.start().next() else {
                    return self.fail(DiscoveryFailure::RxNotFound);
                };
                let req = self.char_request(None, start, range.end());
                return self.request(transport, req, DiscoveryStage::FindingRxChar);
            }
            return self.fail(DiscoveryFailure::RxNotFound);
        };
        let Some(value) = self.characteristic_value(&attr, self.uuids.rx, &range) else {
            return self.stage;
        };
        if self.table.characteristics_mut().set_rx(value).is_err() {
            return self.stage;
        }
        info!("rx characteristic value handle {}", value);
        self.outstanding = 0;

        let Some(start) = attr.handle.next() else {
            return self.fail(DiscoveryFailure::TxNotFound);
        };
        let req = self.char_request(Some(self.uuids.tx), start, range.end());
        self.request(transport, req, DiscoveryStage::FindingTxChar)
    }

    fn on_tx_char(
        &mut self,
        transport: &mut dyn Transport,
        attr: Option<Attribute>,
    ) -> DiscoveryStage {
        let Some(range) = self.table.range() else {
            return self.fail(DiscoveryFailure::ServiceNotFound);
        };
        let Some(attr) = attr else {
            return self.fail(DiscoveryFailure::TxNotFound);
        };
        let Some(value) = self.characteristic_value(&attr, self.uuids.tx, &range) else {
            return self.stage;
        };
        if self.table.characteristics_mut().set_tx(value).is_err() {
            return self.stage;
        }
        info!("tx characteristic value handle {}", value);
        self.outstanding = 0;

        match value.next() {
            Some(start) if start <= range.end() => {
                let req = DiscoverRequest {
                    kind: DiscoverKind::Descriptor,
                    uuid: Some(CCC_UUID),
                    start,
                    end: range.end(),
                };
                self.request(transport, req, DiscoveryStage::FindingCcc)
            }
            // TX value is the last attribute of the service: no room for a CCC.
            _ => {
                self.stage = DiscoveryStage::FindingCcc;
                self.ccc_exhausted(transport)
            }
        }
    }

    fn on_ccc(&mut self, transport: &mut dyn Transport, attr: Option<Attribute>) -> DiscoveryStage {
        let Some(attr) = attr else {
            return self.ccc_exhausted(transport);
        };
        if attr.kind != AttributeKind::Descriptor || attr.uuid != CCC_UUID {
            return self.stage;
        }
        let Some(tx) = self.table.tx_value() else {
            return self.fail(DiscoveryFailure::TxNotFound);
        };
        if self.table.set_ccc(attr.handle).is_err() {
            return self.stage;
        }
        info!("ccc descriptor handle {}", attr.handle);
        self.outstanding = 0;
        self.subscribe(transport, tx, attr.handle, false)
    }

    fn ccc_exhausted(&mut self, transport: &mut dyn Transport) -> DiscoveryStage {
        self.canonical_ccc_exhausted = true;
        if self.config.ccc_fallback_offset.is_none() {
            return self.fail(DiscoveryFailure::CccNotFound);
        }
        match self.subscribe_best_guess(transport) {
            Ok(stage) => stage,
            Err(e) => {
                warn!("ccc fallback unavailable: {}", e);
                self.fail(DiscoveryFailure::CccNotFound)
            }
        }
    }

    fn subscribe(
        &mut self,
        transport: &mut dyn Transport,
        value_handle: Handle,
        ccc_handle: Handle,
        degraded: bool,
    ) -> DiscoveryStage {
        let Some(conn) = self.conn else {
            return self.stage;
        };
        if let Some(existing) = self.table.subscription() {
            if existing.value_handle == value_handle
                && existing.ccc_handle == ccc_handle
                && existing.phase != SubscriptionPhase::Unsubscribed
            {
                debug!("subscription on {} already {:?}", value_handle, existing.phase);
                return self.stage;
            }
        }

        let mut sub = SubscriptionState::new(value_handle, ccc_handle, self.config.notify_kind);
        sub.degraded = degraded;
        sub.phase = SubscriptionPhase::Subscribing;
        self.table.set_subscription(sub);
        self.set_stage(DiscoveryStage::Subscribing);

        let params = SubscribeParams {
            value_handle,
            ccc_handle,
            kind: self.config.notify_kind,
        };
        match transport.subscribe(conn, &params) {
            Ok(()) => self.stage,
            Err(TransportError::AlreadySubscribed) => self.mark_subscribed(),
            Err(e) => {
                warn!("{}: subscribe request rejected: {}", conn, e);
                if let Some(sub) = self.table.subscription_mut() {
                    sub.phase = SubscriptionPhase::Unsubscribed;
                }
                self.fail(DiscoveryFailure::SubscribeFailed)
            }
        }
    }

    fn mark_subscribed(&mut self) -> DiscoveryStage {
        if let Some(sub) = self.table.subscription_mut() {
            sub.phase = SubscriptionPhase::Subscribed;
            if sub.degraded {
                warn!(
                    "subscribed to {} through guessed ccc {}",
                    sub.value_handle, sub.ccc_handle
                );
            } else {
                info!("subscribed to {} (ccc {})", sub.value_handle, sub.ccc_handle);
            }
        }
        self.set_stage(DiscoveryStage::Complete)
    }

    fn characteristic_value(
        &self,
        attr: &Attribute,
        uuid: uuid::Uuid,
        range: &ServiceHandleRange,
    ) -> Option<Handle> {
        let AttributeKind::Characteristic { value_handle } = attr.kind else {
            return None;
        };
        if attr.uuid != uuid || !range.contains(attr.handle) {
            return None;
        }
        value_handle.or_else(|| attr.handle.next())
    }

    fn char_request(
        &self,
        uuid: Option<uuid::Uuid>,
        start: Handle,
        end: Handle,
    ) -> DiscoverRequest {
        DiscoverRequest {
            kind: DiscoverKind::Characteristic,
            uuid,
            start,
            end,
        }
    }

    fn request(
        &mut self,
        transport: &mut dyn Transport,
        req: DiscoverRequest,
        next: DiscoveryStage,
    ) -> DiscoveryStage {
        let Some(conn) = self.conn else {
            return self.stage;
        };
        debug_assert_eq!(self.outstanding, 0, "discovery request already in flight");
        match transport.discover(conn, &req) {
            Ok(()) => {
                self.outstanding = 1;
                self.set_stage(next)
            }
            Err(e) => {
                warn!("{}: {:?} discovery rejected: {}", conn, req.kind, e);
                self.fail(DiscoveryFailure::RequestRejected)
            }
        }
    }

    fn set_stage(&mut self, stage: DiscoveryStage) -> DiscoveryStage {
        if self.stage != stage {
            debug!("discovery {:?} -> {:?}", self.stage, stage);
            self.stage = stage;
        }
        stage
    }

    fn fail(&mut self, failure: DiscoveryFailure) -> DiscoveryStage {
        warn!("discovery failed: {:?}", failure);
        self.outstanding = 0;
        self.set_stage(DiscoveryStage::Failed(failure))
    }
}
