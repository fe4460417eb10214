// rentscan/src/transport/mock.rs
//! Scripted in-memory transport.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::{
    CCC_UUID, RENTSCAN_RX_UUID, RENTSCAN_SERVICE_UUID, RENTSCAN_TX_UUID, uuid_from_u16,
};
use crate::error::TransportError;
use crate::transport::traits::{
    AdvReport, Attribute, AttributeKind, ConnInfo, ConnParams, ConnState, DiscoverKind,
    DiscoverRequest, ScanParams, SubscribeParams, Transport, TransportEvent, TransportResult,
};
use crate::types::{Address, ConnHandle, Handle};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Enable,
    Disable,
    HardwareReset,
    ScanStart,
    ScanStop,
    ConnectCreate(Address),
    Disconnect(ConnHandle),
    Discover(ConnHandle, DiscoverRequest),
    Subscribe(ConnHandle, SubscribeParams),
    Write(ConnHandle, Handle),
    AllowListAdd(Address),
    AllowListClear,
}

#[derive(Debug)]
struct Cursor {
    conn: ConnHandle,
    req: DiscoverRequest,
    next: usize,
    delivered: bool,
}

/// In-memory transport for unit and integration tests. It serves discovery
/// from a fixed attribute table, records every call, and lets tests script
/// failures and inject peer-side events.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub calls: Vec<Call>,
    /// Payloads written without response, in order.
    pub writes: Vec<(ConnHandle, Handle, Vec<u8>)>,
    pub enabled: bool,
    pub scanning: bool,
    pub hardware_reset_supported: bool,
    /// Discover calls issued while the previous request had delivered nothing.
    /// A request issued after a result supersedes the running procedure, as
    /// [`Transport::discover`] allows, and is not counted.
    pub discovery_races: usize,
    pub allow_list: Vec<Address>,
    attributes: Vec<Attribute>,
    uuid_filter_blind: HashSet<Handle>,
    events: VecDeque<TransportEvent>,
    cursor: Option<Cursor>,
    connections: HashMap<ConnHandle, ConnInfo>,
    subscriptions: HashSet<(ConnHandle, Handle)>,
    next_conn: u16,
    scan_start_failures: VecDeque<TransportError>,
    connect_create_failures: VecDeque<TransportError>,
    connect_outcomes: VecDeque<TransportError>,
    enable_failures: VecDeque<TransportError>,
    disable_failures: VecDeque<TransportError>,
    subscribe_failures: VecDeque<TransportError>,
    discover_failures: VecDeque<TransportError>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            enabled: true,
            next_conn: 1,
            ..Self::default()
        }
    }

    /// RentScan service at 0x10..=0x20: RX declared at 0x11 (value 0x12),
    /// a user description at 0x13, TX declared at 0x14 (value 0x15), CCC at 0x16.
    pub fn with_rentscan_layout() -> Self {
        let mut m = Self::new();
        m.add_attribute(Attribute {
            handle: Handle::new(0x10),
            uuid: RENTSCAN_SERVICE_UUID,
            kind: AttributeKind::Service {
                end_handle: Handle::new(0x20),
            },
        });
        m.add_attribute(Attribute {
            handle: Handle::new(0x11),
            uuid: RENTSCAN_RX_UUID,
            kind: AttributeKind::Characteristic {
                value_handle: Some(Handle::new(0x12)),
            },
        });
        m.add_attribute(Attribute {
            handle: Handle::new(0x13),
            uuid: uuid_from_u16(0x2901),
            kind: AttributeKind::Descriptor,
        });
        m.add_attribute(Attribute {
            handle: Handle::new(0x14),
            uuid: RENTSCAN_TX_UUID,
            kind: AttributeKind::Characteristic {
                value_handle: Some(Handle::new(0x15)),
            },
        });
        m.add_attribute(Attribute {
            handle: Handle::new(0x16),
            uuid: CCC_UUID,
            kind: AttributeKind::Descriptor,
        });
        m
    }

    /// Insert keeping the table sorted by handle.
    pub fn add_attribute(&mut self, attr: Attribute) {
        self.attributes.retain(|a| a.handle != attr.handle);
        let pos = self.attributes.partition_point(|a| a.handle < attr.handle);
        self.attributes.insert(pos, attr);
    }

    pub fn remove_attribute(&mut self, handle: Handle) {
        self.attributes.retain(|a| a.handle != handle);
    }

    /// The attribute is skipped by UUID-filtered discovery but still listed
    /// by unfiltered discovery.
    pub fn hide_from_uuid_filter(&mut self, handle: Handle) {
        self.uuid_filter_blind.insert(handle);
    }

    /// Create an already established connection without queuing events.
    pub fn inject_connection(&mut self, peer: Address) -> ConnHandle {
        let conn = self.alloc_conn();
        self.connections.insert(
            conn,
            ConnInfo {
                peer,
                state: ConnState::Connected,
            },
        );
        conn
    }

    /// Queue a raw event ahead of any discovery results.
    pub fn push_event(&mut self, event: TransportEvent) {
        self.events.push_back(event);
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Queue an advertising report as if the scanner heard it.
    pub fn advertise(&mut self, address: Address, data: Vec<u8>, connectable: bool) {
        self.push_event(TransportEvent::DeviceFound {
            report: AdvReport {
                address,
                rssi: -60,
                connectable,
                data,
            },
        });
    }

    /// Peer sends a notification. Delivered only while subscribed, like a real link.
    pub fn notify(&mut self, conn: ConnHandle, value_handle: Handle, data: &[u8]) {
        if self.subscriptions.contains(&(conn, value_handle)) {
            self.push_event(TransportEvent::Notification {
                conn,
                value_handle,
                data: Some(data.to_vec()),
            });
        }
    }

    /// Peer clears its CCC: the stack reports an empty notification.
    pub fn peer_unsubscribe(&mut self, conn: ConnHandle, value_handle: Handle) {
        self.subscriptions.remove(&(conn, value_handle));
        self.push_event(TransportEvent::Notification {
            conn,
            value_handle,
            data: None,
        });
    }

    /// Link loss initiated by the peer or the radio.
    pub fn drop_link(&mut self, conn: ConnHandle, reason: u8) {
        self.forget(conn);
        self.push_event(TransportEvent::Disconnected { conn, reason });
    }

    /// Queue an error for the next `scan_start`.
    pub fn fail_scan_start(&mut self, err: TransportError) {
        self.scan_start_failures.push_back(err);
    }

    /// Queue an error for the next `connect_create` call itself.
    pub fn fail_connect_create(&mut self, err: TransportError) {
        self.connect_create_failures.push_back(err);
    }

    /// The next created connection completes with `err`.
    pub fn fail_connect(&mut self, err: TransportError) {
        self.connect_outcomes.push_back(err);
    }

    pub fn fail_enable(&mut self, err: TransportError) {
        self.enable_failures.push_back(err);
    }

    pub fn fail_disable(&mut self, err: TransportError) {
        self.disable_failures.push_back(err);
    }

    /// Queue a synchronous error for the next `subscribe`.
    pub fn fail_subscribe(&mut self, err: TransportError) {
        self.subscribe_failures.push_back(err);
    }

    pub fn fail_discover(&mut self, err: TransportError) {
        self.discover_failures.push_back(err);
    }

    pub fn is_subscribed(&self, conn: ConnHandle, value_handle: Handle) -> bool {
        self.subscriptions.contains(&(conn, value_handle))
    }

    /// Active subscriptions across all connections.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Every discovery request issued so far, in order.
    pub fn discover_requests(&self) -> Vec<DiscoverRequest> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Discover(_, req) => Some(*req),
                _ => None,
            })
            .collect()
    }

    pub fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, Call::Subscribe(..)))
    }

    /// Wrap in a shared handle so a test can keep inspecting the mock after
    /// handing it to a `Central`.
    pub fn into_shared(self) -> SharedMockTransport {
        SharedMockTransport(Arc::new(Mutex::new(self)))
    }

    fn alloc_conn(&mut self) -> ConnHandle {
        let conn = ConnHandle::new(self.next_conn);
        self.next_conn = self.next_conn.wrapping_add(1).max(1);
        conn
    }

    fn forget(&mut self, conn: ConnHandle) {
        self.connections.remove(&conn);
        self.subscriptions.retain(|(c, _)| *c != conn);
        if self.cursor.as_ref().is_some_and(|c| c.conn == conn) {
            self.cursor = None;
        }
    }

    fn drop_everything(&mut self) {
        self.connections.clear();
        self.subscriptions.clear();
        self.cursor = None;
        self.events.clear();
        self.scanning = false;
    }

    fn require_connected(&self, conn: ConnHandle) -> TransportResult<()> {
        match self.connections.get(&conn) {
            Some(info) if info.state == ConnState::Connected => Ok(()),
            _ => Err(TransportError::NotConnected),
        }
    }

    fn attribute_matches(&self, attr: &Attribute, req: &DiscoverRequest) -> bool {
        let kind_ok = matches!(
            (req.kind, attr.kind),
            (DiscoverKind::Primary, AttributeKind::Service { .. })
                | (DiscoverKind::Characteristic, AttributeKind::Characteristic { .. })
                | (DiscoverKind::Descriptor, AttributeKind::Descriptor)
        );
        let uuid_ok = match req.uuid {
            None => true,
            Some(u) => u == attr.uuid && !self.uuid_filter_blind.contains(&attr.handle),
        };
        kind_ok && uuid_ok && (req.start..=req.end).contains(&attr.handle)
    }

    fn next_discovery_result(&mut self) -> Option<TransportEvent> {
        let cursor = self.cursor.as_ref()?;
        let (conn, req, start) = (cursor.conn, cursor.req, cursor.next);
        let found = self.attributes[start.min(self.attributes.len())..]
            .iter()
            .position(|a| self.attribute_matches(a, &req))
            .map(|offset| start + offset);

        match found {
            Some(idx) => {
                let attr = self.attributes[idx];
                if let Some(c) = self.cursor.as_mut() {
                    c.next = idx + 1;
                    c.delivered = true;
                }
                Some(TransportEvent::DiscoveryResult {
                    conn,
                    attr: Some(attr),
                })
            }
            None => {
                self.cursor = None;
                Some(TransportEvent::DiscoveryResult { conn, attr: None })
            }
        }
    }
}

impl Transport for MockTransport {
    fn enable(&mut self) -> TransportResult<()> {
        self.calls.push(Call::Enable);
        if let Some(err) = self.enable_failures.pop_front() {
            return Err(err);
        }
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> TransportResult<()> {
        self.calls.push(Call::Disable);
        if let Some(err) = self.disable_failures.pop_front() {
            return Err(err);
        }
        self.drop_everything();
        self.enabled = false;
        Ok(())
    }

    fn hardware_reset(&mut self) -> TransportResult<()> {
        self.calls.push(Call::HardwareReset);
        if !self.hardware_reset_supported {
            return Err(TransportError::NotSupported);
        }
        self.drop_everything();
        self.enabled = true;
        Ok(())
    }

    fn scan_start(&mut self, _params: &ScanParams) -> TransportResult<()> {
        self.calls.push(Call::ScanStart);
        if let Some(err) = self.scan_start_failures.pop_front() {
            return Err(err);
        }
        if !self.enabled {
            return Err(TransportError::NotSupported);
        }
        self.scanning = true;
        Ok(())
    }

    fn scan_stop(&mut self) -> TransportResult<()> {
        self.calls.push(Call::ScanStop);
        self.scanning = false;
        Ok(())
    }

    fn connect_create(
        &mut self,
        peer: &Address,
        _params: &ConnParams,
    ) -> TransportResult<ConnHandle> {
        self.calls.push(Call::ConnectCreate(*peer));
        if let Some(err) = self.connect_create_failures.pop_front() {
            return Err(err);
        }
        let conn = self.alloc_conn();
        self.connections.insert(
            conn,
            ConnInfo {
                peer: *peer,
                state: ConnState::Connecting,
            },
        );
        let result = match self.connect_outcomes.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        self.push_event(TransportEvent::Connected { conn, result });
        Ok(conn)
    }

    fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> TransportResult<()> {
        self.calls.push(Call::Disconnect(conn));
        if !self.connections.contains_key(&conn) {
            return Err(TransportError::NotConnected);
        }
        self.forget(conn);
        self.push_event(TransportEvent::Disconnected { conn, reason });
        Ok(())
    }

    fn conn_info(&self, conn: ConnHandle) -> TransportResult<ConnInfo> {
        self.connections
            .get(&conn)
            .copied()
            .ok_or(TransportError::NotConnected)
    }

    fn conn_lookup(&self, peer: &Address) -> Option<ConnHandle> {
        self.connections
            .iter()
            .filter(|(_, info)| info.peer == *peer)
            .map(|(conn, _)| *conn)
            .min()
    }

    fn discover(&mut self, conn: ConnHandle, req: &DiscoverRequest) -> TransportResult<()> {
        self.calls.push(Call::Discover(conn, *req));
        if let Some(err) = self.discover_failures.pop_front() {
            return Err(err);
        }
        self.require_connected(conn)?;
        if req.start > req.end {
            return Err(TransportError::InvalidArgument);
        }
        if self.cursor.as_ref().is_some_and(|c| !c.delivered) {
            self.discovery_races += 1;
        }
        self.cursor = Some(Cursor {
            conn,
            req: *req,
            next: 0,
            delivered: false,
        });
        Ok(())
    }

    fn subscribe(&mut self, conn: ConnHandle, params: &SubscribeParams) -> TransportResult<()> {
        self.calls.push(Call::Subscribe(conn, *params));
        if let Some(err) = self.subscribe_failures.pop_front() {
            return Err(err);
        }
        self.require_connected(conn)?;
        if !self.subscriptions.insert((conn, params.value_handle)) {
            return Err(TransportError::AlreadySubscribed);
        }
        self.push_event(TransportEvent::SubscribeComplete {
            conn,
            value_handle: params.value_handle,
            result: Ok(()),
        });
        Ok(())
    }

    fn write_without_response(
        &mut self,
        conn: ConnHandle,
        handle: Handle,
        data: &[u8],
    ) -> TransportResult<()> {
        self.calls.push(Call::Write(conn, handle));
        self.require_connected(conn)?;
        self.writes.push((conn, handle, data.to_vec()));
        Ok(())
    }

    fn allow_list_add(&mut self, peer: &Address) -> TransportResult<()> {
        self.calls.push(Call::AllowListAdd(*peer));
        if !self.allow_list.contains(peer) {
            self.allow_list.push(*peer);
        }
        Ok(())
    }

    fn allow_list_clear(&mut self) -> TransportResult<()> {
        self.calls.push(Call::AllowListClear);
        self.allow_list.clear();
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        let event = match self.events.pop_front() {
            Some(ev) => ev,
            None => self.next_discovery_result()?,
        };
        if let TransportEvent::Connected { conn, result } = &event {
            match result {
                Ok(()) => {
                    if let Some(info) = self.connections.get_mut(conn) {
                        info.state = ConnState::Connected;
                    }
                }
                Err(_) => {
                    self.connections.remove(conn);
                }
            }
        }
        Some(event)
    }
}

/// Cloneable handle to a [`MockTransport`]. One clone goes into the central,
/// the test keeps another for assertions and event injection.
#[derive(Debug, Clone)]
pub struct SharedMockTransport(Arc<Mutex<MockTransport>>);

impl SharedMockTransport {
    /// Lock the shared mock. A poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, MockTransport> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for SharedMockTransport {
    fn enable(&mut self) -> TransportResult<()> {
        self.lock().enable()
    }

    fn disable(&mut self) -> TransportResult<()> {
        self.lock().disable()
    }

    fn hardware_reset(&mut self) -> TransportResult<()> {
        self.lock().hardware_reset()
    }

    fn scan_start(&mut self, params: &ScanParams) -> TransportResult<()> {
        self.lock().scan_start(params)
    }

    fn scan_stop(&mut self) -> TransportResult<()> {
        self.lock().scan_stop()
    }

    fn connect_create(
        &mut self,
        peer: &Address,
        params: &ConnParams,
    ) -> TransportResult<ConnHandle> {
        self.lock().connect_create(peer, params)
    }

    fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> TransportResult<()> {
        self.lock().disconnect(conn, reason)
    }

    fn conn_info(&self, conn: ConnHandle) -> TransportResult<ConnInfo> {
        self.lock().conn_info(conn)
    }

    fn conn_lookup(&self, peer: &Address) -> Option<ConnHandle> {
        self.lock().conn_lookup(peer)
    }

    fn discover(&mut self, conn: ConnHandle, req: &DiscoverRequest) -> TransportResult<()> {
        self.lock().discover(conn, req)
    }

    fn subscribe(&mut self, conn: ConnHandle, params: &SubscribeParams) -> TransportResult<()> {
        self.lock().subscribe(conn, params)
    }

    fn write_without_response(
        &mut self,
        conn: ConnHandle,
        handle: Handle,
        data: &[u8],
    ) -> TransportResult<()> {
        self.lock().write_without_response(conn, handle, data)
    }

    fn allow_list_add(&mut self, peer: &Address) -> TransportResult<()> {
        self.lock().allow_list_add(peer)
    }

    fn allow_list_clear(&mut self) -> TransportResult<()> {
        self.lock().allow_list_clear()
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.lock().poll_event()
    }
}
