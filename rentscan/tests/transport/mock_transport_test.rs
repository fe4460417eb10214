use rentscan::transport::mock::Call;
use rentscan::transport::{
    ConnParams, ConnState, MockTransport, ScanParams, SubscribeParams, Transport, TransportEvent,
};
use rentscan::{Handle, NotifyKind, TransportError};

use crate::common::fixtures;

fn sub(value: u16) -> SubscribeParams {
    SubscribeParams {
        value_handle: Handle::new(value),
        ccc_handle: Handle::new(value + 1),
        kind: NotifyKind::Notify,
    }
}

#[test]
fn connect_create_completes_on_poll() -> anyhow::Result<()> {
    let mut m = MockTransport::new();
    let conn = m.connect_create(&fixtures::fixture_peer(), &ConnParams::default())?;
    assert_eq!(m.conn_info(conn)?.state, ConnState::Connecting);
    assert_eq!(
        m.poll_event(),
        Some(TransportEvent::Connected { conn, result: Ok(()) })
    );
    assert_eq!(m.conn_info(conn)?.state, ConnState::Connected);
    assert_eq!(m.conn_info(conn)?.peer, fixtures::fixture_peer());
    Ok(())
}

#[test]
fn duplicate_subscribe_reports_already_subscribed() -> anyhow::Result<()> {
    let mut m = MockTransport::new();
    let conn = m.inject_connection(fixtures::fixture_peer());
    m.subscribe(conn, &sub(0x15))?;
    assert_eq!(
        m.subscribe(conn, &sub(0x15)),
        Err(TransportError::AlreadySubscribed)
    );
    assert_eq!(m.subscription_count(), 1);
    Ok(())
}

#[test]
fn notifications_flow_only_while_subscribed() -> anyhow::Result<()> {
    let mut m = MockTransport::new();
    let conn = m.inject_connection(fixtures::fixture_peer());
    m.notify(conn, Handle::new(0x15), &[1]);
    assert_eq!(m.pending_events(), 0);

    m.subscribe(conn, &sub(0x15))?;
    m.poll_event();
    m.notify(conn, Handle::new(0x15), &[1]);
    assert_eq!(m.pending_events(), 1);
    Ok(())
}

#[test]
fn disable_forgets_links_and_scanner() -> anyhow::Result<()> {
    let mut m = MockTransport::with_rentscan_layout();
    m.scan_start(&ScanParams::default())?;
    let conn = m.inject_connection(fixtures::fixture_peer());
    m.subscribe(conn, &sub(0x15))?;
    m.disable()?;
    assert!(!m.scanning);
    assert_eq!(m.connection_count(), 0);
    assert_eq!(m.subscription_count(), 0);
    assert_eq!(m.pending_events(), 0);
    assert_eq!(m.scan_start(&ScanParams::default()), Err(TransportError::NotSupported));
    Ok(())
}

#[test]
fn scripted_failures_are_consumed_in_order() {
    let mut m = MockTransport::new();
    m.fail_scan_start(TransportError::Busy);
    m.fail_scan_start(TransportError::NoMemory);
    let params = ScanParams::default();
    assert_eq!(m.scan_start(&params), Err(TransportError::Busy));
    assert_eq!(m.scan_start(&params), Err(TransportError::NoMemory));
    assert_eq!(m.scan_start(&params), Ok(()));
    assert_eq!(m.count_calls(|c| *c == Call::ScanStart), 3);
}

#[test]
fn shared_handle_sees_calls_made_through_clone() -> anyhow::Result<()> {
    let shared = MockTransport::new().into_shared();
    let mut boxed: Box<dyn Transport> = Box::new(shared.clone());
    boxed.allow_list_add(&fixtures::fixture_peer())?;
    boxed.allow_list_add(&fixtures::fixture_peer())?;
    assert_eq!(shared.lock().allow_list, vec![fixtures::fixture_peer()]);
    boxed.allow_list_clear()?;
    assert!(shared.lock().allow_list.is_empty());
    Ok(())
}
