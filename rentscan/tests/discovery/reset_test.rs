use rentscan::config::{DiscoveryConfig, ServiceUuids};
use rentscan::gatt::DiscoveryEngine;
use rentscan::test_support::{fixture_peer, run_discovery};
use rentscan::transport::{MockTransport, Transport, TransportEvent};
use rentscan::{ConnHandle, DiscoveryFailure, DiscoveryStage, Handle};

fn engine() -> DiscoveryEngine {
    DiscoveryEngine::new(ServiceUuids::default(), DiscoveryConfig::default())
}

/// Feed events one at a time until the engine reaches `target`.
fn advance_to(engine: &mut DiscoveryEngine, mock: &mut MockTransport, target: DiscoveryStage) {
    while engine.stage() != target {
        assert!(engine.outstanding_requests() <= 1);
        match mock.poll_event() {
            Some(TransportEvent::DiscoveryResult { conn, attr }) => {
                engine.on_discovery_result(mock, conn, attr);
            }
            Some(TransportEvent::SubscribeComplete { conn, result, .. }) => {
                engine.on_subscribe_result(conn, result);
            }
            Some(_) => {}
            None => panic!("ran dry in {:?} before {:?}", engine.stage(), target),
        }
    }
}

fn assert_pristine(engine: &DiscoveryEngine) {
    assert_eq!(engine.stage(), DiscoveryStage::Idle);
    assert_eq!(engine.conn(), None);
    assert!(engine.handles().is_empty());
    assert_eq!(engine.outstanding_requests(), 0);
    assert!(!engine.canonical_ccc_exhausted());
    assert!(!engine.is_degraded());
}

fn connected() -> (MockTransport, ConnHandle) {
    let mut mock = MockTransport::with_rentscan_layout();
    let conn = mock.inject_connection(fixture_peer());
    (mock, conn)
}

#[test]
fn disconnect_in_every_stage_resets_everything() {
    let stages = [
        DiscoveryStage::FindingService,
        DiscoveryStage::FindingRxChar,
        DiscoveryStage::FindingTxChar,
        DiscoveryStage::FindingCcc,
        DiscoveryStage::Subscribing,
        DiscoveryStage::Complete,
    ];
    for stage in stages {
        let (mut mock, conn) = connected();
        let mut e = engine();
        e.on_connected(&mut mock, conn);
        advance_to(&mut e, &mut mock, stage);
        e.on_disconnected(conn);
        assert_pristine(&e);
    }
}

#[test]
fn disconnect_after_failure_resets_everything() {
    let mut mock = MockTransport::new();
    let conn = mock.inject_connection(fixture_peer());
    let mut e = engine();
    e.on_connected(&mut mock, conn);
    assert_eq!(
        run_discovery(&mut e, &mut mock),
        DiscoveryStage::Failed(DiscoveryFailure::ServiceNotFound)
    );
    e.on_disconnected(conn);
    assert_pristine(&e);
}

#[test]
fn degraded_session_resets_completely() {
    let (mut mock, conn) = connected();
    mock.remove_attribute(Handle::new(0x16));
    let mut e = engine();
    e.on_connected(&mut mock, conn);
    assert_eq!(run_discovery(&mut e, &mut mock), DiscoveryStage::Complete);
    assert!(e.is_degraded());
    assert!(e.canonical_ccc_exhausted());
    e.teardown();
    assert_pristine(&e);
}

#[test]
fn reconnect_rediscovers_from_scratch() {
    let (mut mock, conn) = connected();
    let mut e = engine();
    e.on_connected(&mut mock, conn);
    run_discovery(&mut e, &mut mock);
    mock.drop_link(conn, 0x08);
    e.on_disconnected(conn);
    mock.poll_event();

    let again = mock.inject_connection(fixture_peer());
    e.on_connected(&mut mock, again);
    assert_eq!(run_discovery(&mut e, &mut mock), DiscoveryStage::Complete);
    assert_eq!(e.conn(), Some(again));
    assert!(mock.is_subscribed(again, Handle::new(0x15)));
}

#[test]
fn never_two_discovery_requests_in_flight() {
    let (mut mock, conn) = connected();
    // Force the unfiltered retry path as well.
    mock.hide_from_uuid_filter(Handle::new(0x11));
    let mut e = engine();
    e.on_connected(&mut mock, conn);
    advance_to(&mut e, &mut mock, DiscoveryStage::Complete);
    assert_eq!(mock.discovery_races, 0);
    assert_eq!(e.handles().rx_value(), Some(Handle::new(0x12)));
}
