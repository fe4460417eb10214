use rentscan::gatt::SubscriptionPhase;
use rentscan::protocol::{Command, RentalMessage, RentalStatus};
use rentscan::test_support::manual_central_with;
use rentscan::transport::mock::Call;
use rentscan::transport::{MockTransport, TransportEvent};
use rentscan::{CentralConfig, DiscoveryStage, Handle, TransportError};

use crate::common::{self, connected_central, fixtures};

#[test]
fn happy_path_records_fixture_handles() -> anyhow::Result<()> {
    let (central, mock, _clock, conn) = connected_central()?;
    let h = central.handles();
    let range = h.service.expect("service range");
    assert_eq!((range.start(), range.end()), (Handle::new(0x10), Handle::new(0x20)));
    assert_eq!(h.rx_value, Some(Handle::new(0x12)));
    assert_eq!(h.tx_value, Some(Handle::new(0x15)));
    assert_eq!(h.ccc, Some(Handle::new(0x16)));
    assert!(!central.status().degraded);

    let m = mock.lock();
    assert!(m.is_subscribed(conn, Handle::new(0x15)));
    assert_eq!(m.subscribe_calls(), 1);
    assert_eq!(m.discovery_races, 0);
    Ok(())
}

#[test]
fn notification_is_decoded_into_a_message() -> anyhow::Result<()> {
    let (mut central, mock, _clock, conn) = connected_central()?;
    mock.lock()
        .notify(conn, Handle::new(0x15), &fixtures::rental_start_bytes());
    let msgs = central.process_pending()?;
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].cmd, Command::RentalStart);
    assert_eq!(msgs[0].status, RentalStatus::Rented);
    assert_eq!(msgs[0].tag_id.to_hex(), "04a22b");
    assert_eq!(msgs[0].duration, 3600);
    assert_eq!(central.status().messages_received, 1);
    Ok(())
}

#[test]
fn malformed_notification_is_counted_and_dropped() -> anyhow::Result<()> {
    let (mut central, mock, _clock, conn) = connected_central()?;
    mock.lock().notify(conn, Handle::new(0x15), &[0x01, 0x02]);
    assert!(central.process_pending()?.is_empty());
    assert_eq!(central.status().decode_errors, 1);
    Ok(())
}

#[test]
fn missing_ccc_subscribes_through_guess_and_marks_degraded() -> anyhow::Result<()> {
    common::init_logging();
    let mut layout = MockTransport::with_rentscan_layout();
    layout.remove_attribute(Handle::new(0x16));
    let (mut central, mock, _clock) = manual_central_with(layout, CentralConfig::default())?;
    central.start_scan()?;
    mock.lock()
        .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
    central.process_pending()?;

    assert_eq!(central.engine().stage(), DiscoveryStage::Complete);
    assert!(central.status().degraded);
    let sub = central.handles().subscription.expect("subscription");
    assert_eq!(sub.ccc_handle, Handle::new(0x16));
    assert!(sub.degraded);
    assert!(central.handles().to_string().contains("guessed ccc"));
    Ok(())
}

#[test]
fn subscribe_is_idempotent() -> anyhow::Result<()> {
    let (mut central, mock, _clock, _conn) = connected_central()?;
    assert_eq!(central.resubscribe()?, DiscoveryStage::Complete);
    assert_eq!(
        central.subscribe_manual(Handle::new(0x15), Handle::new(0x16))?,
        DiscoveryStage::Complete
    );
    central.process_pending()?;
    assert_eq!(mock.lock().subscribe_calls(), 1);
    assert_eq!(mock.lock().subscription_count(), 1);
    Ok(())
}

#[test]
fn already_subscribed_from_transport_completes_session() -> anyhow::Result<()> {
    common::init_logging();
    let mut layout = MockTransport::with_rentscan_layout();
    layout.fail_subscribe(TransportError::AlreadySubscribed);
    let (mut central, mock, _clock) = manual_central_with(layout, CentralConfig::default())?;
    central.start_scan()?;
    mock.lock()
        .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
    central.process_pending()?;

    assert_eq!(central.engine().stage(), DiscoveryStage::Complete);
    let sub = central.handles().subscription.expect("subscription");
    assert_eq!(sub.phase, SubscriptionPhase::Subscribed);
    assert!(!sub.degraded);
    let status = central.status();
    assert_eq!(status.last_recovery, None);
    assert!(!status.fatal);
    assert_eq!(mock.lock().subscribe_calls(), 1);
    Ok(())
}

#[test]
fn already_subscribed_completion_keeps_session() -> anyhow::Result<()> {
    let (mut central, mock, _clock, conn) = connected_central()?;
    mock.lock().push_event(TransportEvent::SubscribeComplete {
        conn,
        value_handle: Handle::new(0x15),
        result: Err(TransportError::AlreadySubscribed),
    });
    central.process_pending()?;

    assert_eq!(central.engine().stage(), DiscoveryStage::Complete);
    assert_eq!(central.status().last_recovery, None);
    mock.lock()
        .notify(conn, Handle::new(0x15), &fixtures::rental_start_bytes());
    assert_eq!(central.process_pending()?.len(), 1);
    Ok(())
}

#[test]
fn peer_unsubscribe_then_resubscribe() -> anyhow::Result<()> {
    let (mut central, mock, _clock, conn) = connected_central()?;
    mock.lock().peer_unsubscribe(conn, Handle::new(0x15));
    central.process_pending()?;
    let sub = central.handles().subscription.expect("subscription");
    assert_eq!(sub.phase, SubscriptionPhase::Unsubscribed);

    // Nothing arrives while unsubscribed.
    mock.lock()
        .notify(conn, Handle::new(0x15), &fixtures::rental_start_bytes());
    assert!(central.process_pending()?.is_empty());

    central.resubscribe()?;
    central.process_pending()?;
    assert_eq!(central.engine().stage(), DiscoveryStage::Complete);
    assert_eq!(mock.lock().subscribe_calls(), 2);

    mock.lock()
        .notify(conn, Handle::new(0x15), &fixtures::rental_start_bytes());
    assert_eq!(central.process_pending()?.len(), 1);
    Ok(())
}

#[test]
fn send_message_writes_to_rx_value() -> anyhow::Result<()> {
    let (mut central, mock, _clock, conn) = connected_central()?;
    let msg = RentalMessage::new(Command::StatusRequest, RentalStatus::Available);
    central.send_message(&msg)?;
    let m = mock.lock();
    assert!(m.calls.contains(&Call::Write(conn, Handle::new(0x12))));
    assert_eq!(m.writes[0].2, msg.encode());
    Ok(())
}

#[test]
fn uuid_only_advert_is_a_target_but_strangers_are_not() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, mock, _clock) =
        manual_central_with(MockTransport::with_rentscan_layout(), CentralConfig::default())?;
    central.start_scan()?;
    {
        let mut m = mock.lock();
        m.advertise(fixtures::other_peer(), fixtures::stranger_adv(), true);
        m.advertise(fixtures::fixture_peer(), fixtures::uuid_only_adv(), false);
    }
    central.process_pending()?;
    assert_eq!(mock.lock().count_calls(|c| matches!(c, Call::ConnectCreate(_))), 0);
    assert!(central.orchestrator().is_scanning());

    mock.lock()
        .advertise(fixtures::fixture_peer(), fixtures::uuid_only_adv(), true);
    central.process_pending()?;
    assert_eq!(central.engine().stage(), DiscoveryStage::Complete);
    Ok(())
}
