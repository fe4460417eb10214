use rentscan::recovery::{Failure, RecoveryLevel};
use rentscan::test_support::manual_central;
use rentscan::transport::Transport;
use rentscan::transport::mock::Call;
use rentscan::{DiscoveryStage, TransportError};

use crate::common::{self, fixtures};

#[test]
fn stale_connect_twice_then_success_resets_retry_count() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, mock, _clock) = manual_central()?;
    central.start_scan()?;

    for attempt in 1..=2 {
        mock.lock().fail_connect_create(TransportError::StaleConnection);
        mock.lock()
            .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
        central.process_pending()?;

        let status = central.status();
        let record = status.last_recovery.expect("recovery ran");
        assert_eq!(
            record.failure,
            Failure::ConnectCreate(TransportError::StaleConnection)
        );
        assert_eq!(record.level, RecoveryLevel::RestartScan);
        assert!(record.succeeded);
        assert_eq!(status.retry_count, attempt);
        assert!(status.scanning);
    }

    mock.lock()
        .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
    central.process_pending()?;
    assert_eq!(central.engine().stage(), DiscoveryStage::Complete);
    assert_eq!(central.attempts().retry_count, 0);
    assert_eq!(
        mock.lock().count_calls(|c| matches!(c, Call::ConnectCreate(_))),
        3
    );
    Ok(())
}

#[test]
fn leftover_link_is_torn_down_before_third_attempt() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, mock, _clock) = manual_central()?;
    // The controller kept a link to the peer that the central never saw.
    let leftover = mock.lock().inject_connection(fixtures::fixture_peer());
    central.start_scan()?;

    for _ in 0..2 {
        mock.lock().fail_connect_create(TransportError::StaleConnection);
        mock.lock()
            .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
        central.process_pending()?;
    }
    mock.lock()
        .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
    central.process_pending()?;

    let m = mock.lock();
    let disconnect_at = m
        .calls
        .iter()
        .position(|c| *c == Call::Disconnect(leftover))
        .expect("leftover link disconnected");
    let third_connect_at = m
        .calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, Call::ConnectCreate(_)))
        .nth(2)
        .map(|(i, _)| i)
        .expect("third connect attempt");
    assert!(disconnect_at < third_connect_at);
    assert_eq!(m.conn_info(leftover), Err(TransportError::NotConnected));
    drop(m);
    assert_eq!(central.engine().stage(), DiscoveryStage::Complete);
    Ok(())
}

#[test]
fn third_stale_connect_resets_stack() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, mock, _clock) = manual_central()?;
    central.start_scan()?;
    for _ in 0..3 {
        mock.lock().fail_connect_create(TransportError::Hci(0x0b));
        mock.lock()
            .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
        central.process_pending()?;
    }
    let status = central.status();
    assert_eq!(
        status.last_recovery.map(|r| r.level),
        Some(RecoveryLevel::FullStackReset)
    );
    assert_eq!(status.retry_count, 0);
    assert_eq!(status.full_resets_since_success, 1);
    Ok(())
}

#[test]
fn failed_connection_event_restarts_scan() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, mock, _clock) = manual_central()?;
    central.start_scan()?;
    mock.lock().fail_connect(TransportError::Hci(0x3e));
    mock.lock()
        .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
    central.process_pending()?;

    let status = central.status();
    assert_eq!(
        status.last_recovery.map(|r| r.failure),
        Some(Failure::ConnectFailed(TransportError::Hci(0x3e)))
    );
    assert!(status.scanning);
    assert_eq!(status.connection, None);
    assert!(!status.connecting);
    Ok(())
}
