use rentscan::recovery::{Failure, RecoveryLevel};
use rentscan::test_support::{manual_central, manual_central_with};
use rentscan::transport::MockTransport;
use rentscan::transport::mock::Call;
use rentscan::{CentralConfig, DiscoveryFailure, DiscoveryStage, Handle, TransportError};

use crate::common::{self, fixtures};

fn last_level(central: &rentscan::Central<rentscan::Enabled>) -> Option<RecoveryLevel> {
    central.status().last_recovery.map(|r| r.level)
}

#[test]
fn persistent_discovery_failure_escalates_to_full_reset() -> anyhow::Result<()> {
    common::init_logging();
    let mut layout = MockTransport::with_rentscan_layout();
    layout.remove_attribute(Handle::new(0x14));
    let (mut central, mock, _clock) = manual_central_with(layout, CentralConfig::default())?;
    central.start_scan()?;

    // First connection: retry in place, then restart the scan.
    mock.lock()
        .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
    central.process_pending()?;
    let primaries = mock
        .lock()
        .discover_requests()
        .iter()
        .filter(|r| r.kind == rentscan::transport::DiscoverKind::Primary)
        .count();
    assert_eq!(primaries, 2);
    assert_eq!(last_level(&central), Some(RecoveryLevel::RestartScan));
    assert!(central.orchestrator().is_scanning());
    assert_eq!(central.engine().stage(), DiscoveryStage::Idle);

    // Second connection fails the same way: the stack is reset.
    mock.lock()
        .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
    central.process_pending()?;
    assert_eq!(last_level(&central), Some(RecoveryLevel::FullStackReset));
    assert!(mock.lock().calls.contains(&Call::Disable));
    assert!(mock.lock().scanning);
    assert_eq!(central.attempts().full_resets_since_success, 1);
    assert_eq!(central.attempts().discovery_retry_count, 0);
    Ok(())
}

#[test]
fn repeated_incidents_use_at_most_two_emergency_resets() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, mock, _clock) = manual_central()?;
    mock.lock().hardware_reset_supported = true;

    let mut levels = Vec::new();
    for _ in 0..10 {
        levels.push(central.recover(Failure::MessageProcessing)?);
    }
    let emergencies = levels
        .iter()
        .filter(|l| **l == RecoveryLevel::EmergencyReset)
        .count();
    assert_eq!(emergencies, 2);
    assert!(
        levels[..5]
            .iter()
            .filter(|l| **l == RecoveryLevel::EmergencyReset)
            .count()
            <= 2
    );
    assert!(levels[6..].iter().all(|l| *l == RecoveryLevel::FullStackReset));
    assert!(levels.iter().all(|l| *l >= RecoveryLevel::FullStackReset));

    let status = central.status();
    assert!(status.emergency_exhausted);
    assert!(!status.fatal);
    assert_eq!(mock.lock().count_calls(|c| *c == Call::HardwareReset), 2);
    Ok(())
}

#[test]
fn scan_start_busy_past_retries_resets_stack() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, mock, clock) = manual_central()?;
    for _ in 0..3 {
        mock.lock().fail_scan_start(TransportError::Busy);
    }
    central.start_scan()?;
    assert_eq!(last_level(&central), Some(RecoveryLevel::FullStackReset));
    assert!(central.orchestrator().is_scanning());
    assert_eq!(
        &clock.sleeps()[..2],
        &[rentscan::ms(1000), rentscan::ms(2000)]
    );
    Ok(())
}

#[test]
fn message_errors_reset_stack_at_threshold() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, _mock, _clock) = manual_central()?;
    for _ in 0..4 {
        assert_eq!(central.record_message_error()?, None);
    }
    assert_eq!(
        central.record_message_error()?,
        Some(RecoveryLevel::FullStackReset)
    );
    assert_eq!(central.status().message_errors, 0);

    central.record_message_error()?;
    central.record_message_ok();
    assert_eq!(central.status().message_errors, 0);
    Ok(())
}

#[test]
fn established_session_clears_escalation_counters() -> anyhow::Result<()> {
    let (mut central, mock, _clock, _conn) = common::connected_central()?;
    central.recover(Failure::Discovery(DiscoveryFailure::CccNotFound))?;
    assert_eq!(central.attempts().discovery_retry_count, 1);
    // Retry in place re-runs discovery on the live link.
    central.process_pending()?;
    assert_eq!(central.engine().stage(), DiscoveryStage::Complete);
    assert_eq!(central.attempts().discovery_retry_count, 0);
    assert_eq!(central.attempts().total_retry_count, 0);
    assert_eq!(mock.lock().subscription_count(), 1);
    Ok(())
}
