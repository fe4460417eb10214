use rentscan::recovery::{Failure, RecoveryLevel};
use rentscan::test_support::manual_central;
use rentscan::{Error, TransportError};

use crate::common;

#[test]
fn failed_reset_is_fatal_until_a_later_recovery_succeeds() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, mock, _clock) = manual_central()?;
    mock.lock().fail_enable(TransportError::InvalidArgument);

    let err = central
        .recover(Failure::Manual(RecoveryLevel::FullStackReset))
        .unwrap_err();
    assert!(matches!(err, Error::RecoveryFailed { .. }));
    let status = central.status();
    assert!(status.fatal);
    assert!(status.to_string().contains("FATAL"));
    assert!(!mock.lock().enabled);

    // Health check finds the radio down and resets again, this time cleanly.
    central.health_check()?;
    let status = central.status();
    assert!(!status.fatal);
    assert!(status.scanning);
    assert!(mock.lock().enabled);
    Ok(())
}

#[test]
fn busy_enable_is_retried_during_reset() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, mock, clock) = manual_central()?;
    mock.lock().fail_enable(TransportError::Busy);
    mock.lock().fail_enable(TransportError::Busy);
    central.recover(Failure::MessageProcessing)?;
    assert!(mock.lock().enabled);
    // settle, then two exponential backoff steps
    assert_eq!(
        clock.sleeps(),
        vec![rentscan::ms(100), rentscan::ms(100), rentscan::ms(200)]
    );
    Ok(())
}

#[test]
fn manual_level_is_not_escalated() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, _mock, _clock) = manual_central()?;
    for _ in 0..3 {
        assert_eq!(
            central.recover(Failure::Manual(RecoveryLevel::RestartScan))?,
            RecoveryLevel::RestartScan
        );
    }
    assert_eq!(central.attempts().total_retry_count, 0);
    Ok(())
}
