use rentscan::shell::{self, Command};
use rentscan::test_support::manual_central;
use rentscan::transport::mock::Call;
use rentscan::{Error, Handle};

use crate::common::{self, connected_central};

#[test]
fn scan_lines_drive_the_radio() -> anyhow::Result<()> {
    common::init_logging();
    let (mut central, mock, _clock) = manual_central()?;
    assert_eq!(shell::run_line(&mut central, "scan start")?, "scanning");
    assert!(mock.lock().scanning);
    shell::run_line(&mut central, "scan stop")?;
    assert!(!mock.lock().scanning);
    Ok(())
}

#[test]
fn handles_and_status_describe_the_session() -> anyhow::Result<()> {
    let (mut central, _mock, _clock, _conn) = connected_central()?;
    let handles = shell::run_line(&mut central, "handles")?;
    assert!(handles.contains("service: 0x0010..0x0020"));
    assert!(handles.contains("tx value: 0x0015"));
    assert!(handles.contains("ccc: 0x0016"));

    let status = shell::run_line(&mut central, "status")?;
    assert!(status.contains("connected: C0:11:22:33:44:55"));
    assert!(status.contains("discovery: Complete"));
    Ok(())
}

#[test]
fn reset_line_runs_a_full_stack_reset() -> anyhow::Result<()> {
    let (mut central, mock, _clock, conn) = connected_central()?;
    let out = shell::run_line(&mut central, "reset")?;
    assert_eq!(out, "full-stack-reset done");
    let m = mock.lock();
    assert!(m.calls.contains(&Call::Disconnect(conn)));
    assert!(m.calls.contains(&Call::Disable));
    assert!(m.scanning);
    Ok(())
}

#[test]
fn disconnect_line_drops_the_peer() -> anyhow::Result<()> {
    let (mut central, mock, _clock, conn) = connected_central()?;
    shell::run_line(&mut central, "disconnect")?;
    assert!(mock.lock().calls.contains(&Call::Disconnect(conn)));
    // The resulting event is for a link we already forgot.
    central.process_pending()?;
    assert!(!central.is_connected());
    Ok(())
}

#[test]
fn manual_subscribe_after_peer_unsubscribe() -> anyhow::Result<()> {
    let (mut central, mock, _clock, conn) = connected_central()?;
    mock.lock().peer_unsubscribe(conn, Handle::new(0x15));
    central.process_pending()?;
    let cmd: Command = "subscribe 0x0015 0x0016".parse()?;
    shell::execute(&mut central, &cmd)?;
    central.process_pending()?;
    assert!(mock.lock().is_subscribed(conn, Handle::new(0x15)));
    Ok(())
}

#[test]
fn reset_errors_clears_counters() -> anyhow::Result<()> {
    let (mut central, mock, _clock, conn) = connected_central()?;
    mock.lock().notify(conn, Handle::new(0x15), &[0xde, 0xad]);
    central.process_pending()?;
    central.record_message_error()?;
    assert_eq!(central.status().decode_errors, 1);
    shell::run_line(&mut central, "reset_errors")?;
    let status = central.status();
    assert_eq!((status.decode_errors, status.message_errors), (0, 0));
    Ok(())
}

#[test]
fn unknown_lines_are_rejected() {
    assert!(matches!(
        "frobnicate".parse::<Command>(),
        Err(Error::InvalidCommand(_))
    ));
}
