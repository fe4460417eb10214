// Shared helpers for the integration test crates in `tests/`.
#![allow(dead_code)]


use rentscan::central::{Central, Enabled};
use rentscan::test_support::manual_central;
use rentscan::transport::SharedMockTransport;
use rentscan::utils::ManualClock;
use rentscan::{ConnHandle, DiscoveryStage};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Scan, hear the fixture peer and run discovery to completion.
/// Central, mock and clock as from `manual_central`, plus the live connection.
pub type Connected = (Central<Enabled>, SharedMockTransport, ManualClock, ConnHandle);

pub fn connected_central() -> anyhow::Result<Connected> {
    init_logging();
    let (mut central, mock, clock) = manual_central()?;
    central.start_scan()?;
    mock.lock()
        .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
    central.process_pending()?;
    anyhow::ensure!(
        central.engine().stage() == DiscoveryStage::Complete,
        "discovery ended in {:?}",
        central.engine().stage()
    );
    let (conn, _) = central
        .orchestrator()
        .connection()
        .ok_or_else(|| anyhow::anyhow!("no connection after discovery"))?;
    Ok((central, mock, clock, conn))
}
