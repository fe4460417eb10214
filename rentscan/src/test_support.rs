// rentscan/src/test_support.rs
//! Test support helpers intended for use by unit and integration tests.
//!
//! These centralize the mock peer and central setup so tests across the
//! crate and tests/ directory drive the same fixture.
#![allow(dead_code)]

use crate::Result;
use crate::central::{Central, Enabled};
use crate::config::CentralConfig;
use crate::gatt::{DiscoveryEngine, DiscoveryStage};
use crate::protocol::advert::build_adv_data;
use crate::transport::{MockTransport, SharedMockTransport, Transport, TransportEvent};
use crate::types::{Address, AddressKind};
use crate::utils::ManualClock;

/// Address of the fixture RentScan peripheral.
#[doc(hidden)]
pub fn fixture_peer() -> Address {
    Address::new([0xc0, 0x11, 0x22, 0x33, 0x44, 0x55], AddressKind::Random)
}

/// Advertising payload of the fixture peripheral: complete name plus the
/// RentScan service UUID.
#[doc(hidden)]
pub fn target_adv_data(config: &CentralConfig) -> Vec<u8> {
    build_adv_data(Some(&config.device_name), &[config.uuids.service])
}

/// Feed discovery and subscribe completions from `transport` into `engine`
/// until the queue runs dry. Other events are dropped.
#[doc(hidden)]
pub fn run_discovery(
    engine: &mut DiscoveryEngine,
    transport: &mut dyn Transport,
) -> DiscoveryStage {
    while let Some(event) = transport.poll_event() {
        match event {
            TransportEvent::DiscoveryResult { conn, attr } => {
                engine.on_discovery_result(transport, conn, attr);
            }
            TransportEvent::SubscribeComplete { conn, result, .. } => {
                engine.on_subscribe_result(conn, result);
            }
            _ => {}
        }
    }
    engine.stage()
}

/// Enabled central over the fixture GATT layout with a manual clock.
/// The returned handles share state with the ones inside the central.
#[doc(hidden)]
pub fn manual_central() -> Result<(Central<Enabled>, SharedMockTransport, ManualClock)> {
    manual_central_with(MockTransport::with_rentscan_layout(), CentralConfig::default())
}

#[doc(hidden)]
pub fn manual_central_with(
    mock: MockTransport,
    config: CentralConfig,
) -> Result<(Central<Enabled>, SharedMockTransport, ManualClock)> {
    let shared = mock.into_shared();
    let clock = ManualClock::new();
    let central = Central::builder()
        .with_transport(Box::new(shared.clone()))
        .with_clock(Box::new(clock.clone()))
        .with_config(config)
        .build()?
        .enable()?;
    Ok((central, shared, clock))
}
