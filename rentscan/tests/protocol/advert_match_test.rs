use rentscan::constants::RENTSCAN_SERVICE_UUID;
use rentscan::protocol::TargetMatcher;
use rentscan::protocol::advert::{ad_structures, build_adv_data, complete_name, service_uuids128};
use rentscan::transport::AdvReport;
use rentscan::CentralConfig;

use crate::common::fixtures;

fn report(data: Vec<u8>) -> AdvReport {
    AdvReport {
        address: fixtures::fixture_peer(),
        rssi: -55,
        connectable: true,
        data,
    }
}

#[test]
fn parses_fixture_advertisement() {
    let data = fixtures::target_adv();
    assert_eq!(ad_structures(&data).count(), 3);
    assert_eq!(complete_name(&data), Some("RentScan"));
    assert_eq!(service_uuids128(&data), vec![RENTSCAN_SERVICE_UUID]);
}

#[test]
fn builder_produces_the_wire_fixture() {
    let built = build_adv_data(Some("RentScan"), &[RENTSCAN_SERVICE_UUID]);
    assert_eq!(built, fixtures::target_adv());
}

#[test]
fn matcher_accepts_name_or_uuid() {
    let m = TargetMatcher::from_config(&CentralConfig::default());
    assert!(m.matches(&report(fixtures::target_adv())));
    assert!(m.matches(&report(fixtures::uuid_only_adv())));
    assert!(m.matches(&report(build_adv_data(Some("RentScan"), &[]))));
    assert!(!m.matches(&report(fixtures::stranger_adv())));
}

#[test]
fn truncated_advertisement_is_not_a_match() {
    let mut data = fixtures::target_adv();
    // Cut into the middle of the UUID list and drop the name.
    data.truncate(10);
    let m = TargetMatcher::from_config(&CentralConfig::default());
    assert!(!m.matches(&report(data.clone())));
    assert_eq!(ad_structures(&data).count(), 1);
}
