//! Network scanning: deduplication through the engine, periodic rescans,
//! and cancellation.

use blinkup::app::gatt::STATUS_SUCCESS;
use blinkup::app::uuids::Role;
use blinkup::app::wifi_scan::NetworkRecord;
use blinkup::config::EngineConfig;
use blinkup::BlinkUp;

use crate::mock_ports::{engine_with, uuid_map, write, MockEngine, MockRadio, MockSystem, MockWifi};

fn wifi_with(networks: Vec<NetworkRecord>) -> MockWifi {
    MockWifi {
        networks,
        ..MockWifi::default()
    }
}

fn engine_scanning_every(secs: u32) -> MockEngine {
    let config = EngineConfig {
        scan_interval_secs: secs,
        ..EngineConfig::default()
    };
    BlinkUp::new(
        &uuid_map(),
        config,
        MockRadio::default(),
        wifi_with(vec![NetworkRecord::new("Lab", "02:00:00:00:00:01", false)]),
        MockSystem::new("imp005"),
        None,
    )
    .unwrap()
}

#[test]
fn first_seen_bssid_wins() {
    let mut engine = engine_with(
        MockSystem::new("imp006"),
        wifi_with(vec![
            NetworkRecord::new("Office", "02:00:00:00:00:01", false),
            NetworkRecord::new("Office", "02:00:00:00:00:02", true),
            NetworkRecord::new("Guest", "02:00:00:00:00:03", true),
        ]),
    );
    engine.scan();
    let list = engine.networks();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].bssid, "02:00:00:00:00:01");
    assert!(!list[0].open);

    let body = engine.handle_read(engine.uuids().get(Role::WifiGetter));
    assert_eq!(body, b"Office\nlocked\n\nGuest\nunlocked");
}

#[test]
fn empty_scan_reads_empty() {
    let mut engine = engine_with(MockSystem::new("imp006"), MockWifi::default());
    engine.scan();
    assert!(engine.handle_read(engine.uuids().get(Role::WifiGetter)).is_empty());
}

#[test]
fn repeating_scan_follows_configured_interval() {
    let mut engine = engine_scanning_every(30);
    let handle = engine.start_scanning(true).unwrap();
    assert_eq!(engine.wifi().scans, 1);

    for _ in 0..29 {
        engine.tick(1.0);
    }
    assert_eq!(engine.wifi().scans, 1);
    engine.tick(1.0);
    assert_eq!(engine.wifi().scans, 2);
    for _ in 0..60 {
        engine.tick(1.0);
    }
    assert_eq!(engine.wifi().scans, 4);

    assert!(engine.stop_scanning(handle));
    for _ in 0..90 {
        engine.tick(1.0);
    }
    assert_eq!(engine.wifi().scans, 4);
}

#[test]
fn second_repeat_request_reuses_schedule() {
    let mut engine = engine_scanning_every(30);
    let first = engine.start_scanning(true).unwrap();
    let second = engine.start_scanning(true).unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.wifi().scans, 2);

    for _ in 0..30 {
        engine.tick(1.0);
    }
    // One schedule, one extra scan.
    assert_eq!(engine.wifi().scans, 3);
}

#[test]
fn stale_handle_cannot_cancel_new_schedule() {
    let mut engine = engine_scanning_every(30);
    let old = engine.start_scanning(true).unwrap();
    assert!(engine.stop_scanning(old));
    let fresh = engine.start_scanning(true).unwrap();
    assert_ne!(old, fresh);
    assert!(!engine.stop_scanning(old));

    for _ in 0..30 {
        engine.tick(1.0);
    }
    assert_eq!(engine.wifi().scans, 3);
}

#[test]
fn apply_ends_scanning() {
    let mut engine = engine_scanning_every(30);
    engine.start_scanning(true).unwrap();
    write(&mut engine, Role::SsidSetter, b"Lab");
    assert_eq!(write(&mut engine, Role::BlinkupTrigger, b""), STATUS_SUCCESS);

    let scans = engine.wifi().scans;
    for _ in 0..120 {
        engine.tick(1.0);
    }
    assert_eq!(engine.wifi().scans, scans);
    engine.scan();
    assert_eq!(engine.wifi().scans, scans);
}
