//! End-to-end provisioning flows through the engine with mock ports.
//!
//! Covers the apply sequencer's ordering and every way it can fail, plus
//! serving variants the unit tests do not reach.

use blinkup::app::events::HostEvent;
use blinkup::app::gatt::{
    CharValue, Characteristic, ExtraServices, Service, PROP_READ, STATUS_NOT_READY, STATUS_SUCCESS,
    STATUS_UNLIKELY_ERROR, STATUS_VALUE_NOT_ALLOWED, STATUS_WRITE_NOT_PERMITTED,
};
use blinkup::app::param::HostParam;
use blinkup::app::ports::NetworkError;
use blinkup::app::security::SecurityMode;
use blinkup::app::service::Phase;
use blinkup::app::uuids::Role;
use blinkup::config::EngineConfig;
use blinkup::hex::BleUuid;
use blinkup::BlinkUp;

use crate::mock_ports::{
    capture, engine_with, serving_engine, uuid_map, write, MockRadio, MockSystem, MockWifi, RadioCall,
};

fn load_credentials(engine: &mut crate::mock_ports::MockEngine) {
    for (role, value) in [
        (Role::SsidSetter, "Workshop"),
        (Role::PasswordSetter, "correct-horse"),
        (Role::PlanIdSetter, "plan-7f3a"),
        (Role::TokenSetter, "tok-19c2e8"),
    ] {
        assert_eq!(write(engine, role, value.as_bytes()), STATUS_SUCCESS);
    }
}

fn extra_service(short: u16) -> Service {
    Service {
        uuid: BleUuid::Short(short),
        characteristics: vec![Characteristic {
            uuid: BleUuid::Short(short + 1),
            flags: PROP_READ,
            value: CharValue::Static(b"x".to_vec()),
        }],
    }
}

// ── Happy path ordering ───────────────────────────────────────

#[test]
fn apply_commits_in_order_and_reboots_once() {
    let (mut engine, events) = serving_engine();
    engine.on_peer_connected(7, "de:ad:be:ef:00:01", SecurityMode::None);
    load_credentials(&mut engine);

    assert_eq!(write(&mut engine, Role::BlinkupTrigger, b""), STATUS_SUCCESS);
    assert_eq!(engine.phase(), Phase::Activated);

    // Radio torn down before anything is committed.
    let calls = &engine.radio().calls;
    let tail = &calls[calls.len() - 3..];
    assert_eq!(tail, &[RadioCall::ClosePeer(7), RadioCall::StopAdvertise, RadioCall::Close]);

    assert_eq!(engine.system().flushes, vec![EngineConfig::default().flush_timeout_secs]);
    assert_eq!(
        engine.wifi().stored,
        Some((b"Workshop".to_vec(), "correct-horse".to_string()))
    );
    assert_eq!(
        engine.system().enrollment,
        Some(("plan-7f3a".to_string(), "tok-19c2e8".to_string()))
    );
    assert_eq!(events.lock().unwrap().last(), Some(&HostEvent::Activated));

    for _ in 0..5 {
        engine.tick(1.0);
    }
    assert_eq!(engine.system().reboots, 1);
}

#[test]
fn radio_disconnect_after_local_close_is_ignored() {
    let (mut engine, events) = serving_engine();
    engine.on_peer_connected(7, "aa", SecurityMode::Encrypted);
    load_credentials(&mut engine);
    write(&mut engine, Role::BlinkupTrigger, b"");

    let before = events.lock().unwrap().len();
    engine.on_peer_disconnected(7);
    assert_eq!(events.lock().unwrap().len(), before);
}

#[test]
fn reboot_waits_for_configured_delay() {
    let config = EngineConfig {
        reboot_delay_secs: 3,
        ..EngineConfig::default()
    };
    let mut engine = BlinkUp::new(
        &uuid_map(),
        config,
        MockRadio::default(),
        MockWifi::default(),
        MockSystem::new("imp005"),
        None,
    )
    .unwrap();
    write(&mut engine, Role::SsidSetter, b"Lab");
    assert_eq!(write(&mut engine, Role::BlinkupTrigger, b""), STATUS_SUCCESS);

    engine.tick(1.0);
    engine.tick(1.0);
    assert_eq!(engine.system().reboots, 0);
    engine.tick(1.0);
    assert_eq!(engine.system().reboots, 1);
}

// ── Failures ──────────────────────────────────────────────────

#[test]
fn refused_credentials_keep_the_session_open() {
    let wifi = MockWifi {
        reject_password: Some("correct-horse".to_string()),
        ..MockWifi::default()
    };
    let mut engine = engine_with(MockSystem::new("imp006"), wifi);
    let events = capture(&mut engine);
    assert!(engine.serve(None, None, None, None));
    engine.on_peer_connected(9, "aa:bb:cc:dd:ee:09", SecurityMode::None);
    load_credentials(&mut engine);
    let before = engine.radio().calls.len();

    assert_eq!(write(&mut engine, Role::BlinkupTrigger, b""), STATUS_VALUE_NOT_ALLOWED);
    assert_eq!(engine.phase(), Phase::Serving);
    assert_eq!(engine.radio().calls.len(), before);
    assert_eq!(engine.peer().map(|p| p.handle), Some(9));
    assert!(engine.credentials().is_updated());
    assert_eq!(engine.system().flushes.len(), 0);
    assert!(engine.wifi().stored.is_none());
    assert!(!events.lock().unwrap().contains(&HostEvent::Activated));

    assert_eq!(write(&mut engine, Role::PasswordSetter, b"battery-staple"), STATUS_SUCCESS);
    assert_eq!(write(&mut engine, Role::BlinkupTrigger, b""), STATUS_SUCCESS);
    assert_eq!(engine.phase(), Phase::Activated);
}

#[test]
fn session_flush_failure_stops_before_wifi() {
    let mut system = MockSystem::new("imp006");
    system.flush_result = Err(NetworkError::SessionTimeout);
    let mut engine = engine_with(system, MockWifi::default());
    let events = capture(&mut engine);
    load_credentials(&mut engine);

    assert_eq!(write(&mut engine, Role::BlinkupTrigger, b""), STATUS_UNLIKELY_ERROR);
    assert_eq!(engine.phase(), Phase::Failed);
    assert!(engine.wifi().stored.is_none());
    assert!(engine.system().enrollment.is_none());
    assert!(!events.lock().unwrap().contains(&HostEvent::Activated));

    // Credentials are gone and the radio is down: nothing more to do.
    assert!(!engine.credentials().is_updated());
    assert_eq!(write(&mut engine, Role::SsidSetter, b"again"), STATUS_WRITE_NOT_PERMITTED);
    assert_eq!(write(&mut engine, Role::BlinkupTrigger, b""), STATUS_NOT_READY);

    for _ in 0..10 {
        engine.tick(1.0);
    }
    assert_eq!(engine.system().reboots, 0);
}

#[test]
fn wifi_store_failure_skips_enrollment() {
    let wifi = MockWifi {
        fail_store: true,
        ..MockWifi::default()
    };
    let mut engine = engine_with(MockSystem::new("imp006"), wifi);
    load_credentials(&mut engine);

    assert_eq!(write(&mut engine, Role::BlinkupTrigger, b""), STATUS_UNLIKELY_ERROR);
    assert_eq!(engine.phase(), Phase::Failed);
    assert!(engine.system().enrollment.is_none());
}

#[test]
fn enrollment_failure_is_reported_after_wifi_commit() {
    let mut system = MockSystem::new("imp006");
    system.fail_enrollment = true;
    let mut engine = engine_with(system, MockWifi::default());
    load_credentials(&mut engine);

    assert_eq!(write(&mut engine, Role::BlinkupTrigger, b""), STATUS_UNLIKELY_ERROR);
    assert_eq!(engine.phase(), Phase::Failed);
    assert!(engine.wifi().stored.is_some());
}

// ── Serving variants ──────────────────────────────────────────

#[test]
fn caller_advert_served_verbatim_with_clamped_interval() {
    let mut engine = engine_with(MockSystem::new("imp006"), MockWifi::default());
    let advert = HostParam::Bytes(vec![0x02, 0x01, 0x06, 0x05, 0x09, b'i', b'm', b'p', b'!']);
    assert!(engine.serve(Some(&advert), Some(250), Some(20), None));

    let (payload, interval) = engine
        .radio()
        .calls
        .iter()
        .find_map(|c| match c {
            RadioCall::Advertise { payload, interval } => Some((payload.clone(), *interval)),
            _ => None,
        })
        .unwrap();
    assert_eq!(payload, vec![0x02, 0x01, 0x06, 0x05, 0x09, b'i', b'm', b'p', b'!']);
    assert_eq!((interval.min_ms, interval.max_ms), (20, 100));
}

#[test]
fn extra_services_follow_builtin_ones() {
    let mut engine = engine_with(MockSystem::new("imp006"), MockWifi::default());
    assert!(engine.serve(None, None, None, Some(ExtraServices::One(extra_service(0x1800)))));
    assert_eq!(engine.radio().served.len(), 3);
    assert_eq!(engine.radio().served[2].uuid, BleUuid::Short(0x1800));

    let many = ExtraServices::Many(vec![extra_service(0x1810), extra_service(0x1820)]);
    assert!(engine.serve(None, None, None, Some(many)));
    let served = &engine.radio().served;
    assert_eq!(served.len(), 4);
    assert_eq!(served[0].uuid, engine.uuids().get(Role::BlinkupService));
    assert_eq!(served[1].uuid, BleUuid::Short(0x180A));
}

#[test]
fn device_information_reflects_system() {
    let (engine, _) = serving_engine();
    let info = &engine.radio().served[1];
    let read = |short: u16| match &info.find(BleUuid::Short(short)).unwrap().value {
        CharValue::Static(v) => String::from_utf8(v.clone()).unwrap(),
        CharValue::Dispatch(_) => panic!("device info must be static"),
    };
    assert_eq!(read(0x2A29), "Electric Imp");
    assert_eq!(read(0x2A25), "0c2a69a1b2c3");
    assert_eq!(read(0x2A24), "imp006");
    assert_eq!(read(0x2A23), "https://agent.electricimp.com/abc");
    assert_eq!(read(0x2A26), "43.1.0");
}

#[test]
fn pin_security_reaches_radio() {
    let mut engine = engine_with(MockSystem::new("imp006"), MockWifi::default());
    assert_eq!(engine.set_security(4, Some(&HostParam::Text("004242".into()))), 4);
    assert_eq!(engine.set_security(3, Some(&HostParam::Text("1234567".into()))), 1);

    let modes: Vec<_> = engine
        .radio()
        .calls
        .iter()
        .filter_map(|c| match c {
            RadioCall::Security { mode, pin } => Some((mode.code(), pin.map(|p| p.value()))),
            _ => None,
        })
        .collect();
    assert_eq!(modes, vec![(4, Some(4242)), (1, None)]);
}

#[test]
fn close_is_idempotent_and_drops_peer() {
    let (mut engine, events) = serving_engine();
    engine.on_peer_connected(2, "bb", SecurityMode::None);
    engine.close();
    engine.close();
    assert_eq!(engine.phase(), Phase::Closed);
    assert_eq!(engine.radio().count(|c| *c == RadioCall::Close), 1);
    assert_eq!(
        events.lock().unwrap().last(),
        Some(&HostEvent::Disconnected { address: "bb".into() })
    );
}
