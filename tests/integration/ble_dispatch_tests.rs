//! GATT traffic through the simulated BLE adapter into a live engine.
//!
//! Uses the real host-side adapters (BLE, WiFi, NVS-backed system) so the
//! attribute-handle routing and ATT responses are exercised end to end.

use blinkup::adapters::ble::{
    dispatch_pending, BleAdapter, RadioEvent, ATT_INVALID_HANDLE, ATT_INVALID_OFFSET, ATT_MAX_VALUE_LEN,
};
use blinkup::adapters::nvs::NvsAdapter;
use blinkup::adapters::system::SystemAdapter;
use blinkup::adapters::wifi::WifiAdapter;
use blinkup::app::events::HostEvent;
use blinkup::app::gatt::{
    CHAR_MANUFACTURER, STATUS_INVALID_LENGTH, STATUS_NOT_READY, STATUS_SUCCESS, STATUS_VALUE_NOT_ALLOWED,
    STATUS_WRITE_NOT_PERMITTED,
};
use blinkup::app::security::SecurityMode;
use blinkup::app::service::Phase;
use blinkup::app::uuids::Role;
use blinkup::app::wifi_scan::NetworkRecord;
use blinkup::config::EngineConfig;
use blinkup::BlinkUp;

use crate::mock_ports::{uuid_map, CaptureSink};

type SimEngine = BlinkUp<BleAdapter, WifiAdapter, SystemAdapter<NvsAdapter>>;

fn sim_engine(networks: Vec<NetworkRecord>) -> SimEngine {
    let mut name = heapless::String::<24>::new();
    name.push_str("imp006").unwrap();
    let mut wifi = WifiAdapter::new();
    wifi.set_sim_networks(networks);
    let system = SystemAdapter::new("imp006", NvsAdapter::new().unwrap());
    let mut engine = BlinkUp::new(
        &uuid_map(),
        EngineConfig::default(),
        BleAdapter::new(name),
        wifi,
        system,
        Some(&[0x5A; 128]),
    )
    .unwrap();
    assert!(engine.serve(None, None, None, None));
    engine
}

fn attr(engine: &SimEngine, role: Role) -> u16 {
    let uuid = engine.uuids().get(role);
    engine.radio().handle_of(uuid).unwrap()
}

fn gatt_write(engine: &SimEngine, trans_id: u32, role: Role, data: &[u8]) {
    let attr = attr(engine, role);
    engine.radio().inject(RadioEvent::Write {
        handle: 1,
        trans_id,
        attr,
        data: data.to_vec(),
        need_rsp: true,
    });
}

#[test]
fn provisioning_over_gatt() {
    let mut engine = sim_engine(Vec::new());
    let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    engine.on_event(Box::new(CaptureSink(std::sync::Arc::clone(&events))));

    engine.radio().inject(RadioEvent::Connected {
        handle: 1,
        address: "11:22:33:44:55:66".into(),
        security: SecurityMode::None,
    });
    gatt_write(&engine, 1, Role::SsidSetter, b"Greenhouse");
    gatt_write(&engine, 2, Role::PasswordSetter, b"tomatoes!");
    gatt_write(&engine, 3, Role::PlanIdSetter, b"plan-01");
    gatt_write(&engine, 4, Role::TokenSetter, b"token-01");
    gatt_write(&engine, 5, Role::BlinkupTrigger, b"");
    assert_eq!(dispatch_pending(&mut engine), 6);

    let responses = engine.radio().take_responses();
    assert_eq!(responses.len(), 5);
    assert!(responses.iter().all(|r| r.status == STATUS_SUCCESS));
    assert_eq!(responses.iter().map(|r| r.trans_id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);

    assert_eq!(engine.phase(), Phase::Activated);
    assert_eq!(engine.wifi().stored(), Some((&b"Greenhouse"[..], "tomatoes!")));
    assert_eq!(
        engine.system().storage().load_enrollment(),
        Some(("plan-01".to_string(), "token-01".to_string()))
    );
    assert!(engine.radio().closed_peers().contains(&1));
    assert!(engine.radio().advert().is_none());

    engine.tick(1.0);
    assert_eq!(engine.system().sim_reboots(), 1);
    assert_eq!(events.lock().unwrap().last(), Some(&HostEvent::Activated));
}

fn connect(engine: &mut SimEngine, handle: u16) {
    engine.radio().inject(RadioEvent::Connected {
        handle,
        address: "cc:cc:cc:cc:cc:cc".into(),
        security: SecurityMode::None,
    });
    dispatch_pending(engine);
}

fn prepare(engine: &SimEngine, trans_id: u32, attr: u16, offset: usize, data: &[u8]) {
    engine.radio().inject(RadioEvent::PrepareWrite {
        handle: 1,
        trans_id,
        attr,
        offset: offset as u16,
        data: data.to_vec(),
    });
}

fn execute(engine: &SimEngine, trans_id: u32, commit: bool) {
    engine.radio().inject(RadioEvent::ExecWrite {
        handle: 1,
        trans_id,
        commit,
    });
}

#[test]
fn long_token_arrives_in_prepared_fragments() {
    let mut engine = sim_engine(Vec::new());
    connect(&mut engine, 1);
    let token: String = (0..200).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let attr = attr(&engine, Role::TokenSetter);

    // 18 bytes is what fits in one Prepare Write at the default MTU.
    let chunks: Vec<&[u8]> = token.as_bytes().chunks(18).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        prepare(&engine, i as u32, attr, i * 18, chunk);
    }
    dispatch_pending(&mut engine);
    assert!(engine.credentials().token().is_empty());

    let echoes = engine.radio().take_responses();
    assert_eq!(echoes.len(), chunks.len());
    for (i, (echo, chunk)) in echoes.iter().zip(&chunks).enumerate() {
        assert_eq!(echo.status, STATUS_SUCCESS);
        assert_eq!(echo.attr, attr);
        assert_eq!(usize::from(echo.offset), i * 18);
        assert_eq!(echo.value, *chunk);
    }

    execute(&engine, 99, true);
    dispatch_pending(&mut engine);
    let exec = engine.radio().take_responses();
    assert_eq!(exec.len(), 1);
    assert_eq!((exec[0].trans_id, exec[0].status), (99, STATUS_SUCCESS));
    assert_eq!(engine.credentials().token(), token);
    assert_eq!(engine.radio().pending_prepared(1), 0);
}

#[test]
fn long_write_with_gap_or_cancel_leaves_value_unset() {
    let mut engine = sim_engine(Vec::new());
    connect(&mut engine, 1);
    let attr = attr(&engine, Role::PlanIdSetter);

    prepare(&engine, 1, attr, 0, b"plan-");
    prepare(&engine, 2, attr, 9, b"0042");
    execute(&engine, 3, false);
    dispatch_pending(&mut engine);
    let statuses: Vec<_> = engine.radio().take_responses().iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![STATUS_SUCCESS, ATT_INVALID_OFFSET, STATUS_SUCCESS]);
    assert!(engine.credentials().plan_id().is_empty());
    assert!(!engine.credentials().is_updated());

    // Nothing carried over from the cancelled queue.
    execute(&engine, 4, true);
    dispatch_pending(&mut engine);
    assert_eq!(engine.radio().take_responses()[0].status, STATUS_SUCCESS);
    assert!(engine.credentials().plan_id().is_empty());
}

#[test]
fn executed_value_still_checked_by_engine() {
    let mut engine = sim_engine(Vec::new());
    connect(&mut engine, 1);
    let ssid = attr(&engine, Role::SsidSetter);
    let manufacturer = engine.radio().handle_of(CHAR_MANUFACTURER).unwrap();

    prepare(&engine, 1, manufacturer, 0, b"x");
    prepare(&engine, 2, ssid, 0, &[b's'; 20]);
    prepare(&engine, 3, ssid, 20, &[b's'; 20]);
    execute(&engine, 4, true);
    dispatch_pending(&mut engine);
    let statuses: Vec<_> = engine.radio().take_responses().iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![STATUS_WRITE_NOT_PERMITTED, STATUS_SUCCESS, STATUS_SUCCESS, STATUS_INVALID_LENGTH]
    );
    assert!(engine.credentials().ssid().is_empty());

    prepare(&engine, 5, ssid, 0, &vec![0; ATT_MAX_VALUE_LEN + 1]);
    dispatch_pending(&mut engine);
    assert_eq!(engine.radio().take_responses()[0].status, STATUS_INVALID_LENGTH);
}

#[test]
fn disconnect_discards_prepared_fragments() {
    let mut engine = sim_engine(Vec::new());
    connect(&mut engine, 1);
    let attr = attr(&engine, Role::TokenSetter);
    prepare(&engine, 1, attr, 0, b"half-a-tok");
    engine.radio().inject(RadioEvent::Disconnected { handle: 1 });
    dispatch_pending(&mut engine);
    assert_eq!(engine.radio().pending_prepared(1), 0);

    // A reconnecting peer starts from an empty queue.
    connect(&mut engine, 1);
    prepare(&engine, 2, attr, 10, b"en");
    dispatch_pending(&mut engine);
    assert_eq!(engine.radio().take_responses().last().map(|r| r.status), Some(ATT_INVALID_OFFSET));
}

#[test]
fn unusable_password_keeps_device_reachable() {
    let mut engine = sim_engine(Vec::new());
    connect(&mut engine, 1);
    gatt_write(&engine, 1, Role::SsidSetter, b"Greenhouse");
    gatt_write(&engine, 2, Role::PasswordSetter, b"abc");
    gatt_write(&engine, 3, Role::BlinkupTrigger, b"");
    dispatch_pending(&mut engine);

    let responses = engine.radio().take_responses();
    assert_eq!(responses[2].status, STATUS_VALUE_NOT_ALLOWED);
    assert_eq!(engine.phase(), Phase::Serving);
    assert_eq!(engine.peer().map(|p| p.handle), Some(1));
    assert!(engine.radio().advert().is_some());
    assert!(engine.wifi().stored().is_none());

    // A WEP-40 key is usable, so the same session now completes.
    gatt_write(&engine, 4, Role::PasswordSetter, b"abcde");
    gatt_write(&engine, 5, Role::BlinkupTrigger, b"");
    dispatch_pending(&mut engine);
    assert_eq!(engine.phase(), Phase::Activated);
    assert_eq!(engine.wifi().stored(), Some((&b"Greenhouse"[..], "abcde")));
}

#[test]
fn trigger_before_credentials_answers_not_ready() {
    let mut engine = sim_engine(Vec::new());
    gatt_write(&engine, 9, Role::BlinkupTrigger, b"");
    dispatch_pending(&mut engine);
    let responses = engine.radio().take_responses();
    assert_eq!(responses[0].status, STATUS_NOT_READY);
    assert_eq!(engine.phase(), Phase::Serving);
}

#[test]
fn write_without_response_is_silent() {
    let mut engine = sim_engine(Vec::new());
    let attr = attr(&engine, Role::SsidSetter);
    engine.radio().inject(RadioEvent::Write {
        handle: 1,
        trans_id: 1,
        attr,
        data: b"Quiet".to_vec(),
        need_rsp: false,
    });
    dispatch_pending(&mut engine);
    assert!(engine.radio().take_responses().is_empty());
    assert_eq!(engine.credentials().ssid(), b"Quiet");
}

#[test]
fn static_characteristics_are_not_writable() {
    let mut engine = sim_engine(Vec::new());
    let manufacturer = engine.radio().handle_of(CHAR_MANUFACTURER).unwrap();
    engine.radio().inject(RadioEvent::Write {
        handle: 1,
        trans_id: 1,
        attr: manufacturer,
        data: b"Someone Else".to_vec(),
        need_rsp: true,
    });
    engine.radio().inject(RadioEvent::Write {
        handle: 1,
        trans_id: 2,
        attr: 0xFFF0,
        data: Vec::new(),
        need_rsp: true,
    });
    dispatch_pending(&mut engine);
    let statuses: Vec<_> = engine.radio().take_responses().iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![STATUS_WRITE_NOT_PERMITTED, ATT_INVALID_HANDLE]);
}

#[test]
fn reads_honour_offset() {
    let mut engine = sim_engine(Vec::new());
    let manufacturer = engine.radio().handle_of(CHAR_MANUFACTURER).unwrap();
    for (trans_id, offset) in [(1, 0), (2, 9), (3, 12), (4, 13)] {
        engine.radio().inject(RadioEvent::Read {
            handle: 1,
            trans_id,
            attr: manufacturer,
            offset,
        });
    }
    dispatch_pending(&mut engine);
    let r = engine.radio().take_responses();
    assert_eq!(r[0].value, b"Electric Imp");
    assert_eq!(r[1].value, b"Imp");
    assert!(r[2].value.is_empty());
    assert_eq!(r[2].status, STATUS_SUCCESS);
    assert_eq!(r[3].status, ATT_INVALID_OFFSET);
}

#[test]
fn network_list_read_after_scan() {
    let mut engine = sim_engine(vec![
        NetworkRecord::new("Greenhouse", "00:11:22:33:44:55", false),
        NetworkRecord::new("Cafe", "00:11:22:33:44:66", true),
        NetworkRecord::new("Greenhouse", "00:11:22:33:44:77", false),
    ]);
    assert!(engine.start_scanning(false).is_none());

    let getter = attr(&engine, Role::WifiGetter);
    engine.radio().inject(RadioEvent::Read {
        handle: 1,
        trans_id: 1,
        attr: getter,
        offset: 0,
    });
    dispatch_pending(&mut engine);
    let r = engine.radio().take_responses();
    assert_eq!(r[0].value, b"Greenhouse\nlocked\n\nCafe\nunlocked");
}

#[test]
fn tracked_disconnect_readvertises() {
    let mut engine = sim_engine(Vec::new());
    engine.radio().inject(RadioEvent::Connected {
        handle: 3,
        address: "aa:aa:aa:aa:aa:aa".into(),
        security: SecurityMode::None,
    });
    dispatch_pending(&mut engine);
    assert_eq!(engine.peer().map(|p| p.handle), Some(3));

    engine.radio().inject(RadioEvent::Disconnected { handle: 3 });
    dispatch_pending(&mut engine);
    assert!(engine.peer().is_none());
    assert!(engine.radio().advert().is_some());
}

#[test]
fn wifi_clear_over_gatt() {
    let mut engine = sim_engine(Vec::new());
    engine.radio().inject(RadioEvent::Connected {
        handle: 5,
        address: "bb:bb:bb:bb:bb:bb".into(),
        security: SecurityMode::None,
    });
    gatt_write(&engine, 1, Role::WifiClearTrigger, b"");
    dispatch_pending(&mut engine);

    assert_eq!(engine.radio().take_responses()[0].status, STATUS_SUCCESS);
    assert!(engine.wifi().stored().is_none());
    assert_eq!(engine.radio().closed_peers(), &[5]);
    assert!(engine.peer().is_none());
}
