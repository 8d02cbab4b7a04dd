//! Mock port implementations for integration tests.
//!
//! Each mock records every call so tests can assert on the full history
//! without a radio, a Wi-Fi driver, or flash.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use blinkup::app::advert::AdvertInterval;
use blinkup::app::events::{HostEvent, PeerHandle};
use blinkup::app::gatt::{DeviceInfo, Service};
use blinkup::app::ports::{
    EnrollmentPort, EventSink, NetworkError, RadioError, RadioPort, StorageError, SystemPort, WifiPort,
};
use blinkup::app::security::{Pin, SecurityMode};
use blinkup::app::uuids::Role;
use blinkup::app::wifi_scan::NetworkRecord;
use blinkup::config::EngineConfig;
use blinkup::BlinkUp;

// ── Radio call record ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RadioCall {
    Open { firmware_len: usize },
    Close,
    Serve { services: usize },
    Advertise { payload: Vec<u8>, interval: AdvertInterval },
    StopAdvertise,
    Security { mode: SecurityMode, pin: Option<Pin> },
    ClosePeer(PeerHandle),
}

// ── MockRadio ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockRadio {
    pub calls: Vec<RadioCall>,
    pub served: Vec<Service>,
}

#[allow(dead_code)]
impl MockRadio {
    pub fn count(&self, pred: impl Fn(&RadioCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn last_advert(&self) -> Option<&[u8]> {
        self.calls.iter().rev().find_map(|c| match c {
            RadioCall::Advertise { payload, .. } => Some(payload.as_slice()),
            _ => None,
        })
    }
}

impl RadioPort for MockRadio {
    fn open(&mut self, firmware: Option<&[u8]>) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Open {
            firmware_len: firmware.map_or(0, <[u8]>::len),
        });
        Ok(())
    }

    fn close(&mut self) {
        self.calls.push(RadioCall::Close);
    }

    fn serve(&mut self, services: &[Service]) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Serve {
            services: services.len(),
        });
        self.served = services.to_vec();
        Ok(())
    }

    fn start_advertise(&mut self, payload: &[u8], interval: AdvertInterval) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Advertise {
            payload: payload.to_vec(),
            interval,
        });
        Ok(())
    }

    fn stop_advertise(&mut self) {
        self.calls.push(RadioCall::StopAdvertise);
    }

    fn set_security(&mut self, mode: SecurityMode, pin: Option<Pin>) {
        self.calls.push(RadioCall::Security { mode, pin });
    }

    fn close_peer(&mut self, handle: PeerHandle) {
        self.calls.push(RadioCall::ClosePeer(handle));
    }
}

// ── MockWifi ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockWifi {
    /// Returned by every scan until replaced.
    pub networks: Vec<NetworkRecord>,
    pub scans: usize,
    pub stored: Option<(Vec<u8>, String)>,
    pub cleared: usize,
    pub fail_store: bool,
    /// Password refused at the pre-apply check.
    pub reject_password: Option<String>,
}

impl WifiPort for MockWifi {
    fn scan(&mut self) -> Result<Vec<NetworkRecord>, NetworkError> {
        self.scans += 1;
        Ok(self.networks.clone())
    }

    fn check_credentials(&self, _ssid: &[u8], password: &str) -> Result<(), NetworkError> {
        if self.reject_password.as_deref() == Some(password) {
            return Err(NetworkError::InvalidCredentials);
        }
        Ok(())
    }

    fn set_credentials(&mut self, ssid: &[u8], password: &str) -> Result<(), NetworkError> {
        if self.fail_store {
            return Err(NetworkError::ConfigFailed);
        }
        self.stored = Some((ssid.to_vec(), password.to_string()));
        Ok(())
    }

    fn clear_credentials(&mut self) -> Result<(), NetworkError> {
        self.cleared += 1;
        self.stored = None;
        Ok(())
    }
}

// ── MockSystem ────────────────────────────────────────────────

pub struct MockSystem {
    pub device_type: &'static str,
    pub flush_result: Result<(), NetworkError>,
    pub flushes: Vec<u32>,
    pub enrollment: Option<(String, String)>,
    pub fail_enrollment: bool,
    pub reboots: usize,
}

impl MockSystem {
    pub fn new(device_type: &'static str) -> Self {
        Self {
            device_type,
            flush_result: Ok(()),
            flushes: Vec::new(),
            enrollment: None,
            fail_enrollment: false,
            reboots: 0,
        }
    }
}

impl SystemPort for MockSystem {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            hardware_id: "0c2a69a1b2c3".into(),
            device_type: self.device_type.into(),
            agent_url: Some("https://agent.electricimp.com/abc".into()),
            os_version: "43.1.0".into(),
        }
    }

    fn flush_parent_session(&mut self, timeout_secs: u32) -> Result<(), NetworkError> {
        self.flushes.push(timeout_secs);
        self.flush_result
    }

    fn reboot(&mut self) {
        self.reboots += 1;
    }
}

impl EnrollmentPort for MockSystem {
    fn set_enrollment(&mut self, plan_id: &str, token: &str) -> Result<(), StorageError> {
        if self.fail_enrollment {
            return Err(StorageError::IoError);
        }
        self.enrollment = Some((plan_id.to_string(), token.to_string()));
        Ok(())
    }
}

// ── Event capture ─────────────────────────────────────────────

pub struct CaptureSink(pub Arc<Mutex<Vec<HostEvent>>>);

impl EventSink for CaptureSink {
    fn emit(&mut self, event: &HostEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

// ── Helpers ───────────────────────────────────────────────────

pub type MockEngine = BlinkUp<MockRadio, MockWifi, MockSystem>;

pub fn uuid_map() -> HashMap<String, String> {
    [
        ("blinkup_service", "FADA47BE-C455-48C9-A5F2-AF7CF368D719"),
        ("ssid_setter", "5EBA1956-32D3-47C6-81A6-A7E59F18DAC0"),
        ("password_setter", "ED694AB9-4756-4528-AA3A-799A4FD11117"),
        ("planid_setter", "A90AB0DC-7B5C-439A-9AB5-2107E0BD816E"),
        ("token_setter", "BD107D3E-4878-4F6D-AF3D-DA3B234FF584"),
        ("blinkup_trigger", "F299C342-8A8A-4544-AC42-08C841737B1B"),
        ("wifi_getter", "57A9ED95-ADD5-4913-8494-57759B79A46C"),
        ("wifi_clear_trigger", "2BE5DDBA-3286-4D09-A652-F24FAA514AF5"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn engine_with(system: MockSystem, wifi: MockWifi) -> MockEngine {
    BlinkUp::new(
        &uuid_map(),
        EngineConfig::default(),
        MockRadio::default(),
        wifi,
        system,
        Some(&[0xA5; 64]),
    )
    .unwrap()
}

/// Engine for an imp006 that is already serving, with events captured.
pub fn serving_engine() -> (MockEngine, Arc<Mutex<Vec<HostEvent>>>) {
    let mut engine = engine_with(MockSystem::new("imp006"), MockWifi::default());
    let events = capture(&mut engine);
    assert!(engine.serve(None, None, None, None));
    (engine, events)
}

pub fn capture(engine: &mut MockEngine) -> Arc<Mutex<Vec<HostEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    engine.on_event(Box::new(CaptureSink(Arc::clone(&log))));
    log
}

pub fn write(engine: &mut MockEngine, role: Role, data: &[u8]) -> u16 {
    let uuid = engine.uuids().get(role);
    engine.handle_write(uuid, data)
}
