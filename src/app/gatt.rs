//! GATT service model for the BlinkUp and Device Information services.
//!
//! ## BlinkUp service (caller-supplied UUIDs)
//!
//! | Role                 | Perms  | Behaviour                                  |
//! |----------------------|--------|--------------------------------------------|
//! | `ssid_setter`        | Write  | store SSID, mark updated                   |
//! | `password_setter`    | Write  | store password, mark updated               |
//! | `planid_setter`      | Write  | store plan ID, mark updated                |
//! | `token_setter`       | Write  | store enrollment token, mark updated       |
//! | `blinkup_trigger`    | Write  | apply + reboot if updated, else not-ready  |
//! | `wifi_clear_trigger` | Write  | close peer, erase Wi-Fi config             |
//! | `wifi_getter`        | Read   | newline-delimited network list             |
//!
//! ## Device Information service (`0x180A`)
//!
//! Manufacturer `0x2A29`, serial `0x2A25`, model `0x2A24`, system ID
//! `0x2A23`, firmware `0x2A26`. All are static reads.
//!
//! Characteristic values bound to a [`Role`] are produced by the engine's
//! dispatch table at access time; static values are served by the radio.

use crate::app::uuids::{Role, UuidSet};
use crate::hex::BleUuid;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const PROP_READ: u8 = 0x02;
pub const PROP_WRITE: u8 = 0x08;

pub const STATUS_SUCCESS: u16 = 0x0000;
pub const STATUS_WRITE_NOT_PERMITTED: u16 = 0x0003;
pub const STATUS_INVALID_LENGTH: u16 = 0x000D;
pub const STATUS_UNLIKELY_ERROR: u16 = 0x000E;
pub const STATUS_VALUE_NOT_ALLOWED: u16 = 0x0013;
/// Activation trigger written before any credential arrived.
pub const STATUS_NOT_READY: u16 = 0x1000;

pub const DEVICE_INFO_SERVICE: BleUuid = BleUuid::Short(0x180A);
pub const CHAR_MANUFACTURER: BleUuid = BleUuid::Short(0x2A29);
pub const CHAR_SERIAL_NUMBER: BleUuid = BleUuid::Short(0x2A25);
pub const CHAR_MODEL_NUMBER: BleUuid = BleUuid::Short(0x2A24);
pub const CHAR_SYSTEM_ID: BleUuid = BleUuid::Short(0x2A23);
pub const CHAR_FIRMWARE_REV: BleUuid = BleUuid::Short(0x2A26);

pub const MANUFACTURER_NAME: &str = "Electric Imp";

// ───────────────────────────────────────────────────────────────
// Model
// ───────────────────────────────────────────────────────────────

/// Where a characteristic's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharValue {
    /// Fixed bytes served by the radio without calling back.
    Static(Vec<u8>),
    /// Routed to the engine's handler for this role.
    Dispatch(Role),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: BleUuid,
    pub flags: u8,
    pub value: CharValue,
}

impl Characteristic {
    pub fn is_writable(&self) -> bool {
        self.flags & PROP_WRITE != 0
    }

    pub fn is_readable(&self) -> bool {
        self.flags & PROP_READ != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub uuid: BleUuid,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn find(&self, uuid: BleUuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Extra services appended verbatim after the two built-in ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraServices {
    One(Service),
    Many(Vec<Service>),
}

/// Live device metadata for the Device Information service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub hardware_id: String,
    pub device_type: String,
    pub agent_url: Option<String>,
    pub os_version: String,
}

// ───────────────────────────────────────────────────────────────
// Assembly
// ───────────────────────────────────────────────────────────────

fn dispatch(uuids: &UuidSet, role: Role, flags: u8) -> Characteristic {
    Characteristic {
        uuid: uuids.get(role),
        flags,
        value: CharValue::Dispatch(role),
    }
}

fn read_only(uuid: BleUuid, value: &str) -> Characteristic {
    Characteristic {
        uuid,
        flags: PROP_READ,
        value: CharValue::Static(value.as_bytes().to_vec()),
    }
}

pub fn blinkup_service(uuids: &UuidSet) -> Service {
    Service {
        uuid: uuids.get(Role::BlinkupService),
        characteristics: vec![
            dispatch(uuids, Role::SsidSetter, PROP_WRITE),
            dispatch(uuids, Role::PasswordSetter, PROP_WRITE),
            dispatch(uuids, Role::PlanIdSetter, PROP_WRITE),
            dispatch(uuids, Role::TokenSetter, PROP_WRITE),
            dispatch(uuids, Role::BlinkupTrigger, PROP_WRITE),
            dispatch(uuids, Role::WifiClearTrigger, PROP_WRITE),
            dispatch(uuids, Role::WifiGetter, PROP_READ),
        ],
    }
}

pub fn device_info_service(info: &DeviceInfo) -> Service {
    Service {
        uuid: DEVICE_INFO_SERVICE,
        characteristics: vec![
            read_only(CHAR_MANUFACTURER, MANUFACTURER_NAME),
            read_only(CHAR_SERIAL_NUMBER, &info.hardware_id),
            read_only(CHAR_MODEL_NUMBER, &info.device_type),
            read_only(CHAR_SYSTEM_ID, info.agent_url.as_deref().unwrap_or("null")),
            read_only(CHAR_FIRMWARE_REV, &info.os_version),
        ],
    }
}

/// BlinkUp service, Device Information service, then any extras.
pub fn build_services(uuids: &UuidSet, info: &DeviceInfo, extra: Option<ExtraServices>) -> Vec<Service> {
    let mut services = vec![blinkup_service(uuids), device_info_service(info)];
    match extra {
        Some(ExtraServices::One(s)) => services.push(s),
        Some(ExtraServices::Many(list)) => services.extend(list),
        None => {}
    }
    services
}
