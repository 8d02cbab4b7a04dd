//! Port traits: the hexagonal boundary between the provisioning engine and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ BlinkUp (domain)
//! ```
//!
//! The radio, Wi-Fi, persistence, and system primitives are all external
//! collaborators.  The engine owns one implementation of each, injected at
//! construction, so every one of them can be swapped for a test double.
//!
//! ## Security notes
//!
//! - **EnrollmentPort** and **WifiPort** implementations receive secrets;
//!   they MUST NOT log them and SHOULD persist them in encrypted storage.
//! - **ConfigPort** implementations MUST validate before persisting.

use core::fmt;

use super::advert::AdvertInterval;
use super::events::{HostEvent, PeerHandle};
use super::gatt::{DeviceInfo, Service};
use super::security::{Pin, SecurityMode};
use super::wifi_scan::NetworkRecord;
use crate::config::EngineConfig;

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: domain → BLE stack)
// ───────────────────────────────────────────────────────────────

/// The BLE radio driver.  All GATT traffic arrives through the engine's
/// `on_*` callbacks; the engine calls back into the radio only through
/// this trait.
pub trait RadioPort {
    /// Power up the controller, loading `firmware` where the part needs it.
    fn open(&mut self, firmware: Option<&[u8]>) -> Result<(), RadioError>;

    /// Shut the controller down.  Safe to call when already closed.
    fn close(&mut self);

    /// Register the full attribute table.
    fn serve(&mut self, services: &[Service]) -> Result<(), RadioError>;

    fn start_advertise(&mut self, payload: &[u8], interval: AdvertInterval) -> Result<(), RadioError>;

    fn stop_advertise(&mut self);

    /// Enforce a pairing mode; `pin` is only ever `Some` for modes 3/4.
    fn set_security(&mut self, mode: SecurityMode, pin: Option<Pin>);

    /// Drop a peer connection.
    fn close_peer(&mut self, handle: PeerHandle);
}

// ───────────────────────────────────────────────────────────────
// Wi-Fi port (driven adapter: domain ↔ Wi-Fi driver)
// ───────────────────────────────────────────────────────────────

pub trait WifiPort {
    /// Raw scan results, duplicates included.
    fn scan(&mut self) -> Result<Vec<NetworkRecord>, NetworkError>;

    /// Whether [`set_credentials`](Self::set_credentials) would accept this
    /// pair.  Called before the apply sequence tears anything down.
    fn check_credentials(&self, _ssid: &[u8], _password: &str) -> Result<(), NetworkError> {
        Ok(())
    }

    /// Persist station credentials for the next boot.  `ssid` is raw octets.
    fn set_credentials(&mut self, ssid: &[u8], password: &str) -> Result<(), NetworkError>;

    /// Erase stored station credentials.
    fn clear_credentials(&mut self) -> Result<(), NetworkError>;
}

// ───────────────────────────────────────────────────────────────
// Enrollment port (driven adapter: domain ↔ persistent store)
// ───────────────────────────────────────────────────────────────

pub trait EnrollmentPort {
    /// Persist back-end enrollment credentials.
    fn set_enrollment(&mut self, plan_id: &str, token: &str) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// System port (driven adapter: domain ↔ device runtime)
// ───────────────────────────────────────────────────────────────

pub trait SystemPort {
    /// Live metadata for the Device Information service.
    fn device_info(&self) -> DeviceInfo;

    /// Flush and disconnect the parent-service session, waiting at most
    /// `timeout_secs`.
    fn flush_parent_session(&mut self, timeout_secs: u32) -> Result<(), NetworkError>;

    /// Full device restart.
    fn reboot(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → host application)
// ───────────────────────────────────────────────────────────────

/// The host callback.  Adapters decide where events go (host code, log).
pub trait EventSink {
    fn emit(&mut self, event: &HostEvent);
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (driving adapter: timer → domain)
// ───────────────────────────────────────────────────────────────

/// The kind of schedule that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleFiredKind {
    Periodic,
    OneShot,
}

/// Receives notifications from [`crate::scheduler::Scheduler::tick`].
pub trait SchedulerDelegate {
    fn on_schedule_fired(&mut self, label: &'static str, kind: ScheduleFiredKind);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists engine configuration.
///
/// # Security
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Returns [`EngineConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<EngineConfig, ConfigError>;

    fn save(&self, config: &EngineConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage, namespaced per subsystem.
///
/// Write operations MUST be atomic; no partial writes on power loss.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// Controller power-up or firmware load failed.
    OpenFailed,
    /// Operation attempted on a closed radio.
    NotOpen,
    /// Attribute table registration failed.
    ServeFailed,
    AdvertiseFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    ScanFailed,
    /// The SSID or password is outside what the station driver accepts.
    InvalidCredentials,
    /// The station configuration could not be written or erased.
    ConfigFailed,
    /// The parent session did not flush within its timeout.
    SessionTimeout,
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// The `&'static str` names the field and the allowed range.
    ValidationFailed(&'static str),
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    IoError,
    /// Value exceeds what the backend can hold under one key.
    TooLarge,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "radio open failed"),
            Self::NotOpen => write!(f, "radio not initialised"),
            Self::ServeFailed => write!(f, "GATT serve failed"),
            Self::AdvertiseFailed => write!(f, "advertising failed"),
        }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanFailed => write!(f, "WiFi scan failed"),
            Self::InvalidCredentials => write!(f, "WiFi credentials rejected"),
            Self::ConfigFailed => write!(f, "WiFi configuration failed"),
            Self::SessionTimeout => write!(f, "parent session flush timed out"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::TooLarge => write!(f, "value too large"),
        }
    }
}
