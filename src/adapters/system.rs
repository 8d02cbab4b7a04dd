//! Device runtime adapter.
//!
//! Implements [`SystemPort`] (identity, parent-session flush, reboot) and
//! forwards [`EnrollmentPort`] to the persistent store it wraps, so the
//! engine sees one collaborator for everything the device itself owns.
//!
//! The hardware ID is derived from the factory MAC address in eFuse and is
//! stable across reboots.

use log::{debug, info};

use crate::app::gatt::DeviceInfo;
use crate::app::ports::{EnrollmentPort, NetworkError, StorageError, SystemPort};

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Flush hook for the parent-service session, called with the timeout in
/// seconds.
pub type SessionFlush = Box<dyn FnMut(u32) -> Result<(), NetworkError> + Send>;

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x0C, 0x2A, 0x69, 0x00, 0x00, 0x01]
}

/// The MAC as 12 lowercase hex digits.
pub fn hardware_id(mac: &MacAddress) -> String {
    mac.iter().map(|b| format!("{:02x}", b)).collect()
}

pub struct SystemAdapter<E> {
    device_type: &'static str,
    agent_url: Option<String>,
    storage: E,
    session_flush: Option<SessionFlush>,
    #[cfg(not(target_os = "espidf"))]
    sim_reboots: u32,
}

impl<E: EnrollmentPort> SystemAdapter<E> {
    pub fn new(device_type: &'static str, storage: E) -> Self {
        Self {
            device_type,
            agent_url: None,
            storage,
            session_flush: None,
            #[cfg(not(target_os = "espidf"))]
            sim_reboots: 0,
        }
    }

    /// Companion-service URL reported as the Device Information system ID.
    pub fn set_agent_url(&mut self, url: Option<String>) {
        self.agent_url = url;
    }

    /// Register the hook that flushes and closes the parent session.
    pub fn set_session_flush(&mut self, flush: SessionFlush) {
        self.session_flush = Some(flush);
    }

    pub fn storage(&self) -> &E {
        &self.storage
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_reboots(&self) -> u32 {
        self.sim_reboots
    }

    #[cfg(target_os = "espidf")]
    fn os_version() -> String {
        // SAFETY: returns a pointer to a static NUL-terminated string.
        let raw = unsafe { core::ffi::CStr::from_ptr(esp_idf_svc::sys::esp_get_idf_version()) };
        raw.to_string_lossy().into_owned()
    }

    #[cfg(not(target_os = "espidf"))]
    fn os_version() -> String {
        "sim".to_string()
    }
}

impl<E: EnrollmentPort> SystemPort for SystemAdapter<E> {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            hardware_id: hardware_id(&read_mac()),
            device_type: self.device_type.to_string(),
            agent_url: self.agent_url.clone(),
            os_version: Self::os_version(),
        }
    }

    fn flush_parent_session(&mut self, timeout_secs: u32) -> Result<(), NetworkError> {
        match self.session_flush.as_mut() {
            Some(flush) => {
                info!("System: flushing parent session (timeout {}s)", timeout_secs);
                flush(timeout_secs)
            }
            None => {
                debug!("System: no parent session to flush");
                Ok(())
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn reboot(&mut self) {
        info!("System: restarting");
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn reboot(&mut self) {
        self.sim_reboots += 1;
        info!("System(sim): reboot #{}", self.sim_reboots);
    }
}

impl<E: EnrollmentPort> EnrollmentPort for SystemAdapter<E> {
    fn set_enrollment(&mut self, plan_id: &str, token: &str) -> Result<(), StorageError> {
        self.storage.set_enrollment(plan_id, token)
    }
}
