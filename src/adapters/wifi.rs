//! WiFi station adapter.
//!
//! Implements [`WifiPort`]: nearby-network scans plus persistence of the
//! station configuration that the next boot joins.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: ESP-IDF WiFi driver calls (`esp_wifi_*`).
//!   The driver must already be initialised and started in STA mode.
//! - **all other targets**: in-memory simulation for host-side runs.

use log::{info, warn};

use crate::app::ports::{NetworkError, WifiPort};
use crate::app::wifi_scan::NetworkRecord;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Upper bound on records pulled from one scan.
pub const MAX_SCAN_RECORDS: usize = 20;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

/// Any octets, 1 to 32 of them.
fn validate_ssid(ssid: &[u8]) -> Result<(), NetworkError> {
    if ssid.is_empty() || ssid.len() > 32 {
        warn!("WiFi: SSID must be 1-32 bytes, got {}", ssid.len());
        return Err(NetworkError::InvalidCredentials);
    }
    Ok(())
}

/// WEP-40/104 ASCII keys are 5 and 13 bytes.
const WEP_KEY_LENS: [usize; 2] = [5, 13];

/// Empty for open networks, a WEP ASCII key, or 8–64 bytes (WPA passphrase
/// or hex PSK).
fn validate_password(password: &str) -> Result<(), NetworkError> {
    let len = password.len();
    if len == 0 || WEP_KEY_LENS.contains(&len) || (8..=64).contains(&len) {
        return Ok(());
    }
    warn!("WiFi: password length {} fits no supported key type", len);
    Err(NetworkError::InvalidCredentials)
}

/// Format a 6-byte BSSID as `aa:bb:cc:dd:ee:ff`.
pub fn format_bssid(bssid: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        bssid[0], bssid[1], bssid[2], bssid[3], bssid[4], bssid[5]
    )
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    /// Simulation: what the next scan returns.
    #[cfg(not(target_os = "espidf"))]
    sim_networks: Vec<NetworkRecord>,
    /// Simulation: persisted STA config.
    #[cfg(not(target_os = "espidf"))]
    sim_stored: Option<(Vec<u8>, String)>,
}

impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            sim_networks: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_stored: None,
        }
    }

    /// Simulation: set the networks the next scans report.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_sim_networks(&mut self, networks: Vec<NetworkRecord>) {
        self.sim_networks = networks;
    }

    /// Simulation: the stored `(ssid, password)`, if any.
    #[cfg(not(target_os = "espidf"))]
    pub fn stored(&self) -> Option<(&[u8], &str)> {
        self.sim_stored.as_ref().map(|(s, p)| (s.as_slice(), p.as_str()))
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_scan(&mut self) -> Result<Vec<NetworkRecord>, NetworkError> {
        // SAFETY: the WiFi driver is started before the engine exists and
        // only this task issues scans.
        let ret = unsafe { esp_wifi_scan_start(core::ptr::null(), true) };
        if ret != ESP_OK {
            warn!("WiFi(espidf): scan start failed ({})", ret);
            return Err(NetworkError::ScanFailed);
        }

        let mut records: [wifi_ap_record_t; MAX_SCAN_RECORDS] = unsafe { core::mem::zeroed() };
        let mut count = MAX_SCAN_RECORDS as u16;
        let ret = unsafe { esp_wifi_scan_get_ap_records(&mut count, records.as_mut_ptr()) };
        if ret != ESP_OK {
            warn!("WiFi(espidf): reading scan records failed ({})", ret);
            return Err(NetworkError::ScanFailed);
        }

        let list = records[..usize::from(count).min(MAX_SCAN_RECORDS)]
            .iter()
            .map(|r| {
                let len = r.ssid.iter().position(|&b| b == 0).unwrap_or(r.ssid.len());
                NetworkRecord::from_raw(
                    &r.ssid[..len],
                    &format_bssid(&r.bssid),
                    r.authmode == wifi_auth_mode_t_WIFI_AUTH_OPEN,
                )
            })
            .collect();
        Ok(list)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_scan(&mut self) -> Result<Vec<NetworkRecord>, NetworkError> {
        info!("WiFi(sim): scan returned {} records", self.sim_networks.len());
        Ok(self.sim_networks.clone())
    }

    #[cfg(target_os = "espidf")]
    fn platform_store(&mut self, ssid: &[u8], password: &str) -> Result<(), NetworkError> {
        let mut conf: wifi_config_t = unsafe { core::mem::zeroed() };
        // SAFETY: `sta` is the active union member for WIFI_IF_STA; lengths
        // were validated against the field sizes.
        unsafe {
            conf.sta.ssid[..ssid.len()].copy_from_slice(ssid);
            conf.sta.password[..password.len()].copy_from_slice(password.as_bytes());
        }
        let ret = unsafe {
            esp_wifi_set_storage(wifi_storage_t_WIFI_STORAGE_FLASH);
            esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut conf)
        };
        if ret != ESP_OK {
            warn!("WiFi(espidf): set_config failed ({})", ret);
            return Err(NetworkError::ConfigFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_store(&mut self, ssid: &[u8], password: &str) -> Result<(), NetworkError> {
        self.sim_stored = Some((ssid.to_vec(), password.to_string()));
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_erase(&mut self) -> Result<(), NetworkError> {
        let mut conf: wifi_config_t = unsafe { core::mem::zeroed() };
        let ret = unsafe {
            esp_wifi_set_storage(wifi_storage_t_WIFI_STORAGE_FLASH);
            esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut conf)
        };
        if ret != ESP_OK {
            warn!("WiFi(espidf): erase failed ({})", ret);
            return Err(NetworkError::ConfigFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_erase(&mut self) -> Result<(), NetworkError> {
        self.sim_stored = None;
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// WifiPort
// ───────────────────────────────────────────────────────────────

impl WifiPort for WifiAdapter {
    fn scan(&mut self) -> Result<Vec<NetworkRecord>, NetworkError> {
        self.platform_scan()
    }

    fn check_credentials(&self, ssid: &[u8], password: &str) -> Result<(), NetworkError> {
        validate_ssid(ssid)?;
        validate_password(password)
    }

    fn set_credentials(&mut self, ssid: &[u8], password: &str) -> Result<(), NetworkError> {
        self.check_credentials(ssid, password)?;
        self.platform_store(ssid, password)?;
        info!("WiFi: credentials stored (SSID='{}')", String::from_utf8_lossy(ssid));
        Ok(())
    }

    fn clear_credentials(&mut self) -> Result<(), NetworkError> {
        self.platform_erase()?;
        info!("WiFi: stored configuration erased");
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
