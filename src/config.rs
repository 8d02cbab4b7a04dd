//! Engine configuration parameters
//!
//! All tunable timing for the BlinkUp engine and its radio bring-up.
//! Values can be overridden via NVS (see [`crate::adapters::nvs`]).

use serde::{Deserialize, Serialize};

use log::{info, warn};

use crate::app::advert::ADV_INTERVAL_CEILING_MS;
use crate::app::ports::{ConfigError, ConfigPort};
use crate::pins::MAX_GPIO;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Advertising ---
    /// Default minimum advertising interval (ms, 0–100)
    pub adv_min_interval_ms: u16,
    /// Default maximum advertising interval (ms, 0–100)
    pub adv_max_interval_ms: u16,

    // --- WiFi ---
    /// Period of the repeating network scan (seconds)
    pub scan_interval_secs: u32,

    // --- Apply sequence ---
    /// Upper bound on the parent-session flush (seconds)
    pub flush_timeout_secs: u32,
    /// Delay between activation and reboot (seconds, 0 = next idle tick)
    pub reboot_delay_secs: u32,

    // --- Timing ---
    /// Minimum wait after powering the radio before it is opened (ms)
    pub radio_boot_delay_ms: u32,
    /// Main loop tick (ms)
    pub tick_interval_ms: u32,

    // --- Board ---
    /// Radio regulator enable GPIO; `None` keeps the variant default
    pub radio_enable_pin: Option<i32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            adv_min_interval_ms: ADV_INTERVAL_CEILING_MS,
            adv_max_interval_ms: ADV_INTERVAL_CEILING_MS,

            scan_interval_secs: 120,

            flush_timeout_secs: 10,
            reboot_delay_secs: 0,

            radio_boot_delay_ms: 10,
            tick_interval_ms: 1000, // 1 Hz

            radio_enable_pin: None,
        }
    }
}

impl EngineConfig {
    /// Tick length in seconds, as fed to the scheduler.
    pub fn tick_secs(&self) -> f32 {
        self.tick_interval_ms as f32 / 1000.0
    }
}

/// Range-check every field.  Out-of-range values are rejected, never clamped.
pub fn validate_config(cfg: &EngineConfig) -> Result<(), ConfigError> {
    if cfg.adv_min_interval_ms > ADV_INTERVAL_CEILING_MS || cfg.adv_max_interval_ms > ADV_INTERVAL_CEILING_MS {
        return Err(ConfigError::ValidationFailed("advertising intervals must be 0–100 ms"));
    }
    if cfg.adv_min_interval_ms > cfg.adv_max_interval_ms {
        return Err(ConfigError::ValidationFailed(
            "adv_min_interval_ms must be <= adv_max_interval_ms",
        ));
    }
    if !(10..=3600).contains(&cfg.scan_interval_secs) {
        return Err(ConfigError::ValidationFailed("scan_interval_secs must be 10–3600"));
    }
    if !(1..=60).contains(&cfg.flush_timeout_secs) {
        return Err(ConfigError::ValidationFailed("flush_timeout_secs must be 1–60"));
    }
    if cfg.reboot_delay_secs > 300 {
        return Err(ConfigError::ValidationFailed("reboot_delay_secs must be 0–300"));
    }
    if !(1..=1000).contains(&cfg.radio_boot_delay_ms) {
        return Err(ConfigError::ValidationFailed("radio_boot_delay_ms must be 1–1000"));
    }
    if !(100..=5000).contains(&cfg.tick_interval_ms) {
        return Err(ConfigError::ValidationFailed("tick_interval_ms must be 100–5000"));
    }
    if cfg.radio_enable_pin.is_some_and(|pin| !(0..=MAX_GPIO).contains(&pin)) {
        return Err(ConfigError::ValidationFailed("radio_enable_pin must be GPIO 0–48"));
    }
    Ok(())
}

/// Stored config, or defaults written back when it is missing, unreadable,
/// or out of range.
pub fn load_or_repair<C: ConfigPort>(port: &C) -> EngineConfig {
    let err = match port.load().and_then(|cfg| validate_config(&cfg).map(|()| cfg)) {
        Ok(cfg) => {
            info!("Config: loaded");
            return cfg;
        }
        Err(e) => e,
    };
    warn!("Config: {}, restoring defaults", err);
    let defaults = EngineConfig::default();
    if let Err(e) = port.save(&defaults) {
        warn!("Config: could not persist defaults: {}", e);
    }
    defaults
}
