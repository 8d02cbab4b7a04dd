//! BlinkUp Firmware: Main Entry Point
//!
//! Hexagonal architecture with a polled main loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BleAdapter    WifiAdapter    SystemAdapter    LogEventSink    │
//! │  (Radio)       (Wifi)         (System+Enroll)  (EventSink)     │
//! │                               └─ NvsAdapter (Config+Storage)   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              BlinkUp (pure logic)                      │    │
//! │  │  GATT dispatch · apply/reboot · network scans          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Scheduler (inside BlinkUp) · RadioPower (regulator)           │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{info, warn};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyOutputPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{Configuration, EspWifi};

use blinkup::adapters::ble::{dispatch_pending, BleAdapter};
use blinkup::adapters::log_sink::LogEventSink;
use blinkup::adapters::nvs::NvsAdapter;
use blinkup::adapters::system::SystemAdapter;
use blinkup::adapters::wifi::WifiAdapter;
use blinkup::config::load_or_repair;
use blinkup::drivers::radio_power::RadioPower;
use blinkup::pins::{DeviceVariant, RadioPins};
use blinkup::BlinkUp;

/// Board this image is built for; override with `BLINKUP_DEVICE_TYPE`.
const DEVICE_TYPE: &str = match option_env!("BLINKUP_DEVICE_TYPE") {
    Some(t) => t,
    None => "imp006",
};

/// Characteristic UUIDs the BlinkUp companion app expects.
const BLINKUP_UUIDS: [(&str, &str); 8] = [
    ("blinkup_service", "FADA47BEC45548C9A5F2AF7CF368D719"),
    ("ssid_setter", "5EBA195632D347C681A6A7E59F18DAC0"),
    ("password_setter", "ED694AB947564528AA3A799A4FD11117"),
    ("planid_setter", "A90AB0DC7B5C439A9AB52107E0BD816E"),
    ("token_setter", "BD107D3E48784F6DAF3DDA3B234FF584"),
    ("blinkup_trigger", "F299C3428A8A4544AC4208C841737B1B"),
    ("wifi_getter", "57A9ED95ADD54913849457759B79A46C"),
    ("wifi_clear_trigger", "2BE5DDBA32864D09A652F24FAA514AF5"),
];

/// Pause between inbox drains; GATT requests wait at most this long.
const POLL_INTERVAL_MS: u64 = 20;

/// Map the `radiofw` data partition holding the controller image.
fn radio_firmware() -> Option<&'static [u8]> {
    use esp_idf_svc::sys::*;
    // SAFETY: the partition table is static for the life of the program and
    // the mapping is never released.
    unsafe {
        let part = esp_partition_find_first(
            esp_partition_type_t_ESP_PARTITION_TYPE_DATA,
            esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_ANY,
            c"radiofw".as_ptr(),
        );
        if part.is_null() {
            return None;
        }
        let size = (*part).size as usize;
        let mut ptr: *const core::ffi::c_void = core::ptr::null();
        let mut handle: esp_partition_mmap_handle_t = 0;
        let ret = esp_partition_mmap(
            part,
            0,
            size,
            esp_partition_mmap_memory_t_ESP_PARTITION_MMAP_DATA,
            &mut ptr,
            &mut handle,
        );
        if ret != ESP_OK || ptr.is_null() {
            warn!("radiofw partition could not be mapped ({})", ret);
            return None;
        }
        Some(core::slice::from_raw_parts(ptr.cast::<u8>(), size))
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  BlinkUp v{}                         ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 2. Load config from NVS (defaults restored if unusable) ──
    let nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {}", e))?;
    let config = load_or_repair(&nvs);

    // ── 3. Radio power ────────────────────────────────────────
    let variant = DeviceVariant::from_device_type(DEVICE_TYPE)
        .ok_or_else(|| anyhow!("unsupported device type '{}'", DEVICE_TYPE))?;
    let radio_pins = RadioPins::resolve(variant, config.radio_enable_pin);
    info!("Radio enable on GPIO{}", radio_pins.power_enable);
    // SAFETY: the enable pin is owned by nothing else on this board, and
    // validate_config bounds an override to real GPIOs.
    let enable = PinDriver::output(unsafe { AnyOutputPin::new(radio_pins.power_enable) })?;
    let mut power = RadioPower::new(enable);
    power
        .power_up(&mut FreeRtos, config.radio_boot_delay_ms)
        .map_err(|e| anyhow!("{}", e))?;

    // ── 4. WiFi driver (scans + stored STA config) ────────────
    let mut esp_wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))?;
    esp_wifi.set_configuration(&Configuration::Client(Default::default()))?;
    esp_wifi.start()?;

    // ── 5. Construct adapters ─────────────────────────────────
    let name = heapless::String::<24>::try_from(variant.name())
        .map_err(|()| anyhow!("device name '{}' too long", variant.name()))?;
    let ble = BleAdapter::new(name);
    let wifi = WifiAdapter::new();
    let system = SystemAdapter::new(DEVICE_TYPE, nvs);

    let firmware = if variant.requires_firmware() { radio_firmware() } else { None };

    let uuids: HashMap<String, String> = BLINKUP_UUIDS
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();

    // ── 6. Construct the engine ───────────────────────────────
    let tick_ms = u64::from(config.tick_interval_ms);
    let tick_secs = config.tick_secs();
    let mut engine = BlinkUp::new(&uuids, config, ble, wifi, system, firmware)?;
    engine.on_event(Box::new(LogEventSink::new()));
    engine.set_security(1, None);
    if !engine.serve(None, None, None, None) {
        return Err(anyhow!("BlinkUp service failed to start"));
    }
    let _scan = engine.start_scanning(true);

    info!("System ready. Entering event loop.");

    // ── 7. Event loop ─────────────────────────────────────────
    let mut since_tick_ms: u64 = 0;
    loop {
        dispatch_pending(&mut engine);

        since_tick_ms += POLL_INTERVAL_MS;
        if since_tick_ms >= tick_ms {
            since_tick_ms = 0;
            engine.tick(tick_secs);
        }

        std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
}
