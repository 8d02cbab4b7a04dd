//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements         | Connects to               |
//! |------------|--------------------|---------------------------|
//! | `ble`      | RadioPort          | Bluedroid GATT server     |
//! | `log_sink` | EventSink          | Serial log output         |
//! | `nvs`      | ConfigPort         | NVS / in-memory store     |
//! |            | StoragePort        |                           |
//! |            | EnrollmentPort     |                           |
//! | `system`   | SystemPort         | eFuse MAC, restart        |
//! |            | EnrollmentPort     | (forwards to `nvs`)       |
//! | `wifi`     | WifiPort           | ESP-IDF WiFi STA          |

pub mod ble;
pub mod log_sink;
pub mod nvs;
pub mod system;
pub mod wifi;
