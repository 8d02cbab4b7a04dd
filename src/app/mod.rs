//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the BlinkUp provisioning rules: UUID roles, GATT
//! layout, advertising, security negotiation, network-list handling, the
//! connection state machine, and the apply/reboot sequencer in [`service`].
//! All interaction with the radio, Wi-Fi, and storage happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod advert;
pub mod connection;
pub mod credentials;
pub mod events;
pub mod gatt;
pub mod param;
pub mod ports;
pub mod security;
pub mod service;
pub mod uuids;
pub mod wifi_scan;
