//! BlinkUp provisioning firmware library.
//!
//! Exposes the provisioning engine and its adapters for integration testing
//! and for the firmware binary.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod hex;
pub mod pins;
pub mod scheduler;

pub use app::service::BlinkUp;
pub use error::{Error, Result};
