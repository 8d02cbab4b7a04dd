//! Peripheral drivers outside the radio stack itself.

pub mod radio_power;
