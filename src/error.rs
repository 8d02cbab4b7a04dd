//! Unified error types for the BlinkUp firmware.
//!
//! Only construction can fail hard.  Once a [`BlinkUp`](crate::app::service::BlinkUp)
//! engine exists, untrusted input is resolved at the boundary (status codes,
//! safe defaults) and never surfaces as an `Error`.  All variants are `Copy`
//! so they can be passed around without allocation.

use core::fmt;

use crate::app::ports::RadioError;
use crate::app::uuids::Role;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fatal (construction-time) condition funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The UUID mapping is missing a role, has extra keys, or an empty value.
    InvalidUuidSet,
    /// A role's UUID string is not valid hexadecimal of a supported width.
    InvalidUuid(Role),
    /// This device variant needs a radio firmware blob and none was given.
    MissingFirmware,
    /// The device type string does not name a supported variant.
    UnsupportedDevice,
    /// The radio could not be opened.
    Radio(RadioError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUuidSet => write!(f, "UUID set must map all 8 roles to non-empty values"),
            Self::InvalidUuid(role) => write!(f, "UUID for '{}' is not valid hex", role.key()),
            Self::MissingFirmware => write!(f, "radio firmware required for this device"),
            Self::UnsupportedDevice => write!(f, "unsupported device variant"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
