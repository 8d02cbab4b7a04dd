//! Radio power-enable assignments per device variant.
//!
//! The BLE controller is the one on the SoC, reached through Bluedroid, so
//! there is no host-side HCI bus to configure.  What remains per board is
//! the regulator enable line, which [`RadioPins::resolve`] lets the stored
//! configuration override.

use core::fmt;

// ---------------------------------------------------------------------------
// Device variants
// ---------------------------------------------------------------------------

/// Supported module families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceVariant {
    Imp004m,
    Imp005,
    Imp006,
}

impl DeviceVariant {
    /// Resolve a device-type string such as `"imp006"`.
    pub fn from_device_type(device_type: &str) -> Option<Self> {
        match device_type {
            "imp004m" => Some(Self::Imp004m),
            "imp005" => Some(Self::Imp005),
            "imp006" => Some(Self::Imp006),
            _ => None,
        }
    }

    /// Whether provisioning refuses to start without a controller image.
    ///
    /// This is a deployment policy: an image must be flashed for these
    /// boards.  The on-die controller boots from ROM and never reads it.
    pub const fn requires_firmware(self) -> bool {
        !matches!(self, Self::Imp005)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Imp004m => "imp004m",
            Self::Imp005 => "imp005",
            Self::Imp006 => "imp006",
        }
    }
}

impl fmt::Display for DeviceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Radio power
// ---------------------------------------------------------------------------

/// Highest GPIO number on the ESP32-S3.
pub const MAX_GPIO: i32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioPins {
    /// Digital output: radio regulator enable (active HIGH).
    pub power_enable: i32,
}

impl RadioPins {
    pub const fn for_variant(variant: DeviceVariant) -> Self {
        let power_enable = match variant {
            DeviceVariant::Imp004m => 21,
            DeviceVariant::Imp005 => 38,
            DeviceVariant::Imp006 => 48,
        };
        Self { power_enable }
    }

    /// Variant defaults with the configured enable pin, if any, applied.
    pub fn resolve(variant: DeviceVariant, power_enable: Option<i32>) -> Self {
        let mut pins = Self::for_variant(variant);
        if let Some(pin) = power_enable {
            pins.power_enable = pin;
        }
        pins
    }
}
