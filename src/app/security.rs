//! BLE security-mode negotiation.
//!
//! Bad input never fails hard here: anything malformed resolves to
//! [`SecurityMode::None`] with an `error!` log, so a provisioning session
//! stays connectable whatever the host hands over.

use log::error;

use super::param::HostParam;

pub const MAX_PIN: u32 = 999_999;
const MAX_PIN_DIGITS: usize = 6;

/// Pairing/security mode as numbered by the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SecurityMode {
    None = 1,
    Encrypted = 3,
    EncryptedWithPin = 4,
}

impl SecurityMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::None),
            3 => Some(Self::Encrypted),
            4 => Some(Self::EncryptedWithPin),
            _ => None,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Validated 0–999999 pairing PIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin(u32);

impl Pin {
    pub fn new(value: u32) -> Option<Self> {
        (value <= MAX_PIN).then_some(Self(value))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Accept a decimal string of 1–6 digits or an integer in range.
    pub fn from_param(param: &HostParam) -> Option<Self> {
        match param {
            HostParam::Text(s) => {
                if s.is_empty() || s.len() > MAX_PIN_DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                s.parse::<u32>().ok().and_then(Self::new)
            }
            HostParam::Integer(v) => u32::try_from(*v).ok().and_then(Self::new),
            _ => None,
        }
    }
}

/// Outcome of [`negotiate`]: what to hand to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub mode: SecurityMode,
    pub pin: Option<Pin>,
}

impl Negotiated {
    const FALLBACK: Self = Self {
        mode: SecurityMode::None,
        pin: None,
    };
}

/// Resolve a requested mode and optional PIN into what the radio applies.
pub fn negotiate(mode: i64, pin: Option<&HostParam>) -> Negotiated {
    let Some(mode) = SecurityMode::from_code(mode) else {
        error!("Security: invalid mode {}, falling back to mode 1", mode);
        return Negotiated::FALLBACK;
    };

    if mode == SecurityMode::None {
        return Negotiated::FALLBACK;
    }

    let Some(param) = pin else {
        error!("Security: mode {} needs a PIN, falling back to mode 1", mode.code());
        return Negotiated::FALLBACK;
    };

    match Pin::from_param(param) {
        Some(pin) => Negotiated { mode, pin: Some(pin) },
        None => {
            error!(
                "Security: rejected {} PIN for mode {}, falling back to mode 1",
                param.type_name(),
                mode.code()
            );
            Negotiated::FALLBACK
        }
    }
}
