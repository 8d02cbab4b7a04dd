//! Advertisement payload construction and validation.
//!
//! ## Built payload layout
//!
//! ```text
//! ┌─────┬──────┬──────────────────────────┬─────┬──────┬──────────────┐
//! │ len │ 0x07 │ service UUID (LE, 16 B)  │ len │ 0x09 │ device name  │
//! └─────┴──────┴──────────────────────────┴─────┴──────┴──────────────┘
//! ```
//!
//! Each `len` counts the type byte plus data.  A 16-bit service UUID uses
//! AD type `0x03` instead of `0x07`.  The whole payload must fit the 31-byte
//! legacy advertising PDU; nothing is ever truncated.

use core::fmt;

use log::warn;

use super::param::HostParam;
use crate::hex::BleUuid;

pub const MAX_ADVERT_LEN: usize = 31;

const AD_TYPE_UUID16_COMPLETE: u8 = 0x03;
const AD_TYPE_UUID128_COMPLETE: u8 = 0x07;
const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;

pub const ADV_INTERVAL_CEILING_MS: u16 = 100;

pub type Advert = heapless::Vec<u8, MAX_ADVERT_LEN>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertError {
    /// Payload (or built payload) is longer than 31 bytes.
    TooLong(usize),
    /// Payload is neither a byte sequence nor a string.
    WrongType(&'static str),
}

impl fmt::Display for AdvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong(n) => write!(f, "advert is {n} bytes (max {MAX_ADVERT_LEN})"),
            Self::WrongType(t) => write!(f, "advert must be bytes or string, got {t}"),
        }
    }
}

/// Encode the default advert for `service` and `device_name`.
pub fn build_advert(service: BleUuid, device_name: &str) -> Result<Advert, AdvertError> {
    let uuid = service.to_le_bytes();
    let name = device_name.as_bytes();
    let total = 2 + uuid.len() + 2 + name.len();
    if total > MAX_ADVERT_LEN {
        return Err(AdvertError::TooLong(total));
    }

    let uuid_type = match service {
        BleUuid::Short(_) => AD_TYPE_UUID16_COMPLETE,
        BleUuid::Long(_) => AD_TYPE_UUID128_COMPLETE,
    };

    let fields: [&[u8]; 4] = [
        &[uuid.len() as u8 + 1, uuid_type],
        &uuid,
        &[name.len() as u8 + 1, AD_TYPE_COMPLETE_LOCAL_NAME],
        name,
    ];
    let mut out = Advert::new();
    for field in fields {
        out.extend_from_slice(field).map_err(|()| AdvertError::TooLong(total))?;
    }
    Ok(out)
}

/// Accept a caller-supplied advert verbatim if it is bytes or text and fits.
pub fn validate_advert(payload: &HostParam) -> Result<Advert, AdvertError> {
    let bytes: &[u8] = match payload {
        HostParam::Bytes(b) => b,
        HostParam::Text(s) => s.as_bytes(),
        other => return Err(AdvertError::WrongType(other.type_name())),
    };
    Advert::from_slice(bytes).map_err(|()| AdvertError::TooLong(bytes.len()))
}

/// Advertising interval bounds in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertInterval {
    pub min_ms: u16,
    pub max_ms: u16,
}

impl Default for AdvertInterval {
    fn default() -> Self {
        Self {
            min_ms: ADV_INTERVAL_CEILING_MS,
            max_ms: ADV_INTERVAL_CEILING_MS,
        }
    }
}

impl AdvertInterval {
    /// Clamp both bounds to `0..=100` and swap them if inverted.
    pub fn new(min_ms: i32, max_ms: i32) -> Self {
        let clamp = |v: i32| v.clamp(0, i32::from(ADV_INTERVAL_CEILING_MS)) as u16;
        let (mut min, mut max) = (clamp(min_ms), clamp(max_ms));
        if min > max {
            warn!("Advert: min interval {} > max {}, swapping", min, max);
            core::mem::swap(&mut min, &mut max);
        }
        Self { min_ms: min, max_ms: max }
    }
}
