//! Hexadecimal helpers for UUID strings.
//!
//! UUIDs reach the firmware as hex strings (`"180A"`,
//! `"FADA47BE-C455-48C9-A5F2-AF7CF368D719"`).  Dashes are cosmetic and
//! stripped; the remaining digits are read in canonical (big-endian) order.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexError {
    Empty,
    InvalidDigit,
    Overflow,
    /// Digit count is neither 4 (16-bit) nor 32 (128-bit).
    UnsupportedWidth(usize),
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty hex string"),
            Self::InvalidDigit => write!(f, "non-hex digit"),
            Self::Overflow => write!(f, "value exceeds 128 bits"),
            Self::UnsupportedWidth(n) => write!(f, "{n} hex digits (expected 4 or 32)"),
        }
    }
}

/// Standard base-16 interpretation of `hex`, case-insensitive.
///
/// `"FFFF"` → `65535`, `"0a"` → `10`.  No sign, no `0x` prefix.
pub fn hex_to_int(hex: &str) -> Result<u128, HexError> {
    if hex.is_empty() {
        return Err(HexError::Empty);
    }
    let mut value: u128 = 0;
    for c in hex.chars() {
        let digit = c.to_digit(16).ok_or(HexError::InvalidDigit)?;
        value = value
            .checked_mul(16)
            .and_then(|v| v.checked_add(u128::from(digit)))
            .ok_or(HexError::Overflow)?;
    }
    Ok(value)
}

/// A Bluetooth attribute UUID, either SIG-assigned 16-bit or full 128-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BleUuid {
    Short(u16),
    Long(u128),
}

impl BleUuid {
    /// Parse a UUID string, ignoring dashes.
    pub fn parse(s: &str) -> Result<Self, HexError> {
        let mut digits = heapless::String::<32>::new();
        for c in s.chars().filter(|&c| c != '-') {
            digits.push(c).map_err(|_| HexError::UnsupportedWidth(s.len()))?;
        }
        let value = hex_to_int(&digits)?;
        match digits.len() {
            4 => Ok(Self::Short(value as u16)),
            32 => Ok(Self::Long(value)),
            n => Err(HexError::UnsupportedWidth(n)),
        }
    }

    /// Bytes in canonical string order (most significant first).
    pub fn to_be_bytes(self) -> heapless::Vec<u8, 16> {
        let wide = match self {
            Self::Short(v) => u128::from(v),
            Self::Long(v) => v,
        }
        .to_be_bytes();
        wide[wide.len() - self.byte_len()..].iter().copied().collect()
    }

    /// Bytes in over-the-air order (least significant first).
    pub fn to_le_bytes(self) -> heapless::Vec<u8, 16> {
        let mut out = self.to_be_bytes();
        out.reverse();
        out
    }

    pub fn byte_len(self) -> usize {
        match self {
            Self::Short(_) => 2,
            Self::Long(_) => 16,
        }
    }
}

impl fmt::Display for BleUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short(v) => write!(f, "{v:04X}"),
            Self::Long(v) => write!(f, "{v:032X}"),
        }
    }
}
