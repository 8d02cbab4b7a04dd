//! Credentials accumulated from characteristic writes until activation.
//!
//! Each setter write replaces one field and marks the record updated.  The
//! activation trigger consumes the record; [`PendingCredentials::clear`]
//! resets it to the freshly-constructed state.
//!
//! The SSID is kept as raw octets: 802.11 puts no encoding on it, and a
//! Latin-1 or GBK network name must round-trip to the station config
//! unchanged.  The other fields are text.

use core::fmt;

use heapless::{String, Vec};
use log::info;

use super::uuids::Role;

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_PLAN_ID_LEN: usize = 64;
pub const MAX_TOKEN_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    /// Payload of a text field is not UTF-8.
    NotUtf8,
    /// Payload exceeds the field capacity (carried).
    TooLong(usize),
    /// The role does not name a credential field.
    NotAField,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotUtf8 => write!(f, "value is not valid UTF-8"),
            Self::TooLong(max) => write!(f, "value exceeds {max} bytes"),
            Self::NotAField => write!(f, "not a credential characteristic"),
        }
    }
}

#[derive(Debug, Default)]
pub struct PendingCredentials {
    ssid: Vec<u8, MAX_SSID_LEN>,
    password: String<MAX_PASSWORD_LEN>,
    plan_id: String<MAX_PLAN_ID_LEN>,
    token: String<MAX_TOKEN_LEN>,
    updated: bool,
}

fn assign<const N: usize>(slot: &mut String<N>, data: &[u8]) -> Result<usize, CredentialError> {
    let value = core::str::from_utf8(data).map_err(|_| CredentialError::NotUtf8)?;
    *slot = String::try_from(value).map_err(|()| CredentialError::TooLong(N))?;
    Ok(value.len())
}

fn assign_raw<const N: usize>(slot: &mut Vec<u8, N>, data: &[u8]) -> Result<(), CredentialError> {
    *slot = Vec::from_slice(data).map_err(|()| CredentialError::TooLong(N))?;
    Ok(())
}

impl PendingCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` in the field bound to `role`.  A rejected write leaves
    /// every field and the `updated` flag untouched.
    pub fn store(&mut self, role: Role, data: &[u8]) -> Result<(), CredentialError> {
        match role {
            Role::SsidSetter => {
                assign_raw(&mut self.ssid, data)?;
                info!("Creds: SSID set to '{}'", self.ssid_lossy());
            }
            Role::PasswordSetter => {
                let len = assign(&mut self.password, data)?;
                info!("Creds: password set ({} bytes)", len);
            }
            Role::PlanIdSetter => {
                let len = assign(&mut self.plan_id, data)?;
                info!("Creds: plan ID set ({} bytes)", len);
            }
            Role::TokenSetter => {
                let len = assign(&mut self.token, data)?;
                info!("Creds: enrollment token set ({} bytes)", len);
            }
            _ => return Err(CredentialError::NotAField),
        }
        self.updated = true;
        Ok(())
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// SSID octets exactly as written by the peer.
    pub fn ssid(&self) -> &[u8] {
        &self.ssid
    }

    /// SSID for log lines; invalid UTF-8 shows as U+FFFD.
    pub fn ssid_lossy(&self) -> std::borrow::Cow<'_, str> {
        std::string::String::from_utf8_lossy(&self.ssid)
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Both enrollment fields present; otherwise the apply is Wi-Fi only.
    pub fn has_enrollment(&self) -> bool {
        !self.plan_id.is_empty() && !self.token.is_empty()
    }

    /// Empty every field and drop the `updated` mark.
    pub fn clear(&mut self) {
        self.ssid.clear();
        self.password.clear();
        self.plan_id.clear();
        self.token.clear();
        self.updated = false;
    }
}
