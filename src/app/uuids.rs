//! The eight UUID roles of the BlinkUp service.
//!
//! UUIDs are supplied by the caller at construction, never hardcoded.  The
//! caller's mapping is checked with [`validate`]; [`UuidSet::from_map`] then
//! parses every value and is the only place a bad mapping becomes fatal.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::hex::BleUuid;

/// Named role of a UUID within the BlinkUp service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    BlinkupService,
    SsidSetter,
    PasswordSetter,
    PlanIdSetter,
    TokenSetter,
    BlinkupTrigger,
    WifiGetter,
    WifiClearTrigger,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::BlinkupService,
        Role::SsidSetter,
        Role::PasswordSetter,
        Role::PlanIdSetter,
        Role::TokenSetter,
        Role::BlinkupTrigger,
        Role::WifiGetter,
        Role::WifiClearTrigger,
    ];

    /// Key used for this role in the caller's mapping.
    pub const fn key(self) -> &'static str {
        match self {
            Self::BlinkupService => "blinkup_service",
            Self::SsidSetter => "ssid_setter",
            Self::PasswordSetter => "password_setter",
            Self::PlanIdSetter => "planid_setter",
            Self::TokenSetter => "token_setter",
            Self::BlinkupTrigger => "blinkup_trigger",
            Self::WifiGetter => "wifi_getter",
            Self::WifiClearTrigger => "wifi_clear_trigger",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// `true` iff `candidate` holds exactly the eight role keys, each with a
/// non-empty value.  Never fails loudly.
pub fn validate(candidate: &HashMap<String, String>) -> bool {
    candidate.len() == Role::ALL.len()
        && Role::ALL
            .iter()
            .all(|role| candidate.get(role.key()).is_some_and(|v| !v.is_empty()))
}

/// Parsed, immutable role → UUID table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UuidSet {
    uuids: [BleUuid; 8],
}

impl UuidSet {
    pub fn from_map(candidate: &HashMap<String, String>) -> Result<Self> {
        if !validate(candidate) {
            return Err(Error::InvalidUuidSet);
        }
        let mut uuids = [BleUuid::Short(0); 8];
        for role in Role::ALL {
            // validate() guarantees presence.
            let raw = candidate.get(role.key()).ok_or(Error::InvalidUuidSet)?;
            uuids[role.index()] = BleUuid::parse(raw).map_err(|_| Error::InvalidUuid(role))?;
        }
        Ok(Self { uuids })
    }

    pub fn get(&self, role: Role) -> BleUuid {
        self.uuids[role.index()]
    }

    /// Reverse lookup used by the characteristic dispatch table.
    pub fn role_of(&self, uuid: BleUuid) -> Option<Role> {
        Role::ALL.into_iter().find(|r| self.get(*r) == uuid)
    }
}
