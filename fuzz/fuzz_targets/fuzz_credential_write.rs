//! Fuzz target: `PendingCredentials::store`
//!
//! The first byte picks a role, the rest is the characteristic value.  A
//! write either lands within the field's capacity or changes nothing.
//!
//! cargo fuzz run fuzz_credential_write

#![no_main]

use blinkup::app::credentials::PendingCredentials;
use blinkup::app::uuids::Role;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, value)) = data.split_first() else { return };
    let role = Role::ALL[usize::from(selector) % Role::ALL.len()];

    let mut creds = PendingCredentials::new();
    let before = creds.is_updated();
    match creds.store(role, value) {
        Ok(()) => assert!(creds.is_updated()),
        Err(_) => {
            assert_eq!(creds.is_updated(), before);
            assert!(creds.ssid().is_empty());
            assert!(creds.token().is_empty());
        }
    }
});
