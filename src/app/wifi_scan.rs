//! Nearby-network list: deduplication, serialisation, and the read latch.

use core::sync::atomic::{AtomicBool, Ordering};

use log::debug;

/// One access point as reported by the Wi-Fi scan primitive.
///
/// `ssid` holds the octets from the beacon; they are not necessarily UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRecord {
    pub ssid: Vec<u8>,
    pub bssid: String,
    pub open: bool,
}

impl NetworkRecord {
    pub fn new(ssid: &str, bssid: &str, open: bool) -> Self {
        Self::from_raw(ssid.as_bytes(), bssid, open)
    }

    pub fn from_raw(ssid: &[u8], bssid: &str, open: bool) -> Self {
        Self {
            ssid: ssid.to_vec(),
            bssid: bssid.to_string(),
            open,
        }
    }

    pub fn ssid_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.ssid)
    }
}

/// Drop later records that repeat an earlier SSID under a different BSSID.
///
/// First-seen wins.  Exact repeats (same SSID, same BSSID) are kept.
pub fn dedup(list: &mut Vec<NetworkRecord>) {
    let mut i = 0;
    while i < list.len() {
        let mut j = i + 1;
        while j < list.len() {
            if list[j].ssid == list[i].ssid && list[j].bssid != list[i].bssid {
                debug!("WiFi: dropping duplicate '{}' ({})", list[j].ssid_lossy(), list[j].bssid);
                list.remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }
}

/// Newline-delimited read payload: `"<ssid>\n<unlocked|locked>\n\n"` per
/// record, with the final two newlines stripped.  SSID octets are copied
/// through untouched so the peer can write them back verbatim.
pub fn serialize_networks(list: &[NetworkRecord]) -> Vec<u8> {
    let mut out = Vec::new();
    for n in list {
        out.extend_from_slice(&n.ssid);
        out.push(b'\n');
        out.extend_from_slice(if n.open { &b"unlocked"[..] } else { &b"locked"[..] });
        out.extend_from_slice(b"\n\n");
    }
    let trimmed = out.len().saturating_sub(2);
    out.truncate(trimmed);
    out
}

/// Single-writer/single-reader latch over the network list.
///
/// A reader holds a [`LatchGuard`] while serialising; a scan that finds the
/// latch held is skipped rather than mutating the list mid-read.
#[derive(Debug, Default)]
pub struct ScanLatch {
    held: AtomicBool,
}

impl ScanLatch {
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Acquire the latch, or `None` if it is already held.
    pub fn try_hold(&self) -> Option<LatchGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| LatchGuard { latch: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the latch on drop.
pub struct LatchGuard<'a> {
    latch: &'a ScanLatch,
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.latch.held.store(false, Ordering::Release);
    }
}
