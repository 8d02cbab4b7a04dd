//! Outbound notifications to the host application.
//!
//! The [`BlinkUp`](super::service::BlinkUp) engine emits these through the
//! registered [`EventSink`](super::ports::EventSink).  Delivery is
//! at-most-once per transition; nothing is queued or replayed.

use super::security::SecurityMode;

/// Radio-assigned connection handle.  The radio owns the connection; the
/// engine only remembers the handle.
pub type PeerHandle = u16;

/// Structured events delivered to the host callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A companion app connected.
    Connected {
        handle: PeerHandle,
        address: String,
        security: SecurityMode,
    },

    /// The tracked peer went away (carries its last-known address).
    Disconnected { address: String },

    /// Credentials were committed; a reboot is pending.
    Activated,
}
