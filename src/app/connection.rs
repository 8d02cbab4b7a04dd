//! Connection lifecycle: one tracked peer at a time.
//!
//! ```text
//!            connect                   second connect
//!   Idle ───────────────▶ Connected ─────────────────▶ (rejected, stays)
//!    ▲                        │
//!    └────── disconnect ──────┘
//! ```

use core::fmt;

use log::{info, warn};

use super::events::{HostEvent, PeerHandle};
use super::security::SecurityMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub handle: PeerHandle,
    pub address: String,
    pub security: SecurityMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerState {
    Idle,
    Connected(Peer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    /// A peer is already tracked; carries its handle.
    PeerAlreadyConnected(PeerHandle),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerAlreadyConnected(h) => write!(f, "peer {h} already connected"),
        }
    }
}

#[derive(Debug)]
pub struct ConnectionTracker {
    state: PeerState,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self { state: PeerState::Idle }
    }

    pub fn state(&self) -> &PeerState {
        &self.state
    }

    pub fn peer(&self) -> Option<&Peer> {
        match &self.state {
            PeerState::Connected(p) => Some(p),
            PeerState::Idle => None,
        }
    }

    /// Idle → Connected.  A second peer is refused and the tracked one kept.
    pub fn on_connect(&mut self, peer: Peer) -> Result<HostEvent, ConnectionError> {
        if let PeerState::Connected(current) = &self.state {
            warn!(
                "Conn: refusing {} (handle {}), already tracking handle {}",
                peer.address, peer.handle, current.handle
            );
            return Err(ConnectionError::PeerAlreadyConnected(current.handle));
        }
        info!("Conn: {} connected (handle {}, security {})", peer.address, peer.handle, peer.security.code());
        let event = HostEvent::Connected {
            handle: peer.handle,
            address: peer.address.clone(),
            security: peer.security,
        };
        self.state = PeerState::Connected(peer);
        Ok(event)
    }

    /// Connected → Idle, only for the tracked handle.
    pub fn on_disconnect(&mut self, handle: PeerHandle) -> Option<HostEvent> {
        if !matches!(&self.state, PeerState::Connected(p) if p.handle == handle) {
            info!("Conn: ignoring disconnect for untracked handle {}", handle);
            return None;
        }
        let peer = self.take()?;
        info!("Conn: {} disconnected", peer.address);
        Some(HostEvent::Disconnected { address: peer.address })
    }

    /// Forget the tracked peer without emitting anything (local close).
    pub fn take(&mut self) -> Option<Peer> {
        match core::mem::replace(&mut self.state, PeerState::Idle) {
            PeerState::Connected(p) => Some(p),
            PeerState::Idle => None,
        }
    }
}
