//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing host events to the ESP-IDF logger
//! (UART / USB-CDC in production).  Used when the host application does not
//! register its own callback.

use log::info;

use crate::app::events::HostEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`HostEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events logged so far.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &HostEvent) {
        self.emitted = self.emitted.wrapping_add(1);
        match event {
            HostEvent::Connected {
                handle,
                address,
                security,
            } => {
                info!(
                    "PEER  | connected addr={} handle={} security={}",
                    address,
                    handle,
                    security.code()
                );
            }
            HostEvent::Disconnected { address } => {
                info!("PEER  | disconnected addr={}", address);
            }
            HostEvent::Activated => {
                info!("BLINK | activated, reboot pending");
            }
        }
    }
}
