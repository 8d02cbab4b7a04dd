//! Radio regulator sequencing.
//!
//! The BLE part sits behind its own regulator.  Before the HCI transport can
//! talk to it the enable line must be held low briefly, raised, and given
//! time for the controller to boot.  Generic over `embedded-hal` so the same
//! sequence runs on the ESP-IDF HAL and on test doubles.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, info};

/// Low pulse before enabling, so a half-booted part fully resets.
pub const RESET_PULSE_MS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerError;

impl core::fmt::Display for PowerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "radio enable pin could not be driven")
    }
}

pub struct RadioPower<P> {
    enable: P,
    state: PowerState,
}

impl<P: OutputPin> RadioPower<P> {
    pub fn new(enable: P) -> Self {
        Self {
            enable,
            state: PowerState::Off,
        }
    }

    /// Reset-pulse the regulator, power it, and wait `boot_delay_ms`.
    pub fn power_up<D: DelayNs>(&mut self, delay: &mut D, boot_delay_ms: u32) -> Result<(), PowerError> {
        self.enable.set_low().map_err(|_| PowerError)?;
        delay.delay_ms(RESET_PULSE_MS);
        self.enable.set_high().map_err(|_| PowerError)?;
        delay.delay_ms(boot_delay_ms);
        self.state = PowerState::On;
        info!("RadioPower: on ({} ms boot delay)", boot_delay_ms);
        Ok(())
    }

    pub fn power_down(&mut self) -> Result<(), PowerError> {
        self.enable.set_low().map_err(|_| PowerError)?;
        self.state = PowerState::Off;
        debug!("RadioPower: off");
        Ok(())
    }

    pub fn state(&self) -> PowerState {
        self.state
    }
}
