//! BlinkUp provisioning engine, the hexagonal core.
//!
//! [`BlinkUp`] owns the UUID table, pending credentials, the network list,
//! the tracked peer, and a [`Scheduler`] for deferred work.  The radio,
//! Wi-Fi, and system collaborators are injected at construction and reached
//! only through their port traits.
//!
//! ```text
//!   RadioPort ◀──┐                           ┌──▶ EventSink
//!                │   ┌───────────────────┐   │
//!   on_* ────────┼──▶│      BlinkUp      │───┘
//!                │   │  creds · peer ·   │───▶ WifiPort
//!   tick() ──────┘   │  networks · sched │───▶ SystemPort + EnrollmentPort
//!                    └───────────────────┘
//! ```
//!
//! Every entry point runs to completion on the caller's context; nothing here
//! blocks except the bounded parent-session flush during apply.

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::{EngineConfig, validate_config};
use crate::error::{Error, Result};
use crate::hex::BleUuid;
use crate::pins::DeviceVariant;
use crate::scheduler::{Schedule, ScheduleHandle, ScheduleKind, Scheduler};

use super::advert::{Advert, AdvertInterval, build_advert, validate_advert};
use super::connection::{ConnectionTracker, Peer};
use super::credentials::{CredentialError, PendingCredentials};
use super::events::{HostEvent, PeerHandle};
use super::gatt::{
    ExtraServices, STATUS_INVALID_LENGTH, STATUS_NOT_READY, STATUS_SUCCESS, STATUS_UNLIKELY_ERROR,
    STATUS_VALUE_NOT_ALLOWED, STATUS_WRITE_NOT_PERMITTED, build_services,
};
use super::param::HostParam;
use super::ports::{
    ConfigError, EnrollmentPort, EventSink, NetworkError, RadioPort, ScheduleFiredKind, SchedulerDelegate,
    StorageError, SystemPort, WifiPort,
};
use super::security::{SecurityMode, negotiate};
use super::uuids::{Role, UuidSet};
use super::wifi_scan::{NetworkRecord, ScanLatch, dedup, serialize_networks};

/// Handle returned by [`BlinkUp::start_scanning`] for a repeating scan.
pub type ScanHandle = ScheduleHandle;

const SCAN_TASK: &str = "wifi-scan";
const REBOOT_TASK: &str = "reboot";

// ───────────────────────────────────────────────────────────────
// Lifecycle phase
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Radio open, nothing served yet.
    Ready,
    /// GATT table registered and advertising.
    Serving,
    /// Apply sequence in flight.
    Applying,
    /// Credentials committed, reboot scheduled.
    Activated,
    /// Apply aborted part-way; the engine stays inert until reboot.
    Failed,
    /// Torn down by [`BlinkUp::close`].
    Closed,
}

impl Phase {
    /// The radio is open and owned by the engine.
    pub fn radio_usable(self) -> bool {
        matches!(self, Self::Ready | Self::Serving)
    }

    fn suppresses_scan(self) -> bool {
        !self.radio_usable()
    }
}

// ───────────────────────────────────────────────────────────────
// Apply errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyError {
    Session(NetworkError),
    Wifi(NetworkError),
    Enrollment(StorageError),
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(e) => write!(f, "parent session flush: {e}"),
            Self::Wifi(e) => write!(f, "wifi commit: {e}"),
            Self::Enrollment(e) => write!(f, "enrollment commit: {e}"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Characteristic dispatch
// ───────────────────────────────────────────────────────────────

type WriteHandler<R, W, S> = fn(&mut BlinkUp<R, W, S>, Role, &[u8]) -> u16;

/// Collects fired labels so the engine can act on them after the
/// scheduler borrow ends.
#[derive(Default)]
struct FiredTasks(heapless::Vec<&'static str, 4>);

impl SchedulerDelegate for FiredTasks {
    fn on_schedule_fired(&mut self, label: &'static str, _kind: ScheduleFiredKind) {
        if self.0.push(label).is_err() {
            warn!("BlinkUp: dropped fired task '{}'", label);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BlinkUp
// ───────────────────────────────────────────────────────────────

pub struct BlinkUp<R, W, S> {
    uuids: UuidSet,
    variant: DeviceVariant,
    config: EngineConfig,

    radio: R,
    wifi: W,
    system: S,
    sink: Option<Box<dyn EventSink + Send>>,

    phase: Phase,
    security: SecurityMode,
    creds: PendingCredentials,
    connection: ConnectionTracker,
    networks: Vec<NetworkRecord>,
    latch: Arc<ScanLatch>,
    /// Last advert handed to the radio, replayed after a disconnect.
    advertising: Option<(Advert, AdvertInterval)>,

    scheduler: Scheduler,
    scan_handle: Option<ScanHandle>,
}

impl<R, W, S> BlinkUp<R, W, S>
where
    R: RadioPort,
    W: WifiPort,
    S: SystemPort + EnrollmentPort,
{
    /// Validate the UUID mapping, resolve the device variant, and open the
    /// radio.  Any failure here is fatal and nothing is left half-open.
    pub fn new(
        uuid_map: &HashMap<String, String>,
        config: EngineConfig,
        mut radio: R,
        wifi: W,
        system: S,
        firmware: Option<&[u8]>,
    ) -> Result<Self> {
        validate_config(&config).map_err(|e| match e {
            ConfigError::ValidationFailed(msg) => Error::Config(msg),
            _ => Error::Config("unreadable configuration"),
        })?;

        let uuids = UuidSet::from_map(uuid_map)?;

        let info = system.device_info();
        let variant = DeviceVariant::from_device_type(&info.device_type).ok_or_else(|| {
            error!("BlinkUp: unsupported device type '{}'", info.device_type);
            Error::UnsupportedDevice
        })?;

        let firmware = if variant.requires_firmware() {
            match firmware {
                Some(fw) if !fw.is_empty() => Some(fw),
                _ => {
                    error!("BlinkUp: {} needs radio firmware", variant);
                    return Err(Error::MissingFirmware);
                }
            }
        } else {
            None
        };

        radio.open(firmware).map_err(|e| {
            error!("BlinkUp: radio open failed: {}", e);
            Error::Radio(e)
        })?;
        info!("BlinkUp: radio open on {}", variant);

        Ok(Self {
            uuids,
            variant,
            config,
            radio,
            wifi,
            system,
            sink: None,
            phase: Phase::Ready,
            security: SecurityMode::None,
            creds: PendingCredentials::new(),
            connection: ConnectionTracker::new(),
            networks: Vec::new(),
            latch: Arc::new(ScanLatch::new()),
            advertising: None,
            scheduler: Scheduler::new(),
            scan_handle: None,
        })
    }

    /// Register the host callback.  Replaces any previous one.
    pub fn on_event(&mut self, sink: Box<dyn EventSink + Send>) {
        self.sink = Some(sink);
    }

    // ── Serving ───────────────────────────────────────────────

    /// Register the GATT table and start advertising.
    ///
    /// `advert` is served verbatim when given (bytes or text, ≤ 31 bytes);
    /// otherwise one is built from the service UUID and device type.
    /// Missing interval bounds fall back to the configured defaults.
    /// Returns `false` if nothing was advertised.
    pub fn serve(
        &mut self,
        advert: Option<&HostParam>,
        min_ms: Option<i32>,
        max_ms: Option<i32>,
        extra: Option<ExtraServices>,
    ) -> bool {
        if !self.phase.radio_usable() {
            error!("BlinkUp: serve called in {:?}, radio not available", self.phase);
            return false;
        }

        let payload = match advert {
            Some(param) => validate_advert(param),
            None => build_advert(self.uuids.get(Role::BlinkupService), self.variant.name()),
        };
        let payload = match payload {
            Ok(p) => p,
            Err(e) => {
                error!("BlinkUp: advert rejected: {}", e);
                return false;
            }
        };

        let interval = AdvertInterval::new(
            min_ms.unwrap_or(i32::from(self.config.adv_min_interval_ms)),
            max_ms.unwrap_or(i32::from(self.config.adv_max_interval_ms)),
        );

        let services = build_services(&self.uuids, &self.system.device_info(), extra);
        if let Err(e) = self.radio.serve(&services) {
            error!("BlinkUp: GATT serve failed: {}", e);
            return false;
        }
        if let Err(e) = self.radio.start_advertise(&payload, interval) {
            error!("BlinkUp: advertising failed: {}", e);
            return false;
        }

        info!(
            "BlinkUp: serving {} services, advertising {} bytes every {}–{} ms",
            services.len(),
            payload.len(),
            interval.min_ms,
            interval.max_ms
        );
        self.advertising = Some((payload, interval));
        self.phase = Phase::Serving;
        true
    }

    /// Negotiate and apply a pairing mode.  Returns the mode code actually
    /// applied; any invalid input degrades to mode 1.
    pub fn set_security(&mut self, mode: i64, pin: Option<&HostParam>) -> u8 {
        if !self.phase.radio_usable() {
            error!("BlinkUp: set_security called in {:?}, radio not available", self.phase);
            return SecurityMode::None.code();
        }
        let negotiated = negotiate(mode, pin);
        self.radio.set_security(negotiated.mode, negotiated.pin);
        self.security = negotiated.mode;
        info!("BlinkUp: security mode {}", negotiated.mode.code());
        negotiated.mode.code()
    }

    // ── Radio callbacks ───────────────────────────────────────

    pub fn on_peer_connected(&mut self, handle: PeerHandle, address: &str, security: SecurityMode) {
        let peer = Peer {
            handle,
            address: address.to_string(),
            security,
        };
        match self.connection.on_connect(peer) {
            Ok(event) => self.emit(&event),
            Err(e) => {
                warn!("BlinkUp: {}, closing new peer {}", e, handle);
                self.radio.close_peer(handle);
            }
        }
    }

    pub fn on_peer_disconnected(&mut self, handle: PeerHandle) {
        let Some(event) = self.connection.on_disconnect(handle) else {
            return;
        };
        self.emit(&event);
        self.resume_advertising();
    }

    /// Route a characteristic write.  Returns the ATT status for the peer.
    pub fn handle_write(&mut self, uuid: BleUuid, data: &[u8]) -> u16 {
        let Some(role) = self.uuids.role_of(uuid) else {
            warn!("BlinkUp: write to unknown characteristic {}", uuid);
            return STATUS_WRITE_NOT_PERMITTED;
        };
        match Self::write_handler(role) {
            Some(handler) => handler(self, role, data),
            None => {
                warn!("BlinkUp: '{}' is not writable", role.key());
                STATUS_WRITE_NOT_PERMITTED
            }
        }
    }

    /// Route a characteristic read.  Unknown or write-only characteristics
    /// read as empty.
    pub fn handle_read(&self, uuid: BleUuid) -> Vec<u8> {
        match self.uuids.role_of(uuid) {
            Some(Role::WifiGetter) => self.read_networks(),
            Some(role) => {
                warn!("BlinkUp: '{}' is not readable", role.key());
                Vec::new()
            }
            None => {
                warn!("BlinkUp: read of unknown characteristic {}", uuid);
                Vec::new()
            }
        }
    }

    fn write_handler(role: Role) -> Option<WriteHandler<R, W, S>> {
        match role {
            Role::SsidSetter | Role::PasswordSetter | Role::PlanIdSetter | Role::TokenSetter => {
                Some(Self::store_credential)
            }
            Role::BlinkupTrigger => Some(Self::trigger_apply),
            Role::WifiClearTrigger => Some(Self::trigger_wifi_clear),
            Role::BlinkupService | Role::WifiGetter => None,
        }
    }

    fn store_credential(&mut self, role: Role, data: &[u8]) -> u16 {
        if !self.phase.radio_usable() {
            warn!("BlinkUp: '{}' write refused in {:?}", role.key(), self.phase);
            return STATUS_WRITE_NOT_PERMITTED;
        }
        match self.creds.store(role, data) {
            Ok(()) => STATUS_SUCCESS,
            Err(e) => {
                warn!("BlinkUp: '{}' write rejected: {}", role.key(), e);
                match e {
                    CredentialError::NotUtf8 => STATUS_VALUE_NOT_ALLOWED,
                    CredentialError::TooLong(_) => STATUS_INVALID_LENGTH,
                    CredentialError::NotAField => STATUS_WRITE_NOT_PERMITTED,
                }
            }
        }
    }

    fn trigger_apply(&mut self, _role: Role, _data: &[u8]) -> u16 {
        if !self.phase.radio_usable() || !self.creds.is_updated() {
            info!("BlinkUp: activation requested but credentials not ready");
            return STATUS_NOT_READY;
        }
        // Refuse before anything is torn down, so the peer can correct them.
        if let Err(e) = self.wifi.check_credentials(self.creds.ssid(), self.creds.password()) {
            warn!("BlinkUp: activation refused: {}", e);
            return STATUS_VALUE_NOT_ALLOWED;
        }
        let result = self.apply();
        self.creds.clear();
        match result {
            Ok(()) => STATUS_SUCCESS,
            Err(e) => {
                error!("BlinkUp: apply failed: {}", e);
                self.phase = Phase::Failed;
                STATUS_UNLIKELY_ERROR
            }
        }
    }

    fn trigger_wifi_clear(&mut self, _role: Role, _data: &[u8]) -> u16 {
        info!("BlinkUp: clearing WiFi configuration");
        self.close_tracked_peer();
        match self.wifi.clear_credentials() {
            Ok(()) => STATUS_SUCCESS,
            Err(e) => {
                error!("BlinkUp: WiFi clear failed: {}", e);
                STATUS_UNLIKELY_ERROR
            }
        }
    }

    fn read_networks(&self) -> Vec<u8> {
        let Some(_guard) = self.latch.try_hold() else {
            warn!("BlinkUp: network list busy");
            return Vec::new();
        };
        serialize_networks(&self.networks)
    }

    // ── Apply / reboot sequencer ──────────────────────────────

    fn apply(&mut self) -> core::result::Result<(), ApplyError> {
        info!("BlinkUp: applying credentials");
        self.phase = Phase::Applying;

        // 1. Peer and radio server down.
        self.close_tracked_peer();
        self.radio.stop_advertise();
        self.radio.close();
        self.advertising = None;

        // 2. No more scans; the Applying phase blocks ad-hoc ones too.
        if let Some(handle) = self.scan_handle.take() {
            self.scheduler.remove(handle);
        }

        // 3.
        self.system
            .flush_parent_session(self.config.flush_timeout_secs)
            .map_err(ApplyError::Session)?;

        // 4.
        self.wifi
            .set_credentials(self.creds.ssid(), self.creds.password())
            .map_err(ApplyError::Wifi)?;
        info!("BlinkUp: WiFi credentials committed for '{}'", self.creds.ssid_lossy());

        // 5.
        if self.creds.has_enrollment() {
            self.system
                .set_enrollment(self.creds.plan_id(), self.creds.token())
                .map_err(ApplyError::Enrollment)?;
            info!("BlinkUp: enrollment committed");
        } else {
            info!("BlinkUp: no plan ID/token, WiFi-only provisioning");
        }

        // 6.
        self.emit(&HostEvent::Activated);

        // 7.
        let reboot = Schedule {
            label: REBOOT_TASK,
            kind: ScheduleKind::OneShot {
                delay_secs: self.config.reboot_delay_secs,
            },
        };
        if self.scheduler.add(reboot).is_none() {
            warn!("BlinkUp: scheduler full, rebooting now");
            self.system.reboot();
        }
        self.phase = Phase::Activated;
        Ok(())
    }

    // ── Scanning ──────────────────────────────────────────────

    /// Replace the network list with a fresh deduplicated scan.  Skipped
    /// while the list is being read or once apply has begun.
    pub fn scan(&mut self) {
        if self.phase.suppresses_scan() {
            debug!("BlinkUp: scan suppressed in {:?}", self.phase);
            return;
        }
        let Some(_guard) = self.latch.try_hold() else {
            info!("BlinkUp: scan skipped, network list is being read");
            return;
        };
        match self.wifi.scan() {
            Ok(mut list) => {
                let raw = list.len();
                dedup(&mut list);
                info!("BlinkUp: scan found {} networks ({} raw)", list.len(), raw);
                self.networks = list;
            }
            Err(e) => warn!("BlinkUp: {}, keeping previous list", e),
        }
    }

    /// Scan now; with `repeat`, keep rescanning every configured interval
    /// until [`stop_scanning`](Self::stop_scanning).
    pub fn start_scanning(&mut self, repeat: bool) -> Option<ScanHandle> {
        self.scan();
        if !repeat {
            return None;
        }
        if let Some(handle) = self.scan_handle {
            return Some(handle);
        }
        if self.phase.suppresses_scan() {
            return None;
        }
        let handle = self.scheduler.add(Schedule {
            label: SCAN_TASK,
            kind: ScheduleKind::Periodic {
                interval_secs: self.config.scan_interval_secs,
            },
        });
        if handle.is_none() {
            warn!("BlinkUp: no scheduler slot for periodic scan");
        }
        self.scan_handle = handle;
        handle
    }

    /// Cancel a repeating scan.  Returns `false` for a stale handle.
    pub fn stop_scanning(&mut self, handle: ScanHandle) -> bool {
        if self.scan_handle == Some(handle) {
            self.scan_handle = None;
        }
        self.scheduler.remove(handle)
    }

    // ── Time ──────────────────────────────────────────────────

    /// Advance deferred work by one tick.  Call from the idle loop.
    pub fn tick(&mut self, tick_secs: f32) {
        let mut fired = FiredTasks::default();
        self.scheduler.tick(tick_secs, &mut fired);
        for label in fired.0 {
            match label {
                SCAN_TASK => self.scan(),
                REBOOT_TASK => {
                    info!("BlinkUp: rebooting");
                    self.system.reboot();
                }
                other => debug!("BlinkUp: unhandled task '{}'", other),
            }
        }
    }

    // ── Teardown ──────────────────────────────────────────────

    /// Close the peer, stop advertising, and close the radio.
    pub fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.close_tracked_peer();
        if self.phase.radio_usable() {
            self.radio.stop_advertise();
            self.radio.close();
        }
        if let Some(handle) = self.scan_handle.take() {
            self.scheduler.remove(handle);
        }
        self.advertising = None;
        self.phase = Phase::Closed;
        info!("BlinkUp: closed");
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn variant(&self) -> DeviceVariant {
        self.variant
    }

    pub fn uuids(&self) -> &UuidSet {
        &self.uuids
    }

    pub fn security(&self) -> SecurityMode {
        self.security
    }

    pub fn credentials(&self) -> &PendingCredentials {
        &self.creds
    }

    pub fn peer(&self) -> Option<&Peer> {
        self.connection.peer()
    }

    pub fn networks(&self) -> &[NetworkRecord] {
        &self.networks
    }

    /// Shared handle on the network-list latch, for readers outside the
    /// engine.
    pub fn scan_latch(&self) -> Arc<ScanLatch> {
        Arc::clone(&self.latch)
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn wifi(&self) -> &W {
        &self.wifi
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    // ── Internals ─────────────────────────────────────────────

    fn emit(&mut self, event: &HostEvent) {
        if let Some(sink) = self.sink.as_mut() {
            sink.emit(event);
        }
    }

    /// Drop the tracked peer through the radio and tell the host.  The
    /// radio's own disconnect callback for it is then ignored.
    fn close_tracked_peer(&mut self) {
        if let Some(peer) = self.connection.take() {
            info!("BlinkUp: closing peer {}", peer.address);
            self.radio.close_peer(peer.handle);
            self.emit(&HostEvent::Disconnected { address: peer.address });
        }
    }

    fn resume_advertising(&mut self) {
        if self.phase != Phase::Serving {
            return;
        }
        if let Some((payload, interval)) = &self.advertising {
            if let Err(e) = self.radio.start_advertise(payload, *interval) {
                error!("BlinkUp: could not resume advertising: {}", e);
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
