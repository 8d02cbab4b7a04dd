//! BLE radio adapter.
//!
//! Implements [`RadioPort`] on top of the Bluedroid GATT server and bridges
//! stack callbacks back into the [`BlinkUp`] engine.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GAP/GATTS via raw `esp_idf_svc::sys`.
//! - **all other targets**: in-memory simulation for host-side tests.
//!
//! ## Event flow
//!
//! ```text
//!  Bluedroid task            main loop
//!  ──────────────            ─────────
//!  GATTS callback ──push──▶  inbox ──next_event──▶ dispatch() ──▶ BlinkUp
//!                                                     │
//!  send_response ◀──────────── respond() ◀────────────┘
//! ```
//!
//! Reads and writes are answered by the application (`ESP_GATT_RSP_BY_APP`),
//! so the ATT response carries whatever status the engine returns.  The
//! stack allows 30 s for that, far longer than one pass of the main loop.
//!
//! Values longer than one ATT PDU arrive as Prepare Write fragments.  They
//! are assembled per peer in a [`PrepareQueue`] and reach the engine as one
//! write each when the peer sends Execute Write.

use core::fmt;
use std::collections::VecDeque;
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::app::advert::AdvertInterval;
use crate::app::events::PeerHandle;
use crate::app::gatt::{
    CharValue, Service, PROP_READ, STATUS_INVALID_LENGTH, STATUS_SUCCESS, STATUS_UNLIKELY_ERROR,
    STATUS_WRITE_NOT_PERMITTED,
};
use crate::app::ports::{EnrollmentPort, RadioError, RadioPort, SystemPort, WifiPort};
use crate::app::security::{Pin, SecurityMode};
use crate::app::service::BlinkUp;
use crate::hex::BleUuid;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

/// Events buffered between the stack task and the main loop.
pub const INBOX_CAPACITY: usize = 16;

pub const ATT_INVALID_HANDLE: u16 = 0x0001;
pub const ATT_INVALID_OFFSET: u16 = 0x0007;
pub const ATT_PREPARE_QUEUE_FULL: u16 = 0x0009;
/// Longest attribute value ATT allows.
pub const ATT_MAX_VALUE_LEN: usize = 512;
/// Distinct attributes one peer may have pending in a long write.
pub const PREPARE_QUEUE_ATTRS: usize = 5;
/// First application-defined ATT error; engine codes above one byte map here.
pub const ATT_APP_ERROR: u8 = 0x80;

/// Advertising interval limits in 0.625 ms units (20 ms to 10.24 s).
const ADV_UNITS_MIN: u32 = 0x0020;
const ADV_UNITS_MAX: u32 = 0x4000;

// ───────────────────────────────────────────────────────────────
// Conversions
// ───────────────────────────────────────────────────────────────

/// Milliseconds to controller advertising units, clamped to what the
/// controller accepts.
pub fn adv_units(ms: u16) -> u16 {
    (u32::from(ms) * 8 / 5).clamp(ADV_UNITS_MIN, ADV_UNITS_MAX) as u16
}

/// Engine status to the one-byte ATT error carried on the air.
pub fn att_status(status: u16) -> u8 {
    u8::try_from(status).unwrap_or(ATT_APP_ERROR)
}

/// `aa:bb:cc:dd:ee:ff` in over-the-air byte order.
pub fn format_address(addr: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        addr[0], addr[1], addr[2], addr[3], addr[4], addr[5]
    )
}

// ───────────────────────────────────────────────────────────────
// Attribute table
// ───────────────────────────────────────────────────────────────

/// One registered characteristic value attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrEntry {
    pub attr: u16,
    pub uuid: BleUuid,
    pub flags: u8,
    pub value: CharValue,
}

/// Attribute handle → characteristic, filled as the stack assigns handles.
#[derive(Debug, Default)]
pub struct AttrTable {
    entries: Vec<AttrEntry>,
}

impl AttrTable {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn insert(&mut self, entry: AttrEntry) {
        self.entries.retain(|e| e.attr != entry.attr);
        self.entries.push(entry);
    }

    pub fn lookup(&self, attr: u16) -> Option<&AttrEntry> {
        self.entries.iter().find(|e| e.attr == attr)
    }

    pub fn find_uuid(&self, uuid: BleUuid) -> Option<&AttrEntry> {
        self.entries.iter().find(|e| e.uuid == uuid)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Inbound events
// ───────────────────────────────────────────────────────────────

/// Something the stack reported, waiting for the main loop.
#[derive(Clone, PartialEq, Eq)]
pub enum RadioEvent {
    Connected {
        handle: PeerHandle,
        address: String,
        security: SecurityMode,
    },
    Disconnected {
        handle: PeerHandle,
    },
    Write {
        handle: PeerHandle,
        trans_id: u32,
        attr: u16,
        data: Vec<u8>,
        need_rsp: bool,
    },
    /// One fragment of a long write.
    PrepareWrite {
        handle: PeerHandle,
        trans_id: u32,
        attr: u16,
        offset: u16,
        data: Vec<u8>,
    },
    /// Commit (`commit == true`) or drop everything the peer prepared.
    ExecWrite {
        handle: PeerHandle,
        trans_id: u32,
        commit: bool,
    },
    Read {
        handle: PeerHandle,
        trans_id: u32,
        attr: u16,
        offset: u16,
    },
}

// Written values are credentials, so only their length is ever formatted.
impl fmt::Debug for RadioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected {
                handle,
                address,
                security,
            } => f
                .debug_struct("Connected")
                .field("handle", handle)
                .field("address", address)
                .field("security", security)
                .finish(),
            Self::Disconnected { handle } => f.debug_struct("Disconnected").field("handle", handle).finish(),
            Self::Write {
                handle,
                trans_id,
                attr,
                data,
                need_rsp,
            } => f
                .debug_struct("Write")
                .field("handle", handle)
                .field("trans_id", trans_id)
                .field("attr", attr)
                .field("data_len", &data.len())
                .field("need_rsp", need_rsp)
                .finish(),
            Self::PrepareWrite {
                handle,
                trans_id,
                attr,
                offset,
                data,
            } => f
                .debug_struct("PrepareWrite")
                .field("handle", handle)
                .field("trans_id", trans_id)
                .field("attr", attr)
                .field("offset", offset)
                .field("data_len", &data.len())
                .finish(),
            Self::ExecWrite {
                handle,
                trans_id,
                commit,
            } => f
                .debug_struct("ExecWrite")
                .field("handle", handle)
                .field("trans_id", trans_id)
                .field("commit", commit)
                .finish(),
            Self::Read {
                handle,
                trans_id,
                attr,
                offset,
            } => f
                .debug_struct("Read")
                .field("handle", handle)
                .field("trans_id", trans_id)
                .field("attr", attr)
                .field("offset", offset)
                .finish(),
        }
    }
}

/// An ATT response as handed to the stack.
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    pub handle: PeerHandle,
    pub trans_id: u32,
    pub attr: u16,
    /// Non-zero only when echoing a prepared fragment.
    pub offset: u16,
    pub status: u16,
    pub value: Vec<u8>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("handle", &self.handle)
            .field("trans_id", &self.trans_id)
            .field("attr", &self.attr)
            .field("offset", &self.offset)
            .field("status", &format_args!("{:#06x}", self.status))
            .field("value_len", &self.value.len())
            .finish()
    }
}

// ───────────────────────────────────────────────────────────────
// Long writes
// ───────────────────────────────────────────────────────────────

struct PreparedValue {
    peer: PeerHandle,
    attr: u16,
    value: Vec<u8>,
}

/// Prepare Write fragments held until the peer executes or cancels.
///
/// Fragments for one attribute must arrive in order with no gaps: each
/// offset has to equal the length assembled so far.
#[derive(Default)]
pub struct PrepareQueue {
    entries: Vec<PreparedValue>,
}

impl PrepareQueue {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append a fragment.  Returns the status for the prepare response.
    pub fn prepare(&mut self, peer: PeerHandle, attr: u16, offset: u16, data: &[u8]) -> u16 {
        let offset = usize::from(offset);
        if let Some(entry) = self.entries.iter_mut().find(|e| e.peer == peer && e.attr == attr) {
            if offset != entry.value.len() {
                return ATT_INVALID_OFFSET;
            }
            if offset + data.len() > ATT_MAX_VALUE_LEN {
                return STATUS_INVALID_LENGTH;
            }
            entry.value.extend_from_slice(data);
            return STATUS_SUCCESS;
        }
        if offset != 0 {
            return ATT_INVALID_OFFSET;
        }
        if data.len() > ATT_MAX_VALUE_LEN {
            return STATUS_INVALID_LENGTH;
        }
        if self.entries.iter().filter(|e| e.peer == peer).count() >= PREPARE_QUEUE_ATTRS {
            return ATT_PREPARE_QUEUE_FULL;
        }
        self.entries.push(PreparedValue {
            peer,
            attr,
            value: data.to_vec(),
        });
        STATUS_SUCCESS
    }

    /// Remove a peer's assembled values, oldest attribute first.
    pub fn take(&mut self, peer: PeerHandle) -> Vec<(u16, Vec<u8>)> {
        let (taken, kept): (Vec<PreparedValue>, Vec<PreparedValue>) = core::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.peer == peer);
        self.entries = kept;
        taken.into_iter().map(|e| (e.attr, e.value)).collect()
    }

    pub fn pending(&self, peer: PeerHandle) -> usize {
        self.entries.iter().filter(|e| e.peer == peer).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn push_event(inbox: &Mutex<VecDeque<RadioEvent>>, event: RadioEvent) -> Result<(), RadioEvent> {
    let Ok(mut queue) = inbox.lock() else {
        return Err(event);
    };
    if queue.len() >= INBOX_CAPACITY {
        return Err(event);
    }
    queue.push_back(event);
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF static state
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers with no user context, so
// everything they touch lives in statics.  GATTS callbacks run in the
// Bluedroid task, not an ISR, so std Mutex is fine.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
const GATT_IF_NONE: u32 = 0xFF;

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(GATT_IF_NONE);
#[cfg(target_os = "espidf")]
static BLE_ADV_MIN: AtomicU32 = AtomicU32::new(ADV_UNITS_MIN);
#[cfg(target_os = "espidf")]
static BLE_ADV_MAX: AtomicU32 = AtomicU32::new(ADV_UNITS_MIN);
#[cfg(target_os = "espidf")]
static BLE_SECURITY: AtomicU8 = AtomicU8::new(SecurityMode::None as u8);

#[cfg(target_os = "espidf")]
static INBOX: Mutex<VecDeque<RadioEvent>> = Mutex::new(VecDeque::new());
#[cfg(target_os = "espidf")]
static ATTRS: Mutex<AttrTable> = Mutex::new(AttrTable::new());

/// Progress through the service list while Bluedroid assigns handles.
#[cfg(target_os = "espidf")]
struct BuildCursor {
    services: Vec<Service>,
    svc: usize,
    chr: usize,
    svc_handle: u16,
}

#[cfg(target_os = "espidf")]
static BUILD: Mutex<BuildCursor> = Mutex::new(BuildCursor {
    services: Vec::new(),
    svc: 0,
    chr: 0,
    svc_handle: 0,
});

#[cfg(target_os = "espidf")]
fn uuid_to_esp(uuid: BleUuid) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    match uuid {
        BleUuid::Short(v) => {
            t.len = 2;
            t.uuid.uuid16 = v;
        }
        BleUuid::Long(v) => {
            t.len = 16;
            t.uuid.uuid128 = v.to_le_bytes();
        }
    }
    t
}

#[cfg(target_os = "espidf")]
fn current_security() -> SecurityMode {
    SecurityMode::from_code(i64::from(BLE_SECURITY.load(AtomicOrdering::Relaxed))).unwrap_or(SecurityMode::None)
}

/// Create the service at the cursor, if any remain.
#[cfg(target_os = "espidf")]
unsafe fn create_next_service(gatts_if: u8) {
    use esp_idf_svc::sys::*;
    let next = BUILD.lock().ok().and_then(|cursor| {
        cursor
            .services
            .get(cursor.svc)
            .map(|s| (s.uuid, 1 + 2 * s.characteristics.len() as u16))
    });
    let Some((uuid, num_handles)) = next else {
        let count = ATTRS.lock().map(|t| t.len()).unwrap_or(0);
        info!("BLE GATTS: table ready ({} characteristics)", count);
        return;
    };
    let mut svc_id = esp_gatt_srvc_id_t {
        id: esp_gatt_id_t {
            uuid: uuid_to_esp(uuid),
            inst_id: 0,
        },
        is_primary: true,
    };
    unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, num_handles) };
}

/// Add the characteristic at the cursor, or move on to the next service.
#[cfg(target_os = "espidf")]
unsafe fn add_next_char(gatts_if: u8) {
    use esp_idf_svc::sys::*;
    let next = BUILD.lock().ok().and_then(|cursor| {
        let svc = cursor.services.get(cursor.svc)?;
        svc.characteristics.get(cursor.chr).map(|c| (cursor.svc_handle, c.uuid, c.flags))
    });
    let Some((svc_handle, uuid, flags)) = next else {
        if let Ok(mut cursor) = BUILD.lock() {
            cursor.svc += 1;
            cursor.chr = 0;
        }
        unsafe { create_next_service(gatts_if) };
        return;
    };

    let mut perm: u32 = 0;
    let mut prop: u32 = 0;
    if flags & PROP_READ != 0 {
        perm |= ESP_GATT_PERM_READ;
        prop |= ESP_GATT_CHAR_PROP_BIT_READ;
    }
    if flags & crate::app::gatt::PROP_WRITE != 0 {
        perm |= ESP_GATT_PERM_WRITE;
        prop |= ESP_GATT_CHAR_PROP_BIT_WRITE;
    }
    let mut char_uuid = uuid_to_esp(uuid);
    unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            perm as esp_gatt_perm_t,
            prop as esp_gatt_char_prop_t,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }
}

#[cfg(target_os = "espidf")]
fn enqueue(event: RadioEvent) {
    if let Err(dropped) = push_event(&INBOX, event) {
        warn!("BLE: inbox full, dropping {:?}", dropped);
        // A dropped request still owes the peer an answer.
        match dropped {
            RadioEvent::Write {
                handle,
                trans_id,
                need_rsp: true,
                ..
            }
            | RadioEvent::PrepareWrite { handle, trans_id, .. }
            | RadioEvent::ExecWrite { handle, trans_id, .. }
            | RadioEvent::Read { handle, trans_id, .. } => {
                send_response(handle, trans_id, 0, 0, STATUS_UNLIKELY_ERROR, &[]);
            }
            _ => {}
        }
    }
}

#[cfg(target_os = "espidf")]
fn send_response(handle: PeerHandle, trans_id: u32, attr: u16, offset: u16, status: u16, value: &[u8]) {
    use esp_idf_svc::sys::*;
    let gatts_if = BLE_GATTS_IF.load(AtomicOrdering::Relaxed);
    if gatts_if == GATT_IF_NONE {
        debug!("BLE: response for {} dropped, radio closed", handle);
        return;
    }
    let mut rsp: esp_gatt_rsp_t = unsafe { core::mem::zeroed() };
    // SAFETY: attr_value is the union member used for read and prepare responses.
    unsafe {
        let cap = rsp.attr_value.value.len();
        let len = value.len().min(cap);
        rsp.attr_value.handle = attr;
        rsp.attr_value.offset = offset;
        rsp.attr_value.len = len as u16;
        rsp.attr_value.value[..len].copy_from_slice(&value[..len]);
    }
    let ret = unsafe {
        esp_ble_gatts_send_response(
            gatts_if as esp_gatt_if_t,
            handle,
            trans_id,
            esp_gatt_status_t::from(att_status(status)),
            &mut rsp,
        )
    };
    if ret != ESP_OK {
        warn!("BLE: send_response failed ({})", ret);
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_RAW_SET_COMPLETE_EVT => {
            let mut adv_params = esp_ble_adv_params_t {
                adv_int_min: BLE_ADV_MIN.load(AtomicOrdering::Relaxed) as u16,
                adv_int_max: BLE_ADV_MAX.load(AtomicOrdering::Relaxed) as u16,
                adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
                own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                ..unsafe { core::mem::zeroed() }
            };
            unsafe { esp_ble_gap_start_advertising(&mut adv_params) };
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            info!("BLE GAP: advertising stopped");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SEC_REQ_EVT => unsafe {
            esp_ble_gap_security_rsp((*param).ble_security.ble_req.bd_addr.as_mut_ptr(), true);
        },
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_AUTH_CMPL_EVT => {
            let p = unsafe { &(*param).ble_security.auth_cmpl };
            if p.success {
                info!("BLE GAP: pairing complete");
            } else {
                warn!("BLE GAP: pairing failed (reason={})", p.fail_reason);
            }
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            BLE_GATTS_IF.store(u32::from(gatts_if), AtomicOrdering::Relaxed);
            info!("BLE GATTS: app registered (if={})", gatts_if);
            // serve() may have run before registration finished.
            unsafe { create_next_service(gatts_if) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let svc_handle = unsafe { (*param).create.service_handle };
            if let Ok(mut cursor) = BUILD.lock() {
                cursor.svc_handle = svc_handle;
                cursor.chr = 0;
            }
            debug!("BLE GATTS: service created (handle={})", svc_handle);
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
                add_next_char(gatts_if);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let attr = unsafe { (*param).add_char.attr_handle };
            if let Ok(mut cursor) = BUILD.lock() {
                let entry = cursor
                    .services
                    .get(cursor.svc)
                    .and_then(|s| s.characteristics.get(cursor.chr))
                    .map(|c| AttrEntry {
                        attr,
                        uuid: c.uuid,
                        flags: c.flags,
                        value: c.value.clone(),
                    });
                if let (Some(entry), Ok(mut table)) = (entry, ATTRS.lock()) {
                    debug!("BLE GATTS: {} -> handle {}", entry.uuid, attr);
                    table.insert(entry);
                }
                cursor.chr += 1;
            }
            unsafe { add_next_char(gatts_if) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = unsafe { &(*param).connect };
            enqueue(RadioEvent::Connected {
                handle: p.conn_id,
                address: format_address(&p.remote_bda),
                security: current_security(),
            });
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            let p = unsafe { &(*param).disconnect };
            enqueue(RadioEvent::Disconnected { handle: p.conn_id });
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            let data = if p.value.is_null() {
                Vec::new()
            } else {
                unsafe { core::slice::from_raw_parts(p.value, usize::from(p.len)) }.to_vec()
            };
            if p.is_prep {
                enqueue(RadioEvent::PrepareWrite {
                    handle: p.conn_id,
                    trans_id: p.trans_id,
                    attr: p.handle,
                    offset: p.offset,
                    data,
                });
            } else {
                enqueue(RadioEvent::Write {
                    handle: p.conn_id,
                    trans_id: p.trans_id,
                    attr: p.handle,
                    data,
                    need_rsp: p.need_rsp,
                });
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_EXEC_WRITE_EVT => {
            let p = unsafe { &(*param).exec_write };
            enqueue(RadioEvent::ExecWrite {
                handle: p.conn_id,
                trans_id: p.trans_id,
                commit: u32::from(p.exec_write_flag) == ESP_GATT_PREP_WRITE_EXEC,
            });
        }
        esp_gatts_cb_event_t_ESP_GATTS_READ_EVT => {
            let p = unsafe { &(*param).read };
            enqueue(RadioEvent::Read {
                handle: p.conn_id,
                trans_id: p.trans_id,
                attr: p.handle,
                offset: p.offset,
            });
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
fn check(step: &str, ret: esp_idf_svc::sys::esp_err_t) -> Result<(), RadioError> {
    if ret != esp_idf_svc::sys::ESP_OK {
        log::error!("BLE: {} failed ({})", step, ret);
        return Err(RadioError::OpenFailed);
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
unsafe fn set_sm_param<T>(param: esp_idf_svc::sys::esp_ble_sm_param_t, value: &T) {
    unsafe {
        esp_idf_svc::sys::esp_ble_gap_set_security_param(
            param,
            value as *const T as *mut core::ffi::c_void,
            core::mem::size_of::<T>() as u8,
        );
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Closed,
    Open,
    Advertising,
}

pub struct BleAdapter {
    state: BleState,
    device_name: heapless::String<24>,
    prepared: Mutex<PrepareQueue>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimRadio,
}

/// Simulation: what a host build records in place of the stack.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimRadio {
    inbox: Mutex<VecDeque<RadioEvent>>,
    attrs: Mutex<AttrTable>,
    responses: Mutex<Vec<Response>>,
    advert: Option<(Vec<u8>, AdvertInterval)>,
    security: Option<(SecurityMode, Option<Pin>)>,
    closed_peers: Vec<PeerHandle>,
}

impl BleAdapter {
    pub fn new(device_name: heapless::String<24>) -> Self {
        Self {
            state: BleState::Closed,
            device_name,
            prepared: Mutex::new(PrepareQueue::new()),
            #[cfg(not(target_os = "espidf"))]
            sim: SimRadio::default(),
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    #[cfg(target_os = "espidf")]
    fn inbox(&self) -> &Mutex<VecDeque<RadioEvent>> {
        &INBOX
    }

    #[cfg(not(target_os = "espidf"))]
    fn inbox(&self) -> &Mutex<VecDeque<RadioEvent>> {
        &self.sim.inbox
    }

    #[cfg(target_os = "espidf")]
    fn attrs(&self) -> &Mutex<AttrTable> {
        &ATTRS
    }

    #[cfg(not(target_os = "espidf"))]
    fn attrs(&self) -> &Mutex<AttrTable> {
        &self.sim.attrs
    }

    /// Oldest stack event not yet dispatched.
    pub fn next_event(&self) -> Option<RadioEvent> {
        self.inbox().lock().ok()?.pop_front()
    }

    /// Registered characteristic behind an attribute handle.
    pub fn attribute(&self, attr: u16) -> Option<AttrEntry> {
        self.attrs().lock().ok()?.lookup(attr).cloned()
    }

    /// Attribute handle the stack assigned to a characteristic UUID.
    pub fn handle_of(&self, uuid: BleUuid) -> Option<u16> {
        self.attrs().lock().ok()?.find_uuid(uuid).map(|e| e.attr)
    }

    /// Answer a read or write the stack is holding open.
    pub fn respond(&self, handle: PeerHandle, trans_id: u32, attr: u16, status: u16, value: &[u8]) {
        self.respond_at(handle, trans_id, attr, 0, status, value);
    }

    /// As [`respond`](Self::respond), with the value offset a prepare
    /// response echoes.
    pub fn respond_at(&self, handle: PeerHandle, trans_id: u32, attr: u16, offset: u16, status: u16, value: &[u8]) {
        if status != STATUS_SUCCESS {
            debug!("BLE: attr {} answered with status {:#06x}", attr, status);
        }
        self.platform_respond(handle, trans_id, attr, offset, status, value);
    }

    /// Queue one long-write fragment from `peer`.
    pub fn prepare_write(&self, peer: PeerHandle, attr: u16, offset: u16, data: &[u8]) -> u16 {
        match self.prepared.lock() {
            Ok(mut queue) => queue.prepare(peer, attr, offset, data),
            Err(_) => STATUS_UNLIKELY_ERROR,
        }
    }

    /// Everything `peer` prepared, removed from the queue.
    pub fn take_prepared(&self, peer: PeerHandle) -> Vec<(u16, Vec<u8>)> {
        self.prepared.lock().map(|mut q| q.take(peer)).unwrap_or_default()
    }

    pub fn pending_prepared(&self, peer: PeerHandle) -> usize {
        self.prepared.lock().map(|q| q.pending(peer)).unwrap_or(0)
    }

    /// Simulation: queue an event as if the stack had raised it.
    #[cfg(not(target_os = "espidf"))]
    pub fn inject(&self, event: RadioEvent) {
        if let Err(dropped) = push_event(&self.sim.inbox, event) {
            warn!("BLE(sim): inbox full, dropping {:?}", dropped);
        }
    }

    /// Simulation: responses sent since the last call.
    #[cfg(not(target_os = "espidf"))]
    pub fn take_responses(&self) -> Vec<Response> {
        self.sim
            .responses
            .lock()
            .map(|mut r| core::mem::take(&mut *r))
            .unwrap_or_default()
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn advert(&self) -> Option<&(Vec<u8>, AdvertInterval)> {
        self.sim.advert.as_ref()
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn security(&self) -> Option<(SecurityMode, Option<Pin>)> {
        self.sim.security
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn closed_peers(&self) -> &[PeerHandle] {
        &self.sim.closed_peers
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_open(&mut self, firmware: Option<&[u8]>) -> Result<(), RadioError> {
        use esp_idf_svc::sys::*;
        if let Some(fw) = firmware {
            debug!("BLE(espidf): on-die controller, {} byte image not loaded", fw.len());
        }
        unsafe {
            // BLE-only: classic BT memory goes back to the heap.
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            check("bt_controller_init", esp_bt_controller_init(&mut bt_cfg))?;
            check("bt_controller_enable", esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE))?;
            check("bluedroid_init", esp_bluedroid_init())?;
            check("bluedroid_enable", esp_bluedroid_enable())?;

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            esp_ble_gatts_app_register(0);

            let mut name = [0u8; 25];
            name[..self.device_name.len()].copy_from_slice(self.device_name.as_bytes());
            esp_ble_gap_set_device_name(name.as_ptr().cast());
        }
        info!("BLE(espidf): Bluedroid up as '{}'", self.device_name);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_open(&mut self, firmware: Option<&[u8]>) -> Result<(), RadioError> {
        info!(
            "BLE(sim): open '{}' (firmware {} bytes)",
            self.device_name,
            firmware.map_or(0, <[u8]>::len)
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_close(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        BLE_GATTS_IF.store(GATT_IF_NONE, AtomicOrdering::Relaxed);
        if let Ok(mut cursor) = BUILD.lock() {
            cursor.services.clear();
        }
        info!("BLE(espidf): stack shut down");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_close(&mut self) {
        self.sim.advert = None;
        info!("BLE(sim): closed");
    }

    #[cfg(target_os = "espidf")]
    fn platform_serve(&mut self, services: &[Service]) -> Result<(), RadioError> {
        if let Ok(mut cursor) = BUILD.lock() {
            cursor.services = services.to_vec();
            cursor.svc = 0;
            cursor.chr = 0;
        } else {
            return Err(RadioError::ServeFailed);
        }
        let gatts_if = BLE_GATTS_IF.load(AtomicOrdering::Relaxed);
        if gatts_if != GATT_IF_NONE {
            unsafe { create_next_service(gatts_if as u8) };
        }
        Ok(())
    }

    /// Simulation: hand out handles the way Bluedroid does, one for each
    /// service declaration then a declaration/value pair per characteristic.
    #[cfg(not(target_os = "espidf"))]
    fn platform_serve(&mut self, services: &[Service]) -> Result<(), RadioError> {
        let mut table = self.sim.attrs.lock().map_err(|_| RadioError::ServeFailed)?;
        let mut next: u16 = 1;
        for service in services {
            next += 1;
            for c in &service.characteristics {
                table.insert(AttrEntry {
                    attr: next + 1,
                    uuid: c.uuid,
                    flags: c.flags,
                    value: c.value.clone(),
                });
                next += 2;
            }
        }
        info!("BLE(sim): {} attributes registered", table.len());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_advertise(&mut self, payload: &[u8], interval: AdvertInterval) -> Result<(), RadioError> {
        use esp_idf_svc::sys::*;
        BLE_ADV_MIN.store(u32::from(adv_units(interval.min_ms)), AtomicOrdering::Relaxed);
        BLE_ADV_MAX.store(u32::from(adv_units(interval.max_ms)), AtomicOrdering::Relaxed);
        // Advertising starts from the GAP callback once the payload is set.
        let ret = unsafe { esp_ble_gap_config_adv_data_raw(payload.as_ptr().cast_mut(), payload.len() as u32) };
        if ret != ESP_OK {
            warn!("BLE(espidf): config_adv_data_raw failed ({})", ret);
            return Err(RadioError::AdvertiseFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_advertise(&mut self, payload: &[u8], interval: AdvertInterval) -> Result<(), RadioError> {
        debug!(
            "BLE(sim): advertising {} bytes, units {}..{}",
            payload.len(),
            adv_units(interval.min_ms),
            adv_units(interval.max_ms)
        );
        self.sim.advert = Some((payload.to_vec(), interval));
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop_advertise(&mut self) {
        unsafe { esp_idf_svc::sys::esp_ble_gap_stop_advertising() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop_advertise(&mut self) {
        self.sim.advert = None;
    }

    #[cfg(target_os = "espidf")]
    fn platform_security(&mut self, mode: SecurityMode, pin: Option<Pin>) {
        use esp_idf_svc::sys::*;
        let (auth_req, iocap) = match mode {
            SecurityMode::None => (esp_ble_auth_req_t_ESP_LE_AUTH_NO_BOND, esp_ble_io_cap_t_ESP_IO_CAP_NONE),
            SecurityMode::Encrypted => (esp_ble_auth_req_t_ESP_LE_AUTH_BOND, esp_ble_io_cap_t_ESP_IO_CAP_NONE),
            SecurityMode::EncryptedWithPin => (
                esp_ble_auth_req_t_ESP_LE_AUTH_REQ_SC_MITM_BOND,
                esp_ble_io_cap_t_ESP_IO_CAP_OUT,
            ),
        };
        let key_size: u8 = 16;
        let keys: u8 = (ESP_BLE_ENC_KEY_MASK | ESP_BLE_ID_KEY_MASK) as u8;
        unsafe {
            set_sm_param(esp_ble_sm_param_t_ESP_BLE_SM_AUTHEN_REQ_MODE, &auth_req);
            set_sm_param(esp_ble_sm_param_t_ESP_BLE_SM_IOCAP_MODE, &iocap);
            set_sm_param(esp_ble_sm_param_t_ESP_BLE_SM_MAX_KEY_SIZE, &key_size);
            set_sm_param(esp_ble_sm_param_t_ESP_BLE_SM_SET_INIT_KEY, &keys);
            set_sm_param(esp_ble_sm_param_t_ESP_BLE_SM_SET_RSP_KEY, &keys);
            if let Some(pin) = pin {
                set_sm_param(esp_ble_sm_param_t_ESP_BLE_SM_SET_STATIC_PASSKEY, &pin.value());
            }
        }
        BLE_SECURITY.store(mode.code(), AtomicOrdering::Relaxed);
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_security(&mut self, mode: SecurityMode, pin: Option<Pin>) {
        self.sim.security = Some((mode, pin));
    }

    #[cfg(target_os = "espidf")]
    fn platform_close_peer(&mut self, handle: PeerHandle) {
        let gatts_if = BLE_GATTS_IF.load(AtomicOrdering::Relaxed);
        if gatts_if != GATT_IF_NONE {
            unsafe { esp_idf_svc::sys::esp_ble_gatts_close(gatts_if as u8, handle) };
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_close_peer(&mut self, handle: PeerHandle) {
        self.sim.closed_peers.push(handle);
    }

    #[cfg(target_os = "espidf")]
    fn platform_respond(&self, handle: PeerHandle, trans_id: u32, attr: u16, offset: u16, status: u16, value: &[u8]) {
        send_response(handle, trans_id, attr, offset, status, value);
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_respond(&self, handle: PeerHandle, trans_id: u32, attr: u16, offset: u16, status: u16, value: &[u8]) {
        if let Ok(mut r) = self.sim.responses.lock() {
            r.push(Response {
                handle,
                trans_id,
                attr,
                offset,
                status,
                value: value.to_vec(),
            });
        }
    }
}

// ───────────────────────────────────────────────────────────────
// RadioPort implementation
// ───────────────────────────────────────────────────────────────

impl RadioPort for BleAdapter {
    fn open(&mut self, firmware: Option<&[u8]>) -> Result<(), RadioError> {
        if self.state != BleState::Closed {
            return Ok(());
        }
        self.platform_open(firmware)?;
        self.state = BleState::Open;
        Ok(())
    }

    fn close(&mut self) {
        if self.state == BleState::Closed {
            return;
        }
        self.platform_close();
        if let Ok(mut table) = self.attrs().lock() {
            table.clear();
        }
        if let Ok(mut queue) = self.prepared.lock() {
            queue.clear();
        }
        self.state = BleState::Closed;
    }

    fn serve(&mut self, services: &[Service]) -> Result<(), RadioError> {
        if self.state == BleState::Closed {
            return Err(RadioError::NotOpen);
        }
        if let Ok(mut table) = self.attrs().lock() {
            table.clear();
        }
        self.platform_serve(services)
    }

    fn start_advertise(&mut self, payload: &[u8], interval: AdvertInterval) -> Result<(), RadioError> {
        if self.state == BleState::Closed {
            return Err(RadioError::NotOpen);
        }
        self.platform_advertise(payload, interval)?;
        self.state = BleState::Advertising;
        Ok(())
    }

    fn stop_advertise(&mut self) {
        if self.state == BleState::Advertising {
            self.platform_stop_advertise();
            self.state = BleState::Open;
        }
    }

    fn set_security(&mut self, mode: SecurityMode, pin: Option<Pin>) {
        if self.state == BleState::Closed {
            warn!("BLE: security change ignored, radio closed");
            return;
        }
        self.platform_security(mode, pin);
        info!("BLE: security mode {}{}", mode.code(), if pin.is_some() { " with PIN" } else { "" });
    }

    fn close_peer(&mut self, handle: PeerHandle) {
        if self.state == BleState::Closed {
            return;
        }
        info!("BLE: closing connection {}", handle);
        self.platform_close_peer(handle);
    }
}

// ───────────────────────────────────────────────────────────────
// Dispatch
// ───────────────────────────────────────────────────────────────

/// Route one stack event into the engine and answer the peer.
pub fn dispatch<W, S>(engine: &mut BlinkUp<BleAdapter, W, S>, event: RadioEvent)
where
    W: WifiPort,
    S: SystemPort + EnrollmentPort,
{
    match event {
        RadioEvent::Connected {
            handle,
            address,
            security,
        } => engine.on_peer_connected(handle, &address, security),
        RadioEvent::Disconnected { handle } => {
            let dropped = engine.radio().take_prepared(handle).len();
            if dropped > 0 {
                debug!("BLE: {} unexecuted long write(s) from {} discarded", dropped, handle);
            }
            engine.on_peer_disconnected(handle);
        }
        RadioEvent::Write {
            handle,
            trans_id,
            attr,
            data,
            need_rsp,
        } => {
            let status = write_status(engine, attr, &data);
            if need_rsp {
                engine.radio().respond(handle, trans_id, attr, status, &[]);
            }
        }
        RadioEvent::PrepareWrite {
            handle,
            trans_id,
            attr,
            offset,
            data,
        } => {
            let radio = engine.radio();
            let status = match radio.attribute(attr) {
                Some(AttrEntry {
                    value: CharValue::Dispatch(_),
                    ..
                }) => radio.prepare_write(handle, attr, offset, &data),
                Some(_) => STATUS_WRITE_NOT_PERMITTED,
                None => ATT_INVALID_HANDLE,
            };
            // An accepted fragment is echoed back for the peer to verify.
            let echo: &[u8] = if status == STATUS_SUCCESS { &data } else { &[] };
            radio.respond_at(handle, trans_id, attr, offset, status, echo);
        }
        RadioEvent::ExecWrite {
            handle,
            trans_id,
            commit,
        } => {
            let queued = engine.radio().take_prepared(handle);
            let mut status = STATUS_SUCCESS;
            if commit {
                for (attr, value) in queued {
                    status = write_status(engine, attr, &value);
                    if status != STATUS_SUCCESS {
                        break;
                    }
                }
            } else {
                debug!("BLE: {} cancelled {} long write(s)", handle, queued.len());
            }
            engine.radio().respond(handle, trans_id, 0, status, &[]);
        }
        RadioEvent::Read {
            handle,
            trans_id,
            attr,
            offset,
        } => {
            let value = match engine.radio().attribute(attr) {
                Some(AttrEntry {
                    value: CharValue::Static(bytes),
                    ..
                }) => Some(bytes),
                Some(AttrEntry {
                    uuid,
                    value: CharValue::Dispatch(_),
                    ..
                }) => Some(engine.handle_read(uuid)),
                None => None,
            };
            let radio = engine.radio();
            match value {
                None => radio.respond(handle, trans_id, attr, ATT_INVALID_HANDLE, &[]),
                Some(bytes) if usize::from(offset) > bytes.len() => {
                    radio.respond(handle, trans_id, attr, ATT_INVALID_OFFSET, &[]);
                }
                Some(bytes) => radio.respond(handle, trans_id, attr, STATUS_SUCCESS, &bytes[usize::from(offset)..]),
            }
        }
    }
}

/// Hand a complete value to the engine if `attr` accepts writes.
fn write_status<W, S>(engine: &mut BlinkUp<BleAdapter, W, S>, attr: u16, data: &[u8]) -> u16
where
    W: WifiPort,
    S: SystemPort + EnrollmentPort,
{
    match engine.radio().attribute(attr) {
        Some(AttrEntry {
            uuid,
            value: CharValue::Dispatch(_),
            ..
        }) => engine.handle_write(uuid, data),
        Some(_) => STATUS_WRITE_NOT_PERMITTED,
        None => ATT_INVALID_HANDLE,
    }
}

/// Drain every pending stack event.  Returns how many were handled.
pub fn dispatch_pending<W, S>(engine: &mut BlinkUp<BleAdapter, W, S>) -> usize
where
    W: WifiPort,
    S: SystemPort + EnrollmentPort,
{
    let mut handled = 0;
    while let Some(event) = engine.radio().next_event() {
        dispatch(engine, event);
        handled += 1;
    }
    handled
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
