//! BLE provisioning adapter.
//!
//! Implements [`ProvisioningTransport`], one GATT service carrying the
//! JSON command protocol.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid BLE GATT server via raw `esp_idf_svc::sys` calls.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                                   | Perms        |
//! |----------------|----------------------------------------|--------------|
//! | Command        | `12345678-1234-1234-1234-123456789abd` | Write        |
//! | Response       | `12345678-1234-1234-1234-123456789abe` | Read+Notify  |
//! | Status         | `12345678-1234-1234-1234-123456789abf` | Notify       |
//!
//! Service UUID is `12345678-1234-1234-1234-123456789abc`.

use log::{info, warn};

use crate::app::ports::{ProvisioningTransport, TransportError, TransportEvent};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x12345678_1234_1234_1234_123456789abc;
pub const CHAR_COMMAND: u128 = 0x12345678_1234_1234_1234_123456789abd;
pub const CHAR_RESPONSE: u128 = 0x12345678_1234_1234_1234_123456789abe;
pub const CHAR_STATUS: u128 = 0x12345678_1234_1234_1234_123456789abf;

/// Largest attribute value BLE allows.
pub const MAX_PAYLOAD_BYTES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF BLE static state
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures.  These statics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONNECTED: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_COMMAND_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_RESPONSE_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_STATUS_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_ATTR_STEP: AtomicU32 = AtomicU32::new(0);

// GATTS callbacks run in the Bluedroid task (not ISR), so std Mutex is safe.
#[cfg(target_os = "espidf")]
static BLE_EVENTS: std::sync::Mutex<std::collections::VecDeque<TransportEvent>> =
    std::sync::Mutex::new(std::collections::VecDeque::new());

#[cfg(target_os = "espidf")]
static SERVICE_UUID_LE: [u8; 16] = SERVICE_UUID.to_le_bytes();

#[cfg(target_os = "espidf")]
fn push_event(event: TransportEvent) {
    if let Ok(mut q) = BLE_EVENTS.lock() {
        q.push_back(event);
    }
}

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    t.uuid.uuid128 = uuid.to_le_bytes();
    t
}

#[cfg(target_os = "espidf")]
fn adv_params() -> esp_idf_svc::sys::esp_ble_adv_params_t {
    use esp_idf_svc::sys::*;
    esp_ble_adv_params_t {
        adv_int_min: 0x20,
        adv_int_max: 0x40,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..unsafe { core::mem::zeroed() }
    }
}

#[cfg(target_os = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
    use esp_idf_svc::sys::*;
    let mut char_uuid = uuid128_to_esp(uuid);
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

/// Client Characteristic Configuration descriptor, so centrals can subscribe.
#[cfg(target_os = "espidf")]
unsafe fn add_cccd(svc_handle: u16) {
    use esp_idf_svc::sys::*;
    let mut uuid: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    uuid.len = 2;
    uuid.uuid.uuid16 = ESP_GATT_UUID_CHAR_CLIENT_CONFIG as u16;
    unsafe {
        esp_ble_gatts_add_char_descr(
            svc_handle,
            &mut uuid,
            (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }
}

/// Attribute registration is sequential: each completion event adds the next.
#[cfg(target_os = "espidf")]
unsafe fn on_attribute_added(handle: u16) {
    use esp_idf_svc::sys::*;
    let svc = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
    let step = BLE_ATTR_STEP.fetch_add(1, AtomicOrdering::Relaxed);
    unsafe {
        match step {
            1 => {
                BLE_COMMAND_CHAR_HANDLE.store(u32::from(handle), AtomicOrdering::Relaxed);
                add_gatt_char(
                    svc,
                    CHAR_RESPONSE,
                    ESP_GATT_PERM_READ,
                    ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                );
            }
            2 => {
                BLE_RESPONSE_CHAR_HANDLE.store(u32::from(handle), AtomicOrdering::Relaxed);
                add_cccd(svc);
            }
            3 => {
                add_gatt_char(svc, CHAR_STATUS, ESP_GATT_PERM_READ, ESP_GATT_CHAR_PROP_BIT_NOTIFY);
            }
            4 => {
                BLE_STATUS_CHAR_HANDLE.store(u32::from(handle), AtomicOrdering::Relaxed);
                add_cccd(svc);
            }
            _ => log::info!("BLE GATTS: all attributes registered"),
        }
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => {
            let mut params = adv_params();
            unsafe {
                esp_ble_gap_start_advertising(&mut params);
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising stopped");
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

    BLE_GATTS_IF.store(u32::from(gatts_if), AtomicOrdering::Relaxed);

    unsafe {
        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                log::info!("BLE GATTS: app registered (if={})", gatts_if);
                let mut svc_id = esp_gatt_srvc_id_t {
                    id: esp_gatt_id_t { uuid: uuid128_to_esp(SERVICE_UUID), inst_id: 0 },
                    is_primary: true,
                };
                esp_ble_gatts_create_service(gatts_if, &mut svc_id, 10);
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let svc_handle = (*param).create.service_handle;
                BLE_SVC_HANDLE.store(u32::from(svc_handle), AtomicOrdering::Relaxed);
                esp_ble_gatts_start_service(svc_handle);
                BLE_ATTR_STEP.store(1, AtomicOrdering::Relaxed);
                add_gatt_char(svc_handle, CHAR_COMMAND, ESP_GATT_PERM_WRITE, ESP_GATT_CHAR_PROP_BIT_WRITE);
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                on_attribute_added((*param).add_char.attr_handle);
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
                on_attribute_added((*param).add_char_descr.attr_handle);
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                let conn_id = (*param).connect.conn_id;
                BLE_CONN_ID.store(u32::from(conn_id), AtomicOrdering::Relaxed);
                BLE_CONNECTED.store(true, AtomicOrdering::Relaxed);
                log::info!("BLE GATTS: client connected (conn_id={})", conn_id);
                push_event(TransportEvent::Connected);
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                BLE_CONNECTED.store(false, AtomicOrdering::Relaxed);
                log::info!("BLE GATTS: client disconnected");
                push_event(TransportEvent::Disconnected);
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = &(*param).write;
                if p.need_rsp {
                    esp_ble_gatts_send_response(
                        gatts_if,
                        p.conn_id,
                        p.trans_id,
                        esp_gatt_status_t_ESP_GATT_OK,
                        core::ptr::null_mut(),
                    );
                }
                if u32::from(p.handle) == BLE_COMMAND_CHAR_HANDLE.load(AtomicOrdering::Relaxed) {
                    let len = usize::from(p.len);
                    if len > MAX_PAYLOAD_BYTES {
                        log::warn!("BLE GATTS: command write too large ({} bytes)", len);
                    } else {
                        let data = core::slice::from_raw_parts(p.value, len);
                        push_event(TransportEvent::CommandReceived(data.to_vec()));
                    }
                }
            }
            _ => {}
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleAdapter {
    state: BleState,
    device_name: heapless::String<24>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimLink,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimLink {
    events: std::collections::VecDeque<TransportEvent>,
    connected: bool,
    responses: Vec<Vec<u8>>,
    status: Vec<Vec<u8>>,
    advertise_count: u32,
}

impl Default for BleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl BleAdapter {
    pub fn new() -> Self {
        Self {
            state: BleState::Idle,
            device_name: heapless::String::new(),
            #[cfg(not(target_os = "espidf"))]
            sim: SimLink::default(),
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn check_payload(payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            warn!("BLE: payload too large ({} > {})", payload.len(), MAX_PAYLOAD_BYTES);
            return Err(TransportError::PayloadTooLarge);
        }
        Ok(())
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<(), TransportError> {
        use esp_idf_svc::sys::*;
        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            // Fails harmlessly when already released on a second start.
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            if esp_bt_controller_init(&mut bt_cfg) != ESP_OK as esp_err_t {
                return Err(TransportError::InitFailed);
            }
            if esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE) != ESP_OK as esp_err_t {
                return Err(TransportError::InitFailed);
            }
            if esp_bluedroid_init() != ESP_OK as esp_err_t
                || esp_bluedroid_enable() != ESP_OK as esp_err_t
            {
                return Err(TransportError::InitFailed);
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            if esp_ble_gatts_app_register(0) != ESP_OK as esp_err_t {
                return Err(TransportError::InitFailed);
            }

            let mut name = [0u8; 25];
            let bytes = self.device_name.as_bytes();
            name[..bytes.len()].copy_from_slice(bytes);
            esp_ble_gap_set_device_name(name.as_ptr() as *const _);

            // Advertising starts from the GAP callback once the data is set.
            let mut adv_data: esp_ble_adv_data_t = core::mem::zeroed();
            adv_data.set_scan_rsp = false;
            adv_data.include_name = true;
            adv_data.min_interval = 0x0006;
            adv_data.max_interval = 0x0010;
            adv_data.service_uuid_len = SERVICE_UUID_LE.len() as u16;
            adv_data.p_service_uuid = SERVICE_UUID_LE.as_ptr() as *mut u8;
            adv_data.flag = (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8;
            if esp_ble_gap_config_adv_data(&mut adv_data) != ESP_OK as esp_err_t {
                return Err(TransportError::AdvertisingFailed);
            }
        }
        info!("BLE(espidf): Bluedroid stack initialised, advertising as '{}'", self.device_name);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> Result<(), TransportError> {
        info!("BLE(sim): advertising '{}' (service {:032x})", self.device_name, SERVICE_UUID);
        self.sim.advertise_count += 1;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        BLE_CONNECTED.store(false, AtomicOrdering::Relaxed);
        if let Ok(mut q) = BLE_EVENTS.lock() {
            q.clear();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        self.sim.connected = false;
        self.sim.events.clear();
    }

    #[cfg(target_os = "espidf")]
    fn platform_advertise(&mut self) {
        let mut params = adv_params();
        unsafe {
            esp_idf_svc::sys::esp_ble_gap_start_advertising(&mut params);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_advertise(&mut self) {
        self.sim.advertise_count += 1;
    }

    #[cfg(target_os = "espidf")]
    fn platform_poll(&mut self) -> Option<TransportEvent> {
        BLE_EVENTS.lock().ok().and_then(|mut q| q.pop_front())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_poll(&mut self) -> Option<TransportEvent> {
        self.sim.events.pop_front()
    }

    #[cfg(target_os = "espidf")]
    fn platform_notify(&mut self, characteristic: u128, payload: &[u8]) -> Result<(), TransportError> {
        use esp_idf_svc::sys::*;
        if !BLE_CONNECTED.load(AtomicOrdering::Relaxed) {
            return Err(TransportError::NotConnected);
        }
        let handle = if characteristic == CHAR_RESPONSE {
            BLE_RESPONSE_CHAR_HANDLE.load(AtomicOrdering::Relaxed)
        } else {
            BLE_STATUS_CHAR_HANDLE.load(AtomicOrdering::Relaxed)
        };
        if handle == 0 {
            return Err(TransportError::NotConnected);
        }
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as esp_gatt_if_t,
                BLE_CONN_ID.load(AtomicOrdering::Relaxed) as u16,
                handle as u16,
                payload.len() as u16,
                payload.as_ptr() as *mut u8,
                false,
            )
        };
        if ret != ESP_OK as esp_err_t {
            return Err(TransportError::SendFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&mut self, characteristic: u128, payload: &[u8]) -> Result<(), TransportError> {
        if !self.sim.connected {
            return Err(TransportError::NotConnected);
        }
        if characteristic == CHAR_RESPONSE {
            self.sim.responses.push(payload.to_vec());
        } else {
            self.sim.status.push(payload.to_vec());
        }
        Ok(())
    }
}

// ── Simulation hooks ──────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl BleAdapter {
    /// A central connects.  Ignored while the stack is down.
    pub fn sim_connect(&mut self) {
        if self.state == BleState::Advertising {
            self.sim.connected = true;
            self.sim.events.push_back(TransportEvent::Connected);
        }
    }

    pub fn sim_disconnect(&mut self) {
        if self.sim.connected {
            self.sim.connected = false;
            self.sim.events.push_back(TransportEvent::Disconnected);
        }
    }

    /// The connected central writes the command characteristic.
    pub fn sim_write_command(&mut self, payload: &[u8]) {
        if self.sim.connected && payload.len() <= MAX_PAYLOAD_BYTES {
            self.sim.events.push_back(TransportEvent::CommandReceived(payload.to_vec()));
        }
    }

    pub fn sent_responses(&self) -> &[Vec<u8>] {
        &self.sim.responses
    }

    pub fn sent_status(&self) -> &[Vec<u8>] {
        &self.sim.status
    }

    pub fn advertise_count(&self) -> u32 {
        self.sim.advertise_count
    }
}

// ───────────────────────────────────────────────────────────────
// ProvisioningTransport implementation
// ───────────────────────────────────────────────────────────────

impl ProvisioningTransport for BleAdapter {
    fn start(&mut self, name: &str) -> Result<(), TransportError> {
        if self.state != BleState::Idle {
            return Ok(());
        }
        self.device_name.clear();
        self.device_name.push_str(name).map_err(|_| TransportError::InitFailed)?;
        info!("BLE: starting advertising as '{}'", self.device_name);
        self.platform_start()?;
        self.state = BleState::Advertising;
        Ok(())
    }

    fn stop(&mut self) {
        if self.state == BleState::Idle {
            return;
        }
        self.platform_stop();
        self.state = BleState::Idle;
        info!("BLE: stopped");
    }

    fn advertise(&mut self) {
        if self.state == BleState::Idle {
            return;
        }
        self.platform_advertise();
        self.state = BleState::Advertising;
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        let event = self.platform_poll()?;
        match event {
            TransportEvent::Connected => self.state = BleState::Connected,
            TransportEvent::Disconnected if self.state != BleState::Idle => {
                self.state = BleState::Advertising;
            }
            _ => {}
        }
        Some(event)
    }

    fn send_response(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        Self::check_payload(payload)?;
        self.platform_notify(CHAR_RESPONSE, payload)
    }

    fn send_status(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        Self::check_payload(payload)?;
        self.platform_notify(CHAR_STATUS, payload)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
