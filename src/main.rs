//! SmartBin Firmware: Main Entry Point
//!
//! Hexagonal architecture driven by a cooperative 100 ms main loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  Hx711Bank         LogEventSink   NvsAdapter   Esp32Time       │
//! │  (LoadCellPort)    (EventSink)    (Config+NVS) (ClockPort)     │
//! │  WifiAdapter       BleAdapter     HttpAdapter                  │
//! │  (Connectivity)    (Provisioning) (HttpPort)                   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            DeviceController (pure logic)               │    │
//! │  │  FSM · SensorManager · RemoteClient · Provisioning     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Heartbeat LED · Task watchdog                                 │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_hal::delay::{Ets, FreeRtos};
use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use loadcell::hx711::HX711;
use log::{error, info, warn};

use smartbin::adapters::ble::BleAdapter;
use smartbin::adapters::board::Board;
use smartbin::adapters::device_id::{self, DeviceIdentity};
use smartbin::adapters::http::HttpAdapter;
use smartbin::adapters::log_sink::LogEventSink;
use smartbin::adapters::nvs::NvsAdapter;
use smartbin::adapters::wifi::WifiAdapter;
use smartbin::app::controller::DeviceController;
use smartbin::app::ports::{ClockPort, ConfigPort, SystemPort};
use smartbin::config::DeviceConfig;
use smartbin::drivers::heartbeat::Heartbeat;
use smartbin::drivers::watchdog::Watchdog;
use smartbin::pins;
use smartbin::sensors::hx711::Hx711Bank;

const LOOP_PERIOD_MS: u32 = 100;
/// Slack on top of the longest blocking call inside one tick.
const WATCHDOG_MARGIN_MS: u32 = 10_000;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SmartBin v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow::anyhow!("NVS init failed: {}", e))?;
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            DeviceConfig::default()
        }
    };

    // ── 3. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    let mut cells = Vec::with_capacity(pins::HX711_PINS.len());
    for &(sck, dout) in &pins::HX711_PINS {
        // SAFETY: the HX711 GPIOs are listed once in `pins` and not
        // claimed through `peripherals` anywhere else.
        let sck = PinDriver::output(unsafe { AnyOutputPin::new(sck) })?;
        let dout = PinDriver::input(unsafe { AnyInputPin::new(dout) })?;
        cells.push(HX711::new(sck, dout, Ets));
    }
    let bank = Hx711Bank::new(cells, Ets);
    let mut heartbeat = Heartbeat::new(PinDriver::output(peripherals.pins.gpio2)?);

    // ── 4. Construct adapters ─────────────────────────────────
    let wifi = WifiAdapter::new(peripherals.modem, sysloop)?;
    let mut board = Board::new(nvs, wifi, HttpAdapter::new(), BleAdapter::new());
    let mut log_sink = LogEventSink::new();

    let identity = DeviceIdentity::from_mac(device_id::read_mac());
    info!("Device: {} ({})", identity.device_id, identity.mac_string());

    // ── 5. Controller ─────────────────────────────────────────
    let mut controller = DeviceController::new(bank, config.clone(), identity, &board);
    if let Err(e) = controller.init(&mut board, &mut log_sink) {
        error!("Startup failed: {}. Restarting in {} ms", e, config.error_restart_delay_ms);
        FreeRtos::delay_ms(config.error_restart_delay_ms);
        board.restart();
        return Ok(());
    }

    // ── 6. Watchdog ───────────────────────────────────────────
    let timeout = config.wifi_connect_timeout_ms.max(config.api_request_timeout_ms);
    let watchdog = Watchdog::new(timeout + WATCHDOG_MARGIN_MS);

    info!("System ready. Entering main loop.");

    // ── 7. Main loop ──────────────────────────────────────────
    loop {
        controller.tick(&mut board, &mut log_sink);
        heartbeat.update(controller.state(), board.time.uptime_ms());
        watchdog.feed();
        FreeRtos::delay_ms(LOOP_PERIOD_MS);
    }
}
