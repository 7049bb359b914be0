//! Switchboard agent — device entry point.
//!
//! Single-threaded, cooperative control loop:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                 │
//! │                                                          │
//! │  RelayBank      MqttSession     WifiLink     NvsAdapter  │
//! │  (RelayPort)    (SessionPort)   (LinkPort)   (ConfigPort)│
//! │                                                          │
//! │  ─────────────── Port Trait Boundary ──────────────      │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  ReconnectSupervisor ─▶ SwitchboardService         │  │
//! │  │  (session lifecycle)    (decode · apply · publish) │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every iteration polls the Wi-Fi link, ticks the session supervisor,
//! and sleeps one configured interval. There is no other scheduler.

#![deny(unused_must_use)]

use anyhow::{Result, bail};
use log::info;

use switchboard::adapters::mqtt::MqttSession;
use switchboard::adapters::nvs::NvsAdapter;
use switchboard::adapters::relays::RelayBank;
use switchboard::adapters::wifi::WifiLink;
use switchboard::app::ports::{ConfigPort, LinkPort};
use switchboard::app::registry::OutputRegistry;
use switchboard::app::service::SwitchboardService;
use switchboard::supervisor::ReconnectSupervisor;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("switchboard v{} starting", env!("CARGO_PKG_VERSION"));

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => bail!("NVS init failed: {e}"),
    };
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => bail!("config load failed: {e}"),
    };

    // No degraded mode exists without a broker identity: an invalid or
    // unprovisioned config halts here with a diagnostic rather than
    // crash-looping against a broker this device cannot identify to.
    if let Err(e) = config.validate() {
        bail!("fatal: {e} — provision the device and reboot");
    }

    // ── 3. Wi-Fi link ─────────────────────────────────────────
    let peripherals = esp_idf_hal::peripherals::Peripherals::take()?;
    let sysloop = esp_idf_svc::eventloop::EspSystemEventLoop::take()?;
    let nvs_partition = esp_idf_svc::nvs::EspDefaultNvsPartition::take()?;
    let esp_wifi =
        esp_idf_svc::wifi::EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs_partition))?;
    let blocking = esp_idf_svc::wifi::BlockingWifi::wrap(esp_wifi, sysloop)?;

    let mut wifi = match WifiLink::new(&config.wifi_ssid, &config.wifi_password, blocking) {
        Ok(w) => w,
        Err(e) => bail!("fatal: {e} — provision Wi-Fi credentials and reboot"),
    };

    // ── 4. Relay bank and registry ────────────────────────────
    let mut relays = match RelayBank::new(switchboard::OUTPUT_TABLE) {
        Ok(b) => b,
        Err(e) => bail!("fatal: {e}"),
    };
    let registry = match OutputRegistry::from_table(switchboard::OUTPUT_TABLE, &mut relays) {
        Ok(r) => r,
        Err(e) => bail!("fatal: {e}"),
    };

    // ── 5. Service, session, supervisor ───────────────────────
    let mut service = SwitchboardService::new(registry, &config);
    let mut session = MqttSession::new(&config);
    let mut supervisor = ReconnectSupervisor::new(&config);

    info!("system ready, entering control loop");

    // ── 6. Control loop ───────────────────────────────────────
    let tick = core::time::Duration::from_millis(u64::from(config.poll_interval_ms));
    let tick_secs = config.poll_interval_ms as f32 / 1000.0;

    loop {
        wifi.poll(tick_secs);

        // The broker session is only worth driving while the link is up;
        // the supervisor sees the drop as a transport failure otherwise.
        if wifi.is_up() {
            supervisor.tick(tick_secs, &mut session, &mut relays, &mut service);
        }

        std::thread::sleep(tick);
    }
}
