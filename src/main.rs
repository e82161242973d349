//! RoverLink — Main Entry Point
//!
//! Single cooperative control loop, hexagonal adapters around it:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  UartTransport    WifiAdapter    CredentialStore   EspHttp     │
//! │  (motor link)     (AP + uplink)  (NVS creds)       (backend)   │
//! │  EspHttpServer    PartitionSink  MonotonicClock                │
//! │  (operator API)   (OTA flash)    (bounded waits)               │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │         Bridge (pure logic, one pass at a time)        │    │
//! │  │  STP link · telemetry cache · behavior · registrar     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  OtaPipeline (driven from the API surface)                     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::IOPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};

use roverlink::adapters::firmware;
use roverlink::adapters::http_client::EspHttp;
use roverlink::adapters::httpd::{self, Runtime};
use roverlink::adapters::nvs::CredentialStore;
use roverlink::adapters::serial::UartTransport;
use roverlink::adapters::sysinfo;
use roverlink::adapters::time::MonotonicClock;
use roverlink::adapters::wifi::WifiAdapter;
use roverlink::config::BridgeConfig;
use roverlink::link::transport::Clock;
use roverlink::ota::OtaPipeline;
use roverlink::scheduler::Bridge;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  RoverLink v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 1b. OTA rollback check ────────────────────────────────
    firmware::check_rollback();

    // ── Phase 0: hardware ─────────────────────────────────────
    info!("[phase 0] hardware");
    let peripherals = Peripherals::take()?;
    let transport = UartTransport::new(
        peripherals.uart1,
        peripherals.pins.gpio43.downgrade(),
        peripherals.pins.gpio44.downgrade(),
    )?;
    info!("  motor-unit link: UART1 ready");

    // ── Phase 1: network ──────────────────────────────────────
    info!("[phase 1] network");
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let store = CredentialStore::new().map_err(|e| anyhow::anyhow!("{e}"))?;

    let config = BridgeConfig::default();
    let mut wifi = WifiAdapter::new(peripherals.modem, sysloop, nvs_partition)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    // The AP is the fallback of last resort: without it a bad credential
    // set would strand the robot. Start it before touching the station.
    if let Err(e) = wifi.start_ap(&config.ap_ssid, &config.ap_password) {
        warn!("AP start failed ({e}); operator panel unreachable until reboot");
    }

    let mut station_ip: Option<String> = None;
    match store.load() {
        Some(creds) => match wifi.connect_station(&creds) {
            Ok(ip) => station_ip = Some(ip.to_string()),
            Err(e) => warn!("uplink join failed ({e}); running AP-only"),
        },
        None => info!("no uplink credentials stored; running AP-only"),
    }

    // ── Phase 2: services ─────────────────────────────────────
    info!("[phase 2] services");
    let clock = MonotonicClock::new();
    // Coin-flip seed: boot-time jitter is plenty for one bit per turn.
    let seed = (clock.now_ms() as u32) | 1;
    let mac = sysinfo::mac_string(&sysinfo::read_mac());
    info!("  identity: {mac}");

    let mut bridge = Bridge::new(config.clone(), transport, &mac, seed);
    if let Some(ip) = &station_ip {
        bridge.set_uplink(Some(ip));
    }

    let ota_check_url = format!(
        "http://{}:{}/api/ota/check?version={}",
        config.backend_host,
        config.backend_port,
        env!("CARGO_PKG_VERSION"),
    );

    let runtime = Arc::new(Mutex::new(Runtime {
        bridge,
        ota: OtaPipeline::new(),
        store,
        wifi,
        http: EspHttp::new(),
        clock,
        pending_restart: false,
    }));
    let _server = httpd::start(runtime.clone(), ota_check_url)?;

    // Boot-time heartbeat so the backend learns the address immediately;
    // the 60 s timer takes over from here.
    {
        let mut guard = runtime.lock().unwrap();
        let Runtime { bridge, http, clock, .. } = &mut *guard;
        bridge.register_now(clock, http);
    }

    // ── Phase 3: ready ────────────────────────────────────────
    info!("[phase 3] ready");
    info!("  operator panel: http://192.168.4.1/");
    if let Some(ip) = &station_ip {
        info!("  uplink address: http://{ip}/");
    }

    // ── Control loop ──────────────────────────────────────────
    let mut last_wifi_attempt_secs = 0u64;
    loop {
        let restart = {
            let mut guard = runtime.lock().unwrap();
            let Runtime { bridge, wifi, http, clock, pending_restart, .. } = &mut *guard;

            // Uplink upkeep: reconnect with backoff, keep the bridge's view
            // of the station address current.
            if wifi.poll(clock.now_ms() / 1000, &mut last_wifi_attempt_secs) {
                bridge.set_uplink(wifi.station_ip());
            }

            bridge.pass(clock, http);
            *pending_restart
        };

        if restart {
            // Give the HTTP response that requested this time to flush.
            info!("restart requested, going down");
            FreeRtos::delay_ms(1_000);
            sysinfo::restart();
        }

        // Yield between passes; all real waiting happens inside the STP
        // bounded waits.
        FreeRtos::delay_ms(20);
    }
}
