//! HTTP control surface (espidf only).
//!
//! Thin shim between the ESP-IDF HTTP server and the transport-agnostic
//! API in [`crate::api`]. The server invokes handlers from its own task, so
//! every handler and the control loop share the [`Runtime`] behind one
//! mutex — a mutating request executes serially with the loop and observes
//! tick-boundary-consistent state, preserving the single-writer model.
//!
//! Paths mirror the device's existing operator tooling:
//! `/cmd` `/mode` `/voice` `/status` `/info` `/update` `/ota/check`
//! `/ota/status` `/wifi/save` `/wifi/clear`.

use std::sync::{Arc, Mutex};

use esp_idf_svc::http::server::{Configuration as HttpConfig, EspHttpServer};
use esp_idf_svc::http::{Headers, Method};
use esp_idf_svc::io::{Read, Write};
use log::{info, warn};

use crate::adapters::firmware::PartitionSink;
use crate::adapters::http_client::EspHttp;
use crate::adapters::nvs::{CredentialStore, Credentials};
use crate::adapters::serial::UartTransport;
use crate::adapters::sysinfo;
use crate::adapters::time::MonotonicClock;
use crate::adapters::wifi::WifiAdapter;
use crate::api::{self, DeviceInfo};
use crate::link::transport::Clock;
use crate::ota::{OtaOutcome, OtaPipeline};
use crate::scheduler::Bridge;

/// Everything the handlers and the control loop share.
pub struct Runtime {
    pub bridge: Bridge<UartTransport>,
    pub ota: OtaPipeline,
    pub store: CredentialStore,
    pub wifi: WifiAdapter,
    pub http: EspHttp,
    pub clock: MonotonicClock,
    /// Set by a completed OTA or a credential clear; the control loop
    /// honours it after finishing the current pass.
    pub pending_restart: bool,
}

pub type SharedRuntime = Arc<Mutex<Runtime>>;

/// Extract and URL-decode one query parameter from a request URI.
fn query_param(uri: &str, key: &str) -> Option<String> {
    let query = uri.split_once('?')?.1;
    for pair in query.split('&') {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k == key {
            return Some(url_decode(v));
        }
    }
    None
}

fn url_decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = s.get(i + 1..i + 3);
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b as char);
                        i += 3;
                    }
                    None => {
                        out.push('%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b as char);
                i += 1;
            }
        }
    }
    out
}

/// Register every route and return the running server. The server handle
/// must stay alive for the routes to keep working.
pub fn start(runtime: SharedRuntime, ota_check_url: String) -> anyhow::Result<EspHttpServer<'static>> {
    let mut server = EspHttpServer::new(&HttpConfig::default())?;

    // ── Root: plain identification, the operator panel is external ──
    server.fn_handler("/", Method::Get, |req| -> anyhow::Result<()> {
        let mut resp = req.into_ok_response()?;
        resp.write_all(concat!("RoverLink v", env!("CARGO_PKG_VERSION"), "\n").as_bytes())?;
        Ok(())
    })?;

    // ── Motion command ────────────────────────────────────────
    let rt = runtime.clone();
    server.fn_handler("/cmd", Method::Get, move |req| -> anyhow::Result<()> {
        let uri = req.uri().to_string();
        let reply = {
            let mut guard = rt.lock().unwrap();
            let Runtime { bridge, clock, .. } = &mut *guard;
            match query_param(&uri, "c") {
                Some(verb) => {
                    let speed = query_param(&uri, "speed").and_then(|s| s.parse().ok());
                    let duration = query_param(&uri, "duration").and_then(|s| s.parse().ok());
                    bridge.handle_motion(&verb, speed, duration, clock)
                }
                None => "ERR,missing c parameter".to_string(),
            }
        };
        req.into_ok_response()?.write_all(reply.as_bytes())?;
        Ok(())
    })?;

    // ── Mode ──────────────────────────────────────────────────
    let rt = runtime.clone();
    server.fn_handler("/mode", Method::Get, move |req| -> anyhow::Result<()> {
        let uri = req.uri().to_string();
        let reply = {
            let mut guard = rt.lock().unwrap();
            let Runtime { bridge, clock, .. } = &mut *guard;
            match query_param(&uri, "m") {
                Some(mode) => bridge.handle_set_mode(&mode, clock),
                None => "ERR,missing m parameter".to_string(),
            }
        };
        req.into_ok_response()?.write_all(reply.as_bytes())?;
        Ok(())
    })?;

    // ── Free-text commands ────────────────────────────────────
    let rt = runtime.clone();
    server.fn_handler("/voice", Method::Get, move |req| -> anyhow::Result<()> {
        let uri = req.uri().to_string();
        let reply = {
            let mut guard = rt.lock().unwrap();
            let Runtime { bridge, clock, .. } = &mut *guard;
            match query_param(&uri, "text") {
                Some(text) => bridge.handle_text(&text, clock),
                None => "ERR,missing text parameter".to_string(),
            }
        };
        req.into_ok_response()?.write_all(reply.as_bytes())?;
        Ok(())
    })?;

    // ── Status and info ───────────────────────────────────────
    let rt = runtime.clone();
    server.fn_handler("/status", Method::Get, move |req| -> anyhow::Result<()> {
        let json = {
            let guard = rt.lock().unwrap();
            guard.bridge.status_json(
                sysinfo::free_heap_bytes(),
                guard.clock.now_ms() / 1000,
            )
        };
        let mut resp = req.into_response(200, None, &[("Content-Type", "application/json")])?;
        resp.write_all(json.as_bytes())?;
        Ok(())
    })?;

    let rt = runtime.clone();
    server.fn_handler("/info", Method::Get, move |req| -> anyhow::Result<()> {
        let json = {
            let guard = rt.lock().unwrap();
            let mac = sysinfo::mac_string(&sysinfo::read_mac());
            api::device_info_json(&DeviceInfo {
                chip: sysinfo::chip_model(),
                mac: &mac,
                ap_ip: "192.168.4.1",
                sta_ip: guard.wifi.station_ip(),
                heap: sysinfo::free_heap_bytes(),
                version: env!("CARGO_PKG_VERSION"),
            })
        };
        let mut resp = req.into_response(200, None, &[("Content-Type", "application/json")])?;
        resp.write_all(json.as_bytes())?;
        Ok(())
    })?;

    // ── OTA: status / check / upload ──────────────────────────
    let rt = runtime.clone();
    server.fn_handler("/ota/status", Method::Get, move |req| -> anyhow::Result<()> {
        let json = {
            let guard = rt.lock().unwrap();
            let s = guard.ota.session();
            format!(
                "{{\"current\":\"{}\",\"latest\":\"{}\",\"status\":\"{}\",\"written\":{},\"expected\":{}}}",
                s.current_version,
                if s.latest_version.is_empty() { s.current_version } else { s.latest_version.as_str() },
                s.status.name(),
                s.bytes_written,
                s.bytes_expected,
            )
        };
        let mut resp = req.into_response(200, None, &[("Content-Type", "application/json")])?;
        resp.write_all(json.as_bytes())?;
        Ok(())
    })?;

    let rt = runtime.clone();
    let check_url = ota_check_url;
    server.fn_handler("/ota/check", Method::Get, move |req| -> anyhow::Result<()> {
        let reply = {
            let mut guard = rt.lock().unwrap();
            let Runtime { ota, http, pending_restart, .. } = &mut *guard;
            let mut flash = PartitionSink::new();
            match ota.check_and_update(http, &mut flash, &check_url) {
                Ok(OtaOutcome::UpToDate) => "already up to date".to_string(),
                Ok(OtaOutcome::Updated) => {
                    *pending_restart = true;
                    format!("updated to {}, restarting", ota.session().latest_version)
                }
                Err(e) => format!("ERR,{e}"),
            }
        };
        req.into_ok_response()?.write_all(reply.as_bytes())?;
        Ok(())
    })?;

    let rt = runtime.clone();
    server.fn_handler("/update", Method::Post, move |mut req| -> anyhow::Result<()> {
        let expected: Option<u32> = req
            .header("Content-Length")
            .and_then(|v| v.parse().ok());

        // Stream the upload straight into flash, one chunk at a time.
        let outcome = {
            let mut guard = rt.lock().unwrap();
            let Runtime { ota, pending_restart, .. } = &mut *guard;
            let mut flash = PartitionSink::new();
            let mut result = ota.begin_push(expected, &mut flash);
            if result.is_ok() {
                let mut buf = [0u8; 1024];
                loop {
                    let n = match req.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(_) => {
                            ota.abort_push(&mut flash);
                            result = Err(crate::error::OtaError::ShortImage.into());
                            break;
                        }
                    };
                    if let Err(e) = ota.push_chunk(&buf[..n], &mut flash) {
                        result = Err(e);
                        break;
                    }
                }
            }
            if result.is_ok() {
                result = ota.finish_push(&mut flash);
            }
            match result {
                Ok(()) => {
                    *pending_restart = true;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(()) => {
                req.into_ok_response()?
                    .write_all(b"update flashed, restarting")?;
            }
            Err(e) => {
                warn!("httpd: upload failed: {e}");
                let mut resp = req.into_response(500, None, &[])?;
                resp.write_all(format!("ERR,{e}").as_bytes())?;
            }
        }
        Ok(())
    })?;

    // ── WiFi credentials ──────────────────────────────────────
    let rt = runtime.clone();
    server.fn_handler("/wifi/save", Method::Post, move |req| -> anyhow::Result<()> {
        let uri = req.uri().to_string();
        let reply = {
            let mut guard = rt.lock().unwrap();
            let ssid = query_param(&uri, "ssid").unwrap_or_default();
            let password = query_param(&uri, "password").unwrap_or_default();
            match Credentials::new(&ssid, &password) {
                Ok(creds) => match crate::adapters::wifi::validate_credentials(&creds) {
                    Ok(()) => {
                        let Runtime { bridge, store, wifi, .. } = &mut *guard;
                        if let Err(e) = store.save(&creds) {
                            format!("ERR,{e}")
                        } else {
                            match wifi.connect_station(&creds) {
                                Ok(ip) => {
                                    let ip = ip.to_string();
                                    bridge.set_uplink(Some(&ip));
                                    format!("connected, station IP {ip}")
                                }
                                Err(e) => format!("saved, but connect failed: {e}"),
                            }
                        }
                    }
                    Err(e) => format!("ERR,{e}"),
                },
                Err(e) => format!("ERR,{e}"),
            }
        };
        req.into_ok_response()?.write_all(reply.as_bytes())?;
        Ok(())
    })?;

    let rt = runtime.clone();
    server.fn_handler("/wifi/clear", Method::Get, move |req| -> anyhow::Result<()> {
        {
            let mut guard = rt.lock().unwrap();
            let Runtime { bridge, store, wifi, pending_restart, .. } = &mut *guard;
            if let Err(e) = store.clear() {
                warn!("httpd: credential clear failed: {e}");
            }
            wifi.disconnect_station();
            bridge.set_uplink(None);
            *pending_restart = true;
        }
        req.into_ok_response()?
            .write_all(b"credentials cleared, restarting")?;
        Ok(())
    })?;

    info!("httpd: control surface up");
    Ok(server)
}
