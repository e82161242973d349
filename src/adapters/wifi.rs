//! WiFi lifecycle: always-on access point plus optional station uplink.
//!
//! The access point is the operator's direct line to the robot and stays up
//! no matter what — missing or wrong uplink credentials degrade the bridge
//! to AP-only, never to unreachable. The station side connects to the
//! operator's home network when credentials exist, giving the bridge its
//! backend uplink.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: ESP-IDF WiFi driver in AP+STA mode.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Reconnection policy
//!
//! On a lost station link the adapter waits an exponential backoff
//! (2 s → 4 s → 8 s … capped at 60 s) before retrying. The AP is
//! unaffected.

use core::fmt;

use log::{info, warn};

use super::nvs::Credentials;

// ───────────────────────────────────────────────────────────────
// Errors and state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ApStartFailed,
    ConnectionFailed,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no uplink credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ApStartFailed => write!(f, "access point start failed"),
            Self::ConnectionFailed => write!(f, "station connection failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationState {
    Disconnected,
    Connected,
    Reconnecting { attempt: u32 },
}

const MAX_BACKOFF_SECS: u32 = 60;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), WifiError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(WifiError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), WifiError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(WifiError::InvalidPassword);
    }
    Ok(())
}

/// Validate a credential pair before it is saved or used.
pub fn validate_credentials(creds: &Credentials) -> Result<(), WifiError> {
    validate_ssid(&creds.ssid)?;
    validate_password(&creds.password)
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    station: StationState,
    station_ip: Option<heapless::String<20>>,
    creds: Option<Credentials>,
    backoff_secs: u32,
    #[cfg(target_os = "espidf")]
    wifi: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: esp_idf_hal::modem::Modem,
        sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
        nvs: esp_idf_svc::nvs::EspDefaultNvsPartition,
    ) -> Result<Self, WifiError> {
        use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
        let wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))
            .map_err(|_| WifiError::ApStartFailed)?;
        let wifi = BlockingWifi::wrap(wifi, sysloop).map_err(|_| WifiError::ApStartFailed)?;
        Ok(Self {
            station: StationState::Disconnected,
            station_ip: None,
            creds: None,
            backoff_secs: 2,
            wifi,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            station: StationState::Disconnected,
            station_ip: None,
            creds: None,
            backoff_secs: 2,
        }
    }

    pub fn station_state(&self) -> StationState {
        self.station
    }

    /// IP of the station side while the uplink is up.
    pub fn station_ip(&self) -> Option<&str> {
        self.station_ip.as_deref()
    }

    /// Bring up the always-on hotspot. Called once at boot, before any
    /// station attempt; a failure here is a hard config error because it
    /// would leave the device unreachable.
    pub fn start_ap(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.platform_start_ap(ssid, password)?;
        info!("wifi: AP '{ssid}' up");
        Ok(())
    }

    /// Join the operator's network with the given credentials. On success
    /// the station IP is retained for the registrar and the info endpoint.
    pub fn connect_station(&mut self, creds: &Credentials) -> Result<&str, WifiError> {
        validate_credentials(creds)?;
        info!("wifi: connecting to '{}'", creds.ssid);
        self.creds = Some(creds.clone());
        match self.platform_connect() {
            Ok(ip) => {
                self.station = StationState::Connected;
                self.station_ip = Some(ip);
                self.backoff_secs = 2;
                info!("wifi: uplink up at {}", self.station_ip.as_deref().unwrap_or("?"));
                Ok(self.station_ip.as_deref().unwrap_or(""))
            }
            Err(e) => {
                warn!("wifi: station connect failed: {e}");
                self.station = StationState::Reconnecting { attempt: 0 };
                Err(e)
            }
        }
    }

    /// Drop the station side (credential clear). The AP stays up.
    pub fn disconnect_station(&mut self) {
        self.platform_disconnect();
        self.station = StationState::Disconnected;
        self.station_ip = None;
        self.creds = None;
    }

    /// Periodic upkeep: detect a dropped uplink, retry with backoff.
    /// Returns true when the uplink state changed this call.
    pub fn poll(&mut self, now_secs: u64, last_attempt_secs: &mut u64) -> bool {
        match self.station {
            StationState::Reconnecting { attempt } => {
                if self.creds.is_none() {
                    self.station = StationState::Disconnected;
                    return true;
                }
                if now_secs.saturating_sub(*last_attempt_secs) < u64::from(self.backoff_secs) {
                    return false;
                }
                *last_attempt_secs = now_secs;
                info!("wifi: reconnect attempt {attempt} (backoff {}s)", self.backoff_secs);
                match self.platform_connect() {
                    Ok(ip) => {
                        self.station = StationState::Connected;
                        self.station_ip = Some(ip);
                        self.backoff_secs = 2;
                        true
                    }
                    Err(_) => {
                        self.backoff_secs = (self.backoff_secs * 2).min(MAX_BACKOFF_SECS);
                        self.station = StationState::Reconnecting { attempt: attempt + 1 };
                        false
                    }
                }
            }
            StationState::Connected => {
                if self.platform_is_connected() {
                    false
                } else {
                    warn!("wifi: uplink lost, entering reconnect");
                    self.station = StationState::Reconnecting { attempt: 0 };
                    self.station_ip = None;
                    true
                }
            }
            StationState::Disconnected => false,
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start_ap(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        use esp_idf_svc::wifi::{
            AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration,
        };
        let ap = AccessPointConfiguration {
            ssid: ssid.try_into().map_err(|_| WifiError::InvalidSsid)?,
            password: password.try_into().map_err(|_| WifiError::InvalidPassword)?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..AccessPointConfiguration::default()
        };
        // Mixed mode from the start: the station side is reconfigured when
        // credentials arrive, without tearing the AP down.
        self.wifi
            .set_configuration(&Configuration::Mixed(ClientConfiguration::default(), ap))
            .map_err(|_| WifiError::ApStartFailed)?;
        self.wifi.start().map_err(|_| WifiError::ApStartFailed)?;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<heapless::String<20>, WifiError> {
        use core::fmt::Write;
        use esp_idf_svc::wifi::{
            AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration,
        };
        let creds = self.creds.as_ref().ok_or(WifiError::NoCredentials)?;
        let client = ClientConfiguration {
            ssid: creds.ssid.as_str().try_into().map_err(|_| WifiError::InvalidSsid)?,
            password: creds
                .password
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidPassword)?,
            auth_method: if creds.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..ClientConfiguration::default()
        };
        let ap = match self.wifi.get_configuration().map_err(|_| WifiError::ConnectionFailed)? {
            Configuration::Mixed(_, ap) | Configuration::AccessPoint(ap) => ap,
            _ => AccessPointConfiguration::default(),
        };
        self.wifi
            .set_configuration(&Configuration::Mixed(client, ap))
            .map_err(|_| WifiError::ConnectionFailed)?;
        self.wifi.connect().map_err(|_| WifiError::ConnectionFailed)?;
        self.wifi.wait_netif_up().map_err(|_| WifiError::ConnectionFailed)?;

        let ip = self
            .wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .map_err(|_| WifiError::ConnectionFailed)?
            .ip;
        let mut s = heapless::String::new();
        let _ = write!(s, "{ip}");
        Ok(s)
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        let _ = self.wifi.disconnect();
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.wifi().is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start_ap(&mut self, _ssid: &str, _password: &str) -> Result<(), WifiError> {
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<heapless::String<20>, WifiError> {
        let creds = self.creds.as_ref().ok_or(WifiError::NoCredentials)?;
        if creds.ssid.as_str() == "unreachable" {
            return Err(WifiError::ConnectionFailed);
        }
        heapless::String::try_from("192.168.0.42").map_err(|_| WifiError::ConnectionFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        info!("wifi(sim): station disconnected");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.station == StationState::Connected
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
