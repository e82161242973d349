//! Bridge configuration parameters
//!
//! All tunable parameters for the RoverLink bridge: identity of the local
//! access point, backend registrar address, the wire dialect spoken by the
//! motor unit, and the cadences/wait windows of the cooperative loop.
//! Defaults carry the values the robot shipped with.

use serde::{Deserialize, Serialize};

use crate::link::dialect::Dialect;

/// Core bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    // --- Local access point (always on, so the bridge stays reachable) ---
    /// SSID of the hotspot the bridge exposes for direct operator control.
    pub ap_ssid: heapless::String<32>,
    /// WPA2 passphrase for the hotspot (8-64 bytes).
    pub ap_password: heapless::String<64>,

    // --- Backend registrar ---
    /// Host of the backend the bridge registers with while an uplink exists.
    pub backend_host: heapless::String<48>,
    /// TCP port of the backend.
    pub backend_port: u16,

    // --- Motor-unit link ---
    /// Wire dialect the motor unit firmware speaks. The bridge never mixes
    /// dialects within one session.
    pub dialect: Dialect,

    // --- Loop cadences ---
    /// Interval between health Pings to the motor unit (milliseconds).
    pub health_interval_ms: u32,
    /// Interval between sensor polls, only while the link is up (milliseconds).
    pub telemetry_interval_ms: u32,
    /// Interval between backend registration heartbeats (milliseconds).
    pub registration_interval_ms: u32,
    /// Minimum spacing between autonomous behavior actions (milliseconds).
    pub behavior_tick_ms: u32,

    // --- Bounded wait windows ---
    /// How long a health Ping waits for PONG (milliseconds).
    pub ping_wait_ms: u32,
    /// How long a sensor poll waits for its reading (milliseconds).
    pub sensor_wait_ms: u32,
    /// How long an operator command waits for its acknowledgement (milliseconds).
    pub command_wait_ms: u32,

    // --- Motion defaults ---
    /// Speed applied when an operator command carries no override (percent).
    pub default_speed_pct: u8,
    /// Duration applied when an operator command carries no override (ms).
    pub default_duration_ms: u16,

    // --- Autonomy ---
    /// Distance below which patrol treats a reading as an obstacle (cm).
    pub obstacle_threshold_cm: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ap_ssid: heapless::String::try_from("RoverLink").unwrap_or_default(),
            ap_password: heapless::String::try_from("roverlink").unwrap_or_default(),

            backend_host: heapless::String::try_from("192.168.0.10").unwrap_or_default(),
            backend_port: 3001,

            dialect: Dialect::Short,

            health_interval_ms: 5_000,
            telemetry_interval_ms: 1_000,
            registration_interval_ms: 60_000,
            behavior_tick_ms: 500,

            ping_wait_ms: 200,
            sensor_wait_ms: 100,
            command_wait_ms: 100,

            default_speed_pct: 60,
            default_duration_ms: 500,

            obstacle_threshold_cm: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = BridgeConfig::default();
        assert!(!c.ap_ssid.is_empty());
        assert!(c.ap_password.len() >= 8, "AP passphrase must satisfy WPA2");
        assert!(c.health_interval_ms > c.ping_wait_ms);
        assert!(c.telemetry_interval_ms > c.sensor_wait_ms);
        assert!(c.default_speed_pct <= 100);
        assert!(c.obstacle_threshold_cm > 0);
    }

    #[test]
    fn wait_windows_shorter_than_cadences() {
        let c = BridgeConfig::default();
        // A bounded wait is allowed to stall the loop, but never past the
        // cadence of the timer that issued it.
        assert!(c.ping_wait_ms < c.health_interval_ms);
        assert!(c.sensor_wait_ms < c.telemetry_interval_ms);
        assert!(c.command_wait_ms < c.behavior_tick_ms);
    }

    #[test]
    fn serde_roundtrip() {
        let c = BridgeConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.ap_ssid, c2.ap_ssid);
        assert_eq!(c.dialect, c2.dialect);
        assert_eq!(c.health_interval_ms, c2.health_interval_ms);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = BridgeConfig::default();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: BridgeConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c.backend_port, c2.backend_port);
        assert_eq!(c.default_duration_ms, c2.default_duration_ms);
    }
}
