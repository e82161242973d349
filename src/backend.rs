//! Backend registration heartbeat.
//!
//! While the wireless uplink is established, the bridge announces itself to
//! the backend every minute: identity, reachable address, firmware version,
//! uptime. Only HTTP-OK detection matters; a failed heartbeat is logged and
//! waits for the next period — no early retry.

use log::{debug, warn};
use serde::Serialize;

use crate::error::{Error, TransportError};

/// Outbound HTTP POST port. The espidf adapter wraps the IDF HTTP client;
/// tests record the calls.
pub trait HttpPost {
    /// POST `body` as `application/json`; returns the response status code.
    fn post_json(&mut self, url: &str, body: &str) -> Result<u16, TransportError>;
}

/// Heartbeat payload. Field names are the backend's wire contract.
#[derive(Debug, Serialize)]
pub struct RegistrationInfo<'a> {
    /// Factory MAC, the device's stable identity.
    pub mac: &'a str,
    /// Address the backend can reach the bridge at (uplink IP).
    pub ip: &'a str,
    /// Running firmware version.
    pub version: &'a str,
    /// Seconds since boot.
    pub uptime: u64,
}

/// Send one heartbeat. Errors are returned for the caller to log; the
/// registrar keeps no state of its own.
pub fn register(
    http: &mut impl HttpPost,
    url: &str,
    info: &RegistrationInfo<'_>,
) -> Result<(), Error> {
    let body = serde_json::to_string(info).map_err(|_| TransportError::Encode)?;
    match http.post_json(url, &body) {
        Ok(200) => {
            debug!("backend: registered {} at {}", info.mac, info.ip);
            Ok(())
        }
        Ok(code) => {
            warn!("backend: registration rejected with status {code}");
            Err(TransportError::Status(code).into())
        }
        Err(e) => {
            warn!("backend: registration failed: {e}");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBackend {
        status: u16,
        calls: Vec<(String, String)>,
    }

    impl HttpPost for FakeBackend {
        fn post_json(&mut self, url: &str, body: &str) -> Result<u16, TransportError> {
            self.calls.push((url.to_string(), body.to_string()));
            Ok(self.status)
        }
    }

    #[test]
    fn heartbeat_posts_identity_payload() {
        let mut backend = FakeBackend { status: 200, calls: Vec::new() };
        let info = RegistrationInfo {
            mac: "DE:AD:BE:EF:CA:FE",
            ip: "192.168.0.42",
            version: "2.4.1",
            uptime: 77,
        };
        register(&mut backend, "http://backend:3001/api/robot/register", &info).unwrap();
        assert_eq!(backend.calls.len(), 1);
        let body = &backend.calls[0].1;
        assert!(body.contains("\"mac\":\"DE:AD:BE:EF:CA:FE\""));
        assert!(body.contains("\"uptime\":77"));
    }

    #[test]
    fn non_ok_status_is_an_error() {
        let mut backend = FakeBackend { status: 503, calls: Vec::new() };
        let info = RegistrationInfo { mac: "m", ip: "i", version: "v", uptime: 0 };
        let err = register(&mut backend, "http://backend/register", &info).unwrap_err();
        assert_eq!(err, Error::Transport(TransportError::Status(503)));
    }
}
