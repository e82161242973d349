//! Adapters — concrete implementations of the port traits.
//!
//! | Adapter       | Implements              | Connects to               |
//! |---------------|-------------------------|---------------------------|
//! | `serial`      | SerialTransport         | UART1 to the motor unit   |
//! | `time`        | Clock                   | ESP32 system timer        |
//! | `nvs`         | credential persistence  | NVS / in-memory store     |
//! | `wifi`        | AP + station lifecycle  | ESP-IDF WiFi driver       |
//! | `firmware`    | FirmwareSink            | inactive OTA partition    |
//! | `http_client` | HttpPost, UpdateSource  | backend over HTTP         |
//! | `httpd`       | control surface         | ESP-IDF HTTP server       |
//! | `sysinfo`     | identity, heap, restart | eFuse MAC, heap, reset    |
//!
//! Everything ESP-IDF-specific is guarded by `#[cfg(target_os = "espidf")]`;
//! each adapter carries a simulation fallback so the bridge logic builds and
//! tests on the host.

pub mod firmware;
pub mod http_client;
#[cfg(target_os = "espidf")]
pub mod httpd;
pub mod nvs;
pub mod serial;
pub mod sysinfo;
pub mod time;
pub mod wifi;
