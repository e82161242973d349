//! Pin assignments and fixed link parameters (ESP32-S3 DevKit wiring).

/// UART TX towards the motor unit.
pub const LINK_UART_TX_GPIO: i32 = 43;
/// UART RX from the motor unit.
pub const LINK_UART_RX_GPIO: i32 = 44;
/// Fixed link baud rate, 8N1 framing.
pub const LINK_BAUD: u32 = 115_200;
