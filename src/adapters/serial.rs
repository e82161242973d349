//! Serial transport to the motor unit.
//!
//! - **`target_os = "espidf"`** — UART1 at 115200 8N1 on the link pins,
//!   non-blocking reads so the bounded wait owns all timing.
//! - **all other targets** — a scripted byte source for host-side tests.

#[cfg(not(target_os = "espidf"))]
use crate::link::transport::SerialTransport;

// ───────────────────────────────────────────────────────────────
// ESP-IDF UART
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use espidf_impl::UartTransport;

#[cfg(target_os = "espidf")]
mod espidf_impl {
    use esp_idf_hal::delay::NON_BLOCK;
    use esp_idf_hal::gpio::AnyIOPin;
    use esp_idf_hal::peripheral::Peripheral;
    use esp_idf_hal::uart::{config::Config, Uart, UartDriver};
    use esp_idf_hal::units::Hertz;

    use crate::error::LinkError;
    use crate::link::transport::SerialTransport;
    use crate::pins;

    /// UART link to the motor unit.
    pub struct UartTransport {
        driver: UartDriver<'static>,
    }

    impl UartTransport {
        /// Open the link UART at the fixed baud/framing the motor unit uses.
        pub fn new(
            uart: impl Peripheral<P = impl Uart> + 'static,
            tx: AnyIOPin,
            rx: AnyIOPin,
        ) -> Result<Self, esp_idf_hal::sys::EspError> {
            let config = Config::new().baudrate(Hertz(pins::LINK_BAUD));
            let driver = UartDriver::new(
                uart,
                tx,
                rx,
                Option::<AnyIOPin>::None,
                Option::<AnyIOPin>::None,
                &config,
            )?;
            log::info!(
                "serial: link UART on GPIO{}/GPIO{} at {} baud",
                pins::LINK_UART_TX_GPIO,
                pins::LINK_UART_RX_GPIO,
                pins::LINK_BAUD
            );
            Ok(Self { driver })
        }
    }

    impl SerialTransport for UartTransport {
        type Error = LinkError;

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
            // NON_BLOCK: return immediately with whatever is in the FIFO.
            self.driver.read(buf, NON_BLOCK).map_err(|_| LinkError::Io)
        }

        fn write(&mut self, data: &[u8]) -> Result<(), LinkError> {
            let mut rest = data;
            while !rest.is_empty() {
                let n = self.driver.write(rest).map_err(|_| LinkError::Io)?;
                rest = &rest[n..];
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<(), LinkError> {
            // The TX FIFO drains on its own well inside any bounded wait;
            // nothing to force here.
            Ok(())
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

/// Scripted transport for host tests: queued inbound bytes, recorded
/// outbound lines, optional write failure injection.
#[cfg(not(target_os = "espidf"))]
pub struct ScriptedTransport {
    inbound: std::collections::VecDeque<u8>,
    written_bytes: Vec<u8>,
    pub fail_writes: bool,
}

#[cfg(not(target_os = "espidf"))]
impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            inbound: std::collections::VecDeque::new(),
            written_bytes: Vec::new(),
            fail_writes: false,
        }
    }

    /// Queue bytes the "motor unit" will have sent.
    pub fn push_reply(&mut self, text: &str) {
        self.inbound.extend(text.as_bytes());
    }

    /// Everything written so far, split into newline-terminated lines.
    pub fn written(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();
        for &b in &self.written_bytes {
            current.push(b as char);
            if b == b'\n' {
                lines.push(core::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl SerialTransport for ScriptedTransport {
    type Error = crate::error::LinkError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        while n < buf.len() {
            match self.inbound.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(crate::error::LinkError::Io);
        }
        self.written_bytes.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn scripted_roundtrip() {
        let mut t = ScriptedTransport::new();
        t.push_reply("PONG\n");
        t.write(b"PING\n").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(t.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"PONG\n");
        assert_eq!(t.written(), vec!["PING\n"]);
    }

    #[test]
    fn read_on_empty_returns_zero() {
        let mut t = ScriptedTransport::new();
        let mut buf = [0u8; 16];
        assert_eq!(t.read(&mut buf).unwrap(), 0);
    }
}
