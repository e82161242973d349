//! Request/response client for the motor-unit link.
//!
//! `send` writes one encoded line, then busy-polls the transport in small
//! sleep increments until a full reply line arrives or the bounded wait
//! expires. The wait is allowed to stall every other obligation of the
//! cooperative loop up to its timeout; that trade-off is owned here and
//! nowhere else. Every exchange is mirrored to the debug log.

use log::{debug, warn};

use crate::error::LinkError;

use super::dialect::{Command, Dialect};
use super::transport::{Clock, SerialTransport};

/// Sleep increment inside the bounded wait (milliseconds).
const POLL_SLEEP_MS: u32 = 10;

/// Receive buffer; a reply line never comes close to this.
const RX_CAPACITY: usize = 256;

/// One received reply line, trimmed of its terminator.
pub type ReplyLine = heapless::String<96>;

pub struct LinkClient<T: SerialTransport> {
    transport: T,
    dialect: Dialect,
    rx: heapless::Vec<u8, RX_CAPACITY>,
}

impl<T: SerialTransport> LinkClient<T> {
    pub fn new(transport: T, dialect: Dialect) -> Self {
        Self {
            transport,
            dialect,
            rx: heapless::Vec::new(),
        }
    }

    /// The dialect this link was configured with.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Direct access to the underlying transport (scripting in tests).
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Perform one exchange: write `cmd`, block up to `timeout_ms` for a
    /// full reply line.
    ///
    /// No auto-retry: a timeout is returned to the caller, who owns the
    /// retry cadence (the health timer re-pings on its own schedule; an
    /// operator command just reports the failure).
    pub fn send(
        &mut self,
        cmd: &Command,
        timeout_ms: u32,
        clock: &impl Clock,
    ) -> Result<ReplyLine, LinkError> {
        let wire = self.dialect.encode(cmd);
        self.transport
            .write(wire.as_bytes())
            .map_err(|e| {
                warn!("link: write failed: {e:?}");
                LinkError::Io
            })?;
        self.transport.flush().map_err(|_| LinkError::Io)?;
        debug!("link: -> {}", wire.trim_end());

        let deadline = clock.now_ms() + u64::from(timeout_ms);
        loop {
            self.fill_rx();
            if let Some(line) = self.take_line() {
                debug!("link: <- {line}");
                return Ok(line);
            }
            if clock.now_ms() >= deadline {
                return Err(LinkError::Timeout);
            }
            clock.sleep_ms(POLL_SLEEP_MS);
        }
    }

    /// Drain one line that arrived outside an active exchange, if any.
    ///
    /// The scheduler calls this once per pass to pick up readings the motor
    /// unit pushed on its own (or late replies from a timed-out exchange).
    pub fn poll_line(&mut self) -> Option<ReplyLine> {
        self.fill_rx();
        let line = self.take_line()?;
        debug!("link: <- {line} (unsolicited)");
        Some(line)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// Pull whatever bytes the transport has into the receive buffer.
    fn fill_rx(&mut self) {
        let mut chunk = [0u8; 64];
        loop {
            match self.transport.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    for &b in &chunk[..n] {
                        if self.rx.push(b).is_err() {
                            // Line longer than anything the protocol defines;
                            // drop the garbage and resynchronise at the next
                            // terminator.
                            warn!("link: rx overflow, resetting buffer");
                            self.rx.clear();
                        }
                    }
                }
                Err(e) => {
                    warn!("link: read failed: {e:?}");
                    break;
                }
            }
        }
    }

    /// Extract the first complete line from the receive buffer.
    fn take_line(&mut self) -> Option<ReplyLine> {
        let end = self.rx.iter().position(|&b| b == b'\n')?;
        let mut line = ReplyLine::new();
        for &b in &self.rx[..end] {
            if b == b'\r' {
                continue;
            }
            let _ = line.push(b as char);
        }
        // Shift the remainder down; replies are short and rare enough that
        // the copy is noise.
        let rest: heapless::Vec<u8, RX_CAPACITY> =
            self.rx[end + 1..].iter().copied().collect();
        self.rx = rest;
        Some(line)
    }
}
