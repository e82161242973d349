//! Transport and clock abstractions for the motor-unit link.
//!
//! The bounded-wait exchange in [`LinkClient`](super::client::LinkClient) is
//! written against these two traits so the protocol logic runs unchanged
//! against a real UART on the device and a scripted byte source with a
//! simulated clock in tests.

/// Byte-oriented serial channel to the motor unit.
pub trait SerialTransport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write all of `data` to the transport.
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Monotonic time source with a cooperative sleep.
///
/// `sleep_ms` is the only way the bridge ever waits: small increments inside
/// a bounded poll loop. Implementations take `&self` so a simulated clock can
/// advance itself from inside the wait.
pub trait Clock {
    /// Milliseconds since boot (monotonic).
    fn now_ms(&self) -> u64;

    /// Block the current (only) thread of execution for `ms` milliseconds.
    fn sleep_ms(&self, ms: u32);
}
