//! Clock adapters.
//!
//! - [`MonotonicClock`] — the production clock: `esp_timer_get_time()` on
//!   the device, `std::time::Instant` on the host, with a real sleep.
//! - [`SimClock`] — host-only simulated clock whose `sleep_ms` advances
//!   simulated time instantly, making bounded-wait tests deterministic and
//!   fast.

use crate::link::transport::Clock;

/// Production clock: monotonic milliseconds since boot plus a busy sleep.
pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[cfg(target_os = "espidf")]
    fn now_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    #[cfg(target_os = "espidf")]
    fn sleep_ms(&self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn sleep_ms(&self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated clock (host tests)
// ───────────────────────────────────────────────────────────────

/// Deterministic clock: time moves only when someone sleeps or the test
/// advances it.
#[cfg(not(target_os = "espidf"))]
pub struct SimClock {
    now: core::cell::Cell<u64>,
}

#[cfg(not(target_os = "espidf"))]
impl SimClock {
    pub fn new() -> Self {
        Self { now: core::cell::Cell::new(0) }
    }

    /// Jump simulated time forward.
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep_ms(&self, ms: u32) {
        self.advance(u64::from(ms));
    }
}
