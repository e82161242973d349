//! The cooperative control loop.
//!
//! One single-threaded loop carries every obligation of the bridge. Each
//! pass runs, in fixed order: the periodic health check, the telemetry
//! poll, a drain of unsolicited serial lines, the backend registration
//! heartbeat, and one behavior tick. API requests are serviced by the
//! embedding server *before* a pass, synchronously against the same state.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      one pass                              │
//! │                                                            │
//! │  API requests ─▶ health(5s) ─▶ telemetry(1s) ─▶ drain ─▶   │
//! │                  registration(60s) ─▶ behavior tick        │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing blocks except the bounded STP waits; those are allowed to stall
//! the rest of the pass up to their timeout. There is no cancellation: a
//! started exchange runs to completion or timeout.

use core::fmt::Write as _;

use log::{debug, warn};

use crate::backend::{self, HttpPost, RegistrationInfo};
use crate::behavior::{BehaviorEngine, MotionSink, RobotMode};
use crate::config::BridgeConfig;
use crate::link::client::ReplyLine;
use crate::link::dialect::Command;
use crate::link::transport::{Clock, SerialTransport};
use crate::link::{LinkClient, LinkState};
use crate::telemetry::{SensorFields, TelemetryCache};

// ---------------------------------------------------------------------------
// Periodic timer
// ---------------------------------------------------------------------------

/// Fires once per interval; each obligation owns one. First fire happens
/// one full interval after boot.
#[derive(Debug)]
pub struct PeriodicTimer {
    interval_ms: u32,
    last_fire_ms: u64,
}

impl PeriodicTimer {
    pub fn new(interval_ms: u32) -> Self {
        Self { interval_ms, last_fire_ms: 0 }
    }

    /// True at most once per interval; latches the fire time.
    pub fn due(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_fire_ms) >= u64::from(self.interval_ms) {
            self.last_fire_ms = now_ms;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Uplink view
// ---------------------------------------------------------------------------

/// What the bridge knows about its wireless uplink (station side). Written
/// by the WiFi adapter, read by the registration timer and the status API.
#[derive(Debug, Clone, Default)]
pub struct Uplink {
    pub established: bool,
    pub address: heapless::String<20>,
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// The shared context of the whole system: link, caches, mode, timers.
///
/// Everything here is single-writer by construction — the one cooperative
/// loop (plus API calls serialised against it) is the only execution
/// context that ever touches it, so reads at pass boundaries are always
/// consistent without locking.
pub struct Bridge<T: SerialTransport> {
    pub config: BridgeConfig,
    link: LinkClient<T>,
    link_state: LinkState,
    cache: TelemetryCache,
    engine: BehaviorEngine,
    uplink: Uplink,
    identity: heapless::String<24>,
    register_url: heapless::String<96>,

    health_timer: PeriodicTimer,
    telemetry_timer: PeriodicTimer,
    registration_timer: PeriodicTimer,
}

impl<T: SerialTransport> Bridge<T> {
    /// `identity` is the device MAC; `seed` feeds the patrol coin flip.
    pub fn new(config: BridgeConfig, transport: T, identity: &str, seed: u32) -> Self {
        let mut register_url = heapless::String::new();
        let _ = write!(
            register_url,
            "http://{}:{}/api/robot/register",
            config.backend_host, config.backend_port
        );
        let mut id = heapless::String::new();
        let _ = id.push_str(&identity[..identity.len().min(24)]);

        Self {
            link: LinkClient::new(transport, config.dialect),
            link_state: LinkState::default(),
            cache: TelemetryCache::new(),
            engine: BehaviorEngine::new(
                config.behavior_tick_ms,
                config.obstacle_threshold_cm,
                seed,
            ),
            uplink: Uplink::default(),
            identity: id,
            register_url,
            health_timer: PeriodicTimer::new(config.health_interval_ms),
            telemetry_timer: PeriodicTimer::new(config.telemetry_interval_ms),
            registration_timer: PeriodicTimer::new(config.registration_interval_ms),
            config,
        }
    }

    // ── Views ─────────────────────────────────────────────────

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn telemetry(&self) -> &crate::telemetry::TelemetrySnapshot {
        self.cache.snapshot()
    }

    pub fn mode(&self) -> RobotMode {
        self.engine.mode()
    }

    pub fn uplink(&self) -> &Uplink {
        &self.uplink
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Direct access to the serial transport (scripting in tests).
    pub fn transport(&mut self) -> &mut T {
        self.link.transport_mut()
    }

    /// Announce the bridge to the backend right now (boot-time heartbeat;
    /// the periodic timer takes over from there). No-op without an uplink.
    pub fn register_now(&mut self, clock: &impl Clock, http: &mut impl HttpPost) {
        if self.uplink.established {
            self.heartbeat(clock.now_ms(), http);
        }
    }

    fn heartbeat(&mut self, now_ms: u64, http: &mut impl HttpPost) {
        let info = RegistrationInfo {
            mac: &self.identity,
            ip: &self.uplink.address,
            version: env!("CARGO_PKG_VERSION"),
            uptime: now_ms / 1000,
        };
        let _ = backend::register(http, &self.register_url, &info);
    }

    /// The WiFi adapter reports station connectivity through this.
    pub fn set_uplink(&mut self, address: Option<&str>) {
        match address {
            Some(ip) => {
                self.uplink.established = true;
                self.uplink.address.clear();
                let _ = self.uplink.address.push_str(&ip[..ip.len().min(20)]);
            }
            None => {
                self.uplink = Uplink::default();
            }
        }
    }

    /// Mode transitions come only from the control API (and, for Idle with a
    /// stop, through [`crate::api`]); the engine owns the patrol sub-state.
    pub fn set_mode(&mut self, mode: RobotMode) {
        self.engine.set_mode(mode);
    }

    /// Relay one command over the link with the operator wait window.
    pub fn send_command(
        &mut self,
        cmd: &Command,
        clock: &impl Clock,
    ) -> Result<ReplyLine, crate::error::LinkError> {
        self.link.send(cmd, self.config.command_wait_ms, clock)
    }

    // ── The pass ──────────────────────────────────────────────

    /// Run one scheduler pass. Within a pass each periodic obligation runs
    /// at most once, always in the same order.
    pub fn pass(&mut self, clock: &impl Clock, http: &mut impl HttpPost) {
        let now = clock.now_ms();

        // 1. Health: ping the motor unit; the reply must carry PONG.
        if self.health_timer.due(now) {
            let alive = match self.link.send(&Command::ping(), self.config.ping_wait_ms, clock) {
                Ok(line) => line.contains("PONG"),
                Err(e) => {
                    debug!("health: {e}");
                    false
                }
            };
            if self.link_state.connected && !alive {
                warn!("health: motor unit stopped answering");
            }
            self.link_state.record(clock.now_ms(), alive);
        }

        // 2. Telemetry poll, only over a live link.
        if self.link_state.connected && self.telemetry_timer.due(now) {
            match self
                .link
                .send(&Command::query_sensors(), self.config.sensor_wait_ms, clock)
            {
                Ok(line) => match SensorFields::parse(&line) {
                    Some(fields) => self.cache.merge(&fields, clock.now_ms()),
                    None => debug!("telemetry: non-sensor reply ignored: {line}"),
                },
                Err(e) => debug!("telemetry: {e}"),
            }
        }

        // 3. Opportunistic drain of lines pushed outside an exchange.
        while let Some(line) = self.link.poll_line() {
            if let Some(fields) = SensorFields::parse(&line) {
                self.cache.merge(&fields, clock.now_ms());
            } else if line.contains("PONG") {
                // A late PONG still proves the unit is alive.
                self.link_state.record(clock.now_ms(), true);
            }
        }

        // 4. Backend heartbeat, only with an uplink. Failure waits for the
        //    next period.
        if self.uplink.established && self.registration_timer.due(now) {
            self.heartbeat(clock.now_ms(), http);
        }

        // 5. One behavior tick, commands flowing back over the same link.
        let Self { engine, link, link_state, cache, config, .. } = self;
        let mut sink = LinkSink {
            link,
            clock,
            timeout_ms: config.command_wait_ms,
        };
        engine.tick(now, link_state.connected, cache.snapshot(), &mut sink);
    }
}

/// Forwards engine commands over the serial link; a failed send is the
/// engine's loss — autonomy is best-effort and the next tick tries again.
struct LinkSink<'a, T: SerialTransport, C: Clock> {
    link: &'a mut LinkClient<T>,
    clock: &'a C,
    timeout_ms: u32,
}

impl<T: SerialTransport, C: Clock> MotionSink for LinkSink<'_, T, C> {
    fn issue(&mut self, cmd: &Command) {
        if let Err(e) = self.link.send(cmd, self.timeout_ms, self.clock) {
            debug!("behavior: command dropped: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
