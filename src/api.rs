//! Operator-facing control and telemetry operations.
//!
//! Everything here is transport-agnostic: the espidf HTTP shim and the host
//! tests call the same methods. Each mutating call executes synchronously in
//! the cooperative loop's context, so its worst-case latency is capped by
//! the STP bounded-wait ceiling and nothing else.

use log::info;
use serde::Serialize;

use crate::behavior::RobotMode;
use crate::link::dialect::{Command, Verb};
use crate::link::transport::{Clock, SerialTransport};
use crate::scheduler::Bridge;

// ---------------------------------------------------------------------------
// Motion commands
// ---------------------------------------------------------------------------

/// Parse the single-letter (or named) verb of the command endpoint.
/// Unknown verbs pass through raw — the motor unit answers `ERR,unknown`
/// itself, which is more honest than guessing here.
pub fn parse_verb(s: &str) -> Verb {
    match s {
        "F" => Verb::Forward,
        "B" => Verb::Backward,
        "L" => Verb::Left,
        "R" => Verb::Right,
        "S" => Verb::Stop,
        "PING" => Verb::Ping,
        "SENSOR" => Verb::QuerySensors,
        other => {
            let mut s = heapless::String::new();
            for ch in other.chars() {
                if s.push(ch).is_err() {
                    break;
                }
            }
            Verb::Raw(s)
        }
    }
}

impl<T: SerialTransport> Bridge<T> {
    /// Relay one motion command; optional speed/duration overrides fall back
    /// to the configured defaults. Returns the motor unit's reply line, or a
    /// plain failure notice — a dropped command is reported, not retried.
    pub fn handle_motion(
        &mut self,
        verb: &str,
        speed_pct: Option<u8>,
        duration_ms: Option<u16>,
        clock: &impl Clock,
    ) -> String {
        let verb = parse_verb(verb);
        let cmd = if verb.is_motion() {
            Command::motion(
                verb,
                duration_ms.unwrap_or(self.config.default_duration_ms),
                speed_pct.unwrap_or(self.config.default_speed_pct),
            )
        } else {
            Command { verb, duration_ms: 0, speed_pct: 0 }
        };
        match self.send_command(&cmd, clock) {
            Ok(reply) => reply.as_str().to_string(),
            Err(e) => format!("ERR,{e}"),
        }
    }

    // -----------------------------------------------------------------------
    // Mode control
    // -----------------------------------------------------------------------

    /// Set the operating mode by name or index. Entering Idle also halts the
    /// motors; the acknowledgement is best-effort.
    pub fn handle_set_mode(&mut self, mode: &str, clock: &impl Clock) -> String {
        let Some(mode) = RobotMode::parse(mode) else {
            return "ERR,unknown mode (idle/manual/patrol/follow/return)".to_string();
        };
        self.set_mode(mode);
        if mode == RobotMode::Idle {
            let _ = self.send_command(&Command::stop(), clock);
        }
        format!("mode set to {}", mode.name())
    }

    // -----------------------------------------------------------------------
    // Free-text commands
    // -----------------------------------------------------------------------

    /// Interpret operator free text against the vocabulary table and execute
    /// the first match. Containment, not NLP: "please go forward" matches
    /// the same entry as "forward".
    pub fn handle_text(&mut self, text: &str, clock: &impl Clock) -> String {
        let text = text.to_lowercase();
        info!("api: text command: {text}");
        for (keywords, action) in VOCABULARY {
            if keywords.iter().any(|k| text.contains(k)) {
                return self.run_vocab_action(action, clock);
            }
        }
        "try: forward, backward, left, right, stop, patrol, follow, home".to_string()
    }

    fn run_vocab_action(&mut self, action: &VocabAction, clock: &impl Clock) -> String {
        match action {
            VocabAction::Motion { verb, duration_ms, reply } => {
                self.set_mode(RobotMode::Manual);
                let cmd = Command::motion(
                    verb.clone(),
                    *duration_ms,
                    self.config.default_speed_pct,
                );
                let _ = self.send_command(&cmd, clock);
                (*reply).to_string()
            }
            VocabAction::Halt => {
                self.set_mode(RobotMode::Idle);
                let _ = self.send_command(&Command::stop(), clock);
                "stopping".to_string()
            }
            VocabAction::Mode { mode, reply } => {
                self.set_mode(*mode);
                (*reply).to_string()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Status snapshot
    // -----------------------------------------------------------------------

    /// Point-in-time status JSON: link, telemetry, mode, heap, uptime,
    /// version. Served straight from the caches — no motor-unit round trip.
    pub fn status_json(&self, heap_free: u32, uptime_secs: u64) -> String {
        let snap = self.telemetry();
        let report = StatusReport {
            link: self.link_state().connected,
            distance: snap.distance_cm,
            left_obstacle: snap.left_obstacle,
            right_obstacle: snap.right_obstacle,
            mode: self.mode().name(),
            mode_id: self.mode().index(),
            heap: heap_free,
            uptime: uptime_secs,
            version: env!("CARGO_PKG_VERSION"),
        };
        serde_json::to_string(&report).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Shape of the status endpoint body.
#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    link: bool,
    distance: u16,
    left_obstacle: bool,
    right_obstacle: bool,
    mode: &'a str,
    mode_id: u8,
    heap: u32,
    uptime: u64,
    version: &'a str,
}

// ---------------------------------------------------------------------------
// Device info
// ---------------------------------------------------------------------------

/// Static device information for the info endpoint.
#[derive(Debug, Serialize)]
pub struct DeviceInfo<'a> {
    pub chip: &'a str,
    pub mac: &'a str,
    pub ap_ip: &'a str,
    pub sta_ip: Option<&'a str>,
    pub heap: u32,
    pub version: &'a str,
}

pub fn device_info_json(info: &DeviceInfo<'_>) -> String {
    serde_json::to_string(info).unwrap_or_else(|_| "{}".to_string())
}

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// One entry of the free-text table.
enum VocabAction {
    /// Switch to Manual and run a motion burst.
    Motion { verb: Verb, duration_ms: u16, reply: &'static str },
    /// Idle + motor stop.
    Halt,
    /// Pure mode change.
    Mode { mode: RobotMode, reply: &'static str },
}

/// Ordered (keywords -> action) table. First containment match wins, so the
/// more specific phrasings sit above the words they contain.
static VOCABULARY: &[(&[&str], VocabAction)] = &[
    (
        &["backward", "back up", "reverse"],
        VocabAction::Motion { verb: Verb::Backward, duration_ms: 1_000, reply: "backing up" },
    ),
    (
        &["forward", "ahead", "straight"],
        VocabAction::Motion { verb: Verb::Forward, duration_ms: 1_000, reply: "heading forward" },
    ),
    (
        &["left"],
        VocabAction::Motion { verb: Verb::Left, duration_ms: 500, reply: "turning left" },
    ),
    (
        &["right"],
        VocabAction::Motion { verb: Verb::Right, duration_ms: 500, reply: "turning right" },
    ),
    (&["stop", "halt", "stay"], VocabAction::Halt),
    (
        &["patrol"],
        VocabAction::Mode { mode: RobotMode::Patrol, reply: "starting patrol" },
    ),
    (
        &["follow"],
        VocabAction::Mode { mode: RobotMode::Follow, reply: "following" },
    ),
    (
        &["home", "return"],
        VocabAction::Mode { mode: RobotMode::Return, reply: "heading home" },
    ),
];

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;
    use crate::adapters::serial::ScriptedTransport;
    use crate::adapters::time::SimClock;
    use crate::config::BridgeConfig;

    fn bridge() -> Bridge<ScriptedTransport> {
        Bridge::new(BridgeConfig::default(), ScriptedTransport::new(), "AA:BB", 3)
    }

    #[test]
    fn motion_uses_defaults_and_returns_ack() {
        let mut b = bridge();
        let clock = SimClock::new();
        b.transport().push_reply("OK,F,500\n");
        let reply = b.handle_motion("F", None, None, &clock);
        assert_eq!(reply, "OK,F,500");
        assert_eq!(b.transport().written(), vec!["F,500\n"]);
    }

    #[test]
    fn motion_overrides_are_clamped() {
        let mut b = bridge();
        let clock = SimClock::new();
        b.transport().push_reply("OK,F,3000\n");
        b.handle_motion("F", Some(200), Some(9_999), &clock);
        assert_eq!(b.transport().written(), vec!["F,3000\n"]);
    }

    #[test]
    fn motion_timeout_reports_failure() {
        let mut b = bridge();
        let clock = SimClock::new();
        let reply = b.handle_motion("F", None, None, &clock);
        assert!(reply.starts_with("ERR,"));
    }

    #[test]
    fn unknown_verb_passes_through_raw() {
        let mut b = bridge();
        let clock = SimClock::new();
        b.transport().push_reply("OK,BEEP\n");
        let reply = b.handle_motion("BEEP", None, None, &clock);
        assert_eq!(reply, "OK,BEEP");
        assert_eq!(b.transport().written(), vec!["BEEP\n"]);
    }

    #[test]
    fn repeated_stop_is_idempotent() {
        let mut b = bridge();
        let clock = SimClock::new();
        for _ in 0..3 {
            b.transport().push_reply("OK,S\n");
            assert_eq!(b.handle_motion("S", None, None, &clock), "OK,S");
        }
        assert_eq!(b.transport().written(), vec!["S\n", "S\n", "S\n"]);
    }

    #[test]
    fn set_mode_by_name_and_index() {
        let mut b = bridge();
        let clock = SimClock::new();
        assert_eq!(b.handle_set_mode("patrol", &clock), "mode set to patrol");
        assert_eq!(b.mode(), RobotMode::Patrol);
        assert_eq!(b.handle_set_mode("3", &clock), "mode set to follow");
        assert_eq!(b.mode(), RobotMode::Follow);
    }

    #[test]
    fn idle_mode_issues_stop() {
        let mut b = bridge();
        let clock = SimClock::new();
        b.transport().push_reply("OK,S\n");
        b.handle_set_mode("idle", &clock);
        assert_eq!(b.transport().written(), vec!["S\n"]);
    }

    #[test]
    fn invalid_mode_is_rejected() {
        let mut b = bridge();
        let clock = SimClock::new();
        assert!(b.handle_set_mode("warp", &clock).starts_with("ERR,"));
        assert_eq!(b.mode(), RobotMode::Idle);
    }

    #[test]
    fn text_motion_switches_to_manual() {
        let mut b = bridge();
        let clock = SimClock::new();
        b.transport().push_reply("OK,F,1000\n");
        let reply = b.handle_text("please go Forward now", &clock);
        assert_eq!(reply, "heading forward");
        assert_eq!(b.mode(), RobotMode::Manual);
        assert_eq!(b.transport().written(), vec!["F,1000\n"]);
    }

    #[test]
    fn text_stop_returns_to_idle() {
        let mut b = bridge();
        let clock = SimClock::new();
        b.handle_set_mode("patrol", &clock);
        b.transport().push_reply("OK,S\n");
        assert_eq!(b.handle_text("stop right there", &clock), "stopping");
        assert_eq!(b.mode(), RobotMode::Idle);
    }

    #[test]
    fn text_mode_words_change_mode_without_motion() {
        let mut b = bridge();
        let clock = SimClock::new();
        assert_eq!(b.handle_text("start a patrol", &clock), "starting patrol");
        assert_eq!(b.mode(), RobotMode::Patrol);
        assert!(b.transport().written().is_empty());

        assert_eq!(b.handle_text("go home", &clock), "heading home");
        assert_eq!(b.mode(), RobotMode::Return);
    }

    #[test]
    fn unmatched_text_lists_the_vocabulary() {
        let mut b = bridge();
        let clock = SimClock::new();
        let reply = b.handle_text("do a barrel roll", &clock);
        assert!(reply.contains("patrol"));
        assert_eq!(b.mode(), RobotMode::Idle);
    }

    #[test]
    fn status_reflects_mode_and_telemetry() {
        let mut b = bridge();
        let clock = SimClock::new();
        b.handle_set_mode("manual", &clock);
        let json = b.status_json(123_456, 98);
        assert!(json.contains("\"mode\":\"manual\""));
        assert!(json.contains("\"mode_id\":1"));
        assert!(json.contains("\"heap\":123456"));
        assert!(json.contains("\"uptime\":98"));
        assert!(json.contains("\"link\":false"));
    }

    #[test]
    fn device_info_serialises() {
        let json = device_info_json(&DeviceInfo {
            chip: "ESP32-S3",
            mac: "DE:AD:BE:EF:CA:FE",
            ap_ip: "192.168.4.1",
            sta_ip: None,
            heap: 1,
            version: "2.4.1",
        });
        assert!(json.contains("\"chip\":\"ESP32-S3\""));
        assert!(json.contains("\"sta_ip\":null"));
    }
}
