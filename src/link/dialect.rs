//! Wire dialects and the command model.
//!
//! The motor-unit firmware family speaks one of two mutually exclusive
//! line grammars:
//!
//! - **Short**: `F,<ms>` / `B,<ms>` / `L,<ms>` / `R,<ms>` / `S`
//! - **Verbose**: `M,<forward|backward|left|right>,<0.00-1.00>,<ms>` / `S`
//!
//! `PING`, `SENSOR` and raw passthrough verbs are common to both. The bridge
//! is configured with exactly one dialect at startup and never mixes them.

use core::fmt::Write;

use serde::{Deserialize, Serialize};

/// Shortest motion the motor unit accepts (milliseconds).
pub const MIN_DURATION_MS: u16 = 50;
/// Longest motion the motor unit accepts (milliseconds).
pub const MAX_DURATION_MS: u16 = 3_000;

/// One encoded wire line, newline included.
pub type WireLine = heapless::String<64>;

// ---------------------------------------------------------------------------
// Dialect
// ---------------------------------------------------------------------------

/// Which line grammar the downstream motor firmware speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    /// `<F|B|L|R>,<ms>` motion lines.
    Short,
    /// `M,<direction>,<speedFraction>,<ms>` motion lines.
    Verbose,
}

// ---------------------------------------------------------------------------
// Command model
// ---------------------------------------------------------------------------

/// What the bridge wants the motor unit to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    Ping,
    QuerySensors,
    /// Anything else passes through verbatim with an appended newline
    /// (`BEEP`, `DIST`, `IR`, `TRACK`, ...).
    Raw(heapless::String<48>),
}

impl Verb {
    /// True for the four motion verbs that carry duration and speed.
    pub fn is_motion(&self) -> bool {
        matches!(self, Self::Forward | Self::Backward | Self::Left | Self::Right)
    }

    fn short_letter(&self) -> Option<char> {
        match self {
            Self::Forward => Some('F'),
            Self::Backward => Some('B'),
            Self::Left => Some('L'),
            Self::Right => Some('R'),
            _ => None,
        }
    }

    fn direction_name(&self) -> Option<&'static str> {
        match self {
            Self::Forward => Some("forward"),
            Self::Backward => Some("backward"),
            Self::Left => Some("left"),
            Self::Right => Some("right"),
            _ => None,
        }
    }
}

/// A single transient request to the motor unit. Never persisted.
///
/// `duration_ms` and `speed_pct` are clamped at construction, so every
/// `Command` in flight already satisfies the motor unit's limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    pub duration_ms: u16,
    pub speed_pct: u8,
}

impl Command {
    /// Motion command with clamped duration and speed.
    pub fn motion(verb: Verb, duration_ms: u16, speed_pct: u8) -> Self {
        Self {
            verb,
            duration_ms: clamp_duration(duration_ms),
            speed_pct: speed_pct.min(100),
        }
    }

    /// Immediate stop. Identical every time it is issued.
    pub fn stop() -> Self {
        Self { verb: Verb::Stop, duration_ms: 0, speed_pct: 0 }
    }

    /// Health-check ping.
    pub fn ping() -> Self {
        Self { verb: Verb::Ping, duration_ms: 0, speed_pct: 0 }
    }

    /// Combined sensor poll.
    pub fn query_sensors() -> Self {
        Self { verb: Verb::QuerySensors, duration_ms: 0, speed_pct: 0 }
    }

    /// Raw passthrough; `text` is truncated to the wire-line budget.
    pub fn raw(text: &str) -> Self {
        let mut s = heapless::String::new();
        for ch in text.chars() {
            if s.push(ch).is_err() {
                break;
            }
        }
        Self { verb: Verb::Raw(s), duration_ms: 0, speed_pct: 0 }
    }
}

/// Clamp a requested motion duration into the motor unit's accepted range.
pub fn clamp_duration(ms: u16) -> u16 {
    ms.clamp(MIN_DURATION_MS, MAX_DURATION_MS)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

impl Dialect {
    /// Encode one command as a newline-terminated wire line.
    pub fn encode(&self, cmd: &Command) -> WireLine {
        let mut line = WireLine::new();
        match &cmd.verb {
            Verb::Stop => {
                let _ = line.push_str("S\n");
            }
            Verb::Ping => {
                let _ = line.push_str("PING\n");
            }
            Verb::QuerySensors => {
                let _ = line.push_str("SENSOR\n");
            }
            Verb::Raw(text) => {
                let _ = line.push_str(text);
                let _ = line.push('\n');
            }
            motion => match self {
                Self::Short => {
                    // Letter form: the motor unit applies its own fixed speed.
                    let letter = motion.short_letter().unwrap_or('S');
                    let _ = write!(line, "{},{}\n", letter, cmd.duration_ms);
                }
                Self::Verbose => {
                    let dir = motion.direction_name().unwrap_or("forward");
                    let mut frac = heapless::String::<8>::new();
                    speed_to_fraction(cmd.speed_pct, &mut frac);
                    let _ = write!(line, "M,{},{},{}\n", dir, frac, cmd.duration_ms);
                }
            },
        }
        line
    }
}

// ---------------------------------------------------------------------------
// Fixed-point speed helpers (verbose dialect)
// ---------------------------------------------------------------------------

/// Render a 0-100 percentage as the `0.00`-`1.00` wire fraction.
pub fn speed_to_fraction(pct: u8, out: &mut heapless::String<8>) {
    let pct = pct.min(100);
    let _ = write!(out, "{}.{:02}", pct / 100, pct % 100);
}

/// Parse a `0.00`-`1.00` wire fraction back into a 0-100 percentage.
///
/// Accepts one or two fractional digits; a single digit is a tenths value
/// (`0.8` == 80). Values above `1.00` saturate at 100.
pub fn speed_from_fraction(s: &str) -> Option<u8> {
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    let whole: u32 = whole.parse().ok()?;
    let frac_pct: u32 = match frac.len() {
        0 => 0,
        1 => frac.parse::<u32>().ok()? * 10,
        2 => frac.parse().ok()?,
        // Extra digits beyond the wire precision are truncated.
        _ => frac[..2].parse().ok()?,
    };
    Some((whole * 100 + frac_pct).min(100) as u8)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_dialect_motion() {
        let cmd = Command::motion(Verb::Forward, 600, 80);
        assert_eq!(Dialect::Short.encode(&cmd).as_str(), "F,600\n");
        let cmd = Command::motion(Verb::Backward, 250, 80);
        assert_eq!(Dialect::Short.encode(&cmd).as_str(), "B,250\n");
    }

    #[test]
    fn verbose_dialect_motion() {
        let cmd = Command::motion(Verb::Left, 300, 85);
        assert_eq!(Dialect::Verbose.encode(&cmd).as_str(), "M,left,0.85,300\n");
        let cmd = Command::motion(Verb::Right, 300, 100);
        assert_eq!(Dialect::Verbose.encode(&cmd).as_str(), "M,right,1.00,300\n");
    }

    #[test]
    fn stop_ping_sensor_shared_by_both_dialects() {
        for d in [Dialect::Short, Dialect::Verbose] {
            assert_eq!(d.encode(&Command::stop()).as_str(), "S\n");
            assert_eq!(d.encode(&Command::ping()).as_str(), "PING\n");
            assert_eq!(d.encode(&Command::query_sensors()).as_str(), "SENSOR\n");
        }
    }

    #[test]
    fn raw_passthrough_appends_newline() {
        let cmd = Command::raw("BEEP");
        assert_eq!(Dialect::Short.encode(&cmd).as_str(), "BEEP\n");
        assert_eq!(Dialect::Verbose.encode(&cmd).as_str(), "BEEP\n");
    }

    #[test]
    fn duration_clamped_into_motor_range() {
        assert_eq!(Command::motion(Verb::Forward, 10, 50).duration_ms, MIN_DURATION_MS);
        assert_eq!(Command::motion(Verb::Forward, 9_999, 50).duration_ms, MAX_DURATION_MS);
        assert_eq!(Command::motion(Verb::Forward, 600, 50).duration_ms, 600);
    }

    #[test]
    fn speed_clamped_to_percent() {
        assert_eq!(Command::motion(Verb::Forward, 600, 150).speed_pct, 100);
    }

    #[test]
    fn speed_fraction_edges() {
        let mut s = heapless::String::<8>::new();
        speed_to_fraction(0, &mut s);
        assert_eq!(s.as_str(), "0.00");
        s.clear();
        speed_to_fraction(100, &mut s);
        assert_eq!(s.as_str(), "1.00");
        s.clear();
        speed_to_fraction(7, &mut s);
        assert_eq!(s.as_str(), "0.07");
    }

    #[test]
    fn speed_fraction_decodes_back() {
        assert_eq!(speed_from_fraction("0.85"), Some(85));
        assert_eq!(speed_from_fraction("1.00"), Some(100));
        assert_eq!(speed_from_fraction("0.8"), Some(80));
        assert_eq!(speed_from_fraction("1.50"), Some(100));
        assert_eq!(speed_from_fraction("bogus"), None);
    }
}
