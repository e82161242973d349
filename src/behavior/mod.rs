//! Autonomous behavior: operating modes and the patrol engine.
//!
//! Mode transitions come only from the control API; the engine itself
//! mutates nothing but its patrol sub-state. Commands leave the engine
//! through a [`MotionSink`] delegate, so the engine knows nothing about
//! the serial link and is testable with a recording sink.

pub mod engine;

pub use engine::BehaviorEngine;

use crate::link::dialect::Command;

/// Single process-wide operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RobotMode {
    /// No autonomous action; motion commands are still relayed.
    Idle = 0,
    /// Motion only via explicit operator commands.
    Manual = 1,
    /// Autonomous roaming with obstacle avoidance.
    Patrol = 2,
    /// Placeholder: keep a target at fixed distance (needs a vision module).
    Follow = 3,
    /// Placeholder: drive back to the start point (needs localisation).
    Return = 4,
}

impl RobotMode {
    /// Lowercase name used by the mode endpoint and the status report.
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Manual => "manual",
            Self::Patrol => "patrol",
            Self::Follow => "follow",
            Self::Return => "return",
        }
    }

    /// Accepts either the lowercase name or the numeric index.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" | "0" => Some(Self::Idle),
            "manual" | "1" => Some(Self::Manual),
            "patrol" | "2" => Some(Self::Patrol),
            "follow" | "3" => Some(Self::Follow),
            "return" | "4" => Some(Self::Return),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }
}

/// Patrol sub-state; reset whenever Patrol is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatrolState {
    /// Driving forward in open space.
    #[default]
    Advancing,
    /// The last action was an avoidance turn.
    Turning,
}

/// Where the engine's motion commands go. The scheduler forwards them over
/// the serial link; tests record them.
pub trait MotionSink {
    fn issue(&mut self, cmd: &Command);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_by_name_and_index() {
        assert_eq!(RobotMode::parse("patrol"), Some(RobotMode::Patrol));
        assert_eq!(RobotMode::parse("2"), Some(RobotMode::Patrol));
        assert_eq!(RobotMode::parse("return"), Some(RobotMode::Return));
        assert_eq!(RobotMode::parse("4"), Some(RobotMode::Return));
        assert_eq!(RobotMode::parse("warp"), None);
    }

    #[test]
    fn mode_names_roundtrip() {
        for mode in [
            RobotMode::Idle,
            RobotMode::Manual,
            RobotMode::Patrol,
            RobotMode::Follow,
            RobotMode::Return,
        ] {
            assert_eq!(RobotMode::parse(mode.name()), Some(mode));
        }
    }
}
