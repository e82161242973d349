//! The behavior engine: one tick of autonomy per scheduler pass.
//!
//! Patrol is the only mode that currently acts. Its loop: advance in short
//! bursts, and when the cached distance drops below the obstacle threshold,
//! stop and turn away before resuming. The turn direction is an unweighted
//! coin flip — with no localisation or vision input there is nothing to
//! steer the choice, and it offers no guarantee against re-meeting the same
//! obstacle. Follow and Return are placeholder states awaiting their sensor
//! modules; they deliberately issue nothing.

use log::info;

use crate::link::dialect::{Command, Verb};
use crate::telemetry::TelemetrySnapshot;

use super::{MotionSink, PatrolState, RobotMode};

/// Forward burst length while patrolling (milliseconds).
const PATROL_FORWARD_MS: u16 = 600;
/// Avoidance turn length (milliseconds).
const PATROL_TURN_MS: u16 = 300;
/// Forward cruise speed (percent; verbose dialect only).
const PATROL_FORWARD_SPEED: u8 = 50;
/// Turn speed (percent; verbose dialect only).
const PATROL_TURN_SPEED: u8 = 60;

pub struct BehaviorEngine {
    mode: RobotMode,
    patrol: PatrolState,
    last_action_ms: u64,
    /// Minimum spacing between autonomous actions.
    cadence_ms: u32,
    /// Distance below which a reading counts as an obstacle (cm).
    obstacle_threshold_cm: u16,
    rng: XorShift32,
}

impl BehaviorEngine {
    pub fn new(cadence_ms: u32, obstacle_threshold_cm: u16, seed: u32) -> Self {
        Self {
            mode: RobotMode::Idle,
            patrol: PatrolState::Advancing,
            last_action_ms: 0,
            cadence_ms,
            obstacle_threshold_cm,
            rng: XorShift32::new(seed),
        }
    }

    pub fn mode(&self) -> RobotMode {
        self.mode
    }

    /// Switch modes. Entering Patrol resets the patrol sub-state so a stale
    /// `Turning` from a previous session cannot suppress the first advance.
    pub fn set_mode(&mut self, mode: RobotMode) {
        if mode == RobotMode::Patrol {
            self.patrol = PatrolState::Advancing;
        }
        if mode != self.mode {
            info!("behavior: mode {} -> {}", self.mode.name(), mode.name());
        }
        self.mode = mode;
    }

    /// One autonomy tick. Acts at most once per cadence window, and only
    /// while the motor-unit link is up.
    pub fn tick(
        &mut self,
        now_ms: u64,
        link_connected: bool,
        telemetry: &TelemetrySnapshot,
        sink: &mut impl MotionSink,
    ) {
        if !link_connected {
            return;
        }

        match self.mode {
            RobotMode::Patrol => self.patrol_tick(now_ms, telemetry, sink),
            // Follow needs a camera, Return needs localisation; both are
            // placeholders until those modules exist.
            RobotMode::Follow | RobotMode::Return => {}
            RobotMode::Idle | RobotMode::Manual => {}
        }
    }

    fn patrol_tick(
        &mut self,
        now_ms: u64,
        telemetry: &TelemetrySnapshot,
        sink: &mut impl MotionSink,
    ) {
        if now_ms.saturating_sub(self.last_action_ms) < u64::from(self.cadence_ms) {
            return;
        }
        self.last_action_ms = now_ms;

        let distance = telemetry.distance_cm;
        if distance > 0 && distance < self.obstacle_threshold_cm {
            // Obstacle ahead: halt, then turn a coin-flipped way. The turn
            // completes inside the motor unit before its acknowledgement, so
            // the next tick only needs to clear the sub-state.
            sink.issue(&Command::stop());
            let verb = if self.rng.next() & 1 == 0 {
                Verb::Left
            } else {
                Verb::Right
            };
            info!(
                "behavior: obstacle at {}cm, turning {:?}",
                distance, verb
            );
            sink.issue(&Command::motion(verb, PATROL_TURN_MS, PATROL_TURN_SPEED));
            self.patrol = PatrolState::Turning;
        } else if self.patrol == PatrolState::Turning {
            self.patrol = PatrolState::Advancing;
        } else {
            sink.issue(&Command::motion(
                Verb::Forward,
                PATROL_FORWARD_MS,
                PATROL_FORWARD_SPEED,
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Coin flip
// ---------------------------------------------------------------------------

/// Minimal xorshift PRNG; one bit per avoidance turn is all patrol needs.
struct XorShift32(u32);

impl XorShift32 {
    fn new(seed: u32) -> Self {
        Self(if seed == 0 { 0x9E37_79B9 } else { seed })
    }

    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that records every issued command.
    struct RecordingSink {
        commands: Vec<Command>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { commands: Vec::new() }
        }

        fn verbs(&self) -> Vec<&Verb> {
            self.commands.iter().map(|c| &c.verb).collect()
        }
    }

    impl MotionSink for RecordingSink {
        fn issue(&mut self, cmd: &Command) {
            self.commands.push(cmd.clone());
        }
    }

    fn engine() -> BehaviorEngine {
        BehaviorEngine::new(500, 30, 1)
    }

    fn telemetry(distance_cm: u16) -> TelemetrySnapshot {
        TelemetrySnapshot { distance_cm, ..TelemetrySnapshot::default() }
    }

    #[test]
    fn idle_and_manual_issue_nothing() {
        let mut sink = RecordingSink::new();
        let mut eng = engine();
        eng.tick(1_000, true, &telemetry(10), &mut sink);
        eng.set_mode(RobotMode::Manual);
        eng.tick(2_000, true, &telemetry(10), &mut sink);
        assert!(sink.commands.is_empty());
    }

    #[test]
    fn follow_and_return_are_placeholders() {
        let mut sink = RecordingSink::new();
        let mut eng = engine();
        eng.set_mode(RobotMode::Follow);
        eng.tick(1_000, true, &telemetry(10), &mut sink);
        eng.set_mode(RobotMode::Return);
        eng.tick(2_000, true, &telemetry(10), &mut sink);
        assert!(sink.commands.is_empty());
    }

    #[test]
    fn patrol_advances_in_open_space() {
        let mut sink = RecordingSink::new();
        let mut eng = engine();
        eng.set_mode(RobotMode::Patrol);
        for t in [1_000, 2_000, 3_000] {
            eng.tick(t, true, &telemetry(100), &mut sink);
        }
        assert_eq!(sink.commands.len(), 3);
        assert!(sink.verbs().iter().all(|v| **v == Verb::Forward));
    }

    #[test]
    fn patrol_obstacle_stops_then_turns_exactly_once() {
        let mut sink = RecordingSink::new();
        let mut eng = engine();
        eng.set_mode(RobotMode::Patrol);

        // Obstacle at 15 cm: Stop + one turn.
        eng.tick(1_000, true, &telemetry(15), &mut sink);
        assert_eq!(sink.commands.len(), 2);
        assert_eq!(sink.commands[0].verb, Verb::Stop);
        assert!(matches!(sink.commands[1].verb, Verb::Left | Verb::Right));

        // Path clear, sub-state clears without a command.
        eng.tick(1_500, true, &telemetry(100), &mut sink);
        assert_eq!(sink.commands.len(), 2);

        // Back to advancing.
        eng.tick(2_000, true, &telemetry(100), &mut sink);
        assert_eq!(sink.commands.len(), 3);
        assert_eq!(sink.commands[2].verb, Verb::Forward);
    }

    #[test]
    fn patrol_zero_distance_is_no_echo_not_an_obstacle() {
        let mut sink = RecordingSink::new();
        let mut eng = engine();
        eng.set_mode(RobotMode::Patrol);
        eng.tick(1_000, true, &telemetry(0), &mut sink);
        assert_eq!(sink.verbs(), vec![&Verb::Forward]);
    }

    #[test]
    fn patrol_respects_cadence() {
        let mut sink = RecordingSink::new();
        let mut eng = engine();
        eng.set_mode(RobotMode::Patrol);
        eng.tick(1_000, true, &telemetry(100), &mut sink);
        // 200 ms later: inside the cadence window, nothing issued.
        eng.tick(1_200, true, &telemetry(100), &mut sink);
        assert_eq!(sink.commands.len(), 1);
        eng.tick(1_600, true, &telemetry(100), &mut sink);
        assert_eq!(sink.commands.len(), 2);
    }

    #[test]
    fn patrol_halts_while_link_down() {
        let mut sink = RecordingSink::new();
        let mut eng = engine();
        eng.set_mode(RobotMode::Patrol);
        eng.tick(1_000, false, &telemetry(100), &mut sink);
        assert!(sink.commands.is_empty());
    }

    #[test]
    fn reentering_patrol_resets_turning_state() {
        let mut sink = RecordingSink::new();
        let mut eng = engine();
        eng.set_mode(RobotMode::Patrol);
        eng.tick(1_000, true, &telemetry(15), &mut sink);
        assert_eq!(sink.commands.len(), 2); // stop + turn, now Turning

        // Leave and re-enter patrol: first tick should advance, not silently
        // clear a stale Turning.
        eng.set_mode(RobotMode::Idle);
        eng.set_mode(RobotMode::Patrol);
        eng.tick(2_000, true, &telemetry(100), &mut sink);
        assert_eq!(sink.commands.last().unwrap().verb, Verb::Forward);
    }

    #[test]
    fn coin_flip_eventually_picks_both_directions() {
        let mut sink = RecordingSink::new();
        let mut eng = engine();
        eng.set_mode(RobotMode::Patrol);
        let mut t = 1_000;
        for _ in 0..32 {
            eng.tick(t, true, &telemetry(15), &mut sink);
            t += 500;
            // Clear the Turning state so every obstacle tick turns again.
            eng.tick(t, true, &telemetry(100), &mut sink);
            t += 500;
        }
        let turns: Vec<_> = sink
            .commands
            .iter()
            .filter(|c| matches!(c.verb, Verb::Left | Verb::Right))
            .collect();
        assert!(turns.iter().any(|c| c.verb == Verb::Left));
        assert!(turns.iter().any(|c| c.verb == Verb::Right));
    }
}
