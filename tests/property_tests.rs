//! Property and fuzz-style tests for robustness of the wire layer.
//!
//! Runs on host (x86_64) only — proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use proptest::prelude::*;
use roverlink::link::dialect::{
    clamp_duration, speed_from_fraction, speed_to_fraction, Command, Dialect, Verb,
    MAX_DURATION_MS, MIN_DURATION_MS,
};
use roverlink::telemetry::SensorFields;

proptest! {
    /// Every possible duration lands inside the motor unit's accepted range,
    /// and in-range values pass through unchanged.
    #[test]
    fn duration_clamp_always_in_range(ms in any::<u16>()) {
        let clamped = clamp_duration(ms);
        prop_assert!((MIN_DURATION_MS..=MAX_DURATION_MS).contains(&clamped));
        if (MIN_DURATION_MS..=MAX_DURATION_MS).contains(&ms) {
            prop_assert_eq!(clamped, ms);
        }
    }

    /// Encoding a 0-100 speed to the verbose fraction and decoding back
    /// yields the same integer within ±1 (fixed-point rounding budget).
    #[test]
    fn speed_fraction_roundtrips_within_one(pct in 0u8..=100) {
        let mut s = heapless::String::<8>::new();
        speed_to_fraction(pct, &mut s);
        let decoded = speed_from_fraction(&s).expect("own encoding must decode");
        prop_assert!(decoded.abs_diff(pct) <= 1);
    }

    /// Motion commands always encode to a single newline-terminated line
    /// in either dialect, whatever the inputs.
    #[test]
    fn encoded_lines_are_single_and_terminated(
        ms in any::<u16>(),
        pct in any::<u8>(),
        verb_idx in 0usize..4,
    ) {
        let verb = [Verb::Forward, Verb::Backward, Verb::Left, Verb::Right][verb_idx].clone();
        let cmd = Command::motion(verb, ms, pct);
        for dialect in [Dialect::Short, Dialect::Verbose] {
            let line = dialect.encode(&cmd);
            prop_assert!(line.ends_with('\n'));
            prop_assert_eq!(line.chars().filter(|&c| c == '\n').count(), 1);
        }
    }

    /// The sensor parser never panics and never invents a distance that was
    /// not in the line.
    #[test]
    fn sensor_parser_total_on_arbitrary_input(payload in "[ -~]{0,64}") {
        let mut line = String::from("SENSOR,");
        line.push_str(&payload);
        let _ = SensorFields::parse(&line);
        let _ = SensorFields::parse(&payload);
    }

    /// Distances in a well-formed report always parse back exactly.
    #[test]
    fn sensor_distance_roundtrips(dist in 0u16..=9999, l in 0u8..=1, r in 0u8..=1) {
        let line = format!("SENSOR,D{dist},OL{l}OR{r}");
        let fields = SensorFields::parse(&line).expect("well-formed report");
        prop_assert_eq!(fields.distance_cm, Some(dist));
        prop_assert_eq!(fields.left_obstacle, Some(l == 1));
        prop_assert_eq!(fields.right_obstacle, Some(r == 1));
    }
}
