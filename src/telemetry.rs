//! Last-known sensor readings from the motor unit.
//!
//! The cache is written by the scheduler's sensor polls (and by unsolicited
//! pushes) and read by the status API and the behavior engine. Merging is
//! field-by-field, not an atomic replace: the two reply fieldsets differ by
//! dialect, so a reply that omits a field must not zero the value the other
//! fieldset populated. A malformed field is simply not merged.

/// Point-in-time view of the cached readings. Zero-valued before the first
/// successful poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Last ultrasonic distance reading (centimetres; 0 = no echo yet).
    pub distance_cm: u16,
    /// Left IR sensor sees an obstacle.
    pub left_obstacle: bool,
    /// Right IR sensor sees an obstacle.
    pub right_obstacle: bool,
    /// When any field last merged (bridge uptime, milliseconds).
    pub captured_at_ms: u64,
}

/// Fields recovered from one reply line. `None` = absent or malformed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorFields {
    pub distance_cm: Option<u16>,
    pub left_obstacle: Option<bool>,
    pub right_obstacle: Option<bool>,
}

impl SensorFields {
    /// Parse a `SENSOR,...` reply line in either dialect fieldset:
    ///
    /// - `SENSOR,D<dist>,OL<0|1>OR<0|1>,TL<0|1>TR<0|1>` (full firmware)
    /// - `SENSOR,D<dist>,L<0|1>R<0|1>` (short firmware)
    ///
    /// `1` means obstacle present. Returns `None` for lines that are not
    /// sensor reports at all; tokens that fail to parse yield absent fields.
    /// The tracking pair (`TL`/`TR`) is line-follower input the bridge does
    /// not consume and is skipped.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.trim().split(',');
        if tokens.next()? != "SENSOR" {
            return None;
        }

        let mut fields = Self::default();
        for token in tokens {
            if let Some(digits) = token.strip_prefix('D') {
                fields.distance_cm = digits.parse().ok();
            } else if token.starts_with("OL") {
                if let Some((l, r)) = parse_flag_pair(token, "OL", "OR") {
                    fields.left_obstacle = Some(l);
                    fields.right_obstacle = Some(r);
                }
            } else if token.starts_with("TL") {
                // Tracking bits: ignored.
            } else if token.starts_with('L') {
                if let Some((l, r)) = parse_flag_pair(token, "L", "R") {
                    fields.left_obstacle = Some(l);
                    fields.right_obstacle = Some(r);
                }
            }
        }
        Some(fields)
    }

    /// True when nothing in the line parsed.
    pub fn is_empty(&self) -> bool {
        self.distance_cm.is_none()
            && self.left_obstacle.is_none()
            && self.right_obstacle.is_none()
    }
}

/// Parse `"<left_tag><0|1><right_tag><0|1>"` into two booleans.
fn parse_flag_pair(token: &str, left_tag: &str, right_tag: &str) -> Option<(bool, bool)> {
    let rest = token.strip_prefix(left_tag)?;
    let left = parse_flag(rest.chars().next()?)?;
    let rest = rest[1..].strip_prefix(right_tag)?;
    let right = parse_flag(rest.chars().next()?)?;
    Some((left, right))
}

fn parse_flag(c: char) -> Option<bool> {
    match c {
        '0' => Some(false),
        '1' => Some(true),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct TelemetryCache {
    snapshot: TelemetrySnapshot,
}

impl TelemetryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the present fields into the snapshot. Absent fields keep their
    /// prior value; `captured_at_ms` advances only when something merged.
    pub fn merge(&mut self, fields: &SensorFields, now_ms: u64) {
        if fields.is_empty() {
            return;
        }
        if let Some(d) = fields.distance_cm {
            self.snapshot.distance_cm = d;
        }
        if let Some(l) = fields.left_obstacle {
            self.snapshot.left_obstacle = l;
        }
        if let Some(r) = fields.right_obstacle {
            self.snapshot.right_obstacle = r;
        }
        self.snapshot.captured_at_ms = now_ms;
    }

    /// Non-blocking read of the latest values.
    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_fieldset() {
        let f = SensorFields::parse("SENSOR,D123,OL0OR1,TL0TR0").unwrap();
        assert_eq!(f.distance_cm, Some(123));
        assert_eq!(f.left_obstacle, Some(false));
        assert_eq!(f.right_obstacle, Some(true));
    }

    #[test]
    fn parses_short_fieldset() {
        let f = SensorFields::parse("SENSOR,D42,L1R0").unwrap();
        assert_eq!(f.distance_cm, Some(42));
        assert_eq!(f.left_obstacle, Some(true));
        assert_eq!(f.right_obstacle, Some(false));
    }

    #[test]
    fn non_sensor_line_is_not_a_report() {
        assert!(SensorFields::parse("PONG").is_none());
        assert!(SensorFields::parse("OK,F,600").is_none());
    }

    #[test]
    fn garbage_payload_yields_no_fields() {
        let f = SensorFields::parse("SENSOR,garbage").unwrap();
        assert!(f.is_empty());
    }

    #[test]
    fn malformed_distance_leaves_field_absent() {
        let f = SensorFields::parse("SENSOR,Dxx,OL1OR1").unwrap();
        assert_eq!(f.distance_cm, None);
        assert_eq!(f.left_obstacle, Some(true));
    }

    #[test]
    fn merge_updates_only_present_fields() {
        let mut cache = TelemetryCache::new();
        cache.merge(&SensorFields::parse("SENSOR,D100,OL1OR0").unwrap(), 1_000);
        assert_eq!(cache.snapshot().distance_cm, 100);
        assert!(cache.snapshot().left_obstacle);

        // Distance-only update: obstacle flags keep their prior values.
        cache.merge(&SensorFields::parse("SENSOR,D55").unwrap(), 2_000);
        let snap = cache.snapshot();
        assert_eq!(snap.distance_cm, 55);
        assert!(snap.left_obstacle);
        assert!(!snap.right_obstacle);
        assert_eq!(snap.captured_at_ms, 2_000);
    }

    #[test]
    fn garbage_merge_leaves_prior_snapshot_untouched() {
        let mut cache = TelemetryCache::new();
        cache.merge(&SensorFields::parse("SENSOR,D100,OL0OR0").unwrap(), 1_000);
        cache.merge(&SensorFields::parse("SENSOR,garbage").unwrap(), 2_000);
        let snap = cache.snapshot();
        assert_eq!(snap.distance_cm, 100);
        assert_eq!(snap.captured_at_ms, 1_000);
    }

    #[test]
    fn zero_valued_before_first_poll() {
        let cache = TelemetryCache::new();
        assert_eq!(*cache.snapshot(), TelemetrySnapshot::default());
    }
}
