// =============================================================================
// Timeframe
// =============================================================================
//
// A labelled duration in whole milliseconds. One timeframe is designated
// *base*; every other configured timeframe must be an integer multiple of
// the base duration (enforced by `config.rs` at construction time, not
// here — this type only knows about a single duration).
// =============================================================================

use serde::{Deserialize, Serialize};

/// A single timeframe: a human label paired with its duration in
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timeframe {
    pub label: String,
    pub duration_ms: i64,
}

impl Timeframe {
    pub fn new(label: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            label: label.into(),
            duration_ms,
        }
    }

    /// The recognised built-in set: 1m, 5m, 15m, 30m, 1h.
    pub fn recognised_set() -> Vec<Timeframe> {
        vec![
            Timeframe::new("1m", 60_000),
            Timeframe::new("5m", 5 * 60_000),
            Timeframe::new("15m", 15 * 60_000),
            Timeframe::new("30m", 30 * 60_000),
            Timeframe::new("1h", 60 * 60_000),
        ]
    }

    /// The timeframe boundary containing timestamp `t`: `t - (t mod
    /// duration)`.
    pub fn boundary(&self, t: i64) -> i64 {
        boundary_for(t, self.duration_ms)
    }

    /// Duration in seconds, the canonical unit used by the Kalman state
    /// transition matrix (Δt).
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1_000.0
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Compute `t - (t mod duration)` for a raw duration in milliseconds.
///
/// Works for any non-negative `t` and positive `duration`. Timestamps in
/// this engine are always non-negative millisecond epoch values.
pub fn boundary_for(t: i64, duration_ms: i64) -> i64 {
    t - t.rem_euclid(duration_ms)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_on_exact_multiple() {
        assert_eq!(boundary_for(60_000, 60_000), 60_000);
    }

    #[test]
    fn boundary_mid_interval() {
        assert_eq!(boundary_for(65_432, 60_000), 60_000);
        assert_eq!(boundary_for(59_999, 60_000), 0);
    }

    #[test]
    fn boundary_zero() {
        assert_eq!(boundary_for(0, 60_000), 0);
    }

    #[test]
    fn recognised_set_has_five_entries_in_ascending_order() {
        let tfs = Timeframe::recognised_set();
        assert_eq!(tfs.len(), 5);
        for pair in tfs.windows(2) {
            assert!(pair[0].duration_ms < pair[1].duration_ms);
        }
    }

    #[test]
    fn display_shows_label() {
        let tf = Timeframe::new("5m", 300_000);
        assert_eq!(format!("{tf}"), "5m");
    }

    #[test]
    fn duration_secs_conversion() {
        let tf = Timeframe::new("1m", 60_000);
        assert!((tf.duration_secs() - 60.0).abs() < 1e-9);
    }
}
