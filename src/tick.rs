// =============================================================================
// Tick Validator (C1)
// =============================================================================
//
// Pure transformation, no side effects beyond the caller's own counters: a
// raw trade is either a validated `Tick` or a `TickRejection`. Acceptance
// requires a finite, positive price, a non-negative volume, and a timestamp
// that does not regress behind the last accepted tick for this validator.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::errors::TickRejection;

/// A single observed trade event, immutable once constructed.
///
/// Ownership: a `Tick` belongs to the pipeline for the duration of exactly
/// one update cycle and is not retained past it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Monotonically increasing millisecond timestamp.
    pub ts: i64,
    /// Trade price, always > 0 and finite.
    pub price: f64,
    /// Trade volume, always >= 0 and finite.
    pub volume: f64,
}

impl Tick {
    /// Construct a tick without validation. Used by collaborators that have
    /// already guaranteed finiteness (e.g. a parsed exchange payload still
    /// has to pass through [`TickValidator::validate`] before entering the
    /// pipeline).
    pub fn new(ts: i64, price: f64, volume: f64) -> Self {
        Self { ts, price, volume }
    }
}

/// Stateful validator enforcing monotone timestamps for one tick stream.
///
/// One instance is owned per pipeline (per instrument). Rejections are
/// counted but never propagated downstream.
#[derive(Debug, Clone)]
pub struct TickValidator {
    last_accepted_ts: Option<i64>,
    accepted_count: u64,
    rejected_count: u64,
}

impl TickValidator {
    pub fn new() -> Self {
        Self {
            last_accepted_ts: None,
            accepted_count: 0,
            rejected_count: 0,
        }
    }

    /// Validate a raw `(ts, price, volume)` triple.
    ///
    /// On success, advances the monotonicity watermark and returns the
    /// validated [`Tick`]. On failure, the watermark is left untouched and
    /// the rejection kind is returned so the caller can log/count it.
    pub fn validate(&mut self, ts: i64, price: f64, volume: f64) -> Result<Tick, TickRejection> {
        if !price.is_finite() || !volume.is_finite() {
            self.rejected_count += 1;
            return Err(TickRejection::NonFinite);
        }
        if price <= 0.0 {
            self.rejected_count += 1;
            return Err(TickRejection::NonPositivePrice);
        }
        if volume < 0.0 {
            self.rejected_count += 1;
            return Err(TickRejection::NegativeVolume);
        }
        if let Some(last) = self.last_accepted_ts {
            if ts < last {
                self.rejected_count += 1;
                return Err(TickRejection::OutOfOrder);
            }
        }

        self.last_accepted_ts = Some(ts);
        self.accepted_count += 1;
        Ok(Tick::new(ts, price, volume))
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted_count
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    pub fn last_accepted_ts(&self) -> Option<i64> {
        self.last_accepted_ts
    }
}

impl Default for TickValidator {
    fn default() -> Self {
        Self::new()
    }
}
