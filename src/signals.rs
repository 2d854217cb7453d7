// =============================================================================
// Signal Sources (C5)
// =============================================================================
//
// A SignalSource is a pure function of prior inputs: it reacts to closed
// candles and filter updates, and on request hands back at most one current
// Signal per timeframe. `KalmanDirectionalSource` is the only source the
// core ships; Fourier/Fibonacci/wavelet sources are optional collaborators
// outside this crate's scope (§4.5) and are consumed symmetrically by the
// Fusion Engine through the same trait.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::candle::Candle;
use crate::kalman::KalmanState;

/// A single emitted signal from one source for one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timeframe: String,
    pub direction: i8,
    pub strength: f64,
    pub confidence: f64,
    pub ts: i64,
}

impl Signal {
    pub fn new(timeframe: impl Into<String>, direction: i8, strength: f64, confidence: f64, ts: i64) -> Self {
        Self {
            timeframe: timeframe.into(),
            direction: direction.clamp(-1, 1),
            strength: strength.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            ts,
        }
    }
}

/// Capability consumed by the Fusion Engine: react to candle and filter
/// events, publish at most one Signal per timeframe per update cycle.
pub trait SignalSource {
    fn source_id(&self) -> &str;
    fn on_candle_closed(&mut self, timeframe: &str, candle: &Candle);
    fn on_kalman(&mut self, timeframe: &str, state: &KalmanState, ts: i64);
    fn current(&self, timeframe: &str) -> Option<Signal>;
    /// All timeframes with a currently published signal.
    fn all_current(&self) -> Vec<Signal>;
}

/// The mandatory core source: direction and strength derived straight from
/// a timeframe's Kalman state.
pub struct KalmanDirectionalSource {
    velocity_ref: f64,
    current: HashMap<String, Signal>,
}

impl KalmanDirectionalSource {
    pub fn new(velocity_ref: f64) -> Self {
        Self {
            velocity_ref: velocity_ref.max(f64::EPSILON),
            current: HashMap::new(),
        }
    }
}

impl SignalSource for KalmanDirectionalSource {
    fn source_id(&self) -> &str {
        "kalman_directional"
    }

    fn on_candle_closed(&mut self, _timeframe: &str, _candle: &Candle) {
        // This source reacts only to filter updates; closed candles drive
        // the Kalman Bank, which in turn calls `on_kalman`.
    }

    fn on_kalman(&mut self, timeframe: &str, state: &KalmanState, ts: i64) {
        let direction = state.direction();
        let strength = (state.velocity.abs() / self.velocity_ref).min(1.0);
        let signal = Signal::new(timeframe, direction, strength, state.confidence, ts);
        self.current.insert(timeframe.to_string(), signal);
    }

    fn current(&self, timeframe: &str) -> Option<Signal> {
        self.current.get(timeframe).cloned()
    }

    fn all_current(&self) -> Vec<Signal> {
        self.current.values().cloned().collect()
    }
}
