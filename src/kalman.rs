// =============================================================================
// Kalman Bank (C4)
// =============================================================================
//
// One constant-acceleration Kalman filter per active timeframe. State vector
// x = (level, velocity, acceleration); all matrices are fixed 3x3, so every
// `update` is O(1) regardless of history length. Numeric defensiveness
// mirrors the teacher's indicator style: every derived quantity is checked
// for finiteness before it is trusted.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-9;

type Mat3 = [[f64; 3]; 3];
type Vec3 = [f64; 3];

fn identity3() -> Mat3 {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
}

fn scaled_identity3(s: f64) -> Mat3 {
    [[s, 0.0, 0.0], [0.0, s, 0.0], [0.0, 0.0, s]]
}

fn state_transition(dt: f64) -> Mat3 {
    [
        [1.0, dt, dt * dt / 2.0],
        [0.0, 1.0, dt],
        [0.0, 0.0, 1.0],
    ]
}

fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn transpose(a: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = a[j][i];
        }
    }
    out
}

fn mat_add(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = a[i][j] + b[i][j];
        }
    }
    out
}

fn mat_vec_mul(a: &Mat3, v: &Vec3) -> Vec3 {
    let mut out = [0.0; 3];
    for i in 0..3 {
        out[i] = (0..3).map(|k| a[i][k] * v[k]).sum();
    }
    out
}

fn symmetrize(p: &mut Mat3) {
    for i in 0..3 {
        for j in 0..3 {
            if i != j {
                let avg = (p[i][j] + p[j][i]) / 2.0;
                p[i][j] = avg;
                p[j][i] = avg;
            }
        }
    }
}

fn diag_positive_finite(p: &Mat3) -> bool {
    (0..3).all(|i| p[i][i].is_finite() && p[i][i] > 0.0)
}

fn all_finite(p: &Mat3) -> bool {
    p.iter().all(|row| row.iter().all(|v| v.is_finite()))
}

fn trace(p: &Mat3) -> f64 {
    p[0][0] + p[1][1] + p[2][2]
}

fn mean(values: &VecDeque<f64>) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn population_stdev(values: &VecDeque<f64>) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Categorical label summarising a timeframe's current behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Trending,
    Volatile,
    Stable,
    MeanReverting,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Regime::Trending => "trending",
            Regime::Volatile => "volatile",
            Regime::Stable => "stable",
            Regime::MeanReverting => "mean_reverting",
        };
        write!(f, "{s}")
    }
}

/// Fixed classification thresholds, read from configuration with documented
/// defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeThresholds {
    /// `|velocity|` at or above this marks the trending candidate.
    pub trend_velocity: f64,
    /// Adaptive noise scale at or above this marks volatile.
    pub volatile_scale: f64,
    /// Adaptive noise scale at or below this (with low velocity) marks stable.
    pub stable_scale: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            trend_velocity: 0.05,
            volatile_scale: 1.5,
            stable_scale: 0.4,
        }
    }
}

/// Tunable parameters for one filter instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KalmanConfig {
    pub q0: f64,
    pub r: f64,
    pub p_init: f64,
    pub warmup_min: u64,
    pub volatility_window_len: usize,
    pub innovation_window_len: usize,
    pub scale_min: f64,
    pub scale_max: f64,
    pub regime_thresholds: RegimeThresholds,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            q0: 1e-4,
            r: 1e-2,
            p_init: 1.0,
            warmup_min: 20,
            volatility_window_len: 20,
            innovation_window_len: 20,
            scale_min: 0.1,
            scale_max: 10.0,
            regime_thresholds: RegimeThresholds::default(),
        }
    }
}

/// The public, observable state of one filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalmanState {
    pub level: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub scale: f64,
    pub regime: Regime,
    pub confidence: f64,
    pub n_updates: u64,
}

impl KalmanState {
    pub fn direction(&self) -> i8 {
        if self.velocity > EPS {
            1
        } else if self.velocity < -EPS {
            -1
        } else {
            0
        }
    }
}

/// Result of one `update` or `predict_gap` call.
#[derive(Debug, Clone)]
pub struct KalmanUpdateOutcome {
    pub reset: bool,
    pub state: KalmanState,
}

/// One constant-acceleration adaptive Kalman filter, owned by a single
/// timeframe slot inside a [`KalmanBank`].
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    config: KalmanConfig,
    x: Vec3,
    p: Mat3,
    last_valid_x: Vec3,
    scale: f64,
    regime: Regime,
    confidence: f64,
    n_updates: u64,
    volatility_window: VecDeque<f64>,
    innovation_window: VecDeque<f64>,
}

impl KalmanFilter {
    pub fn new(config: KalmanConfig) -> Self {
        let p = scaled_identity3(config.p_init);
        Self {
            x: [0.0; 3],
            p,
            last_valid_x: [0.0; 3],
            scale: 1.0,
            regime: Regime::Stable,
            confidence: 0.0,
            n_updates: 0,
            volatility_window: VecDeque::with_capacity(config.volatility_window_len),
            innovation_window: VecDeque::with_capacity(config.innovation_window_len),
            config,
        }
    }

    fn process_noise(&self) -> Mat3 {
        scaled_identity3(self.config.q0 * self.scale)
    }

    fn predict_once(&mut self, dt: f64) {
        let f = state_transition(dt);
        let x_pred = mat_vec_mul(&f, &self.x);
        let ft = transpose(&f);
        let p_pred = mat_add(&mat_mul(&mat_mul(&f, &self.p), &ft), &self.process_noise());
        self.x = x_pred;
        self.p = p_pred;
    }

    /// Advance the filter through `missing_steps` boundaries with no
    /// measurement — the Kalman Bank's response to a `CandleGap` (§7).
    /// Covariance inflates through `Q` at each step but no gain is applied.
    pub fn predict_gap(&mut self, dt: f64, missing_steps: u32) {
        for _ in 0..missing_steps.max(1) {
            self.predict_once(dt);
        }
    }

    fn push_bounded(window: &mut VecDeque<f64>, cap: usize, value: f64) {
        if window.len() >= cap.max(1) {
            window.pop_front();
        }
        window.push_back(value);
    }

    fn adapt_noise(&mut self, z: f64) {
        Self::push_bounded(&mut self.volatility_window, self.config.volatility_window_len, z);
        let sigma = population_stdev(&self.volatility_window);
        let mean_abs = mean(&self.volatility_window).abs();
        let raw_scale = sigma / (mean_abs + EPS);
        self.scale = raw_scale.clamp(self.config.scale_min, self.config.scale_max);
    }

    fn classify_regime(&mut self) {
        let t = &self.config.regime_thresholds;
        self.regime = if self.scale >= t.volatile_scale {
            Regime::Volatile
        } else if self.x[1].abs() >= t.trend_velocity {
            Regime::Trending
        } else if self.scale <= t.stable_scale {
            Regime::Stable
        } else {
            Regime::MeanReverting
        };
    }

    fn compute_confidence(&mut self, z: f64, innovation: f64) {
        Self::push_bounded(&mut self.innovation_window, self.config.innovation_window_len, innovation.abs());
        let mean_abs_innovation = mean(&self.innovation_window);
        let conf_innovation = (1.0 - mean_abs_innovation / (z.abs() + EPS)).clamp(0.0, 1.0);
        let conf_cov = 1.0 / (1.0 + trace(&self.p).max(0.0));
        let warm = (self.n_updates as f64 / self.config.warmup_min.max(1) as f64).min(1.0);
        self.confidence = (conf_innovation * conf_cov * warm).clamp(0.0, 1.0);
    }

    /// Run predict/gain/update/adapt/classify/confidence for one closed
    /// candle's close price.
    pub fn update(&mut self, z: f64, dt: f64) -> KalmanUpdateOutcome {
        self.predict_once(dt);

        let s = self.p[0][0] + self.config.r;
        let k = [self.p[0][0] / s, self.p[1][0] / s, self.p[2][0] / s];
        let innovation = z - self.x[0];

        let mut x = self.x;
        for i in 0..3 {
            x[i] += k[i] * innovation;
        }

        let mut new_p = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                new_p[i][j] = self.p[i][j] - k[i] * self.p[0][j];
            }
        }
        symmetrize(&mut new_p);

        self.x = x;
        self.p = new_p;

        let mut reset = false;
        if !diag_positive_finite(&self.p) || !all_finite(&self.p) {
            self.p = scaled_identity3(self.config.p_init);
            reset = true;
        }

        self.adapt_noise(z);
        self.classify_regime();

        if !self.x.iter().all(|v| v.is_finite()) {
            self.x = self.last_valid_x;
            self.p = scaled_identity3(self.config.p_init);
            self.n_updates = 0;
            reset = true;
        } else {
            self.last_valid_x = self.x;
        }

        self.n_updates += 1;
        self.compute_confidence(z, innovation);
        if reset {
            self.confidence = 0.0;
        }

        KalmanUpdateOutcome {
            reset,
            state: self.state(),
        }
    }

    pub fn state(&self) -> KalmanState {
        KalmanState {
            level: self.x[0],
            velocity: self.x[1],
            acceleration: self.x[2],
            scale: self.scale,
            regime: self.regime,
            confidence: self.confidence,
            n_updates: self.n_updates,
        }
    }

    pub fn direction(&self) -> i8 {
        self.state().direction()
    }
}

/// One filter per active timeframe, keyed by timeframe label.
#[derive(Debug, Clone, Default)]
pub struct KalmanBank {
    filters: HashMap<String, KalmanFilter>,
}

impl KalmanBank {
    pub fn new() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    pub fn register(&mut self, label: impl Into<String>, config: KalmanConfig) {
        self.filters.insert(label.into(), KalmanFilter::new(config));
    }

    pub fn update(&mut self, label: &str, close: f64, dt_secs: f64) -> Option<KalmanUpdateOutcome> {
        self.filters.get_mut(label).map(|f| f.update(close, dt_secs))
    }

    pub fn predict_gap(&mut self, label: &str, dt_secs: f64, missing_steps: u32) {
        if let Some(f) = self.filters.get_mut(label) {
            f.predict_gap(dt_secs, missing_steps);
        }
    }

    pub fn state(&self, label: &str) -> Option<KalmanState> {
        self.filters.get(label).map(|f| f.state())
    }

    pub fn labels(&self) -> impl Iterator<Item = &String> {
        self.filters.keys()
    }

    /// `coherence = (fraction sharing the dominant sign) x (mean confidence)`
    /// over active filters whose direction is non-zero (§4.4).
    pub fn coherence(&self) -> f64 {
        let active: Vec<KalmanState> = self
            .filters
            .values()
            .map(|f| f.state())
            .filter(|s| s.direction() != 0)
            .collect();
        if active.is_empty() {
            return 0.0;
        }
        let positives = active.iter().filter(|s| s.direction() == 1).count();
        let negatives = active.len() - positives;
        let dominant_count = positives.max(negatives);
        let fraction = dominant_count as f64 / active.len() as f64;
        let mean_confidence = active.iter().map(|s| s.confidence).sum::<f64>() / active.len() as f64;
        (fraction * mean_confidence).clamp(0.0, 1.0)
    }
}
