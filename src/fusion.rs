// =============================================================================
// Fusion Engine (C6)
// =============================================================================
//
// Consumes every Signal published this cycle and produces exactly one
// FusedDecision plus the Trigger it gates. Weighting follows the teacher's
// regime-aware `WeightedScorer` shape (signals/weighted_score.rs): a base
// weight per signal, refined here by a timeframe-rank and constructive-
// interference modulation step the teacher's scorer does not need because
// it only ever scores one timeframe at a time.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::kalman::Regime;
use crate::signals::Signal;

/// Ascending rank per timeframe (1 = shortest). Fixed, configurable.
pub type TimeframeRanks = HashMap<String, u32>;

/// `alpha_regime` boost/penalty per regime, applied to base weights.
pub type AlphaRegimeMap = HashMap<Regime, f64>;

/// Regime-specific stop/target parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskParams {
    pub r_pct: f64,
    pub multiple: f64,
}

/// Parameters consumed by [`FusionEngine::fuse`]. Construction-time
/// validation lives in `config.rs`; this type trusts its inputs.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub tf_ranks: TimeframeRanks,
    pub alpha_regime: AlphaRegimeMap,
    pub beta: f64,
    pub gamma: f64,
    pub n_ref: f64,
    pub tau_enter: f64,
    pub mu_enter: f64,
    pub global_risk_scalar: f64,
    pub risk_by_regime: HashMap<Regime, RiskParams>,
}

/// One fused cross-timeframe decision for one update cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedDecision {
    pub direction: i8,
    pub magnitude: f64,
    pub confidence: f64,
    pub coherence: f64,
    pub regime: Regime,
    pub ts: i64,
    pub contributing_sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerAction {
    EnterLong,
    EnterShort,
    Exit,
    Hold,
}

/// A downstream-facing action directive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Trigger {
    pub action: TriggerAction,
    pub price_ref: f64,
    pub stop_level: f64,
    pub target_level: f64,
    pub size_fraction: f64,
}

/// Current open-position state, tracked by the Fusion Engine so it can gate
/// exits before opposite entries (§4.6 step 5, §8 scenario 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Flat,
    Long,
    Short,
}

/// Majority regime across active timeframes, ties broken by the
/// lexicographically smallest timeframe label for determinism.
fn dominant_regime(regimes: &HashMap<String, Regime>) -> Regime {
    let mut labels: Vec<&String> = regimes.keys().collect();
    labels.sort();
    let mut counts: HashMap<Regime, usize> = HashMap::new();
    for label in &labels {
        *counts.entry(regimes[*label]).or_insert(0) += 1;
    }
    labels
        .into_iter()
        .map(|l| regimes[l])
        .max_by_key(|r| counts[r])
        .unwrap_or(Regime::Stable)
}

pub struct FusionEngine {
    config: FusionConfig,
    position: Position,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            position: Position::Flat,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    fn rank(&self, timeframe: &str) -> u32 {
        self.config.tf_ranks.get(timeframe).copied().unwrap_or(1)
    }

    /// Weighted mean of `direction * strength * confidence` across all
    /// signals at a single higher timeframe, clipped to [-1, 1].
    fn agg_direction(signals: &[&Signal]) -> f64 {
        if signals.is_empty() {
            return 0.0;
        }
        let sum: f64 = signals
            .iter()
            .map(|s| s.direction as f64 * s.strength * s.confidence)
            .sum();
        (sum / signals.len() as f64).clamp(-1.0, 1.0)
    }

    /// Fuse every signal published this cycle into one decision and the
    /// trigger it gates.
    pub fn fuse(
        &mut self,
        signals: &[Signal],
        regimes: &HashMap<String, Regime>,
        coherence: f64,
        price_ref: f64,
        ts: i64,
    ) -> (FusedDecision, Trigger) {
        let regime = dominant_regime(regimes);

        if signals.is_empty() {
            let decision = FusedDecision {
                direction: 0,
                magnitude: 0.0,
                confidence: 0.0,
                coherence,
                regime,
                ts,
                contributing_sources: Vec::new(),
            };
            let trigger = self.gate(&decision, price_ref);
            return (decision, trigger);
        }

        let alpha = self.config.alpha_regime.get(&regime).copied().unwrap_or(0.0);

        // Step 1: base weights.
        let mut weights: Vec<f64> = signals
            .iter()
            .map(|s| s.confidence * (1.0 + alpha * self.rank(&s.timeframe) as f64))
            .collect();

        // Step 2: constructive-interference modulation from strictly higher
        // timeframes.
        for (i, s) in signals.iter().enumerate() {
            let own_rank = self.rank(&s.timeframe);
            let mut modulation = 1.0;
            let mut higher_ranks: Vec<u32> = signals
                .iter()
                .map(|o| self.rank(&o.timeframe))
                .filter(|r| *r > own_rank)
                .collect();
            higher_ranks.sort_unstable();
            higher_ranks.dedup();

            for hi_rank in higher_ranks {
                let hi_signals: Vec<&Signal> = signals
                    .iter()
                    .filter(|o| self.rank(&o.timeframe) == hi_rank)
                    .collect();
                let agg = Self::agg_direction(&hi_signals);
                let tf_distance = (hi_rank - own_rank) as f64;
                modulation *= 1.0 + self.config.beta / (1.0 + self.config.gamma * tf_distance) * agg.abs();
            }

            weights[i] *= modulation;
        }

        // Step 3: weighted aggregation.
        let total_weight: f64 = weights.iter().sum();
        let raw: f64 = signals
            .iter()
            .zip(weights.iter())
            .map(|(s, w)| w * s.direction as f64 * s.strength)
            .sum();

        let direction = if raw > 0.0 {
            1
        } else if raw < 0.0 {
            -1
        } else {
            0
        };
        let magnitude = if total_weight.abs() > f64::EPSILON {
            (raw.abs() / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Step 4: confidence.
        let mean_conf = if total_weight.abs() > f64::EPSILON {
            signals
                .iter()
                .zip(weights.iter())
                .map(|(s, w)| w * s.confidence)
                .sum::<f64>()
                / total_weight
        } else {
            0.0
        };
        let sample_factor = (signals.len() as f64 / self.config.n_ref).min(1.0);
        let fused_confidence = (mean_conf * coherence.max(0.0).sqrt() * sample_factor).clamp(0.0, 1.0);

        let decision = FusedDecision {
            direction,
            magnitude,
            confidence: fused_confidence,
            coherence,
            regime,
            ts,
            contributing_sources: signals.iter().map(|s| s.timeframe.clone()).collect(),
        };

        let trigger = self.gate(&decision, price_ref);
        (decision, trigger)
    }

    /// Step 5: trigger generation, threshold-gated and position-aware.
    fn gate(&mut self, decision: &FusedDecision, price_ref: f64) -> Trigger {
        let below_threshold =
            decision.confidence < self.config.tau_enter || decision.magnitude < self.config.mu_enter;

        let action = if below_threshold || decision.direction == 0 {
            TriggerAction::Hold
        } else {
            let opposite = matches!(
                (self.position, decision.direction),
                (Position::Long, -1) | (Position::Short, 1)
            );
            if opposite {
                TriggerAction::Exit
            } else if self.position == Position::Flat {
                if decision.direction == 1 {
                    TriggerAction::EnterLong
                } else {
                    TriggerAction::EnterShort
                }
            } else {
                TriggerAction::Hold
            }
        };

        match action {
            TriggerAction::EnterLong => self.position = Position::Long,
            TriggerAction::EnterShort => self.position = Position::Short,
            TriggerAction::Exit => self.position = Position::Flat,
            TriggerAction::Hold => {}
        }

        let size_fraction = if matches!(action, TriggerAction::EnterLong | TriggerAction::EnterShort) {
            (decision.magnitude * decision.confidence).clamp(0.0, 1.0) * self.config.global_risk_scalar
        } else {
            0.0
        };

        let risk = self
            .config
            .risk_by_regime
            .get(&decision.regime)
            .copied()
            .unwrap_or(RiskParams { r_pct: 0.005, multiple: 2.5 });

        let (stop_level, target_level) = match action {
            TriggerAction::EnterLong => (
                price_ref * (1.0 - risk.r_pct),
                price_ref * (1.0 + risk.r_pct * risk.multiple),
            ),
            TriggerAction::EnterShort => (
                price_ref * (1.0 + risk.r_pct),
                price_ref * (1.0 - risk.r_pct * risk.multiple),
            ),
            _ => (price_ref, price_ref),
        };

        Trigger {
            action,
            price_ref,
            stop_level,
            target_level,
            size_fraction: size_fraction.clamp(0.0, 1.0),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> FusionConfig {
        let mut tf_ranks = HashMap::new();
        tf_ranks.insert("1m".to_string(), 1);
        tf_ranks.insert("5m".to_string(), 2);

        let mut alpha_regime = HashMap::new();
        alpha_regime.insert(Regime::Trending, 0.2);
        alpha_regime.insert(Regime::Volatile, -0.2);
        alpha_regime.insert(Regime::Stable, 0.0);
        alpha_regime.insert(Regime::MeanReverting, 0.0);

        let mut risk_by_regime = HashMap::new();
        risk_by_regime.insert(
            Regime::Trending,
            RiskParams {
                r_pct: 0.005,
                multiple: 2.5,
            },
        );
        risk_by_regime.insert(
            Regime::Volatile,
            RiskParams {
                r_pct: 0.003,
                multiple: 2.5,
            },
        );

        FusionConfig {
            tf_ranks,
            alpha_regime,
            beta: 0.1,
            gamma: 0.5,
            n_ref: 5.0,
            tau_enter: 0.3,
            mu_enter: 0.2,
            global_risk_scalar: 1.0,
            risk_by_regime,
        }
    }

    fn signal(tf: &str, direction: i8, strength: f64, confidence: f64) -> Signal {
        Signal::new(tf, direction, strength, confidence, 1_000)
    }

    fn regimes(r: Regime) -> HashMap<String, Regime> {
        let mut m = HashMap::new();
        m.insert("1m".to_string(), r);
        m.insert("5m".to_string(), r);
        m
    }

    #[test]
    fn no_signals_yields_hold() {
        let mut engine = FusionEngine::new(base_config());
        let (decision, trigger) = engine.fuse(&[], &HashMap::new(), 0.0, 100.0, 1_000);
        assert_eq!(decision.direction, 0);
        assert_eq!(trigger.action, TriggerAction::Hold);
    }

    #[test]
    fn strong_agreeing_signals_enter_long() {
        let mut engine = FusionEngine::new(base_config());
        let signals = vec![
            signal("1m", 1, 0.9, 0.9),
            signal("5m", 1, 0.9, 0.9),
        ];
        let (decision, trigger) = engine.fuse(&signals, &regimes(Regime::Trending), 0.95, 100.0, 1_000);
        assert_eq!(decision.direction, 1);
        assert_eq!(trigger.action, TriggerAction::EnterLong);
        assert!(trigger.stop_level < 100.0);
        assert!(trigger.target_level > 100.0);
        assert_eq!(engine.position(), Position::Long);
    }

    #[test]
    fn exit_precedes_opposite_entry() {
        let mut engine = FusionEngine::new(base_config());
        let longs = vec![signal("1m", 1, 0.9, 0.9), signal("5m", 1, 0.9, 0.9)];
        let (_, t1) = engine.fuse(&longs, &regimes(Regime::Trending), 0.95, 100.0, 1_000);
        assert_eq!(t1.action, TriggerAction::EnterLong);

        let shorts = vec![signal("1m", -1, 0.9, 0.9), signal("5m", -1, 0.9, 0.9)];
        let (_, t2) = engine.fuse(&shorts, &regimes(Regime::Trending), 0.95, 90.0, 2_000);
        assert_eq!(t2.action, TriggerAction::Exit);
        assert_eq!(engine.position(), Position::Flat);

        let (_, t3) = engine.fuse(&shorts, &regimes(Regime::Trending), 0.95, 90.0, 3_000);
        assert_eq!(t3.action, TriggerAction::EnterShort);
    }

    #[test]
    fn below_threshold_confidence_holds() {
        let mut engine = FusionEngine::new(base_config());
        let weak = vec![signal("1m", 1, 0.1, 0.1), signal("5m", 1, 0.1, 0.1)];
        let (decision, trigger) = engine.fuse(&weak, &regimes(Regime::Stable), 0.3, 100.0, 1_000);
        assert!(decision.confidence < 0.3 || decision.magnitude < 0.2);
        assert_eq!(trigger.action, TriggerAction::Hold);
    }

    #[test]
    fn fused_outputs_stay_within_unit_range() {
        let mut engine = FusionEngine::new(base_config());
        let signals = vec![signal("1m", 1, 1.0, 1.0), signal("5m", -1, 1.0, 1.0)];
        let (decision, _) = engine.fuse(&signals, &regimes(Regime::Trending), 1.0, 100.0, 1_000);
        assert!((0.0..=1.0).contains(&decision.magnitude));
        assert!((0.0..=1.0).contains(&decision.confidence));
        assert!((0.0..=1.0).contains(&decision.coherence));
        assert!((-1..=1).contains(&decision.direction));
    }

    #[test]
    fn higher_timeframe_agreement_boosts_lower_timeframe_weight() {
        let mut engine = FusionEngine::new(base_config());
        let agreeing = vec![signal("1m", 1, 0.5, 0.8), signal("5m", 1, 0.9, 0.9)];
        let (agree_decision, _) = engine.fuse(&agreeing, &regimes(Regime::Trending), 0.9, 100.0, 1_000);

        let mut engine2 = FusionEngine::new(base_config());
        let disagreeing = vec![signal("1m", 1, 0.5, 0.8), signal("5m", -1, 0.9, 0.9)];
        let (disagree_decision, _) = engine2.fuse(&disagreeing, &regimes(Regime::Trending), 0.9, 100.0, 1_000);

        assert!(agree_decision.magnitude >= disagree_decision.magnitude);
    }
}
