// =============================================================================
// Pipeline Configuration — validated at construction, hot-reloadable
// =============================================================================
//
// Persistence follows the teacher's atomic tmp + rename pattern
// (`runtime_config.rs`): every field carries a serde default so a config
// file missing newer fields still loads. Unlike the teacher's config,
// `PipelineConfig` additionally validates itself at construction time —
// invalid configuration is a `ConfigError`, fatal before the pipeline ever
// starts (§7).
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::ConfigError;
use crate::fusion::RiskParams;
use crate::kalman::{KalmanConfig, RegimeThresholds};
use crate::kalman::Regime;
use crate::timeframe::Timeframe;

fn default_timeframes() -> Vec<Timeframe> {
    vec![
        Timeframe::new("1m", 60_000),
        Timeframe::new("5m", 5 * 60_000),
        Timeframe::new("15m", 15 * 60_000),
    ]
}

fn default_ring_capacity() -> usize {
    500
}

fn default_velocity_ref() -> f64 {
    0.05
}

fn default_tf_ranks() -> HashMap<String, u32> {
    let mut m = HashMap::new();
    m.insert("1m".to_string(), 1);
    m.insert("5m".to_string(), 2);
    m.insert("15m".to_string(), 3);
    m.insert("30m".to_string(), 4);
    m.insert("1h".to_string(), 5);
    m
}

fn default_alpha_regime() -> HashMap<Regime, f64> {
    let mut m = HashMap::new();
    m.insert(Regime::Trending, 0.2);
    m.insert(Regime::Volatile, -0.2);
    m.insert(Regime::Stable, 0.0);
    m.insert(Regime::MeanReverting, 0.0);
    m
}

fn default_risk_by_regime() -> HashMap<Regime, RiskParams> {
    let mut m = HashMap::new();
    m.insert(
        Regime::Trending,
        RiskParams {
            r_pct: 0.005,
            multiple: 2.5,
        },
    );
    m.insert(
        Regime::Volatile,
        RiskParams {
            r_pct: 0.003,
            multiple: 2.5,
        },
    );
    m.insert(
        Regime::Stable,
        RiskParams {
            r_pct: 0.005,
            multiple: 2.5,
        },
    );
    m.insert(
        Regime::MeanReverting,
        RiskParams {
            r_pct: 0.004,
            multiple: 2.0,
        },
    );
    m
}

/// Fusion-specific tunables, mirrored from `fusion::FusionConfig` but kept
/// serde-friendly (no `HashMap<Regime, _>` keys at the JSON boundary — those
/// are built from the plain maps below at construction time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionSettings {
    #[serde(default = "default_tf_ranks")]
    pub tf_ranks: HashMap<String, u32>,
    #[serde(default)]
    pub beta: f64,
    #[serde(default)]
    pub gamma: f64,
    #[serde(default = "default_n_ref")]
    pub n_ref: f64,
    #[serde(default = "default_tau_enter")]
    pub tau_enter: f64,
    #[serde(default = "default_mu_enter")]
    pub mu_enter: f64,
    #[serde(default = "default_global_risk_scalar")]
    pub global_risk_scalar: f64,
}

fn default_n_ref() -> f64 {
    5.0
}
fn default_tau_enter() -> f64 {
    0.35
}
fn default_mu_enter() -> f64 {
    0.15
}
fn default_global_risk_scalar() -> f64 {
    1.0
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            tf_ranks: default_tf_ranks(),
            beta: 0.1,
            gamma: 0.5,
            n_ref: default_n_ref(),
            tau_enter: default_tau_enter(),
            mu_enter: default_mu_enter(),
            global_risk_scalar: default_global_risk_scalar(),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,

    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,

    #[serde(default)]
    pub kalman: KalmanConfig,

    #[serde(default = "default_velocity_ref")]
    pub velocity_ref: f64,

    #[serde(default)]
    pub fusion: FusionSettings,

    #[serde(default = "default_alpha_regime")]
    pub alpha_regime: HashMap<Regime, f64>,

    #[serde(default = "default_risk_by_regime")]
    pub risk_by_regime: HashMap<Regime, RiskParams>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeframes: default_timeframes(),
            ring_capacity: default_ring_capacity(),
            kalman: KalmanConfig::default(),
            velocity_ref: default_velocity_ref(),
            fusion: FusionSettings::default(),
            alpha_regime: default_alpha_regime(),
            risk_by_regime: default_risk_by_regime(),
        }
    }
}

impl PipelineConfig {
    /// Validate every invariant in §6/§7 and return a typed `ConfigError`
    /// on the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeframes.is_empty() {
            return Err(ConfigError::NoTimeframes);
        }

        let mut sorted: Vec<&Timeframe> = self.timeframes.iter().collect();
        sorted.sort_by_key(|tf| tf.duration_ms);
        let base = sorted[0];
        if base.duration_ms <= 0 {
            return Err(ConfigError::NonPositiveDuration {
                label: base.label.clone(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for tf in &self.timeframes {
            if tf.duration_ms <= 0 {
                return Err(ConfigError::NonPositiveDuration {
                    label: tf.label.clone(),
                });
            }
            if !seen.insert(tf.label.clone()) {
                return Err(ConfigError::DuplicateTimeframe {
                    label: tf.label.clone(),
                });
            }
            if tf.duration_ms % base.duration_ms != 0 {
                return Err(ConfigError::NotNestedMultiple {
                    base_label: base.label.clone(),
                    base_ms: base.duration_ms,
                    hi_label: tf.label.clone(),
                    hi_ms: tf.duration_ms,
                });
            }
            if self.ring_capacity == 0 {
                return Err(ConfigError::NonPositiveRingCapacity {
                    label: tf.label.clone(),
                    capacity: self.ring_capacity,
                });
            }
            if !self.fusion.tf_ranks.contains_key(&tf.label) {
                return Err(ConfigError::MissingTimeframeRank {
                    label: tf.label.clone(),
                });
            }
        }

        for (name, value) in [
            ("q0", self.kalman.q0),
            ("r", self.kalman.r),
            ("p_init", self.kalman.p_init),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveKalmanParam { name, value });
            }
        }
        if self.kalman.scale_min > self.kalman.scale_max {
            return Err(ConfigError::InvalidScaleRange {
                scale_min: self.kalman.scale_min,
                scale_max: self.kalman.scale_max,
            });
        }

        for (name, value) in [
            ("tau_enter", self.fusion.tau_enter),
            ("mu_enter", self.fusion.mu_enter),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::FusionThresholdOutOfRange { name, value });
            }
        }

        for regime in [
            Regime::Trending,
            Regime::Volatile,
            Regime::Stable,
            Regime::MeanReverting,
        ] {
            if !self.risk_by_regime.contains_key(&regime) {
                return Err(ConfigError::MissingRiskParams {
                    regime: regime.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn regime_thresholds(&self) -> RegimeThresholds {
        self.kalman.regime_thresholds
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse pipeline config from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("pipeline config at {} failed validation", path.display()))?;
        info!(path = %path.display(), timeframes = ?config.timeframes, "pipeline config loaded");
        Ok(config)
    }

    /// Persist using the atomic tmp + rename pattern.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("failed to serialise pipeline config")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;
        info!(path = %path.display(), "pipeline config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_nested_timeframes() {
        let mut cfg = PipelineConfig::default();
        cfg.timeframes = vec![Timeframe::new("1m", 60_000), Timeframe::new("7m", 7 * 60_000)];
        cfg.fusion.tf_ranks.insert("7m".to_string(), 2);
        match cfg.validate() {
            Err(ConfigError::NotNestedMultiple { .. }) => {}
            other => panic!("expected NotNestedMultiple, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_timeframes() {
        let mut cfg = PipelineConfig::default();
        cfg.timeframes = vec![];
        assert!(matches!(cfg.validate(), Err(ConfigError::NoTimeframes)));
    }

    #[test]
    fn rejects_zero_ring_capacity() {
        let mut cfg = PipelineConfig::default();
        cfg.ring_capacity = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositiveRingCapacity { .. })
        ));
    }

    #[test]
    fn rejects_non_positive_kalman_param() {
        let mut cfg = PipelineConfig::default();
        cfg.kalman.q0 = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositiveKalmanParam { .. })
        ));
    }

    #[test]
    fn rejects_inverted_scale_range() {
        let mut cfg = PipelineConfig::default();
        cfg.kalman.scale_min = 5.0;
        cfg.kalman.scale_max = 1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidScaleRange { .. })));
    }

    #[test]
    fn rejects_missing_timeframe_rank() {
        let mut cfg = PipelineConfig::default();
        cfg.timeframes.push(Timeframe::new("2h", 2 * 60 * 60_000));
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingTimeframeRank { .. })
        ));
    }

    #[test]
    fn rejects_missing_risk_params() {
        let mut cfg = PipelineConfig::default();
        cfg.risk_by_regime.remove(&Regime::Volatile);
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingRiskParams { .. })));
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.ring_capacity, 500);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = PipelineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.timeframes, cfg2.timeframes);
        assert_eq!(cfg.ring_capacity, cfg2.ring_capacity);
    }
}
