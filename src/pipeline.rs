// =============================================================================
// Pipeline — wires C1 through C6 into one cooperative update loop
// =============================================================================
//
// One `process_tick` call runs the entire critical path to completion
// before the next tick is considered (§5): validate, aggregate, update the
// Kalman Bank, publish signals, fuse, and log a decision record. No
// suspension points exist inside this call; the only await point a caller
// needs is for its own `TickSource`.
//
// The auxiliary risk gate (`risk.rs`) is deliberately not owned here: it
// composes one level up, between a `Trigger` this pipeline emits and the
// `OrderSink` that would act on it, so the Fusion Engine remains the sole
// source of entry/exit decisions.
// =============================================================================

use std::collections::HashMap;

use crate::candle::{Aggregator, AggregatorEvent};
use crate::config::PipelineConfig;
use crate::decision::DecisionRecord;
use crate::errors::{ConfigError, TickRejection};
use crate::events::{EventBus, EventSink, PipelineEvent};
use crate::fusion::{FusionConfig, FusionEngine, FusedDecision, Position, Trigger};
use crate::kalman::{KalmanBank, Regime};
use crate::ring::RingStore;
use crate::signals::{KalmanDirectionalSource, Signal, SignalSource};
use crate::tick::TickValidator;

/// Everything produced by one call to [`Pipeline::process_tick`].
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub events: Vec<PipelineEvent>,
    pub decision: Option<FusedDecision>,
    pub trigger: Option<Trigger>,
    pub rejected: Option<TickRejection>,
}

fn build_fusion_config(config: &PipelineConfig) -> FusionConfig {
    FusionConfig {
        tf_ranks: config.fusion.tf_ranks.clone(),
        alpha_regime: config.alpha_regime.clone(),
        beta: config.fusion.beta,
        gamma: config.fusion.gamma,
        n_ref: config.fusion.n_ref,
        tau_enter: config.fusion.tau_enter,
        mu_enter: config.fusion.mu_enter,
        global_risk_scalar: config.fusion.global_risk_scalar,
        risk_by_regime: config.risk_by_regime.clone(),
    }
}

/// Owned aggregate: the pipeline's entire state is reachable only through
/// this handle (§9 — no process-global singletons).
pub struct Pipeline {
    config: PipelineConfig,
    validator: TickValidator,
    aggregator: Aggregator,
    ring_store: RingStore,
    kalman_bank: KalmanBank,
    dt_secs: HashMap<String, f64>,
    sources: Vec<Box<dyn SignalSource + Send>>,
    fusion: FusionEngine,
    event_bus: EventBus,
    recent_decisions: Vec<DecisionRecord>,
    shutting_down: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut ring_store = RingStore::new();
        let mut kalman_bank = KalmanBank::new();
        let mut dt_secs = HashMap::new();

        for tf in &config.timeframes {
            ring_store.register(tf.label.clone(), config.ring_capacity);
            kalman_bank.register(tf.label.clone(), config.kalman);
            dt_secs.insert(tf.label.clone(), tf.duration_secs());
        }

        let sources: Vec<Box<dyn SignalSource + Send>> =
            vec![Box::new(KalmanDirectionalSource::new(config.velocity_ref))];

        let fusion = FusionEngine::new(build_fusion_config(&config));

        Ok(Self {
            aggregator: Aggregator::new(config.timeframes.clone()),
            config,
            validator: TickValidator::new(),
            ring_store,
            kalman_bank,
            dt_secs,
            sources,
            fusion,
            event_bus: EventBus::new(),
            recent_decisions: Vec::new(),
            shutting_down: false,
        })
    }

    pub fn register_sink(&mut self, sink: Box<dyn EventSink + Send>) {
        self.event_bus.register(sink);
    }

    pub fn request_shutdown(&mut self) {
        self.shutting_down = true;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn recent_decisions(&self) -> &[DecisionRecord] {
        &self.recent_decisions
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ring_store(&self) -> &RingStore {
        &self.ring_store
    }

    pub fn position(&self) -> Position {
        self.fusion.position()
    }

    /// Current Kalman state per active timeframe, for dashboard display.
    pub fn kalman_states(&self) -> HashMap<String, crate::kalman::KalmanState> {
        self.kalman_bank
            .labels()
            .filter_map(|label| self.kalman_bank.state(label).map(|s| (label.clone(), s)))
            .collect()
    }

    /// Run the entire critical path for one raw `(ts, price, volume)` tick.
    pub fn process_tick(&mut self, ts: i64, price: f64, volume: f64) -> ProcessOutcome {
        let tick = match self.validator.validate(ts, price, volume) {
            Ok(tick) => tick,
            Err(rejection) => {
                return ProcessOutcome {
                    rejected: Some(rejection),
                    ..Default::default()
                }
            }
        };

        let mut outcome = ProcessOutcome::default();
        let mut any_closed = false;

        for event in self.aggregator.on_tick(&tick) {
            match event {
                AggregatorEvent::CandleClosed { timeframe, candle } => {
                    any_closed = true;
                    self.ring_store.push_closed(&timeframe, candle);

                    for source in &mut self.sources {
                        source.on_candle_closed(&timeframe, &candle);
                    }

                    let dt = self.dt_secs.get(&timeframe).copied().unwrap_or(60.0);
                    if let Some(update) = self.kalman_bank.update(&timeframe, candle.close, dt) {
                        if update.reset {
                            let reset_event = PipelineEvent::FilterReset {
                                timeframe: timeframe.clone(),
                            };
                            self.event_bus.publish(reset_event.clone());
                            outcome.events.push(reset_event);
                        }
                        for source in &mut self.sources {
                            source.on_kalman(&timeframe, &update.state, tick.ts);
                        }
                    }

                    let closed_event = PipelineEvent::CandleClosed {
                        timeframe: timeframe.clone(),
                        candle,
                    };
                    self.event_bus.publish(closed_event.clone());
                    outcome.events.push(closed_event);
                }
                AggregatorEvent::CandleGap {
                    timeframe,
                    missing_from,
                    missing_to,
                } => {
                    let duration_ms = self
                        .aggregator
                        .timeframes()
                        .iter()
                        .find(|tf| tf.label == timeframe)
                        .map(|tf| tf.duration_ms)
                        .unwrap_or((missing_to - missing_from).max(1));
                    let missing_steps = ((missing_to - missing_from) / duration_ms.max(1)).max(1) as u32;
                    let dt = self.dt_secs.get(&timeframe).copied().unwrap_or(60.0);
                    self.kalman_bank.predict_gap(&timeframe, dt, missing_steps);

                    let gap_event = PipelineEvent::CandleGap {
                        timeframe,
                        missing_from,
                        missing_to,
                    };
                    self.event_bus.publish(gap_event.clone());
                    outcome.events.push(gap_event);
                }
            }
        }

        let active_timeframes: Vec<String> = self.aggregator.timeframes().iter().map(|tf| tf.label.clone()).collect();
        for label in &active_timeframes {
            if let Some(partial) = self.aggregator.partial(label).copied() {
                self.ring_store.set_partial(label, partial);
            }
        }

        if any_closed {
            let signals: Vec<Signal> = self.sources.iter().flat_map(|s| s.all_current()).collect();

            let labels: Vec<String> = self.kalman_bank.labels().cloned().collect();
            let regimes: HashMap<String, Regime> = labels
                .into_iter()
                .filter_map(|label| {
                    let regime = self.kalman_bank.state(&label)?.regime;
                    Some((label, regime))
                })
                .collect();
            let coherence = self.kalman_bank.coherence();

            let (decision, trigger) = self.fusion.fuse(&signals, &regimes, coherence, tick.price, tick.ts);

            let record = DecisionRecord::allow(&decision, &trigger);

            let decision_event = PipelineEvent::FusedDecision(decision.clone());
            self.event_bus.publish(decision_event.clone());
            outcome.events.push(decision_event);

            let trigger_event = PipelineEvent::Trigger(trigger);
            self.event_bus.publish(trigger_event.clone());
            outcome.events.push(trigger_event);

            self.recent_decisions.push(record);
            if self.recent_decisions.len() > 200 {
                self.recent_decisions.remove(0);
            }

            outcome.decision = Some(decision);
            outcome.trigger = Some(trigger);
        }

        outcome
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::TriggerAction;
    use crate::timeframe::Timeframe;

    fn small_config() -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.timeframes = vec![Timeframe::new("1m", 60_000), Timeframe::new("5m", 300_000)];
        cfg.fusion.tau_enter = 0.01;
        cfg.fusion.mu_enter = 0.01;
        cfg.kalman.warmup_min = 5;
        cfg
    }

    #[test]
    fn invalid_config_fails_construction() {
        let mut cfg = PipelineConfig::default();
        cfg.timeframes = vec![];
        assert!(matches!(Pipeline::new(cfg), Err(ConfigError::NoTimeframes)));
    }

    #[test]
    fn first_tick_produces_no_candle_closed() {
        let mut pipeline = Pipeline::new(small_config()).unwrap();
        let outcome = pipeline.process_tick(0, 100.0, 1.0);
        assert!(outcome.events.is_empty());
        assert!(outcome.decision.is_none());
    }

    #[test]
    fn invalid_tick_is_rejected_with_no_emissions() {
        let mut pipeline = Pipeline::new(small_config()).unwrap();
        pipeline.process_tick(0, 100.0, 1.0);
        let outcome = pipeline.process_tick(60_000, 0.0, 1.0);
        assert_eq!(outcome.rejected, Some(TickRejection::NonPositivePrice));
        assert!(outcome.events.is_empty());
        assert!(outcome.decision.is_none());
    }

    #[test]
    fn sustained_uptrend_eventually_enters_long() {
        let mut pipeline = Pipeline::new(small_config()).unwrap();
        let mut price = 100.0;
        let mut entered = false;
        for i in 0..300 {
            price += 0.1;
            let outcome = pipeline.process_tick(i as i64 * 6_000, price, 1.0);
            if let Some(trigger) = outcome.trigger {
                if trigger.action == TriggerAction::EnterLong {
                    entered = true;
                }
            }
        }
        assert!(entered);
    }

    #[test]
    fn gap_is_observed_and_no_candle_is_fabricated() {
        let mut pipeline = Pipeline::new(small_config()).unwrap();
        for i in 0..=60 {
            pipeline.process_tick(i * 1_000, 100.0, 1.0);
        }
        let outcome = pipeline.process_tick(360_000, 101.0, 1.0);
        let has_gap = outcome.events.iter().any(|e| matches!(e, PipelineEvent::CandleGap { .. }));
        assert!(has_gap);
    }

    #[test]
    fn config_rejection_is_fatal_at_construction() {
        let mut cfg = PipelineConfig::default();
        cfg.timeframes = vec![Timeframe::new("1m", 60_000), Timeframe::new("7m", 7 * 60_000)];
        cfg.fusion.tf_ranks.insert("7m".to_string(), 2);
        assert!(Pipeline::new(cfg).is_err());
    }
}
