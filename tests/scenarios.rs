// =============================================================================
// End-to-end scenario tests
// =============================================================================
//
// Exercises the six literal scenarios (§8) against the assembled `Pipeline`
// through its public surface only — `ReplayTickSource` feeding
// `Pipeline::process_tick` one tick at a time, the same shape `main.rs`'s
// demo-mode order loop uses.
// =============================================================================

use pulse_engine::collaborators::{ReplayTickSource, TickSource};
use pulse_engine::config::PipelineConfig;
use pulse_engine::errors::ConfigError;
use pulse_engine::events::PipelineEvent;
use pulse_engine::fusion::TriggerAction;
use pulse_engine::pipeline::Pipeline;
use pulse_engine::timeframe::Timeframe;

fn two_timeframe_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.timeframes = vec![Timeframe::new("1m", 60_000), Timeframe::new("5m", 300_000)];
    cfg.fusion.tau_enter = 0.05;
    cfg.fusion.mu_enter = 0.05;
    cfg.kalman.warmup_min = 5;
    cfg
}

fn drain(pipeline: &mut Pipeline, source: &mut dyn TickSource) -> Vec<pulse_engine::pipeline::ProcessOutcome> {
    let mut outcomes = Vec::new();
    while let Ok(Some((ts, price, volume))) = source.next() {
        outcomes.push(pipeline.process_tick(ts, price, volume));
    }
    outcomes
}

/// Scenario 1 — stable uptrend: 300 ticks, price 100 -> 130 over 30 minutes,
/// volume 1.0, 1m base with {1m,5m} filters.
#[test]
fn scenario_stable_uptrend() {
    let mut pipeline = Pipeline::new(two_timeframe_config()).unwrap();
    let mut source = ReplayTickSource::linear_ramp(100.0, 130.0, 300, 6_000, 1.0);
    let outcomes = drain(&mut pipeline, &mut source);

    let closed_1m = outcomes
        .iter()
        .flat_map(|o| &o.events)
        .filter(|e| matches!(e, PipelineEvent::CandleClosed { timeframe, .. } if timeframe == "1m"))
        .count();
    assert!(closed_1m >= 29, "expected at least 29 1m candle closes, got {closed_1m}");

    let mut last_close = f64::MIN;
    let mut monotone = true;
    for event in outcomes.iter().flat_map(|o| &o.events) {
        if let PipelineEvent::CandleClosed { timeframe, candle } = event {
            if timeframe == "1m" {
                if candle.close < last_close {
                    monotone = false;
                }
                last_close = candle.close;
            }
        }
    }
    assert!(monotone, "1m closes should be non-decreasing on a steady uptrend");

    let states = pipeline.kalman_states();
    let velocity = states.get("1m").map(|s| s.velocity).unwrap_or(0.0);
    assert!(velocity > 0.0, "final velocity should be positive, got {velocity}");

    let entered_long = outcomes
        .iter()
        .filter_map(|o| o.trigger.as_ref())
        .any(|t| t.action == TriggerAction::EnterLong);
    assert!(entered_long, "expected at least one enter_long trigger");
}

/// Scenario 2 — reversal: up to 110 then down to 100 over an hour. An
/// enter_long must be followed by an exit before any enter_short, and no two
/// entries are open at once.
#[test]
fn scenario_reversal_exits_before_reversing() {
    let mut pipeline = Pipeline::new(two_timeframe_config()).unwrap();
    let mut ticks = Vec::new();
    for i in 0..200 {
        let frac = i as f64 / 199.0;
        ticks.push((i as i64 * 9_000, 100.0 + 10.0 * frac, 1.0));
    }
    for i in 0..200 {
        let frac = i as f64 / 199.0;
        ticks.push(((200 + i) as i64 * 9_000, 110.0 - 10.0 * frac, 1.0));
    }
    let mut source = ReplayTickSource::new(ticks);
    let outcomes = drain(&mut pipeline, &mut source);

    let mut position_open: Option<TriggerAction> = None;
    let mut saw_long = false;
    let mut saw_exit_before_short = true;
    for trigger in outcomes.iter().filter_map(|o| o.trigger.as_ref()) {
        match trigger.action {
            TriggerAction::EnterLong => {
                assert!(position_open.is_none(), "entered long while a position was already open");
                position_open = Some(TriggerAction::EnterLong);
                saw_long = true;
            }
            TriggerAction::EnterShort => {
                if saw_long && position_open.is_some() {
                    saw_exit_before_short = false;
                }
                assert!(position_open.is_none(), "entered short while a position was already open");
                position_open = Some(TriggerAction::EnterShort);
            }
            TriggerAction::Exit => {
                position_open = None;
            }
            TriggerAction::Hold => {}
        }
    }
    assert!(saw_exit_before_short, "exit must precede an opposite entry");
}

/// Scenario 3 — gap: ticks at t=0..60s then a 5 minute silent gap before
/// resuming. Expected a single CandleGap(1m, 60_000, 360_000) and no
/// fabricated candles in between.
#[test]
fn scenario_gap_is_observed_without_fabrication() {
    let mut pipeline = Pipeline::new(two_timeframe_config()).unwrap();
    let mut source = ReplayTickSource::gapped(60_000, 300_000, 60_000, 1_000, 100.0, 1.0);
    let outcomes = drain(&mut pipeline, &mut source);

    let gaps: Vec<_> = outcomes
        .iter()
        .flat_map(|o| &o.events)
        .filter_map(|e| match e {
            PipelineEvent::CandleGap {
                timeframe,
                missing_from,
                missing_to,
            } if timeframe == "1m" => Some((*missing_from, *missing_to)),
            _ => None,
        })
        .collect();
    assert_eq!(gaps.len(), 1, "expected exactly one 1m gap, got {gaps:?}");
    assert_eq!(gaps[0], (60_000, 360_000));
}

/// Scenario 4 — invalid tick: price=0 inside an otherwise valid stream is
/// rejected with no downstream emissions, and does not disturb the pipeline's
/// ongoing state.
#[test]
fn scenario_invalid_tick_is_rejected_in_place() {
    let mut pipeline = Pipeline::new(two_timeframe_config()).unwrap();
    pipeline.process_tick(0, 100.0, 1.0);
    pipeline.process_tick(1_000, 100.5, 1.0);

    let before = pipeline.ring_store().snapshot("1m", 10);
    let outcome = pipeline.process_tick(2_000, 0.0, 1.0);

    assert_eq!(outcome.rejected, Some(pulse_engine::errors::TickRejection::NonPositivePrice));
    assert!(outcome.events.is_empty());
    assert!(outcome.decision.is_none());
    assert!(outcome.trigger.is_none());

    let after = pipeline.ring_store().snapshot("1m", 10);
    assert_eq!(before.len(), after.len(), "rejected tick must not alter ring state");
}

/// Scenario 5 — low-confidence flat: oscillating price around 100, no
/// entries ever triggered.
#[test]
fn scenario_low_confidence_flat_never_enters() {
    let mut pipeline = Pipeline::new(two_timeframe_config()).unwrap();
    let mut source = ReplayTickSource::oscillating(100.0, 0.05, 1_000, 1_000, 1.0);
    let outcomes = drain(&mut pipeline, &mut source);

    let entries = outcomes
        .iter()
        .filter_map(|o| o.trigger.as_ref())
        .filter(|t| matches!(t.action, TriggerAction::EnterLong | TriggerAction::EnterShort))
        .count();
    assert_eq!(entries, 0, "a flat oscillation should never clear the entry threshold");
}

/// Scenario 6 — config rejection: {1m, 7m} is not a nested multiple and must
/// fail construction with a typed ConfigError, never a panic.
#[test]
fn scenario_config_rejection_fails_construction() {
    let mut cfg = PipelineConfig::default();
    cfg.timeframes = vec![Timeframe::new("1m", 60_000), Timeframe::new("7m", 7 * 60_000)];
    cfg.fusion.tf_ranks.insert("7m".to_string(), 2);

    match Pipeline::new(cfg) {
        Err(ConfigError::NotNestedMultiple { .. }) => {}
        other => panic!("expected NotNestedMultiple, got {other:?}"),
    }
}
