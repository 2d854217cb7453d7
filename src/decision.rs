// =============================================================================
// Decision Record — auditable trail for every fused decision
// =============================================================================
//
// One record per update cycle that produced a `FusedDecision`, regardless
// of whether it resulted in a trigger. Mirrors the teacher's
// `DecisionEnvelope` (decision_envelope.rs): a UUID identity, RFC 3339
// timestamp, and an explicit allow/block verdict — here the "blocking
// layer" is the auxiliary risk gate (`risk.rs`) rather than a trading
// strategy's own layered verdicts.
// =============================================================================

use serde::Serialize;

use crate::fusion::{FusedDecision, Trigger, TriggerAction};

/// Auditable record of one pipeline update's fused decision and the
/// trigger it produced (or was blocked from producing).
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub id: String,
    pub ts: i64,
    pub direction: i8,
    pub magnitude: f64,
    pub confidence: f64,
    pub coherence: f64,
    pub regime: String,
    pub action: String,
    pub size_fraction: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    pub created_at: String,
}

impl DecisionRecord {
    pub fn allow(decision: &FusedDecision, trigger: &Trigger) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ts: decision.ts,
            direction: decision.direction,
            magnitude: decision.magnitude,
            confidence: decision.confidence,
            coherence: decision.coherence,
            regime: decision.regime.to_string(),
            action: action_label(trigger.action).to_string(),
            size_fraction: trigger.size_fraction,
            blocked_by: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn blocked(decision: &FusedDecision, trigger: &Trigger, blocking_gate: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ts: decision.ts,
            direction: decision.direction,
            magnitude: decision.magnitude,
            confidence: decision.confidence,
            coherence: decision.coherence,
            regime: decision.regime.to_string(),
            action: "hold".to_string(),
            size_fraction: 0.0,
            blocked_by: Some(blocking_gate.into()),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn matches_trigger_action(&self, trigger: &Trigger) -> bool {
        self.action == action_label(trigger.action)
    }
}

fn action_label(action: TriggerAction) -> &'static str {
    match action {
        TriggerAction::EnterLong => "enter_long",
        TriggerAction::EnterShort => "enter_short",
        TriggerAction::Exit => "exit",
        TriggerAction::Hold => "hold",
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::kalman::Regime;

    fn decision() -> FusedDecision {
        FusedDecision {
            direction: 1,
            magnitude: 0.8,
            confidence: 0.9,
            coherence: 0.95,
            regime: Regime::Trending,
            ts: 1_000,
            contributing_sources: vec!["1m".to_string()],
        }
    }

    fn trigger(action: TriggerAction) -> Trigger {
        Trigger {
            action,
            price_ref: 100.0,
            stop_level: 99.0,
            target_level: 102.0,
            size_fraction: 0.5,
        }
    }

    #[test]
    fn allow_record_has_no_blocking_layer() {
        let d = decision();
        let record = DecisionRecord::allow(&d, &trigger(TriggerAction::EnterLong));
        assert!(record.blocked_by.is_none());
        assert_eq!(record.action, "enter_long");
    }

    #[test]
    fn blocked_record_names_the_gate() {
        let d = decision();
        let record = DecisionRecord::blocked(&d, &trigger(TriggerAction::Hold), "daily_loss_breaker");
        assert_eq!(record.blocked_by.as_deref(), Some("daily_loss_breaker"));
        assert_eq!(record.action, "hold");
        assert_eq!(record.size_fraction, 0.0);
    }

    #[test]
    fn matches_trigger_action_checks_label() {
        let d = decision();
        let t = trigger(TriggerAction::Exit);
        let record = DecisionRecord::allow(&d, &t);
        assert!(record.matches_trigger_action(&t));
        assert!(!record.matches_trigger_action(&trigger(TriggerAction::Hold)));
    }
}
