// =============================================================================
// Central Application State
// =============================================================================
//
// The single source of truth for one instrument's pipeline. Mirrors the
// teacher's `AppState` shape (Arc-wrapped subsystem engines, an atomic
// version counter the dashboard polls, parking_lot locks around mutable
// collections) scaled down to what this engine actually owns: one
// `Pipeline`, one auxiliary `RiskGate`, a bounded error log, and a bounded
// recent-event log fed by the pipeline's own `EventBus`.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::decision::DecisionRecord;
use crate::errors::TickRejection;
use crate::events::{EventSink, PipelineEvent, RecentEventLog};
use crate::fusion::Position;
use crate::kalman::KalmanState;
use crate::pipeline::{Pipeline, ProcessOutcome};
use crate::risk::{CircuitBreakerInfo, RiskGate};

const MAX_RECENT_ERRORS: usize = 50;
const RECENT_EVENT_CAPACITY: usize = 200;

/// A recorded error event for the dashboard error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub code: Option<String>,
    pub at: String,
}

/// Adapts a shared, lockable `RecentEventLog` into the pipeline's
/// `EventSink` callback so the dashboard can read events pushed by a
/// pipeline it does not otherwise have mutable access to.
struct SharedEventLog(Arc<RwLock<RecentEventLog>>);

impl EventSink for SharedEventLog {
    fn on_event(&mut self, event: &PipelineEvent) {
        self.0.write().push(event.clone());
    }
}

/// Tunable limits for the auxiliary risk gate, separate from
/// `PipelineConfig` since the gate is ambient enrichment, not a pipeline
/// invariant (§11).
#[derive(Debug, Clone, Copy)]
pub struct RiskLimits {
    pub starting_capital: f64,
    pub max_daily_loss_pct: f64,
    pub max_consecutive_losses: u32,
    pub max_drawdown_pct: f64,
    pub max_daily_trades: u32,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            starting_capital: 10_000.0,
            max_daily_loss_pct: 0.03,
            max_consecutive_losses: 5,
            max_drawdown_pct: 0.08,
            max_daily_trades: 50,
        }
    }
}

/// Central application state shared across async tasks via `Arc<AppState>`.
pub struct AppState {
    pub state_version: AtomicU64,
    pub ws_sequence_number: AtomicU64,

    pub symbol: String,
    pub pipeline: RwLock<Pipeline>,
    pub risk_gate: Arc<RiskGate>,
    pub event_log: Arc<RwLock<RecentEventLog>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    pub ws_user_connected: RwLock<bool>,
    pub last_ws_user_event: RwLock<std::time::Instant>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(symbol: impl Into<String>, config: PipelineConfig, risk_limits: RiskLimits) -> Result<Self, crate::errors::ConfigError> {
        let mut pipeline = Pipeline::new(config)?;
        let event_log = Arc::new(RwLock::new(RecentEventLog::new(RECENT_EVENT_CAPACITY)));
        pipeline.register_sink(Box::new(SharedEventLog(event_log.clone())));

        let risk_gate = Arc::new(RiskGate::new(
            risk_limits.starting_capital,
            risk_limits.max_daily_loss_pct,
            risk_limits.max_consecutive_losses,
            risk_limits.max_drawdown_pct,
            risk_limits.max_daily_trades,
        ));

        Ok(Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),
            symbol: symbol.into(),
            pipeline: RwLock::new(pipeline),
            risk_gate,
            event_log,
            recent_errors: RwLock::new(Vec::new()),
            ws_user_connected: RwLock::new(false),
            last_ws_user_event: RwLock::new(std::time::Instant::now()),
            start_time: std::time::Instant::now(),
        })
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    pub fn push_error(&self, msg: String) {
        self.push_error_with_code(msg, None);
    }

    pub fn push_error_with_code(&self, msg: String, code: Option<String>) {
        let record = ErrorRecord {
            message: msg,
            code,
            at: Utc::now().to_rfc3339(),
        };
        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        self.increment_version();
    }

    /// Run one tick through the pipeline and bump the version counter if
    /// anything observable happened.
    pub fn process_tick(&self, ts: i64, price: f64, volume: f64) -> ProcessOutcome {
        let outcome = self.pipeline.write().process_tick(ts, price, volume);
        if let Some(rejection) = outcome.rejected {
            self.push_error_with_code("tick rejected".to_string(), Some(rejection_code(rejection)));
        }
        if !outcome.events.is_empty() {
            self.increment_version();
        }
        outcome
    }

    /// Whether the auxiliary risk gate currently permits a new entry. The
    /// caller (the order-submission loop) is responsible for honouring this
    /// before forwarding a `Trigger` to an `OrderSink` — the pipeline itself
    /// never consults this.
    pub fn check_entry_permission(&self) -> (bool, Option<String>) {
        self.risk_gate.can_enter()
    }

    pub fn record_trade_result(&self, pnl: f64) {
        self.risk_gate.record_trade_result(pnl);
        self.increment_version();
    }

    pub fn build_snapshot(&self) -> StateSnapshot {
        let now = Utc::now();
        let version = self.current_state_version();
        let pipeline = self.pipeline.read();
        let risk_state = self.risk_gate.get_state();

        let kalman_regimes = pipeline
            .kalman_states()
            .into_iter()
            .map(|(label, state)| (label, RegimeSnapshot::from(state)))
            .collect();

        StateSnapshot {
            symbol: self.symbol.clone(),
            state_version: version,
            server_time: now.timestamp_millis(),
            position: format!("{:?}", pipeline.position()),
            recent_decisions: pipeline.recent_decisions().to_vec(),
            risk: RiskSnapshot {
                risk_mode: risk_state.risk_mode,
                daily_pnl: risk_state.daily_pnl,
                consecutive_losses: risk_state.consecutive_losses,
                circuit_breakers: risk_state.circuit_breakers,
            },
            kalman_regimes,
            recent_errors: self.recent_errors.read().clone(),
            recent_events: self.event_log.read().recent().cloned().collect(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

fn rejection_code(rejection: TickRejection) -> String {
    match rejection {
        TickRejection::NonFinite => "non_finite".to_string(),
        TickRejection::NonPositivePrice => "non_positive_price".to_string(),
        TickRejection::NegativeVolume => "negative_volume".to_string(),
        TickRejection::OutOfOrder => "out_of_order".to_string(),
    }
}

// =============================================================================
// Serialisable snapshot types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RegimeSnapshot {
    pub regime: String,
    pub velocity: f64,
    pub confidence: f64,
    pub scale: f64,
}

impl From<KalmanState> for RegimeSnapshot {
    fn from(state: KalmanState) -> Self {
        Self {
            regime: state.regime.to_string(),
            velocity: state.velocity,
            confidence: state.confidence,
            scale: state.scale,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskSnapshot {
    pub risk_mode: String,
    pub daily_pnl: f64,
    pub consecutive_losses: u32,
    pub circuit_breakers: Vec<CircuitBreakerInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub symbol: String,
    pub state_version: u64,
    pub server_time: i64,
    pub position: String,
    pub recent_decisions: Vec<DecisionRecord>,
    pub risk: RiskSnapshot,
    pub kalman_regimes: std::collections::HashMap<String, RegimeSnapshot>,
    pub recent_errors: Vec<ErrorRecord>,
    pub recent_events: Vec<PipelineEvent>,
    pub uptime_seconds: u64,
}
