// =============================================================================
// Pipeline Events — observable emissions + bounded recent-event log
// =============================================================================
//
// Exact transport is an implementation choice (§6); this core offers a
// synchronous `EventSink` callback plus a bounded in-memory log, mirroring
// the teacher's `recent_decisions` / `recent_errors` ring buffers
// (app_state.rs) that the dashboard reads from.
// =============================================================================

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::candle::Candle;
use crate::fusion::{FusedDecision, Trigger};

/// Everything the pipeline can emit downstream in one update cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    CandleClosed { timeframe: String, candle: Candle },
    CandleGap { timeframe: String, missing_from: i64, missing_to: i64 },
    FilterReset { timeframe: String },
    FusedDecision(FusedDecision),
    Trigger(Trigger),
}

/// Capability consumed by external collaborators observing the pipeline.
/// Implementations must not block the critical path (§6).
pub trait EventSink {
    fn on_event(&mut self, event: &PipelineEvent);
}

/// No-op sink, useful for tests and headless replay.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&mut self, _event: &PipelineEvent) {}
}

/// Bounded in-memory log of recent events, oldest evicted first.
#[derive(Debug)]
pub struct RecentEventLog {
    capacity: usize,
    events: VecDeque<PipelineEvent>,
}

impl RecentEventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, event: PipelineEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn recent(&self) -> impl DoubleEndedIterator<Item = &PipelineEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for RecentEventLog {
    fn on_event(&mut self, event: &PipelineEvent) {
        self.push(event.clone());
    }
}

/// Fan a single event out to every registered sink. Sinks are called in
/// registration order; a panicking sink is a programming error in that
/// sink, not handled here (mirrors the teacher's direct callback dispatch).
#[derive(Default)]
pub struct EventBus {
    sinks: Vec<Box<dyn EventSink + Send>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn register(&mut self, sink: Box<dyn EventSink + Send>) {
        self.sinks.push(sink);
    }

    pub fn publish(&mut self, event: PipelineEvent) {
        for sink in &mut self.sinks {
            sink.on_event(&event);
        }
    }
}
