// =============================================================================
// External Collaborators — TickSource / OrderSink contracts + demo impls
// =============================================================================
//
// The core only specifies these capabilities (§6); exchange connectivity
// and venue order placement are out of scope. The synthetic generators and
// logging sink below exist for replay/demo use and integration testing —
// "Demo mode before Live mode", mirroring the teacher's execution split
// (execution.rs: `Simulated` vs `Placed`) without needing an exchange
// client at all.
// =============================================================================

use tracing::info;

use crate::errors::SourceError;
use crate::fusion::Trigger;
use crate::tick::Tick;

/// Capability yielding a stream of raw trade events.
pub trait TickSource {
    /// Returns the next raw `(ts, price, volume)` triple, or `Ok(None)` if
    /// the stream is temporarily idle (no tick ready yet — not an error).
    fn next(&mut self) -> Result<Option<(i64, f64, f64)>, SourceError>;
    fn close(&mut self);
}

/// Capability accepting trade directives from the Fusion Engine.
pub trait OrderSink {
    fn submit(&mut self, trigger: &Trigger) -> Result<(), crate::errors::SinkError>;
    fn close(&mut self);
}

/// Replays a fixed, pre-generated sequence of ticks — the deterministic
/// collaborator used by integration tests and the literal end-to-end
/// scenarios (§8).
pub struct ReplayTickSource {
    ticks: std::vec::IntoIter<(i64, f64, f64)>,
    closed: bool,
}

impl ReplayTickSource {
    pub fn new(ticks: Vec<(i64, f64, f64)>) -> Self {
        Self {
            ticks: ticks.into_iter(),
            closed: false,
        }
    }

    /// A linear price ramp from `start` to `end` over `count` ticks spaced
    /// `step_ms` apart, constant volume.
    pub fn linear_ramp(start: f64, end: f64, count: usize, step_ms: i64, volume: f64) -> Self {
        let mut ticks = Vec::with_capacity(count);
        for i in 0..count {
            let frac = i as f64 / (count.saturating_sub(1).max(1)) as f64;
            let price = start + (end - start) * frac;
            ticks.push((i as i64 * step_ms, price, volume));
        }
        Self::new(ticks)
    }

    /// A small oscillation of `amplitude_pct` around `center`, useful for
    /// the low-confidence-flat scenario.
    pub fn oscillating(center: f64, amplitude_pct: f64, count: usize, step_ms: i64, volume: f64) -> Self {
        let mut ticks = Vec::with_capacity(count);
        for i in 0..count {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            let price = center * (1.0 + sign * amplitude_pct / 100.0);
            ticks.push((i as i64 * step_ms, price, volume));
        }
        Self::new(ticks)
    }

    /// Ticks covering `[0, before_ms]` at `step_ms` spacing, a silent gap,
    /// then ticks resuming at `before_ms + gap_ms` through `gap_ms +
    /// after_ms`, useful for exercising `CandleGap` (§8 scenario 3).
    pub fn gapped(before_ms: i64, gap_ms: i64, after_ms: i64, step_ms: i64, price: f64, volume: f64) -> Self {
        let mut ticks = Vec::new();
        let mut t = 0;
        while t <= before_ms {
            ticks.push((t, price, volume));
            t += step_ms;
        }
        let resume = before_ms + gap_ms;
        t = resume;
        while t <= resume + after_ms {
            ticks.push((t, price, volume));
            t += step_ms;
        }
        Self::new(ticks)
    }
}

impl TickSource for ReplayTickSource {
    fn next(&mut self) -> Result<Option<(i64, f64, f64)>, SourceError> {
        if self.closed {
            return Err(SourceError::Disconnected("source closed".to_string()));
        }
        Ok(self.ticks.next())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Accepts every `Trigger` and logs it — the demo-mode analogue of the
/// teacher's `ExecutionResult::Simulated`.
#[derive(Debug, Default)]
pub struct LoggingOrderSink {
    accepted: Vec<Trigger>,
}

impl LoggingOrderSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepted(&self) -> &[Trigger] {
        &self.accepted
    }
}

impl OrderSink for LoggingOrderSink {
    fn submit(&mut self, trigger: &Trigger) -> Result<(), crate::errors::SinkError> {
        info!(action = ?trigger.action, size = trigger.size_fraction, "simulated fill");
        self.accepted.push(*trigger);
        Ok(())
    }

    fn close(&mut self) {}
}
