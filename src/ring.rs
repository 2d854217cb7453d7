// =============================================================================
// Ring Store (C3)
// =============================================================================
//
// Bounded closed-candle history per timeframe, plus the timeframe's current
// partial candle. Pushing past capacity evicts the oldest closed candle —
// the same fixed-capacity VecDeque shape the teacher uses for its own
// candle buffer.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use crate::candle::Candle;

/// Fixed-capacity closed-candle history for one timeframe, plus its current
/// partial (in-progress) candle.
#[derive(Debug, Clone)]
pub struct Ring {
    capacity: usize,
    closed: VecDeque<Candle>,
    partial: Option<Candle>,
}

impl Ring {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            closed: VecDeque::with_capacity(capacity.max(1)),
            partial: None,
        }
    }

    /// Push a newly closed candle, evicting the oldest if at capacity.
    pub fn push_closed(&mut self, candle: Candle) {
        if self.closed.len() >= self.capacity {
            self.closed.pop_front();
        }
        self.closed.push_back(candle);
    }

    pub fn set_partial(&mut self, candle: Candle) {
        self.partial = Some(candle);
    }

    pub fn partial(&self) -> Option<&Candle> {
        self.partial.as_ref()
    }

    /// Closed candles oldest-first, capped at `capacity`.
    pub fn closed(&self) -> impl DoubleEndedIterator<Item = &Candle> {
        self.closed.iter()
    }

    pub fn last_closed(&self) -> Option<&Candle> {
        self.closed.back()
    }

    pub fn len(&self) -> usize {
        self.closed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closed.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Closed candle closes, oldest-first.
    pub fn closes(&self) -> Vec<f64> {
        self.closed.iter().map(|c| c.close).collect()
    }

    /// Copy the last `window` closed candles into a fresh read-only buffer,
    /// chronological order, for downstream computation (e.g. warm-up replay,
    /// a volatility window) without holding a reference into the ring (§4.3).
    pub fn snapshot(&self, window: usize) -> Vec<Candle> {
        let skip = self.closed.len().saturating_sub(window);
        self.closed.iter().skip(skip).copied().collect()
    }
}

/// One [`Ring`] per configured timeframe.
#[derive(Debug, Clone, Default)]
pub struct RingStore {
    rings: HashMap<String, Ring>,
}

impl RingStore {
    pub fn new() -> Self {
        Self {
            rings: HashMap::new(),
        }
    }

    pub fn register(&mut self, label: impl Into<String>, capacity: usize) {
        self.rings.insert(label.into(), Ring::new(capacity));
    }

    pub fn ring(&self, label: &str) -> Option<&Ring> {
        self.rings.get(label)
    }

    pub fn ring_mut(&mut self, label: &str) -> Option<&mut Ring> {
        self.rings.get_mut(label)
    }

    pub fn push_closed(&mut self, label: &str, candle: Candle) {
        if let Some(ring) = self.rings.get_mut(label) {
            ring.push_closed(candle);
        }
    }

    pub fn set_partial(&mut self, label: &str, candle: Candle) {
        if let Some(ring) = self.rings.get_mut(label) {
            ring.set_partial(candle);
        }
    }

    /// See [`Ring::snapshot`]. Returns an empty buffer for an unregistered
    /// timeframe rather than panicking.
    pub fn snapshot(&self, label: &str, window: usize) -> Vec<Candle> {
        self.rings.get(label).map(|r| r.snapshot(window)).unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_ts: i64, close: f64) -> Candle {
        Candle {
            open_ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            closed: true,
        }
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut ring = Ring::new(3);
        ring.push_closed(candle(0, 1.0));
        ring.push_closed(candle(1, 2.0));
        ring.push_closed(candle(2, 3.0));
        ring.push_closed(candle(3, 4.0));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.closes(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn partial_is_independent_of_closed_history() {
        let mut ring = Ring::new(2);
        ring.push_closed(candle(0, 1.0));
        ring.set_partial(candle(1, 99.0));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.partial().unwrap().close, 99.0);
    }

    #[test]
    fn capacity_zero_treated_as_one() {
        let ring = Ring::new(0);
        assert_eq!(ring.capacity(), 1);
    }

    #[test]
    fn ring_store_tracks_multiple_timeframes_independently() {
        let mut store = RingStore::new();
        store.register("1m", 5);
        store.register("5m", 2);
        store.push_closed("1m", candle(0, 1.0));
        store.push_closed("5m", candle(0, 2.0));
        store.push_closed("5m", candle(1, 3.0));
        store.push_closed("5m", candle(2, 4.0));
        assert_eq!(store.ring("1m").unwrap().len(), 1);
        assert_eq!(store.ring("5m").unwrap().closes(), vec![3.0, 4.0]);
    }

    #[test]
    fn last_closed_returns_most_recent() {
        let mut ring = Ring::new(3);
        ring.push_closed(candle(0, 1.0));
        ring.push_closed(candle(1, 2.0));
        assert_eq!(ring.last_closed().unwrap().close, 2.0);
    }

    #[test]
    fn empty_ring_has_no_last_closed() {
        let ring = Ring::new(3);
        assert!(ring.last_closed().is_none());
        assert!(ring.is_empty());
    }

    #[test]
    fn snapshot_returns_last_window_chronologically() {
        let mut ring = Ring::new(10);
        for i in 0..5 {
            ring.push_closed(candle(i, i as f64));
        }
        let snap = ring.snapshot(3);
        assert_eq!(snap.iter().map(|c| c.close).collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn snapshot_wider_than_history_returns_all() {
        let mut ring = Ring::new(10);
        ring.push_closed(candle(0, 1.0));
        assert_eq!(ring.snapshot(50).len(), 1);
    }

    #[test]
    fn store_snapshot_on_unregistered_timeframe_is_empty() {
        let store = RingStore::new();
        assert!(store.snapshot("1m", 10).is_empty());
    }
}
