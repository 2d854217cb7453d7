// =============================================================================
// Candle & Aggregator (C2)
// =============================================================================
//
// The Aggregator holds one current partial candle per configured timeframe
// and finalises it on boundary crossing, emitting `CandleClosed` /
// `CandleGap` events. Timeframes are processed in ascending duration order
// on every tick, which is what gives same-boundary `CandleClosed` events
// their required emission order (§4.2).
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tick::Tick;
use crate::timeframe::Timeframe;

/// An aggregated OHLCV bar for a fixed-duration timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub closed: bool,
}

impl Candle {
    fn opening(open_ts: i64, price: f64, volume: f64) -> Self {
        Self {
            open_ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            closed: false,
        }
    }

    fn absorb(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    /// True iff the OHLC ordering invariant holds: `low <= min(open,close)
    /// <= max(open,close) <= high`.
    pub fn is_ohlc_consistent(&self) -> bool {
        let lo = self.open.min(self.close);
        let hi = self.open.max(self.close);
        self.low <= lo && lo <= hi && hi <= self.high
    }

    /// Merge a set of closed candles of one timeframe into a single bar of a
    /// higher timeframe: first `open`, max `high`, min `low`, last `close`,
    /// summed `volume`. Used when higher frames are driven by consuming
    /// `CandleClosed(base)` events rather than raw ticks (§4.2).
    pub fn merge(open_ts: i64, parts: &[Candle]) -> Option<Candle> {
        let first = parts.first()?;
        let last = parts.last()?;
        let high = parts.iter().fold(f64::MIN, |acc, c| acc.max(c.high));
        let low = parts.iter().fold(f64::MAX, |acc, c| acc.min(c.low));
        let volume = parts.iter().map(|c| c.volume).sum();
        Some(Candle {
            open_ts,
            open: first.open,
            high,
            low,
            close: last.close,
            volume,
            closed: last.closed,
        })
    }
}

/// Event raised by the Aggregator while processing one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggregatorEvent {
    /// A candle for `timeframe` has finalised.
    CandleClosed { timeframe: String, candle: Candle },
    /// A timeframe boundary was skipped: `missing_to - missing_from` is a
    /// whole multiple of the timeframe duration. No candle is fabricated
    /// for the missing span.
    CandleGap {
        timeframe: String,
        missing_from: i64,
        missing_to: i64,
    },
}

/// Maintains one partial candle per configured timeframe and finalises them
/// on boundary crossings.
pub struct Aggregator {
    /// Timeframes in ascending duration order — this ordering is what makes
    /// same-boundary `CandleClosed` emission order deterministic.
    timeframes: Vec<Timeframe>,
    partials: HashMap<String, Candle>,
}

impl Aggregator {
    /// `timeframes` must already be validated (nested multiples) and will
    /// be sorted ascending by duration internally.
    pub fn new(mut timeframes: Vec<Timeframe>) -> Self {
        timeframes.sort_by_key(|tf| tf.duration_ms);
        Self {
            timeframes,
            partials: HashMap::new(),
        }
    }

    /// Process one validated tick, updating every configured timeframe and
    /// returning the events raised (in ascending-timeframe-duration order).
    pub fn on_tick(&mut self, tick: &Tick) -> Vec<AggregatorEvent> {
        let mut events = Vec::new();

        for tf in &self.timeframes {
            let boundary = tf.boundary(tick.ts);

            match self.partials.get_mut(&tf.label) {
                None => {
                    self.partials.insert(
                        tf.label.clone(),
                        Candle::opening(boundary, tick.price, tick.volume),
                    );
                }
                Some(partial) => {
                    if boundary > partial.open_ts {
                        let mut finished = *partial;
                        finished.closed = true;
                        let missing_from = finished.open_ts;
                        events.push(AggregatorEvent::CandleClosed {
                            timeframe: tf.label.clone(),
                            candle: finished,
                        });

                        if boundary - missing_from > tf.duration_ms {
                            events.push(AggregatorEvent::CandleGap {
                                timeframe: tf.label.clone(),
                                missing_from,
                                missing_to: boundary,
                            });
                        }

                        *partial = Candle::opening(boundary, tick.price, tick.volume);
                    } else {
                        partial.absorb(tick.price, tick.volume);
                    }
                }
            }
        }

        events
    }

    /// The current (possibly absent) partial candle for a timeframe.
    pub fn partial(&self, label: &str) -> Option<&Candle> {
        self.partials.get(label)
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn tfs() -> Vec<Timeframe> {
        vec![Timeframe::new("1m", 60_000), Timeframe::new("5m", 300_000)]
    }

    #[test]
    fn first_tick_opens_partial_no_events() {
        let mut agg = Aggregator::new(tfs());
        let events = agg.on_tick(&Tick::new(0, 100.0, 1.0));
        assert!(events.is_empty());
        let p = agg.partial("1m").unwrap();
        assert_eq!(p.open_ts, 0);
        assert!(!p.closed);
        assert_eq!(p.open, 100.0);
    }

    #[test]
    fn ticks_within_boundary_update_in_place() {
        let mut agg = Aggregator::new(tfs());
        agg.on_tick(&Tick::new(0, 100.0, 1.0));
        agg.on_tick(&Tick::new(30_000, 105.0, 2.0));
        agg.on_tick(&Tick::new(59_000, 95.0, 1.0));
        let p = agg.partial("1m").unwrap();
        assert_eq!(p.high, 105.0);
        assert_eq!(p.low, 95.0);
        assert_eq!(p.close, 95.0);
        assert_eq!(p.volume, 4.0);
        assert!(p.is_ohlc_consistent());
    }

    #[test]
    fn exact_boundary_closes_and_opens() {
        let mut agg = Aggregator::new(vec![Timeframe::new("1m", 60_000)]);
        agg.on_tick(&Tick::new(0, 100.0, 1.0));
        let events = agg.on_tick(&Tick::new(60_000, 110.0, 1.0));
        assert_eq!(events.len(), 1);
        match &events[0] {
            AggregatorEvent::CandleClosed { timeframe, candle } => {
                assert_eq!(timeframe, "1m");
                assert_eq!(candle.open_ts, 0);
                assert!(candle.closed);
                assert_eq!(candle.close, 100.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        let p = agg.partial("1m").unwrap();
        assert_eq!(p.open_ts, 60_000);
        assert!(!p.closed);
    }

    #[test]
    fn ascending_duration_emission_order_on_shared_boundary() {
        let mut agg = Aggregator::new(tfs());
        agg.on_tick(&Tick::new(0, 100.0, 1.0));
        // Advance past both the 1m and 5m boundary at once.
        let events = agg.on_tick(&Tick::new(300_000, 110.0, 1.0));
        let labels: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                AggregatorEvent::CandleClosed { timeframe, .. } => Some(timeframe.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["1m", "5m"]);
    }

    #[test]
    fn gap_detected_on_skipped_boundaries() {
        let mut agg = Aggregator::new(vec![Timeframe::new("1m", 60_000)]);
        agg.on_tick(&Tick::new(0, 100.0, 1.0));
        agg.on_tick(&Tick::new(60_000, 101.0, 1.0)); // closes [0,60000), no gap
        let events = agg.on_tick(&Tick::new(360_000, 102.0, 1.0));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AggregatorEvent::CandleClosed { .. }));
        match &events[1] {
            AggregatorEvent::CandleGap {
                timeframe,
                missing_from,
                missing_to,
            } => {
                assert_eq!(timeframe, "1m");
                assert_eq!(*missing_from, 60_000);
                assert_eq!(*missing_to, 360_000);
                assert_eq!(missing_to - missing_from, 5 * 60_000);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn no_gap_on_consecutive_boundaries() {
        let mut agg = Aggregator::new(vec![Timeframe::new("1m", 60_000)]);
        agg.on_tick(&Tick::new(0, 100.0, 1.0));
        let events = agg.on_tick(&Tick::new(60_000, 101.0, 1.0));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AggregatorEvent::CandleClosed { .. }));
    }

    #[test]
    fn equal_timestamps_do_not_violate_state() {
        let mut agg = Aggregator::new(vec![Timeframe::new("1m", 60_000)]);
        agg.on_tick(&Tick::new(1_000, 100.0, 1.0));
        agg.on_tick(&Tick::new(1_000, 101.0, 1.0));
        let p = agg.partial("1m").unwrap();
        assert_eq!(p.high, 101.0);
        assert_eq!(p.volume, 2.0);
    }

    #[test]
    fn candle_ohlc_invariant_holds_after_many_ticks() {
        let mut agg = Aggregator::new(vec![Timeframe::new("1m", 60_000)]);
        let prices = [100.0, 95.0, 110.0, 90.0, 105.0];
        for (i, p) in prices.iter().enumerate() {
            agg.on_tick(&Tick::new(i as i64 * 1_000, *p, 1.0));
        }
        let partial = agg.partial("1m").unwrap();
        assert!(partial.is_ohlc_consistent());
        assert_eq!(partial.high, 110.0);
        assert_eq!(partial.low, 90.0);
    }

    #[test]
    fn merge_produces_higher_timeframe_bar() {
        let parts = vec![
            Candle {
                open_ts: 0,
                open: 100.0,
                high: 105.0,
                low: 99.0,
                close: 102.0,
                volume: 10.0,
                closed: true,
            },
            Candle {
                open_ts: 60_000,
                open: 102.0,
                high: 108.0,
                low: 101.0,
                close: 107.0,
                volume: 5.0,
                closed: true,
            },
        ];
        let merged = Candle::merge(0, &parts).unwrap();
        assert_eq!(merged.open, 100.0);
        assert_eq!(merged.close, 107.0);
        assert_eq!(merged.high, 108.0);
        assert_eq!(merged.low, 99.0);
        assert_eq!(merged.volume, 15.0);
    }

    #[test]
    fn only_one_open_partial_per_timeframe() {
        let mut agg = Aggregator::new(tfs());
        agg.on_tick(&Tick::new(0, 100.0, 1.0));
        assert!(agg.partial("1m").is_some());
        assert!(agg.partial("5m").is_some());
        assert!(!agg.partial("1m").unwrap().closed);
    }
}
