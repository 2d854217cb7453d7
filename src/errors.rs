// =============================================================================
// Error Taxonomy — closed sum types for the signal pipeline
// =============================================================================
//
// Only `ConfigError` is ever surfaced to a construction caller as a `Result`
// error. Every other kind here is recovered locally by the component that
// raised it and is instead observable through the pipeline's event stream
// (see `events.rs`) and through counters — no exception-like unwinding is
// permitted on the pipeline's critical path.
// =============================================================================

use thiserror::Error;

/// Why a raw tick was rejected by the Tick Validator (C1).
///
/// Rejections are non-fatal: the tick is dropped, a counter is incremented,
/// and the pipeline continues from its last accepted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TickRejection {
    #[error("price is not finite")]
    NonFinite,
    #[error("price is not positive")]
    NonPositivePrice,
    #[error("volume is negative")]
    NegativeVolume,
    #[error("timestamp is out of order")]
    OutOfOrder,
}

/// Invalid pipeline configuration, detected at construction time.
///
/// This is the only error kind that halts construction rather than being
/// recovered locally.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("timeframe list is empty")]
    NoTimeframes,

    #[error("timeframe {label:?} has non-positive duration")]
    NonPositiveDuration { label: String },

    #[error(
        "timeframe {hi_label:?} ({hi_ms}ms) is not an integer multiple of base timeframe {base_label:?} ({base_ms}ms)"
    )]
    NotNestedMultiple {
        base_label: String,
        base_ms: i64,
        hi_label: String,
        hi_ms: i64,
    },

    #[error("duplicate timeframe label {label:?}")]
    DuplicateTimeframe { label: String },

    #[error("ring_capacity for {label:?} must be positive, got {capacity}")]
    NonPositiveRingCapacity { label: String, capacity: usize },

    #[error("kalman parameter {name} must be positive, got {value}")]
    NonPositiveKalmanParam { name: &'static str, value: f64 },

    #[error("kalman scale_min ({scale_min}) must be <= scale_max ({scale_max})")]
    InvalidScaleRange { scale_min: f64, scale_max: f64 },

    #[error("fusion threshold {name} must lie in [0, 1], got {value}")]
    FusionThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("missing risk parameters for regime {regime:?}")]
    MissingRiskParams { regime: String },

    #[error("tf_ranks entry missing for timeframe {label:?}")]
    MissingTimeframeRank { label: String },
}

/// Classification of an `OrderSink::submit` failure.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// Worth retrying once at the next fused decision.
    #[error("transient sink failure: {0}")]
    Transient(String),
    /// Drop the trigger and raise an alert; retrying will not help.
    #[error("permanent sink failure: {0}")]
    Permanent(String),
}

/// A recoverable failure from the `TickSource` collaborator.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("tick source disconnected: {0}")]
    Disconnected(String),
    #[error("tick source read timed out")]
    Timeout,
}
