// =============================================================================
// pulse-engine — streaming Kalman-fusion signal engine
// =============================================================================
//
// Library root. `main.rs` wires this into a binary (demo replay or live
// Binance feed plus a read-only dashboard); `tests/` exercises the same
// public surface end to end.
// =============================================================================

pub mod api;
pub mod app_state;
pub mod binance;
pub mod candle;
pub mod collaborators;
pub mod config;
pub mod decision;
pub mod errors;
pub mod events;
pub mod fusion;
pub mod kalman;
pub mod pipeline;
pub mod ring;
pub mod risk;
pub mod signals;
pub mod tick;
pub mod timeframe;

pub use app_state::AppState;
pub use pipeline::Pipeline;
