// =============================================================================
// Dashboard API — read-only REST + WebSocket surface
// =============================================================================
//
// Local inspection only (§10.4): pipeline health, current regime/coherence
// per timeframe, recent triggers, recent rejected ticks/gaps/resets. Issues
// no orders and exposes no control surface over the Fusion Engine itself.
// =============================================================================

pub mod auth;
pub mod rest;
pub mod ws;
