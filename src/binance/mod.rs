// =============================================================================
// Binance Collaborator — live market data for one perpetual instrument
// =============================================================================
//
// Read-only: this module only ever consumes the public aggTrade stream. No
// account, order-placement, or signed-request functionality is in scope
// (§6 Non-goals) — there is deliberately no REST client here.
// =============================================================================

pub mod stream;

pub use stream::BinanceTickSource;
