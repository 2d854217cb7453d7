// =============================================================================
// pulse-engine — Main Entry Point
// =============================================================================
//
// Demo mode by default: a synthetic `ReplayTickSource` drives the pipeline
// and a `LoggingOrderSink` simulates fills, so the whole critical path runs
// with no exchange connectivity at all. Set `PULSE_LIVE=1` to instead stream
// the configured symbol's real Binance aggTrade feed through the same
// pipeline — "Demo mode before Live mode" (§11), the same posture the
// teacher's main.rs enforces via `AccountMode::Demo`/`TradingMode::Paused`
// on startup.
// =============================================================================

mod api;
mod app_state;
mod binance;
mod candle;
mod collaborators;
mod config;
mod decision;
mod errors;
mod events;
mod fusion;
mod kalman;
mod pipeline;
mod ring;
mod risk;
mod signals;
mod tick;
mod timeframe;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::{AppState, RiskLimits};
use crate::binance::BinanceTickSource;
use crate::collaborators::{LoggingOrderSink, OrderSink, ReplayTickSource, TickSource};
use crate::config::PipelineConfig;
use crate::fusion::TriggerAction;

const CONFIG_PATH: &str = "pulse_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("pulse-engine starting up");

    let config = PipelineConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load pipeline config, using defaults");
        PipelineConfig::default()
    });

    let symbol = std::env::var("PULSE_SYMBOL").unwrap_or_else(|_| "BTCUSDT".to_string());
    let live = std::env::var("PULSE_LIVE").map(|v| v == "1").unwrap_or(false);

    info!(symbol = %symbol, live, "configuration resolved");

    let state = Arc::new(AppState::new(symbol.clone(), config, RiskLimits::default())?);

    // ── Dashboard server ─────────────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr = std::env::var("PULSE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "failed to bind dashboard server");
                return;
            }
        };
        info!(addr = %bind_addr, "dashboard listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "dashboard server failed");
        }
    });

    // ── Tick source + order loop ─────────────────────────────────────────
    let mut sink = LoggingOrderSink::new();

    if live {
        info!(symbol = %symbol, "starting live Binance feed");
        let mut source = BinanceTickSource::spawn(symbol.clone());
        run_order_loop(&state, &mut source, &mut sink).await;
    } else {
        info!("starting demo replay feed");
        let mut source = ReplayTickSource::linear_ramp(100.0, 130.0, 3_000, 6_000, 1.0);
        run_order_loop(&state, &mut source, &mut sink).await;
    }

    info!("pulse-engine shut down complete");
    Ok(())
}

/// Drain the tick source, feed the pipeline, and forward any emitted
/// `Trigger` to the order sink — but only once the auxiliary risk gate
/// (`AppState::check_entry_permission`) agrees an entry is permitted. Exits
/// when the source disconnects or Ctrl+C is received.
async fn run_order_loop(state: &Arc<AppState>, source: &mut dyn TickSource, sink: &mut dyn OrderSink) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(25)) => {}
        }

        match source.next() {
            Ok(Some((ts, price, volume))) => {
                let outcome = state.process_tick(ts, price, volume);

                if let Some(trigger) = outcome.trigger {
                    if matches!(
                        trigger.action,
                        TriggerAction::EnterLong | TriggerAction::EnterShort
                    ) {
                        let (allowed, reason) = state.check_entry_permission();
                        if !allowed {
                            info!(reason = ?reason, "risk gate blocked entry");
                            continue;
                        }
                    }
                    if let Err(e) = sink.submit(&trigger) {
                        warn!(error = %e, "order sink rejected trigger");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "tick source disconnected");
                break;
            }
        }
    }

    source.close();
    sink.close();
}
