// =============================================================================
// Binance aggTrade Stream — live TickSource collaborator
// =============================================================================
//
// Connects to the public Binance aggTrade WebSocket for one symbol and
// forwards parsed trades through an unbounded channel, adapted from the
// teacher's `market_data::trade_stream::run_trade_stream` /
// `parse_agg_trade` pair. The engine core only knows the synchronous
// `TickSource` trait (§6), so the async socket read runs on its own tokio
// task and `next()` drains whatever has arrived without blocking — an idle
// channel is `Ok(None)`, not an error.
// =============================================================================

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};

use crate::collaborators::TickSource;
use crate::errors::SourceError;

const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(3);

/// Live [`TickSource`] backed by the Binance aggTrade WebSocket.
pub struct BinanceTickSource {
    symbol: String,
    rx: UnboundedReceiver<(i64, f64, f64)>,
    task: JoinHandle<()>,
    closed: bool,
}

impl BinanceTickSource {
    /// Spawn the background connection task and return a handle to it.
    pub fn spawn(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let task_symbol = symbol.clone();
        let task = tokio::spawn(async move {
            run_reconnecting(&task_symbol, tx).await;
        });
        Self {
            symbol,
            rx,
            task,
            closed: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl TickSource for BinanceTickSource {
    fn next(&mut self) -> Result<Option<(i64, f64, f64)>, SourceError> {
        if self.closed {
            return Err(SourceError::Disconnected("source closed".to_string()));
        }
        match self.rx.try_recv() {
            Ok(tick) => Ok(Some(tick)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Err(SourceError::Disconnected("stream task ended".to_string()))
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.task.abort();
    }
}

/// Reconnect indefinitely with a fixed delay between attempts. Returns only
/// when the channel receiver has been dropped.
async fn run_reconnecting(symbol: &str, tx: UnboundedSender<(i64, f64, f64)>) {
    loop {
        if tx.is_closed() {
            return;
        }
        match run_trade_stream(symbol, &tx).await {
            Ok(()) => warn!(symbol = %symbol, "trade stream ended cleanly, reconnecting"),
            Err(e) => error!(symbol = %symbol, error = %e, "trade stream error, reconnecting"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_trade_stream(symbol: &str, tx: &UnboundedSender<(i64, f64, f64)>) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!("wss://stream.binance.com:9443/ws/{lower}@aggTrade");
    info!(url = %url, symbol = %symbol, "connecting to trade WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to trade WebSocket")?;

    info!(symbol = %symbol, "trade WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_agg_trade(&text) {
                        Ok(tick) => {
                            if tx.send(tick).is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to parse aggTrade message"),
                    }
                }
            }
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "trade WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "trade WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse a Binance aggTrade message into `(ts, price, volume)`.
///
/// Expected shape:
/// ```json
/// { "e": "aggTrade", "s": "BTCUSDT", "p": "37000.00", "q": "0.123", "T": 123456789 }
/// ```
fn parse_agg_trade(text: &str) -> Result<(i64, f64, f64)> {
    let root: serde_json::Value = serde_json::from_str(text).context("failed to parse aggTrade JSON")?;

    let ts = root["T"].as_i64().context("missing field T")?;

    let price: f64 = root["p"]
        .as_str()
        .context("missing field p")?
        .parse()
        .context("failed to parse price")?;

    let quantity: f64 = root["q"]
        .as_str()
        .context("missing field q")?
        .parse()
        .context("failed to parse quantity")?;

    Ok((ts, price, quantity))
}
