// =============================================================================
// Tick Source — combined multi-symbol Binance futures trade feed
// =============================================================================
//
// Grounded on `market_data/trade_stream.rs::run_trade_stream`, but subscribes
// to Binance's *combined* stream endpoint (one connection covering every
// configured symbol) instead of one connection per symbol — the structural
// change §4.A/§9 require of that file's shape. Validation mirrors
// `original_source/binance_client.py::_handle_message`'s field checks.
//
// A single connection attempt lives in `run_once`; the caller (the
// orchestrator) owns the exponential-backoff reconnect loop, matching
// `main.rs`'s `loop { if let Err(e) = run(...).await { error!(...) } sleep }`
// idiom generalized to backoff per §4.A.
// =============================================================================

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::types::Tick;

const PING_INTERVAL: Duration = Duration::from_secs(20);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of parsing one inbound frame.
#[derive(Debug, PartialEq)]
pub enum FrameOutcome {
    Tick(Tick),
    /// Non-trade event, `X == "NA"`, untracked symbol, or an out-of-range
    /// field — dropped silently at the call site with a warning, not an error.
    Ignored,
}

/// Combined-stream trade feed. Owns the subscriber registry and the running
/// flag; connection lifecycle is driven by `run_once`.
pub struct TickSource {
    symbols: Vec<String>,
    tracked: HashSet<String>,
    subscribers: RwLock<Vec<mpsc::Sender<Tick>>>,
    running: AtomicBool,
}

impl TickSource {
    pub fn new(symbols: Vec<String>) -> Self {
        let tracked = symbols.iter().cloned().collect();
        Self {
            symbols,
            tracked,
            subscribers: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Register a new tick subscriber with a bounded channel.
    pub fn register(&self, capacity: usize) -> mpsc::Receiver<Tick> {
        let (tx, rx) = mpsc::channel(capacity);
        self.subscribers.write().push(tx);
        rx
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Request the current (or next) `run_once` call to exit its read loop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// One connection attempt: connect, read until error/close/stop request,
    /// return. The caller is responsible for backoff and retrying.
    pub async fn run_once(&self) -> Result<()> {
        let url = combined_stream_url(&self.symbols);
        info!(url = %url, symbols = ?self.symbols, "connecting to combined trade stream");

        let (ws_stream, _response) = connect_async(&url)
            .await
            .context("failed to connect to combined trade WebSocket")?;
        self.running.store(true, Ordering::Relaxed);
        info!("combined trade stream connected");

        let (mut write, mut read) = ws_stream.split();
        let mut ping_ticker = tokio::time::interval(PING_INTERVAL);
        ping_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_pong = Instant::now();

        loop {
            if !self.is_running() {
                let _ = write.close().await;
                return Ok(());
            }

            tokio::select! {
                _ = ping_ticker.tick() => {
                    if last_pong.elapsed() > PING_INTERVAL + PONG_TIMEOUT {
                        warn!("pong watchdog expired, forcing reconnect");
                        return Err(anyhow!("keepalive pong watchdog expired"));
                    }
                    if write.send(Message::Ping(Vec::new())).await.is_err() {
                        return Err(anyhow!("failed to send keepalive ping"));
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match parse_trade_frame(&text, &self.tracked) {
                                Ok(FrameOutcome::Tick(tick)) => self.publish(tick),
                                Ok(FrameOutcome::Ignored) => {}
                                Err(e) => warn!(error = %e, "dropping malformed trade frame"),
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_pong = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("combined trade stream closed by peer");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "combined trade stream read error");
                            return Err(e.into());
                        }
                    }
                }
            }
        }
    }

    fn publish(&self, tick: Tick) {
        let subscribers = self.subscribers.read();
        for tx in subscribers.iter() {
            if tx.try_send(tick.clone()).is_err() {
                debug!(symbol = %tick.symbol, "tick subscriber channel full or closed, dropping for that subscriber");
            }
        }
    }
}

fn combined_stream_url(symbols: &[String]) -> String {
    let streams = symbols
        .iter()
        .map(|s| format!("{}@trade", s.to_lowercase()))
        .collect::<Vec<_>>()
        .join("/");
    format!("wss://fstream.binance.com/stream?streams={streams}")
}

/// Parse one combined-stream frame, validating per §4.A /
/// `binance_client.py::_handle_message`.
pub fn parse_trade_frame(text: &str, tracked: &HashSet<String>) -> Result<FrameOutcome> {
    let root: Value = serde_json::from_str(text).context("failed to parse trade frame JSON")?;
    let data = root.get("data").context("frame missing data field")?;

    let event = data.get("e").and_then(Value::as_str).unwrap_or("");
    if event != "trade" {
        return Ok(FrameOutcome::Ignored);
    }
    if data.get("X").and_then(Value::as_str) == Some("NA") {
        return Ok(FrameOutcome::Ignored);
    }

    let symbol = match data.get("s").and_then(Value::as_str) {
        Some(s) => s.to_uppercase(),
        None => return Err(anyhow!("frame missing symbol field")),
    };
    if !tracked.contains(&symbol) {
        warn!(symbol = %symbol, "dropping trade for untracked symbol");
        return Ok(FrameOutcome::Ignored);
    }

    let price: f64 = match data.get("p").and_then(Value::as_str) {
        Some(p) => p.parse().context("failed to parse price")?,
        None => return Err(anyhow!("frame missing price field")),
    };
    let quantity: f64 = match data.get("q").and_then(Value::as_str) {
        Some(q) => q.parse().context("failed to parse quantity")?,
        None => return Err(anyhow!("frame missing quantity field")),
    };
    let trade_time_ms = match data.get("T").and_then(Value::as_i64) {
        Some(t) => t,
        None => return Err(anyhow!("frame missing trade time field")),
    };

    if price <= 0.0 || trade_time_ms <= 0 {
        warn!(symbol = %symbol, price, trade_time_ms, "dropping trade with out-of-range fields");
        return Ok(FrameOutcome::Ignored);
    }

    Ok(FrameOutcome::Tick(Tick {
        symbol,
        price,
        quantity,
        trade_time_ms,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked() -> HashSet<String> {
        ["BTCUSDT".to_string(), "ETHUSDT".to_string()].into_iter().collect()
    }

    #[test]
    fn normalizes_a_well_formed_frame() {
        let text = r#"{"stream":"btcusdt@trade","data":{"e":"trade","s":"BTCUSDT","p":"67521.45","q":"0.1","T":1700000000000,"X":"MARKET"}}"#;
        let outcome = parse_trade_frame(text, &tracked()).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Tick(Tick {
                symbol: "BTCUSDT".to_string(),
                price: 67521.45,
                quantity: 0.1,
                trade_time_ms: 1700000000000,
            })
        );
    }

    #[test]
    fn ignores_non_trade_events() {
        let text = r#"{"stream":"btcusdt@depth","data":{"e":"depthUpdate","s":"BTCUSDT"}}"#;
        assert_eq!(parse_trade_frame(text, &tracked()).unwrap(), FrameOutcome::Ignored);
    }

    #[test]
    fn ignores_na_trades() {
        let text = r#"{"stream":"btcusdt@trade","data":{"e":"trade","s":"BTCUSDT","p":"100.0","q":"1.0","T":1,"X":"NA"}}"#;
        assert_eq!(parse_trade_frame(text, &tracked()).unwrap(), FrameOutcome::Ignored);
    }

    #[test]
    fn drops_untracked_symbol() {
        let text = r#"{"stream":"xrpusdt@trade","data":{"e":"trade","s":"XRPUSDT","p":"1.0","q":"1.0","T":1}}"#;
        assert_eq!(parse_trade_frame(text, &tracked()).unwrap(), FrameOutcome::Ignored);
    }

    #[test]
    fn drops_non_positive_price() {
        let text = r#"{"stream":"btcusdt@trade","data":{"e":"trade","s":"BTCUSDT","p":"0","q":"1.0","T":1}}"#;
        assert_eq!(parse_trade_frame(text, &tracked()).unwrap(), FrameOutcome::Ignored);
    }

    #[test]
    fn errors_on_missing_price_field() {
        let text = r#"{"stream":"btcusdt@trade","data":{"e":"trade","s":"BTCUSDT","q":"1.0","T":1}}"#;
        assert!(parse_trade_frame(text, &tracked()).is_err());
    }

    #[test]
    fn errors_on_malformed_json() {
        assert!(parse_trade_frame("not json", &tracked()).is_err());
    }

    #[test]
    fn combined_url_joins_all_symbols() {
        let url = combined_stream_url(&["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
        assert_eq!(url, "wss://fstream.binance.com/stream?streams=btcusdt@trade/ethusdt@trade");
    }

    #[test]
    fn register_returns_a_working_channel() {
        let source = TickSource::new(vec!["BTCUSDT".to_string()]);
        let mut rx = source.register(4);
        source.publish(Tick {
            symbol: "BTCUSDT".to_string(),
            price: 1.0,
            quantity: 1.0,
            trade_time_ms: 1,
        });
        assert!(rx.try_recv().is_ok());
    }
}
