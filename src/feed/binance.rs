//! Binance WebSocket price feed implementation
//!
//! One background task owns the socket. It reconnects forever with
//! exponential backoff, so the subscriber only ever sees ticks.

use super::{FeedError, PriceFeed, PriceTick};
use crate::telemetry::{self, CounterMetric};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Binance WebSocket base URL
const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/ws";

/// Binance trade message structure
#[derive(Debug, Deserialize)]
struct BinanceTradeMessage {
    /// Event type
    #[serde(rename = "e")]
    event_type: String,
    /// Symbol
    #[serde(rename = "s")]
    symbol: String,
    /// Price
    #[serde(rename = "p")]
    price: String,
    /// Trade time (milliseconds)
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Reconnect and keepalive timing
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub ping_interval: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// How a single connection ended
enum StreamEnd {
    /// Server closed the socket; reconnect
    Closed,
    /// Subscriber dropped the receiver; stop for good
    ReceiverGone,
}

/// Binance WebSocket feed for the `<symbol>@trade` stream
pub struct BinanceFeed {
    symbol: String,
    url: String,
    capacity: usize,
    backoff: BackoffConfig,
}

impl BinanceFeed {
    /// Create a new Binance feed for the given symbol
    pub fn new(symbol: impl Into<String>, capacity: usize) -> Self {
        let symbol = symbol.into().to_lowercase();
        Self {
            url: format!("{}/{}@trade", BINANCE_WS_URL, symbol),
            symbol,
            capacity: capacity.max(1),
            backoff: BackoffConfig::default(),
        }
    }

    /// Point the feed at a different endpoint
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Parse a Binance trade message into a PriceTick
    fn parse_message(msg: &str) -> Option<PriceTick> {
        let trade: BinanceTradeMessage = serde_json::from_str(msg).ok()?;

        if trade.event_type != "trade" {
            return None;
        }

        let price = Decimal::from_str(&trade.price).ok()?;
        if price <= Decimal::ZERO {
            return None;
        }
        let exchange_ts = Utc.timestamp_millis_opt(trade.trade_time).single()?;

        Some(PriceTick {
            symbol: trade.symbol,
            price,
            timestamp: Utc::now(),
            exchange_ts,
        })
    }

    /// Forward a raw text frame; returns false once the receiver is gone
    fn forward(text: &str, tx: &mpsc::Sender<PriceTick>) -> bool {
        let Some(tick) = Self::parse_message(text) else {
            tracing::trace!("Ignoring unparsable feed message");
            return true;
        };

        match tx.try_send(tick) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                telemetry::incr(CounterMetric::FeedTicksDropped);
                tracing::debug!("Feed channel full, dropping tick");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Reconnect loop; exits only when the subscriber goes away
    async fn run(url: String, backoff: BackoffConfig, tx: mpsc::Sender<PriceTick>) {
        let mut attempt: u32 = 0;
        let mut delay = backoff.initial_delay;

        loop {
            match Self::connect_and_stream(&url, &backoff, &tx, &mut attempt).await {
                Ok(StreamEnd::ReceiverGone) => {
                    tracing::debug!("Tick receiver dropped, stopping feed");
                    return;
                }
                Ok(StreamEnd::Closed) => {
                    tracing::info!("Binance feed closed by server");
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Binance feed error");
                }
            }

            if tx.is_closed() {
                return;
            }

            // A connection that got established starts the backoff over
            if attempt == 0 {
                delay = backoff.initial_delay;
            }
            attempt += 1;
            telemetry::incr(CounterMetric::FeedReconnects);
            tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "Binance feed reconnecting");

            sleep(delay).await;
            delay = (delay * 2).min(backoff.max_delay);
        }
    }

    async fn connect_and_stream(
        url: &str,
        backoff: &BackoffConfig,
        tx: &mpsc::Sender<PriceTick>,
        attempt: &mut u32,
    ) -> Result<StreamEnd, FeedError> {
        tracing::info!(url, "Connecting to Binance feed");

        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        tracing::info!("Binance feed connected");
        *attempt = 0;

        let mut ping_interval = tokio::time::interval(backoff.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ping_interval.tick().await;
        let mut waiting_for_pong = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !Self::forward(&text, tx) {
                                return Ok(StreamEnd::ReceiverGone);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| FeedError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(_))) => {
                            return Ok(StreamEnd::Closed);
                        }
                        Some(Err(e)) => {
                            return Err(FeedError::ConnectionFailed(e.to_string()));
                        }
                        None => {
                            return Err(FeedError::ConnectionFailed("stream ended unexpectedly".into()));
                        }
                        _ => {}
                    }
                }

                _ = ping_interval.tick() => {
                    if waiting_for_pong {
                        return Err(FeedError::ConnectionFailed("pong timeout".into()));
                    }
                    write.send(Message::Ping(vec![])).await
                        .map_err(|e| FeedError::SendFailed(e.to_string()))?;
                    waiting_for_pong = true;
                }

                _ = tx.closed() => {
                    return Ok(StreamEnd::ReceiverGone);
                }
            }
        }
    }
}

#[async_trait]
impl PriceFeed for BinanceFeed {
    async fn subscribe(&self) -> Result<mpsc::Receiver<PriceTick>, FeedError> {
        let (tick_tx, tick_rx) = mpsc::channel(self.capacity);

        tracing::info!(symbol = %self.symbol, "Subscribing to Binance feed");
        tokio::spawn(Self::run(self.url.clone(), self.backoff.clone(), tick_tx));

        Ok(tick_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binance_feed_uppercase_symbol() {
        let feed = BinanceFeed::new("BTCUSDT", 16);
        assert_eq!(feed.symbol, "btcusdt");
        assert_eq!(feed.url(), "wss://stream.binance.com:9443/ws/btcusdt@trade");
    }

    #[test]
    fn test_parse_valid_trade_message() {
        let msg = r#"{
            "e": "trade",
            "E": 1704067200000,
            "s": "BTCUSDT",
            "t": 123456789,
            "p": "42500.50",
            "q": "0.001",
            "T": 1704067200123
        }"#;

        let tick = BinanceFeed::parse_message(msg).unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, Decimal::from_str("42500.50").unwrap());
        assert_eq!(tick.exchange_ts.timestamp_millis(), 1704067200123);
    }

    #[test]
    fn test_parse_invalid_event_type() {
        let msg = r#"{"e":"aggTrade","E":1,"s":"BTCUSDT","t":1,"p":"42500.50","q":"0.001","T":1}"#;
        assert!(BinanceFeed::parse_message(msg).is_none());
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(BinanceFeed::parse_message("not valid json").is_none());
    }

    #[test]
    fn test_parse_invalid_price() {
        let msg = r#"{"e":"trade","E":1,"s":"BTCUSDT","t":1,"p":"not_a_number","q":"0.001","T":1}"#;
        assert!(BinanceFeed::parse_message(msg).is_none());

        let zero = r#"{"e":"trade","E":1,"s":"BTCUSDT","t":1,"p":"0","q":"0.001","T":1}"#;
        assert!(BinanceFeed::parse_message(zero).is_none());
    }

    #[test]
    fn test_forward_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let msg = r#"{"e":"trade","E":1,"s":"BTCUSDT","t":1,"p":"100.00","q":"0.001","T":1}"#;

        assert!(BinanceFeed::forward(msg, &tx));
        assert!(BinanceFeed::forward(msg, &tx));
        assert!(BinanceFeed::forward("garbage", &tx));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        drop(rx);
        assert!(!BinanceFeed::forward(msg, &tx));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_keeps_receiver_open() {
        let feed = BinanceFeed::new("btcusdt", 8)
            .with_url("ws://127.0.0.1:1/ws")
            .with_backoff(BackoffConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                ping_interval: Duration::from_secs(30),
            });

        let mut rx = feed.subscribe().await.unwrap();

        // Connection failures are retried inside the task; the channel
        // stays open with nothing in it
        let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(result.is_err());
    }
}
