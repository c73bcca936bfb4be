//! Price feed types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single price tick from an exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Trade price
    pub price: Decimal,
    /// Local timestamp when tick was received
    pub timestamp: DateTime<Utc>,
    /// Exchange timestamp (e.g., Binance trade time)
    pub exchange_ts: DateTime<Utc>,
}

/// Feed errors
///
/// Transport failures are handled inside the feed task and never reach the
/// subscriber; these only surface from `subscribe` or the connection loop.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("feed already subscribed")]
    AlreadySubscribed,
}
