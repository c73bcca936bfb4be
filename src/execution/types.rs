//! Execution types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::TradeId;
use crate::market::Side;

/// Order direction on the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Buy => "BUY",
            OrderAction::Sell => "SELL",
        }
    }
}

/// An entry order to be submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Our trade id, used as the client order id
    pub client_order_id: TradeId,
    pub market_id: String,
    pub side: Side,
    /// USD to spend
    pub size_usd: Decimal,
    pub limit_price: Decimal,
    /// Fair value estimate passed along to venues that record it
    pub fair_value: Option<Decimal>,
}

/// Confirmed entry fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFill {
    pub order_id: String,
    pub price: Decimal,
    pub shares: Decimal,
    pub fees: Decimal,
    pub filled_at: DateTime<Utc>,
}

/// Confirmed exit fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitFill {
    pub order_id: String,
    pub price: Decimal,
    pub shares: Decimal,
    pub fees: Decimal,
    pub filled_at: DateTime<Utc>,
}

/// A position as reported by the venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub market_id: String,
    pub side: Side,
    pub shares: Decimal,
    pub avg_price: Decimal,
    pub current_price: Decimal,
}

/// Account snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: Decimal,
    pub total_value: Decimal,
    pub positions: Vec<PortfolioPosition>,
}

impl Portfolio {
    /// Whether the venue reports shares held in a market
    pub fn holds(&self, market_id: &str) -> bool {
        self.positions
            .iter()
            .any(|p| p.market_id == market_id && p.shares > Decimal::ZERO)
    }

    /// Held position on one outcome of a market
    pub fn position(&self, market_id: &str, side: Side) -> Option<&PortfolioPosition> {
        self.positions
            .iter()
            .find(|p| p.market_id == market_id && p.side == side && p.shares > Decimal::ZERO)
    }
}

/// Execution errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// Venue refused the order; retrying the same order will not help
    #[error("order rejected: {0}")]
    Rejected(String),
    /// Network or venue hiccup; safe to retry
    #[error("transient execution error: {0}")]
    Transient(String),
    #[error("execution timed out")]
    Timeout,
}

impl ExecutionError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExecutionError::Rejected(_))
    }
}
