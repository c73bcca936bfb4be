//! Trade lifecycle types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::decision::EntryDecision;
use crate::market::Side;

/// Trade identifier (UUID v4, hyphenated)
pub type TradeId = String;

/// Exit reason recorded when an exit exhausts its attempts
pub const EXIT_FAILED: &str = "exit_failed";
/// Exit reason recorded when the venue refuses the entry order
pub const ENTRY_REJECTED: &str = "entry_rejected";

/// Trade state machine
///
/// ```text
/// Intended -> Submitted -> Open -> ExitRequested -> Closed
///                 |                      |
///                 +------> Failed <------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeState {
    Intended,
    Submitted,
    Open,
    ExitRequested,
    Closed,
    Failed,
}

impl TradeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeState::Intended => "INTENDED",
            TradeState::Submitted => "SUBMITTED",
            TradeState::Open => "OPEN",
            TradeState::ExitRequested => "EXIT_REQUESTED",
            TradeState::Closed => "CLOSED",
            TradeState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INTENDED" => Some(TradeState::Intended),
            "SUBMITTED" => Some(TradeState::Submitted),
            "OPEN" => Some(TradeState::Open),
            "EXIT_REQUESTED" => Some(TradeState::ExitRequested),
            "CLOSED" => Some(TradeState::Closed),
            "FAILED" => Some(TradeState::Failed),
            _ => None,
        }
    }

    /// Terminal states release the market for new entries
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeState::Closed | TradeState::Failed)
    }

    pub fn can_transition_to(&self, next: TradeState) -> bool {
        use TradeState::*;
        matches!(
            (self, next),
            (Intended, Submitted)
                | (Submitted, Open)
                | (Submitted, Failed)
                | (Open, ExitRequested)
                | (ExitRequested, Closed)
                | (ExitRequested, Failed)
        )
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One round trip on one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub market_id: String,
    pub side: Side,
    pub state: TradeState,
    pub size_usd: Decimal,
    /// Shares held; estimated from the limit price until the entry fills
    pub qty: Decimal,
    /// Limit price until the entry fills, then the fill price
    pub price_entry: Decimal,
    pub price_exit: Option<Decimal>,
    pub ts_entry: DateTime<Utc>,
    pub ts_exit: Option<DateTime<Utc>>,
    pub resolves_at: Option<DateTime<Utc>>,
    pub exit_reason: Option<String>,
    pub pnl: Option<Decimal>,
    pub fees_estimated: Decimal,
    pub order_id_entry: Option<String>,
    pub order_id_exit: Option<String>,
    pub exit_attempts: u32,
    /// Latest quoted price of the held outcome
    pub last_mark: Option<Decimal>,
    pub signal_bps: Decimal,
    pub edge_estimate: Decimal,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    pub fn new(
        market_id: &str,
        side: Side,
        size_usd: Decimal,
        price_entry: Decimal,
        resolves_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let qty = if price_entry > Decimal::ZERO {
            (size_usd / price_entry).round_dp(6)
        } else {
            Decimal::ZERO
        };

        Self {
            trade_id: uuid::Uuid::new_v4().to_string(),
            market_id: market_id.to_string(),
            side,
            state: TradeState::Intended,
            size_usd,
            qty,
            price_entry,
            price_exit: None,
            ts_entry: now,
            ts_exit: None,
            resolves_at,
            exit_reason: None,
            pnl: None,
            fees_estimated: Decimal::ZERO,
            order_id_entry: None,
            order_id_exit: None,
            exit_attempts: 0,
            last_mark: None,
            signal_bps: Decimal::ZERO,
            edge_estimate: Decimal::ZERO,
            notes: None,
            updated_at: now,
        }
    }

    pub fn from_decision(decision: &EntryDecision, now: DateTime<Utc>) -> Self {
        let mut trade = Self::new(
            &decision.market_id,
            decision.side,
            decision.size_usd,
            decision.limit_price,
            decision.resolves_at,
            now,
        );
        trade.signal_bps = decision.signal_bps;
        trade.edge_estimate = decision.edge_estimate;
        trade
    }

    /// Seconds since the entry filled (or was intended)
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.ts_entry).num_seconds()
    }

    /// Client-side id of this trade's exit order, used until the venue reports its own
    pub fn exit_client_order_id(&self) -> String {
        format!("{}-exit", self.trade_id)
    }

    /// Realized pnl for an exit at `price_exit` after all fees
    ///
    /// Positions are long the held outcome, and both prices are quoted for
    /// that outcome, so the side sign is always +1.
    pub fn realized_pnl(&self, price_exit: Decimal) -> Decimal {
        (price_exit - self.price_entry) * self.qty - self.fees_estimated
    }

    /// Unrealized pnl at the latest mark
    pub fn unrealized_pnl(&self) -> Option<Decimal> {
        self.last_mark.map(|mark| (mark - self.price_entry) * self.qty)
    }
}

/// Outcome of a failed exit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAttempt {
    /// Trade stays in `ExitRequested` and is retried next tick
    Retrying { attempts: u32 },
    /// Attempts exhausted; trade is now `Failed`
    Exhausted,
}

/// Lifecycle errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid transition for trade {trade_id}: {from} -> {to}")]
    InvalidTransition {
        trade_id: TradeId,
        from: TradeState,
        to: TradeState,
    },
    #[error("unknown trade: {0}")]
    UnknownTrade(TradeId),
    #[error("market {market_id} already has active trade {trade_id}")]
    ActiveTradeExists { market_id: String, trade_id: TradeId },
}
