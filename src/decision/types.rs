//! Decision types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::lifecycle::TradeId;
use crate::market::Side;

/// Result of the eligibility check for a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Candidate passed all filters
    Eligible,
    /// Candidate rejected
    Rejected(RejectReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Reason a candidate was not eligible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Market already has a trade in flight
    ActiveTrade,
    /// Spread wider than allowed
    Spread,
    /// Not enough liquidity
    Liquidity,
    /// Too close to resolution
    TimeToResolution,
    /// Outcome price at or beyond 0/1
    PriceBounds,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::ActiveTrade => "active_trade",
            RejectReason::Spread => "spread",
            RejectReason::Liquidity => "liquidity",
            RejectReason::TimeToResolution => "time_to_resolution",
            RejectReason::PriceBounds => "price_bounds",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate record that cannot be evaluated at all
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CandidateError {
    #[error("candidate {market_id:?} missing field {field}")]
    MissingField {
        market_id: String,
        field: &'static str,
    },
    #[error("candidate {market_id} has invalid {field}: {value}")]
    InvalidField {
        market_id: String,
        field: &'static str,
        value: Decimal,
    },
}

/// An order the decision engine wants placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDecision {
    pub market_id: String,
    pub side: Side,
    pub size_usd: Decimal,
    pub limit_price: Decimal,
    pub fair_value: Decimal,
    /// Expected profit per share after slippage and fees, in price units
    pub edge_estimate: Decimal,
    /// Signed underlying move that produced the decision
    pub signal_bps: Decimal,
    pub resolves_at: Option<DateTime<Utc>>,
}

/// Why no entry decision was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRejection {
    /// Kill switch in force until the given time
    KillSwitch(Option<DateTime<Utc>>),
    /// Daily trade count cap reached
    DailyTradeLimit(u32),
    /// Size after caps below the minimum order
    BudgetExhausted(Decimal),
    /// Quoted price outside (0, 1)
    InvalidPrice(Decimal),
    /// Edge after costs below threshold, in cents
    EdgeTooSmall(Decimal),
}

impl EntryRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryRejection::KillSwitch(_) => "kill_switch",
            EntryRejection::DailyTradeLimit(_) => "daily_trade_limit",
            EntryRejection::BudgetExhausted(_) => "budget_exhausted",
            EntryRejection::InvalidPrice(_) => "invalid_price",
            EntryRejection::EdgeTooSmall(_) => "edge_too_small",
        }
    }
}

/// Exit trigger, in evaluation priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    MaxHold,
    ResolutionImminent,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::MaxHold => "max_hold",
            ExitReason::ResolutionImminent => "resolution_imminent",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to close an open trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitDecision {
    pub trade_id: TradeId,
    pub reason: ExitReason,
    /// Quoted price of the held outcome when the trigger fired
    pub quoted_price: Decimal,
}
