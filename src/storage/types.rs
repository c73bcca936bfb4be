//! Persistence types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::{Trade, TradeId, TradeState, EXIT_FAILED};
use crate::market::{Quote, Side};

/// Watchlist membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchlistAction {
    Add,
    Remove,
}

impl WatchlistAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchlistAction::Add => "ADD",
            WatchlistAction::Remove => "REMOVE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEvent {
    pub ts: DateTime<Utc>,
    pub market_id: String,
    pub action: WatchlistAction,
    pub reason: String,
}

impl WatchlistEvent {
    pub fn added(market_id: &str, ts: DateTime<Utc>) -> Self {
        Self {
            ts,
            market_id: market_id.to_string(),
            action: WatchlistAction::Add,
            reason: "eligibility_passed".to_string(),
        }
    }

    pub fn removed(market_id: &str, ts: DateTime<Utc>) -> Self {
        Self {
            ts,
            market_id: market_id.to_string(),
            action: WatchlistAction::Remove,
            reason: "refresh_rotation".to_string(),
        }
    }
}

/// Point in a trade's life a snapshot was taken at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnapshotPhase {
    Entry,
    Hold,
    Exit,
}

impl SnapshotPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotPhase::Entry => "ENTRY",
            SnapshotPhase::Hold => "HOLD",
            SnapshotPhase::Exit => "EXIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ENTRY" => Some(SnapshotPhase::Entry),
            "HOLD" => Some(SnapshotPhase::Hold),
            "EXIT" => Some(SnapshotPhase::Exit),
            _ => None,
        }
    }
}

/// Market state captured alongside a trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSnapshot {
    pub trade_id: TradeId,
    pub market_id: String,
    pub phase: SnapshotPhase,
    pub ts: DateTime<Utc>,
    pub side: Side,
    /// Price of the held outcome
    pub held_price: Decimal,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub spread_cents: Decimal,
    pub liquidity_usd: Decimal,
    /// Underlying move when the snapshot was taken
    pub signal_bps: Option<Decimal>,
}

impl TradeSnapshot {
    pub fn capture(
        trade: &Trade,
        quote: &Quote,
        phase: SnapshotPhase,
        signal_bps: Option<Decimal>,
        ts: DateTime<Utc>,
    ) -> Self {
        Self {
            trade_id: trade.trade_id.clone(),
            market_id: trade.market_id.clone(),
            phase,
            ts,
            side: trade.side,
            held_price: quote.price_of(trade.side),
            yes_price: quote.yes_price,
            no_price: quote.no_price,
            spread_cents: quote.spread_cents,
            liquidity_usd: quote.liquidity_usd,
            signal_bps,
        }
    }
}

/// Win/loss classification of a closed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
    Flat,
}

impl Outcome {
    pub fn from_pnl(pnl: Decimal) -> Self {
        if pnl > Decimal::ZERO {
            Outcome::Win
        } else if pnl < Decimal::ZERO {
            Outcome::Loss
        } else {
            Outcome::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
            Outcome::Flat => "FLAT",
        }
    }
}

/// Aggregate of trades that finished on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRollup {
    pub day: NaiveDate,
    /// Closed trades
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: Decimal,
    pub total_pnl: Decimal,
    pub avg_pnl: Decimal,
    /// Trades that ended with `exit_failed`
    pub exit_failures: u32,
}

impl DailyRollup {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            trades: 0,
            wins: 0,
            losses: 0,
            win_rate: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            avg_pnl: Decimal::ZERO,
            exit_failures: 0,
        }
    }

    /// Roll up the trades whose exit landed on `day`
    pub fn from_trades<'a>(day: NaiveDate, trades: impl IntoIterator<Item = &'a Trade>) -> Self {
        let mut rollup = Self::empty(day);

        for trade in trades {
            if trade.ts_exit.map(|ts| ts.date_naive()) != Some(day) {
                continue;
            }
            match trade.state {
                TradeState::Closed => {
                    let pnl = trade.pnl.unwrap_or(Decimal::ZERO);
                    rollup.trades += 1;
                    rollup.total_pnl += pnl;
                    match Outcome::from_pnl(pnl) {
                        Outcome::Win => rollup.wins += 1,
                        Outcome::Loss => rollup.losses += 1,
                        Outcome::Flat => {}
                    }
                }
                TradeState::Failed if trade.exit_reason.as_deref() == Some(EXIT_FAILED) => {
                    rollup.exit_failures += 1;
                }
                _ => {}
            }
        }

        if rollup.trades > 0 {
            let count = Decimal::from(rollup.trades);
            rollup.win_rate = (Decimal::from(rollup.wins) / count).round_dp(4);
            rollup.avg_pnl = (rollup.total_pnl / count).round_dp(6);
        }
        rollup
    }
}

/// Row of the daily_metrics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub rollup: DailyRollup,
    pub kill_switch_activations: u32,
    pub updated_at: DateTime<Utc>,
}

/// Persistence errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Store cannot be reached; writes are kept for the next flush
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Stored row could not be decoded
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("storage task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn finished(state: TradeState, pnl: Option<Decimal>, reason: &str, at: DateTime<Utc>) -> Trade {
        let mut trade = Trade::new("m1", Side::Yes, dec!(1), dec!(0.5), None, at);
        trade.state = state;
        trade.pnl = pnl;
        trade.exit_reason = Some(reason.to_string());
        trade.ts_exit = Some(at);
        trade
    }

    #[test]
    fn test_outcome_from_pnl() {
        assert_eq!(Outcome::from_pnl(dec!(0.1)), Outcome::Win);
        assert_eq!(Outcome::from_pnl(dec!(-0.1)), Outcome::Loss);
        assert_eq!(Outcome::from_pnl(dec!(0)), Outcome::Flat);
    }

    #[test]
    fn test_rollup() {
        let now = Utc::now();
        let yesterday = now - Duration::days(1);
        let trades = vec![
            finished(TradeState::Closed, Some(dec!(0.20)), "take_profit", now),
            finished(TradeState::Closed, Some(dec!(-0.10)), "stop_loss", now),
            finished(TradeState::Closed, Some(dec!(0)), "max_hold", now),
            finished(TradeState::Closed, Some(dec!(0.30)), "take_profit", now),
            finished(TradeState::Failed, None, EXIT_FAILED, now),
            finished(TradeState::Failed, None, "entry_rejected", now),
            finished(TradeState::Closed, Some(dec!(5)), "take_profit", yesterday),
        ];

        let rollup = DailyRollup::from_trades(now.date_naive(), &trades);
        assert_eq!(rollup.trades, 4);
        assert_eq!(rollup.wins, 2);
        assert_eq!(rollup.losses, 1);
        assert_eq!(rollup.win_rate, dec!(0.5));
        assert_eq!(rollup.total_pnl, dec!(0.40));
        assert_eq!(rollup.avg_pnl, dec!(0.1));
        assert_eq!(rollup.exit_failures, 1);
    }

    #[test]
    fn test_empty_rollup() {
        let day = Utc::now().date_naive();
        let rollup = DailyRollup::from_trades(day, Vec::<Trade>::new().iter());
        assert_eq!(rollup, DailyRollup::empty(day));
    }

    #[test]
    fn test_watchlist_event_reasons() {
        let now = Utc::now();
        assert_eq!(WatchlistEvent::added("m1", now).reason, "eligibility_passed");
        assert_eq!(WatchlistEvent::removed("m1", now).action.as_str(), "REMOVE");
    }
}
