//! Exit triggers for open trades

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::{ExitDecision, ExitReason};
use crate::config::ExitConfig;
use crate::lifecycle::{Trade, TradeState};
use crate::market::Quote;

/// Evaluates open trades against take-profit, stop-loss and time limits
#[derive(Debug, Clone)]
pub struct ExitPolicy {
    config: ExitConfig,
}

impl ExitPolicy {
    pub fn new(config: ExitConfig) -> Self {
        Self { config }
    }

    /// First matching trigger wins: take profit, stop loss, max hold, then
    /// resolution proximity. Only `Open` trades are evaluated.
    pub fn decide_exit(
        &self,
        trade: &Trade,
        quote: &Quote,
        elapsed_seconds: i64,
        now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        if trade.state != TradeState::Open {
            return None;
        }

        let current = quote.price_of(trade.side);
        let move_cents = Self::move_cents(trade, quote);

        let reason = if move_cents >= self.config.take_profit_cents {
            ExitReason::TakeProfit
        } else if -move_cents >= self.config.stop_loss_cents {
            ExitReason::StopLoss
        } else {
            self.time_trigger(trade, elapsed_seconds, now)?
        };

        Some(ExitDecision {
            trade_id: trade.trade_id.clone(),
            reason,
            quoted_price: current,
        })
    }

    /// Time-based triggers only, for trades whose market stopped quoting
    ///
    /// The decision carries the last mark (or the entry price) since there is
    /// no fresh quote to price against.
    pub fn decide_time_exit(
        &self,
        trade: &Trade,
        elapsed_seconds: i64,
        now: DateTime<Utc>,
    ) -> Option<ExitDecision> {
        if trade.state != TradeState::Open {
            return None;
        }

        let reason = self.time_trigger(trade, elapsed_seconds, now)?;
        Some(ExitDecision {
            trade_id: trade.trade_id.clone(),
            reason,
            quoted_price: trade.last_mark.unwrap_or(trade.price_entry),
        })
    }

    fn time_trigger(
        &self,
        trade: &Trade,
        elapsed_seconds: i64,
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        if elapsed_seconds >= self.config.max_hold_seconds {
            Some(ExitReason::MaxHold)
        } else if self.resolution_imminent(trade, now) {
            Some(ExitReason::ResolutionImminent)
        } else {
            None
        }
    }

    fn resolution_imminent(&self, trade: &Trade, now: DateTime<Utc>) -> bool {
        trade
            .resolves_at
            .is_some_and(|at| (at - now).num_seconds() <= self.config.force_close_seconds)
    }

    /// Unrealized move of the held outcome in cents
    fn move_cents(trade: &Trade, quote: &Quote) -> Decimal {
        (quote.price_of(trade.side) - trade.price_entry) * dec!(100)
    }
}
