//! Trade lifecycle manager
//!
//! Sole owner of trades, the per-market active index, daily budget counters
//! and the risk state. Every mutation validates the source state first, so
//! a rejected call leaves everything untouched.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::outbox::{Outbox, PendingWrite};
use super::risk::{BudgetState, RiskState};
use super::types::{
    ExitAttempt, LifecycleError, Trade, TradeId, TradeState, ENTRY_REJECTED, EXIT_FAILED,
};
use crate::config::RiskConfig;
use crate::decision::{EntryDecision, ExitDecision};
use crate::execution::{EntryFill, ExitFill};
use crate::market::MarketCandidate;
use crate::storage::{DailyMetrics, StorageError, TradeSnapshot, TradeStore, WatchlistEvent};
use crate::telemetry::{self, CounterMetric, GaugeMetric};

pub struct TradeManager {
    config: RiskConfig,
    risk: RiskState,
    budget: BudgetState,
    /// Non-terminal trades only
    trades: HashMap<TradeId, Trade>,
    active_by_market: HashMap<String, TradeId>,
    outbox: Outbox,
}

impl TradeManager {
    pub fn new(config: RiskConfig, now: DateTime<Utc>) -> Self {
        Self {
            risk: RiskState::new(&config, now),
            budget: BudgetState::new(now.date_naive()),
            config,
            trades: HashMap::new(),
            active_by_market: HashMap::new(),
            outbox: Outbox::new(),
        }
    }

    pub fn risk(&self) -> &RiskState {
        &self.risk
    }

    pub fn budget(&self) -> &BudgetState {
        &self.budget
    }

    pub fn get(&self, trade_id: &str) -> Option<&Trade> {
        self.trades.get(trade_id)
    }

    pub fn has_active_trade(&self, market_id: &str) -> bool {
        self.active_by_market.contains_key(market_id)
    }

    pub fn active_count(&self) -> usize {
        self.trades.len()
    }

    /// Trades currently holding a position and awaiting an exit trigger
    pub fn open_trades(&self) -> Vec<&Trade> {
        let mut open: Vec<&Trade> = self
            .trades
            .values()
            .filter(|t| t.state == TradeState::Open)
            .collect();
        open.sort_by_key(|t| t.ts_entry);
        open
    }

    /// Trades with an exit requested but not yet confirmed
    pub fn pending_exits(&self) -> Vec<TradeId> {
        let mut pending: Vec<&Trade> = self
            .trades
            .values()
            .filter(|t| t.state == TradeState::ExitRequested)
            .collect();
        pending.sort_by_key(|t| t.ts_entry);
        pending.into_iter().map(|t| t.trade_id.clone()).collect()
    }

    /// Trades whose entry was handed to the venue but never confirmed
    pub fn submitted_trades(&self) -> Vec<TradeId> {
        self.trades
            .values()
            .filter(|t| t.state == TradeState::Submitted)
            .map(|t| t.trade_id.clone())
            .collect()
    }

    /// Create an `Intended` trade and reserve its budget
    pub fn begin_entry(
        &mut self,
        decision: &EntryDecision,
        now: DateTime<Utc>,
    ) -> Result<TradeId, LifecycleError> {
        if let Some(existing) = self.active_by_market.get(&decision.market_id) {
            return Err(LifecycleError::ActiveTradeExists {
                market_id: decision.market_id.clone(),
                trade_id: existing.clone(),
            });
        }

        let trade = Trade::from_decision(decision, now);
        let trade_id = trade.trade_id.clone();

        self.budget.reserve(trade.size_usd);
        self.active_by_market
            .insert(trade.market_id.clone(), trade_id.clone());
        self.queue_trade(&trade);
        self.trades.insert(trade_id.clone(), trade);
        telemetry::set_gauge(GaugeMetric::ActiveTrades, self.trades.len() as f64);

        tracing::info!(
            trade_id = %trade_id,
            market_id = %decision.market_id,
            side = %decision.side,
            size_usd = %decision.size_usd,
            limit_price = %decision.limit_price,
            edge = %decision.edge_estimate,
            "Trade intended"
        );
        Ok(trade_id)
    }

    pub fn mark_submitted(
        &mut self,
        trade_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let trade = self.transition(trade_id, TradeState::Submitted, now)?.clone();
        self.queue_trade(&trade);
        tracing::debug!(trade_id, "Entry order submitted");
        Ok(())
    }

    /// Entry fill confirmed; the trade now holds a position
    pub fn confirm_entry(
        &mut self,
        trade_id: &str,
        fill: &EntryFill,
    ) -> Result<&Trade, LifecycleError> {
        let trade = {
            let trade = self.transition(trade_id, TradeState::Open, fill.filled_at)?;
            trade.price_entry = fill.price;
            trade.qty = fill.shares;
            trade.fees_estimated += fill.fees;
            trade.order_id_entry = Some(fill.order_id.clone());
            trade.ts_entry = fill.filled_at;
            trade.last_mark = Some(fill.price);
            trade.clone()
        };
        self.queue_trade(&trade);
        telemetry::incr(CounterMetric::EntriesFilled);

        tracing::info!(
            trade_id,
            market_id = %trade.market_id,
            price = %fill.price,
            shares = %fill.shares,
            order_id = %fill.order_id,
            "Entry filled"
        );
        self.get(trade_id)
            .ok_or_else(|| LifecycleError::UnknownTrade(trade_id.to_string()))
    }

    /// Venue refused or never acknowledged the entry
    ///
    /// Does not count toward exit-failure risk counters.
    pub fn reject_entry(
        &mut self,
        trade_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let trade = {
            let trade = self.transition(trade_id, TradeState::Failed, now)?;
            trade.exit_reason = Some(ENTRY_REJECTED.to_string());
            trade.notes = Some(reason.to_string());
            trade.ts_exit = Some(now);
            trade.clone()
        };
        self.budget.release(trade.size_usd);
        self.retire(&trade);
        telemetry::incr(CounterMetric::EntriesRejected);

        tracing::warn!(trade_id, market_id = %trade.market_id, reason, "Entry rejected");
        Ok(())
    }

    pub fn request_exit(
        &mut self,
        decision: &ExitDecision,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let trade = {
            let trade = self.transition(&decision.trade_id, TradeState::ExitRequested, now)?;
            trade.exit_reason = Some(decision.reason.as_str().to_string());
            trade.last_mark = Some(decision.quoted_price);
            trade.exit_attempts = 0;
            trade.order_id_exit = Some(trade.exit_client_order_id());
            trade.clone()
        };
        self.queue_trade(&trade);

        tracing::info!(
            trade_id = %trade.trade_id,
            market_id = %trade.market_id,
            reason = %decision.reason,
            quoted_price = %decision.quoted_price,
            "Exit requested"
        );
        Ok(())
    }

    /// Exit fill confirmed; realizes pnl and releases the market
    pub fn confirm_exit(
        &mut self,
        trade_id: &str,
        fill: &ExitFill,
    ) -> Result<Trade, LifecycleError> {
        let trade = {
            let trade = self.transition(trade_id, TradeState::Closed, fill.filled_at)?;
            trade.fees_estimated += fill.fees;
            let pnl = trade.realized_pnl(fill.price);
            trade.price_exit = Some(fill.price);
            trade.ts_exit = Some(fill.filled_at);
            trade.order_id_exit = Some(fill.order_id.clone());
            trade.pnl = Some(pnl);
            trade.clone()
        };

        let pnl = trade.pnl.unwrap_or(Decimal::ZERO);
        self.risk.daily_pnl += pnl;
        self.risk.consecutive_exit_failures = 0;
        self.retire(&trade);
        telemetry::incr(CounterMetric::ExitsFilled);
        telemetry::set_gauge(GaugeMetric::DailyPnl, decimal_f64(self.risk.daily_pnl));

        tracing::info!(
            trade_id,
            market_id = %trade.market_id,
            reason = trade.exit_reason.as_deref().unwrap_or(""),
            price_entry = %trade.price_entry,
            price_exit = %fill.price,
            pnl = %pnl,
            daily_pnl = %self.risk.daily_pnl,
            "Trade closed"
        );

        self.check_drawdown(fill.filled_at);
        Ok(trade)
    }

    /// Record a failed exit attempt
    ///
    /// Every failed attempt counts toward the consecutive-failure limit.
    /// The trade stays `ExitRequested` until `max_exit_attempts` is reached.
    pub fn fail_exit(
        &mut self,
        trade_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<ExitAttempt, LifecycleError> {
        let trade = self
            .trades
            .get_mut(trade_id)
            .ok_or_else(|| LifecycleError::UnknownTrade(trade_id.to_string()))?;
        if trade.state != TradeState::ExitRequested {
            return Err(LifecycleError::InvalidTransition {
                trade_id: trade_id.to_string(),
                from: trade.state,
                to: TradeState::Failed,
            });
        }
        trade.exit_attempts += 1;
        trade.updated_at = now;
        trade.notes = Some(error.to_string());
        let attempts = trade.exit_attempts;

        self.risk.consecutive_exit_failures += 1;
        telemetry::incr(CounterMetric::ExitFailures);
        tracing::warn!(
            trade_id,
            attempts,
            consecutive = self.risk.consecutive_exit_failures,
            error,
            "Exit attempt failed"
        );

        if self.risk.consecutive_exit_failures >= self.config.max_consecutive_exit_failures {
            self.trip_kill_switch("consecutive_exit_failures", now);
        }

        if attempts < self.config.max_exit_attempts {
            let snapshot = self.trades.get(trade_id).cloned();
            if let Some(trade) = snapshot {
                self.queue_trade(&trade);
            }
            return Ok(ExitAttempt::Retrying { attempts });
        }

        let trade = {
            let trade = self.transition(trade_id, TradeState::Failed, now)?;
            trade.exit_reason = Some(EXIT_FAILED.to_string());
            trade.ts_exit = Some(now);
            trade.clone()
        };
        self.retire(&trade);
        tracing::error!(trade_id, market_id = %trade.market_id, attempts, "Exit abandoned");
        Ok(ExitAttempt::Exhausted)
    }

    /// Record the latest quoted price of a trade's held outcome
    pub fn mark(&mut self, trade_id: &str, price: Decimal) {
        if let Some(trade) = self.trades.get_mut(trade_id) {
            trade.last_mark = Some(price);
        }
    }

    /// Expire the kill switch and start a new trading day if the date rolled
    ///
    /// Returns true when a new day started.
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        if self.risk.expire_kill_switch(now) {
            tracing::info!("Kill switch expired; entries resumed");
            telemetry::set_gauge(GaugeMetric::KillSwitchActive, 0.0);
        }

        let today = now.date_naive();
        if today == self.risk.day {
            return false;
        }

        tracing::info!(
            previous_day = %self.risk.day,
            day = %today,
            daily_pnl = %self.risk.daily_pnl,
            trades = self.budget.trades,
            "Trading day rolled"
        );
        self.risk.reset_daily(today);
        self.budget = BudgetState::new(today);
        telemetry::set_gauge(GaugeMetric::DailyPnl, 0.0);
        true
    }

    /// Latest portfolio value from the venue
    pub fn update_portfolio_value(&mut self, value: Decimal, now: DateTime<Utc>) {
        self.risk.portfolio_value = value;
        telemetry::set_gauge(GaugeMetric::PortfolioValue, decimal_f64(value));
        self.check_drawdown(now);
    }

    fn check_drawdown(&mut self, now: DateTime<Utc>) {
        if self.risk.drawdown_breached(self.config.max_daily_drawdown_pct) {
            self.trip_kill_switch("daily_drawdown", now);
        }
    }

    fn trip_kill_switch(&mut self, trigger: &str, now: DateTime<Utc>) {
        let pause = Duration::minutes(self.config.pause_minutes_on_trigger);
        if self.risk.activate_kill_switch(pause, now) {
            telemetry::incr(CounterMetric::KillSwitchActivations);
            telemetry::set_gauge(GaugeMetric::KillSwitchActive, 1.0);
            tracing::error!(
                trigger,
                until = ?self.risk.kill_switch_until,
                daily_pnl = %self.risk.daily_pnl,
                consecutive_exit_failures = self.risk.consecutive_exit_failures,
                "Kill switch activated"
            );
        }
    }

    fn transition(
        &mut self,
        trade_id: &str,
        to: TradeState,
        now: DateTime<Utc>,
    ) -> Result<&mut Trade, LifecycleError> {
        let trade = self
            .trades
            .get_mut(trade_id)
            .ok_or_else(|| LifecycleError::UnknownTrade(trade_id.to_string()))?;

        if !trade.state.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition {
                trade_id: trade_id.to_string(),
                from: trade.state,
                to,
            });
        }

        tracing::debug!(trade_id, from = %trade.state, to = %to, "Trade transition");
        trade.state = to;
        trade.updated_at = now;
        Ok(trade)
    }

    /// Drop a terminal trade from memory after queueing its final row
    fn retire(&mut self, trade: &Trade) {
        self.queue_trade(trade);
        self.trades.remove(&trade.trade_id);
        if self
            .active_by_market
            .get(&trade.market_id)
            .is_some_and(|id| *id == trade.trade_id)
        {
            self.active_by_market.remove(&trade.market_id);
        }
        telemetry::set_gauge(GaugeMetric::ActiveTrades, self.trades.len() as f64);
    }

    fn queue_trade(&mut self, trade: &Trade) {
        self.outbox.push(PendingWrite::Trade(Box::new(trade.clone())));
    }

    pub fn queue_snapshot(&mut self, snapshot: TradeSnapshot) {
        self.outbox.push(PendingWrite::Snapshot(Box::new(snapshot)));
    }

    pub fn queue_market(&mut self, market: &MarketCandidate, seen_at: DateTime<Utc>) {
        self.outbox
            .push(PendingWrite::Market(Box::new(market.clone()), seen_at));
    }

    pub fn queue_watchlist_event(&mut self, event: WatchlistEvent) {
        self.outbox.push(PendingWrite::WatchlistEvent(event));
    }

    pub fn queue_daily_metrics(&mut self, metrics: DailyMetrics) {
        self.outbox.push(PendingWrite::DailyMetrics(metrics));
    }

    pub fn pending_writes(&self) -> usize {
        self.outbox.len()
    }

    /// Flush queued writes; on failure the unwritten tail stays queued
    pub async fn flush(&mut self, store: &dyn TradeStore) -> Result<usize, StorageError> {
        self.outbox.flush(store).await
    }
}

fn decimal_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}
