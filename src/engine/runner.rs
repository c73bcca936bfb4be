//! Tick runner
//!
//! One tick: refresh watchlist, drain feed, roll the day, refresh the
//! portfolio and settle unanswered entries against it, evaluate entries,
//! evaluate exits, persist. Ticks never overlap
//! and every collaborator call is bounded by its own timeout; a failed call
//! skips that piece of work until the next tick.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use super::{Collaborators, TickReport};
use crate::config::{Config, EngineConfig};
use crate::decision::{
    Eligibility, EligibilityFilter, EntryDecision, EntryPolicy, ExitPolicy,
};
use crate::execution::{EntryFill, ExecutionClient, ExecutionError, OrderRequest, Portfolio};
use crate::feed::PriceTick;
use crate::lifecycle::{ExitAttempt, Trade, TradeId, TradeManager};
use crate::market::{MarketCandidate, MarketClient, MarketError, Quote, Watchlist};
use crate::signal::{Signal, SignalDetector};
use crate::storage::{
    DailyMetrics, SnapshotPhase, StorageError, TradeSnapshot, TradeStore, WatchlistEvent,
};
use crate::telemetry::{self, CounterMetric, GaugeMetric, LatencyMetric};

pub struct Engine {
    config: EngineConfig,
    symbol: String,
    feed: mpsc::Receiver<PriceTick>,
    feed_closed: bool,
    detector: SignalDetector,
    watchlist: Watchlist,
    filter: EligibilityFilter,
    entry_policy: EntryPolicy,
    exit_policy: ExitPolicy,
    manager: TradeManager,
    market: Arc<dyn MarketClient>,
    execution: Arc<dyn ExecutionClient>,
    store: Arc<dyn TradeStore>,
    /// Last portfolio the venue reported
    portfolio: Option<Portfolio>,
    /// Newest signal already used for entries
    last_signal_at: Option<DateTime<Utc>>,
    last_snapshot: HashMap<TradeId, DateTime<Utc>>,
    last_metrics_at: Option<DateTime<Utc>>,
    metrics_dirty: bool,
    /// Finished days whose final metrics row is still owed
    unreported_days: Vec<(NaiveDate, u32)>,
}

impl Engine {
    pub fn new(
        config: &Config,
        feed: mpsc::Receiver<PriceTick>,
        collaborators: Collaborators,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            config: config.engine.clone(),
            symbol: config.feed.symbol.clone(),
            feed,
            feed_closed: false,
            detector: SignalDetector::new(&config.signal),
            watchlist: Watchlist::new(&config.watchlist, &config.eligibility),
            filter: EligibilityFilter::new(
                config.eligibility.clone(),
                config.pricing.side_mapping,
            ),
            entry_policy: EntryPolicy::new(config.budget.clone(), config.pricing.clone()),
            exit_policy: ExitPolicy::new(config.exit.clone()),
            manager: TradeManager::new(config.risk.clone(), now),
            market: collaborators.market,
            execution: collaborators.execution,
            store: collaborators.store,
            portfolio: None,
            last_signal_at: None,
            last_snapshot: HashMap::new(),
            last_metrics_at: None,
            metrics_dirty: false,
            unreported_days: Vec::new(),
        }
    }

    pub fn manager(&self) -> &TradeManager {
        &self.manager
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    pub fn detector(&self) -> &SignalDetector {
        &self.detector
    }

    /// Tick on the configured cadence until `shutdown` flips to true
    ///
    /// A tick in progress always completes; the outbox is flushed once more
    /// before returning.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), StorageError> {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            mode = self.config.mode.as_str(),
            symbol = %self.symbol,
            tick_interval_ms = self.config.tick_interval_ms,
            "Engine started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
            self.run_once().await;
        }

        self.shutdown().await
    }

    /// Run a single tick at the current time, bounded by the tick timeout
    pub async fn run_once(&mut self) -> TickReport {
        let started = Instant::now();
        let now = Utc::now();
        let tick_timeout = self.config.tick_timeout();

        let report = match tokio::time::timeout(tick_timeout, self.tick(now)).await {
            Ok(report) => report,
            Err(_) => {
                telemetry::incr(CounterMetric::TickTimeouts);
                tracing::warn!(
                    timeout_ms = self.config.tick_timeout_ms,
                    "Tick timed out; continuing next tick"
                );
                TickReport {
                    timed_out: true,
                    ..TickReport::default()
                }
            }
        };

        telemetry::record_latency(LatencyMetric::Tick, started.elapsed());
        report
    }

    /// Final flush of everything still queued
    pub async fn shutdown(&mut self) -> Result<(), StorageError> {
        let store = Arc::clone(&self.store);
        let written = within(
            self.config.storage_timeout(),
            self.manager.flush(store.as_ref()),
            || StorageError::Unavailable("final flush timed out".to_string()),
        )
        .await?;

        tracing::info!(
            written,
            active_trades = self.manager.active_count(),
            "Engine stopped"
        );
        Ok(())
    }

    /// One full cycle at `now`
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        self.refresh_watchlist(now).await;
        report.observations = self.drain_feed();
        self.roll_day(now);
        if self.refresh_portfolio(now).await {
            self.reconcile_submitted_entries(now, &mut report);
        }
        self.evaluate_entries(now, &mut report).await;
        self.evaluate_exits(now, &mut report).await;
        self.persist(now, &mut report).await;

        tracing::debug!(?report, "Tick complete");
        report
    }

    async fn refresh_watchlist(&mut self, now: DateTime<Utc>) {
        if !self.watchlist.refresh_due(now) {
            return;
        }
        self.watchlist.mark_attempt(now);

        let started = Instant::now();
        let listed = within(
            self.config.market_timeout(),
            self.market.list_candidates(),
            || MarketError::Transient("list_candidates timed out".to_string()),
        )
        .await;
        telemetry::record_latency(LatencyMetric::MarketRequest, started.elapsed());

        match listed {
            Ok(listed) => {
                let diff = self.watchlist.apply(listed, now);
                for market in self.watchlist.candidates() {
                    self.manager.queue_market(market, now);
                }
                for market_id in &diff.added {
                    self.manager
                        .queue_watchlist_event(WatchlistEvent::added(market_id, now));
                }
                for market_id in &diff.removed {
                    self.manager
                        .queue_watchlist_event(WatchlistEvent::removed(market_id, now));
                }
                telemetry::set_gauge(GaugeMetric::WatchlistSize, self.watchlist.len() as f64);
            }
            Err(e) => {
                telemetry::incr(CounterMetric::CollaboratorErrors);
                tracing::warn!(
                    error = %e,
                    transient = e.is_transient(),
                    markets = self.watchlist.len(),
                    "Watchlist refresh failed; keeping previous markets"
                );
            }
        }
    }

    /// Move everything the feed has buffered into the detector
    fn drain_feed(&mut self) -> usize {
        let mut drained = 0;
        loop {
            match self.feed.try_recv() {
                Ok(tick) => {
                    self.detector.observe(&self.symbol, tick.price, tick.timestamp);
                    drained += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.feed_closed {
                        tracing::warn!(symbol = %self.symbol, "Price feed closed");
                        self.feed_closed = true;
                    }
                    break;
                }
            }
        }
        drained
    }

    fn roll_day(&mut self, now: DateTime<Utc>) {
        let day = self.manager.risk().day;
        let activations = self.manager.risk().kill_switch_activations;
        if self.manager.roll_day(now) {
            self.unreported_days.push((day, activations));
        }
    }

    /// True when the venue answered this tick
    async fn refresh_portfolio(&mut self, now: DateTime<Utc>) -> bool {
        let snapshot = within(
            self.config.execution_timeout(),
            self.execution.portfolio_snapshot(),
            || ExecutionError::Timeout,
        )
        .await;

        match snapshot {
            Ok(portfolio) => {
                self.manager.update_portfolio_value(portfolio.total_value, now);
                self.portfolio = Some(portfolio);
                true
            }
            Err(e) => {
                telemetry::incr(CounterMetric::CollaboratorErrors);
                tracing::warn!(error = %e, "Portfolio snapshot failed; using last known positions");
                false
            }
        }
    }

    /// Settle entries whose order went out without an answer
    ///
    /// A position on the trade's market and side means the order filled;
    /// anything else means it never reached the book.
    fn reconcile_submitted_entries(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        let Some(portfolio) = self.portfolio.as_ref() else {
            return;
        };

        for trade_id in self.manager.submitted_trades() {
            let fill = {
                let Some(trade) = self.manager.get(&trade_id) else {
                    continue;
                };
                portfolio
                    .position(&trade.market_id, trade.side)
                    .map(|position| EntryFill {
                        order_id: trade_id.clone(),
                        price: position.avg_price,
                        shares: position.shares,
                        fees: rust_decimal::Decimal::ZERO,
                        filled_at: now,
                    })
            };

            match fill {
                Some(fill) => match self.manager.confirm_entry(&trade_id, &fill) {
                    Ok(_) => {
                        tracing::info!(trade_id = %trade_id, price = %fill.price, "Entry confirmed from portfolio");
                        report.entries_filled += 1;
                    }
                    Err(e) => {
                        tracing::error!(trade_id = %trade_id, error = %e, "Could not record entry fill");
                    }
                },
                None => {
                    if let Err(e) = self.manager.reject_entry(&trade_id, "entry unconfirmed", now) {
                        tracing::error!(trade_id = %trade_id, error = %e, "Could not abandon entry");
                    }
                    report.entries_rejected += 1;
                }
            }
        }
    }

    async fn evaluate_entries(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        let Some(signal) = self.detector.current_signal(&self.symbol) else {
            return;
        };
        report.signal = Some(signal.clone());

        // A signal is only acted on once; it comes back only with new observations
        if self.last_signal_at.is_some_and(|seen| signal.timestamp <= seen) {
            return;
        }
        self.last_signal_at = Some(signal.timestamp);

        telemetry::incr(CounterMetric::SignalsDetected);
        tracing::info!(
            symbol = %self.symbol,
            direction = %signal.direction,
            magnitude_bps = %signal.magnitude_bps,
            price = ?self.detector.latest_price(&self.symbol),
            "Signal detected"
        );

        let candidates: Vec<MarketCandidate> = self.watchlist.candidates().to_vec();
        for candidate in candidates {
            if self.manager.risk().is_halted(now) {
                tracing::info!(
                    until = ?self.manager.risk().kill_switch_until,
                    "Kill switch in force; skipping entries"
                );
                break;
            }

            let Some(fresh) = self.screen(&candidate, &signal, now).await else {
                continue;
            };

            match self.entry_policy.evaluate(
                &fresh,
                &signal,
                self.manager.risk(),
                self.manager.budget(),
                now,
            ) {
                Ok(decision) => {
                    telemetry::incr(CounterMetric::EntriesDecided);
                    self.enter(decision, &fresh.quote(), now, report).await;
                }
                Err(rejection) => {
                    tracing::debug!(
                        market_id = %fresh.market_id,
                        reason = rejection.as_str(),
                        ?rejection,
                        "No entry"
                    );
                }
            }
        }
    }

    /// Filter on the watchlist snapshot, then again on a fresh quote
    async fn screen(
        &self,
        candidate: &MarketCandidate,
        signal: &Signal,
        now: DateTime<Utc>,
    ) -> Option<MarketCandidate> {
        let has_active_trade = self.manager.has_active_trade(&candidate.market_id)
            || self
                .portfolio
                .as_ref()
                .is_some_and(|p| p.holds(&candidate.market_id));
        if !self.check_eligible(candidate, signal, has_active_trade, now) {
            return None;
        }

        let quote = match self.quote(&candidate.market_id).await {
            Ok(quote) => quote,
            Err(e) => {
                tracing::warn!(
                    market_id = %candidate.market_id,
                    error = %e,
                    "Quote failed; skipping market this tick"
                );
                return None;
            }
        };

        let fresh = candidate.with_quote(&quote);
        self.check_eligible(&fresh, signal, has_active_trade, now)
            .then_some(fresh)
    }

    fn check_eligible(
        &self,
        candidate: &MarketCandidate,
        signal: &Signal,
        has_active_trade: bool,
        now: DateTime<Utc>,
    ) -> bool {
        match self
            .filter
            .is_eligible(candidate, signal, has_active_trade, now)
        {
            Ok(Eligibility::Eligible) => true,
            Ok(Eligibility::Rejected(reason)) => {
                telemetry::incr(CounterMetric::CandidatesRejected);
                tracing::debug!(
                    market_id = %candidate.market_id,
                    reason = reason.as_str(),
                    "Candidate rejected"
                );
                false
            }
            Err(e) => {
                telemetry::incr(CounterMetric::CandidatesMalformed);
                tracing::warn!(error = %e, "Skipping malformed candidate");
                false
            }
        }
    }

    async fn quote(&self, market_id: &str) -> Result<Quote, MarketError> {
        let started = Instant::now();
        let result = within(
            self.config.market_timeout(),
            self.market.get_quote(market_id),
            || MarketError::Transient(format!("get_quote({market_id}) timed out")),
        )
        .await;
        telemetry::record_latency(LatencyMetric::MarketRequest, started.elapsed());
        if result.is_err() {
            telemetry::incr(CounterMetric::CollaboratorErrors);
        }
        result
    }

    async fn enter(
        &mut self,
        decision: EntryDecision,
        quote: &Quote,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let trade_id = match self.manager.begin_entry(&decision, now) {
            Ok(trade_id) => trade_id,
            Err(e) => {
                tracing::error!(market_id = %decision.market_id, error = %e, "Entry refused");
                return;
            }
        };
        if let Err(e) = self.manager.mark_submitted(&trade_id, now) {
            tracing::error!(trade_id = %trade_id, error = %e, "Could not submit entry");
            return;
        }

        let order = OrderRequest {
            client_order_id: trade_id.clone(),
            market_id: decision.market_id.clone(),
            side: decision.side,
            size_usd: decision.size_usd,
            limit_price: decision.limit_price,
            fair_value: Some(decision.fair_value),
        };

        let started = Instant::now();
        let result = within(
            self.config.execution_timeout(),
            self.execution.submit_order(&order),
            || ExecutionError::Timeout,
        )
        .await;
        telemetry::record_latency(LatencyMetric::OrderSubmission, started.elapsed());

        match result {
            Ok(fill) => match self.manager.confirm_entry(&trade_id, &fill).map(|trade| {
                TradeSnapshot::capture(
                    trade,
                    quote,
                    SnapshotPhase::Entry,
                    Some(decision.signal_bps),
                    now,
                )
            }) {
                Ok(snapshot) => {
                    self.manager.queue_snapshot(snapshot);
                    self.last_snapshot.insert(trade_id, now);
                    report.entries_filled += 1;
                }
                Err(e) => {
                    tracing::error!(trade_id = %trade_id, error = %e, "Could not record entry fill");
                }
            },
            Err(e) if e.is_retryable() => {
                // The order may still fill; the next portfolio snapshot decides
                telemetry::incr(CounterMetric::EntriesUnconfirmed);
                tracing::warn!(
                    trade_id = %trade_id,
                    error = %e,
                    "Entry outcome unknown; reconciling next tick"
                );
                report.entries_unconfirmed += 1;
            }
            Err(e) => {
                if let Err(err) = self.manager.reject_entry(&trade_id, &e.to_string(), now) {
                    tracing::error!(trade_id = %trade_id, error = %err, "Could not record entry rejection");
                }
                report.entries_rejected += 1;
            }
        }
    }

    async fn evaluate_exits(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        // Retries first, so a stuck exit is not starved by new triggers
        for trade_id in self.manager.pending_exits() {
            let Some(mark) = self.mark_price(&trade_id).await else {
                continue;
            };
            self.close(&trade_id, mark, now, report).await;
        }

        let open: Vec<Trade> = self.manager.open_trades().into_iter().cloned().collect();
        for trade in open {
            let elapsed = trade.elapsed_seconds(now);
            let quote = match self.quote(&trade.market_id).await {
                Ok(quote) => Some(quote),
                Err(e) => {
                    tracing::warn!(
                        trade_id = %trade.trade_id,
                        error = %e,
                        "Quote failed; only time exits checked"
                    );
                    None
                }
            };

            let decision = match &quote {
                Some(quote) => {
                    self.manager.mark(&trade.trade_id, quote.price_of(trade.side));
                    let decision = self.exit_policy.decide_exit(&trade, quote, elapsed, now);
                    if decision.is_none() {
                        self.hold_snapshot(&trade, quote, now);
                    }
                    decision
                }
                None => self.exit_policy.decide_time_exit(&trade, elapsed, now),
            };
            let Some(decision) = decision else {
                continue;
            };

            if let Err(e) = self.manager.request_exit(&decision, now) {
                tracing::error!(trade_id = %trade.trade_id, error = %e, "Could not request exit");
                continue;
            }
            telemetry::incr(CounterMetric::ExitsRequested);

            if let Some(quote) = &quote {
                let signal_bps = self.signal_bps();
                if let Some(requested) = self.manager.get(&trade.trade_id).cloned() {
                    self.manager.queue_snapshot(TradeSnapshot::capture(
                        &requested,
                        quote,
                        SnapshotPhase::Exit,
                        signal_bps,
                        now,
                    ));
                }
            }
            self.close(&trade.trade_id, decision.quoted_price, now, report).await;
        }
    }

    /// Latest price of a pending exit's held outcome, falling back to the last mark
    async fn mark_price(&mut self, trade_id: &str) -> Option<rust_decimal::Decimal> {
        let (market_id, side, fallback) = {
            let trade = self.manager.get(trade_id)?;
            (
                trade.market_id.clone(),
                trade.side,
                trade.last_mark.unwrap_or(trade.price_entry),
            )
        };

        match self.quote(&market_id).await {
            Ok(quote) => {
                let price = quote.price_of(side);
                self.manager.mark(trade_id, price);
                Some(price)
            }
            Err(e) => {
                tracing::debug!(trade_id, error = %e, "Using last mark for exit retry");
                Some(fallback)
            }
        }
    }

    async fn close(
        &mut self,
        trade_id: &str,
        mark: rust_decimal::Decimal,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let Some(trade) = self.manager.get(trade_id).cloned() else {
            return;
        };

        let started = Instant::now();
        let result = within(
            self.config.execution_timeout(),
            self.execution.close_position(&trade, mark),
            || ExecutionError::Timeout,
        )
        .await;
        telemetry::record_latency(LatencyMetric::OrderSubmission, started.elapsed());

        match result {
            Ok(fill) => match self.manager.confirm_exit(trade_id, &fill) {
                Ok(_) => {
                    report.exits_filled += 1;
                    self.last_snapshot.remove(trade_id);
                    self.metrics_dirty = true;
                }
                Err(e) => {
                    tracing::error!(trade_id, error = %e, "Could not record exit fill");
                }
            },
            Err(e) => {
                report.exit_failures += 1;
                match self.manager.fail_exit(trade_id, &e.to_string(), now) {
                    Ok(ExitAttempt::Exhausted) => {
                        self.last_snapshot.remove(trade_id);
                        self.metrics_dirty = true;
                    }
                    Ok(ExitAttempt::Retrying { .. }) => {}
                    Err(err) => {
                        tracing::error!(trade_id, error = %err, "Could not record exit failure");
                    }
                }
            }
        }
    }

    fn hold_snapshot(&mut self, trade: &Trade, quote: &Quote, now: DateTime<Utc>) {
        let interval = Duration::seconds(self.config.snapshot_interval_secs);
        let due = self
            .last_snapshot
            .get(&trade.trade_id)
            .map_or(true, |last| now - *last >= interval);
        if !due {
            return;
        }

        let signal_bps = self.signal_bps();
        self.manager.queue_snapshot(TradeSnapshot::capture(
            trade,
            quote,
            SnapshotPhase::Hold,
            signal_bps,
            now,
        ));
        self.last_snapshot.insert(trade.trade_id.clone(), now);
    }

    fn signal_bps(&self) -> Option<rust_decimal::Decimal> {
        self.detector
            .current_signal(&self.symbol)
            .map(|s| s.signed_bps())
    }

    async fn persist(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        if !self.flush(report).await {
            return;
        }

        let interval = Duration::seconds(self.config.snapshot_interval_secs);
        let due = self.metrics_dirty
            || !self.unreported_days.is_empty()
            || self
                .last_metrics_at
                .map_or(true, |last| now - last >= interval);
        if !due {
            return;
        }

        let mut days = std::mem::take(&mut self.unreported_days);
        days.push((
            self.manager.risk().day,
            self.manager.risk().kill_switch_activations,
        ));

        let store = Arc::clone(&self.store);
        for (i, (day, activations)) in days.iter().enumerate() {
            let rollup = within(self.config.storage_timeout(), store.daily_rollup(*day), || {
                StorageError::Unavailable("daily_rollup timed out".to_string())
            })
            .await;

            match rollup {
                Ok(rollup) => self.manager.queue_daily_metrics(DailyMetrics {
                    rollup,
                    kill_switch_activations: *activations,
                    updated_at: now,
                }),
                Err(e) => {
                    tracing::warn!(day = %day, error = %e, "Daily rollup failed");
                    // Finished days are retried; today is rebuilt next time anyway
                    let today = self.manager.risk().day;
                    self.unreported_days = days[i..]
                        .iter()
                        .filter(|(d, _)| *d != today)
                        .copied()
                        .collect();
                    return;
                }
            }
        }

        if self.flush(report).await {
            self.metrics_dirty = false;
            self.last_metrics_at = Some(now);
        }
    }

    /// Flush the outbox; false if the store could not take everything
    async fn flush(&mut self, report: &mut TickReport) -> bool {
        let store = Arc::clone(&self.store);
        let started = Instant::now();
        let result = within(
            self.config.storage_timeout(),
            self.manager.flush(store.as_ref()),
            || StorageError::Unavailable("flush timed out".to_string()),
        )
        .await;
        telemetry::record_latency(LatencyMetric::StoreFlush, started.elapsed());
        telemetry::set_gauge(
            GaugeMetric::PendingWrites,
            self.manager.pending_writes() as f64,
        );

        match result {
            Ok(written) => {
                report.writes_flushed += written;
                true
            }
            Err(e) => {
                report.flush_failed = true;
                telemetry::incr(CounterMetric::FlushFailures);
                tracing::warn!(
                    error = %e,
                    pending = self.manager.pending_writes(),
                    "Flush failed; writes kept for next tick"
                );
                false
            }
        }
    }
}

/// Await `fut`, turning a timeout into the caller's error
async fn within<T, E>(
    limit: std::time::Duration,
    fut: impl Future<Output = Result<T, E>>,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{EntryFill, ExitFill, PaperEngine, Portfolio};
    use crate::feed::ChannelFeed;
    use crate::feed::PriceFeed;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct StaticMarket {
        markets: Vec<MarketCandidate>,
    }

    #[async_trait]
    impl MarketClient for StaticMarket {
        async fn list_candidates(&self) -> Result<Vec<MarketCandidate>, MarketError> {
            Ok(self.markets.clone())
        }

        async fn get_quote(&self, market_id: &str) -> Result<Quote, MarketError> {
            self.markets
                .iter()
                .find(|m| m.market_id == market_id)
                .map(|m| m.quote())
                .ok_or_else(|| MarketError::Fatal(format!("unknown market {market_id}")))
        }
    }

    /// Venue that never answers within the execution timeout
    struct SlowVenue;

    #[async_trait]
    impl ExecutionClient for SlowVenue {
        async fn submit_order(&self, _order: &OrderRequest) -> Result<EntryFill, ExecutionError> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Err(ExecutionError::Transient("late".to_string()))
        }

        async fn close_position(
            &self,
            _trade: &Trade,
            _mark_price: Decimal,
        ) -> Result<ExitFill, ExecutionError> {
            Err(ExecutionError::Transient("unused".to_string()))
        }

        async fn portfolio_snapshot(&self) -> Result<Portfolio, ExecutionError> {
            Ok(Portfolio {
                cash: dec!(1000),
                total_value: dec!(1000),
                positions: Vec::new(),
            })
        }
    }

    fn market(now: DateTime<Utc>) -> MarketCandidate {
        MarketCandidate {
            market_id: "m1".to_string(),
            title: "Bitcoin Up or Down - 5 minute".to_string(),
            slug: "btc-updown-5m".to_string(),
            category: "crypto".to_string(),
            yes_price: dec!(0.50),
            no_price: dec!(0.50),
            spread_cents: dec!(1),
            liquidity_usd: dec!(10000),
            resolves_at: Some(now + Duration::minutes(10)),
            is_resolved: false,
        }
    }

    fn tick(price: Decimal, at: DateTime<Utc>) -> PriceTick {
        PriceTick {
            symbol: "BTCUSDT".to_string(),
            price,
            timestamp: at,
            exchange_ts: at,
        }
    }

    async fn engine_with(
        execution: Arc<dyn ExecutionClient>,
        now: DateTime<Utc>,
    ) -> (Engine, mpsc::Sender<PriceTick>) {
        let mut config = Config::default();
        config.engine.execution_timeout_ms = 50;
        let (feed, tx) = ChannelFeed::new(16);
        let rx = feed.subscribe().await.unwrap();
        let collaborators = Collaborators {
            market: Arc::new(StaticMarket {
                markets: vec![market(now)],
            }),
            execution,
            store: Arc::new(MemoryStore::new()),
        };
        (Engine::new(&config, rx, collaborators, now), tx)
    }

    #[tokio::test]
    async fn test_within_maps_timeout() {
        let result: Result<(), ExecutionError> = within(
            std::time::Duration::from_millis(10),
            async {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                Ok(())
            },
            || ExecutionError::Timeout,
        )
        .await;
        assert_eq!(result, Err(ExecutionError::Timeout));
    }

    #[tokio::test]
    async fn test_drain_feed_feeds_detector() {
        let now = Utc::now();
        let engine_exec = Arc::new(PaperEngine::new(dec!(1000), dec!(0)));
        let (mut engine, tx) = engine_with(engine_exec, now).await;

        tx.send(tick(dec!(100), now - Duration::seconds(30))).await.unwrap();
        tx.send(tick(dec!(100.6), now)).await.unwrap();

        assert_eq!(engine.drain_feed(), 2);
        assert_eq!(engine.detector().sample_count("BTCUSDT"), 2);
        assert_eq!(engine.drain_feed(), 0);
    }

    #[tokio::test]
    async fn test_signal_is_used_once() {
        let now = Utc::now();
        let paper = Arc::new(PaperEngine::new(dec!(1000), dec!(0)));
        let (mut engine, tx) = engine_with(paper.clone(), now).await;

        tx.send(tick(dec!(100), now - Duration::seconds(30))).await.unwrap();
        tx.send(tick(dec!(100.6), now)).await.unwrap();

        let first = engine.tick(now).await;
        assert_eq!(first.entries_filled, 1);
        assert!(first.signal.is_some());

        // Same signal, nothing new on the feed
        let second = engine.tick(now + Duration::seconds(1)).await;
        assert_eq!(second.entries_filled, 0);
        assert_eq!(paper.fills().await.len(), 1);
    }

    #[tokio::test]
    async fn test_execution_timeout_settles_on_next_portfolio() {
        let now = Utc::now();
        let (mut engine, tx) = engine_with(Arc::new(SlowVenue), now).await;

        tx.send(tick(dec!(100), now - Duration::seconds(30))).await.unwrap();
        tx.send(tick(dec!(100.6), now)).await.unwrap();

        // Timed out: the order may still be live, so the trade stays submitted
        let report = engine.tick(now).await;
        assert_eq!(report.entries_unconfirmed, 1);
        assert_eq!(report.entries_rejected, 0);
        assert_eq!(report.entries_filled, 0);
        assert!(engine.manager().has_active_trade("m1"));
        assert_eq!(engine.manager().submitted_trades().len(), 1);

        // The venue reports no position, so the entry never filled
        let report = engine.tick(now + Duration::seconds(1)).await;
        assert_eq!(report.entries_rejected, 1);
        assert!(!engine.manager().has_active_trade("m1"));
        assert_eq!(engine.manager().budget().spent_usd, Decimal::ZERO);
    }
}
