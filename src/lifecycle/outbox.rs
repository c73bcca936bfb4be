//! Write-behind queue for persisted lifecycle effects
//!
//! Every state change is queued here first and flushed to the store at the
//! end of a tick. A failed write stops the flush and leaves it, and
//! everything behind it, queued in order for the next attempt.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use super::Trade;
use crate::market::MarketCandidate;
use crate::storage::{DailyMetrics, StorageError, TradeSnapshot, TradeStore, WatchlistEvent};

/// A single pending store write
#[derive(Debug, Clone)]
pub enum PendingWrite {
    Market(Box<MarketCandidate>, DateTime<Utc>),
    WatchlistEvent(WatchlistEvent),
    Trade(Box<Trade>),
    Snapshot(Box<TradeSnapshot>),
    DailyMetrics(DailyMetrics),
}

impl PendingWrite {
    async fn apply(&self, store: &dyn TradeStore) -> Result<(), StorageError> {
        match self {
            PendingWrite::Market(market, seen_at) => store.upsert_market(market, *seen_at).await,
            PendingWrite::WatchlistEvent(event) => store.record_watchlist_event(event).await,
            PendingWrite::Trade(trade) => store.upsert_trade(trade).await,
            PendingWrite::Snapshot(snapshot) => store.record_trade_snapshot(snapshot).await,
            PendingWrite::DailyMetrics(metrics) => store.upsert_daily_metrics(metrics).await,
        }
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<PendingWrite>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: PendingWrite) {
        self.queue.push_back(write);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Write queued entries in order, returning how many were written
    pub async fn flush(&mut self, store: &dyn TradeStore) -> Result<usize, StorageError> {
        let mut written = 0;
        while let Some(next) = self.queue.front() {
            next.apply(store).await?;
            self.queue.pop_front();
            written += 1;
        }
        Ok(written)
    }
}
