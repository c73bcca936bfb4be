//! Persistence module
//!
//! Markets, watchlist events, trades, snapshots and daily metrics

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{
    DailyMetrics, DailyRollup, Outcome, SnapshotPhase, StorageError, TradeSnapshot,
    WatchlistAction, WatchlistEvent,
};

use crate::lifecycle::Trade;
use crate::market::MarketCandidate;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Trait for persistence backends
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Insert or refresh a market row
    async fn upsert_market(
        &self,
        market: &MarketCandidate,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
    /// Append a watchlist event
    async fn record_watchlist_event(&self, event: &WatchlistEvent) -> Result<(), StorageError>;
    /// Insert or replace a trade, keyed by `trade_id`
    async fn upsert_trade(&self, trade: &Trade) -> Result<(), StorageError>;
    /// Append a trade snapshot
    async fn record_trade_snapshot(&self, snapshot: &TradeSnapshot) -> Result<(), StorageError>;
    /// Insert or replace the metrics row for a day
    async fn upsert_daily_metrics(&self, metrics: &DailyMetrics) -> Result<(), StorageError>;
    /// Aggregate the trades that finished on `day`
    async fn daily_rollup(&self, day: NaiveDate) -> Result<DailyRollup, StorageError>;
    async fn load_trade(&self, trade_id: &str) -> Result<Option<Trade>, StorageError>;
    async fn load_daily_metrics(
        &self,
        day: NaiveDate,
    ) -> Result<Option<DailyMetrics>, StorageError>;
}
