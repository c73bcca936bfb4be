//! In-process store

use super::{DailyMetrics, DailyRollup, StorageError, TradeSnapshot, TradeStore, WatchlistEvent};
use crate::lifecycle::Trade;
use crate::market::MarketCandidate;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    markets: HashMap<String, (MarketCandidate, DateTime<Utc>)>,
    watchlist_events: Vec<WatchlistEvent>,
    trades: HashMap<String, Trade>,
    snapshots: Vec<TradeSnapshot>,
    daily_metrics: HashMap<NaiveDate, DailyMetrics>,
}

/// Store kept in memory, with an availability switch for outage tests
pub struct MemoryStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    /// While unavailable every call fails with `StorageError::Unavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("memory store offline".to_string()))
        }
    }

    pub async fn watchlist_events(&self) -> Vec<WatchlistEvent> {
        self.tables.read().await.watchlist_events.clone()
    }

    pub async fn snapshots(&self) -> Vec<TradeSnapshot> {
        self.tables.read().await.snapshots.clone()
    }

    /// All trades, oldest entry first
    pub async fn trades(&self) -> Vec<Trade> {
        let mut trades: Vec<Trade> = self.tables.read().await.trades.values().cloned().collect();
        trades.sort_by_key(|t| t.ts_entry);
        trades
    }

    pub async fn market_count(&self) -> usize {
        self.tables.read().await.markets.len()
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn upsert_market(
        &self,
        market: &MarketCandidate,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.check()?;
        self.tables
            .write()
            .await
            .markets
            .insert(market.market_id.clone(), (market.clone(), seen_at));
        Ok(())
    }

    async fn record_watchlist_event(&self, event: &WatchlistEvent) -> Result<(), StorageError> {
        self.check()?;
        self.tables.write().await.watchlist_events.push(event.clone());
        Ok(())
    }

    async fn upsert_trade(&self, trade: &Trade) -> Result<(), StorageError> {
        self.check()?;
        self.tables
            .write()
            .await
            .trades
            .insert(trade.trade_id.clone(), trade.clone());
        Ok(())
    }

    async fn record_trade_snapshot(&self, snapshot: &TradeSnapshot) -> Result<(), StorageError> {
        self.check()?;
        self.tables.write().await.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn upsert_daily_metrics(&self, metrics: &DailyMetrics) -> Result<(), StorageError> {
        self.check()?;
        self.tables
            .write()
            .await
            .daily_metrics
            .insert(metrics.rollup.day, metrics.clone());
        Ok(())
    }

    async fn daily_rollup(&self, day: NaiveDate) -> Result<DailyRollup, StorageError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(DailyRollup::from_trades(day, tables.trades.values()))
    }

    async fn load_trade(&self, trade_id: &str) -> Result<Option<Trade>, StorageError> {
        self.check()?;
        Ok(self.tables.read().await.trades.get(trade_id).cloned())
    }

    async fn load_daily_metrics(
        &self,
        day: NaiveDate,
    ) -> Result<Option<DailyMetrics>, StorageError> {
        self.check()?;
        Ok(self.tables.read().await.daily_metrics.get(&day).cloned())
    }
}
