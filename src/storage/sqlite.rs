//! SQLite store
//!
//! One connection behind a mutex; every call runs on the blocking pool.
//! Decimals are stored as TEXT so they round-trip exactly.

use super::{
    DailyMetrics, DailyRollup, SnapshotPhase, StorageError, TradeSnapshot, TradeStore,
    WatchlistEvent,
};
use crate::lifecycle::{Trade, TradeState};
use crate::market::{MarketCandidate, Side};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BUSY_RETRIES: u32 = 5;
const BUSY_BACKOFF: Duration = Duration::from_millis(50);
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

const TRADE_COLUMNS: &str = "trade_id, market_id, side, state, size_usd, qty, price_entry, \
     price_exit, ts_entry, ts_exit, resolves_at, exit_reason, pnl, fees_estimated, \
     order_id_entry, order_id_exit, exit_attempts, last_mark, signal_bps, edge_estimate, \
     notes, updated_at";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                StorageError::Unavailable(format!("cannot create {}: {e}", dir.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, for tests and dry runs
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(include_str!("migrations/V1__initial_schema.sql"))?;
        tracing::debug!("SQLite schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `op` on the blocking pool, retrying while the database is locked
    async fn with_conn<T, F>(&self, mut op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnMut(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StorageError::Task("connection mutex poisoned".to_string()))?;
            let mut attempt = 0;
            loop {
                match op(&conn) {
                    Ok(value) => return Ok(value),
                    Err(e) if is_busy(&e) && attempt < BUSY_RETRIES => {
                        attempt += 1;
                        tracing::debug!(attempt, "SQLite busy, retrying");
                        std::thread::sleep(BUSY_BACKOFF);
                    }
                    Err(
                        e @ (rusqlite::Error::FromSqlConversionFailure(..)
                        | rusqlite::Error::InvalidColumnType(..)),
                    ) => return Err(StorageError::Corrupt(e.to_string())),
                    Err(e) => return Err(StorageError::from(e)),
                }
            }
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Trades whose exit landed on `day`
    pub async fn trades_finished_on(&self, day: NaiveDate) -> Result<Vec<Trade>, StorageError> {
        let day = day.format("%Y-%m-%d").to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRADE_COLUMNS} FROM trades WHERE substr(ts_exit, 1, 10) = ?1"
            ))?;
            let rows = stmt.query_map(params![day], trade_from_row)?;
            rows.collect()
        })
        .await
    }

    /// Snapshots recorded for one trade, in insertion order
    pub async fn snapshots_for(&self, trade_id: &str) -> Result<Vec<TradeSnapshot>, StorageError> {
        let trade_id = trade_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT trade_id, market_id, phase, ts, side, held_price, yes_price, no_price,
                        spread_cents, liquidity_usd, signal_bps
                 FROM trade_snapshots WHERE trade_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![trade_id], |row| {
                let phase_raw: String = row.get(2)?;
                let phase =
                    SnapshotPhase::parse(&phase_raw).ok_or_else(|| invalid_text(2, phase_raw))?;
                let side_raw: String = row.get(4)?;
                let side = Side::parse(&side_raw).ok_or_else(|| invalid_text(4, side_raw))?;
                Ok(TradeSnapshot {
                    trade_id: row.get(0)?,
                    market_id: row.get(1)?,
                    phase,
                    ts: ts_col(row, 3)?,
                    side,
                    held_price: decimal_col(row, 5)?,
                    yes_price: decimal_col(row, 6)?,
                    no_price: decimal_col(row, 7)?,
                    spread_cents: decimal_col(row, 8)?,
                    liquidity_usd: decimal_col(row, 9)?,
                    signal_bps: opt_decimal_col(row, 10)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    /// Number of rows in a table
    pub async fn count(&self, table: &'static str) -> Result<u64, StorageError> {
        self.with_conn(move |conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n.max(0) as u64)
        })
        .await
    }
}

#[async_trait]
impl TradeStore for SqliteStore {
    async fn upsert_market(
        &self,
        market: &MarketCandidate,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let market = market.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO markets (market_id, slug, title, category, yes_price, no_price,
                    spread_cents, liquidity_usd, resolves_at, is_resolved, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(market_id) DO UPDATE SET
                    slug = excluded.slug,
                    title = excluded.title,
                    category = excluded.category,
                    yes_price = excluded.yes_price,
                    no_price = excluded.no_price,
                    spread_cents = excluded.spread_cents,
                    liquidity_usd = excluded.liquidity_usd,
                    resolves_at = excluded.resolves_at,
                    is_resolved = excluded.is_resolved,
                    last_seen = excluded.last_seen",
                params![
                    market.market_id,
                    market.slug,
                    market.title,
                    market.category,
                    market.yes_price.to_string(),
                    market.no_price.to_string(),
                    market.spread_cents.to_string(),
                    market.liquidity_usd.to_string(),
                    market.resolves_at.map(|t| t.to_rfc3339()),
                    market.is_resolved,
                    seen_at.to_rfc3339(),
                ],
            )
            .map(|_| ())
        })
        .await
    }

    async fn record_watchlist_event(&self, event: &WatchlistEvent) -> Result<(), StorageError> {
        let event = event.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO watchlist_events (ts, market_id, action, reason)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    event.ts.to_rfc3339(),
                    event.market_id,
                    event.action.as_str(),
                    event.reason,
                ],
            )
            .map(|_| ())
        })
        .await
    }

    async fn upsert_trade(&self, trade: &Trade) -> Result<(), StorageError> {
        let trade = trade.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO trades ({TRADE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                             ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
                     ON CONFLICT(trade_id) DO UPDATE SET
                        state = excluded.state,
                        size_usd = excluded.size_usd,
                        qty = excluded.qty,
                        price_entry = excluded.price_entry,
                        price_exit = excluded.price_exit,
                        ts_entry = excluded.ts_entry,
                        ts_exit = excluded.ts_exit,
                        resolves_at = excluded.resolves_at,
                        exit_reason = excluded.exit_reason,
                        pnl = excluded.pnl,
                        fees_estimated = excluded.fees_estimated,
                        order_id_entry = excluded.order_id_entry,
                        order_id_exit = excluded.order_id_exit,
                        exit_attempts = excluded.exit_attempts,
                        last_mark = excluded.last_mark,
                        signal_bps = excluded.signal_bps,
                        edge_estimate = excluded.edge_estimate,
                        notes = excluded.notes,
                        updated_at = excluded.updated_at"
                ),
                params![
                    trade.trade_id,
                    trade.market_id,
                    trade.side.as_str(),
                    trade.state.as_str(),
                    trade.size_usd.to_string(),
                    trade.qty.to_string(),
                    trade.price_entry.to_string(),
                    trade.price_exit.map(|d| d.to_string()),
                    trade.ts_entry.to_rfc3339(),
                    trade.ts_exit.map(|t| t.to_rfc3339()),
                    trade.resolves_at.map(|t| t.to_rfc3339()),
                    trade.exit_reason,
                    trade.pnl.map(|d| d.to_string()),
                    trade.fees_estimated.to_string(),
                    trade.order_id_entry,
                    trade.order_id_exit,
                    trade.exit_attempts,
                    trade.last_mark.map(|d| d.to_string()),
                    trade.signal_bps.to_string(),
                    trade.edge_estimate.to_string(),
                    trade.notes,
                    trade.updated_at.to_rfc3339(),
                ],
            )
            .map(|_| ())
        })
        .await
    }

    async fn record_trade_snapshot(&self, snapshot: &TradeSnapshot) -> Result<(), StorageError> {
        let snap = snapshot.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO trade_snapshots (trade_id, market_id, phase, ts, side, held_price,
                    yes_price, no_price, spread_cents, liquidity_usd, signal_bps)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    snap.trade_id,
                    snap.market_id,
                    snap.phase.as_str(),
                    snap.ts.to_rfc3339(),
                    snap.side.as_str(),
                    snap.held_price.to_string(),
                    snap.yes_price.to_string(),
                    snap.no_price.to_string(),
                    snap.spread_cents.to_string(),
                    snap.liquidity_usd.to_string(),
                    snap.signal_bps.map(|d| d.to_string()),
                ],
            )
            .map(|_| ())
        })
        .await
    }

    async fn upsert_daily_metrics(&self, metrics: &DailyMetrics) -> Result<(), StorageError> {
        let metrics = metrics.clone();
        self.with_conn(move |conn| {
            let r = &metrics.rollup;
            conn.execute(
                "INSERT INTO daily_metrics (day, trades, wins, losses, win_rate, total_pnl,
                    avg_pnl, exit_failures, kill_switch_activations, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(day) DO UPDATE SET
                    trades = excluded.trades,
                    wins = excluded.wins,
                    losses = excluded.losses,
                    win_rate = excluded.win_rate,
                    total_pnl = excluded.total_pnl,
                    avg_pnl = excluded.avg_pnl,
                    exit_failures = excluded.exit_failures,
                    kill_switch_activations = excluded.kill_switch_activations,
                    updated_at = excluded.updated_at",
                params![
                    r.day.format("%Y-%m-%d").to_string(),
                    r.trades,
                    r.wins,
                    r.losses,
                    r.win_rate.to_string(),
                    r.total_pnl.to_string(),
                    r.avg_pnl.to_string(),
                    r.exit_failures,
                    metrics.kill_switch_activations,
                    metrics.updated_at.to_rfc3339(),
                ],
            )
            .map(|_| ())
        })
        .await
    }

    async fn daily_rollup(&self, day: NaiveDate) -> Result<DailyRollup, StorageError> {
        let trades = self.trades_finished_on(day).await?;
        Ok(DailyRollup::from_trades(day, &trades))
    }

    async fn load_trade(&self, trade_id: &str) -> Result<Option<Trade>, StorageError> {
        let trade_id = trade_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {TRADE_COLUMNS} FROM trades WHERE trade_id = ?1"),
                params![trade_id],
                trade_from_row,
            )
            .optional()
        })
        .await
    }

    async fn load_daily_metrics(
        &self,
        day: NaiveDate,
    ) -> Result<Option<DailyMetrics>, StorageError> {
        let key = day.format("%Y-%m-%d").to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT trades, wins, losses, win_rate, total_pnl, avg_pnl, exit_failures,
                        kill_switch_activations, updated_at
                 FROM daily_metrics WHERE day = ?1",
                params![key],
                |row| {
                    Ok(DailyMetrics {
                        rollup: DailyRollup {
                            day,
                            trades: row.get(0)?,
                            wins: row.get(1)?,
                            losses: row.get(2)?,
                            win_rate: decimal_col(row, 3)?,
                            total_pnl: decimal_col(row, 4)?,
                            avg_pnl: decimal_col(row, 5)?,
                            exit_failures: row.get(6)?,
                        },
                        kill_switch_activations: row.get(7)?,
                        updated_at: ts_col(row, 8)?,
                    })
                },
            )
            .optional()
        })
        .await
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::DatabaseBusy || err.code == ErrorCode::DatabaseLocked
    )
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn opt_decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| Decimal::from_str(&raw).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| conversion_error(idx, e))
        })
        .transpose()
}

fn invalid_text(idx: usize, raw: String) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(idx, raw, Type::Text)
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    let side_raw: String = row.get(2)?;
    let side = Side::parse(&side_raw).ok_or_else(|| invalid_text(2, side_raw))?;
    let state_raw: String = row.get(3)?;
    let state = TradeState::parse(&state_raw).ok_or_else(|| invalid_text(3, state_raw))?;

    Ok(Trade {
        trade_id: row.get(0)?,
        market_id: row.get(1)?,
        side,
        state,
        size_usd: decimal_col(row, 4)?,
        qty: decimal_col(row, 5)?,
        price_entry: decimal_col(row, 6)?,
        price_exit: opt_decimal_col(row, 7)?,
        ts_entry: ts_col(row, 8)?,
        ts_exit: opt_ts_col(row, 9)?,
        resolves_at: opt_ts_col(row, 10)?,
        exit_reason: row.get(11)?,
        pnl: opt_decimal_col(row, 12)?,
        fees_estimated: decimal_col(row, 13)?,
        order_id_entry: row.get(14)?,
        order_id_exit: row.get(15)?,
        exit_attempts: row.get(16)?,
        last_mark: opt_decimal_col(row, 17)?,
        signal_bps: decimal_col(row, 18)?,
        edge_estimate: decimal_col(row, 19)?,
        notes: row.get(20)?,
        updated_at: ts_col(row, 21)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Quote;
    use crate::storage::WatchlistAction;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn closed_trade(pnl: Decimal, at: DateTime<Utc>) -> Trade {
        let mut trade = Trade::new("m1", Side::Yes, dec!(1), dec!(0.52), Some(at), at);
        trade.state = TradeState::Closed;
        trade.price_exit = Some(dec!(0.61));
        trade.ts_exit = Some(at);
        trade.pnl = Some(pnl);
        trade.exit_reason = Some("take_profit".to_string());
        trade.order_id_entry = Some("o-1".to_string());
        trade.exit_attempts = 1;
        trade
    }

    #[test]
    fn test_schema_creates_all_tables() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                   AND name IN ('markets', 'watchlist_events', 'trades', 'trade_snapshots',
                                'daily_metrics', 'whale_touches')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 6);
    }

    #[tokio::test]
    async fn test_trade_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let trade = closed_trade(dec!(0.16), Utc::now());

        store.upsert_trade(&trade).await.unwrap();
        let loaded = store.load_trade(&trade.trade_id).await.unwrap().unwrap();
        assert_eq!(loaded, trade);
        assert!(store.load_trade("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trade_upsert_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut trade = Trade::new("m1", Side::No, dec!(1), dec!(0.4), None, Utc::now());

        store.upsert_trade(&trade).await.unwrap();
        store.upsert_trade(&trade).await.unwrap();
        trade.state = TradeState::Submitted;
        trade.notes = Some("resubmitted".to_string());
        store.upsert_trade(&trade).await.unwrap();

        assert_eq!(store.count("trades").await.unwrap(), 1);
        let loaded = store.load_trade(&trade.trade_id).await.unwrap().unwrap();
        assert_eq!(loaded.state, TradeState::Submitted);
        assert_eq!(loaded.notes.as_deref(), Some("resubmitted"));
    }

    #[tokio::test]
    async fn test_market_upsert_keeps_one_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let mut market = MarketCandidate {
            market_id: "m1".to_string(),
            title: "Bitcoin Up or Down".to_string(),
            slug: "btc-updown-5m".to_string(),
            category: "crypto".to_string(),
            yes_price: dec!(0.5),
            no_price: dec!(0.5),
            spread_cents: dec!(1),
            liquidity_usd: dec!(8000),
            resolves_at: Some(now + ChronoDuration::minutes(5)),
            is_resolved: false,
        };

        store.upsert_market(&market, now).await.unwrap();
        market.yes_price = dec!(0.55);
        store
            .upsert_market(&market, now + ChronoDuration::seconds(30))
            .await
            .unwrap();

        assert_eq!(store.count("markets").await.unwrap(), 1);
        let conn = store.conn.lock().unwrap();
        let (price, first_seen, last_seen): (String, String, String) = conn
            .query_row(
                "SELECT yes_price, first_seen, last_seen FROM markets WHERE market_id = 'm1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(price, "0.55");
        assert_ne!(first_seen, last_seen);
    }

    #[tokio::test]
    async fn test_events_and_snapshots_append() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .record_watchlist_event(&WatchlistEvent::added("m1", now))
            .await
            .unwrap();
        store
            .record_watchlist_event(&WatchlistEvent::removed("m1", now))
            .await
            .unwrap();
        assert_eq!(store.count("watchlist_events").await.unwrap(), 2);

        let trade = closed_trade(dec!(0.1), now);
        let quote = Quote {
            market_id: "m1".to_string(),
            yes_price: dec!(0.52),
            no_price: dec!(0.48),
            liquidity_usd: dec!(8000),
            spread_cents: dec!(1),
        };
        let entry = TradeSnapshot::capture(&trade, &quote, SnapshotPhase::Entry, Some(dec!(60)), now);
        let hold = TradeSnapshot::capture(&trade, &quote, SnapshotPhase::Hold, None, now);
        store.record_trade_snapshot(&entry).await.unwrap();
        store.record_trade_snapshot(&hold).await.unwrap();

        let snaps = store.snapshots_for(&trade.trade_id).await.unwrap();
        assert_eq!(snaps, vec![entry, hold]);
        assert_eq!(WatchlistAction::Add.as_str(), "ADD");
    }

    #[tokio::test]
    async fn test_daily_rollup_and_metrics() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let day = now.date_naive();

        store.upsert_trade(&closed_trade(dec!(0.2), now)).await.unwrap();
        store.upsert_trade(&closed_trade(dec!(-0.1), now)).await.unwrap();
        store
            .upsert_trade(&closed_trade(dec!(1), now - ChronoDuration::days(2)))
            .await
            .unwrap();

        let rollup = store.daily_rollup(day).await.unwrap();
        assert_eq!(rollup.trades, 2);
        assert_eq!(rollup.win_rate, dec!(0.5));
        assert_eq!(rollup.total_pnl, dec!(0.1));

        let metrics = DailyMetrics {
            rollup: rollup.clone(),
            kill_switch_activations: 1,
            updated_at: now,
        };
        store.upsert_daily_metrics(&metrics).await.unwrap();
        store.upsert_daily_metrics(&metrics).await.unwrap();
        assert_eq!(store.count("daily_metrics").await.unwrap(), 1);
        assert_eq!(store.load_daily_metrics(day).await.unwrap(), Some(metrics));
    }

    #[tokio::test]
    async fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("poly.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let trade = closed_trade(dec!(0.05), Utc::now());
            store.upsert_trade(&trade).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.count("trades").await.unwrap(), 1);
    }
}
