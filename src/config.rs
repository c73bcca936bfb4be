//! Configuration types for poly-latency

use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::market::Side;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub watchlist: WatchlistConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub eligibility: EligibilityConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Price feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Bound of the feed -> detector channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_exchange() -> String {
    "binance".to_string()
}
fn default_symbol() -> String {
    "BTCUSDT".to_string()
}
fn default_channel_capacity() -> usize {
    1024
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            symbol: default_symbol(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Market discovery client configuration (PolymarketScan)
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_list_limit")]
    pub list_limit: u32,
    #[serde(default = "default_cache_ttl_markets")]
    pub cache_ttl_markets_secs: u64,
    #[serde(default = "default_cache_ttl_detail")]
    pub cache_ttl_detail_secs: u64,
}

fn default_base_url() -> String {
    "https://polymarketscan.org/api/agent".to_string()
}
fn default_category() -> String {
    "crypto".to_string()
}
fn default_list_limit() -> u32 {
    100
}
fn default_cache_ttl_markets() -> u64 {
    15
}
fn default_cache_ttl_detail() -> u64 {
    10
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            agent_id: String::new(),
            category: default_category(),
            list_limit: default_list_limit(),
            cache_ttl_markets_secs: default_cache_ttl_markets(),
            cache_ttl_detail_secs: default_cache_ttl_detail(),
        }
    }
}

/// Watchlist refresh configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistConfig {
    /// Minimum seconds between watchlist refreshes
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,

    /// Maximum number of markets kept on the watchlist
    #[serde(default = "default_max_watchlist_markets")]
    pub max_watchlist_markets: usize,

    /// A market title must contain one of these to be watched
    #[serde(default = "default_title_keywords")]
    pub title_keywords: Vec<String>,
}

fn default_refresh_seconds() -> u64 {
    15
}
fn default_max_watchlist_markets() -> usize {
    8
}
fn default_title_keywords() -> Vec<String> {
    vec!["Up or Down".to_string()]
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            refresh_seconds: default_refresh_seconds(),
            max_watchlist_markets: default_max_watchlist_markets(),
            title_keywords: default_title_keywords(),
        }
    }
}

/// Rolling-window momentum signal configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    /// Observations older than this (relative to the newest) are evicted
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// The window must span at least this long before a signal is emitted
    #[serde(default = "default_min_span_seconds")]
    pub min_span_seconds: u64,

    /// Minimum absolute move in basis points
    #[serde(default = "default_trigger_bps")]
    pub trigger_bps: Decimal,
}

fn default_window_seconds() -> u64 {
    60
}
fn default_min_span_seconds() -> u64 {
    5
}
fn default_trigger_bps() -> Decimal {
    Decimal::new(50, 0)
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            min_span_seconds: default_min_span_seconds(),
            trigger_bps: default_trigger_bps(),
        }
    }
}

/// Candidate eligibility thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct EligibilityConfig {
    #[serde(default = "default_max_spread_cents")]
    pub max_spread_cents: Decimal,
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: Decimal,
    /// Safety margin before resolution
    #[serde(default = "default_min_seconds_to_resolution")]
    pub min_seconds_to_resolution: i64,
}

fn default_max_spread_cents() -> Decimal {
    Decimal::new(5, 0)
}
fn default_min_liquidity_usd() -> Decimal {
    Decimal::new(250, 0)
}
fn default_min_seconds_to_resolution() -> i64 {
    120
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            max_spread_cents: default_max_spread_cents(),
            min_liquidity_usd: default_min_liquidity_usd(),
            min_seconds_to_resolution: default_min_seconds_to_resolution(),
        }
    }
}

/// Per-trade and daily budget caps
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_buy_usd")]
    pub default_buy_usd: Decimal,
    #[serde(default = "default_max_buy_usd")]
    pub max_buy_usd: Decimal,
    /// Orders smaller than this are not worth placing
    #[serde(default = "default_min_buy_usd")]
    pub min_buy_usd: Decimal,
    #[serde(default = "default_max_daily_spend_usd")]
    pub max_daily_spend_usd: Decimal,
    #[serde(default = "default_max_trades_per_day")]
    pub max_trades_per_day: u32,
}

fn default_buy_usd() -> Decimal {
    Decimal::ONE
}
fn default_max_buy_usd() -> Decimal {
    Decimal::new(25, 0)
}
fn default_min_buy_usd() -> Decimal {
    Decimal::ONE
}
fn default_max_daily_spend_usd() -> Decimal {
    Decimal::new(100, 0)
}
fn default_max_trades_per_day() -> u32 {
    50
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_buy_usd: default_buy_usd(),
            max_buy_usd: default_max_buy_usd(),
            min_buy_usd: default_min_buy_usd(),
            max_daily_spend_usd: default_max_daily_spend_usd(),
            max_trades_per_day: default_max_trades_per_day(),
        }
    }
}

/// Which outcome to buy for each signal direction
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct SideMapping {
    pub up: Side,
    pub down: Side,
}

impl Default for SideMapping {
    fn default() -> Self {
        Self {
            up: Side::Yes,
            down: Side::No,
        }
    }
}

/// Fair value and cost model used to gate entries
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    /// Fair value shift per basis point of underlying move (0.0005 = 1c per 20bps)
    #[serde(default = "default_fair_value_per_bps")]
    pub fair_value_per_bps: Decimal,
    /// Cap on the fair value shift away from 0.50
    #[serde(default = "default_max_fair_value_shift")]
    pub max_fair_value_shift: Decimal,
    /// Expected slippage, in price units
    #[serde(default = "default_slippage_buffer")]
    pub slippage_buffer: Decimal,
    /// Venue fee as a fraction of notional
    #[serde(default)]
    pub fee_rate: Decimal,
    #[serde(default = "default_min_edge_cents")]
    pub min_edge_after_costs_cents: Decimal,
    #[serde(default)]
    pub side_mapping: SideMapping,
}

fn default_fair_value_per_bps() -> Decimal {
    Decimal::new(5, 4) // 0.0005
}
fn default_max_fair_value_shift() -> Decimal {
    Decimal::new(10, 2) // 0.10
}
fn default_slippage_buffer() -> Decimal {
    Decimal::new(5, 3) // 0.005
}
fn default_min_edge_cents() -> Decimal {
    Decimal::ONE
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            fair_value_per_bps: default_fair_value_per_bps(),
            max_fair_value_shift: default_max_fair_value_shift(),
            slippage_buffer: default_slippage_buffer(),
            fee_rate: Decimal::ZERO,
            min_edge_after_costs_cents: default_min_edge_cents(),
            side_mapping: SideMapping::default(),
        }
    }
}

/// Exit trigger thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct ExitConfig {
    #[serde(default = "default_take_profit_cents")]
    pub take_profit_cents: Decimal,
    #[serde(default = "default_stop_loss_cents")]
    pub stop_loss_cents: Decimal,
    #[serde(default = "default_max_hold_seconds")]
    pub max_hold_seconds: i64,
    /// Force-close when resolution is this close
    #[serde(default = "default_force_close_seconds")]
    pub force_close_seconds: i64,
}

fn default_take_profit_cents() -> Decimal {
    Decimal::new(8, 0)
}
fn default_stop_loss_cents() -> Decimal {
    Decimal::new(5, 0)
}
fn default_max_hold_seconds() -> i64 {
    120
}
fn default_force_close_seconds() -> i64 {
    60
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            take_profit_cents: default_take_profit_cents(),
            stop_loss_cents: default_stop_loss_cents(),
            max_hold_seconds: default_max_hold_seconds(),
            force_close_seconds: default_force_close_seconds(),
        }
    }
}

/// Kill switch thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_consecutive_exit_failures")]
    pub max_consecutive_exit_failures: u32,
    /// Attempts per exit before the trade is marked failed
    #[serde(default = "default_max_exit_attempts")]
    pub max_exit_attempts: u32,
    #[serde(default = "default_pause_minutes")]
    pub pause_minutes_on_trigger: i64,
    /// Fraction of portfolio value (0.05 = 5%)
    #[serde(default = "default_max_daily_drawdown_pct")]
    pub max_daily_drawdown_pct: Decimal,
    /// Used until the first portfolio snapshot arrives
    #[serde(default = "default_initial_portfolio_value")]
    pub initial_portfolio_value: Decimal,
}

fn default_max_consecutive_exit_failures() -> u32 {
    3
}
fn default_max_exit_attempts() -> u32 {
    3
}
fn default_pause_minutes() -> i64 {
    30
}
fn default_max_daily_drawdown_pct() -> Decimal {
    Decimal::new(5, 2)
}
fn default_initial_portfolio_value() -> Decimal {
    Decimal::new(1000, 0)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_consecutive_exit_failures: default_max_consecutive_exit_failures(),
            max_exit_attempts: default_max_exit_attempts(),
            pause_minutes_on_trigger: default_pause_minutes(),
            max_daily_drawdown_pct: default_max_daily_drawdown_pct(),
            initial_portfolio_value: default_initial_portfolio_value(),
        }
    }
}

/// Execution venue
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Paper,
    Arena,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Paper => "paper",
            ExecutionMode::Arena => "arena",
        }
    }
}

/// Orchestration loop cadence and collaborator timeouts
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_tick_timeout_ms")]
    pub tick_timeout_ms: u64,
    #[serde(default = "default_market_timeout_ms")]
    pub market_timeout_ms: u64,
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    #[serde(default = "default_storage_timeout_ms")]
    pub storage_timeout_ms: u64,
    /// Interval between HOLD snapshots of open trades
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: i64,
}

fn default_tick_interval_ms() -> u64 {
    2_000
}
fn default_tick_timeout_ms() -> u64 {
    30_000
}
fn default_market_timeout_ms() -> u64 {
    5_000
}
fn default_execution_timeout_ms() -> u64 {
    10_000
}
fn default_storage_timeout_ms() -> u64 {
    5_000
}
fn default_snapshot_interval_secs() -> i64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Paper,
            tick_interval_ms: default_tick_interval_ms(),
            tick_timeout_ms: default_tick_timeout_ms(),
            market_timeout_ms: default_market_timeout_ms(),
            execution_timeout_ms: default_execution_timeout_ms(),
            storage_timeout_ms: default_storage_timeout_ms(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_millis(self.tick_timeout_ms)
    }

    pub fn market_timeout(&self) -> Duration {
        Duration::from_millis(self.market_timeout_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("storage/polymarket.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; exporter disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [feed]
            exchange = "binance"
            symbol = "ETHUSDT"

            [signal]
            window_seconds = 30
            trigger_bps = 25

            [eligibility]
            max_spread_cents = 3
            min_liquidity_usd = 8000

            [budget]
            default_buy_usd = 2
            max_buy_usd = 10

            [pricing.side_mapping]
            up = "no"
            down = "yes"

            [engine]
            mode = "arena"
            tick_interval_ms = 500

            [telemetry]
            log_level = "debug"
            log_format = "json"
            metrics_port = 9090
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.feed.symbol, "ETHUSDT");
        assert_eq!(config.signal.window_seconds, 30);
        assert_eq!(config.signal.trigger_bps, dec!(25));
        assert_eq!(config.eligibility.max_spread_cents, dec!(3));
        assert_eq!(config.budget.default_buy_usd, dec!(2));
        assert_eq!(config.pricing.side_mapping.up, Side::No);
        assert_eq!(config.engine.mode, ExecutionMode::Arena);
        assert_eq!(config.engine.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        assert_eq!(config.telemetry.metrics_port, Some(9090));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.engine.mode, ExecutionMode::Paper);
        assert_eq!(config.signal.trigger_bps, dec!(50));
        assert_eq!(config.pricing.side_mapping, SideMapping::default());
        assert_eq!(config.risk.max_consecutive_exit_failures, 3);
        assert!(config.telemetry.metrics_port.is_none());
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let toml = r#"
            [exit]
            take_profit_cents = 10
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.exit.take_profit_cents, dec!(10));
        assert_eq!(config.exit.stop_loss_cents, dec!(5));
        assert_eq!(config.exit.max_hold_seconds, 120);
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(include_str!("../config.toml.example")).unwrap();
        assert_eq!(config.feed.exchange, "binance");
        assert_eq!(config.engine.mode, ExecutionMode::Paper);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_execution_mode_as_str() {
        assert_eq!(ExecutionMode::Paper.as_str(), "paper");
        assert_eq!(ExecutionMode::Arena.as_str(), "arena");
    }
}
