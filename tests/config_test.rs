//! Configuration loading tests

use poly_latency::config::{Config, ExecutionMode, LogFormat};
use poly_latency::market::Side;
use rust_decimal_macros::dec;
use std::io::Write;

#[test]
fn test_example_config_parses() {
    let config: Config = toml::from_str(include_str!("../config.toml.example")).unwrap();
    assert_eq!(config.feed.symbol, "BTCUSDT");
    assert_eq!(config.engine.mode, ExecutionMode::Paper);
    assert_eq!(config.signal.trigger_bps, dec!(50));
    assert_eq!(config.pricing.side_mapping.up, Side::Yes);
    assert_eq!(config.pricing.side_mapping.down, Side::No);
    assert_eq!(config.risk.max_daily_drawdown_pct, dec!(0.05));
    assert_eq!(config.telemetry.metrics_port, None);
}

#[test]
fn test_empty_config_uses_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.watchlist.title_keywords, vec!["Up or Down".to_string()]);
    assert_eq!(config.budget.default_buy_usd, dec!(1));
    assert_eq!(config.exit.take_profit_cents, dec!(8));
    assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
    assert_eq!(config.engine.tick_interval().as_millis(), 2_000);
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [engine]
        mode = "arena"
        storage_timeout_ms = 250

        [telemetry]
        log_format = "json"
        metrics_port = 9100
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.engine.mode, ExecutionMode::Arena);
    assert_eq!(config.engine.storage_timeout().as_millis(), 250);
    assert_eq!(config.telemetry.log_format, LogFormat::Json);
    assert_eq!(config.telemetry.metrics_port, Some(9100));
}

#[test]
fn test_load_missing_file_fails() {
    assert!(Config::load("/nonexistent/poly-latency.toml").is_err());
}

#[test]
fn test_unknown_mode_rejected() {
    let result: Result<Config, _> = toml::from_str("[engine]\nmode = \"live\"\n");
    assert!(result.is_err());
}
