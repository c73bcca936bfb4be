//! poly-latency: signal-driven trading loop for Up or Down prediction markets
//!
//! This library provides the core components for:
//! - Real-time price feeds from Binance
//! - Rolling-window momentum signals
//! - Market discovery and quotes via PolymarketScan
//! - Eligibility filtering and entry/exit policies
//! - Trade lifecycle with kill switch and daily budget
//! - Paper and Agent Arena execution
//! - SQLite persistence behind a write-behind outbox
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod decision;
pub mod engine;
pub mod execution;
pub mod feed;
pub mod lifecycle;
pub mod market;
pub mod signal;
pub mod storage;
pub mod telemetry;
