//! Price feed module
//!
//! Streams underlying trades (BTC by default) into a bounded channel that
//! the orchestration loop drains each tick

mod binance;
mod channel;
mod types;

pub use binance::{BackoffConfig, BinanceFeed};
pub use channel::ChannelFeed;
pub use types::{FeedError, PriceTick};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for price feed implementations
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Subscribe to price updates
    async fn subscribe(&self) -> Result<mpsc::Receiver<PriceTick>, FeedError>;
}
