//! Market discovery module
//!
//! Finds short-horizon "Up or Down" markets and quotes them via the
//! PolymarketScan API

mod breaker;
mod polyscan;
mod types;
mod watchlist;

pub use breaker::CircuitBreaker;
pub(crate) use polyscan::decimal_value;
pub use polyscan::PolyscanClient;
pub use types::{MarketCandidate, MarketError, Quote, Side};
pub use watchlist::{Watchlist, WatchlistDiff};

use async_trait::async_trait;

/// Trait for market discovery implementations
#[async_trait]
pub trait MarketClient: Send + Sync {
    /// List candidate markets
    async fn list_candidates(&self) -> Result<Vec<MarketCandidate>, MarketError>;
    /// Get a fresh quote for one market
    async fn get_quote(&self, market_id: &str) -> Result<Quote, MarketError>;
}
