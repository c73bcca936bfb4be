//! Execution module
//!
//! Order submission against the paper book or the Agent Arena

mod arena;
mod paper;
mod types;

pub use arena::ArenaClient;
pub use paper::{PaperEngine, PaperFill};
pub use types::{
    EntryFill, ExecutionError, ExitFill, OrderAction, OrderRequest, Portfolio, PortfolioPosition,
};

use crate::lifecycle::Trade;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for execution venues
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Submit an entry order
    async fn submit_order(&self, order: &OrderRequest) -> Result<EntryFill, ExecutionError>;
    /// Sell the shares held by `trade`; `mark_price` is the latest quote
    async fn close_position(
        &self,
        trade: &Trade,
        mark_price: Decimal,
    ) -> Result<ExitFill, ExecutionError>;
    /// Current account state
    async fn portfolio_snapshot(&self) -> Result<Portfolio, ExecutionError>;
}
