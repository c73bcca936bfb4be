//! Paper trading execution engine

use super::{
    EntryFill, ExecutionClient, ExecutionError, ExitFill, OrderAction, OrderRequest, Portfolio,
    PortfolioPosition,
};
use crate::lifecycle::Trade;
use crate::market::Side;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A simulated fill, kept for inspection
#[derive(Debug, Clone, PartialEq)]
pub struct PaperFill {
    pub order_id: String,
    pub market_id: String,
    pub side: Side,
    pub action: OrderAction,
    pub price: Decimal,
    pub shares: Decimal,
    pub fees: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PaperPosition {
    shares: Decimal,
    avg_price: Decimal,
    mark: Decimal,
}

#[derive(Debug, Default)]
struct PaperBook {
    cash: Decimal,
    positions: HashMap<(String, Side), PaperPosition>,
    fills: Vec<PaperFill>,
    reject_next_orders: u32,
    drop_next_orders: u32,
    unacknowledged_next_orders: u32,
    fail_next_exits: u32,
}

/// Paper trading execution engine with simulated fills
///
/// Entries fill immediately at the limit price, exits at the supplied mark.
pub struct PaperEngine {
    fee_rate: Decimal,
    book: Arc<RwLock<PaperBook>>,
}

impl PaperEngine {
    /// Create a new paper trading engine
    pub fn new(initial_cash: Decimal, fee_rate: Decimal) -> Self {
        Self {
            fee_rate,
            book: Arc::new(RwLock::new(PaperBook {
                cash: initial_cash,
                ..PaperBook::default()
            })),
        }
    }

    /// Refuse the next `n` entry orders
    pub async fn reject_next_orders(&self, n: u32) {
        self.book.write().await.reject_next_orders = n;
    }

    /// Lose the next `n` entry orders: nothing fills and the call times out
    pub async fn drop_next_orders(&self, n: u32) {
        self.book.write().await.drop_next_orders = n;
    }

    /// Fill the next `n` entry orders but report a timeout to the caller
    pub async fn unacknowledge_next_orders(&self, n: u32) {
        self.book.write().await.unacknowledged_next_orders = n;
    }

    /// Fail the next `n` exits with a transient error
    pub async fn fail_next_exits(&self, n: u32) {
        self.book.write().await.fail_next_exits = n;
    }

    pub async fn fills(&self) -> Vec<PaperFill> {
        self.book.read().await.fills.clone()
    }

    pub async fn cash(&self) -> Decimal {
        self.book.read().await.cash
    }
}

#[async_trait]
impl ExecutionClient for PaperEngine {
    async fn submit_order(&self, order: &OrderRequest) -> Result<EntryFill, ExecutionError> {
        let mut book = self.book.write().await;

        if book.reject_next_orders > 0 {
            book.reject_next_orders -= 1;
            return Err(ExecutionError::Rejected("paper rejection".to_string()));
        }
        if book.drop_next_orders > 0 {
            book.drop_next_orders -= 1;
            return Err(ExecutionError::Timeout);
        }
        if order.limit_price <= Decimal::ZERO || order.limit_price >= Decimal::ONE {
            return Err(ExecutionError::Rejected(format!(
                "price out of range: {}",
                order.limit_price
            )));
        }

        let fees = order.size_usd * self.fee_rate;
        if book.cash < order.size_usd + fees {
            return Err(ExecutionError::Rejected("insufficient cash".to_string()));
        }

        // Simulate immediate fill at order price
        let shares = (order.size_usd / order.limit_price).round_dp(6);
        let order_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        book.cash -= order.size_usd + fees;
        let position = book
            .positions
            .entry((order.market_id.clone(), order.side))
            .or_insert(PaperPosition {
                shares: Decimal::ZERO,
                avg_price: order.limit_price,
                mark: order.limit_price,
            });
        let cost = position.shares * position.avg_price + shares * order.limit_price;
        position.shares += shares;
        position.avg_price = cost / position.shares;
        position.mark = order.limit_price;

        book.fills.push(PaperFill {
            order_id: order_id.clone(),
            market_id: order.market_id.clone(),
            side: order.side,
            action: OrderAction::Buy,
            price: order.limit_price,
            shares,
            fees,
            timestamp: now,
        });

        tracing::info!(order_id = %order_id, market_id = %order.market_id, %shares, "Paper order filled");
        if book.unacknowledged_next_orders > 0 {
            book.unacknowledged_next_orders -= 1;
            return Err(ExecutionError::Timeout);
        }
        Ok(EntryFill {
            order_id,
            price: order.limit_price,
            shares,
            fees,
            filled_at: now,
        })
    }

    async fn close_position(
        &self,
        trade: &Trade,
        mark_price: Decimal,
    ) -> Result<ExitFill, ExecutionError> {
        let mut book = self.book.write().await;

        if book.fail_next_exits > 0 {
            book.fail_next_exits -= 1;
            return Err(ExecutionError::Transient("paper exit failure".to_string()));
        }

        let key = (trade.market_id.clone(), trade.side);
        let held = book
            .positions
            .get(&key)
            .map(|p| p.shares)
            .ok_or_else(|| ExecutionError::Rejected(format!("no position in {}", trade.market_id)))?;

        let shares = trade.qty.min(held);
        let proceeds = shares * mark_price;
        let fees = proceeds * self.fee_rate;
        let remaining = held - shares;
        if remaining > Decimal::ZERO {
            if let Some(position) = book.positions.get_mut(&key) {
                position.shares = remaining;
                position.mark = mark_price;
            }
        } else {
            book.positions.remove(&key);
        }
        book.cash += proceeds - fees;

        let order_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        book.fills.push(PaperFill {
            order_id: order_id.clone(),
            market_id: trade.market_id.clone(),
            side: trade.side,
            action: OrderAction::Sell,
            price: mark_price,
            shares,
            fees,
            timestamp: now,
        });

        tracing::info!(order_id = %order_id, market_id = %trade.market_id, %shares, price = %mark_price, "Paper position closed");
        Ok(ExitFill {
            order_id,
            price: mark_price,
            shares,
            fees,
            filled_at: now,
        })
    }

    async fn portfolio_snapshot(&self) -> Result<Portfolio, ExecutionError> {
        let book = self.book.read().await;

        let positions: Vec<PortfolioPosition> = book
            .positions
            .iter()
            .map(|((market_id, side), p)| PortfolioPosition {
                market_id: market_id.clone(),
                side: *side,
                shares: p.shares,
                avg_price: p.avg_price,
                current_price: p.mark,
            })
            .collect();
        let held: Decimal = positions.iter().map(|p| p.shares * p.current_price).sum();

        Ok(Portfolio {
            cash: book.cash,
            total_value: book.cash + held,
            positions,
        })
    }
}
