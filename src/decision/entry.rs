//! Entry decisions: side, size and edge gating

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::{EntryDecision, EntryRejection};
use crate::config::{BudgetConfig, PricingConfig};
use crate::lifecycle::{BudgetState, RiskState};
use crate::market::{MarketCandidate, Side};
use crate::signal::{Direction, Signal};

const FAIR_VALUE_FLOOR: Decimal = dec!(0.01);
const FAIR_VALUE_CEIL: Decimal = dec!(0.99);
const MIDPOINT: Decimal = dec!(0.5);
const CENTS: Decimal = dec!(100);

/// Turns an eligible candidate and a signal into an order intent
#[derive(Debug, Clone)]
pub struct EntryPolicy {
    budget: BudgetConfig,
    pricing: PricingConfig,
}

impl EntryPolicy {
    pub fn new(budget: BudgetConfig, pricing: PricingConfig) -> Self {
        Self { budget, pricing }
    }

    /// Outcome bought for a signal direction
    pub fn side_for(&self, direction: Direction) -> Side {
        match direction {
            Direction::Up => self.pricing.side_mapping.up,
            Direction::Down => self.pricing.side_mapping.down,
        }
    }

    /// Fair value of the bought outcome given the size of the move
    pub fn fair_value(&self, signal: &Signal) -> Decimal {
        let shift = (signal.magnitude_bps * self.pricing.fair_value_per_bps)
            .min(self.pricing.max_fair_value_shift);
        (MIDPOINT + shift).clamp(FAIR_VALUE_FLOOR, FAIR_VALUE_CEIL)
    }

    /// Order size after the per-trade and daily caps
    pub fn order_size(&self, budget: &BudgetState) -> Decimal {
        let available = budget.available(&self.budget);
        self.budget
            .default_buy_usd
            .min(self.budget.max_buy_usd)
            .min(available)
    }

    /// Decide whether to enter, returning None when any gate fails
    pub fn decide_entry(
        &self,
        candidate: &MarketCandidate,
        signal: &Signal,
        risk: &RiskState,
        budget: &BudgetState,
        now: DateTime<Utc>,
    ) -> Option<EntryDecision> {
        self.evaluate(candidate, signal, risk, budget, now).ok()
    }

    /// Same as [`decide_entry`](Self::decide_entry) but reports which gate failed
    pub fn evaluate(
        &self,
        candidate: &MarketCandidate,
        signal: &Signal,
        risk: &RiskState,
        budget: &BudgetState,
        now: DateTime<Utc>,
    ) -> Result<EntryDecision, EntryRejection> {
        if risk.is_halted(now) {
            return Err(EntryRejection::KillSwitch(risk.kill_switch_until));
        }

        if budget.trades >= self.budget.max_trades_per_day {
            return Err(EntryRejection::DailyTradeLimit(budget.trades));
        }

        let size_usd = self.order_size(budget);
        if size_usd < self.budget.min_buy_usd || size_usd <= Decimal::ZERO {
            return Err(EntryRejection::BudgetExhausted(size_usd));
        }

        let side = self.side_for(signal.direction);
        let limit_price = candidate.price_of(side);
        if limit_price <= Decimal::ZERO || limit_price >= Decimal::ONE {
            return Err(EntryRejection::InvalidPrice(limit_price));
        }

        let fair_value = self.fair_value(signal);
        let fees = self.pricing.fee_rate * limit_price;
        let edge_estimate = fair_value - limit_price - self.pricing.slippage_buffer - fees;
        let edge_cents = edge_estimate * CENTS;
        if edge_cents < self.pricing.min_edge_after_costs_cents {
            return Err(EntryRejection::EdgeTooSmall(edge_cents));
        }

        Ok(EntryDecision {
            market_id: candidate.market_id.clone(),
            side,
            size_usd,
            limit_price,
            fair_value,
            edge_estimate,
            signal_bps: signal.signed_bps(),
            resolves_at: candidate.resolves_at,
        })
    }
}
