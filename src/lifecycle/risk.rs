//! Risk and budget state

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{BudgetConfig, RiskConfig};

/// Process-wide risk state
///
/// Owned by the trade manager; the decision engine only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    /// Trading day the pnl counter belongs to (UTC)
    pub day: NaiveDate,
    pub daily_pnl: Decimal,
    pub consecutive_exit_failures: u32,
    pub kill_switch_active: bool,
    pub kill_switch_until: Option<DateTime<Utc>>,
    /// Activations since the day started
    pub kill_switch_activations: u32,
    /// Latest known portfolio value, used for the drawdown limit
    pub portfolio_value: Decimal,
}

impl RiskState {
    pub fn new(config: &RiskConfig, now: DateTime<Utc>) -> Self {
        Self {
            day: now.date_naive(),
            daily_pnl: Decimal::ZERO,
            consecutive_exit_failures: 0,
            kill_switch_active: false,
            kill_switch_until: None,
            kill_switch_activations: 0,
            portfolio_value: config.initial_portfolio_value,
        }
    }

    /// Whether new entries are halted at `now`
    pub fn is_halted(&self, now: DateTime<Utc>) -> bool {
        self.kill_switch_active && self.kill_switch_until.map_or(true, |until| now < until)
    }

    /// Halt entries for `pause` from `now`
    ///
    /// An active halt is only ever extended, never shortened. Returns true
    /// when this call started a new halt.
    pub fn activate_kill_switch(&mut self, pause: Duration, now: DateTime<Utc>) -> bool {
        let until = now + pause;

        if self.is_halted(now) {
            if self.kill_switch_until.is_some_and(|current| current < until) {
                self.kill_switch_until = Some(until);
            }
            return false;
        }

        self.kill_switch_active = true;
        self.kill_switch_until = Some(until);
        self.kill_switch_activations += 1;
        true
    }

    /// Clear an expired halt. Returns true if one was cleared.
    pub fn expire_kill_switch(&mut self, now: DateTime<Utc>) -> bool {
        if self.kill_switch_active && !self.is_halted(now) {
            self.kill_switch_active = false;
            self.kill_switch_until = None;
            return true;
        }
        false
    }

    /// Daily loss at or beyond `max_pct` of portfolio value
    pub fn drawdown_breached(&self, max_pct: Decimal) -> bool {
        self.daily_pnl < Decimal::ZERO && self.daily_pnl <= -(max_pct * self.portfolio_value)
    }

    /// Reset daily counters for a new trading day
    ///
    /// An active kill switch keeps running until it expires.
    pub fn reset_daily(&mut self, day: NaiveDate) {
        self.day = day;
        self.daily_pnl = Decimal::ZERO;
        self.kill_switch_activations = 0;
    }
}

/// Daily spend and trade count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub day: NaiveDate,
    pub spent_usd: Decimal,
    pub trades: u32,
}

impl BudgetState {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            spent_usd: Decimal::ZERO,
            trades: 0,
        }
    }

    /// Budget left for today, never negative
    pub fn available(&self, config: &BudgetConfig) -> Decimal {
        (config.max_daily_spend_usd - self.spent_usd).max(Decimal::ZERO)
    }

    /// Count a new entry against today's budget
    pub fn reserve(&mut self, size_usd: Decimal) {
        self.spent_usd += size_usd;
        self.trades += 1;
    }

    /// Return the budget of an entry the venue refused
    pub fn release(&mut self, size_usd: Decimal) {
        self.spent_usd = (self.spent_usd - size_usd).max(Decimal::ZERO);
        self.trades = self.trades.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rust_decimal_macros::dec;

    fn state() -> (RiskState, DateTime<Utc>) {
        let now = Utc::now();
        (RiskState::new(&RiskConfig::default(), now), now)
    }

    #[test]
    fn test_initial_state() {
        let (risk, now) = state();
        assert!(!risk.is_halted(now));
        assert_eq!(risk.daily_pnl, dec!(0));
        assert_eq!(risk.consecutive_exit_failures, 0);
        assert_eq!(risk.portfolio_value, dec!(1000));
    }

    #[test]
    fn test_kill_switch_expires() {
        let (mut risk, now) = state();

        assert!(risk.activate_kill_switch(Duration::minutes(30), now));
        assert!(risk.is_halted(now));
        assert!(risk.is_halted(now + Duration::minutes(29)));
        assert!(!risk.is_halted(now + Duration::minutes(30)));

        assert!(!risk.expire_kill_switch(now + Duration::minutes(10)));
        assert!(risk.expire_kill_switch(now + Duration::minutes(30)));
        assert!(!risk.kill_switch_active);
        assert!(risk.kill_switch_until.is_none());
    }

    #[test]
    fn test_reactivation_only_extends() {
        let (mut risk, now) = state();
        risk.activate_kill_switch(Duration::minutes(30), now);

        assert!(!risk.activate_kill_switch(Duration::minutes(5), now + Duration::minutes(1)));
        assert_eq!(risk.kill_switch_until, Some(now + Duration::minutes(30)));

        assert!(!risk.activate_kill_switch(Duration::minutes(30), now + Duration::minutes(10)));
        assert_eq!(risk.kill_switch_until, Some(now + Duration::minutes(40)));
        assert_eq!(risk.kill_switch_activations, 1);
    }

    #[test]
    fn test_kill_switch_monotonic_randomized() {
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..100 {
            let (mut risk, start) = state();
            let mut now = start;
            let mut halted_until: Option<DateTime<Utc>> = None;

            for _ in 0..200 {
                now = now + Duration::seconds(rng.gen_range(0..120));
                match rng.gen_range(0..4) {
                    0 => {
                        risk.activate_kill_switch(Duration::minutes(rng.gen_range(1..60)), now);
                    }
                    1 => {
                        risk.expire_kill_switch(now);
                    }
                    2 => risk.reset_daily(now.date_naive()),
                    _ => {}
                }

                // Once halted until T, every read before T stays halted
                if let Some(until) = halted_until {
                    if now < until {
                        assert!(risk.is_halted(now));
                        assert!(risk.kill_switch_until.is_some_and(|u| u >= until));
                    }
                }
                if risk.is_halted(now) {
                    halted_until = risk.kill_switch_until;
                }
            }
        }
    }

    #[test]
    fn test_drawdown_breach() {
        let (mut risk, _) = state();

        risk.daily_pnl = dec!(-49.99);
        assert!(!risk.drawdown_breached(dec!(0.05)));

        risk.daily_pnl = dec!(-50);
        assert!(risk.drawdown_breached(dec!(0.05)));

        risk.portfolio_value = dec!(0);
        risk.daily_pnl = dec!(0);
        assert!(!risk.drawdown_breached(dec!(0.05)));
    }

    #[test]
    fn test_reset_daily_keeps_kill_switch() {
        let (mut risk, now) = state();
        risk.daily_pnl = dec!(-10);
        risk.activate_kill_switch(Duration::minutes(30), now);

        let tomorrow = now + Duration::days(1);
        risk.reset_daily(tomorrow.date_naive());
        assert_eq!(risk.daily_pnl, dec!(0));
        assert_eq!(risk.kill_switch_activations, 0);
        assert!(risk.kill_switch_active);
    }

    #[test]
    fn test_budget_accounting() {
        let config = BudgetConfig::default();
        let mut budget = BudgetState::new(Utc::now().date_naive());

        assert_eq!(budget.available(&config), dec!(100));
        budget.reserve(dec!(25));
        budget.reserve(dec!(25));
        assert_eq!(budget.available(&config), dec!(50));
        assert_eq!(budget.trades, 2);

        budget.release(dec!(25));
        assert_eq!(budget.available(&config), dec!(75));
        assert_eq!(budget.trades, 1);

        budget.spent_usd = dec!(150);
        assert_eq!(budget.available(&config), dec!(0));
    }
}
