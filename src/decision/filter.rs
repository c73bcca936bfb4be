//! Candidate eligibility filtering

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::types::{CandidateError, Eligibility, RejectReason};
use crate::config::{EligibilityConfig, SideMapping};
use crate::market::MarketCandidate;
use crate::signal::{Direction, Signal};

/// Decides whether a candidate market may be traded on a signal
pub struct EligibilityFilter {
    config: EligibilityConfig,
    side_mapping: SideMapping,
}

impl EligibilityFilter {
    pub fn new(config: EligibilityConfig, side_mapping: SideMapping) -> Self {
        Self {
            config,
            side_mapping,
        }
    }

    /// Apply all filters to a candidate
    ///
    /// Business-rule failures come back as `Eligibility::Rejected`; only a
    /// malformed candidate is an error.
    pub fn is_eligible(
        &self,
        candidate: &MarketCandidate,
        signal: &Signal,
        has_active_trade: bool,
        now: DateTime<Utc>,
    ) -> Result<Eligibility, CandidateError> {
        let resolves_at = validate(candidate)?;

        if has_active_trade {
            return Ok(Eligibility::Rejected(RejectReason::ActiveTrade));
        }

        if candidate.spread_cents > self.config.max_spread_cents {
            return Ok(Eligibility::Rejected(RejectReason::Spread));
        }

        if candidate.liquidity_usd < self.config.min_liquidity_usd {
            return Ok(Eligibility::Rejected(RejectReason::Liquidity));
        }

        if (resolves_at - now).num_seconds() < self.config.min_seconds_to_resolution {
            return Ok(Eligibility::Rejected(RejectReason::TimeToResolution));
        }

        let side = match signal.direction {
            Direction::Up => self.side_mapping.up,
            Direction::Down => self.side_mapping.down,
        };
        let price = candidate.price_of(side);
        if price <= Decimal::ZERO || price >= Decimal::ONE {
            return Ok(Eligibility::Rejected(RejectReason::PriceBounds));
        }

        Ok(Eligibility::Eligible)
    }
}

/// Check required fields, returning the resolution time
fn validate(candidate: &MarketCandidate) -> Result<DateTime<Utc>, CandidateError> {
    let market_id = &candidate.market_id;
    if market_id.trim().is_empty() {
        return Err(CandidateError::MissingField {
            market_id: market_id.clone(),
            field: "market_id",
        });
    }

    let resolves_at = candidate
        .resolves_at
        .ok_or_else(|| CandidateError::MissingField {
            market_id: market_id.clone(),
            field: "resolves_at",
        })?;

    for (field, value) in [
        ("yes_price", candidate.yes_price),
        ("no_price", candidate.no_price),
    ] {
        if value < Decimal::ZERO || value > Decimal::ONE {
            return Err(CandidateError::InvalidField {
                market_id: market_id.clone(),
                field,
                value,
            });
        }
    }

    for (field, value) in [
        ("spread_cents", candidate.spread_cents),
        ("liquidity_usd", candidate.liquidity_usd),
    ] {
        if value < Decimal::ZERO {
            return Err(CandidateError::InvalidField {
                market_id: market_id.clone(),
                field,
                value,
            });
        }
    }

    Ok(resolves_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn filter() -> EligibilityFilter {
        EligibilityFilter::new(
            EligibilityConfig {
                max_spread_cents: dec!(5),
                min_liquidity_usd: dec!(250),
                min_seconds_to_resolution: 120,
            },
            SideMapping::default(),
        )
    }

    fn candidate(now: DateTime<Utc>) -> MarketCandidate {
        MarketCandidate {
            market_id: "m1".to_string(),
            title: "Bitcoin Up or Down".to_string(),
            slug: "btc-updown".to_string(),
            category: "Crypto".to_string(),
            yes_price: dec!(0.50),
            no_price: dec!(0.50),
            spread_cents: dec!(1),
            liquidity_usd: dec!(500),
            resolves_at: Some(now + Duration::minutes(10)),
            is_resolved: false,
        }
    }

    fn up_signal(now: DateTime<Utc>) -> Signal {
        Signal {
            timestamp: now,
            direction: Direction::Up,
            magnitude_bps: dec!(60),
        }
    }

    #[test]
    fn test_eligible() {
        let now = Utc::now();
        let result = filter()
            .is_eligible(&candidate(now), &up_signal(now), false, now)
            .unwrap();
        assert_eq!(result, Eligibility::Eligible);
    }

    #[test]
    fn test_reject_wide_spread() {
        let now = Utc::now();
        let mut c = candidate(now);
        c.spread_cents = dec!(6);

        let result = filter().is_eligible(&c, &up_signal(now), false, now).unwrap();
        assert_eq!(result, Eligibility::Rejected(RejectReason::Spread));
        assert_eq!(RejectReason::Spread.as_str(), "spread");
    }

    #[test]
    fn test_spread_at_limit_passes() {
        let now = Utc::now();
        let mut c = candidate(now);
        c.spread_cents = dec!(5);
        assert!(filter()
            .is_eligible(&c, &up_signal(now), false, now)
            .unwrap()
            .is_eligible());
    }

    #[test]
    fn test_reject_low_liquidity() {
        let now = Utc::now();
        let mut c = candidate(now);
        c.liquidity_usd = dec!(100);

        let result = filter().is_eligible(&c, &up_signal(now), false, now).unwrap();
        assert_eq!(result, Eligibility::Rejected(RejectReason::Liquidity));
    }

    #[test]
    fn test_reject_near_resolution() {
        let now = Utc::now();
        let mut c = candidate(now);
        c.resolves_at = Some(now + Duration::seconds(90));

        let result = filter().is_eligible(&c, &up_signal(now), false, now).unwrap();
        assert_eq!(result, Eligibility::Rejected(RejectReason::TimeToResolution));
    }

    #[test]
    fn test_reject_active_trade() {
        let now = Utc::now();
        let result = filter()
            .is_eligible(&candidate(now), &up_signal(now), true, now)
            .unwrap();
        assert_eq!(result, Eligibility::Rejected(RejectReason::ActiveTrade));
    }

    #[test]
    fn test_reject_settled_price() {
        let now = Utc::now();
        let mut c = candidate(now);
        c.no_price = dec!(0);
        let down = Signal {
            direction: Direction::Down,
            ..up_signal(now)
        };

        let result = filter().is_eligible(&c, &down, false, now).unwrap();
        assert_eq!(result, Eligibility::Rejected(RejectReason::PriceBounds));
    }

    #[test]
    fn test_missing_resolution_is_error() {
        let now = Utc::now();
        let mut c = candidate(now);
        c.resolves_at = None;

        let err = filter()
            .is_eligible(&c, &up_signal(now), false, now)
            .unwrap_err();
        assert!(matches!(
            err,
            CandidateError::MissingField {
                field: "resolves_at",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_price_is_error() {
        let now = Utc::now();
        let mut c = candidate(now);
        c.yes_price = dec!(1.5);

        let err = filter()
            .is_eligible(&c, &up_signal(now), false, now)
            .unwrap_err();
        assert!(matches!(
            err,
            CandidateError::InvalidField {
                field: "yes_price",
                ..
            }
        ));
    }

    #[test]
    fn test_empty_market_id_is_error() {
        let now = Utc::now();
        let mut c = candidate(now);
        c.market_id = String::new();
        assert!(filter().is_eligible(&c, &up_signal(now), false, now).is_err());
    }
}
