//! Market types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Outcome side of a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy Yes tokens
    Yes,
    /// Buy No tokens
    No,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }

    /// Parse the venue's "YES"/"NO" spelling
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YES" => Some(Side::Yes),
            "NO" => Some(Side::No),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A market under consideration for trading
///
/// Snapshots are replaced wholesale on every watchlist refresh, never
/// patched in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCandidate {
    pub market_id: String,
    pub title: String,
    pub slug: String,
    pub category: String,
    /// Price of the YES outcome (0..1)
    pub yes_price: Decimal,
    /// Price of the NO outcome (0..1)
    pub no_price: Decimal,
    pub spread_cents: Decimal,
    pub liquidity_usd: Decimal,
    /// Resolution time; `None` when the source omitted it
    pub resolves_at: Option<DateTime<Utc>>,
    pub is_resolved: bool,
}

impl MarketCandidate {
    /// Quoted price of the given outcome
    pub fn price_of(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.yes_price,
            Side::No => self.no_price,
        }
    }

    /// Copy of this snapshot with prices from a fresher quote
    pub fn with_quote(&self, quote: &Quote) -> Self {
        Self {
            yes_price: quote.yes_price,
            no_price: quote.no_price,
            spread_cents: quote.spread_cents,
            liquidity_usd: quote.liquidity_usd,
            ..self.clone()
        }
    }

    /// Current quote view of this snapshot
    pub fn quote(&self) -> Quote {
        Quote {
            market_id: self.market_id.clone(),
            yes_price: self.yes_price,
            no_price: self.no_price,
            liquidity_usd: self.liquidity_usd,
            spread_cents: self.spread_cents,
        }
    }
}

/// Point-in-time quote for one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub market_id: String,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub liquidity_usd: Decimal,
    pub spread_cents: Decimal,
}

impl Quote {
    pub fn price_of(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.yes_price,
            Side::No => self.no_price,
        }
    }
}

/// Market client errors
#[derive(Debug, Error)]
pub enum MarketError {
    /// Timeout, rate limit, open circuit; retry next tick
    #[error("transient market client error: {0}")]
    Transient(String),
    /// Unusable response or misconfiguration; continue with stale data
    #[error("fatal market client error: {0}")]
    Fatal(String),
    /// A record was missing a required field
    #[error("malformed market data: {0}")]
    Malformed(String),
}

impl MarketError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MarketError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_parse() {
        assert_eq!(Side::parse("YES"), Some(Side::Yes));
        assert_eq!(Side::parse(" no "), Some(Side::No));
        assert_eq!(Side::parse("maybe"), None);
    }

    #[test]
    fn test_side_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Yes).unwrap(), "\"yes\"");
        let side: Side = serde_json::from_str("\"no\"").unwrap();
        assert_eq!(side, Side::No);
    }

    #[test]
    fn test_price_of() {
        let quote = Quote {
            market_id: "m1".to_string(),
            yes_price: dec!(0.52),
            no_price: dec!(0.48),
            liquidity_usd: dec!(500),
            spread_cents: dec!(1),
        };
        assert_eq!(quote.price_of(Side::Yes), dec!(0.52));
        assert_eq!(quote.price_of(Side::No), dec!(0.48));
    }

    #[test]
    fn test_with_quote_replaces_prices_only() {
        let candidate = MarketCandidate {
            market_id: "m1".to_string(),
            title: "Bitcoin Up or Down".to_string(),
            slug: "btc-updown".to_string(),
            category: "crypto".to_string(),
            yes_price: dec!(0.50),
            no_price: dec!(0.50),
            spread_cents: dec!(1),
            liquidity_usd: dec!(500),
            resolves_at: None,
            is_resolved: false,
        };
        let quote = Quote {
            market_id: "m1".to_string(),
            yes_price: dec!(0.55),
            no_price: dec!(0.45),
            liquidity_usd: dec!(900),
            spread_cents: dec!(2),
        };

        let fresh = candidate.with_quote(&quote);
        assert_eq!(fresh.yes_price, dec!(0.55));
        assert_eq!(fresh.spread_cents, dec!(2));
        assert_eq!(fresh.title, candidate.title);
    }

    #[test]
    fn test_transient_classification() {
        assert!(MarketError::Transient("timeout".into()).is_transient());
        assert!(!MarketError::Fatal("bad url".into()).is_transient());
    }
}
