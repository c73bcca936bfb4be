//! Watchlist of tradeable markets
//!
//! Keeps the latest candidate snapshots for short-horizon "Up or Down"
//! markets, refreshed on a fixed interval. Each refresh replaces the whole
//! set and reports which markets joined or left it.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;

use super::MarketCandidate;
use crate::config::{EligibilityConfig, WatchlistConfig};

/// Markets that joined or left the watchlist on a refresh
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchlistDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl WatchlistDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct Watchlist {
    refresh_interval: Duration,
    max_markets: usize,
    title_keywords: Vec<String>,
    min_liquidity_usd: Decimal,
    min_seconds_to_close: i64,
    candidates: Vec<MarketCandidate>,
    last_refresh: Option<DateTime<Utc>>,
}

impl Watchlist {
    pub fn new(config: &WatchlistConfig, eligibility: &EligibilityConfig) -> Self {
        Self {
            refresh_interval: Duration::seconds(config.refresh_seconds as i64),
            max_markets: config.max_watchlist_markets,
            title_keywords: config.title_keywords.clone(),
            min_liquidity_usd: eligibility.min_liquidity_usd,
            min_seconds_to_close: eligibility.min_seconds_to_resolution,
            candidates: Vec::new(),
            last_refresh: None,
        }
    }

    /// Whether enough time has passed since the last refresh
    pub fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_refresh {
            Some(last) => now - last >= self.refresh_interval,
            None => true,
        }
    }

    /// Record a refresh attempt so a failing source is not hammered every tick
    pub fn mark_attempt(&mut self, now: DateTime<Utc>) {
        self.last_refresh = Some(now);
    }

    /// Replace the watchlist with the eligible subset of `listed`
    pub fn apply(&mut self, listed: Vec<MarketCandidate>, now: DateTime<Utc>) -> WatchlistDiff {
        let cutoff = now + Duration::seconds(self.min_seconds_to_close);

        let mut rows: Vec<MarketCandidate> = listed
            .into_iter()
            .filter(|m| !m.is_resolved)
            .filter(|m| m.resolves_at.is_some_and(|t| t > cutoff))
            .filter(|m| m.liquidity_usd >= self.min_liquidity_usd)
            .filter(|m| self.matches_keywords(m))
            .collect();

        rows.sort_by_key(|m| m.resolves_at);
        rows.truncate(self.max_markets);

        let old_ids: HashSet<&str> = self.candidates.iter().map(|m| m.market_id.as_str()).collect();
        let new_ids: HashSet<&str> = rows.iter().map(|m| m.market_id.as_str()).collect();

        let mut diff = WatchlistDiff {
            added: new_ids
                .difference(&old_ids)
                .map(|s| s.to_string())
                .collect(),
            removed: old_ids
                .difference(&new_ids)
                .map(|s| s.to_string())
                .collect(),
        };
        diff.added.sort();
        diff.removed.sort();

        self.candidates = rows;
        self.last_refresh = Some(now);

        tracing::info!(
            markets = self.candidates.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Watchlist refreshed"
        );

        diff
    }

    fn matches_keywords(&self, market: &MarketCandidate) -> bool {
        self.title_keywords
            .iter()
            .any(|k| market.title.contains(k.as_str()))
            || market.slug.contains("updown")
    }

    /// Current candidates, soonest resolution first
    pub fn candidates(&self) -> &[MarketCandidate] {
        &self.candidates
    }

    pub fn get(&self, market_id: &str) -> Option<&MarketCandidate> {
        self.candidates.iter().find(|m| m.market_id == market_id)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market(id: &str, title: &str, closes_in_mins: i64, now: DateTime<Utc>) -> MarketCandidate {
        MarketCandidate {
            market_id: id.to_string(),
            title: title.to_string(),
            slug: String::new(),
            category: "Crypto".to_string(),
            yes_price: dec!(0.52),
            no_price: dec!(0.48),
            spread_cents: dec!(1),
            liquidity_usd: dec!(10000),
            resolves_at: Some(now + Duration::minutes(closes_in_mins)),
            is_resolved: false,
        }
    }

    fn watchlist(max: usize) -> Watchlist {
        Watchlist::new(
            &WatchlistConfig {
                refresh_seconds: 15,
                max_watchlist_markets: max,
                title_keywords: vec!["Up or Down".to_string()],
            },
            &EligibilityConfig::default(),
        )
    }

    #[test]
    fn test_filters_and_sorts() {
        let now = Utc::now();
        let mut wl = watchlist(8);

        let mut resolved = market("resolved", "Bitcoin Up or Down", 30, now);
        resolved.is_resolved = true;
        let mut thin = market("thin", "Bitcoin Up or Down", 30, now);
        thin.liquidity_usd = dec!(10);
        let mut no_close = market("no-close", "Bitcoin Up or Down", 30, now);
        no_close.resolves_at = None;
        let mut by_slug = market("slug", "Something else", 20, now);
        by_slug.slug = "btc-updown-15m".to_string();

        wl.apply(
            vec![
                market("late", "Bitcoin Up or Down", 60, now),
                market("soon", "Bitcoin Up or Down", 10, now),
                market("closing", "Bitcoin Up or Down", 1, now),
                market("election", "Who wins?", 30, now),
                resolved,
                thin,
                no_close,
                by_slug,
            ],
            now,
        );

        let ids: Vec<&str> = wl.candidates().iter().map(|m| m.market_id.as_str()).collect();
        assert_eq!(ids, vec!["soon", "slug", "late"]);
    }

    #[test]
    fn test_caps_size() {
        let now = Utc::now();
        let mut wl = watchlist(2);
        wl.apply(
            (0..5)
                .map(|i| market(&format!("m{i}"), "Bitcoin Up or Down", 10 + i, now))
                .collect(),
            now,
        );
        assert_eq!(wl.len(), 2);
        assert!(wl.get("m0").is_some());
        assert!(wl.get("m4").is_none());
    }

    #[test]
    fn test_diff_reports_rotation() {
        let now = Utc::now();
        let mut wl = watchlist(8);

        let diff = wl.apply(
            vec![
                market("a", "Bitcoin Up or Down", 10, now),
                market("b", "Bitcoin Up or Down", 20, now),
            ],
            now,
        );
        assert_eq!(diff.added, vec!["a", "b"]);
        assert!(diff.removed.is_empty());

        let diff = wl.apply(
            vec![
                market("b", "Bitcoin Up or Down", 20, now),
                market("c", "Bitcoin Up or Down", 30, now),
            ],
            now,
        );
        assert_eq!(diff.added, vec!["c"]);
        assert_eq!(diff.removed, vec!["a"]);
    }

    #[test]
    fn test_refresh_due() {
        let now = Utc::now();
        let mut wl = watchlist(8);
        assert!(wl.refresh_due(now));

        wl.mark_attempt(now);
        assert!(!wl.refresh_due(now + Duration::seconds(5)));
        assert!(wl.refresh_due(now + Duration::seconds(15)));
    }
}
