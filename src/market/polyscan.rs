//! PolymarketScan API client for market discovery
//!
//! The API is a single endpoint driven by an `action` query parameter.
//! Every request carries the agent id. Responses are wrapped in
//! `{"ok": bool, "data": ..., "error": ...}`.

use super::breaker::CircuitBreaker;
use super::{MarketCandidate, MarketClient, MarketError, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::Mutex;

use crate::config::MarketConfig;

/// Client for the PolymarketScan agent API
pub struct PolyscanClient {
    config: MarketConfig,
    client: Client,
    state: Mutex<ClientState>,
}

#[derive(Default)]
struct ClientState {
    breaker: CircuitBreaker,
    markets: Option<(DateTime<Utc>, Vec<MarketCandidate>)>,
    quotes: HashMap<String, (DateTime<Utc>, Quote)>,
}

impl PolyscanClient {
    /// Create a client; `timeout` bounds every HTTP request
    pub fn new(config: MarketConfig, timeout: std::time::Duration) -> Result<Self, MarketError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MarketError::Fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            state: Mutex::new(ClientState::default()),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        params: &[(&str, String)],
    ) -> Result<T, MarketError> {
        {
            let state = self.state.lock().await;
            if state.breaker.is_open(Utc::now()) {
                return Err(MarketError::Transient(format!(
                    "circuit open until {:?}",
                    state.breaker.open_until()
                )));
            }
        }

        let result = self.send(params).await;

        let mut state = self.state.lock().await;
        match &result {
            Ok(_) => state.breaker.on_success(),
            Err(_) => state.breaker.on_failure(Utc::now()),
        }
        result
    }

    async fn send<T: DeserializeOwned>(&self, params: &[(&str, String)]) -> Result<T, MarketError> {
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("agent_id", self.config.agent_id.clone()));

        tracing::debug!(url = %self.config.base_url, ?query, "Polyscan request");

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&query)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| MarketError::Fatal(format!("undecodable response: {e}")))?;

        if !envelope.ok {
            return Err(MarketError::Transient(
                envelope
                    .error
                    .unwrap_or_else(|| "Polyscan request failed".to_string()),
            ));
        }

        envelope
            .data
            .ok_or_else(|| MarketError::Malformed("response without data".to_string()))
    }
}

#[async_trait]
impl MarketClient for PolyscanClient {
    async fn list_candidates(&self) -> Result<Vec<MarketCandidate>, MarketError> {
        let now = Utc::now();
        {
            let state = self.state.lock().await;
            if let Some((expires, cached)) = &state.markets {
                if now < *expires {
                    return Ok(cached.clone());
                }
            }
        }

        let rows: Vec<RawMarket> = self
            .get_json(&[
                ("action", "markets".to_string()),
                ("category", self.config.category.clone()),
                ("limit", self.config.list_limit.to_string()),
                ("offset", "0".to_string()),
                ("sort", "created_at".to_string()),
                ("order", "desc".to_string()),
            ])
            .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for raw in rows {
            match raw.into_candidate() {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => tracing::warn!(error = %e, "Skipping malformed market"),
            }
        }

        let ttl = Duration::seconds(self.config.cache_ttl_markets_secs as i64);
        let mut state = self.state.lock().await;
        state.markets = Some((now + ttl, candidates.clone()));

        Ok(candidates)
    }

    async fn get_quote(&self, market_id: &str) -> Result<Quote, MarketError> {
        let now = Utc::now();
        {
            let state = self.state.lock().await;
            if let Some((expires, quote)) = state.quotes.get(market_id) {
                if now < *expires {
                    return Ok(quote.clone());
                }
            }
        }

        let raw: RawMarket = self
            .get_json(&[("action", "market".to_string()), ("id", market_id.to_string())])
            .await?;
        let quote = raw.into_quote(market_id)?;

        let ttl = Duration::seconds(self.config.cache_ttl_detail_secs as i64);
        let mut state = self.state.lock().await;
        state
            .quotes
            .insert(market_id.to_string(), (now + ttl, quote.clone()));

        Ok(quote)
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> MarketError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        MarketError::Transient(e.to_string())
    } else {
        MarketError::Fatal(e.to_string())
    }
}

fn classify_status(status: StatusCode, body: String) -> MarketError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        MarketError::Transient(format!("{status}: {body}"))
    } else {
        MarketError::Fatal(format!("{status}: {body}"))
    }
}

/// Response wrapper used by every action
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Market record as served by `action=markets` and `action=market`
///
/// Numeric fields arrive as JSON numbers or strings depending on the row.
#[derive(Debug, Deserialize)]
struct RawMarket {
    #[serde(default)]
    market_id: Value,
    title: Option<String>,
    slug: Option<String>,
    category: Option<String>,
    #[serde(default)]
    yes_price: Value,
    #[serde(default)]
    no_price: Value,
    #[serde(default)]
    spread: Value,
    #[serde(default)]
    liquidity_usd: Value,
    closes_at: Option<String>,
    #[serde(default)]
    is_resolved: bool,
}

impl RawMarket {
    fn market_id(&self) -> Option<String> {
        match &self.market_id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn into_candidate(self) -> Result<MarketCandidate, MarketError> {
        let market_id = self
            .market_id()
            .ok_or_else(|| MarketError::Malformed("missing market_id".to_string()))?;

        let resolves_at = match &self.closes_at {
            Some(s) => Some(
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        MarketError::Malformed(format!("{market_id}: bad closes_at {s}: {e}"))
                    })?,
            ),
            None => None,
        };

        Ok(MarketCandidate {
            yes_price: required(&self.yes_price, "yes_price", &market_id)?,
            no_price: required(&self.no_price, "no_price", &market_id)?,
            spread_cents: required(&self.spread, "spread", &market_id)?,
            liquidity_usd: decimal_value(&self.liquidity_usd).unwrap_or(Decimal::ZERO),
            title: self.title.unwrap_or_default(),
            slug: self.slug.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            is_resolved: self.is_resolved,
            resolves_at,
            market_id,
        })
    }

    fn into_quote(self, requested_id: &str) -> Result<Quote, MarketError> {
        let market_id = self.market_id().unwrap_or_else(|| requested_id.to_string());
        Ok(Quote {
            yes_price: required(&self.yes_price, "yes_price", &market_id)?,
            no_price: required(&self.no_price, "no_price", &market_id)?,
            spread_cents: required(&self.spread, "spread", &market_id)?,
            liquidity_usd: decimal_value(&self.liquidity_usd).unwrap_or(Decimal::ZERO),
            market_id,
        })
    }
}

/// Read a number-or-string JSON value as a decimal
pub(crate) fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Prices and spread have no safe default; a row without them is skipped
fn required(value: &Value, field: &str, market_id: &str) -> Result<Decimal, MarketError> {
    decimal_value(value)
        .ok_or_else(|| MarketError::Malformed(format!("{market_id}: missing or invalid {field}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw(json: &str) -> RawMarket {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_decimal_value() {
        assert_eq!(decimal_value(&serde_json::json!(0.52)), Some(dec!(0.52)));
        assert_eq!(decimal_value(&serde_json::json!("0.48")), Some(dec!(0.48)));
        assert_eq!(decimal_value(&serde_json::json!(8000)), Some(dec!(8000)));
        assert_eq!(decimal_value(&serde_json::json!(null)), None);
        assert_eq!(decimal_value(&serde_json::json!("n/a")), None);
    }

    #[test]
    fn test_missing_prices_are_malformed() {
        let result = raw(
            r#"{"market_id": "m9", "closes_at": "2099-12-31T00:00:00+00:00", "liquidity_usd": 5000}"#,
        )
        .into_candidate();
        assert!(matches!(result, Err(MarketError::Malformed(_))));

        let result = raw(r#"{"market_id": "m9"}"#).into_quote("m9");
        assert!(matches!(result, Err(MarketError::Malformed(_))));
    }

    #[test]
    fn test_missing_spread_is_malformed() {
        let result = raw(r#"{"market_id": "m9", "yes_price": 0.5, "no_price": 0.5}"#)
            .into_candidate();
        assert!(matches!(result, Err(MarketError::Malformed(_))));

        let result = raw(r#"{"yes_price": 0.5, "no_price": "0.5", "spread": "n/a"}"#)
            .into_quote("m9");
        assert!(matches!(result, Err(MarketError::Malformed(_))));
    }

    #[test]
    fn test_into_candidate() {
        let market = raw(
            r#"{
                "market_id": "m1",
                "title": "Bitcoin Up or Down - 10:15AM ET",
                "slug": "btc-updown-15m",
                "category": "Crypto",
                "yes_price": 0.52,
                "no_price": "0.48",
                "spread": 1,
                "liquidity_usd": 50000,
                "closes_at": "2099-12-31T00:00:00+00:00",
                "is_resolved": false
            }"#,
        )
        .into_candidate()
        .unwrap();

        assert_eq!(market.market_id, "m1");
        assert_eq!(market.yes_price, dec!(0.52));
        assert_eq!(market.no_price, dec!(0.48));
        assert_eq!(market.spread_cents, dec!(1));
        assert_eq!(market.liquidity_usd, dec!(50000));
        assert!(market.resolves_at.is_some());
    }

    #[test]
    fn test_numeric_market_id() {
        let market = raw(r#"{"market_id": 12345, "yes_price": 0.5, "no_price": 0.5, "spread": 1}"#)
            .into_candidate()
            .unwrap();
        assert_eq!(market.market_id, "12345");
        assert_eq!(market.yes_price, dec!(0.5));
        assert_eq!(market.liquidity_usd, Decimal::ZERO);
        assert!(market.resolves_at.is_none());
    }

    #[test]
    fn test_missing_market_id_is_malformed() {
        let result = raw(r#"{"title": "no id"}"#).into_candidate();
        assert!(matches!(result, Err(MarketError::Malformed(_))));
    }

    #[test]
    fn test_bad_close_time_is_malformed() {
        let result = raw(r#"{"market_id": "m1", "closes_at": "tomorrow"}"#).into_candidate();
        assert!(matches!(result, Err(MarketError::Malformed(_))));
    }

    #[test]
    fn test_into_quote_falls_back_to_requested_id() {
        let quote = raw(r#"{"yes_price": "0.61", "no_price": "0.39", "spread": 2}"#)
            .into_quote("m9")
            .unwrap();
        assert_eq!(quote.market_id, "m9");
        assert_eq!(quote.yes_price, dec!(0.61));
        assert_eq!(quote.spread_cents, dec!(2));
    }

    #[test]
    fn test_envelope_error() {
        let envelope: ApiEnvelope<Vec<RawMarket>> =
            serde_json::from_str(r#"{"ok": false, "error": "rate limited"}"#).unwrap();
        assert!(!envelope.ok);
        assert_eq!(envelope.error.as_deref(), Some("rate limited"));
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(!classify_status(StatusCode::NOT_FOUND, String::new()).is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let config = MarketConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let client = PolyscanClient::new(config, std::time::Duration::from_millis(200)).unwrap();
        let result = client.list_candidates().await;
        assert!(matches!(result, Err(MarketError::Transient(_))));
    }
}
