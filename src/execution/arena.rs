//! PolymarketScan Agent Arena execution client
//!
//! BUY orders are sized in USD, SELL orders in shares. Fills are immediate;
//! the venue's order id is read back from `recent_orders` on the portfolio.

use super::{
    EntryFill, ExecutionClient, ExecutionError, ExitFill, OrderAction, OrderRequest, Portfolio,
    PortfolioPosition,
};
use crate::config::MarketConfig;
use crate::lifecycle::Trade;
use crate::market::{decimal_value, Side};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct ArenaClient {
    base_url: String,
    agent_id: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct PlaceOrderBody<'a> {
    agent_id: &'a str,
    market_id: &'a str,
    side: &'a str,
    amount: f64,
    action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fair_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(default)]
    shares: Value,
    #[serde(default)]
    price: Value,
    #[serde(default)]
    fee: Value,
}

#[derive(Debug, Deserialize)]
struct RawPortfolio {
    #[serde(default)]
    positions: Vec<RawPosition>,
    #[serde(default)]
    recent_orders: Vec<RawOrder>,
    #[serde(default)]
    portfolio_value: Value,
    #[serde(default)]
    cash: Value,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    market_id: String,
    side: String,
    #[serde(default)]
    shares: Value,
    #[serde(default)]
    avg_price: Value,
    #[serde(default)]
    current_price: Value,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    id: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    filled_at: Option<DateTime<Utc>>,
}

impl RawPortfolio {
    /// Newest order as (id, fill time)
    fn newest_order(&self) -> Option<(String, Option<DateTime<Utc>>)> {
        self.recent_orders
            .iter()
            .max_by_key(|o| o.created_at)
            .map(|o| (o.id.clone(), o.filled_at.or(o.created_at)))
    }

    fn into_portfolio(self) -> Portfolio {
        let positions: Vec<PortfolioPosition> = self
            .positions
            .into_iter()
            .filter_map(|p| {
                let side = Side::parse(&p.side)?;
                let avg_price = decimal_value(&p.avg_price).unwrap_or_default();
                Some(PortfolioPosition {
                    market_id: p.market_id,
                    side,
                    shares: decimal_value(&p.shares).unwrap_or_default(),
                    avg_price,
                    current_price: decimal_value(&p.current_price).unwrap_or(avg_price),
                })
            })
            .collect();

        let cash = decimal_value(&self.cash).unwrap_or_default();
        let held: Decimal = positions.iter().map(|p| p.shares * p.current_price).sum();
        Portfolio {
            cash,
            total_value: decimal_value(&self.portfolio_value).unwrap_or(cash + held),
            positions,
        }
    }
}

impl ArenaClient {
    /// Create a client; `timeout` bounds every HTTP request
    pub fn new(config: &MarketConfig, timeout: std::time::Duration) -> Result<Self, ExecutionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutionError::Rejected(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            agent_id: config.agent_id.clone(),
            client,
        })
    }

    async fn place_order(
        &self,
        market_id: &str,
        side: Side,
        amount: Decimal,
        action: OrderAction,
        fair_value: Option<Decimal>,
    ) -> Result<OrderResponse, ExecutionError> {
        let body = PlaceOrderBody {
            agent_id: &self.agent_id,
            market_id,
            side: side.as_str(),
            amount: amount.to_f64().unwrap_or_default(),
            action: action.as_str(),
            fair_value: fair_value.and_then(|v| v.to_f64()),
        };

        tracing::debug!(market_id, side = %side, %amount, action = action.as_str(), "Arena order");
        let response = self
            .client
            .post(&self.base_url)
            .query(&[("action", "place_order")])
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        decode(response).await
    }

    async fn my_portfolio(&self) -> Result<RawPortfolio, ExecutionError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("action", "my_portfolio"), ("agent_id", self.agent_id.as_str())])
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        decode(response).await
    }

    /// Order id and fill time of the order just placed, best effort
    async fn last_order(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        match self.my_portfolio().await {
            Ok(portfolio) => match portfolio.newest_order() {
                Some((id, filled_at)) => (Some(id), filled_at),
                None => (None, None),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Could not read back arena order id");
                (None, None)
            }
        }
    }
}

#[async_trait]
impl ExecutionClient for ArenaClient {
    async fn submit_order(&self, order: &OrderRequest) -> Result<EntryFill, ExecutionError> {
        let resp = self
            .place_order(
                &order.market_id,
                order.side,
                order.size_usd,
                OrderAction::Buy,
                order.fair_value,
            )
            .await?;

        let shares = decimal_value(&resp.shares)
            .ok_or_else(|| ExecutionError::Transient("order response without shares".to_string()))?;
        let price = decimal_value(&resp.price).unwrap_or(order.limit_price);
        let (order_id, filled_at) = self.last_order().await;

        Ok(EntryFill {
            order_id: order_id.unwrap_or_else(|| order.client_order_id.clone()),
            price,
            shares,
            fees: decimal_value(&resp.fee).unwrap_or_default(),
            filled_at: filled_at.unwrap_or_else(Utc::now),
        })
    }

    async fn close_position(
        &self,
        trade: &Trade,
        mark_price: Decimal,
    ) -> Result<ExitFill, ExecutionError> {
        let resp = self
            .place_order(&trade.market_id, trade.side, trade.qty, OrderAction::Sell, None)
            .await?;
        let (order_id, filled_at) = self.last_order().await;

        Ok(ExitFill {
            order_id: order_id.unwrap_or_else(|| trade.exit_client_order_id()),
            price: decimal_value(&resp.price).unwrap_or(mark_price),
            shares: decimal_value(&resp.shares).unwrap_or(trade.qty),
            fees: decimal_value(&resp.fee).unwrap_or_default(),
            filled_at: filled_at.unwrap_or_else(Utc::now),
        })
    }

    async fn portfolio_snapshot(&self) -> Result<Portfolio, ExecutionError> {
        Ok(self.my_portfolio().await?.into_portfolio())
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ExecutionError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, body));
    }

    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| ExecutionError::Transient(format!("undecodable response: {e}")))?;
    into_result(envelope)
}

fn into_result<T>(envelope: Envelope<T>) -> Result<T, ExecutionError> {
    if !envelope.ok {
        return Err(ExecutionError::Rejected(
            envelope
                .error
                .unwrap_or_else(|| "arena request failed".to_string()),
        ));
    }
    envelope
        .data
        .ok_or_else(|| ExecutionError::Transient("response without data".to_string()))
}

fn classify_reqwest_error(e: reqwest::Error) -> ExecutionError {
    if e.is_timeout() {
        ExecutionError::Timeout
    } else {
        ExecutionError::Transient(e.to_string())
    }
}

fn classify_status(status: StatusCode, body: String) -> ExecutionError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ExecutionError::Transient(format!("{status}: {body}"))
    } else {
        ExecutionError::Rejected(format!("{status}: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_response_parses_floats() {
        let resp: OrderResponse =
            serde_json::from_str(r#"{"shares": 1.923077, "price": 0.52, "cost": 1.0}"#).unwrap();
        assert_eq!(decimal_value(&resp.shares), Some(dec!(1.923077)));
        assert_eq!(decimal_value(&resp.price), Some(dec!(0.52)));
        assert!(decimal_value(&resp.fee).is_none());
    }

    #[test]
    fn test_order_body_sends_numbers() {
        let body = PlaceOrderBody {
            agent_id: "agent",
            market_id: "m1",
            side: "YES",
            amount: 1.0,
            action: "BUY",
            fair_value: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["amount"], serde_json::json!(1.0));
        assert!(json.get("fair_value").is_none());
    }

    #[test]
    fn test_portfolio_parsing() {
        let raw: RawPortfolio = serde_json::from_str(
            r#"{
                "portfolio_value": 1002.5,
                "cash": 990.0,
                "positions": [
                    {"market_id": "m1", "side": "YES", "shares": 20, "avg_price": 0.5, "current_price": 0.6},
                    {"market_id": "m2", "side": "MAYBE", "shares": 1}
                ],
                "recent_orders": [
                    {"id": "old", "created_at": "2026-01-01T00:00:00Z"},
                    {"id": "new", "created_at": "2026-01-01T00:01:00Z", "filled_at": "2026-01-01T00:01:01Z"}
                ]
            }"#,
        )
        .unwrap();

        let (id, filled_at) = raw.newest_order().unwrap();
        assert_eq!(id, "new");
        assert_eq!(filled_at.unwrap().to_rfc3339(), "2026-01-01T00:01:01+00:00");

        let portfolio = raw.into_portfolio();
        assert_eq!(portfolio.positions.len(), 1);
        assert_eq!(portfolio.positions[0].side, Side::Yes);
        assert_eq!(portfolio.total_value, dec!(1002.5));
        assert!(portfolio.holds("m1"));
    }

    #[test]
    fn test_portfolio_value_fallback() {
        let raw: RawPortfolio = serde_json::from_str(
            r#"{"cash": 10, "positions": [{"market_id": "m1", "side": "NO", "shares": 4, "avg_price": 0.25}]}"#,
        )
        .unwrap();
        assert_eq!(raw.into_portfolio().total_value, dec!(11));
    }

    #[test]
    fn test_envelope_rejection() {
        let envelope: Envelope<OrderResponse> =
            serde_json::from_str(r#"{"ok": false, "error": "market closed"}"#).unwrap();
        assert_eq!(
            into_result(envelope).unwrap_err(),
            ExecutionError::Rejected("market closed".to_string())
        );
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, String::new()).is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_venue_is_retryable() {
        let config = MarketConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let client = ArenaClient::new(&config, std::time::Duration::from_millis(200)).unwrap();
        let err = client.portfolio_snapshot().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
