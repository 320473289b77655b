use crate::domain::clock::Clock;
use crate::domain::entities::order::{
    truncate_to_order_scale, MarketOrder, OrderCompletion, OrderSide,
};
use crate::domain::entities::position::Position;
use crate::domain::entities::price_snapshot::PriceSnapshot;
use crate::domain::errors::ExchangeError;
use crate::domain::repositories::exchange_gateway::{ExchangeGateway, ExchangeResult};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::{DeserializeOwned, Error as DeError};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use sha2::Sha512;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// CoinSpot API endpoints
const COINSPOT_API_BASE: &str = "https://www.coinspot.com.au";
const LATEST_PRICES_PATH: &str = "/pubapi/v2/latest";
const BALANCES_PATH: &str = "/api/v2/ro/my/balances";
const BUY_PATH: &str = "/api/v2/my/buy";
const SELL_PATH: &str = "/api/v2/my/sell";
const COMPLETED_ORDERS_PATH: &str = "/api/v2/ro/my/orders/market/completed";
const BUY_CANCEL_PATH: &str = "/api/v2/my/buy/cancel";
const SELL_CANCEL_PATH: &str = "/api/v2/my/sell/cancel";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Clone)]
pub struct CoinSpotConfig {
    pub api_base: String,
    pub api_key: String,
    pub api_secret: String,
    /// Exchange label stamped on mapped records.
    pub exchange: String,
    /// Market the account trades in, e.g. `AUD`.
    pub quote_currency: String,
}

impl CoinSpotConfig {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_base: COINSPOT_API_BASE.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            exchange: "CoinSpot".to_string(),
            quote_currency: "AUD".to_string(),
        }
    }
}

// --- Response bodies -------------------------------------------------------

/// Accepts a decimal encoded as a JSON string or number; `null` reads as zero.
fn deserialize_decimal<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Null => return Ok(BigDecimal::zero()),
        other => return Err(D::Error::custom(format!("expected a decimal, found {}", other))),
    };
    BigDecimal::from_str(text.trim()).map_err(D::Error::custom)
}

#[derive(Debug, Deserialize)]
pub struct PriceDetail {
    #[serde(deserialize_with = "deserialize_decimal")]
    pub bid: BigDecimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub ask: BigDecimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub last: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct LatestPricesResponse {
    #[serde(default)]
    pub prices: HashMap<String, PriceDetail>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceDetail {
    #[serde(deserialize_with = "deserialize_decimal")]
    pub balance: BigDecimal,
    #[serde(default, deserialize_with = "deserialize_decimal")]
    pub audbalance: BigDecimal,
    #[serde(default, deserialize_with = "deserialize_decimal")]
    pub rate: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct BalancesResponse {
    #[serde(default)]
    pub balances: Vec<HashMap<String, BalanceDetail>>,
}

#[derive(Debug, Deserialize)]
pub struct PlacedOrderResponse {
    pub id: String,
    pub coin: String,
    pub market: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub amount: BigDecimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub rate: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct CompletedOrder {
    pub id: String,
    pub coin: String,
    pub market: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub rate: BigDecimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub amount: BigDecimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub total: BigDecimal,
    pub solddate: DateTime<Utc>,
    #[serde(rename = "audfeeExGst", default, deserialize_with = "deserialize_decimal")]
    pub aud_fee_ex_gst: BigDecimal,
    #[serde(rename = "audGst", default, deserialize_with = "deserialize_decimal")]
    pub aud_gst: BigDecimal,
    #[serde(default, deserialize_with = "deserialize_decimal")]
    pub audtotal: BigDecimal,
}

#[derive(Debug, Deserialize)]
pub struct CompletedOrdersResponse {
    #[serde(default)]
    pub buyorders: Vec<CompletedOrder>,
    #[serde(default)]
    pub sellorders: Vec<CompletedOrder>,
}

// --- Mapping into the domain -------------------------------------------------

/// One snapshot per listed coin, sorted by name, all stamped `timestamp`.
pub fn map_price_snapshots(
    response: LatestPricesResponse,
    exchange: &str,
    currency: &str,
    timestamp: DateTime<Utc>,
) -> Vec<PriceSnapshot> {
    let mut snapshots: Vec<PriceSnapshot> = response
        .prices
        .into_iter()
        .map(|(coin, detail)| {
            PriceSnapshot::new(
                exchange,
                coin.to_uppercase(),
                currency,
                detail.bid,
                detail.ask,
                detail.last,
                timestamp,
            )
        })
        .collect();
    snapshots.sort_by(|a, b| a.name.cmp(&b.name));
    snapshots
}

/// Positions carry the exchange's indicative rate as `current_price`.
pub fn map_positions(
    response: BalancesResponse,
    exchange: &str,
    timestamp: DateTime<Utc>,
) -> Vec<Position> {
    response
        .balances
        .into_iter()
        .flat_map(|entry| entry.into_iter())
        .map(|(coin, detail)| {
            Position::new(exchange, coin.to_uppercase(), detail.balance, detail.rate, timestamp)
        })
        .collect()
}

pub fn map_placed_order(
    response: PlacedOrderResponse,
    side: OrderSide,
    exchange: &str,
    timestamp: DateTime<Utc>,
) -> MarketOrder {
    MarketOrder {
        id: response.id,
        exchange: exchange.to_string(),
        side,
        coin: response.coin.to_uppercase(),
        market: response.market,
        rate: response.rate,
        amount: response.amount,
        completion: None,
        cancelled: false,
        timestamp,
    }
}

fn map_completed_order(
    order: CompletedOrder,
    side: OrderSide,
    exchange: &str,
    timestamp: DateTime<Utc>,
) -> MarketOrder {
    MarketOrder {
        id: order.id,
        exchange: exchange.to_string(),
        side,
        coin: order.coin.to_uppercase(),
        market: order.market,
        rate: order.rate,
        amount: order.amount,
        completion: Some(OrderCompletion {
            total: order.total,
            sold_date: order.solddate,
            fee: order.aud_fee_ex_gst,
            gst: order.aud_gst,
            aud_total: order.audtotal,
        }),
        cancelled: false,
        timestamp,
    }
}

/// Buy orders first, then sell orders.
pub fn map_completed_orders(
    response: CompletedOrdersResponse,
    exchange: &str,
    timestamp: DateTime<Utc>,
) -> Vec<MarketOrder> {
    let buys = response
        .buyorders
        .into_iter()
        .map(|o| map_completed_order(o, OrderSide::Buy, exchange, timestamp));
    let sells = response
        .sellorders
        .into_iter()
        .map(|o| map_completed_order(o, OrderSide::Sell, exchange, timestamp));
    buys.chain(sells).collect()
}

/// Fails unless the envelope's `status` is `ok`.
fn check_status(body: &Value, operation: &str) -> ExchangeResult<()> {
    let status = body.get("status").and_then(Value::as_str).unwrap_or("missing");
    if status == "ok" {
        return Ok(());
    }
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string();
    Err(ExchangeError::BadStatus {
        operation: operation.to_string(),
        status: status.to_string(),
        message,
    })
}

/// Body of a market order. Amount and rate are sent as plain decimal strings
/// cut to the exchange's order scale.
pub fn order_payload(
    asset: &str,
    quantity: &BigDecimal,
    rate: &BigDecimal,
    market: &str,
) -> ExchangeResult<Value> {
    let amount = truncate_to_order_scale(quantity);
    if amount <= BigDecimal::zero() {
        return Err(ExchangeError::InvalidOrder(format!(
            "amount {} {} is below the order scale",
            quantity, asset
        )));
    }
    Ok(json!({
        "cointype": asset.to_uppercase(),
        "amount": amount.to_plain_string(),
        "rate": truncate_to_order_scale(rate).to_plain_string(),
        "markettype": market,
    }))
}

// --- Client ------------------------------------------------------------------

/// CoinSpot client for API interactions
pub struct CoinSpotClient {
    client: Client,
    config: CoinSpotConfig,
    clock: Arc<dyn Clock>,
    last_nonce: AtomicI64,
}

impl CoinSpotClient {
    pub fn new(config: CoinSpotConfig, clock: Arc<dyn Clock>) -> Result<Self, ExchangeError> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(ExchangeError::Authentication(
                "CoinSpot API key and secret are required".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExchangeError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            clock,
            last_nonce: AtomicI64::new(0),
        })
    }

    /// Strictly increasing millisecond nonce.
    fn next_nonce(&self) -> i64 {
        let now = self.clock.now().timestamp_millis();
        let mut previous = self.last_nonce.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(previous + 1);
            match self.last_nonce.compare_exchange(
                previous,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }

    /// Lower-case hex HMAC-SHA512 of `body`, keyed by the API secret.
    pub fn sign(&self, body: &str) -> ExchangeResult<String> {
        let mut mac = HmacSha512::new_from_slice(self.config.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Authentication(format!("HMAC error: {}", e)))?;
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn read_body(response: reqwest::Response, operation: &str) -> ExchangeResult<Value> {
        let http_status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::Network(format!("Failed to read {} response: {}", operation, e)))?;

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => {
                check_status(&body, operation)?;
                Ok(body)
            }
            Err(_) if !http_status.is_success() => Err(ExchangeError::BadStatus {
                operation: operation.to_string(),
                status: http_status.to_string(),
                message: text,
            }),
            Err(e) => Err(ExchangeError::Parse(format!(
                "Invalid JSON in {} response: {}",
                operation, e
            ))),
        }
    }

    fn decode<T: DeserializeOwned>(body: Value, operation: &str) -> ExchangeResult<T> {
        serde_json::from_value(body).map_err(|e| {
            error!("Failed to parse {} response: {}", operation, e);
            ExchangeError::Parse(format!("Failed to parse {} response: {}", operation, e))
        })
    }

    async fn get_public<T: DeserializeOwned>(&self, path: &str, operation: &str) -> ExchangeResult<T> {
        let url = format!("{}{}", self.config.api_base, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(format!("Failed to get {}: {}", operation, e)))?;

        let body = Self::read_body(response, operation).await?;
        Self::decode(body, operation)
    }

    async fn post_private<T: DeserializeOwned>(
        &self,
        path: &str,
        mut payload: Value,
        operation: &str,
    ) -> ExchangeResult<T> {
        if let Value::Object(fields) = &mut payload {
            fields.insert("nonce".to_string(), json!(self.next_nonce()));
        }
        let body = serde_json::to_string(&payload)
            .map_err(|e| ExchangeError::Parse(format!("Failed to encode {} request: {}", operation, e)))?;
        let signature = self.sign(&body)?;

        let url = format!("{}{}", self.config.api_base, path);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("key", &self.config.api_key)
            .header("sign", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(format!("Failed to post {}: {}", operation, e)))?;

        let body = Self::read_body(response, operation).await?;
        Self::decode(body, operation)
    }

    async fn quote(&self, asset: &str, side: OrderSide) -> ExchangeResult<BigDecimal> {
        let snapshots = self.get_price_snapshots().await?;
        let snapshot = snapshots
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(asset))
            .ok_or_else(|| ExchangeError::PriceUnavailable(asset.to_string()))?;
        let rate = match side {
            OrderSide::Buy => snapshot.ask,
            OrderSide::Sell => snapshot.bid,
        };
        if rate <= BigDecimal::zero() {
            return Err(ExchangeError::PriceUnavailable(asset.to_string()));
        }
        Ok(rate)
    }

    async fn place_order(
        &self,
        side: OrderSide,
        asset: &str,
        quantity: &BigDecimal,
    ) -> ExchangeResult<MarketOrder> {
        let rate = self.quote(asset, side).await?;
        let (path, operation) = match side {
            OrderSide::Buy => (BUY_PATH, "market buy"),
            OrderSide::Sell => (SELL_PATH, "market sell"),
        };
        let payload = order_payload(asset, quantity, &rate, &self.config.quote_currency)?;

        let response: PlacedOrderResponse = self.post_private(path, payload, operation).await?;
        info!(
            "CoinSpot accepted {} order {} for {} {} at {}",
            side, response.id, response.amount, response.coin, response.rate
        );
        Ok(map_placed_order(response, side, &self.config.exchange, self.clock.now()))
    }
}

#[async_trait]
impl ExchangeGateway for CoinSpotClient {
    async fn get_price_snapshots(&self) -> ExchangeResult<Vec<PriceSnapshot>> {
        let response: LatestPricesResponse =
            self.get_public(LATEST_PRICES_PATH, "latest prices").await?;
        Ok(map_price_snapshots(
            response,
            &self.config.exchange,
            &self.config.quote_currency,
            self.clock.now(),
        ))
    }

    async fn get_portfolio(&self) -> ExchangeResult<Vec<Position>> {
        let response: BalancesResponse = self
            .post_private(BALANCES_PATH, json!({}), "balances")
            .await?;
        Ok(map_positions(response, &self.config.exchange, self.clock.now()))
    }

    async fn place_market_buy(
        &self,
        asset: &str,
        quantity: &BigDecimal,
    ) -> ExchangeResult<MarketOrder> {
        self.place_order(OrderSide::Buy, asset, quantity).await
    }

    async fn place_market_sell(
        &self,
        asset: &str,
        quantity: &BigDecimal,
    ) -> ExchangeResult<MarketOrder> {
        self.place_order(OrderSide::Sell, asset, quantity).await
    }

    async fn get_completed_orders(&self) -> ExchangeResult<Vec<MarketOrder>> {
        let response: CompletedOrdersResponse = self
            .post_private(COMPLETED_ORDERS_PATH, json!({}), "completed orders")
            .await?;
        Ok(map_completed_orders(response, &self.config.exchange, self.clock.now()))
    }

    async fn cancel_order(&self, id: &str, side: OrderSide) -> ExchangeResult<bool> {
        let path = match side {
            OrderSide::Buy => BUY_CANCEL_PATH,
            OrderSide::Sell => SELL_CANCEL_PATH,
        };
        match self
            .post_private::<Value>(path, json!({ "id": id }), "cancel order")
            .await
        {
            Ok(_) => Ok(true),
            Err(ExchangeError::BadStatus { message, .. }) => {
                warn!("CoinSpot refused to cancel order {}: {}", id, message);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
