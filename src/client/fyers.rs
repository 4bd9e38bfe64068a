//! Fyers API v3 client
//!
//! Handles account queries, quotes, single-day history, and the order
//! lifecycle. Fyers speaks numeric side/type codes and `NSE:SBIN-EQ` style
//! symbols; both stay inside this module.

use crate::client::{build_http, dec_field, int_field, mentions_session, str_field, BrokerApi};
use crate::config::FyersConfig;
use crate::error::{DashError, Result};
use crate::types::{
    DayCandle, Exchange, FundLimits, GttOrder, GttTicket, Holding, Instrument, ModifyOrder,
    NewOrder, OcoTicket, Order, OrderReceipt, OrderState, OrderType, Position, ProductType, Side,
    Trade,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Application codes Fyers uses for an accepted order action.
/// 1101 is "accepted, queued" and counts as success.
const ACCEPTED_CODES: &[i64] = &[200, 1101];

/// Fyers trading API client
#[derive(Clone)]
pub struct FyersClient {
    http: Client,
    base_url: String,
    client_id: String,
    access_token: String,
}

#[derive(Debug, Serialize)]
struct PlaceOrderBody {
    symbol: String,
    qty: i64,
    #[serde(rename = "type")]
    order_type: i64,
    side: i64,
    #[serde(rename = "productType")]
    product_type: String,
    #[serde(rename = "limitPrice")]
    limit_price: Decimal,
    #[serde(rename = "stopPrice")]
    stop_price: Decimal,
    #[serde(rename = "disclosedQty")]
    disclosed_qty: i64,
    validity: String,
    #[serde(rename = "offlineOrder")]
    offline_order: bool,
    #[serde(rename = "orderTag", skip_serializing_if = "Option::is_none")]
    order_tag: Option<String>,
}

#[derive(Debug, Serialize)]
struct ModifyOrderBody {
    id: String,
    #[serde(rename = "type")]
    order_type: i64,
    qty: i64,
    #[serde(rename = "limitPrice")]
    limit_price: Decimal,
    #[serde(rename = "stopPrice")]
    stop_price: Decimal,
    #[serde(rename = "disclosedQty")]
    disclosed_qty: i64,
}

#[derive(Debug, Serialize)]
struct CancelOrderBody {
    id: String,
}

impl FyersClient {
    /// Create a new client from credentials
    pub fn new(config: &FyersConfig, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            http: build_http(timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn auth_header(&self) -> String {
        format!("{}:{}", self.client_id, self.access_token)
    }

    async fn decode(&self, resp: reqwest::Response) -> Result<Value> {
        if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN {
            return Err(DashError::Auth(
                "broker reported an unauthorized session".to_string(),
            ));
        }
        Ok(resp.json().await?)
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header())
            .query(query)
            .send()
            .await?;
        self.decode(resp).await
    }

    async fn send_json<B: Serialize + Sync>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .request(method, &url)
            .header("Authorization", self.auth_header())
            .json(body)
            .send()
            .await?;
        self.decode(resp).await
    }

    /// Check a data response envelope; auth failures are separated out so the
    /// caller can prompt for re-login instead of retrying.
    pub(crate) fn ensure_ok(body: &Value) -> Result<()> {
        let code = body["code"].as_i64().unwrap_or(0);
        if code == 200 {
            return Ok(());
        }
        let message = str_field(body, &["message", "s"])
            .unwrap_or_else(|| format!("broker returned code {}", code));
        if mentions_session(&message) {
            Err(DashError::Auth(message))
        } else {
            Err(DashError::Broker(message))
        }
    }

    /// Classify an order-action response into a canonical receipt
    pub(crate) fn receipt_from(body: &Value) -> Result<OrderReceipt> {
        let code = body["code"].as_i64().unwrap_or(0);
        if ACCEPTED_CODES.contains(&code) {
            return Ok(OrderReceipt::Accepted {
                order_id: str_field(body, &["id", "orderId"]),
            });
        }
        let message = str_field(body, &["message", "s"])
            .unwrap_or_else(|| format!("broker returned code {}", code));
        if mentions_session(&message) {
            return Err(DashError::Auth(message));
        }
        Ok(OrderReceipt::Rejected { message })
    }

    /// `NSE:SBIN-EQ` for plain equity symbols; pass through already-qualified ones
    pub(crate) fn wire_symbol(instrument: &Instrument) -> String {
        if instrument.symbol.contains(':') {
            instrument.symbol.clone()
        } else {
            format!("{}:{}-EQ", instrument.exchange, instrument.symbol)
        }
    }

    /// Parse `NSE:SBIN-EQ` back into a canonical instrument
    pub(crate) fn parse_symbol(raw: &str) -> Instrument {
        let (exch, rest) = raw.split_once(':').unwrap_or(("NSE", raw));
        let exchange = exch.parse().unwrap_or(Exchange::Nse);
        let symbol = rest.rsplit_once('-').map(|(s, _)| s).unwrap_or(rest);
        Instrument::on(exchange, symbol)
    }

    fn order_type_code(order_type: OrderType) -> i64 {
        match order_type {
            OrderType::Limit => 1,
            OrderType::Market => 2,
            OrderType::StopMarket => 3,
            OrderType::StopLimit => 4,
        }
    }

    fn order_type_from_code(code: i64) -> OrderType {
        match code {
            1 => OrderType::Limit,
            3 => OrderType::StopMarket,
            4 => OrderType::StopLimit,
            _ => OrderType::Market,
        }
    }

    fn side_code(side: Side) -> i64 {
        match side {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    fn side_from_code(code: i64) -> Side {
        if code < 0 {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    fn product_code(product: ProductType) -> String {
        match product {
            ProductType::Cnc => "CNC",
            ProductType::Intraday => "INTRADAY",
            ProductType::Cover => "CO",
            ProductType::Bracket => "BO",
            ProductType::Normal => "MARGIN",
        }
        .to_string()
    }

    fn product_from_code(code: &str) -> ProductType {
        code.parse().unwrap_or(ProductType::Cnc)
    }

    /// Raw order-book status codes, used only when no fill rule applies
    fn raw_state(status: i64) -> OrderState {
        match status {
            3 => OrderState::Cancelled,
            4 => OrderState::Rejected,
            5 => OrderState::Expired,
            6 => OrderState::Open,
            7 => OrderState::TriggerPending,
            _ => OrderState::Unknown,
        }
    }

    pub(crate) fn map_holding(v: &Value) -> Option<Holding> {
        let symbol = str_field(v, &["symbol"])?;
        let mut instrument = Self::parse_symbol(&symbol);
        instrument.isin = str_field(v, &["isin"]);
        Some(Holding {
            instrument,
            quantity: int_field(v, &["quantity", "qty"]).unwrap_or(0),
            avg_price: dec_field(v, &["costPrice"]).unwrap_or(Decimal::ZERO),
            ltp: dec_field(v, &["ltp"]),
            sold_quantity: None,
            sell_amount: None,
        })
    }

    pub(crate) fn map_position(v: &Value) -> Option<Position> {
        let symbol = str_field(v, &["symbol"])?;
        Some(Position {
            instrument: Self::parse_symbol(&symbol),
            net_quantity: int_field(v, &["netQty"]).unwrap_or(0),
            buy_quantity: int_field(v, &["buyQty"]).unwrap_or(0),
            sell_quantity: int_field(v, &["sellQty"]).unwrap_or(0),
            buy_avg: dec_field(v, &["buyAvg"]).unwrap_or(Decimal::ZERO),
            sell_avg: dec_field(v, &["sellAvg"]).unwrap_or(Decimal::ZERO),
            ltp: dec_field(v, &["ltp"]),
            realized_pl: dec_field(v, &["realizedPL"]).unwrap_or(Decimal::ZERO),
            unrealized_pl: dec_field(v, &["unrealizedPL"]).unwrap_or(Decimal::ZERO),
            product: str_field(v, &["productType"])
                .map(|p| Self::product_from_code(&p))
                .unwrap_or(ProductType::Intraday),
        })
    }

    pub(crate) fn map_order(v: &Value) -> Option<Order> {
        let id = str_field(v, &["id"])?;
        let symbol = str_field(v, &["symbol"])?;
        let quantity = int_field(v, &["qty"]).unwrap_or(0);
        let filled = int_field(v, &["filledQty"]).unwrap_or(0);
        let remaining = int_field(v, &["remainingQuantity"]).unwrap_or(quantity - filled);
        let raw = Self::raw_state(int_field(v, &["status"]).unwrap_or(0));
        Some(Order {
            id,
            instrument: Self::parse_symbol(&symbol),
            side: Self::side_from_code(int_field(v, &["side"]).unwrap_or(1)),
            product: str_field(v, &["productType"])
                .map(|p| Self::product_from_code(&p))
                .unwrap_or(ProductType::Cnc),
            order_type: Self::order_type_from_code(int_field(v, &["type"]).unwrap_or(2)),
            quantity,
            filled_quantity: filled,
            remaining_quantity: remaining,
            limit_price: dec_field(v, &["limitPrice"]).unwrap_or(Decimal::ZERO),
            stop_price: dec_field(v, &["stopPrice"]).unwrap_or(Decimal::ZERO),
            state: OrderState::classify(filled, quantity, remaining, raw),
            tag: str_field(v, &["orderTag"]),
            placed_at: str_field(v, &["orderDateTime"]),
        })
    }

    pub(crate) fn map_trade(v: &Value) -> Option<Trade> {
        let symbol = str_field(v, &["symbol"])?;
        let price = dec_field(v, &["tradePrice"]).unwrap_or(Decimal::ZERO);
        let quantity = int_field(v, &["tradedQty"]).unwrap_or(0);
        Some(Trade {
            order_id: str_field(v, &["orderNumber"]).unwrap_or_default(),
            trade_id: str_field(v, &["tradeNumber"]).unwrap_or_default(),
            instrument: Self::parse_symbol(&symbol),
            side: Self::side_from_code(int_field(v, &["side"]).unwrap_or(1)),
            product: str_field(v, &["productType"])
                .map(|p| Self::product_from_code(&p))
                .unwrap_or(ProductType::Cnc),
            price,
            quantity,
            value: dec_field(v, &["tradeValue"])
                .unwrap_or_else(|| price * Decimal::from(quantity)),
            tag: str_field(v, &["orderTag"]),
            traded_at: str_field(v, &["orderDateTime"]),
        })
    }
}

#[async_trait]
impl BrokerApi for FyersClient {
    async fn holdings(&self) -> Result<Vec<Holding>> {
        let body = self.get_json("/holdings", &[]).await?;
        Self::ensure_ok(&body)?;
        let rows = body["holdings"].as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(Self::map_holding).collect())
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        let body = self.get_json("/positions", &[]).await?;
        Self::ensure_ok(&body)?;
        let rows = body["netPositions"].as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(Self::map_position).collect())
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        let body = self.get_json("/orders", &[]).await?;
        Self::ensure_ok(&body)?;
        let rows = body["orderBook"].as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(Self::map_order).collect())
    }

    async fn trades(&self) -> Result<Vec<Trade>> {
        let body = self.get_json("/tradebook", &[]).await?;
        Self::ensure_ok(&body)?;
        let rows = body["tradeBook"].as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(Self::map_trade).collect())
    }

    async fn funds(&self) -> Result<FundLimits> {
        let body = self.get_json("/funds", &[]).await?;
        Self::ensure_ok(&body)?;
        let row = body["fund_limit"]
            .as_array()
            .and_then(|a| a.first().cloned())
            .unwrap_or(Value::Null);
        Ok(FundLimits {
            available_funds: dec_field(&row, &["availableFunds"]).unwrap_or(Decimal::ZERO),
            used_margin: dec_field(&row, &["usedMargin"]).unwrap_or(Decimal::ZERO),
            net_funds: dec_field(&row, &["netFunds"]).unwrap_or(Decimal::ZERO),
            total_collateral: dec_field(&row, &["totalCollateral"]).unwrap_or(Decimal::ZERO),
        })
    }

    async fn quote(&self, instrument: &Instrument) -> Result<Decimal> {
        let symbol = Self::wire_symbol(instrument);
        let body = self
            .get_json("/quotes", &[("symbols", symbol.clone())])
            .await?;
        Self::ensure_ok(&body)?;
        dec_field(&body["d"][0]["v"], &["lp"])
            .ok_or_else(|| DashError::Parse(format!("no last price for {}", symbol)))
    }

    async fn history(&self, instrument: &Instrument, date: NaiveDate) -> Result<Option<DayCandle>> {
        let day = date.format("%Y-%m-%d").to_string();
        let query = [
            ("symbol", Self::wire_symbol(instrument)),
            ("resolution", "1D".to_string()),
            ("date_format", "1".to_string()),
            ("range_from", day.clone()),
            ("range_to", day),
            ("cont_flag", "1".to_string()),
        ];
        let body = self.get_json("/history", &query).await?;
        Self::ensure_ok(&body)?;

        // Candle row layout: [epoch, open, high, low, close, volume].
        // An empty list means the exchange did not trade that day.
        let Some(candle) = body["candles"].as_array().and_then(|c| c.first()) else {
            return Ok(None);
        };
        let field = |idx: usize| -> Result<Decimal> {
            candle[idx]
                .as_f64()
                .and_then(Decimal::from_f64)
                .ok_or_else(|| DashError::Parse(format!("bad candle field {}", idx)))
        };
        Ok(Some(DayCandle {
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
        }))
    }

    async fn place_order(&self, order: &NewOrder) -> Result<OrderReceipt> {
        let body = PlaceOrderBody {
            symbol: Self::wire_symbol(&order.instrument),
            qty: order.quantity,
            order_type: Self::order_type_code(order.order_type),
            side: Self::side_code(order.side),
            product_type: Self::product_code(order.product),
            limit_price: order.limit_price,
            stop_price: order.stop_price,
            disclosed_qty: order.disclosed_quantity,
            validity: "DAY".to_string(),
            offline_order: false,
            order_tag: order.tag.clone(),
        };
        debug!(symbol = %body.symbol, qty = order.quantity, "placing fyers order");
        let resp = self
            .send_json(reqwest::Method::POST, "/orders", &body)
            .await?;
        Self::receipt_from(&resp)
    }

    async fn modify_order(&self, order: &ModifyOrder) -> Result<OrderReceipt> {
        let body = ModifyOrderBody {
            id: order.order_id.clone(),
            order_type: Self::order_type_code(order.order_type),
            qty: order.quantity,
            limit_price: order.limit_price,
            stop_price: order.stop_price,
            disclosed_qty: order.disclosed_quantity,
        };
        let resp = self
            .send_json(reqwest::Method::PATCH, "/orders", &body)
            .await?;
        Self::receipt_from(&resp)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderReceipt> {
        let body = CancelOrderBody {
            id: order_id.to_string(),
        };
        let resp = self
            .send_json(reqwest::Method::DELETE, "/orders", &body)
            .await?;
        Self::receipt_from(&resp)
    }

    async fn place_gtt(&self, _ticket: &GttTicket) -> Result<OrderReceipt> {
        Err(DashError::Unsupported("fyers GTT orders".to_string()))
    }

    async fn modify_gtt(&self, _alert_id: &str, _ticket: &GttTicket) -> Result<OrderReceipt> {
        Err(DashError::Unsupported("fyers GTT orders".to_string()))
    }

    async fn cancel_gtt(&self, _alert_id: &str) -> Result<OrderReceipt> {
        Err(DashError::Unsupported("fyers GTT orders".to_string()))
    }

    async fn gtt_orders(&self) -> Result<Vec<GttOrder>> {
        Err(DashError::Unsupported("fyers GTT orders".to_string()))
    }

    async fn place_oco(&self, _ticket: &OcoTicket) -> Result<OrderReceipt> {
        Err(DashError::Unsupported("fyers OCO orders".to_string()))
    }

    async fn modify_oco(&self, _alert_id: &str, _ticket: &OcoTicket) -> Result<OrderReceipt> {
        Err(DashError::Unsupported("fyers OCO orders".to_string()))
    }

    async fn cancel_oco(&self, _alert_id: &str) -> Result<OrderReceipt> {
        Err(DashError::Unsupported("fyers OCO orders".to_string()))
    }

    async fn session_alive(&self) -> Result<bool> {
        match self.get_json("/profile", &[]).await {
            Ok(body) => Ok(body["code"].as_i64() == Some(200)),
            Err(DashError::Auth(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
