//! Definedge Integrate API client
//!
//! Session-key authenticated REST client. Integrate reports most numeric
//! fields as strings and uses BUY/SELL + price-type vocabulary; GTT and OCO
//! conditional orders are first-class here.

use crate::client::{build_http, dec_field, int_field, mentions_session, str_field, BrokerApi};
use crate::config::DefinedgeConfig;
use crate::error::{DashError, Result};
use crate::types::{
    DayCandle, Exchange, FundLimits, GttOrder, GttTicket, Holding, Instrument, ModifyOrder,
    NewOrder, OcoTicket, Order, OrderReceipt, OrderState, OrderType, Position, ProductType, Side,
    Trade, TriggerCondition,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Definedge Integrate trading API client
#[derive(Clone)]
pub struct DefinedgeClient {
    http: Client,
    base_url: String,
    api_session_key: String,
    api_secret: String,
}

#[derive(Debug, Serialize)]
struct PlaceOrderBody {
    tradingsymbol: String,
    exchange: String,
    order_type: String,
    quantity: i64,
    product_type: String,
    price_type: String,
    price: String,
    trigger_price: String,
    disclosed_quantity: i64,
    validity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remarks: Option<String>,
}

#[derive(Debug, Serialize)]
struct ModifyOrderBody {
    order_id: String,
    tradingsymbol: String,
    exchange: String,
    order_type: String,
    quantity: i64,
    product_type: String,
    price_type: String,
    price: String,
    trigger_price: String,
    disclosed_quantity: i64,
}

#[derive(Debug, Serialize)]
struct GttOrderBody {
    tradingsymbol: String,
    exchange: String,
    order_type: String,
    quantity: String,
    alert_price: String,
    price: String,
    condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OcoOrderBody {
    tradingsymbol: String,
    exchange: String,
    order_type: String,
    target_quantity: String,
    stoploss_quantity: String,
    target_price: String,
    stoploss_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remarks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert_id: Option<String>,
}

impl DefinedgeClient {
    /// Create a new client from session keys
    pub fn new(config: &DefinedgeConfig, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            http: build_http(timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_session_key: config.api_session_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", &self.api_session_key)
            .header("x-api-secret", &self.api_secret)
    }

    async fn decode(&self, resp: reqwest::Response) -> Result<Value> {
        if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN {
            return Err(DashError::Auth(
                "broker reported an unauthorized session".to_string(),
            ));
        }
        Ok(resp.json().await?)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.authed(self.http.get(&url)).send().await?;
        self.decode(resp).await
    }

    async fn post_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.authed(self.http.post(&url)).json(body).send().await?;
        self.decode(resp).await
    }

    fn failure_message(body: &Value) -> Option<String> {
        let status = str_field(body, &["status"])?.to_ascii_uppercase();
        if matches!(status.as_str(), "FAILED" | "FAIL" | "ERROR") {
            Some(
                str_field(body, &["message", "emsg"])
                    .unwrap_or_else(|| "broker reported failure".to_string()),
            )
        } else {
            None
        }
    }

    /// Data responses: a FAILED/ERROR status is a broker error, an expired
    /// session is an auth error.
    pub(crate) fn ensure_ok(body: &Value) -> Result<()> {
        match Self::failure_message(body) {
            Some(message) if mentions_session(&message) => Err(DashError::Auth(message)),
            Some(message) => Err(DashError::Broker(message)),
            None => Ok(()),
        }
    }

    /// Order-action responses classified into a canonical receipt
    pub(crate) fn receipt_from(body: &Value) -> Result<OrderReceipt> {
        match Self::failure_message(body) {
            Some(message) if mentions_session(&message) => Err(DashError::Auth(message)),
            Some(message) => Ok(OrderReceipt::Rejected { message }),
            None => Ok(OrderReceipt::Accepted {
                order_id: str_field(body, &["order_id", "alert_id", "id"]),
            }),
        }
    }

    /// Quote/history lookups are keyed by token when the broker assigned one
    fn wire_key(instrument: &Instrument) -> &str {
        instrument
            .token
            .as_deref()
            .unwrap_or(instrument.symbol.as_str())
    }

    fn side_code(side: Side) -> String {
        side.to_string()
    }

    fn side_from_code(code: &str) -> Side {
        code.parse().unwrap_or(Side::Buy)
    }

    fn product_code(product: ProductType) -> Result<String> {
        match product {
            ProductType::Cnc => Ok("CNC".to_string()),
            ProductType::Intraday => Ok("MIS".to_string()),
            ProductType::Normal => Ok("NORMAL".to_string()),
            other => Err(DashError::Unsupported(format!(
                "definedge product type {}",
                other
            ))),
        }
    }

    fn product_from_code(code: &str) -> ProductType {
        code.parse().unwrap_or(ProductType::Cnc)
    }

    fn price_type_code(order_type: OrderType) -> String {
        match order_type {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::StopMarket => "SL-MARKET",
            OrderType::StopLimit => "SL-LIMIT",
        }
        .to_string()
    }

    fn order_type_from_price_type(code: &str) -> OrderType {
        match code.to_ascii_uppercase().as_str() {
            "LIMIT" => OrderType::Limit,
            "SL-MARKET" | "SL-M" => OrderType::StopMarket,
            "SL-LIMIT" | "SL-L" => OrderType::StopLimit,
            _ => OrderType::Market,
        }
    }

    fn condition_code(condition: TriggerCondition) -> String {
        match condition {
            TriggerCondition::LtpAbove => "LTP_ABOVE",
            TriggerCondition::LtpBelow => "LTP_BELOW",
        }
        .to_string()
    }

    fn condition_from_code(code: &str) -> TriggerCondition {
        if code.to_ascii_uppercase().contains("BELOW") {
            TriggerCondition::LtpBelow
        } else {
            TriggerCondition::LtpAbove
        }
    }

    /// Raw order-book statuses, used only when no fill rule applies
    fn raw_state(status: &str) -> OrderState {
        match status.to_ascii_uppercase().as_str() {
            "NEW" | "OPEN" | "REPLACED" => OrderState::Open,
            "COMPLETE" | "COMPLETED" => OrderState::Completed,
            "CANCELED" | "CANCELLED" => OrderState::Cancelled,
            "REJECTED" => OrderState::Rejected,
            "EXPIRED" => OrderState::Expired,
            "TRIGGER_PENDING" => OrderState::TriggerPending,
            _ => OrderState::Unknown,
        }
    }

    fn instrument_from(v: &Value, symbol_keys: &[&str]) -> Option<Instrument> {
        let symbol = str_field(v, symbol_keys)?;
        let exchange = str_field(v, &["exchange"])
            .and_then(|e| e.parse::<Exchange>().ok())
            .unwrap_or(Exchange::Nse);
        let mut instrument = Instrument::on(exchange, &symbol);
        instrument.isin = str_field(v, &["isin"]);
        instrument.token = str_field(v, &["token"]);
        Some(instrument)
    }

    /// Holdings rows carry per-exchange listings in a `tradingsymbol` array;
    /// prefer the NSE listing, fall back to the first.
    pub(crate) fn map_holding(v: &Value) -> Option<Holding> {
        let instrument = match v["tradingsymbol"].as_array() {
            Some(listings) if !listings.is_empty() => {
                let nse = listings.iter().find(|l| {
                    str_field(l, &["exchange"]).as_deref() == Some("NSE")
                });
                Self::instrument_from(nse.unwrap_or(&listings[0]), &["tradingsymbol"])?
            }
            _ => Self::instrument_from(v, &["tradingsymbol"])?,
        };
        let dp_qty = int_field(v, &["dp_qty"]).unwrap_or(0);
        let t1_qty = int_field(v, &["t1_qty"]).unwrap_or(0);
        Some(Holding {
            instrument,
            quantity: dp_qty + t1_qty,
            avg_price: dec_field(v, &["avg_buy_price", "average_price"]).unwrap_or(Decimal::ZERO),
            ltp: dec_field(v, &["ltp", "last_price"]),
            // Best-effort partial-exit inputs; see DESIGN.md on the ambiguity
            sold_quantity: int_field(v, &["trade_qty"]).filter(|q| *q > 0),
            sell_amount: dec_field(v, &["sell_amt"]),
        })
    }

    pub(crate) fn map_position(v: &Value) -> Option<Position> {
        let instrument = Self::instrument_from(v, &["tradingsymbol"])?;
        Some(Position {
            instrument,
            net_quantity: int_field(v, &["net_quantity"]).unwrap_or(0),
            buy_quantity: int_field(v, &["total_buy_quantity", "day_buy_quantity"]).unwrap_or(0),
            sell_quantity: int_field(v, &["total_sell_quantity", "day_sell_quantity"])
                .unwrap_or(0),
            buy_avg: dec_field(v, &["total_buy_averageprice", "day_buy_averageprice"])
                .or_else(|| dec_field(v, &["net_averageprice"]))
                .unwrap_or(Decimal::ZERO),
            sell_avg: dec_field(v, &["total_sell_averageprice", "day_sell_averageprice"])
                .unwrap_or(Decimal::ZERO),
            ltp: dec_field(v, &["last_price", "ltp"]),
            realized_pl: dec_field(v, &["realized_pnl"]).unwrap_or(Decimal::ZERO),
            unrealized_pl: dec_field(v, &["unrealized_pnl"]).unwrap_or(Decimal::ZERO),
            product: str_field(v, &["product_type"])
                .map(|p| Self::product_from_code(&p))
                .unwrap_or(ProductType::Intraday),
        })
    }

    pub(crate) fn map_order(v: &Value) -> Option<Order> {
        let id = str_field(v, &["order_id"])?;
        let instrument = Self::instrument_from(v, &["tradingsymbol"])?;
        let quantity = int_field(v, &["quantity"]).unwrap_or(0);
        let remaining = int_field(v, &["pending_qty"]).unwrap_or(0);
        let filled = int_field(v, &["filled_qty"]).unwrap_or(quantity - remaining);
        let raw = Self::raw_state(&str_field(v, &["order_status"]).unwrap_or_default());
        Some(Order {
            id,
            instrument,
            side: Self::side_from_code(&str_field(v, &["order_type"]).unwrap_or_default()),
            product: str_field(v, &["product_type"])
                .map(|p| Self::product_from_code(&p))
                .unwrap_or(ProductType::Cnc),
            order_type: Self::order_type_from_price_type(
                &str_field(v, &["price_type"]).unwrap_or_default(),
            ),
            quantity,
            filled_quantity: filled,
            remaining_quantity: remaining,
            limit_price: dec_field(v, &["price"]).unwrap_or(Decimal::ZERO),
            stop_price: dec_field(v, &["trigger_price"]).unwrap_or(Decimal::ZERO),
            state: OrderState::classify(filled, quantity, remaining, raw),
            tag: str_field(v, &["remarks"]),
            placed_at: str_field(v, &["order_entry_time", "exchange_time"]),
        })
    }

    pub(crate) fn map_trade(v: &Value) -> Option<Trade> {
        let instrument = Self::instrument_from(v, &["tradingsymbol"])?;
        let price = dec_field(v, &["trade_price", "price"]).unwrap_or(Decimal::ZERO);
        let quantity = int_field(v, &["trade_quantity", "filled_qty", "quantity"]).unwrap_or(0);
        Some(Trade {
            order_id: str_field(v, &["order_id"]).unwrap_or_default(),
            trade_id: str_field(v, &["trade_id", "fill_id"]).unwrap_or_default(),
            instrument,
            side: Self::side_from_code(&str_field(v, &["order_type"]).unwrap_or_default()),
            product: str_field(v, &["product_type"])
                .map(|p| Self::product_from_code(&p))
                .unwrap_or(ProductType::Cnc),
            price,
            quantity,
            value: price * Decimal::from(quantity),
            tag: str_field(v, &["remarks"]),
            traded_at: str_field(v, &["fill_time", "exchange_time"]),
        })
    }

    pub(crate) fn map_gtt(v: &Value) -> Option<GttOrder> {
        let alert_id = str_field(v, &["alert_id"])?;
        let instrument = Self::instrument_from(v, &["tradingsymbol"])?;
        Some(GttOrder {
            alert_id,
            instrument,
            side: Self::side_from_code(&str_field(v, &["order_type"]).unwrap_or_default()),
            quantity: int_field(v, &["quantity"]).unwrap_or(0),
            trigger_price: dec_field(v, &["alert_price"]).unwrap_or(Decimal::ZERO),
            price: dec_field(v, &["price"]).unwrap_or(Decimal::ZERO),
            condition: Self::condition_from_code(
                &str_field(v, &["condition"]).unwrap_or_default(),
            ),
        })
    }

    fn gtt_body(ticket: &GttTicket, alert_id: Option<&str>) -> GttOrderBody {
        GttOrderBody {
            tradingsymbol: ticket.instrument.symbol.clone(),
            exchange: ticket.instrument.exchange.code().to_string(),
            order_type: Self::side_code(ticket.side),
            quantity: ticket.quantity.to_string(),
            alert_price: ticket.trigger_price.to_string(),
            price: ticket.price.to_string(),
            condition: Self::condition_code(ticket.condition),
            alert_id: alert_id.map(|s| s.to_string()),
        }
    }

    fn oco_body(ticket: &OcoTicket, alert_id: Option<&str>) -> OcoOrderBody {
        OcoOrderBody {
            tradingsymbol: ticket.instrument.symbol.clone(),
            exchange: ticket.instrument.exchange.code().to_string(),
            order_type: Self::side_code(ticket.side),
            target_quantity: ticket.target.quantity.to_string(),
            stoploss_quantity: ticket.stoploss.quantity.to_string(),
            target_price: ticket.target.price.to_string(),
            stoploss_price: ticket.stoploss.price.to_string(),
            remarks: ticket.remarks.clone(),
            alert_id: alert_id.map(|s| s.to_string()),
        }
    }
}

#[async_trait]
impl BrokerApi for DefinedgeClient {
    async fn holdings(&self) -> Result<Vec<Holding>> {
        let body = self.get_json("/holdings").await?;
        Self::ensure_ok(&body)?;
        let rows = body["data"].as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(Self::map_holding).collect())
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        let body = self.get_json("/positions").await?;
        Self::ensure_ok(&body)?;
        let rows = body["positions"].as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(Self::map_position).collect())
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        let body = self.get_json("/orders").await?;
        Self::ensure_ok(&body)?;
        let rows = body["orders"].as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(Self::map_order).collect())
    }

    async fn trades(&self) -> Result<Vec<Trade>> {
        let body = self.get_json("/tradebook").await?;
        Self::ensure_ok(&body)?;
        let rows = body["trades"].as_array().cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(Self::map_trade).collect())
    }

    async fn funds(&self) -> Result<FundLimits> {
        let body = self.get_json("/limits").await?;
        Self::ensure_ok(&body)?;
        let available = dec_field(&body, &["cash", "available_balance"]).unwrap_or(Decimal::ZERO);
        let used = dec_field(&body, &["margin_used", "utilized_margin"]).unwrap_or(Decimal::ZERO);
        Ok(FundLimits {
            available_funds: available,
            used_margin: used,
            net_funds: dec_field(&body, &["net", "net_funds"]).unwrap_or(available - used),
            total_collateral: dec_field(&body, &["collateral", "total_collateral"])
                .unwrap_or(Decimal::ZERO),
        })
    }

    async fn quote(&self, instrument: &Instrument) -> Result<Decimal> {
        let path = format!(
            "/quotes/{}/{}",
            instrument.exchange.code(),
            Self::wire_key(instrument)
        );
        let body = self.get_json(&path).await?;
        Self::ensure_ok(&body)?;
        dec_field(&body, &["ltp", "last_traded_price", "lp"])
            .ok_or_else(|| DashError::Parse(format!("no last price for {}", instrument)))
    }

    async fn history(&self, instrument: &Instrument, date: NaiveDate) -> Result<Option<DayCandle>> {
        // Day candles come back as CSV lines: datetime,open,high,low,close,volume
        let from = date.format("%d%m%Y0000").to_string();
        let to = date.format("%d%m%Y2359").to_string();
        let url = format!(
            "{}/history/{}/{}/day/{}/{}",
            self.base_url,
            instrument.exchange.code(),
            Self::wire_key(instrument),
            from,
            to
        );
        let resp = self.authed(self.http.get(&url)).send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN {
            return Err(DashError::Auth(
                "broker reported an unauthorized session".to_string(),
            ));
        }
        let text = resp.text().await?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if trimmed.starts_with('{') {
            // Error payloads come back as JSON; a FAILED day lookup on a
            // holiday is just "no data", anything else is a real failure.
            let body: Value =
                serde_json::from_str(trimmed).map_err(|e| DashError::Parse(e.to_string()))?;
            return match Self::failure_message(&body) {
                Some(message) if mentions_session(&message) => Err(DashError::Auth(message)),
                Some(_) => Ok(None),
                None => Ok(None),
            };
        }
        let line = match trimmed.lines().next() {
            Some(l) => l,
            None => return Ok(None),
        };
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 5 {
            return Err(DashError::Parse(format!("bad candle line: {}", line)));
        }
        let num = |idx: usize| -> Result<Decimal> {
            fields[idx]
                .trim()
                .parse::<Decimal>()
                .map_err(|_| DashError::Parse(format!("bad candle field: {}", fields[idx])))
        };
        Ok(Some(DayCandle {
            open: num(1)?,
            high: num(2)?,
            low: num(3)?,
            close: num(4)?,
        }))
    }

    async fn place_order(&self, order: &NewOrder) -> Result<OrderReceipt> {
        let body = PlaceOrderBody {
            tradingsymbol: order.instrument.symbol.clone(),
            exchange: order.instrument.exchange.code().to_string(),
            order_type: Self::side_code(order.side),
            quantity: order.quantity,
            product_type: Self::product_code(order.product)?,
            price_type: Self::price_type_code(order.order_type),
            price: order.limit_price.to_string(),
            trigger_price: order.stop_price.to_string(),
            disclosed_quantity: order.disclosed_quantity,
            validity: "DAY".to_string(),
            remarks: order.tag.clone(),
        };
        debug!(symbol = %body.tradingsymbol, qty = order.quantity, "placing definedge order");
        let resp = self.post_json("/placeorder", &body).await?;
        Self::receipt_from(&resp)
    }

    async fn modify_order(&self, order: &ModifyOrder) -> Result<OrderReceipt> {
        // Integrate's modify wants the full order context; read it back from
        // the book the way the dashboard flow does.
        let book = self.orders().await?;
        let existing = book
            .into_iter()
            .find(|o| o.id == order.order_id)
            .ok_or_else(|| {
                DashError::Broker(format!("order {} not found in order book", order.order_id))
            })?;
        let body = ModifyOrderBody {
            order_id: order.order_id.clone(),
            tradingsymbol: existing.instrument.symbol.clone(),
            exchange: existing.instrument.exchange.code().to_string(),
            order_type: Self::side_code(existing.side),
            quantity: order.quantity,
            product_type: Self::product_code(existing.product)?,
            price_type: Self::price_type_code(order.order_type),
            price: order.limit_price.to_string(),
            trigger_price: order.stop_price.to_string(),
            disclosed_quantity: order.disclosed_quantity,
        };
        let resp = self.post_json("/modify", &body).await?;
        Self::receipt_from(&resp)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderReceipt> {
        let body = self.get_json(&format!("/cancel/{}", order_id)).await?;
        Self::receipt_from(&body)
    }

    async fn place_gtt(&self, ticket: &GttTicket) -> Result<OrderReceipt> {
        let body = Self::gtt_body(ticket, None);
        let resp = self.post_json("/gttplaceorder", &body).await?;
        Self::receipt_from(&resp)
    }

    async fn modify_gtt(&self, alert_id: &str, ticket: &GttTicket) -> Result<OrderReceipt> {
        let body = Self::gtt_body(ticket, Some(alert_id));
        let resp = self.post_json("/gttmodify", &body).await?;
        Self::receipt_from(&resp)
    }

    async fn cancel_gtt(&self, alert_id: &str) -> Result<OrderReceipt> {
        let body = self.get_json(&format!("/gttcancel/{}", alert_id)).await?;
        Self::receipt_from(&body)
    }

    async fn gtt_orders(&self) -> Result<Vec<GttOrder>> {
        let body = self.get_json("/gttorders").await?;
        Self::ensure_ok(&body)?;
        let rows = body["pendingGTTOrderBook"]
            .as_array()
            .or_else(|| body["data"].as_array())
            .cloned()
            .unwrap_or_default();
        Ok(rows.iter().filter_map(Self::map_gtt).collect())
    }

    async fn place_oco(&self, ticket: &OcoTicket) -> Result<OrderReceipt> {
        let body = Self::oco_body(ticket, None);
        let resp = self.post_json("/ocoplaceorder", &body).await?;
        Self::receipt_from(&resp)
    }

    async fn modify_oco(&self, alert_id: &str, ticket: &OcoTicket) -> Result<OrderReceipt> {
        let body = Self::oco_body(ticket, Some(alert_id));
        let resp = self.post_json("/ocomodify", &body).await?;
        Self::receipt_from(&resp)
    }

    async fn cancel_oco(&self, alert_id: &str) -> Result<OrderReceipt> {
        let body = self.get_json(&format!("/ococancel/{}", alert_id)).await?;
        Self::receipt_from(&body)
    }

    async fn session_alive(&self) -> Result<bool> {
        match self.get_json("/holdings").await.and_then(|b| {
            Self::ensure_ok(&b)
        }) {
            Ok(()) => Ok(true),
            Err(DashError::Auth(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
