//! Broker client abstraction
//!
//! One implementation per broker. Each trait method performs a single
//! authenticated HTTP call and normalizes the broker-native payload into the
//! canonical records in [`crate::types`]. No retries here; retry policy
//! belongs to callers.

pub mod definedge;
pub mod fyers;

pub use definedge::DefinedgeClient;
pub use fyers::FyersClient;

#[cfg(test)]
mod tests;

use crate::error::Result;
use crate::types::{
    DayCandle, FundLimits, GttOrder, GttTicket, Holding, Instrument, ModifyOrder, NewOrder,
    OcoTicket, Order, OrderReceipt, Position, Trade,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde_json::Value;

/// Uniform verbs over a brokerage HTTP API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Demat holdings
    async fn holdings(&self) -> Result<Vec<Holding>>;

    /// Open positions
    async fn positions(&self) -> Result<Vec<Position>>;

    /// Order book
    async fn orders(&self) -> Result<Vec<Order>>;

    /// Trade book
    async fn trades(&self) -> Result<Vec<Trade>>;

    /// Account fund limits
    async fn funds(&self) -> Result<FundLimits>;

    /// Last traded price
    async fn quote(&self, instrument: &Instrument) -> Result<Decimal>;

    /// Single-day OHLC bar; `None` means no trading happened that day
    async fn history(&self, instrument: &Instrument, date: NaiveDate) -> Result<Option<DayCandle>>;

    /// Place a regular order
    async fn place_order(&self, order: &NewOrder) -> Result<OrderReceipt>;

    /// Modify a resting order
    async fn modify_order(&self, order: &ModifyOrder) -> Result<OrderReceipt>;

    /// Cancel a resting order
    async fn cancel_order(&self, order_id: &str) -> Result<OrderReceipt>;

    /// Place a good-till-triggered order
    async fn place_gtt(&self, ticket: &GttTicket) -> Result<OrderReceipt>;

    /// Modify a resting GTT order
    async fn modify_gtt(&self, alert_id: &str, ticket: &GttTicket) -> Result<OrderReceipt>;

    /// Cancel a resting GTT order
    async fn cancel_gtt(&self, alert_id: &str) -> Result<OrderReceipt>;

    /// Resting conditional orders
    async fn gtt_orders(&self) -> Result<Vec<GttOrder>>;

    /// Place a one-cancels-other order pair
    async fn place_oco(&self, ticket: &OcoTicket) -> Result<OrderReceipt>;

    /// Replace the legs of a resting OCO order pair
    async fn modify_oco(&self, alert_id: &str, ticket: &OcoTicket) -> Result<OrderReceipt>;

    /// Cancel a resting OCO order pair
    async fn cancel_oco(&self, alert_id: &str) -> Result<OrderReceipt>;

    /// Probe whether the session credential is still accepted
    async fn session_alive(&self) -> Result<bool>;
}

/// Build the shared HTTP client with the per-call timeout
pub(crate) fn build_http(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Read a decimal field that brokers encode as either a JSON number or string
pub(crate) fn dec_field(v: &Value, keys: &[&str]) -> Option<Decimal> {
    for key in keys {
        let field = &v[*key];
        if let Some(s) = field.as_str() {
            if let Ok(d) = s.trim().parse::<Decimal>() {
                return Some(d);
            }
        }
        if let Some(f) = field.as_f64() {
            if let Some(d) = Decimal::from_f64(f) {
                return Some(d);
            }
        }
    }
    None
}

/// Read an integer field that brokers encode as number, string, or float
pub(crate) fn int_field(v: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        let field = &v[*key];
        if let Some(i) = field.as_i64() {
            return Some(i);
        }
        if let Some(s) = field.as_str() {
            if let Ok(f) = s.trim().parse::<f64>() {
                return Some(f as i64);
            }
        }
        if let Some(f) = field.as_f64() {
            return Some(f as i64);
        }
    }
    None
}

/// Read a non-empty string field
pub(crate) fn str_field(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v[*key].as_str() {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Whether a broker failure message points at an expired session
pub(crate) fn mentions_session(message: &str) -> bool {
    message.to_ascii_lowercase().contains("session")
}
