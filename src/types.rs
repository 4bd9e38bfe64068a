//! Canonical records shared across the dashboard
//!
//! Broker clients normalize their native JSON into these types; broker field
//! vocabularies never leak past the client boundary.

use crate::error::DashError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exchange segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    Nse,
    Bse,
}

impl Exchange {
    pub fn code(&self) -> &'static str {
        match self {
            Exchange::Nse => "NSE",
            Exchange::Bse => "BSE",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Exchange {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NSE" => Ok(Exchange::Nse),
            "BSE" => Ok(Exchange::Bse),
            other => Err(DashError::InvalidParameter(format!(
                "unknown exchange: {}",
                other
            ))),
        }
    }
}

/// Exchange-qualified instrument identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub exchange: Exchange,
    pub symbol: String,
    pub isin: Option<String>,
    /// Broker-assigned numeric token, when the broker keys quotes by token
    pub token: Option<String>,
}

impl Instrument {
    /// NSE equity by plain trading symbol
    pub fn equity(symbol: &str) -> Self {
        Self {
            exchange: Exchange::Nse,
            symbol: symbol.trim().to_ascii_uppercase(),
            isin: None,
            token: None,
        }
    }

    pub fn on(exchange: Exchange, symbol: &str) -> Self {
        Self {
            exchange,
            symbol: symbol.trim().to_ascii_uppercase(),
            isin: None,
            token: None,
        }
    }

    /// Stable key for per-pass memoization
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.exchange, self.symbol)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" | "B" => Ok(Side::Buy),
            "SELL" | "S" => Ok(Side::Sell),
            other => Err(DashError::InvalidParameter(format!(
                "unknown side: {}",
                other
            ))),
        }
    }
}

/// Product type (settlement class)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    /// Delivery (cash and carry)
    Cnc,
    /// Same-day settled intraday (MIS on some brokers)
    Intraday,
    /// Cover order
    Cover,
    /// Bracket order
    Bracket,
    /// Carry-forward margin product
    Normal,
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProductType::Cnc => "CNC",
            ProductType::Intraday => "INTRADAY",
            ProductType::Cover => "CO",
            ProductType::Bracket => "BO",
            ProductType::Normal => "NORMAL",
        };
        f.write_str(s)
    }
}

impl FromStr for ProductType {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CNC" => Ok(ProductType::Cnc),
            "INTRADAY" | "MIS" => Ok(ProductType::Intraday),
            "CO" | "COVER" => Ok(ProductType::Cover),
            "BO" | "BRACKET" => Ok(ProductType::Bracket),
            "NORMAL" | "NRML" => Ok(ProductType::Normal),
            other => Err(DashError::InvalidParameter(format!(
                "unknown product type: {}",
                other
            ))),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    StopMarket,
    StopLimit,
}

impl OrderType {
    /// Whether this order type carries a limit price
    pub fn uses_limit_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    /// Whether this order type carries a stop (trigger) price
    pub fn uses_stop_price(&self) -> bool {
        matches!(self, OrderType::StopMarket | OrderType::StopLimit)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::StopMarket => "SL-M",
            OrderType::StopLimit => "SL-L",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderType {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LIMIT" | "L" => Ok(OrderType::Limit),
            "MARKET" | "M" => Ok(OrderType::Market),
            "SL-M" | "SLM" | "STOP" => Ok(OrderType::StopMarket),
            "SL-L" | "SLL" | "STOPLIMIT" => Ok(OrderType::StopLimit),
            other => Err(DashError::InvalidParameter(format!(
                "unknown order type: {}",
                other
            ))),
        }
    }
}

/// Canonical order state for book display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Completed,
    PartiallyFilled,
    Pending,
    Cancelled,
    Rejected,
    Expired,
    Open,
    TriggerPending,
    Unknown,
}

impl OrderState {
    /// Classify an order from its fill counters and raw broker state.
    ///
    /// Fill-based classification wins; the raw state decides only when no
    /// fill rule applies.
    pub fn classify(filled: i64, requested: i64, remaining: i64, raw: OrderState) -> OrderState {
        if requested > 0 && filled == requested {
            OrderState::Completed
        } else if filled > 0 && filled < requested {
            OrderState::PartiallyFilled
        } else if filled == 0 && remaining > 0 {
            OrderState::Pending
        } else {
            raw
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::Completed => "Completed",
            OrderState::PartiallyFilled => "Partially Filled",
            OrderState::Pending => "Pending",
            OrderState::Cancelled => "Cancelled",
            OrderState::Rejected => "Rejected",
            OrderState::Expired => "Expired",
            OrderState::Open => "Open",
            OrderState::TriggerPending => "Trigger Pending",
            OrderState::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A demat holding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub instrument: Instrument,
    pub quantity: i64,
    pub avg_price: Decimal,
    /// Broker-snapshot LTP; the engine refreshes via quote and falls back here
    pub ltp: Option<Decimal>,
    /// Quantity already sold out of this holding, when the broker reports it
    pub sold_quantity: Option<i64>,
    /// Total sale proceeds for the sold quantity, when the broker reports it
    pub sell_amount: Option<Decimal>,
}

/// An open position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub instrument: Instrument,
    /// Signed; negative = net short
    pub net_quantity: i64,
    pub buy_quantity: i64,
    pub sell_quantity: i64,
    pub buy_avg: Decimal,
    pub sell_avg: Decimal,
    pub ltp: Option<Decimal>,
    pub realized_pl: Decimal,
    pub unrealized_pl: Decimal,
    pub product: ProductType,
}

impl Position {
    /// Positions with no P&L either way are noise in the view
    pub fn has_pnl(&self) -> bool {
        !self.realized_pl.is_zero() || !self.unrealized_pl.is_zero()
    }
}

/// An order as reported by the broker's order book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub instrument: Instrument,
    pub side: Side,
    pub product: ProductType,
    pub order_type: OrderType,
    pub quantity: i64,
    pub filled_quantity: i64,
    pub remaining_quantity: i64,
    pub limit_price: Decimal,
    pub stop_price: Decimal,
    pub state: OrderState,
    pub tag: Option<String>,
    pub placed_at: Option<String>,
}

impl Order {
    /// Still resting at the broker, i.e. a candidate for modify/cancel
    pub fn is_open(&self) -> bool {
        self.remaining_quantity > 0
            && matches!(
                self.state,
                OrderState::Pending
                    | OrderState::PartiallyFilled
                    | OrderState::Open
                    | OrderState::TriggerPending
            )
    }
}

/// An executed trade from the trade book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub order_id: String,
    pub trade_id: String,
    pub instrument: Instrument,
    pub side: Side,
    pub product: ProductType,
    pub price: Decimal,
    pub quantity: i64,
    pub value: Decimal,
    pub tag: Option<String>,
    pub traded_at: Option<String>,
}

/// Account fund limits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundLimits {
    pub available_funds: Decimal,
    pub used_margin: Decimal,
    pub net_funds: Decimal,
    pub total_collateral: Decimal,
}

/// A single-day OHLC bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCandle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// Close price of the most recent trading session before some date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrevClose {
    pub close: Decimal,
    pub date: NaiveDate,
}

/// Requested order quantity: explicit shares or a cash amount to size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantitySpec {
    Shares(i64),
    Amount(Decimal),
}

/// A normalized order placement request, before broker-specific encoding
#[derive(Debug, Clone)]
pub struct OrderTicket {
    pub instrument: Instrument,
    pub side: Side,
    pub product: ProductType,
    pub order_type: OrderType,
    pub quantity: QuantitySpec,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub tag: Option<String>,
}

/// A normalized order modification request
#[derive(Debug, Clone)]
pub struct ModifyTicket {
    pub order_type: OrderType,
    pub quantity: i64,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
}

/// Fully resolved placement request handed to a broker client
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub instrument: Instrument,
    pub side: Side,
    pub product: ProductType,
    pub order_type: OrderType,
    pub quantity: i64,
    pub limit_price: Decimal,
    pub stop_price: Decimal,
    pub disclosed_quantity: i64,
    pub tag: Option<String>,
}

/// Fully resolved modification request handed to a broker client
#[derive(Debug, Clone)]
pub struct ModifyOrder {
    pub order_id: String,
    pub order_type: OrderType,
    pub quantity: i64,
    pub limit_price: Decimal,
    pub stop_price: Decimal,
    pub disclosed_quantity: i64,
}

/// Trigger direction for conditional orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerCondition {
    LtpAbove,
    LtpBelow,
}

impl TriggerCondition {
    /// The conventional default: sells trigger below, buys above
    pub fn default_for(side: Side) -> Self {
        match side {
            Side::Sell => TriggerCondition::LtpBelow,
            Side::Buy => TriggerCondition::LtpAbove,
        }
    }
}

impl FromStr for TriggerCondition {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LTP_ABOVE" | "ABOVE" => Ok(TriggerCondition::LtpAbove),
            "LTP_BELOW" | "BELOW" => Ok(TriggerCondition::LtpBelow),
            other => Err(DashError::InvalidParameter(format!(
                "unknown trigger condition: {}",
                other
            ))),
        }
    }
}

/// A good-till-triggered order request
#[derive(Debug, Clone)]
pub struct GttTicket {
    pub instrument: Instrument,
    pub side: Side,
    pub quantity: i64,
    pub trigger_price: Decimal,
    pub price: Decimal,
    pub condition: TriggerCondition,
}

/// One leg of an OCO order
#[derive(Debug, Clone, Copy)]
pub struct OcoLeg {
    pub quantity: i64,
    pub price: Decimal,
}

/// A one-cancels-other order request: target and stoploss legs.
/// Triggering one leg voids the other broker-side.
#[derive(Debug, Clone)]
pub struct OcoTicket {
    pub instrument: Instrument,
    pub side: Side,
    pub target: OcoLeg,
    pub stoploss: OcoLeg,
    pub remarks: Option<String>,
}

/// A conditional order resting at the broker
#[derive(Debug, Clone)]
pub struct GttOrder {
    pub alert_id: String,
    pub instrument: Instrument,
    pub side: Side,
    pub quantity: i64,
    pub trigger_price: Decimal,
    pub price: Decimal,
    pub condition: TriggerCondition,
}

/// Canonical outcome of an order action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderReceipt {
    /// Broker accepted the request (including accepted-with-warning codes)
    Accepted { order_id: Option<String> },
    /// Broker rejected the request; message verbatim for display
    Rejected { message: String },
}

impl OrderReceipt {
    pub fn is_accepted(&self) -> bool {
        matches!(self, OrderReceipt::Accepted { .. })
    }

    pub fn order_id(&self) -> Option<&str> {
        match self {
            OrderReceipt::Accepted { order_id } => order_id.as_deref(),
            OrderReceipt::Rejected { .. } => None,
        }
    }
}

impl fmt::Display for OrderReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderReceipt::Accepted { order_id: Some(id) } => write!(f, "accepted (order {})", id),
            OrderReceipt::Accepted { order_id: None } => f.write_str("accepted"),
            OrderReceipt::Rejected { message } => write!(f, "rejected: {}", message),
        }
    }
}
