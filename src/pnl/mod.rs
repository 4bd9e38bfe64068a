//! Quote and P&L derivation
//!
//! Combines live last-traded prices, previous trading closes, and holding
//! cost bases into per-row and portfolio-level figures. Missing prices stay
//! missing: a percentage is `None`, never a zero pretending to be real.

pub mod prev_close;

pub use prev_close::PrevCloseResolver;


use crate::client::BrokerApi;
use crate::error::{DashError, Result};
use crate::types::{Holding, Position, PrevClose};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::warn;

/// Inputs for the best-effort realized P&L figure on a partially exited
/// holding: quantity already sold and the total sale proceeds.
#[derive(Debug, Clone, Copy)]
pub struct PartialExit {
    pub quantity: i64,
    pub proceeds: Decimal,
}

/// Derived figures for one holding or position row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMetrics {
    pub investment: Decimal,
    pub unrealized_pl: Decimal,
    pub current_value: Decimal,
    pub today_pnl: Decimal,
    /// `None` when previous close is missing or zero, or no live price
    pub pct_change_today: Option<Decimal>,
    /// `None` when average price is zero or no live price
    pub pct_change_since_buy: Option<Decimal>,
    /// Distinct from unrealized; only for partially exited holdings
    pub realized_pl: Option<Decimal>,
}

impl RowMetrics {
    /// Derive one row from its quantity, cost basis, live price, previous
    /// close, and optional partial-exit history.
    pub fn compute(
        quantity: i64,
        avg_price: Decimal,
        live: Option<Decimal>,
        prev_close: Option<Decimal>,
        exit: Option<PartialExit>,
    ) -> Self {
        let qty = Decimal::from(quantity);
        let investment = avg_price * qty;

        let unrealized_pl = match live {
            Some(ltp) => (ltp - avg_price) * qty,
            None => Decimal::ZERO,
        };
        let current_value = investment + unrealized_pl;

        let today_pnl = match (live, prev_close) {
            (Some(ltp), Some(prev)) if quantity > 0 => (ltp - prev) * qty,
            _ => Decimal::ZERO,
        };

        let pct_change_today = match (live, prev_close) {
            (Some(ltp), Some(prev)) if !prev.is_zero() => {
                Some((ltp - prev) / prev * Decimal::ONE_HUNDRED)
            }
            _ => None,
        };

        let pct_change_since_buy = match live {
            Some(ltp) if !avg_price.is_zero() => {
                Some((ltp - avg_price) / avg_price * Decimal::ONE_HUNDRED)
            }
            _ => None,
        };

        let realized_pl = exit.and_then(|e| {
            if e.quantity <= 0 {
                return None;
            }
            let exited = Decimal::from(e.quantity);
            Some((e.proceeds / exited - avg_price) * exited)
        });

        Self {
            investment,
            unrealized_pl,
            current_value,
            today_pnl,
            pct_change_today,
            pct_change_since_buy,
            realized_pl,
        }
    }
}

/// Portfolio totals, accumulated as running sums of the row metrics so they
/// always equal the column sums.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortfolioTotals {
    pub investment: Decimal,
    pub current_value: Decimal,
    pub unrealized_pl: Decimal,
    pub realized_pl: Decimal,
    pub today_pnl: Decimal,
}

impl PortfolioTotals {
    pub fn add(&mut self, row: &RowMetrics) {
        self.investment += row.investment;
        self.current_value += row.current_value;
        self.unrealized_pl += row.unrealized_pl;
        self.today_pnl += row.today_pnl;
        if let Some(realized) = row.realized_pl {
            self.realized_pl += realized;
        }
    }
}

/// One fully derived holdings row
#[derive(Debug, Clone)]
pub struct HoldingRow {
    pub holding: Holding,
    pub live: Option<Decimal>,
    pub prev_close: Option<PrevClose>,
    pub metrics: RowMetrics,
}

/// The assembled holdings dashboard
#[derive(Debug, Clone, Default)]
pub struct HoldingsView {
    pub rows: Vec<HoldingRow>,
    pub totals: PortfolioTotals,
}

/// Orchestrates holdings/positions views: fetch, refresh LTPs, resolve
/// previous closes, derive metrics, aggregate.
pub struct PnlEngine<'a> {
    api: &'a dyn BrokerApi,
    resolver: PrevCloseResolver<'a>,
}

impl<'a> PnlEngine<'a> {
    pub fn new(api: &'a dyn BrokerApi, lookback_days: u32, retry_delay: Duration) -> Self {
        Self {
            api,
            resolver: PrevCloseResolver::new(api, lookback_days).with_retry_delay(retry_delay),
        }
    }

    /// Build the holiday-aware holdings dashboard as of a date.
    ///
    /// A failed quote or close lookup degrades its row to "not available";
    /// only auth failures abort the whole view.
    pub async fn holdings_view(&mut self, as_of: chrono::NaiveDate) -> Result<HoldingsView> {
        let mut holdings = self.api.holdings().await?;
        holdings.sort_by(|a, b| a.instrument.symbol.cmp(&b.instrument.symbol));

        let mut view = HoldingsView::default();
        for holding in holdings {
            let live = self.live_price(&holding).await?;
            let prev_close = match self.resolver.resolve(&holding.instrument, as_of).await {
                Ok(pc) => pc,
                Err(e @ DashError::Auth(_)) => return Err(e),
                Err(e) => {
                    warn!(instrument = %holding.instrument, error = %e, "previous close unavailable");
                    None
                }
            };
            let exit = match (holding.sold_quantity, holding.sell_amount) {
                (Some(quantity), Some(proceeds)) => Some(PartialExit { quantity, proceeds }),
                _ => None,
            };
            let metrics = RowMetrics::compute(
                holding.quantity,
                holding.avg_price,
                live,
                prev_close.map(|pc| pc.close),
                exit,
            );
            view.totals.add(&metrics);
            view.rows.push(HoldingRow {
                holding,
                live,
                prev_close,
                metrics,
            });
        }
        Ok(view)
    }

    /// Open positions sorted by symbol
    pub async fn positions_view(&self) -> Result<Vec<Position>> {
        let mut positions = self.api.positions().await?;
        positions.sort_by(|a, b| a.instrument.symbol.cmp(&b.instrument.symbol));
        Ok(positions)
    }

    /// Live quote with fallback to the broker-snapshot LTP on the record
    async fn live_price(&self, holding: &Holding) -> Result<Option<Decimal>> {
        match self.api.quote(&holding.instrument).await {
            Ok(ltp) => Ok(Some(ltp)),
            Err(e @ DashError::Auth(_)) => Err(e),
            Err(e) => {
                warn!(instrument = %holding.instrument, error = %e, "quote failed, using snapshot LTP");
                Ok(holding.ltp)
            }
        }
    }
}
