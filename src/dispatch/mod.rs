//! Order action dispatch
//!
//! Normalizes place/modify/cancel/exit requests, validates locally before
//! anything touches the network, and hands fully resolved requests to the
//! broker client. Order actions are never retried here: every placement is a
//! distinct non-idempotent side effect.

#[cfg(test)]
mod tests;

use crate::client::BrokerApi;
use crate::error::{DashError, Result};
use crate::types::{
    GttOrder, GttTicket, Holding, Instrument, ModifyOrder, ModifyTicket, NewOrder, OcoTicket,
    OrderReceipt, OrderTicket, OrderType, Position, ProductType, QuantitySpec, Side,
};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Outcome of one item in a batch action
#[derive(Debug)]
pub struct ExitOutcome {
    pub instrument: Instrument,
    pub result: Result<OrderReceipt>,
}

impl ExitOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(receipt) if receipt.is_accepted())
    }
}

/// Normalizes order actions across broker vocabularies
pub struct OrderActionDispatcher<'a> {
    api: &'a dyn BrokerApi,
}

impl<'a> OrderActionDispatcher<'a> {
    pub fn new(api: &'a dyn BrokerApi) -> Self {
        Self { api }
    }

    /// Place an order. Amount-based tickets are sized by floor-dividing the
    /// amount by the applicable price, never below one share.
    pub async fn place(&self, ticket: &OrderTicket) -> Result<OrderReceipt> {
        let limit_price = Self::required_price(
            ticket.order_type.uses_limit_price(),
            ticket.limit_price,
            "limit price",
            ticket.order_type,
        )?;
        let stop_price = Self::required_price(
            ticket.order_type.uses_stop_price(),
            ticket.stop_price,
            "stop price",
            ticket.order_type,
        )?;
        let quantity = self.resolve_quantity(ticket).await?;

        let order = NewOrder {
            instrument: ticket.instrument.clone(),
            side: ticket.side,
            product: ticket.product,
            order_type: ticket.order_type,
            quantity,
            limit_price,
            stop_price,
            disclosed_quantity: 0,
            tag: ticket.tag.clone(),
        };
        info!(
            instrument = %order.instrument,
            side = %order.side,
            order_type = %order.order_type,
            quantity,
            "placing order"
        );
        self.api.place_order(&order).await
    }

    /// Modify a resting order. Derives the disclosed quantity as a tenth of
    /// the new quantity, floored, never below one.
    pub async fn modify(&self, order_id: &str, ticket: &ModifyTicket) -> Result<OrderReceipt> {
        if ticket.quantity <= 0 {
            return Err(DashError::InvalidQuantity(format!(
                "modify quantity must be positive, got {}",
                ticket.quantity
            )));
        }
        let limit_price = Self::required_price(
            ticket.order_type.uses_limit_price(),
            ticket.limit_price,
            "limit price",
            ticket.order_type,
        )?;
        let stop_price = Self::required_price(
            ticket.order_type.uses_stop_price(),
            ticket.stop_price,
            "stop price",
            ticket.order_type,
        )?;

        let order = ModifyOrder {
            order_id: order_id.to_string(),
            order_type: ticket.order_type,
            quantity: ticket.quantity,
            limit_price,
            stop_price,
            disclosed_quantity: disclosed_quantity(ticket.quantity),
        };
        info!(order_id, quantity = ticket.quantity, "modifying order");
        self.api.modify_order(&order).await
    }

    /// Cancel a resting order
    pub async fn cancel(&self, order_id: &str) -> Result<OrderReceipt> {
        info!(order_id, "cancelling order");
        self.api.cancel_order(order_id).await
    }

    /// Market-sell the full held quantity of a holding
    pub async fn exit_holding(&self, holding: &Holding) -> Result<OrderReceipt> {
        if holding.quantity <= 0 {
            return Err(DashError::InvalidQuantity(format!(
                "nothing to exit in {}",
                holding.instrument
            )));
        }
        self.exit(
            &holding.instrument,
            Side::Sell,
            holding.quantity,
            ProductType::Cnc,
        )
        .await
    }

    /// Flatten a position at market: absolute net quantity, buying back when
    /// net short.
    pub async fn exit_position(&self, position: &Position) -> Result<OrderReceipt> {
        let quantity = position.net_quantity.abs();
        if quantity == 0 {
            return Err(DashError::InvalidQuantity(format!(
                "nothing to exit in {}",
                position.instrument
            )));
        }
        let side = if position.net_quantity < 0 {
            Side::Buy
        } else {
            Side::Sell
        };
        self.exit(&position.instrument, side, quantity, position.product)
            .await
    }

    async fn exit(
        &self,
        instrument: &Instrument,
        side: Side,
        quantity: i64,
        product: ProductType,
    ) -> Result<OrderReceipt> {
        let ticket = OrderTicket {
            instrument: instrument.clone(),
            side,
            product,
            order_type: OrderType::Market,
            quantity: QuantitySpec::Shares(quantity),
            limit_price: None,
            stop_price: None,
            tag: Some("exitorder".to_string()),
        };
        self.place(&ticket).await
    }

    /// Exit every holding with stock to sell. Items are independent: a
    /// failure is reported for its row and the loop moves on. Nothing is
    /// rolled back; submitted exits stay submitted.
    pub async fn exit_all_holdings(&self, holdings: &[Holding]) -> Vec<ExitOutcome> {
        let mut outcomes = Vec::new();
        for holding in holdings {
            if holding.quantity <= 0 {
                continue;
            }
            let result = self.exit_holding(holding).await;
            Self::log_exit(&holding.instrument, &result);
            outcomes.push(ExitOutcome {
                instrument: holding.instrument.clone(),
                result,
            });
        }
        outcomes
    }

    /// Flatten every open position, independently per item
    pub async fn exit_all_positions(&self, positions: &[Position]) -> Vec<ExitOutcome> {
        let mut outcomes = Vec::new();
        for position in positions {
            if position.net_quantity == 0 {
                continue;
            }
            let result = self.exit_position(position).await;
            Self::log_exit(&position.instrument, &result);
            outcomes.push(ExitOutcome {
                instrument: position.instrument.clone(),
                result,
            });
        }
        outcomes
    }

    fn log_exit(instrument: &Instrument, result: &Result<OrderReceipt>) {
        match result {
            Ok(receipt) if receipt.is_accepted() => info!(%instrument, %receipt, "exit submitted"),
            Ok(receipt) => warn!(%instrument, %receipt, "exit rejected"),
            Err(e) => warn!(%instrument, error = %e, "exit failed"),
        }
    }

    /// Place a good-till-triggered order
    pub async fn place_gtt(&self, ticket: &GttTicket) -> Result<OrderReceipt> {
        Self::validate_gtt(ticket)?;
        info!(instrument = %ticket.instrument, trigger = %ticket.trigger_price, "placing GTT order");
        self.api.place_gtt(ticket).await
    }

    /// Replace the terms of a resting GTT order
    pub async fn modify_gtt(&self, alert_id: &str, ticket: &GttTicket) -> Result<OrderReceipt> {
        Self::validate_gtt(ticket)?;
        self.api.modify_gtt(alert_id, ticket).await
    }

    /// Cancel a resting GTT order
    pub async fn cancel_gtt(&self, alert_id: &str) -> Result<OrderReceipt> {
        self.api.cancel_gtt(alert_id).await
    }

    /// Resting conditional orders
    pub async fn gtt_orders(&self) -> Result<Vec<GttOrder>> {
        self.api.gtt_orders().await
    }

    /// Place a one-cancels-other pair; both legs validated locally
    pub async fn place_oco(&self, ticket: &OcoTicket) -> Result<OrderReceipt> {
        Self::validate_oco(ticket)?;
        info!(instrument = %ticket.instrument, "placing OCO order");
        self.api.place_oco(ticket).await
    }

    /// Replace the legs of a resting OCO pair
    pub async fn modify_oco(&self, alert_id: &str, ticket: &OcoTicket) -> Result<OrderReceipt> {
        Self::validate_oco(ticket)?;
        self.api.modify_oco(alert_id, ticket).await
    }

    /// Cancel a resting OCO pair
    pub async fn cancel_oco(&self, alert_id: &str) -> Result<OrderReceipt> {
        self.api.cancel_oco(alert_id).await
    }

    fn validate_oco(ticket: &OcoTicket) -> Result<()> {
        for (name, leg) in [("target", &ticket.target), ("stoploss", &ticket.stoploss)] {
            if leg.quantity <= 0 {
                return Err(DashError::InvalidQuantity(format!(
                    "{} quantity must be positive, got {}",
                    name, leg.quantity
                )));
            }
            if leg.price <= Decimal::ZERO {
                return Err(DashError::InvalidParameter(format!(
                    "{} price must be positive, got {}",
                    name, leg.price
                )));
            }
        }
        Ok(())
    }

    fn validate_gtt(ticket: &GttTicket) -> Result<()> {
        if ticket.quantity <= 0 {
            return Err(DashError::InvalidQuantity(format!(
                "GTT quantity must be positive, got {}",
                ticket.quantity
            )));
        }
        if ticket.trigger_price <= Decimal::ZERO {
            return Err(DashError::InvalidParameter(
                "GTT trigger price must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn required_price(
        needed: bool,
        price: Option<Decimal>,
        what: &str,
        order_type: OrderType,
    ) -> Result<Decimal> {
        match (needed, price) {
            (true, Some(p)) if p > Decimal::ZERO => Ok(p),
            (true, _) => Err(DashError::InvalidParameter(format!(
                "{} required for {} orders",
                what, order_type
            ))),
            (false, _) => Ok(Decimal::ZERO),
        }
    }

    /// Resolve the ticket's quantity spec to shares. Amount mode divides by
    /// the limit price for limit-type orders, otherwise by the live quote.
    async fn resolve_quantity(&self, ticket: &OrderTicket) -> Result<i64> {
        match ticket.quantity {
            QuantitySpec::Shares(qty) if qty > 0 => Ok(qty),
            QuantitySpec::Shares(qty) => Err(DashError::InvalidQuantity(format!(
                "quantity must be positive, got {}",
                qty
            ))),
            QuantitySpec::Amount(amount) => {
                if amount <= Decimal::ZERO {
                    return Err(DashError::InvalidQuantity(format!(
                        "amount must be positive, got {}",
                        amount
                    )));
                }
                let price = if ticket.order_type.uses_limit_price() {
                    ticket.limit_price.ok_or_else(|| {
                        DashError::InvalidParameter(
                            "limit price required to size an amount-based order".to_string(),
                        )
                    })?
                } else {
                    self.api.quote(&ticket.instrument).await?
                };
                if price <= Decimal::ZERO {
                    return Err(DashError::InvalidQuantity(format!(
                        "no usable price to size {} worth of {}",
                        amount, ticket.instrument
                    )));
                }
                let quantity = (amount / price).floor().to_i64().unwrap_or(0);
                Ok(quantity.max(1))
            }
        }
    }
}

/// Disclosed quantity a broker expects on modification: a tenth of the
/// order quantity, floored, never below one.
pub fn disclosed_quantity(quantity: i64) -> i64 {
    (quantity / 10).max(1)
}
