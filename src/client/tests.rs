//! Tests for broker payload normalization

#[cfg(test)]
mod tests {
    use crate::client::definedge::DefinedgeClient;
    use crate::client::fyers::FyersClient;
    use crate::error::DashError;
    use crate::types::{Exchange, Instrument, OrderState, OrderType, ProductType, Side};
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_fyers_symbol_round_trip() {
        let instrument = Instrument::equity("SBIN");
        assert_eq!(FyersClient::wire_symbol(&instrument), "NSE:SBIN-EQ");

        let parsed = FyersClient::parse_symbol("NSE:SBIN-EQ");
        assert_eq!(parsed.exchange, Exchange::Nse);
        assert_eq!(parsed.symbol, "SBIN");

        // already-qualified symbols pass through unchanged
        let qualified = Instrument {
            exchange: Exchange::Nse,
            symbol: "NSE:IDEA-EQ".to_string(),
            isin: None,
            token: None,
        };
        assert_eq!(FyersClient::wire_symbol(&qualified), "NSE:IDEA-EQ");
    }

    #[test]
    fn test_fyers_map_holding() {
        let raw = json!({
            "symbol": "NSE:SBIN-EQ",
            "quantity": 10,
            "costPrice": 512.3,
            "ltp": 530.0,
            "isin": "INE062A01020"
        });
        let h = FyersClient::map_holding(&raw).unwrap();
        assert_eq!(h.instrument.symbol, "SBIN");
        assert_eq!(h.quantity, 10);
        assert_eq!(h.avg_price, dec!(512.3));
        assert_eq!(h.ltp, Some(dec!(530.0)));
        assert_eq!(h.instrument.isin.as_deref(), Some("INE062A01020"));
        assert_eq!(h.sold_quantity, None);
    }

    #[test]
    fn test_fyers_map_position_signs_and_product() {
        let raw = json!({
            "symbol": "NSE:IDEA-EQ",
            "netQty": -50,
            "buyQty": 0,
            "sellQty": 50,
            "buyAvg": 0,
            "sellAvg": 14.85,
            "ltp": 14.30,
            "realizedPL": 0,
            "unrealizedPL": 27.5,
            "productType": "INTRADAY"
        });
        let p = FyersClient::map_position(&raw).unwrap();
        assert_eq!(p.net_quantity, -50);
        assert_eq!(p.sell_avg, dec!(14.85));
        assert_eq!(p.product, ProductType::Intraday);
        assert!(p.has_pnl());
    }

    #[test]
    fn test_fyers_map_order_fill_rule_beats_raw_status() {
        let raw = json!({
            "id": "24010500001",
            "symbol": "NSE:SBIN-EQ",
            "qty": 10,
            "filledQty": 5,
            "remainingQuantity": 5,
            "status": 6,
            "type": 1,
            "side": 1,
            "limitPrice": 500.5,
            "stopPrice": 0,
            "productType": "CNC",
            "orderTag": "swing",
            "orderDateTime": "05-Jan-2024 10:15:00"
        });
        let o = FyersClient::map_order(&raw).unwrap();
        assert_eq!(o.state, OrderState::PartiallyFilled);
        assert_eq!(o.order_type, OrderType::Limit);
        assert_eq!(o.side, Side::Buy);
        assert_eq!(o.remaining_quantity, o.quantity - o.filled_quantity);
        assert!(o.is_open());
        assert_eq!(o.tag.as_deref(), Some("swing"));
    }

    #[test]
    fn test_fyers_map_order_raw_status_decides_without_fills() {
        let cancelled = json!({
            "id": "1", "symbol": "NSE:SBIN-EQ", "qty": 10,
            "filledQty": 0, "remainingQuantity": 0, "status": 3,
            "type": 2, "side": -1
        });
        let o = FyersClient::map_order(&cancelled).unwrap();
        assert_eq!(o.state, OrderState::Cancelled);
        assert_eq!(o.side, Side::Sell);
        assert!(!o.is_open());

        let trigger_pending = json!({
            "id": "2", "symbol": "NSE:SBIN-EQ", "qty": 10,
            "filledQty": 0, "remainingQuantity": 0, "status": 7,
            "type": 3, "side": 1
        });
        let o = FyersClient::map_order(&trigger_pending).unwrap();
        assert_eq!(o.state, OrderState::TriggerPending);
        assert_eq!(o.order_type, OrderType::StopMarket);
    }

    #[test]
    fn test_fyers_map_trade_computes_missing_value() {
        let raw = json!({
            "orderNumber": "24010500001",
            "tradeNumber": "T-9",
            "symbol": "NSE:SBIN-EQ",
            "tradePrice": 500.0,
            "tradedQty": 4,
            "side": 1,
            "productType": "CNC"
        });
        let t = FyersClient::map_trade(&raw).unwrap();
        assert_eq!(t.value, dec!(2000.0));
        assert_eq!(t.trade_id, "T-9");
    }

    #[test]
    fn test_fyers_receipt_accepts_warning_code() {
        let queued = json!({"code": 1101, "id": "24010500009", "message": "order queued"});
        let receipt = FyersClient::receipt_from(&queued).unwrap();
        assert!(receipt.is_accepted());
        assert_eq!(receipt.order_id(), Some("24010500009"));

        let ok = json!({"code": 200, "id": "24010500010"});
        assert!(FyersClient::receipt_from(&ok).unwrap().is_accepted());
    }

    #[test]
    fn test_fyers_receipt_rejection_keeps_message_verbatim() {
        let rejected = json!({"code": -99, "message": "RED:Margin Shortfall. Required 1200.00"});
        match FyersClient::receipt_from(&rejected).unwrap() {
            crate::types::OrderReceipt::Rejected { message } => {
                assert_eq!(message, "RED:Margin Shortfall. Required 1200.00")
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_fyers_expired_session_is_auth_error() {
        let expired = json!({"code": -16, "message": "Your session has expired"});
        assert!(matches!(
            FyersClient::ensure_ok(&expired),
            Err(DashError::Auth(_))
        ));
        assert!(matches!(
            FyersClient::receipt_from(&expired),
            Err(DashError::Auth(_))
        ));
    }

    #[test]
    fn test_definedge_map_holding_prefers_nse_listing() {
        let raw = json!({
            "dp_qty": "60",
            "t1_qty": "0",
            "avg_buy_price": "200.00",
            "trade_qty": "40",
            "sell_amt": "10000.00",
            "tradingsymbol": [
                {"exchange": "BSE", "tradingsymbol": "SBIN", "isin": "INE062A01020"},
                {"exchange": "NSE", "tradingsymbol": "SBIN-EQ", "isin": "INE062A01020", "token": "3045"}
            ]
        });
        let h = DefinedgeClient::map_holding(&raw).unwrap();
        assert_eq!(h.instrument.exchange, Exchange::Nse);
        assert_eq!(h.instrument.token.as_deref(), Some("3045"));
        assert_eq!(h.quantity, 60);
        assert_eq!(h.avg_price, dec!(200.00));
        assert_eq!(h.sold_quantity, Some(40));
        assert_eq!(h.sell_amount, Some(dec!(10000.00)));
    }

    #[test]
    fn test_definedge_map_order_fills_from_pending_quantity() {
        let raw = json!({
            "order_id": "23120100000123",
            "tradingsymbol": "SBIN-EQ",
            "exchange": "NSE",
            "order_type": "BUY",
            "price_type": "LIMIT",
            "product_type": "CNC",
            "quantity": "10",
            "pending_qty": "10",
            "price": "500.50",
            "trigger_price": "0",
            "order_status": "OPEN"
        });
        let o = DefinedgeClient::map_order(&raw).unwrap();
        assert_eq!(o.filled_quantity, 0);
        assert_eq!(o.remaining_quantity, 10);
        // no fills yet and quantity remaining: fill rule says Pending
        assert_eq!(o.state, OrderState::Pending);
        assert!(o.is_open());
    }

    #[test]
    fn test_definedge_map_order_completed_when_nothing_pending() {
        let raw = json!({
            "order_id": "23120100000124",
            "tradingsymbol": "SBIN-EQ",
            "exchange": "NSE",
            "order_type": "SELL",
            "price_type": "MARKET",
            "product_type": "MIS",
            "quantity": "10",
            "pending_qty": "0",
            "order_status": "COMPLETE"
        });
        let o = DefinedgeClient::map_order(&raw).unwrap();
        assert_eq!(o.filled_quantity, 10);
        assert_eq!(o.state, OrderState::Completed);
        assert_eq!(o.product, ProductType::Intraday);
        assert!(!o.is_open());
    }

    #[test]
    fn test_definedge_receipt_classification() {
        let ok = json!({"status": "SUCCESS", "order_id": "23120100000125"});
        let receipt = DefinedgeClient::receipt_from(&ok).unwrap();
        assert!(receipt.is_accepted());
        assert_eq!(receipt.order_id(), Some("23120100000125"));

        let failed = json!({"status": "FAILED", "message": "Price outside circuit limits"});
        match DefinedgeClient::receipt_from(&failed).unwrap() {
            crate::types::OrderReceipt::Rejected { message } => {
                assert_eq!(message, "Price outside circuit limits")
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_definedge_expired_session_is_auth_error() {
        let expired = json!({"status": "ERROR", "message": "Session expired, please login again"});
        assert!(matches!(
            DefinedgeClient::ensure_ok(&expired),
            Err(DashError::Auth(_))
        ));
    }

    #[test]
    fn test_definedge_map_gtt() {
        let raw = json!({
            "alert_id": "GTT-77",
            "tradingsymbol": "SBIN-EQ",
            "exchange": "NSE",
            "order_type": "SELL",
            "quantity": "15",
            "alert_price": "480.00",
            "price": "479.00",
            "condition": "LTP_BELOW"
        });
        let g = DefinedgeClient::map_gtt(&raw).unwrap();
        assert_eq!(g.alert_id, "GTT-77");
        assert_eq!(g.side, Side::Sell);
        assert_eq!(g.trigger_price, dec!(480.00));
        assert_eq!(
            g.condition,
            crate::types::TriggerCondition::LtpBelow
        );
    }
}
