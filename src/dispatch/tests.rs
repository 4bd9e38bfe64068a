//! Tests for order action dispatch

#[cfg(test)]
mod tests {
    use crate::client::MockBrokerApi;
    use crate::dispatch::{disclosed_quantity, OrderActionDispatcher};
    use crate::error::DashError;
    use crate::types::{
        GttTicket, Holding, Instrument, ModifyTicket, OcoLeg, OcoTicket, OrderReceipt,
        OrderTicket, OrderType, Position, ProductType, QuantitySpec, Side, TriggerCondition,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn accepted(id: &str) -> OrderReceipt {
        OrderReceipt::Accepted {
            order_id: Some(id.to_string()),
        }
    }

    fn ticket(quantity: QuantitySpec, order_type: OrderType) -> OrderTicket {
        OrderTicket {
            instrument: Instrument::equity("SBIN"),
            side: Side::Buy,
            product: ProductType::Cnc,
            order_type,
            quantity,
            limit_price: None,
            stop_price: None,
            tag: None,
        }
    }

    fn holding(symbol: &str, quantity: i64) -> Holding {
        Holding {
            instrument: Instrument::equity(symbol),
            quantity,
            avg_price: dec!(100),
            ltp: None,
            sold_quantity: None,
            sell_amount: None,
        }
    }

    fn position(symbol: &str, net_quantity: i64, product: ProductType) -> Position {
        Position {
            instrument: Instrument::equity(symbol),
            net_quantity,
            buy_quantity: net_quantity.max(0),
            sell_quantity: (-net_quantity).max(0),
            buy_avg: dec!(100),
            sell_avg: Decimal::ZERO,
            ltp: None,
            realized_pl: Decimal::ZERO,
            unrealized_pl: Decimal::ZERO,
            product,
        }
    }

    #[test]
    fn test_disclosed_quantity_is_tenth_floored_never_below_one() {
        assert_eq!(disclosed_quantity(100), 10);
        assert_eq!(disclosed_quantity(55), 5);
        assert_eq!(disclosed_quantity(9), 1);
        assert_eq!(disclosed_quantity(1), 1);
    }

    #[tokio::test]
    async fn test_place_sizes_amount_by_limit_price() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order()
            .times(1)
            .withf(|order| order.quantity == 40 && order.limit_price == dec!(250))
            .returning(|_| Ok(accepted("ord-1")));

        let dispatcher = OrderActionDispatcher::new(&api);
        let mut t = ticket(QuantitySpec::Amount(dec!(10000)), OrderType::Limit);
        t.limit_price = Some(dec!(250));
        let receipt = dispatcher.place(&t).await.unwrap();
        assert!(receipt.is_accepted());
    }

    #[tokio::test]
    async fn test_place_sizes_small_amount_up_to_one_share() {
        let mut api = MockBrokerApi::new();
        api.expect_quote().times(1).returning(|_| Ok(dec!(250)));
        api.expect_place_order()
            .times(1)
            .withf(|order| order.quantity == 1)
            .returning(|_| Ok(accepted("ord-2")));

        let dispatcher = OrderActionDispatcher::new(&api);
        let t = ticket(QuantitySpec::Amount(dec!(100)), OrderType::Market);
        dispatcher.place(&t).await.unwrap();
    }

    #[tokio::test]
    async fn test_place_rejects_zero_quantity_before_any_call() {
        let api = MockBrokerApi::new();
        let dispatcher = OrderActionDispatcher::new(&api);
        let result = dispatcher
            .place(&ticket(QuantitySpec::Shares(0), OrderType::Market))
            .await;
        assert!(matches!(result, Err(DashError::InvalidQuantity(_))));
    }

    #[tokio::test]
    async fn test_place_rejects_non_positive_amount_before_any_call() {
        let api = MockBrokerApi::new();
        let dispatcher = OrderActionDispatcher::new(&api);
        let result = dispatcher
            .place(&ticket(QuantitySpec::Amount(dec!(0)), OrderType::Market))
            .await;
        assert!(matches!(result, Err(DashError::InvalidQuantity(_))));
    }

    #[tokio::test]
    async fn test_place_rejects_amount_when_price_is_zero() {
        let mut api = MockBrokerApi::new();
        api.expect_quote().times(1).returning(|_| Ok(dec!(0)));

        let dispatcher = OrderActionDispatcher::new(&api);
        let result = dispatcher
            .place(&ticket(QuantitySpec::Amount(dec!(100)), OrderType::Market))
            .await;
        assert!(matches!(result, Err(DashError::InvalidQuantity(_))));
    }

    #[tokio::test]
    async fn test_place_requires_limit_price_for_limit_orders() {
        let api = MockBrokerApi::new();
        let dispatcher = OrderActionDispatcher::new(&api);
        let result = dispatcher
            .place(&ticket(QuantitySpec::Shares(10), OrderType::Limit))
            .await;
        assert!(matches!(result, Err(DashError::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn test_place_requires_stop_price_for_stop_orders() {
        let api = MockBrokerApi::new();
        let dispatcher = OrderActionDispatcher::new(&api);
        let result = dispatcher
            .place(&ticket(QuantitySpec::Shares(10), OrderType::StopMarket))
            .await;
        assert!(matches!(result, Err(DashError::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn test_modify_derives_disclosed_quantity() {
        let mut api = MockBrokerApi::new();
        api.expect_modify_order()
            .times(1)
            .withf(|order| order.disclosed_quantity == 5 && order.quantity == 55)
            .returning(|_| Ok(accepted("ord-3")));

        let dispatcher = OrderActionDispatcher::new(&api);
        let ticket = ModifyTicket {
            order_type: OrderType::Limit,
            quantity: 55,
            limit_price: Some(dec!(101.5)),
            stop_price: None,
        };
        dispatcher.modify("ord-3", &ticket).await.unwrap();
    }

    #[tokio::test]
    async fn test_modify_rejects_non_positive_quantity() {
        let api = MockBrokerApi::new();
        let dispatcher = OrderActionDispatcher::new(&api);
        let ticket = ModifyTicket {
            order_type: OrderType::Market,
            quantity: 0,
            limit_price: None,
            stop_price: None,
        };
        let result = dispatcher.modify("ord-4", &ticket).await;
        assert!(matches!(result, Err(DashError::InvalidQuantity(_))));
    }

    #[tokio::test]
    async fn test_exit_holding_sells_full_quantity_at_market() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order()
            .times(1)
            .withf(|order| {
                order.side == Side::Sell
                    && order.order_type == OrderType::Market
                    && order.quantity == 25
                    && order.product == ProductType::Cnc
                    && order.tag.as_deref() == Some("exitorder")
            })
            .returning(|_| Ok(accepted("ord-5")));

        let dispatcher = OrderActionDispatcher::new(&api);
        dispatcher.exit_holding(&holding("SBIN", 25)).await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_short_position_buys_back_absolute_quantity() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order()
            .times(1)
            .withf(|order| {
                order.side == Side::Buy
                    && order.quantity == 50
                    && order.order_type == OrderType::Market
                    && order.product == ProductType::Intraday
            })
            .returning(|_| Ok(accepted("ord-6")));

        let dispatcher = OrderActionDispatcher::new(&api);
        dispatcher
            .exit_position(&position("SBIN", -50, ProductType::Intraday))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exit_flat_position_is_invalid() {
        let api = MockBrokerApi::new();
        let dispatcher = OrderActionDispatcher::new(&api);
        let result = dispatcher
            .exit_position(&position("SBIN", 0, ProductType::Intraday))
            .await;
        assert!(matches!(result, Err(DashError::InvalidQuantity(_))));
    }

    #[tokio::test]
    async fn test_batch_exit_continues_past_a_failing_item() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order().times(3).returning(|order| {
            if order.instrument.symbol == "BBB" {
                Err(DashError::Broker("margin shortfall".to_string()))
            } else {
                Ok(accepted("ok"))
            }
        });

        let dispatcher = OrderActionDispatcher::new(&api);
        let holdings = vec![holding("AAA", 1), holding("BBB", 2), holding("CCC", 3)];
        let outcomes = dispatcher.exit_all_holdings(&holdings).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].succeeded());
        assert!(!outcomes[1].succeeded());
        assert!(outcomes[2].succeeded());
        match &outcomes[1].result {
            Err(DashError::Broker(msg)) => assert_eq!(msg, "margin shortfall"),
            other => panic!("expected broker error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_exit_skips_empty_holdings() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order()
            .times(1)
            .returning(|_| Ok(accepted("ok")));

        let dispatcher = OrderActionDispatcher::new(&api);
        let holdings = vec![holding("AAA", 0), holding("BBB", 5)];
        let outcomes = dispatcher.exit_all_holdings(&holdings).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].instrument.symbol, "BBB");
    }

    #[tokio::test]
    async fn test_batch_exit_reports_broker_rejection_per_item() {
        let mut api = MockBrokerApi::new();
        api.expect_place_order().times(2).returning(|order| {
            if order.instrument.symbol == "AAA" {
                Ok(OrderReceipt::Rejected {
                    message: "scrip banned".to_string(),
                })
            } else {
                Ok(accepted("ok"))
            }
        });

        let dispatcher = OrderActionDispatcher::new(&api);
        let positions = vec![
            position("AAA", 10, ProductType::Intraday),
            position("BBB", -4, ProductType::Intraday),
        ];
        let outcomes = dispatcher.exit_all_positions(&positions).await;
        assert!(!outcomes[0].succeeded());
        assert!(outcomes[1].succeeded());
    }

    #[tokio::test]
    async fn test_gtt_validation_rejects_zero_quantity() {
        let api = MockBrokerApi::new();
        let dispatcher = OrderActionDispatcher::new(&api);
        let ticket = GttTicket {
            instrument: Instrument::equity("SBIN"),
            side: Side::Sell,
            quantity: 0,
            trigger_price: dec!(500),
            price: dec!(499),
            condition: TriggerCondition::LtpBelow,
        };
        let result = dispatcher.place_gtt(&ticket).await;
        assert!(matches!(result, Err(DashError::InvalidQuantity(_))));
    }

    #[tokio::test]
    async fn test_oco_validation_checks_both_legs() {
        let api = MockBrokerApi::new();
        let dispatcher = OrderActionDispatcher::new(&api);
        let ticket = OcoTicket {
            instrument: Instrument::equity("SBIN"),
            side: Side::Sell,
            target: OcoLeg {
                quantity: 10,
                price: dec!(550),
            },
            stoploss: OcoLeg {
                quantity: 0,
                price: dec!(480),
            },
            remarks: None,
        };
        let result = dispatcher.place_oco(&ticket).await;
        assert!(matches!(result, Err(DashError::InvalidQuantity(_))));
    }

    #[tokio::test]
    async fn test_oco_passes_validated_legs_through() {
        let mut api = MockBrokerApi::new();
        api.expect_place_oco()
            .times(1)
            .withf(|t| t.target.quantity == 10 && t.stoploss.quantity == 10)
            .returning(|_| Ok(accepted("alert-1")));

        let dispatcher = OrderActionDispatcher::new(&api);
        let ticket = OcoTicket {
            instrument: Instrument::equity("SBIN"),
            side: Side::Sell,
            target: OcoLeg {
                quantity: 10,
                price: dec!(550),
            },
            stoploss: OcoLeg {
                quantity: 10,
                price: dec!(480),
            },
            remarks: Some("bracket exit".to_string()),
        };
        dispatcher.place_oco(&ticket).await.unwrap();
    }
}
