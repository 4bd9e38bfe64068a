//! Broker account dashboard CLI
//!
//! Thin presentation glue over the dashboard core: account views with
//! holiday-aware day P&L plus the order lifecycle.

use anyhow::{bail, Context};
use broker_dash::{
    client::{BrokerApi, DefinedgeClient, FyersClient},
    config::Config,
    dispatch::{ExitOutcome, OrderActionDispatcher},
    pnl::{HoldingsView, PnlEngine},
    types::{
        Exchange, GttTicket, Instrument, ModifyTicket, OcoLeg, OcoTicket, OrderTicket,
        QuantitySpec, Side, TriggerCondition,
    },
};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "broker-dash")]
#[command(about = "Broker account dashboard with holiday-aware P&L")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Broker backend
    #[arg(short, long, value_enum, default_value = "fyers")]
    broker: Broker,

    /// Exchange for symbols given on the command line
    #[arg(long, default_value = "NSE")]
    exchange: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum Broker {
    Fyers,
    Definedge,
}

#[derive(Subcommand)]
enum Commands {
    /// Holdings dashboard with previous close and today's P&L
    Holdings,
    /// Open positions
    Positions {
        /// Only rows with realized or unrealized P&L
        #[arg(long)]
        with_pnl: bool,
    },
    /// Order book
    Orders {
        /// Only orders still open for modify/cancel
        #[arg(long)]
        pending: bool,
    },
    /// Trade book
    Trades,
    /// Account fund limits
    Funds,
    /// Place an order
    Place {
        symbol: String,
        #[arg(long, default_value = "BUY")]
        side: String,
        #[arg(long, default_value = "CNC")]
        product: String,
        #[arg(long = "type", default_value = "MARKET")]
        order_type: String,
        /// Quantity in shares
        #[arg(long)]
        qty: Option<i64>,
        /// Cash amount to size the order from, instead of --qty
        #[arg(long)]
        amount: Option<Decimal>,
        #[arg(long)]
        limit: Option<Decimal>,
        #[arg(long)]
        stop: Option<Decimal>,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Modify a resting order
    Modify {
        order_id: String,
        #[arg(long = "type", default_value = "LIMIT")]
        order_type: String,
        #[arg(long)]
        qty: i64,
        #[arg(long)]
        limit: Option<Decimal>,
        #[arg(long)]
        stop: Option<Decimal>,
    },
    /// Cancel a resting order
    Cancel { order_id: String },
    /// Market-exit holdings, all of them or just the named symbols
    ExitHoldings { symbols: Vec<String> },
    /// Market-exit positions, all of them or just the named symbols
    ExitPositions { symbols: Vec<String> },
    /// List resting GTT orders
    Gtt,
    /// Place a GTT order
    PlaceGtt {
        symbol: String,
        #[arg(long, default_value = "SELL")]
        side: String,
        #[arg(long)]
        qty: i64,
        #[arg(long)]
        trigger: Decimal,
        #[arg(long)]
        price: Decimal,
        /// LTP_ABOVE or LTP_BELOW; defaults by side
        #[arg(long)]
        condition: Option<String>,
    },
    /// Replace the terms of a resting GTT order
    ModifyGtt {
        alert_id: String,
        symbol: String,
        #[arg(long, default_value = "SELL")]
        side: String,
        #[arg(long)]
        qty: i64,
        #[arg(long)]
        trigger: Decimal,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        condition: Option<String>,
    },
    /// Cancel a resting GTT order
    CancelGtt { alert_id: String },
    /// Place an OCO target/stoploss pair
    PlaceOco {
        symbol: String,
        #[arg(long, default_value = "SELL")]
        side: String,
        #[arg(long)]
        target_qty: i64,
        #[arg(long)]
        stop_qty: i64,
        #[arg(long)]
        target_price: Decimal,
        #[arg(long)]
        stop_price: Decimal,
        #[arg(long)]
        remarks: Option<String>,
    },
    /// Replace the legs of a resting OCO pair
    ModifyOco {
        alert_id: String,
        symbol: String,
        #[arg(long, default_value = "SELL")]
        side: String,
        #[arg(long)]
        target_qty: i64,
        #[arg(long)]
        stop_qty: i64,
        #[arg(long)]
        target_price: Decimal,
        #[arg(long)]
        stop_price: Decimal,
        #[arg(long)]
        remarks: Option<String>,
    },
    /// Cancel a resting OCO pair
    CancelOco { alert_id: String },
    /// Probe whether the session credential is still accepted
    Session,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let exchange: Exchange = cli.exchange.parse()?;
    let api = make_api(&config, cli.broker)?;
    let dispatcher = OrderActionDispatcher::new(api.as_ref());

    match cli.command {
        Commands::Holdings => {
            let mut engine = PnlEngine::new(
                api.as_ref(),
                config.engine.lookback_days,
                Duration::from_millis(config.engine.history_retry_delay_ms),
            );
            let view = engine.holdings_view(Local::now().date_naive()).await?;
            print_holdings(&view);
        }
        Commands::Positions { with_pnl } => {
            let engine = PnlEngine::new(
                api.as_ref(),
                config.engine.lookback_days,
                Duration::from_millis(config.engine.history_retry_delay_ms),
            );
            let positions = engine.positions_view().await?;
            println!(
                "{:<16} {:>8} {:>8} {:>8} {:>10} {:>10} {:>10} {:>12} {:>12}",
                "Symbol", "Net", "Buy", "Sell", "BuyAvg", "SellAvg", "LTP", "Realized", "Unrealized"
            );
            for p in positions.iter().filter(|p| !with_pnl || p.has_pnl()) {
                println!(
                    "{:<16} {:>8} {:>8} {:>8} {:>10} {:>10} {:>10} {:>12} {:>12}",
                    p.instrument.symbol,
                    p.net_quantity,
                    p.buy_quantity,
                    p.sell_quantity,
                    fmt_dec(p.buy_avg),
                    fmt_dec(p.sell_avg),
                    fmt_opt(p.ltp),
                    fmt_dec(p.realized_pl),
                    fmt_dec(p.unrealized_pl),
                );
            }
        }
        Commands::Orders { pending } => {
            let orders = api.orders().await?;
            println!(
                "{:<14} {:<16} {:>6} {:>7} {:>7} {:<16} {:>10} {:>10}  {}",
                "Order ID", "Symbol", "Qty", "Filled", "Left", "Status", "Limit", "Stop", "Tag"
            );
            for o in orders.iter().filter(|o| !pending || o.is_open()) {
                println!(
                    "{:<14} {:<16} {:>6} {:>7} {:>7} {:<16} {:>10} {:>10}  {}",
                    o.id,
                    o.instrument.symbol,
                    o.quantity,
                    o.filled_quantity,
                    o.remaining_quantity,
                    o.state.to_string(),
                    fmt_dec(o.limit_price),
                    fmt_dec(o.stop_price),
                    o.tag.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Trades => {
            let trades = api.trades().await?;
            println!(
                "{:<14} {:<14} {:<16} {:>5} {:>8} {:>10} {:>12}",
                "Order ID", "Trade ID", "Symbol", "Side", "Qty", "Price", "Value"
            );
            for t in &trades {
                println!(
                    "{:<14} {:<14} {:<16} {:>5} {:>8} {:>10} {:>12}",
                    t.order_id,
                    t.trade_id,
                    t.instrument.symbol,
                    t.side.to_string(),
                    t.quantity,
                    fmt_dec(t.price),
                    fmt_dec(t.value),
                );
            }
        }
        Commands::Funds => {
            let funds = api.funds().await?;
            println!("Available funds:  {}", fmt_dec(funds.available_funds));
            println!("Used margin:      {}", fmt_dec(funds.used_margin));
            println!("Net funds:        {}", fmt_dec(funds.net_funds));
            println!("Total collateral: {}", fmt_dec(funds.total_collateral));
        }
        Commands::Place {
            symbol,
            side,
            product,
            order_type,
            qty,
            amount,
            limit,
            stop,
            tag,
        } => {
            let quantity = match (qty, amount) {
                (Some(q), _) => QuantitySpec::Shares(q),
                (None, Some(a)) => QuantitySpec::Amount(a),
                (None, None) => bail!("one of --qty or --amount is required"),
            };
            let ticket = OrderTicket {
                instrument: Instrument::on(exchange, &symbol),
                side: side.parse()?,
                product: product.parse()?,
                order_type: order_type.parse()?,
                quantity,
                limit_price: limit,
                stop_price: stop,
                tag,
            };
            let receipt = dispatcher.place(&ticket).await?;
            println!("Order {}", receipt);
        }
        Commands::Modify {
            order_id,
            order_type,
            qty,
            limit,
            stop,
        } => {
            let ticket = ModifyTicket {
                order_type: order_type.parse()?,
                quantity: qty,
                limit_price: limit,
                stop_price: stop,
            };
            let receipt = dispatcher.modify(&order_id, &ticket).await?;
            println!("Modify {}", receipt);
        }
        Commands::Cancel { order_id } => {
            let receipt = dispatcher.cancel(&order_id).await?;
            println!("Cancel {}", receipt);
        }
        Commands::ExitHoldings { symbols } => {
            let holdings = api.holdings().await?;
            let selected: Vec<_> = holdings
                .into_iter()
                .filter(|h| matches_selection(&symbols, &h.instrument))
                .collect();
            print_outcomes(&dispatcher.exit_all_holdings(&selected).await);
        }
        Commands::ExitPositions { symbols } => {
            let positions = api.positions().await?;
            let selected: Vec<_> = positions
                .into_iter()
                .filter(|p| matches_selection(&symbols, &p.instrument))
                .collect();
            print_outcomes(&dispatcher.exit_all_positions(&selected).await);
        }
        Commands::Gtt => {
            let orders = dispatcher.gtt_orders().await?;
            println!(
                "{:<12} {:<16} {:>5} {:>8} {:>10} {:>10}  Condition",
                "Alert ID", "Symbol", "Side", "Qty", "Trigger", "Price"
            );
            for g in &orders {
                println!(
                    "{:<12} {:<16} {:>5} {:>8} {:>10} {:>10}  {:?}",
                    g.alert_id,
                    g.instrument.symbol,
                    g.side.to_string(),
                    g.quantity,
                    fmt_dec(g.trigger_price),
                    fmt_dec(g.price),
                    g.condition,
                );
            }
        }
        Commands::PlaceGtt {
            symbol,
            side,
            qty,
            trigger,
            price,
            condition,
        } => {
            let ticket = gtt_ticket(exchange, &symbol, &side, qty, trigger, price, condition)?;
            let receipt = dispatcher.place_gtt(&ticket).await?;
            println!("GTT {}", receipt);
        }
        Commands::ModifyGtt {
            alert_id,
            symbol,
            side,
            qty,
            trigger,
            price,
            condition,
        } => {
            let ticket = gtt_ticket(exchange, &symbol, &side, qty, trigger, price, condition)?;
            let receipt = dispatcher.modify_gtt(&alert_id, &ticket).await?;
            println!("GTT modify {}", receipt);
        }
        Commands::CancelGtt { alert_id } => {
            let receipt = dispatcher.cancel_gtt(&alert_id).await?;
            println!("GTT cancel {}", receipt);
        }
        Commands::PlaceOco {
            symbol,
            side,
            target_qty,
            stop_qty,
            target_price,
            stop_price,
            remarks,
        } => {
            let ticket = oco_ticket(
                exchange,
                &symbol,
                &side,
                (target_qty, target_price),
                (stop_qty, stop_price),
                remarks,
            )?;
            let receipt = dispatcher.place_oco(&ticket).await?;
            println!("OCO {}", receipt);
        }
        Commands::ModifyOco {
            alert_id,
            symbol,
            side,
            target_qty,
            stop_qty,
            target_price,
            stop_price,
            remarks,
        } => {
            let ticket = oco_ticket(
                exchange,
                &symbol,
                &side,
                (target_qty, target_price),
                (stop_qty, stop_price),
                remarks,
            )?;
            let receipt = dispatcher.modify_oco(&alert_id, &ticket).await?;
            println!("OCO modify {}", receipt);
        }
        Commands::CancelOco { alert_id } => {
            let receipt = dispatcher.cancel_oco(&alert_id).await?;
            println!("OCO cancel {}", receipt);
        }
        Commands::Session => {
            if api.session_alive().await? {
                println!("Session is active.");
            } else {
                println!("Session expired. Regenerate or refresh session keys.");
            }
        }
    }

    Ok(())
}

fn make_api(config: &Config, broker: Broker) -> anyhow::Result<Box<dyn BrokerApi>> {
    let timeout = config.engine.http_timeout_secs;
    match broker {
        Broker::Fyers => {
            let fyers = config
                .fyers
                .as_ref()
                .context("missing [fyers] config section")?;
            Ok(Box::new(FyersClient::new(fyers, timeout)?))
        }
        Broker::Definedge => {
            let definedge = config
                .definedge
                .as_ref()
                .context("missing [definedge] config section")?;
            Ok(Box::new(DefinedgeClient::new(definedge, timeout)?))
        }
    }
}

fn gtt_ticket(
    exchange: Exchange,
    symbol: &str,
    side: &str,
    qty: i64,
    trigger: Decimal,
    price: Decimal,
    condition: Option<String>,
) -> anyhow::Result<GttTicket> {
    let side: Side = side.parse()?;
    let condition = match condition {
        Some(c) => c.parse()?,
        None => TriggerCondition::default_for(side),
    };
    Ok(GttTicket {
        instrument: Instrument::on(exchange, symbol),
        side,
        quantity: qty,
        trigger_price: trigger,
        price,
        condition,
    })
}

fn oco_ticket(
    exchange: Exchange,
    symbol: &str,
    side: &str,
    target: (i64, Decimal),
    stoploss: (i64, Decimal),
    remarks: Option<String>,
) -> anyhow::Result<OcoTicket> {
    Ok(OcoTicket {
        instrument: Instrument::on(exchange, symbol),
        side: side.parse()?,
        target: OcoLeg {
            quantity: target.0,
            price: target.1,
        },
        stoploss: OcoLeg {
            quantity: stoploss.0,
            price: stoploss.1,
        },
        remarks,
    })
}

fn matches_selection(symbols: &[String], instrument: &Instrument) -> bool {
    symbols.is_empty()
        || symbols
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&instrument.symbol))
}

fn print_holdings(view: &HoldingsView) {
    println!(
        "{:<16} {:>7} {:>9} {:>9} {:>11} {:>8} {:>8} {:>12} {:>12} {:>10} {:>11} {:>11}",
        "Symbol",
        "Qty",
        "Avg",
        "LTP",
        "P&L",
        "P&L %",
        "Today %",
        "Investment",
        "Value",
        "PrevClose",
        "Today P&L",
        "Realized"
    );
    for row in &view.rows {
        let m = &row.metrics;
        println!(
            "{:<16} {:>7} {:>9} {:>9} {:>11} {:>8} {:>8} {:>12} {:>12} {:>10} {:>11} {:>11}",
            row.holding.instrument.symbol,
            row.holding.quantity,
            fmt_dec(row.holding.avg_price),
            fmt_opt(row.live),
            fmt_dec(m.unrealized_pl),
            fmt_opt(m.pct_change_since_buy),
            fmt_opt(m.pct_change_today),
            fmt_dec(m.investment),
            fmt_dec(m.current_value),
            fmt_opt(row.prev_close.map(|pc| pc.close)),
            fmt_dec(m.today_pnl),
            fmt_opt(m.realized_pl),
        );
    }
    let t = &view.totals;
    println!();
    println!("Total investment:    {}", fmt_dec(t.investment));
    println!("Total current value: {}", fmt_dec(t.current_value));
    println!("Overall P&L:         {}", fmt_dec(t.unrealized_pl));
    println!("Realized P&L:        {}", fmt_dec(t.realized_pl));
    println!("Today's P&L:         {}", fmt_dec(t.today_pnl));
}

fn print_outcomes(outcomes: &[ExitOutcome]) {
    if outcomes.is_empty() {
        println!("Nothing to exit.");
        return;
    }
    for outcome in outcomes {
        match &outcome.result {
            Ok(receipt) => println!("{}: {}", outcome.instrument.symbol, receipt),
            Err(e) => println!("{}: {}", outcome.instrument.symbol, e),
        }
    }
}

fn fmt_dec(d: Decimal) -> String {
    d.round_dp(2).to_string()
}

fn fmt_opt(d: Option<Decimal>) -> String {
    match d {
        Some(d) => fmt_dec(d),
        None => "N/A".to_string(),
    }
}
