//! Cookie ingredient trading simulator.
//!
//! Tracks simulated positions in a fixed set of ingredients, computes
//! P/L and a trader-scaled fee on every close, and keeps an append-only
//! trading history in SQLite.

mod db;
mod error;
mod fees;
mod ledger;
mod models;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::db::Database;
use crate::ledger::{CloseOutcome, Ledger, PositionKey, SellQuantity};
use crate::models::Ingredient;

/// Cookie ingredient trading simulator CLI.
#[derive(Parser)]
#[command(name = "cookietrader")]
#[command(about = "Track simulated ingredient positions with a trader-scaled fee", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:./trading.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a position (merges into an existing holding of the ingredient)
    Open {
        /// Ingredient code (CRL, CHC, BTR, SUC, NOI, SEL, VNL, OEUF)
        ingredient: String,

        /// Quantity to buy
        quantity: i64,

        /// Entry price per unit
        price: f64,

        /// Optional comment
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Close some or all of a position
    Close {
        /// Position id or ingredient code
        target: String,

        /// Exit price per unit
        price: f64,

        /// Quantity to sell: a number, or 'max'/'all'
        #[arg(short, long, default_value = "all")]
        quantity: String,

        /// Optional comment
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Preview a close without touching stored state
    Simulate {
        /// Position id or ingredient code
        target: String,

        /// Hypothetical exit price per unit
        price: f64,

        /// Quantity to sell: a number, or 'max'/'all'
        #[arg(short, long, default_value = "all")]
        quantity: String,
    },

    /// Preview a full hypothetical trade (entry and exit)
    SimulateTrade {
        /// Ingredient code
        ingredient: String,

        /// Quantity
        quantity: i64,

        /// Entry price per unit
        entry: f64,

        /// Hypothetical exit price per unit
        exit: f64,
    },

    /// List the tradeable ingredient codes
    Ingredients,

    /// List open positions
    Positions {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show trading history
    History {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show per-ingredient holdings with weighted-average cost
    Portfolio {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the trading dashboard
    Dashboard {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Update the trader count driving the fee
    SetTraders {
        /// New trader count
        count: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let db = Database::new(&cli.database).await?;
    let ledger = Ledger::new(db);

    match cli.command {
        Commands::Open {
            ingredient,
            quantity,
            price,
            comment,
        } => {
            let position = ledger
                .open(&ingredient, quantity, price, comment.as_deref())
                .await?;

            println!(
                "Opened position {}: {} {} at {}",
                position.id,
                position.quantity,
                position.ingredient,
                money(position.entry_price)
            );
        }

        Commands::Close {
            target,
            price,
            quantity,
            comment,
        } => {
            let key: PositionKey = target.parse()?;
            let sell: SellQuantity = quantity.parse()?;

            let result = ledger.close(key, price, sell, comment.as_deref()).await?;
            print_close(&result, "Position closed");
        }

        Commands::Simulate {
            target,
            price,
            quantity,
        } => {
            let key: PositionKey = target.parse()?;
            let sell: SellQuantity = quantity.parse()?;

            let result = ledger.simulate_close(key, price, sell).await?;
            print_close(&result, "Simulation (nothing was written)");
        }

        Commands::SimulateTrade {
            ingredient,
            quantity,
            entry,
            exit,
        } => {
            let out = ledger
                .simulate_trade(&ingredient, quantity, entry, exit)
                .await?;

            println!("Trade simulation: {} {} @ {} -> {}", quantity, ingredient.to_uppercase(), money(entry), money(exit));
            println!("  Gross P/L: {}", signed_money(out.gross_pl));
            println!("  Fee:       {} @ {}%", money(out.fee_amount), out.fee_percentage);
            println!("  Net P/L:   {}", signed_money(out.net_pl));
        }

        Commands::Ingredients => {
            println!("{:<6} NAME", "CODE");
            for ing in Ingredient::ALL {
                println!("{:<6} {}", ing.code(), ing.name());
            }
        }

        Commands::Positions { json } => {
            let positions = ledger.open_positions().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&positions)?);
                return Ok(());
            }
            if positions.is_empty() {
                println!("No open positions");
                return Ok(());
            }

            println!(
                "\n{:>4} {:<10} {:>10} {:>12} {:<20} COMMENT",
                "ID", "INGREDIENT", "QUANTITY", "ENTRY", "ENTRY DATE"
            );
            println!("{}", "-".repeat(78));
            for p in positions {
                println!(
                    "{:>4} {:<10} {:>10} {:>12} {:<20} {}",
                    p.id,
                    ingredient_label(&p.ingredient),
                    p.quantity,
                    money(p.entry_price),
                    p.entry_date,
                    p.comment.as_deref().unwrap_or("")
                );
            }
        }

        Commands::History { json } => {
            let trades = ledger.trading_history().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&trades)?);
                return Ok(());
            }
            if trades.is_empty() {
                println!("No trading history");
                return Ok(());
            }

            println!(
                "\n{:>4} {:<10} {:>12} {:>12} {:>12} {:>10} {:<20}",
                "ID", "INGREDIENT", "ENTRY", "EXIT", "NET P/L", "FEE", "EXIT DATE"
            );
            println!("{}", "-".repeat(88));
            for t in trades {
                println!(
                    "{:>4} {:<10} {:>12} {:>12} {:>12} {:>9}% {:<20}",
                    t.id,
                    ingredient_label(&t.ingredient),
                    money(t.entry_price),
                    money(t.exit_price),
                    signed_money(t.profit_loss),
                    t.fee_percentage,
                    t.exit_date
                );
            }
        }

        Commands::Portfolio { json } => {
            let holdings = ledger.portfolio().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&holdings)?);
                return Ok(());
            }
            if holdings.is_empty() {
                println!("No holdings");
                return Ok(());
            }

            println!(
                "\n{:<10} {:>10} {:>14} {:>14}",
                "INGREDIENT", "QUANTITY", "AVG PRICE", "COST BASIS"
            );
            println!("{}", "-".repeat(52));
            for h in &holdings {
                println!(
                    "{:<10} {:>10} {:>14} {:>14}",
                    ingredient_label(&h.ingredient),
                    h.quantity,
                    money(h.average_price),
                    money(h.cost_basis())
                );
            }
        }

        Commands::Dashboard { json } => {
            let s = ledger.summary().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&s)?);
                return Ok(());
            }

            println!(
                "\nTrading Dashboard (as of {})",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            );
            println!("{}", "-".repeat(40));
            println!("  Traders:        {} (fee {}%)", s.trader_count, s.current_fee);
            println!("  Open positions: {}", s.open_positions);
            println!("  Total P/L:      {}", signed_money(s.total_profit_loss));
            println!("  Total trades:   {}", s.total_trades);
        }

        Commands::SetTraders { count } => {
            let fee = ledger.set_trader_count(count).await?;
            println!("Updated trader count to {count} (fee: {fee}%)");
        }
    }

    Ok(())
}

fn print_close(result: &CloseOutcome, heading: &str) {
    println!("{heading}:");
    println!("  Position:  {} ({})", result.position_id, result.ingredient);
    println!(
        "  Sold:      {} ({} remaining{})",
        result.quantity_sold,
        result.remaining_quantity,
        if result.position_closed { ", closed" } else { "" }
    );
    println!("  Gross P/L: {}", signed_money(result.outcome.gross_pl));
    println!(
        "  Fee:       {} @ {}%",
        money(result.outcome.fee_amount),
        result.outcome.fee_percentage
    );
    println!("  Net P/L:   {}", signed_money(result.outcome.net_pl));
}

fn ingredient_label(code: &str) -> String {
    match code.parse::<Ingredient>() {
        Ok(ing) => format!("{} {}", ing.code(), ing.name()),
        Err(_) => code.to_string(),
    }
}

fn money(amount: f64) -> String {
    format!("${:.2}", amount.abs())
}

fn signed_money(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${:.2}", amount)
    }
}
