//! Flip Scanner - finds profitable flips on the Trading Post.
//!
//! Polls the DataWars2 price/history feed and the official GW2 API, keeps
//! per-item state in SQLite, derives flip metrics and ranks opportunities.

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use common::{
    calculator, repository, Config, DataWars2Client, Database, FlipFilter, Gw2Client, Timeframe,
};

mod display;
mod update;

use update::UpdateOptions;

/// Flip Scanner - finds profitable Trading Post flips
#[derive(Parser, Debug)]
#[command(name = "flip-scanner")]
#[command(about = "Finds profitable flips on the Trading Post")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the latest data from the APIs and refresh metrics
    Update {
        /// Fetch history for ALL items with a valid spread (slow, ~30k
        /// items). Without this, only the top 500 candidates are fetched
        #[arg(long)]
        full: bool,

        /// Fetch order books for depth metrics (slow)
        #[arg(long)]
        fetch_order_books: bool,

        /// Number of parallel history fetches
        #[arg(long, default_value = "32")]
        history_workers: usize,

        /// Number of parallel order book fetches
        #[arg(long, default_value = "32")]
        orderbook_workers: usize,
    },

    /// Show the best flip opportunities
    Flips {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show detailed info for an item (search by ID or name)
    Item {
        /// Item ID or name to search for
        query: String,

        /// Fetch fresh history data from the API (slower)
        #[arg(long)]
        history: bool,
    },

    /// Continuously update and show the best flips
    Watch {
        /// Update interval in seconds
        #[arg(long, default_value = "300")]
        interval: u64,

        /// How often to refresh history/order books, in seconds
        #[arg(long, default_value = "600")]
        deep_refresh_secs: u64,

        /// Fetch order books during deep refresh (slow)
        #[arg(long)]
        fetch_order_books: bool,

        /// Number of parallel history fetches
        #[arg(long, default_value = "32")]
        history_workers: usize,

        /// Number of parallel order book fetches
        #[arg(long, default_value = "32")]
        orderbook_workers: usize,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Timeframe for scoring: 1, 7 or 30 days
    #[arg(long, default_value = "1")]
    days: u32,

    /// Number of results to show
    #[arg(long, default_value = "20")]
    limit: usize,

    /// Minimum profit percentage
    #[arg(long, default_value = "0")]
    min_profit: f64,

    /// Maximum profit percentage (weeds out bait spreads)
    #[arg(long)]
    max_profit: Option<f64>,

    /// Maximum sell price in copper
    #[arg(long, default_value = "3000000")]
    max_price: i64,

    /// Minimum average daily sells over the last 7 days
    #[arg(long, default_value = "24")]
    min_sold: i64,

    /// Minimum average daily buys over the last 7 days
    #[arg(long, default_value = "24")]
    min_bought: i64,
}

impl From<&FilterArgs> for FlipFilter {
    fn from(args: &FilterArgs) -> Self {
        FlipFilter {
            timeframe: Timeframe::from_days(args.days),
            min_profit: args.min_profit,
            max_profit: args.max_profit,
            max_price: args.max_price,
            min_sold: args.min_sold,
            min_bought: args.min_bought,
            limit: args.limit,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let db = Database::connect(&config).await?;

    match cli.command {
        Command::Update {
            full,
            fetch_order_books,
            history_workers,
            orderbook_workers,
        } => {
            let options = UpdateOptions {
                full,
                deep_refresh: true,
                fetch_order_books,
                history_workers,
                orderbook_workers,
            };
            cmd_update(&db, &config, &options).await
        }
        Command::Flips { filter } => cmd_flips(&db, &FlipFilter::from(&filter)).await,
        Command::Item { query, history } => cmd_item(&db, &config, &query, history).await,
        Command::Watch {
            interval,
            deep_refresh_secs,
            fetch_order_books,
            history_workers,
            orderbook_workers,
            filter,
        } => {
            let options = UpdateOptions {
                full: false,
                deep_refresh: true,
                fetch_order_books,
                history_workers,
                orderbook_workers,
            };
            cmd_watch(
                &db,
                &config,
                interval,
                deep_refresh_secs,
                &options,
                &FlipFilter::from(&filter),
            )
            .await
        }
    }
}

async fn cmd_update(db: &Database, config: &Config, options: &UpdateOptions) -> Result<()> {
    let dw2 = DataWars2Client::new(config);
    let gw2 = Gw2Client::new(config);

    let stats = update::run_update_cycle(db, &dw2, &gw2, options).await?;
    info!(
        "Update complete: {} prices, {} vendor values, {} histories, {} order books",
        stats.prices_fetched,
        stats.vendor_values_updated,
        stats.histories_fetched,
        stats.order_books_scored
    );
    Ok(())
}

async fn cmd_flips(db: &Database, filter: &FlipFilter) -> Result<()> {
    let items = repository::items_with_velocity(db.pool()).await?;
    let results = common::rank_flips(&items, filter);

    if results.is_empty() {
        println!("No profitable flips found. Try running 'update' first.");
        return Ok(());
    }

    display::print_flips(&results, filter);
    Ok(())
}

async fn cmd_item(db: &Database, config: &Config, query: &str, fetch_history: bool) -> Result<()> {
    let item = match query.parse::<i64>() {
        Ok(item_id) => match repository::get_item(db.pool(), item_id).await? {
            Some(item) => item,
            None => {
                println!(
                    "Item with ID {item_id} not found in database. Try running 'update' first."
                );
                return Ok(());
            }
        },
        Err(_) => {
            let mut matches = repository::search_items(db.pool(), query).await?;
            if matches.is_empty() {
                println!("No items found matching '{query}'. Try a different search term.");
                return Ok(());
            }
            if matches.len() > 1 {
                println!("Multiple matches found for '{query}':\n");
                for (index, item) in matches.iter().enumerate() {
                    println!("  {}. {} (ID: {})", index + 1, item.name, item.id);
                }
                println!("\nRun with a more specific query or use the ID.");
                return Ok(());
            }
            matches.remove(0)
        }
    };

    let gw2 = Gw2Client::new(config);
    let dw2 = DataWars2Client::new(config);

    let fresh_history = if fetch_history {
        println!("Fetching fresh history data...");
        match dw2.fetch_history(item.id, 30).await {
            Ok(history) => Some((
                calculator::sold_quantities(&history),
                calculator::velocities(&history),
            )),
            Err(err) => {
                error!("History fetch failed: {}", err);
                None
            }
        }
    } else {
        None
    };

    let order_book = gw2.fetch_order_book(item.id).await;

    let flips = [
        (Timeframe::Day, calculator::flip_result(&item, Timeframe::Day)),
        (Timeframe::Week, calculator::flip_result(&item, Timeframe::Week)),
        (Timeframe::Month, calculator::flip_result(&item, Timeframe::Month)),
    ];

    display::print_item_detail(&item, order_book.as_ref(), &flips, fresh_history.as_ref());
    Ok(())
}

async fn cmd_watch(
    db: &Database,
    config: &Config,
    interval: u64,
    deep_refresh_secs: u64,
    base_options: &UpdateOptions,
    filter: &FlipFilter,
) -> Result<()> {
    println!("Starting watch mode (updating every {interval} seconds)...");
    println!("Deep refresh (history/order books) runs every {deep_refresh_secs} seconds.");
    println!("Press Ctrl+C to stop.");
    println!();

    let dw2 = DataWars2Client::new(config);
    let gw2 = Gw2Client::new(config);

    let mut last_deep_refresh: Option<Instant> = None;

    loop {
        let deep_due = last_deep_refresh
            .map_or(true, |at| at.elapsed().as_secs() >= deep_refresh_secs);

        let options = UpdateOptions {
            deep_refresh: deep_due,
            ..base_options.clone()
        };

        match update::run_update_cycle(db, &dw2, &gw2, &options).await {
            Ok(_) => {
                if deep_due {
                    last_deep_refresh = Some(Instant::now());
                }
            }
            // A failed cycle leaves the previous state standing; the next
            // cycle's overwrite brings it current.
            Err(err) => error!("Update cycle failed: {:#}", err),
        }

        let items = repository::items_with_velocity(db.pool()).await?;
        let results = common::rank_flips(&items, filter);
        if results.is_empty() {
            println!("No profitable flips found yet.");
        } else {
            display::print_flips(&results, filter);
        }

        println!("\nNext update in {interval} seconds...");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, exiting...");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }
    }

    Ok(())
}
