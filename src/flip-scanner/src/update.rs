//! The update cycle: fetch, persist, derive.
//!
//! Cheap cycles refresh prices and recompute derived metrics from stored
//! state. Deep cycles additionally fetch 30-day history (and optionally
//! live order books) for the top candidates. The three write paths touch
//! disjoint field sets, so a cycle that is interrupted or partially fails
//! leaves a consistent database for the next cycle to bring current.

use std::collections::HashMap;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info};

use common::{
    calculator, repository, DataWars2Client, Database, Gw2Client, HistoryMetricsUpdate,
    OrderBookMetricsUpdate,
};

/// Knobs for one update cycle.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Fetch history for every item with a valid spread instead of the top
    /// candidates (slow, tens of thousands of items)
    pub full: bool,
    /// Include the expensive history pass this cycle
    pub deep_refresh: bool,
    /// Also fetch live order books for depth metrics
    pub fetch_order_books: bool,
    /// Concurrent history fetches
    pub history_workers: usize,
    /// Concurrent order-book fetches
    pub orderbook_workers: usize,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            full: false,
            deep_refresh: true,
            fetch_order_books: false,
            history_workers: 32,
            orderbook_workers: 32,
        }
    }
}

/// Statistics from one update cycle.
#[derive(Debug, Default)]
pub struct CycleStats {
    pub prices_fetched: usize,
    pub vendor_values_updated: usize,
    pub histories_fetched: usize,
    pub order_books_scored: usize,
}

fn log_stage(stage: &str, started: Instant) {
    debug!("[timing] {}: {:.2}s", stage, started.elapsed().as_secs_f64());
}

/// Run one update cycle.
pub async fn run_update_cycle(
    db: &Database,
    dw2: &DataWars2Client,
    gw2: &Gw2Client,
    options: &UpdateOptions,
) -> Result<CycleStats> {
    let cycle_started = Instant::now();
    let mut stats = CycleStats::default();

    let stage_started = Instant::now();
    info!("Fetching all item prices...");
    let prices = dw2.fetch_prices().await.context("price fetch failed")?;
    stats.prices_fetched = prices.len();
    debug!("Found {} items", prices.len());
    log_stage("fetch prices", stage_started);

    let stage_started = Instant::now();
    info!("Updating database...");
    repository::upsert_item_prices(db.pool(), &prices)
        .await
        .context("price upsert failed")?;
    log_stage("upsert prices", stage_started);

    let stage_started = Instant::now();
    let missing = repository::items_missing_vendor_value(db.pool()).await?;
    if !missing.is_empty() {
        debug!("Fetching vendor values for {} items...", missing.len());
        let missing_ids: Vec<i64> = missing.iter().map(|item| item.id).collect();
        let details = gw2.fetch_item_details(&missing_ids).await;
        // Items the API knows nothing about get an explicit zero so they
        // are not refetched every cycle.
        let values: Vec<(i64, i64)> = details
            .values()
            .map(|detail| (detail.id, detail.vendor_value.unwrap_or(0)))
            .collect();
        stats.vendor_values_updated = values.len();
        repository::update_vendor_values(db.pool(), &values).await?;
    }
    log_stage("vendor value refresh", stage_started);

    if !options.deep_refresh {
        let stage_started = Instant::now();
        info!("Recomputing derived metrics from stored quantities...");
        repository::recompute_derived_metrics(db.pool()).await?;
        log_stage("recompute derived metrics", stage_started);
        info!("Skipping deep refresh (history/order books) this cycle.");
        log_stage("total update cycle", cycle_started);
        return Ok(stats);
    }

    let stage_started = Instant::now();
    let candidates = if options.full {
        info!("Full update: fetching history for all items with valid prices...");
        repository::top_profit_candidates(db.pool(), i64::MAX).await?
    } else {
        debug!("Filtering for top profit candidates...");
        repository::top_profit_candidates(db.pool(), 500).await?
    };
    log_stage("load candidates", stage_started);

    let item_ids: Vec<i64> = candidates.iter().map(|item| item.id).collect();
    info!(
        "Fetching history for {} candidates ({} concurrent)...",
        item_ids.len(),
        options.history_workers.max(1)
    );
    let stage_started = Instant::now();
    let history_data = dw2
        .fetch_history_batch(&item_ids, 30, options.history_workers)
        .await;
    log_stage("fetch history", stage_started);

    info!("Calculating quantity and competition metrics...");
    let stage_started = Instant::now();
    let mut history_updates = Vec::new();
    let mut floor_prices: HashMap<i64, (Option<i64>, Option<i64>)> = HashMap::new();

    for (item_id, history) in &history_data {
        // An item whose fetch failed or that has no history yet simply
        // stays "not yet computed"; it must not block the batch.
        if history.is_empty() {
            continue;
        }

        let quantities = calculator::sold_quantities(history);
        let (buy_ratio, sell_ratio) = calculator::order_ratio(history);
        let pressure = calculator::price_pressure(history);
        let (buy_floor, sell_ceiling) = calculator::yesterday_floor_ceiling(history);

        history_updates.push(HistoryMetricsUpdate {
            item_id: *item_id,
            quantities,
            buy_competition_ratio: buy_ratio,
            sell_competition_ratio: sell_ratio,
            price_pressure: pressure,
            buy_price_min_yesterday: buy_floor,
            sell_price_max_yesterday: sell_ceiling,
        });

        if matches!(buy_floor, Some(floor) if floor > 0) {
            floor_prices.insert(*item_id, (buy_floor, sell_ceiling));
        }
    }
    stats.histories_fetched = history_updates.len();
    log_stage("calculate history metrics", stage_started);

    let stage_started = Instant::now();
    repository::update_history_metrics(db.pool(), &history_updates).await?;
    log_stage("write history metrics", stage_started);

    let stage_started = Instant::now();
    info!("Recomputing derived metrics from stored quantities...");
    repository::recompute_derived_metrics(db.pool()).await?;
    log_stage("recompute derived metrics", stage_started);

    if options.fetch_order_books {
        let book_ids: Vec<i64> = floor_prices.keys().copied().collect();
        info!(
            "Fetching order books for {} candidates ({} concurrent)...",
            book_ids.len(),
            options.orderbook_workers.max(1)
        );
        let stage_started = Instant::now();
        let order_books = gw2
            .fetch_order_books_batch(&book_ids, options.orderbook_workers)
            .await;
        log_stage("fetch order books", stage_started);

        let stage_started = Instant::now();
        let mut book_updates = Vec::new();
        for (item_id, book) in &order_books {
            let (buy_floor, sell_ceiling) = floor_prices[item_id];
            let depth = calculator::order_book_depth(book, buy_floor, sell_ceiling);
            book_updates.push(OrderBookMetricsUpdate {
                item_id: *item_id,
                competition_gold: depth.buy_gold,
                competition_tiers: depth.buy_tiers,
            });
        }
        stats.order_books_scored = book_updates.len();
        log_stage("calculate order book metrics", stage_started);

        let stage_started = Instant::now();
        repository::update_order_book_metrics(db.pool(), &book_updates).await?;
        log_stage("write order book metrics", stage_started);
    } else {
        info!("Skipping order book fetch (use --fetch-order-books to enable)");
    }

    log_stage("total update cycle", cycle_started);
    Ok(stats)
}
