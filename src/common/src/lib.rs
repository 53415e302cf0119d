//! Common library for the Trading Post flip tracker.
//!
//! Provides shared functionality:
//! - Configuration loading from .env
//! - SQLite storage and repository queries
//! - DataWars2 and GW2 API clients
//! - The pure metric derivation engine and flip ranking
//! - Shared data models

pub mod calculator;
pub mod config;
pub mod datawars;
pub mod db;
pub mod gw2api;
pub mod models;
pub mod ranking;
pub mod repository;

pub use calculator::{DepthMetrics, SoldQuantities, Velocities};
pub use config::Config;
pub use datawars::DataWars2Client;
pub use db::Database;
pub use gw2api::{Gw2Client, ItemDetail};
pub use models::{FlipResult, HistoryEntry, Item, ItemPrice, OrderBook, OrderListing, Timeframe};
pub use ranking::{rank_flips, FlipFilter};
pub use repository::{
    get_all_items, get_item, items_missing_vendor_value, items_with_velocity,
    recompute_derived_metrics, search_items, top_profit_candidates, update_history_metrics,
    update_order_book_metrics, update_vendor_values, upsert_item_prices,
    HistoryMetricsUpdate, OrderBookMetricsUpdate,
};
