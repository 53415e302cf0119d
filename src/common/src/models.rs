//! Shared data models for items, trade history and order books.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A raw price snapshot for one item, as fetched from the price feed.
/// Never mutated; each fetch supersedes the previous snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPrice {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub buy_price: Option<i64>,
    pub sell_price: Option<i64>,
    pub buy_quantity: Option<i64>,
    pub sell_quantity: Option<i64>,
    #[serde(default)]
    pub vendor_value: Option<i64>,
}

/// One calendar day's trade aggregate for one item.
///
/// Sequences are ordered newest-first: index 0 is today (possibly still
/// accumulating), index 1 is yesterday. Missing days are never synthesized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub buy_sold: i64,
    #[serde(default)]
    pub sell_sold: i64,
    #[serde(default)]
    pub buy_value: i64,
    #[serde(default)]
    pub sell_value: i64,
    #[serde(default)]
    pub buy_listed: i64,
    #[serde(default)]
    pub sell_listed: i64,
    #[serde(default)]
    pub buy_delisted: i64,
    #[serde(default)]
    pub sell_delisted: i64,
    #[serde(default)]
    pub buy_price_avg: Option<f64>,
    #[serde(default)]
    pub buy_price_min: Option<i64>,
    #[serde(default)]
    pub buy_price_max: Option<i64>,
    #[serde(default)]
    pub buy_price_stdev: Option<f64>,
    #[serde(default)]
    pub sell_price_avg: Option<f64>,
    #[serde(default)]
    pub sell_price_min: Option<i64>,
    #[serde(default)]
    pub sell_price_max: Option<i64>,
    #[serde(default)]
    pub sell_price_stdev: Option<f64>,
    #[serde(default)]
    pub buy_quantity_avg: Option<f64>,
    #[serde(default)]
    pub sell_quantity_avg: Option<f64>,
    #[serde(default)]
    pub count: i64,
}

/// A single order-book listing: one price level and its total quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListing {
    #[serde(default)]
    pub unit_price: i64,
    #[serde(default)]
    pub quantity: i64,
}

/// Point-in-time order book for one item. Buys are price-descending,
/// sells price-ascending by API convention. Consumed once, never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub item_id: i64,
    #[serde(default)]
    pub buys: Vec<OrderListing>,
    #[serde(default)]
    pub sells: Vec<OrderListing>,
}

impl OrderBook {
    /// Gold value and tier count of buy orders strictly above the floor
    /// price: capital that would fill before a prospective buy order
    /// placed at the floor. Listings exactly at the floor do not count.
    pub fn buy_depth(&self, buy_price_floor: Option<i64>) -> (f64, i64) {
        let floor = match buy_price_floor {
            Some(f) if !self.buys.is_empty() => f,
            _ => return (0.0, 0),
        };

        let mut competition_gold = 0.0;
        let mut price_tiers = 0;

        for order in &self.buys {
            if order.unit_price > floor {
                competition_gold += order.unit_price as f64 * order.quantity as f64 / 10_000.0;
                price_tiers += 1;
            }
        }

        (competition_gold, price_tiers)
    }

    /// Gold value and tier count of sell listings strictly below the
    /// ceiling price: capital undercutting a prospective sell at the
    /// ceiling. Zero-priced listings are ignored.
    pub fn sell_depth(&self, sell_price_ceiling: Option<i64>) -> (f64, i64) {
        let ceiling = match sell_price_ceiling {
            Some(c) if !self.sells.is_empty() => c,
            _ => return (0.0, 0),
        };

        let mut competition_gold = 0.0;
        let mut price_tiers = 0;

        for order in &self.sells {
            if order.unit_price < ceiling && order.unit_price > 0 {
                competition_gold += order.unit_price as f64 * order.quantity as f64 / 10_000.0;
                price_tiers += 1;
            }
        }

        (competition_gold, price_tiers)
    }
}

/// A tracked item row from the database.
///
/// Raw fields are overwritten on every price fetch. Derived fields are each
/// written only by the path that produces them. `None` means "never
/// successfully computed"; callers must not treat it as zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub buy_price: Option<i64>,
    pub sell_price: Option<i64>,
    pub buy_quantity: Option<i64>,
    pub sell_quantity: Option<i64>,
    pub vendor_value: Option<i64>,
    pub buy_velocity_1d: Option<f64>,
    pub sell_velocity_1d: Option<f64>,
    pub buy_velocity_7d: Option<f64>,
    pub sell_velocity_7d: Option<f64>,
    pub buy_velocity_30d: Option<f64>,
    pub sell_velocity_30d: Option<f64>,
    pub buy_sold_1d: Option<i64>,
    pub sell_sold_1d: Option<i64>,
    pub buy_sold_7d: Option<i64>,
    pub sell_sold_7d: Option<i64>,
    pub buy_sold_30d: Option<i64>,
    pub sell_sold_30d: Option<i64>,
    pub buy_competition_ratio: Option<f64>,
    pub sell_competition_ratio: Option<f64>,
    pub competition_gold: Option<f64>,
    pub competition_tiers: Option<i64>,
    pub price_pressure: Option<f64>,
    pub buy_price_min_yesterday: Option<i64>,
    pub sell_price_max_yesterday: Option<i64>,
    pub flip_score: Option<f64>,
    pub price_updated: Option<DateTime<Utc>>,
    pub velocity_updated: Option<DateTime<Utc>>,
}

/// Timeframe used when evaluating a flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Day,
    Week,
    Month,
}

impl Timeframe {
    /// Map a CLI day count onto a timeframe. Anything that is not 1 or 7
    /// falls through to the 30-day window.
    pub fn from_days(days: u32) -> Self {
        match days {
            1 => Timeframe::Day,
            7 => Timeframe::Week,
            _ => Timeframe::Month,
        }
    }

    pub fn days(&self) -> u32 {
        match self {
            Timeframe::Day => 1,
            Timeframe::Week => 7,
            Timeframe::Month => 30,
        }
    }
}

/// A ranked flip opportunity: the item plus the metrics it was ranked by.
#[derive(Debug, Clone)]
pub struct FlipResult {
    pub item: Item,
    pub percent_profit: f64,
    pub flip_velocity: f64,
    pub flip_score: f64,
}
