//! Filtering and ranking of flip opportunities.

use std::cmp::Ordering;

use crate::calculator::flip_result;
use crate::models::{FlipResult, Item, Timeframe};

/// Thresholds for the ranked flip list.
#[derive(Debug, Clone)]
pub struct FlipFilter {
    /// Velocity/volume window used for scoring
    pub timeframe: Timeframe,
    /// Minimum net profit percentage
    pub min_profit: f64,
    /// Optional maximum net profit percentage (weeds out too-good-to-be-true spreads)
    pub max_profit: Option<f64>,
    /// Maximum sell price in copper
    pub max_price: i64,
    /// Minimum 7-day average daily sells
    pub min_sold: i64,
    /// Minimum 7-day average daily buys
    pub min_bought: i64,
    /// Maximum number of results
    pub limit: usize,
}

impl Default for FlipFilter {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::Day,
            min_profit: 0.0,
            max_profit: None,
            max_price: 3_000_000,
            min_sold: 24,
            min_bought: 24,
            limit: 20,
        }
    }
}

/// Filter items by the thresholds, score each survivor over the filter's
/// timeframe, sort by flip score descending and truncate to the limit.
///
/// Items that cannot be scored (missing prices, no velocity data) are
/// excluded rather than ranked at zero.
pub fn rank_flips(items: &[Item], filter: &FlipFilter) -> Vec<FlipResult> {
    let mut results: Vec<FlipResult> = items
        .iter()
        .filter(|item| {
            if let Some(sell_price) = item.sell_price {
                if sell_price > filter.max_price {
                    return false;
                }
            }

            // Throughput thresholds use the 7-day average daily volume.
            let avg_daily_sold = item.sell_sold_7d.unwrap_or(0) as f64 / 7.0;
            let avg_daily_bought = item.buy_sold_7d.unwrap_or(0) as f64 / 7.0;
            avg_daily_sold >= filter.min_sold as f64 && avg_daily_bought >= filter.min_bought as f64
        })
        .filter_map(|item| flip_result(item, filter.timeframe))
        .filter(|result| {
            result.flip_score > 0.0
                && result.percent_profit >= filter.min_profit
                && filter
                    .max_profit
                    .map_or(true, |max| result.percent_profit <= max)
        })
        .collect();

    results.sort_by(|a, b| {
        b.flip_score
            .partial_cmp(&a.flip_score)
            .unwrap_or(Ordering::Equal)
    });
    results.truncate(filter.limit);
    results
}
