//! Pure metric derivation for flip opportunities.
//!
//! Every function here is total over its documented domain: missing or
//! malformed numeric input produces a sentinel (0.0, None, zeroed struct)
//! rather than an error, so one bad item can never abort a batch pass.
//! All functions are deterministic and hold no state.

use crate::models::{FlipResult, HistoryEntry, Item, OrderBook, Timeframe};

/// Copper per gold.
const GOLD: f64 = 10_000.0;

/// Sold-quantity windows over the daily history, per side. Raw sums, no
/// averaging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoldQuantities {
    pub buy_1d: i64,
    pub sell_1d: i64,
    pub buy_7d: i64,
    pub sell_7d: i64,
    pub buy_30d: i64,
    pub sell_30d: i64,
}

/// Gold-per-day throughput windows over the daily history, per side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocities {
    pub buy_1d: f64,
    pub sell_1d: f64,
    pub buy_7d: f64,
    pub sell_7d: f64,
    pub buy_30d: f64,
    pub sell_30d: f64,
}

/// Order-book depth metrics for both sides of a prospective flip.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DepthMetrics {
    pub buy_gold: f64,
    pub buy_tiers: i64,
    pub sell_gold: f64,
    pub sell_tiers: i64,
}

/// Net profit percentage for buying at `buy_price` and relisting at
/// `sell_price`, after Trading Post fees.
///
/// The Trading Post charges a 5% listing fee and a 10% exchange fee, both
/// floor-truncated with a 1 copper minimum. Cost is `buy_price + 1` (outbid
/// the best buy order by one copper); revenue is `sell_price - 1` minus fees
/// (undercut the best sell listing by one copper).
///
/// Returns 0.0 (never negative, never an error) when either price is
/// non-positive, when the buy order would sit at or below the vendor value,
/// when there is no margin, or when vendoring beats listing.
pub fn percent_profit(buy_price: i64, sell_price: i64, vendor_value: Option<i64>) -> f64 {
    if buy_price <= 0 || sell_price <= 0 {
        return 0.0;
    }

    let cost = buy_price + 1;

    // Buy orders at or below vendor value can never fill.
    if let Some(vendor) = vendor_value {
        if buy_price <= vendor {
            return 0.0;
        }
    }

    let listing_fee = ((sell_price as f64 * 0.05) as i64).max(1);
    let exchange_fee = ((sell_price as f64 * 0.10) as i64).max(1);
    let revenue = sell_price - 1 - listing_fee - exchange_fee;

    if revenue <= cost {
        return 0.0;
    }

    // Selling to the vendor would beat listing.
    if let Some(vendor) = vendor_value {
        if revenue <= vendor {
            return 0.0;
        }
    }

    (revenue - cost) as f64 / cost as f64 * 100.0
}

/// Sold quantities over the 1/7/30-day windows, newest-first history.
///
/// Partial windows use however many days are present; an empty history
/// yields all zeros.
pub fn sold_quantities(history: &[HistoryEntry]) -> SoldQuantities {
    if history.is_empty() {
        return SoldQuantities::default();
    }

    let window = |n: usize| -> (i64, i64) {
        history
            .iter()
            .take(n)
            .fold((0, 0), |(b, s), h| (b + h.buy_sold, s + h.sell_sold))
    };

    let (buy_7d, sell_7d) = window(7);
    let (buy_30d, sell_30d) = window(30);

    SoldQuantities {
        buy_1d: history[0].buy_sold,
        sell_1d: history[0].sell_sold,
        buy_7d,
        sell_7d,
        buy_30d,
        sell_30d,
    }
}

/// Gold/day velocities over the 1/7/30-day windows, newest-first history.
///
/// The 1-day figure takes the first day with a non-zero gold value, so a
/// still-empty in-progress day does not zero it out. The 7/30-day averages
/// use every present day unconditionally, divided by the number of days
/// actually in the window.
pub fn velocities(history: &[HistoryEntry]) -> Velocities {
    if history.is_empty() {
        return Velocities::default();
    }

    let first_nonzero = |value: fn(&HistoryEntry) -> i64| -> f64 {
        history
            .iter()
            .map(value)
            .find(|v| *v != 0)
            .map(|v| v as f64 / GOLD)
            .unwrap_or(0.0)
    };

    let window_avg = |n: usize, value: fn(&HistoryEntry) -> i64| -> f64 {
        let days = history.len().min(n);
        let sum: i64 = history.iter().take(n).map(value).sum();
        sum as f64 / days as f64 / GOLD
    };

    Velocities {
        buy_1d: first_nonzero(|h| h.buy_value),
        sell_1d: first_nonzero(|h| h.sell_value),
        buy_7d: window_avg(7, |h| h.buy_value),
        sell_7d: window_avg(7, |h| h.sell_value),
        buy_30d: window_avg(30, |h| h.buy_value),
        sell_30d: window_avg(30, |h| h.sell_value),
    }
}

/// Listed-to-filled order ratio for today, per side.
///
/// A side with zero fills reports `f64::INFINITY`: orders are accumulating
/// against no fills at all, the maximal-competition signal. Empty history
/// reports (0.0, 0.0) instead; no data is not infinite competition.
pub fn order_ratio(history: &[HistoryEntry]) -> (f64, f64) {
    let today = match history.first() {
        Some(entry) => entry,
        None => return (0.0, 0.0),
    };

    let ratio = |listed: i64, sold: i64| -> f64 {
        if sold == 0 {
            f64::INFINITY
        } else {
            listed as f64 / sold as f64
        }
    };

    (
        ratio(today.buy_listed, today.buy_sold),
        ratio(today.sell_listed, today.sell_sold),
    )
}

/// Composite short-term momentum signal: spread compression between
/// yesterday and today plus today's delisting rate.
///
/// Positive compression means the bid/ask spread is converging, which
/// favours a flip closing quickly. Requires two days of history with valid
/// average prices on both; returns 0.0 otherwise. Unbounded, may be
/// negative.
pub fn price_pressure(history: &[HistoryEntry]) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }

    let today = &history[0];
    let yesterday = &history[1];

    let today_buy_avg = today.buy_price_avg.unwrap_or(0.0);
    let today_sell_avg = today.sell_price_avg.unwrap_or(0.0);
    let yesterday_buy_avg = yesterday.buy_price_avg.unwrap_or(0.0);
    let yesterday_sell_avg = yesterday.sell_price_avg.unwrap_or(0.0);

    if today_buy_avg <= 0.0 || today_sell_avg <= 0.0 {
        return 0.0;
    }
    if yesterday_buy_avg <= 0.0 || yesterday_sell_avg <= 0.0 {
        return 0.0;
    }

    let spread_today = today_sell_avg - today_buy_avg;
    let spread_yesterday = yesterday_sell_avg - yesterday_buy_avg;

    if spread_yesterday <= 0.0 {
        return 0.0;
    }

    let spread_compression = (spread_yesterday - spread_today) / spread_yesterday;

    let total_sold = today.buy_sold + today.sell_sold;
    let total_delisted = today.buy_delisted + today.sell_delisted;
    let delisted_ratio = if total_sold > 0 {
        total_delisted as f64 / total_sold as f64
    } else {
        0.0
    };

    spread_compression + delisted_ratio
}

/// Yesterday's minimum buy price and maximum sell price, used as reference
/// floor/ceiling for depth scoring. Yesterday's extremes are a steadier
/// reference than today's still-accumulating data. `(None, None)` with
/// fewer than two days of history.
pub fn yesterday_floor_ceiling(history: &[HistoryEntry]) -> (Option<i64>, Option<i64>) {
    if history.len() < 2 {
        return (None, None);
    }

    let yesterday = &history[1];
    (yesterday.buy_price_min, yesterday.sell_price_max)
}

/// Depth metrics for both sides of the book against reference prices.
pub fn order_book_depth(
    order_book: &OrderBook,
    buy_price_floor: Option<i64>,
    sell_price_ceiling: Option<i64>,
) -> DepthMetrics {
    let (buy_gold, buy_tiers) = order_book.buy_depth(buy_price_floor);
    let (sell_gold, sell_tiers) = order_book.sell_depth(sell_price_ceiling);

    DepthMetrics {
        buy_gold,
        buy_tiers,
        sell_gold,
        sell_tiers,
    }
}

/// Relative ranking score for a flip: expected gold capturable per observed
/// trading period. Throughput is limited by the scarcer side, so the
/// quantity is `min(buy_sold, sell_sold)`. Not a literal profit forecast.
///
/// Returns 0.0 for non-positive profit: an unprofitable flip never
/// outranks a profitable one on volume alone.
pub fn flip_score(buy_sold_qty: i64, sell_sold_qty: i64, buy_price: i64, percent_profit: f64) -> f64 {
    if percent_profit <= 0.0 {
        return 0.0;
    }

    let quantity = buy_sold_qty.min(sell_sold_qty);
    quantity as f64 * buy_price as f64 * (percent_profit / 100.0)
}

/// Evaluate one item as a flip over the given timeframe.
///
/// Returns `None` for items that cannot be ranked: missing or non-positive
/// prices/quantities, buy price at or under vendor value, no net profit, or
/// no velocity data for the window. An item lacking velocity is excluded,
/// not scored as zero.
pub fn flip_result(item: &Item, timeframe: Timeframe) -> Option<FlipResult> {
    let buy_price = item.buy_price?;
    let sell_price = item.sell_price?;
    let buy_quantity = item.buy_quantity?;
    let sell_quantity = item.sell_quantity?;

    if buy_price <= 0 || sell_price <= 0 {
        return None;
    }
    if buy_quantity == 0 || sell_quantity == 0 {
        return None;
    }

    // Unfillable: a buy order at or below vendor value.
    if let Some(vendor) = item.vendor_value {
        if buy_price <= vendor {
            return None;
        }
    }

    let profit = percent_profit(buy_price, sell_price, item.vendor_value);
    if profit <= 0.0 {
        return None;
    }

    let (buy_vel, sell_vel, buy_sold, sell_sold) = match timeframe {
        Timeframe::Day => (
            item.buy_velocity_1d.unwrap_or(0.0),
            item.sell_velocity_1d.unwrap_or(0.0),
            item.buy_sold_1d.unwrap_or(0),
            item.sell_sold_1d.unwrap_or(0),
        ),
        Timeframe::Week => (
            item.buy_velocity_7d.unwrap_or(0.0),
            item.sell_velocity_7d.unwrap_or(0.0),
            item.buy_sold_7d.unwrap_or(0),
            item.sell_sold_7d.unwrap_or(0),
        ),
        Timeframe::Month => (
            item.buy_velocity_30d.unwrap_or(0.0),
            item.sell_velocity_30d.unwrap_or(0.0),
            item.buy_sold_30d.unwrap_or(0),
            item.sell_sold_30d.unwrap_or(0),
        ),
    };

    if buy_vel <= 0.0 || sell_vel <= 0.0 {
        return None;
    }

    let score = flip_score(buy_sold, sell_sold, buy_price, profit);
    if score <= 0.0 {
        return None;
    }

    Some(FlipResult {
        item: item.clone(),
        percent_profit: profit,
        flip_velocity: buy_vel.min(sell_vel),
        flip_score: score,
    })
}
