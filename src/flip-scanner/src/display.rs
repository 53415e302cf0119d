//! Console rendering: gold formatting and the flips/item views.

use common::{FlipFilter, FlipResult, Item, OrderBook, SoldQuantities, Timeframe, Velocities};

/// Compact copper amount: "1.2k" (thousands of gold), "12.3g", "45s", "9c".
pub fn format_gold(copper: i64) -> String {
    let gold = copper as f64 / 10_000.0;
    let silver = (copper % 10_000) as f64 / 100.0;
    if gold >= 1_000.0 {
        format!("{:.1}k", gold / 1_000.0)
    } else if gold >= 1.0 {
        format!("{gold:.1}g")
    } else if silver >= 1.0 {
        format!("{silver:.0}s")
    } else {
        format!("{copper}c")
    }
}

/// Whole-gold amount without a unit suffix, "1.2k" above a thousand.
pub fn format_gold_short(copper: i64) -> String {
    let gold = copper as f64 / 10_000.0;
    if gold >= 1_000.0 {
        format!("{:.1}k", gold / 1_000.0)
    } else {
        format!("{gold:.0}")
    }
}

/// Exact copper amount as "Xg YYs ZZc".
pub fn format_gsc(copper: i64) -> String {
    let gold = copper / 10_000;
    let silver = (copper % 10_000) / 100;
    let cents = copper % 100;
    if gold > 0 {
        format!("{gold}g{silver:02}s{cents:02}c")
    } else if silver > 0 {
        format!("{silver}s{cents:02}c")
    } else {
        format!("{cents}c")
    }
}

/// Gold-per-day velocity with a thousands suffix and one decimal for small
/// non-zero values.
pub fn format_velocity(velocity: f64) -> String {
    if velocity >= 1_000.0 {
        format!("{:.1}k", velocity / 1_000.0)
    } else if velocity < 10.0 && velocity != 0.0 {
        format!("{velocity:.1}")
    } else {
        format!("{velocity:.0}")
    }
}

/// Competition ratio; the unbounded sentinel renders as "inf".
pub fn format_competition_ratio(ratio: f64) -> String {
    if ratio.is_infinite() {
        "inf".to_string()
    } else {
        format!("{ratio:.1}x")
    }
}

/// Signed price-pressure percentage.
pub fn format_pressure(pressure: f64) -> String {
    if pressure > 0.0 {
        format!("+{:.1}%", pressure * 100.0)
    } else {
        format!("{:.1}%", pressure * 100.0)
    }
}

/// Render the ranked flips table.
pub fn print_flips(results: &[FlipResult], filter: &FlipFilter) {
    let days = filter.timeframe.days();

    println!();
    println!("{}", "=".repeat(140));
    println!("  TOP {} FLIP OPPORTUNITIES ({}-day)", results.len(), days);
    println!("{}", "=".repeat(140));
    println!(
        "  {:>3}  {:<24}  {:>12}  {:>12}  {:>8}  {:>10}  {:>10}  Competition",
        "#", "Item Name", "Buy", "Sell", "Profit", "Velocity", "Score"
    );
    println!("{}", "-".repeat(140));

    for (rank, result) in results.iter().enumerate() {
        let item = &result.item;
        let comp_ratio = item.buy_competition_ratio.unwrap_or(0.0);
        let comp_gold = item.competition_gold.unwrap_or(0.0);
        let comp_tiers = item.competition_tiers.unwrap_or(0);
        let pressure = item.price_pressure.unwrap_or(0.0);

        let name = truncate_name(&item.name, 24);
        let buy = item.buy_price.map_or("N/A".to_string(), format_gsc);
        let sell = item.sell_price.map_or("N/A".to_string(), format_gsc);
        let velocity = format!("{} g/d", format_velocity(result.flip_velocity));
        let score = format!("{} g/d", format_velocity(result.flip_score / 10_000.0));
        let competition = format!(
            "{}  {}g  {}t  {}",
            format_competition_ratio(comp_ratio),
            format_gold_short(comp_gold as i64),
            comp_tiers,
            format_pressure(pressure)
        );

        println!(
            "  {:>3}  {:<24}  {:>12}  {:>12}  {:>7.1}%  {:>10}  {:>10}  {}",
            rank + 1,
            name,
            buy,
            sell,
            result.percent_profit,
            velocity,
            score,
            competition
        );
    }

    println!("{}", "=".repeat(140));
    println!();
    let max_profit = filter
        .max_profit
        .map_or("None".to_string(), |p| format!("{p}%"));
    println!(
        "  Filters: days={}, min_profit={}%, max_profit={}, max_price={}, min_sold={}, min_bought={}, limit={}",
        days,
        filter.min_profit,
        max_profit,
        format_gold(filter.max_price),
        filter.min_sold,
        filter.min_bought,
        filter.limit
    );
    println!();
}

/// Render the detail view for one item.
pub fn print_item_detail(
    item: &Item,
    order_book: Option<&OrderBook>,
    flips: &[(Timeframe, Option<FlipResult>)],
    fresh_history: Option<&(SoldQuantities, Velocities)>,
) {
    println!();
    println!("{}", "=".repeat(60));
    println!("{} (ID: {})", item.name, item.id);
    println!("{}", "=".repeat(60));

    println!("\nCurrent Prices:");
    println!(
        "  Buy:  {}  (qty: {})",
        format_gold(item.buy_price.unwrap_or(0)),
        item.buy_quantity.unwrap_or(0)
    );
    println!(
        "  Sell: {}  (qty: {})",
        format_gold(item.sell_price.unwrap_or(0)),
        item.sell_quantity.unwrap_or(0)
    );
    println!(
        "  Spread: {}",
        format_gold(item.sell_price.unwrap_or(0) - item.buy_price.unwrap_or(0))
    );
    println!("  Vendor Value: {}", format_gold(item.vendor_value.unwrap_or(0)));

    if let Some(book) = order_book {
        if !book.buys.is_empty() && !book.sells.is_empty() {
            println!("\nOrder Book (top 5 each side):");
            println!("  Buys:");
            for listing in book.buys.iter().take(5) {
                println!("    {} @ {}", listing.quantity, format_gold(listing.unit_price));
            }
            println!("  Sells:");
            for listing in book.sells.iter().take(5) {
                println!("    {} @ {}", listing.quantity, format_gold(listing.unit_price));
            }
        }
    }

    println!("\nFlip Analysis:");
    for (timeframe, result) in flips {
        let label = format!("{}-day:", timeframe.days());
        match result {
            Some(result) => println!(
                "  {:<7} profit={:.2}%, score={}/d",
                label,
                result.percent_profit,
                format_gold(result.flip_score as i64)
            ),
            None => println!("  {label:<7} N/A"),
        }
    }

    println!("\nVelocity (gold/day):");
    println!("  Buy orders:");
    println!("    1-day:  {}", format_velocity(item.buy_velocity_1d.unwrap_or(0.0)));
    println!("    7-day:  {}", format_velocity(item.buy_velocity_7d.unwrap_or(0.0)));
    println!("    30-day: {}", format_velocity(item.buy_velocity_30d.unwrap_or(0.0)));
    println!("  Sell orders:");
    println!("    1-day:  {}", format_velocity(item.sell_velocity_1d.unwrap_or(0.0)));
    println!("    7-day:  {}", format_velocity(item.sell_velocity_7d.unwrap_or(0.0)));
    println!("    30-day: {}", format_velocity(item.sell_velocity_30d.unwrap_or(0.0)));

    println!("\nVolume (items/day):");
    println!("  Bought:");
    println!("    1-day:  {}", item.buy_sold_1d.unwrap_or(0));
    println!("    7-day:  {}", item.buy_sold_7d.unwrap_or(0));
    println!("    30-day: {}", item.buy_sold_30d.unwrap_or(0));
    println!("  Sold:");
    println!("    1-day:  {}", item.sell_sold_1d.unwrap_or(0));
    println!("    7-day:  {}", item.sell_sold_7d.unwrap_or(0));
    println!("    30-day: {}", item.sell_sold_30d.unwrap_or(0));

    if let Some((quantities, velocities)) = fresh_history {
        println!("\nFresh 30-day history (refetched):");
        println!(
            "  Bought: 1d={}, 7d={}, 30d={}",
            quantities.buy_1d, quantities.buy_7d, quantities.buy_30d
        );
        println!(
            "  Sold:   1d={}, 7d={}, 30d={}",
            quantities.sell_1d, quantities.sell_7d, quantities.sell_30d
        );
        println!(
            "  Buy velocity:  1d={} 7d={} 30d={} g/d",
            format_velocity(velocities.buy_1d),
            format_velocity(velocities.buy_7d),
            format_velocity(velocities.buy_30d)
        );
        println!(
            "  Sell velocity: 1d={} 7d={} 30d={} g/d",
            format_velocity(velocities.sell_1d),
            format_velocity(velocities.sell_7d),
            format_velocity(velocities.sell_30d)
        );
    }

    println!("\nCompetition:");
    if let Some(gold) = item.competition_gold {
        println!(
            "  Order book pressure: {}g in {} tiers",
            format_gold_short(gold as i64),
            item.competition_tiers.unwrap_or(0)
        );
    }
    if let Some(ratio) = item.buy_competition_ratio {
        println!("  Buy listed/sold ratio: {}", format_competition_ratio(ratio));
    }
    if let Some(ratio) = item.sell_competition_ratio {
        println!("  Sell listed/sold ratio: {}", format_competition_ratio(ratio));
    }
    if let Some(pressure) = item.price_pressure {
        println!("  Price pressure: {}", format_pressure(pressure));
    }

    println!();
}

fn truncate_name(name: &str, max: usize) -> String {
    if name.chars().count() > max {
        let head: String = name.chars().take(max - 2).collect();
        format!("{head}..")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_gold() {
        assert_eq!(format_gold(15_000_000), "1.5k");
        assert_eq!(format_gold(123_456), "12.3g");
        assert_eq!(format_gold(4_500), "45s");
        assert_eq!(format_gold(99), "99c");
        assert_eq!(format_gold(0), "0c");
    }

    #[test]
    fn test_format_gsc() {
        assert_eq!(format_gsc(123_456), "12g34s56c");
        assert_eq!(format_gsc(4_507), "45s07c");
        assert_eq!(format_gsc(99), "99c");
        assert_eq!(format_gsc(10_000), "1g00s00c");
    }

    #[test]
    fn test_format_velocity() {
        assert_eq!(format_velocity(1_500.0), "1.5k");
        assert_eq!(format_velocity(5.25), "5.2");
        assert_eq!(format_velocity(250.0), "250");
        assert_eq!(format_velocity(0.0), "0");
    }

    #[test]
    fn test_format_competition_ratio_renders_sentinel() {
        assert_eq!(format_competition_ratio(f64::INFINITY), "inf");
        assert_eq!(format_competition_ratio(2.5), "2.5x");
    }

    #[test]
    fn test_format_pressure_signed() {
        assert_eq!(format_pressure(0.153), "+15.3%");
        assert_eq!(format_pressure(-0.05), "-5.0%");
        assert_eq!(format_pressure(0.0), "0.0%");
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("Short", 24), "Short");
        let long = "A very long item name that overflows";
        let truncated = truncate_name(long, 24);
        assert_eq!(truncated.chars().count(), 24);
        assert!(truncated.ends_with(".."));
    }
}
