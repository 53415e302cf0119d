//! Repository functions for item rows and their derived metrics.
//!
//! Three independent write paths touch disjoint field sets of the same row:
//! raw price upserts, history-derived metrics, and order-book metrics. None
//! of them may clobber another path's output, and every bulk write runs in
//! a single transaction so readers never observe a half-applied batch.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::calculator::{self, SoldQuantities};
use crate::models::{Item, ItemPrice};

const ITEM_COLUMNS: &str = "id, name, buy_price, sell_price, buy_quantity, sell_quantity, \
     vendor_value, buy_velocity_1d, sell_velocity_1d, buy_velocity_7d, sell_velocity_7d, \
     buy_velocity_30d, sell_velocity_30d, buy_sold_1d, sell_sold_1d, buy_sold_7d, sell_sold_7d, \
     buy_sold_30d, sell_sold_30d, buy_competition_ratio, sell_competition_ratio, \
     competition_gold, competition_tiers, price_pressure, buy_price_min_yesterday, \
     sell_price_max_yesterday, flip_score, price_updated, velocity_updated";

/// History-derived metrics for one item, written by the deep-cycle path.
#[derive(Debug, Clone)]
pub struct HistoryMetricsUpdate {
    pub item_id: i64,
    pub quantities: SoldQuantities,
    pub buy_competition_ratio: f64,
    pub sell_competition_ratio: f64,
    pub price_pressure: f64,
    pub buy_price_min_yesterday: Option<i64>,
    pub sell_price_max_yesterday: Option<i64>,
}

/// Order-book-derived metrics for one item.
#[derive(Debug, Clone)]
pub struct OrderBookMetricsUpdate {
    pub item_id: i64,
    pub competition_gold: f64,
    pub competition_tiers: i64,
}

/// Upsert raw price snapshots.
///
/// Raw fields are overwritten; vendor_value only when the snapshot supplies
/// one (it is fetched separately and sparsely); derived fields are never
/// touched by this path.
pub async fn upsert_item_prices(pool: &SqlitePool, items: &[ItemPrice]) -> Result<(), sqlx::Error> {
    if items.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    for item in items {
        sqlx::query(
            r#"
            INSERT INTO items
                (id, name, buy_price, sell_price, buy_quantity,
                 sell_quantity, vendor_value, price_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                buy_price = excluded.buy_price,
                sell_price = excluded.sell_price,
                buy_quantity = excluded.buy_quantity,
                sell_quantity = excluded.sell_quantity,
                vendor_value = COALESCE(excluded.vendor_value, items.vendor_value),
                price_updated = excluded.price_updated
            "#,
        )
        .bind(item.id)
        .bind(&item.name)
        .bind(item.buy_price)
        .bind(item.sell_price)
        .bind(item.buy_quantity)
        .bind(item.sell_quantity)
        .bind(item.vendor_value)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// Overwrite the history-derived metrics for a batch of items (deep cycle).
pub async fn update_history_metrics(
    pool: &SqlitePool,
    updates: &[HistoryMetricsUpdate],
) -> Result<(), sqlx::Error> {
    if updates.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    for update in updates {
        sqlx::query(
            r#"
            UPDATE items SET
                buy_sold_1d = ?1,
                sell_sold_1d = ?2,
                buy_sold_7d = ?3,
                sell_sold_7d = ?4,
                buy_sold_30d = ?5,
                sell_sold_30d = ?6,
                buy_competition_ratio = ?7,
                sell_competition_ratio = ?8,
                price_pressure = ?9,
                buy_price_min_yesterday = ?10,
                sell_price_max_yesterday = ?11,
                velocity_updated = ?12
            WHERE id = ?13
            "#,
        )
        .bind(update.quantities.buy_1d)
        .bind(update.quantities.sell_1d)
        .bind(update.quantities.buy_7d)
        .bind(update.quantities.sell_7d)
        .bind(update.quantities.buy_30d)
        .bind(update.quantities.sell_30d)
        .bind(update.buy_competition_ratio)
        .bind(update.sell_competition_ratio)
        .bind(update.price_pressure)
        .bind(update.buy_price_min_yesterday)
        .bind(update.sell_price_max_yesterday)
        .bind(now)
        .bind(update.item_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

#[derive(sqlx::FromRow)]
struct DerivedInputs {
    id: i64,
    buy_price: Option<i64>,
    sell_price: Option<i64>,
    vendor_value: Option<i64>,
    buy_sold_1d: Option<i64>,
    sell_sold_1d: Option<i64>,
    buy_sold_7d: Option<i64>,
    sell_sold_7d: Option<i64>,
    buy_sold_30d: Option<i64>,
    sell_sold_30d: Option<i64>,
}

/// Recompute velocities and flip scores for every stored item from already
/// stored sold quantities and current prices, with no history fetch involved,
/// so price changes ripple into the ranking signal every cycle.
///
/// A metric whose inputs are absent is left untouched (COALESCE keeps the
/// stored value): absence stays "never computed" rather than becoming zero.
/// Deterministic, so re-running without intervening raw-data changes writes
/// identical values.
pub async fn recompute_derived_metrics(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let rows: Vec<DerivedInputs> = sqlx::query_as(
        r#"
        SELECT id, buy_price, sell_price, vendor_value,
               buy_sold_1d, sell_sold_1d, buy_sold_7d, sell_sold_7d,
               buy_sold_30d, sell_sold_30d
        FROM items
        "#,
    )
    .fetch_all(pool)
    .await?;

    let velocity = |sold: Option<i64>, price: Option<i64>, days: f64| -> Option<f64> {
        let sold = sold?;
        let price = price?;
        Some(sold as f64 / days * price as f64 / 10_000.0)
    };

    let mut tx = pool.begin().await?;

    for row in rows {
        let flip_score = match (row.buy_price, row.sell_price, row.buy_sold_1d, row.sell_sold_1d) {
            (Some(buy), Some(sell), Some(buy_sold), Some(sell_sold)) if buy > 0 && sell > 0 => {
                let profit = calculator::percent_profit(buy, sell, row.vendor_value);
                Some(calculator::flip_score(buy_sold, sell_sold, buy, profit))
            }
            _ => None,
        };

        sqlx::query(
            r#"
            UPDATE items SET
                buy_velocity_1d = COALESCE(?1, buy_velocity_1d),
                sell_velocity_1d = COALESCE(?2, sell_velocity_1d),
                buy_velocity_7d = COALESCE(?3, buy_velocity_7d),
                sell_velocity_7d = COALESCE(?4, sell_velocity_7d),
                buy_velocity_30d = COALESCE(?5, buy_velocity_30d),
                sell_velocity_30d = COALESCE(?6, sell_velocity_30d),
                flip_score = COALESCE(?7, flip_score)
            WHERE id = ?8
            "#,
        )
        .bind(velocity(row.buy_sold_1d, row.buy_price, 1.0))
        .bind(velocity(row.sell_sold_1d, row.sell_price, 1.0))
        .bind(velocity(row.buy_sold_7d, row.buy_price, 7.0))
        .bind(velocity(row.sell_sold_7d, row.sell_price, 7.0))
        .bind(velocity(row.buy_sold_30d, row.buy_price, 30.0))
        .bind(velocity(row.sell_sold_30d, row.sell_price, 30.0))
        .bind(flip_score)
        .bind(row.id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// Overwrite the order-book-derived metrics for a batch of items. Runs only
/// when order-book fetching is enabled; other paths never touch these fields.
pub async fn update_order_book_metrics(
    pool: &SqlitePool,
    updates: &[OrderBookMetricsUpdate],
) -> Result<(), sqlx::Error> {
    if updates.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    for update in updates {
        sqlx::query(
            r#"
            UPDATE items SET
                competition_gold = ?1,
                competition_tiers = ?2
            WHERE id = ?3
            "#,
        )
        .bind(update.competition_gold)
        .bind(update.competition_tiers)
        .bind(update.item_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// Patch vendor values fetched out of band.
pub async fn update_vendor_values(
    pool: &SqlitePool,
    values: &[(i64, i64)],
) -> Result<(), sqlx::Error> {
    if values.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    for (item_id, vendor_value) in values {
        sqlx::query("UPDATE items SET vendor_value = ?1 WHERE id = ?2")
            .bind(vendor_value)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await
}

/// Items whose vendor value has never been fetched.
pub async fn items_missing_vendor_value(pool: &SqlitePool) -> Result<Vec<Item>, sqlx::Error> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE vendor_value IS NULL");
    sqlx::query_as(&sql).fetch_all(pool).await
}

pub async fn get_all_items(pool: &SqlitePool) -> Result<Vec<Item>, sqlx::Error> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items");
    sqlx::query_as(&sql).fetch_all(pool).await
}

pub async fn get_item(pool: &SqlitePool, item_id: i64) -> Result<Option<Item>, sqlx::Error> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
    sqlx::query_as(&sql).bind(item_id).fetch_optional(pool).await
}

/// Case-insensitive name search, capped at 20 matches.
pub async fn search_items(pool: &SqlitePool, query: &str) -> Result<Vec<Item>, sqlx::Error> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE name LIKE ?1 LIMIT 20");
    sqlx::query_as(&sql)
        .bind(format!("%{query}%"))
        .fetch_all(pool)
        .await
}

/// Items with enough data to be ranked: valid prices and at least one fill
/// on each side today.
pub async fn items_with_velocity(pool: &SqlitePool) -> Result<Vec<Item>, sqlx::Error> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM items \
         WHERE buy_price > 0 AND sell_price > 0 AND buy_sold_1d > 0 AND sell_sold_1d > 0"
    );
    sqlx::query_as(&sql).fetch_all(pool).await
}

/// Candidates for the deep history refresh, best flips first. Items without
/// a flip score yet sort by raw spread so new items still get fetched.
pub async fn top_profit_candidates(pool: &SqlitePool, limit: i64) -> Result<Vec<Item>, sqlx::Error> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM items \
         WHERE buy_price IS NOT NULL AND sell_price IS NOT NULL \
           AND buy_price > 0 AND sell_price > 0 AND sell_price > buy_price \
         ORDER BY COALESCE(flip_score, 0) DESC, (sell_price - buy_price) DESC \
         LIMIT ?1"
    );
    sqlx::query_as(&sql).bind(limit).fetch_all(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::connect_path(path.to_str().unwrap()).await.unwrap();
        (dir, db)
    }

    fn price(id: i64, buy: i64, sell: i64, vendor: Option<i64>) -> ItemPrice {
        ItemPrice {
            id,
            name: format!("Item {id}"),
            buy_price: Some(buy),
            sell_price: Some(sell),
            buy_quantity: Some(100),
            sell_quantity: Some(100),
            vendor_value: vendor,
        }
    }

    fn history_update(item_id: i64) -> HistoryMetricsUpdate {
        HistoryMetricsUpdate {
            item_id,
            quantities: SoldQuantities {
                buy_1d: 10,
                sell_1d: 15,
                buy_7d: 70,
                sell_7d: 105,
                buy_30d: 300,
                sell_30d: 450,
            },
            buy_competition_ratio: 2.5,
            sell_competition_ratio: 1.5,
            price_pressure: 0.2,
            buy_price_min_yesterday: Some(950),
            sell_price_max_yesterday: Some(1600),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let (_dir, db) = test_db().await;

        upsert_item_prices(db.pool(), &[price(1, 1000, 1500, Some(30))])
            .await
            .unwrap();

        let item = get_item(db.pool(), 1).await.unwrap().unwrap();
        assert_eq!(item.name, "Item 1");
        assert_eq!(item.buy_price, Some(1000));
        assert_eq!(item.sell_price, Some(1500));
        assert_eq!(item.vendor_value, Some(30));
        assert!(item.price_updated.is_some());
        // Derived fields start out never-computed, not zero.
        assert!(item.flip_score.is_none());
        assert!(item.buy_velocity_1d.is_none());
        assert!(item.buy_sold_1d.is_none());

        assert!(get_item(db.pool(), 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_vendor_value_unless_supplied() {
        let (_dir, db) = test_db().await;

        upsert_item_prices(db.pool(), &[price(1, 1000, 1500, Some(30))])
            .await
            .unwrap();
        // Snapshot without a vendor value: existing one is kept.
        upsert_item_prices(db.pool(), &[price(1, 1100, 1400, None)])
            .await
            .unwrap();

        let item = get_item(db.pool(), 1).await.unwrap().unwrap();
        assert_eq!(item.buy_price, Some(1100));
        assert_eq!(item.vendor_value, Some(30));

        // Snapshot with a vendor value overwrites.
        upsert_item_prices(db.pool(), &[price(1, 1100, 1400, Some(50))])
            .await
            .unwrap();
        let item = get_item(db.pool(), 1).await.unwrap().unwrap();
        assert_eq!(item.vendor_value, Some(50));
    }

    #[tokio::test]
    async fn test_price_upsert_leaves_derived_fields_untouched() {
        let (_dir, db) = test_db().await;

        upsert_item_prices(db.pool(), &[price(1, 1000, 1500, None)])
            .await
            .unwrap();
        update_history_metrics(db.pool(), &[history_update(1)])
            .await
            .unwrap();
        recompute_derived_metrics(db.pool()).await.unwrap();

        let before = get_item(db.pool(), 1).await.unwrap().unwrap();
        let score = before.flip_score.expect("flip score should be computed");
        assert!(score > 0.0);

        // Re-ingesting a raw snapshot must not clobber any derived field.
        upsert_item_prices(db.pool(), &[price(1, 900, 1600, None)])
            .await
            .unwrap();

        let after = get_item(db.pool(), 1).await.unwrap().unwrap();
        assert_eq!(after.flip_score, Some(score));
        assert_eq!(after.buy_sold_1d, before.buy_sold_1d);
        assert_eq!(after.buy_velocity_7d, before.buy_velocity_7d);
        assert_eq!(after.buy_competition_ratio, before.buy_competition_ratio);
        assert_eq!(after.price_pressure, before.price_pressure);
        assert_eq!(after.buy_price_min_yesterday, before.buy_price_min_yesterday);
        // Raw fields did move.
        assert_eq!(after.buy_price, Some(900));
    }

    #[tokio::test]
    async fn test_recompute_derived_metrics_values() {
        let (_dir, db) = test_db().await;

        upsert_item_prices(db.pool(), &[price(1, 1000, 1500, None)])
            .await
            .unwrap();
        update_history_metrics(db.pool(), &[history_update(1)])
            .await
            .unwrap();
        recompute_derived_metrics(db.pool()).await.unwrap();

        let item = get_item(db.pool(), 1).await.unwrap().unwrap();
        assert_eq!(item.buy_velocity_1d, Some(10.0 * 1000.0 / 10_000.0));
        assert_eq!(item.sell_velocity_1d, Some(15.0 * 1500.0 / 10_000.0));
        assert_eq!(item.buy_velocity_7d, Some(70.0 / 7.0 * 1000.0 / 10_000.0));
        assert_eq!(item.buy_velocity_30d, Some(300.0 / 30.0 * 1000.0 / 10_000.0));

        let expected_profit = calculator::percent_profit(1000, 1500, None);
        let expected_score = calculator::flip_score(10, 15, 1000, expected_profit);
        assert_eq!(item.flip_score, Some(expected_score));
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let (_dir, db) = test_db().await;

        upsert_item_prices(
            db.pool(),
            &[price(1, 1000, 1500, Some(20)), price(2, 50, 40, None)],
        )
        .await
        .unwrap();
        update_history_metrics(db.pool(), &[history_update(1)])
            .await
            .unwrap();

        recompute_derived_metrics(db.pool()).await.unwrap();
        let first = get_all_items(db.pool()).await.unwrap();

        recompute_derived_metrics(db.pool()).await.unwrap();
        let second = get_all_items(db.pool()).await.unwrap();

        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.flip_score, b.flip_score);
            assert_eq!(a.buy_velocity_1d, b.buy_velocity_1d);
            assert_eq!(a.sell_velocity_7d, b.sell_velocity_7d);
            assert_eq!(a.buy_velocity_30d, b.buy_velocity_30d);
        }
    }

    #[tokio::test]
    async fn test_recompute_skips_items_without_history() {
        let (_dir, db) = test_db().await;

        upsert_item_prices(db.pool(), &[price(1, 1000, 1500, None)])
            .await
            .unwrap();
        recompute_derived_metrics(db.pool()).await.unwrap();

        let item = get_item(db.pool(), 1).await.unwrap().unwrap();
        // No stored sold quantities: velocities stay never-computed.
        assert!(item.buy_velocity_1d.is_none());
        assert!(item.flip_score.is_none());
    }

    #[tokio::test]
    async fn test_order_book_path_is_independent() {
        let (_dir, db) = test_db().await;

        upsert_item_prices(db.pool(), &[price(1, 1000, 1500, None)])
            .await
            .unwrap();
        update_order_book_metrics(
            db.pool(),
            &[OrderBookMetricsUpdate {
                item_id: 1,
                competition_gold: 54.0,
                competition_tiers: 2,
            }],
        )
        .await
        .unwrap();

        // Neither the raw path nor the derived recompute touches book metrics.
        upsert_item_prices(db.pool(), &[price(1, 900, 1600, None)])
            .await
            .unwrap();
        recompute_derived_metrics(db.pool()).await.unwrap();

        let item = get_item(db.pool(), 1).await.unwrap().unwrap();
        assert_eq!(item.competition_gold, Some(54.0));
        assert_eq!(item.competition_tiers, Some(2));
    }

    #[tokio::test]
    async fn test_infinite_competition_ratio_roundtrip() {
        let (_dir, db) = test_db().await;

        upsert_item_prices(db.pool(), &[price(1, 1000, 1500, None)])
            .await
            .unwrap();

        let mut update = history_update(1);
        update.buy_competition_ratio = f64::INFINITY;
        update_history_metrics(db.pool(), &[update]).await.unwrap();

        let item = get_item(db.pool(), 1).await.unwrap().unwrap();
        let ratio = item.buy_competition_ratio.unwrap();
        assert!(ratio.is_infinite() && ratio > 0.0);
        assert_eq!(item.sell_competition_ratio, Some(1.5));
    }

    #[tokio::test]
    async fn test_vendor_backfill() {
        let (_dir, db) = test_db().await;

        upsert_item_prices(
            db.pool(),
            &[price(1, 1000, 1500, None), price(2, 10, 20, Some(5))],
        )
        .await
        .unwrap();

        let missing = items_missing_vendor_value(db.pool()).await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, 1);

        update_vendor_values(db.pool(), &[(1, 42)]).await.unwrap();
        assert!(items_missing_vendor_value(db.pool()).await.unwrap().is_empty());
        assert_eq!(
            get_item(db.pool(), 1).await.unwrap().unwrap().vendor_value,
            Some(42)
        );
    }

    #[tokio::test]
    async fn test_search_items() {
        let (_dir, db) = test_db().await;

        let mut mithril = price(1, 100, 200, None);
        mithril.name = "Mithril Ore".to_string();
        let mut orichalcum = price(2, 300, 400, None);
        orichalcum.name = "Orichalcum Ore".to_string();
        upsert_item_prices(db.pool(), &[mithril, orichalcum])
            .await
            .unwrap();

        let hits = search_items(db.pool(), "mithril").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);

        let hits = search_items(db.pool(), "Ore").await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_top_profit_candidates_ordering() {
        let (_dir, db) = test_db().await;

        upsert_item_prices(
            db.pool(),
            &[
                price(1, 1000, 1500, None),
                price(2, 1000, 1200, None),
                // Inverted spread: never a candidate.
                price(3, 1000, 900, None),
            ],
        )
        .await
        .unwrap();

        // Give item 2 a flip score; item 1 only has its spread.
        update_history_metrics(db.pool(), &[history_update(2)])
            .await
            .unwrap();
        recompute_derived_metrics(db.pool()).await.unwrap();

        let candidates = top_profit_candidates(db.pool(), 10).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, 2);
        assert_eq!(candidates[1].id, 1);

        let limited = top_profit_candidates(db.pool(), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_items_with_velocity_filter() {
        let (_dir, db) = test_db().await;

        upsert_item_prices(
            db.pool(),
            &[price(1, 1000, 1500, None), price(2, 1000, 1500, None)],
        )
        .await
        .unwrap();
        update_history_metrics(db.pool(), &[history_update(1)])
            .await
            .unwrap();

        let items = items_with_velocity(db.pool()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 1);
    }
}
