//! DataWars2 API client for bulk prices and per-item trade history.
//!
//! See: https://api.datawars2.ie/gw2/v1

use std::collections::HashMap;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{HistoryEntry, ItemPrice};
use crate::Config;

/// Upstream statuses worth retrying: rate limiting and transient 5xx.
pub(crate) const RETRIABLE_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];

pub(crate) fn is_retriable(status: u16) -> bool {
    RETRIABLE_STATUS_CODES.contains(&status)
}

/// Base delay for exponential retry backoff.
const BACKOFF_BASE: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum DataWarsError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),
}

/// DataWars2 API client.
pub struct DataWars2Client {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl DataWars2Client {
    /// Create a new DataWars2 API client.
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.datawars_api_url.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
        }
    }

    /// GET with bounded exponential backoff on retriable failures.
    async fn request(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, DataWarsError> {
        let mut attempt = 0;
        loop {
            let result = self
                .client
                .get(url)
                .query(query)
                .timeout(self.timeout)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if !is_retriable(status.as_u16()) || attempt >= self.max_retries {
                        return Err(DataWarsError::ApiError(format!(
                            "API returned status: {status}"
                        )));
                    }
                }
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(err.into());
                    }
                }
            }

            let backoff = BACKOFF_BASE * 2u32.pow(attempt);
            debug!("Retrying {} after {:?} (attempt {})", url, backoff, attempt + 1);
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Fetch the current price snapshot for every tradable item.
    ///
    /// Rows that fail to parse are skipped, not fatal: one malformed item
    /// must not sink the whole cycle.
    pub async fn fetch_prices(&self) -> Result<Vec<ItemPrice>, DataWarsError> {
        let url = format!("{}/items/json", self.base_url);
        let fields = "id,name,buy_price,sell_price,buy_quantity,sell_quantity";

        let response = self
            .request(&url, &[("fields", fields.to_string())])
            .await?;
        let rows: Vec<serde_json::Value> = response.json().await?;

        let items: Vec<ItemPrice> = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect();

        debug!("Fetched {} price snapshots", items.len());
        Ok(items)
    }

    /// Fetch the last `days` of daily trade history for one item,
    /// newest-first.
    pub async fn fetch_history(
        &self,
        item_id: i64,
        days: i64,
    ) -> Result<Vec<HistoryEntry>, DataWarsError> {
        let url = format!("{}/history", self.base_url);
        let end = Utc::now();
        let start = end - ChronoDuration::days(days);

        let query = [
            ("itemID", item_id.to_string()),
            ("start", start.format("%Y-%m-%d").to_string()),
            ("end", end.format("%Y-%m-%d").to_string()),
        ];

        let response = self.request(&url, &query).await?;
        let entries: Vec<HistoryEntry> = response.json().await?;
        Ok(entries)
    }

    /// Fetch history for many items with bounded concurrency.
    ///
    /// A failed fetch degrades to an empty history for that item only;
    /// the batch always completes.
    pub async fn fetch_history_batch(
        &self,
        item_ids: &[i64],
        days: i64,
        max_concurrent: usize,
    ) -> HashMap<i64, Vec<HistoryEntry>> {
        if item_ids.is_empty() {
            return HashMap::new();
        }

        stream::iter(item_ids.iter().copied())
            .map(|item_id| async move {
                match self.fetch_history(item_id, days).await {
                    Ok(history) => (item_id, history),
                    Err(err) => {
                        warn!("History fetch failed for item {}: {}", item_id, err);
                        (item_id, Vec::new())
                    }
                }
            })
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_statuses() {
        assert!(is_retriable(429));
        assert!(is_retriable(500));
        assert!(is_retriable(502));
        assert!(is_retriable(503));
        assert!(is_retriable(504));
        assert!(!is_retriable(200));
        assert!(!is_retriable(404));
        assert!(!is_retriable(400));
    }

    #[test]
    fn test_price_row_parses_with_nulls() {
        let json = r#"{"id": 19684, "name": "Mithril Ingot", "buy_price": 45,
                       "sell_price": null, "buy_quantity": 12000, "sell_quantity": null}"#;
        let item: ItemPrice = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, 19684);
        assert_eq!(item.buy_price, Some(45));
        assert_eq!(item.sell_price, None);
        assert_eq!(item.vendor_value, None);
    }

    #[test]
    fn test_malformed_price_rows_are_skipped() {
        let rows: Vec<serde_json::Value> = serde_json::from_str(
            r#"[{"id": 1, "name": "Good"}, {"name": "No id"}, {"id": 2, "name": "Also good"}]"#,
        )
        .unwrap();

        let items: Vec<ItemPrice> = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, 1);
        assert_eq!(items[1].id, 2);
    }

    #[test]
    fn test_history_entry_parses_partial_row() {
        let json = r#"{"date": "2024-03-01", "buy_sold": 120, "sell_sold": 80,
                       "buy_value": 540000, "sell_value": 610000,
                       "buy_price_avg": 45.2, "sell_price_max": 99}"#;
        let entry: HistoryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.date, "2024-03-01");
        assert_eq!(entry.buy_sold, 120);
        assert_eq!(entry.buy_value, 540_000);
        assert_eq!(entry.buy_price_avg, Some(45.2));
        assert_eq!(entry.sell_price_max, Some(99));
        // Unsupplied fields default rather than failing the row.
        assert_eq!(entry.buy_listed, 0);
        assert_eq!(entry.buy_price_min, None);
        assert_eq!(entry.count, 0);
    }
}
