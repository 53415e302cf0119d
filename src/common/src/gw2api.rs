//! Official GW2 API client for item details (vendor values) and live
//! order-book listings.
//!
//! See: https://wiki.guildwars2.com/wiki/API:2

use std::collections::HashMap;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::datawars::is_retriable;
use crate::models::{OrderBook, OrderListing};
use crate::Config;

/// The items and listings endpoints accept at most 200 ids per request.
const CHUNK_SIZE: usize = 200;

const BACKOFF_BASE: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum Gw2Error {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),
}

/// Static item details from the /items endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDetail {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vendor_value: Option<i64>,
}

/// Raw order-book payload from the /commerce/listings endpoint.
#[derive(Debug, Deserialize)]
struct RawListings {
    id: i64,
    #[serde(default)]
    buys: Vec<OrderListing>,
    #[serde(default)]
    sells: Vec<OrderListing>,
}

impl From<RawListings> for OrderBook {
    fn from(raw: RawListings) -> Self {
        OrderBook {
            item_id: raw.id,
            buys: raw.buys,
            sells: raw.sells,
        }
    }
}

/// Official GW2 API client.
pub struct Gw2Client {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl Gw2Client {
    /// Create a new GW2 API client.
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.gw2_api_url.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
        }
    }

    /// GET with bounded exponential backoff on retriable failures.
    async fn request(&self, url: &str) -> Result<reqwest::Response, Gw2Error> {
        let mut attempt = 0;
        loop {
            let result = self.client.get(url).timeout(self.timeout).send().await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if !is_retriable(status.as_u16()) || attempt >= self.max_retries {
                        return Err(Gw2Error::ApiError(format!("API returned status: {status}")));
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

    /// Fetch static item details for a set of ids, chunked to the API's id
    /// limit. A failed chunk is skipped with a warning; the rest of the
    /// batch still resolves.
    pub async fn fetch_item_details(&self, item_ids: &[i64]) -> HashMap<i64, ItemDetail> {
        let mut results = HashMap::new();

        for chunk in item_ids.chunks(CHUNK_SIZE) {
            let ids = join_ids(chunk);
            let url = format!("{}/items?ids={}", self.base_url, ids);

            match self.fetch_details_chunk(&url).await {
                Ok(details) => {
                    for detail in details {
                        results.insert(detail.id, detail);
                    }
                }
                Err(err) => warn!("Item details fetch failed for chunk: {}", err),
            }
        }

        debug!("Fetched details for {} items", results.len());
        results
    }

    async fn fetch_details_chunk(&self, url: &str) -> Result<Vec<ItemDetail>, Gw2Error> {
        let response = self.request(url).await?;
        Ok(response.json().await?)
    }

    /// Fetch the live order book for one item. A missing book (no listings,
    /// upstream failure) degrades to `None`.
    pub async fn fetch_order_book(&self, item_id: i64) -> Option<OrderBook> {
        let url = format!("{}/commerce/listings/{}", self.base_url, item_id);

        match self.fetch_book(&url).await {
            Ok(raw) => Some(raw.into()),
            Err(err) => {
                warn!("Order book fetch failed for item {}: {}", item_id, err);
                None
            }
        }
    }

    async fn fetch_book(&self, url: &str) -> Result<RawListings, Gw2Error> {
        let response = self.request(url).await?;
        Ok(response.json().await?)
    }

    /// Fetch order books for many items: chunked to the id limit, chunks
    /// fetched with bounded concurrency, failed chunks degrade to missing
    /// entries for their items only.
    pub async fn fetch_order_books_batch(
        &self,
        item_ids: &[i64],
        max_concurrent: usize,
    ) -> HashMap<i64, OrderBook> {
        if item_ids.is_empty() {
            return HashMap::new();
        }

        let chunk_results: Vec<Vec<OrderBook>> = stream::iter(item_ids.chunks(CHUNK_SIZE))
            .map(|chunk| async move {
                let url = format!("{}/commerce/listings?ids={}", self.base_url, join_ids(chunk));
                match self.fetch_books_chunk(&url).await {
                    Ok(books) => books,
                    Err(err) => {
                        warn!("Order book fetch failed for chunk: {}", err);
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await;

        chunk_results
            .into_iter()
            .flatten()
            .map(|book| (book.item_id, book))
            .collect()
    }

    async fn fetch_books_chunk(&self, url: &str) -> Result<Vec<OrderBook>, Gw2Error> {
        let response = self.request(url).await?;
        let raw: Vec<RawListings> = response.json().await?;
        Ok(raw.into_iter().map(OrderBook::from).collect())
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_ids() {
        assert_eq!(join_ids(&[1, 2, 3]), "1,2,3");
        assert_eq!(join_ids(&[42]), "42");
        assert_eq!(join_ids(&[]), "");
    }

    #[test]
    fn test_item_detail_parses_without_vendor_value() {
        let json = r#"{"id": 19684, "name": "Mithril Ingot", "type": "CraftingMaterial"}"#;
        let detail: ItemDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.id, 19684);
        assert_eq!(detail.vendor_value, None);
    }

    #[test]
    fn test_listings_payload_parses() {
        let json = r#"{
            "id": 19684,
            "buys": [
                {"listings": 5, "unit_price": 44, "quantity": 1200},
                {"listings": 1, "unit_price": 43, "quantity": 300}
            ],
            "sells": [
                {"listings": 2, "unit_price": 48, "quantity": 800}
            ]
        }"#;

        let raw: RawListings = serde_json::from_str(json).unwrap();
        let book: OrderBook = raw.into();
        assert_eq!(book.item_id, 19684);
        assert_eq!(book.buys.len(), 2);
        assert_eq!(book.buys[0].unit_price, 44);
        assert_eq!(book.sells[0].quantity, 800);
    }

    #[test]
    fn test_listings_payload_defaults_empty_sides() {
        let raw: RawListings = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        let book: OrderBook = raw.into();
        assert!(book.buys.is_empty());
        assert!(book.sells.is_empty());
    }
}
