//! Database connection and schema bootstrap.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

use crate::Config;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Failed to open database: {0}")]
    ConnectionError(#[from] sqlx::Error),
}

/// One row per tracked item. Raw price fields are overwritten every fetch
/// cycle; each derived field is written only by the path that produces it.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    buy_price INTEGER,
    sell_price INTEGER,
    buy_quantity INTEGER,
    sell_quantity INTEGER,
    vendor_value INTEGER,
    buy_velocity_1d REAL,
    sell_velocity_1d REAL,
    buy_velocity_7d REAL,
    sell_velocity_7d REAL,
    buy_velocity_30d REAL,
    sell_velocity_30d REAL,
    buy_sold_1d INTEGER,
    sell_sold_1d INTEGER,
    buy_sold_7d INTEGER,
    sell_sold_7d INTEGER,
    buy_sold_30d INTEGER,
    sell_sold_30d INTEGER,
    buy_competition_ratio REAL,
    sell_competition_ratio REAL,
    competition_gold REAL,
    competition_tiers INTEGER,
    price_pressure REAL,
    buy_price_min_yesterday INTEGER,
    sell_price_max_yesterday INTEGER,
    flip_score REAL,
    price_updated TEXT,
    velocity_updated TEXT
)
"#;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database configured by `config`.
    pub async fn connect(config: &Config) -> Result<Self, DbError> {
        Self::connect_path(&config.database_path).await
    }

    /// Open a database at an explicit path. Used by tests and tooling.
    pub async fn connect_path(path: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if the database connection is healthy.
    pub async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
