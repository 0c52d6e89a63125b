use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::debug;

use crate::error::StoreError;
use crate::store::RateStore;

/// PostgreSQL-backed rate store: one row per fetched rate.
#[derive(Clone, Debug)]
pub struct PostgresRateStore {
    pool: PgPool,
}

impl PostgresRateStore {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a small pool against `database_url`.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `exchange_rates` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS exchange_rates (
                id BIGSERIAL PRIMARY KEY,
                from_currency TEXT NOT NULL,
                to_currency TEXT NOT NULL,
                rate DOUBLE PRECISION NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RateStore for PostgresRateStore {
    async fn store(&self, from: &str, to: &str, rate: f64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO exchange_rates (from_currency, to_currency, rate, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(rate)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| StoreError(err.into()))?;

        debug!(from, to, rate, "stored exchange rate");
        Ok(())
    }
}
