//! Durable recording of fetched rates.

use async_trait::async_trait;

use crate::error::StoreError;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresRateStore;

/// Capability to durably record a rate for a currency pair.
///
/// A store failure aborts the cycle; the job in flight stays buried so
/// the unpersisted result remains visible for manual recovery.
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn store(&self, from: &str, to: &str, rate: f64) -> Result<(), StoreError>;
}
