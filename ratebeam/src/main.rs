//! Worker entry point: connect both queue roles and process jobs forever.

use std::time::Duration;

use anyhow::Context;
use tracing::info;

use ratebeam::store::PostgresRateStore;
use ratebeam::{telemetry, HttpRateFinder, Settings, TubeConnection, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("loading configuration")?;
    telemetry::init_tracing();

    info!(
        queue = %settings.queue_addr(),
        tube = %settings.tube,
        source = ?settings.rate_source,
        "starting exchange rate worker"
    );

    let database_url = settings
        .database_url
        .as_deref()
        .context("RATEBEAM_DATABASE_URL must be set")?;
    let store = PostgresRateStore::connect(database_url)
        .await
        .context("connecting to the rate store")?;
    store.ensure_schema().await.context("ensuring store schema")?;

    let finder = HttpRateFinder::new(settings.rate_source.build());
    let consumer = TubeConnection::consumer(settings.queue_addr(), settings.tube.clone());
    let producer = TubeConnection::producer(settings.queue_addr(), settings.tube.clone());

    let mut worker = Worker::new(consumer, producer, finder, store, settings.job_options())
        .with_reconnect_backoff(Duration::from_millis(settings.reconnect_backoff_ms));

    // only a fatal setup error gets here
    worker.run().await?;
    Ok(())
}
