//! Seed a couple of demo currency-pair jobs into the designated tube.

use anyhow::Context;
use tracing::info;

use ratebeam::{telemetry, Connectable, JobProducer, RatePayload, Settings, TubeConnection};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("loading configuration")?;
    telemetry::init_tracing();

    let mut producer = TubeConnection::producer(settings.queue_addr(), settings.tube.clone());
    producer
        .connect()
        .await
        .context("connecting producer to the queue server")?;

    let options = settings.job_options();

    let first = producer
        .put(
            &RatePayload::new("HKD", "USD"),
            options.priority,
            0,
            options.time_to_run_secs,
        )
        .await?;
    info!(job_id = first, "enqueued HKD->USD");

    let second = producer
        .put(
            &RatePayload::new("JPY", "HKD"),
            options.priority,
            3,
            options.time_to_run_secs,
        )
        .await?;
    info!(job_id = second, "enqueued JPY->HKD with a 3s delay");

    Ok(())
}
