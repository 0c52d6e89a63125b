//! The reserve -> bury -> act -> finalize protocol for a single job.

use tracing::{info, warn, Instrument};

use crate::error::{CycleError, RateError};
use crate::queue::{JobConsumer, JobProducer, ReservedJob};
use crate::source::RateFinder;
use crate::store::RateStore;
use crate::telemetry;

/// Delay before a successfully processed pair is fetched again.
pub const RESUBMIT_DELAY_AFTER_SUCCESS_SECS: u32 = 60;

/// Near-immediate retry delay after a failed fetch.
pub const RESUBMIT_DELAY_AFTER_FAILURE_SECS: u32 = 3;

/// Fixed knobs applied to every queue submission.
#[derive(Clone, Copy, Debug)]
pub struct JobOptions {
    /// Priority used for bury and put.
    pub priority: u32,
    /// Time-to-run granted to whoever reserves a resubmitted job.
    pub time_to_run_secs: u32,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 1024,
            time_to_run_secs: 60,
        }
    }
}

/// How one cycle ended, for logging and tests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    /// Rate stored; job resubmitted for another round.
    Resubmitted { new_job_id: u64 },
    /// Rate stored; the success limit is reached, the job is retired.
    Retired,
    /// Fetch failed; job resubmitted for another try.
    Requeued { new_job_id: u64 },
    /// Fetch failed for the last time; the job stays buried for
    /// inspection and is deliberately not deleted.
    Discarded,
}

/// Run exactly one job cycle: reserve the next job, quarantine it, fetch
/// and persist its rate, then resubmit or retire it.
///
/// The bury happens before anything else so a crash mid-cycle leaves the
/// job parked instead of bouncing straight back to another worker. On the
/// success path the original job is deleted only after the store write and
/// any resubmission; on the failure path it is never deleted.
pub async fn run_cycle<C, P, F, S>(
    consumer: &mut C,
    producer: &mut P,
    finder: &F,
    store: &S,
    options: &JobOptions,
) -> Result<CycleOutcome, CycleError>
where
    C: JobConsumer,
    P: JobProducer,
    F: RateFinder + ?Sized,
    S: RateStore + ?Sized,
{
    let job = consumer.reserve().await.map_err(CycleError::Queue)?;
    let span = telemetry::cycle_span(job.id, &job.payload.from, &job.payload.to);

    async {
        consumer
            .bury(job.id, options.priority)
            .await
            .map_err(CycleError::Queue)?;

        match finder.find_rate(&job.payload.from, &job.payload.to).await {
            Ok(rate) => {
                info!(rate, "exchange rate found");
                store
                    .store(&job.payload.from, &job.payload.to, rate)
                    .await
                    .map_err(CycleError::Store)?;

                let next = job.payload.with_successful_attempt();
                let outcome = if next.is_finished() {
                    info!("success limit reached, retiring job");
                    CycleOutcome::Retired
                } else {
                    let new_job_id = producer
                        .put(
                            &next,
                            options.priority,
                            RESUBMIT_DELAY_AFTER_SUCCESS_SECS,
                            options.time_to_run_secs,
                        )
                        .await
                        .map_err(CycleError::Queue)?;
                    CycleOutcome::Resubmitted { new_job_id }
                };

                consumer.delete(job.id).await.map_err(CycleError::Queue)?;
                Ok(outcome)
            }
            Err(err) => handle_fetch_failure(&job, err, producer, options).await,
        }
    }
    .instrument(span)
    .await
}

/// Failure side of the act step: count the failure and either requeue or
/// leave the job buried for good. The reserved job is not deleted here.
async fn handle_fetch_failure<P: JobProducer>(
    job: &ReservedJob,
    err: RateError,
    producer: &mut P,
    options: &JobOptions,
) -> Result<CycleOutcome, CycleError> {
    warn!(error = %err, "failed to find exchange rate");

    let next = job.payload.with_failed_attempt();
    if next.should_discard() {
        info!("failure limit reached, job stays buried");
        return Ok(CycleOutcome::Discarded);
    }

    let new_job_id = producer
        .put(
            &next,
            options.priority,
            RESUBMIT_DELAY_AFTER_FAILURE_SECS,
            options.time_to_run_secs,
        )
        .await
        .map_err(CycleError::Queue)?;
    Ok(CycleOutcome::Requeued { new_job_id })
}
