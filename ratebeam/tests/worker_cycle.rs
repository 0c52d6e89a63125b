//! Lifecycle and worker loop tests against the in-memory testkit queue.
//!
//! Covers the single-cycle protocol (reserve, bury, act, finalize), the
//! attempt-saturation outcomes, and the worker loop's reconnect behavior.

use std::time::Duration;

use ratebeam::lifecycle::{
    run_cycle, CycleOutcome, JobOptions, RESUBMIT_DELAY_AFTER_FAILURE_SECS,
    RESUBMIT_DELAY_AFTER_SUCCESS_SECS,
};
use ratebeam::payload::{Attempts, RatePayload};
use ratebeam::worker::{Step, Worker};
use ratebeam::{ConnectionRole, CycleError, SetupError};
use ratebeam_testkit::{InMemoryTube, RecordingRateStore, StoredRate, StubRateFinder};

fn payload_with_attempts(successful: u32, failed: u32) -> RatePayload {
    let mut payload = RatePayload::new("HKD", "USD");
    payload.attempts = Some(Attempts { successful, failed });
    payload
}

#[tokio::test]
async fn test_fresh_job_is_stored_resubmitted_and_deleted() {
    let tube = InMemoryTube::new();
    let (mut consumer, mut producer) = (tube.clone(), tube.clone());
    let job_id = tube.seed(&RatePayload::new("HKD", "USD"));
    let finder = StubRateFinder::returning(7.75);
    let store = RecordingRateStore::new();

    let outcome = run_cycle(
        &mut consumer,
        &mut producer,
        &finder,
        &store,
        &JobOptions::default(),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, CycleOutcome::Resubmitted { .. }));
    assert_eq!(
        store.stored(),
        vec![StoredRate {
            from: "HKD".to_string(),
            to: "USD".to_string(),
            rate: 7.75,
        }]
    );

    let puts = tube.puts();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].payload, payload_with_attempts(1, 0));
    assert_eq!(puts[0].delay_secs, RESUBMIT_DELAY_AFTER_SUCCESS_SECS);

    assert_eq!(tube.deleted_ids(), vec![job_id]);
    assert!(!tube.is_buried(job_id));
    // bury always precedes the act step; delete comes after the resubmit
    assert_eq!(tube.ops(), vec!["reserve", "bury", "put", "delete"]);
}

#[tokio::test]
async fn test_success_limit_retires_job_without_resubmit() {
    let tube = InMemoryTube::new();
    let (mut consumer, mut producer) = (tube.clone(), tube.clone());
    let job_id = tube.seed(&payload_with_attempts(9, 0));
    let finder = StubRateFinder::returning(7.75);
    let store = RecordingRateStore::new();

    let outcome = run_cycle(
        &mut consumer,
        &mut producer,
        &finder,
        &store,
        &JobOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome, CycleOutcome::Retired);
    assert_eq!(store.stored().len(), 1);
    assert!(tube.puts().is_empty());
    assert_eq!(tube.deleted_ids(), vec![job_id]);
}

#[tokio::test]
async fn test_failure_limit_leaves_job_buried() {
    let tube = InMemoryTube::new();
    let (mut consumer, mut producer) = (tube.clone(), tube.clone());
    let job_id = tube.seed(&payload_with_attempts(0, 2));
    let finder = StubRateFinder::failing();
    let store = RecordingRateStore::new();

    let outcome = run_cycle(
        &mut consumer,
        &mut producer,
        &finder,
        &store,
        &JobOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome, CycleOutcome::Discarded);
    assert!(store.stored().is_empty());
    assert!(tube.puts().is_empty());
    assert!(tube.is_buried(job_id), "discarded job must stay buried");
    assert!(tube.deleted_ids().is_empty());
}

#[tokio::test]
async fn test_failed_fetch_requeues_and_keeps_original_buried() {
    let tube = InMemoryTube::new();
    let (mut consumer, mut producer) = (tube.clone(), tube.clone());
    let job_id = tube.seed(&RatePayload::new("HKD", "USD"));
    let finder = StubRateFinder::failing();
    let store = RecordingRateStore::new();

    let outcome = run_cycle(
        &mut consumer,
        &mut producer,
        &finder,
        &store,
        &JobOptions::default(),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, CycleOutcome::Requeued { .. }));
    let puts = tube.puts();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].payload, payload_with_attempts(0, 1));
    assert_eq!(puts[0].delay_secs, RESUBMIT_DELAY_AFTER_FAILURE_SECS);
    assert!(tube.is_buried(job_id));
    assert!(tube.deleted_ids().is_empty());
}

#[tokio::test]
async fn test_store_failure_aborts_cycle_and_leaves_job_buried() {
    let tube = InMemoryTube::new();
    let (mut consumer, mut producer) = (tube.clone(), tube.clone());
    let job_id = tube.seed(&RatePayload::new("HKD", "USD"));
    let finder = StubRateFinder::returning(7.75);
    let store = RecordingRateStore::failing();

    let err = run_cycle(
        &mut consumer,
        &mut producer,
        &finder,
        &store,
        &JobOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CycleError::Store(_)));
    assert!(tube.is_buried(job_id), "unpersisted job must stay buried");
    assert!(tube.puts().is_empty());
    assert!(tube.deleted_ids().is_empty());
}

#[tokio::test]
async fn test_job_retires_after_enough_successful_rounds() {
    let tube = InMemoryTube::new();
    let (mut consumer, mut producer) = (tube.clone(), tube.clone());
    tube.seed(&RatePayload::new("HKD", "USD"));
    let finder = StubRateFinder::returning(7.75);
    let store = RecordingRateStore::new();

    let mut outcomes = Vec::new();
    for _ in 0..10 {
        let outcome = run_cycle(
            &mut consumer,
            &mut producer,
            &finder,
            &store,
            &JobOptions::default(),
        )
        .await
        .unwrap();
        outcomes.push(outcome);
    }

    assert!(outcomes[..9]
        .iter()
        .all(|o| matches!(o, CycleOutcome::Resubmitted { .. })));
    assert_eq!(outcomes[9], CycleOutcome::Retired);
    assert_eq!(store.stored().len(), 10);
    assert_eq!(tube.ready_len(), 0, "retired pair must not be requeued");
}

fn worker_for(
    consumer: &InMemoryTube,
    producer: &InMemoryTube,
    finder: StubRateFinder,
    store: RecordingRateStore,
) -> Worker<InMemoryTube, InMemoryTube, StubRateFinder, RecordingRateStore> {
    Worker::new(
        consumer.clone(),
        producer.clone(),
        finder,
        store,
        JobOptions::default(),
    )
    .with_reconnect_backoff(Duration::ZERO)
}

#[tokio::test]
async fn test_worker_connects_both_roles_before_cycling() {
    let consumer = InMemoryTube::disconnected();
    let producer = InMemoryTube::disconnected();
    consumer.seed(&RatePayload::new("HKD", "USD"));
    let mut worker = worker_for(
        &consumer,
        &producer,
        StubRateFinder::returning(7.75),
        RecordingRateStore::new(),
    );

    assert_eq!(worker.tick().await.unwrap(), Step::ConsumerConnected);
    assert_eq!(worker.tick().await.unwrap(), Step::ProducerConnected);
    assert!(matches!(
        worker.tick().await.unwrap(),
        Step::CycleCompleted(CycleOutcome::Resubmitted { .. })
    ));
}

#[tokio::test]
async fn test_disconnect_triggers_reconnect_before_next_reserve() {
    let consumer = InMemoryTube::disconnected();
    let producer = InMemoryTube::disconnected();
    consumer.seed(&RatePayload::new("HKD", "USD"));
    let mut worker = worker_for(
        &consumer,
        &producer,
        StubRateFinder::returning(7.75),
        RecordingRateStore::new(),
    );

    worker.tick().await.unwrap();
    worker.tick().await.unwrap();
    worker.tick().await.unwrap();
    let reserves_before = consumer.ops().iter().filter(|op| **op == "reserve").count();

    consumer.disconnect();
    let step = worker.tick().await.unwrap();

    assert_eq!(step, Step::ConsumerConnected);
    assert_eq!(consumer.connect_count(), 2);
    let ops = consumer.ops();
    assert_eq!(ops.last(), Some(&"connect"));
    let reserves_after = ops.iter().filter(|op| **op == "reserve").count();
    assert_eq!(
        reserves_before, reserves_after,
        "no reservation may happen before the role reconnects"
    );

    // healed: the next tick processes jobs again
    consumer.seed(&RatePayload::new("JPY", "HKD"));
    assert!(matches!(
        worker.tick().await.unwrap(),
        Step::CycleCompleted(_)
    ));
}

#[tokio::test]
async fn test_retryable_connect_failure_keeps_worker_alive() {
    let consumer = InMemoryTube::disconnected();
    let producer = InMemoryTube::disconnected();
    consumer.fail_connects(false);
    let mut worker = worker_for(
        &consumer,
        &producer,
        StubRateFinder::returning(7.75),
        RecordingRateStore::new(),
    );

    assert_eq!(
        worker.tick().await.unwrap(),
        Step::ConnectFailed(ConnectionRole::Consumer)
    );

    consumer.allow_connects();
    assert_eq!(worker.tick().await.unwrap(), Step::ConsumerConnected);
}

#[tokio::test]
async fn test_setup_error_stops_worker() {
    let consumer = InMemoryTube::disconnected();
    let producer = InMemoryTube::disconnected();
    consumer.fail_connects(true);
    let mut worker = worker_for(
        &consumer,
        &producer,
        StubRateFinder::returning(7.75),
        RecordingRateStore::new(),
    );

    let err = worker.tick().await.unwrap_err();
    assert!(matches!(err, SetupError::TooManyTubesWatched { .. }));
}

#[tokio::test]
async fn test_worker_continues_after_cycle_failure() {
    let consumer = InMemoryTube::new();
    let producer = InMemoryTube::new();
    consumer.seed(&RatePayload::new("HKD", "USD"));
    consumer.seed(&RatePayload::new("JPY", "HKD"));
    let store = RecordingRateStore::failing();
    let mut worker = worker_for(
        &consumer,
        &producer,
        StubRateFinder::returning(7.75),
        store.clone(),
    );

    assert_eq!(worker.tick().await.unwrap(), Step::CycleFailed);

    store.set_failing(false);
    assert!(matches!(
        worker.tick().await.unwrap(),
        Step::CycleCompleted(CycleOutcome::Resubmitted { .. })
    ));
    assert_eq!(store.stored().len(), 1);
}
