//! Capability traits for the two queue roles the worker holds.
//!
//! The real implementation is [`TubeConnection`](crate::connection::TubeConnection);
//! tests drive the lifecycle against the in-memory tube from
//! `ratebeam-testkit`.

use async_trait::async_trait;

use crate::error::QueueError;
use crate::payload::RatePayload;

/// A job claimed from the queue server, owned by this worker until it is
/// deleted or the connection drops.
#[derive(Clone, Debug, PartialEq)]
pub struct ReservedJob {
    /// Id assigned by the queue server at reservation time.
    pub id: u64,
    pub payload: RatePayload,
}

/// Consumer-role queue operations: claim, quarantine and retire jobs.
#[async_trait]
pub trait JobConsumer: Send {
    /// Block until a job from the watched tube can be reserved.
    async fn reserve(&mut self) -> Result<ReservedJob, QueueError>;

    /// Quarantine a reserved job so a worker crash cannot hand it straight
    /// back to another consumer.
    async fn bury(&mut self, id: u64, priority: u32) -> Result<(), QueueError>;

    /// Delete a reserved or buried job for good.
    async fn delete(&mut self, id: u64) -> Result<(), QueueError>;
}

/// Producer-role queue operations: resubmit derived payloads.
#[async_trait]
pub trait JobProducer: Send {
    /// Enqueue a payload as a new job, independent of any reserved id.
    ///
    /// The body is serialized exactly as [`JobConsumer::reserve`]
    /// deserializes it.
    async fn put(
        &mut self,
        payload: &RatePayload,
        priority: u32,
        delay_secs: u32,
        time_to_run_secs: u32,
    ) -> Result<u64, QueueError>;
}
