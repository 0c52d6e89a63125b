//! The top-level worker loop.
//!
//! One worker owns one consumer connection and one producer connection and
//! processes jobs strictly one at a time. Each iteration heals whichever
//! connection is down, then runs a single job cycle. Only a fatal setup
//! error stops the loop; everything else is logged and retried.

use std::time::Duration;

use tracing::{error, info, warn, Instrument};

use crate::connection::{Connectable, ConnectionRole};
use crate::error::{ConnectError, SetupError};
use crate::lifecycle::{run_cycle, CycleOutcome, JobOptions};
use crate::queue::{JobConsumer, JobProducer};
use crate::source::RateFinder;
use crate::store::RateStore;
use crate::telemetry;

const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// What one loop iteration did.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Step {
    /// The consumer connection was (re-)established.
    ConsumerConnected,
    /// The producer connection was (re-)established.
    ProducerConnected,
    /// A connect attempt failed with a retryable error.
    ConnectFailed(ConnectionRole),
    /// One job cycle ran to completion.
    CycleCompleted(CycleOutcome),
    /// One job cycle aborted; the loop carries on.
    CycleFailed,
}

/// A single sequential worker: two queue connections plus the rate and
/// store capabilities, driven one iteration at a time.
pub struct Worker<C, P, F, S> {
    consumer: C,
    producer: P,
    finder: F,
    store: S,
    options: JobOptions,
    reconnect_backoff: Duration,
}

impl<C, P, F, S> Worker<C, P, F, S>
where
    C: JobConsumer + Connectable,
    P: JobProducer + Connectable,
    F: RateFinder,
    S: RateStore,
{
    pub fn new(consumer: C, producer: P, finder: F, store: S, options: JobOptions) -> Self {
        Self {
            consumer,
            producer,
            finder,
            store,
            options,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }

    /// Pause after a failed connect attempt, so a dead server does not
    /// spin the loop hot.
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Drive cycles until a fatal setup error occurs.
    pub async fn run(&mut self) -> Result<(), SetupError> {
        info!("worker loop starting");
        loop {
            self.tick().await?;
        }
    }

    /// Run exactly one loop iteration: reconnect the consumer if it is
    /// down, else the producer, else process one job.
    pub async fn tick(&mut self) -> Result<Step, SetupError> {
        if !self.consumer.is_ready() {
            return self
                .connect_role(ConnectionRole::Consumer)
                .await
                .map(|connected| {
                    if connected {
                        Step::ConsumerConnected
                    } else {
                        Step::ConnectFailed(ConnectionRole::Consumer)
                    }
                });
        }
        if !self.producer.is_ready() {
            return self
                .connect_role(ConnectionRole::Producer)
                .await
                .map(|connected| {
                    if connected {
                        Step::ProducerConnected
                    } else {
                        Step::ConnectFailed(ConnectionRole::Producer)
                    }
                });
        }

        match run_cycle(
            &mut self.consumer,
            &mut self.producer,
            &self.finder,
            &self.store,
            &self.options,
        )
        .await
        {
            Ok(outcome) => {
                info!(?outcome, "cycle completed");
                Ok(Step::CycleCompleted(outcome))
            }
            Err(err) => {
                warn!(error = %err, "cycle aborted");
                Ok(Step::CycleFailed)
            }
        }
    }

    async fn connect_role(&mut self, role: ConnectionRole) -> Result<bool, SetupError> {
        let span = telemetry::connect_span(role);
        let result = async {
            match role {
                ConnectionRole::Consumer => self.consumer.connect().await,
                ConnectionRole::Producer => self.producer.connect().await,
            }
        }
        .instrument(span)
        .await;
        match result {
            Ok(()) => Ok(true),
            Err(ConnectError::Setup(err)) => {
                error!(error = %err, "unrecoverable setup error, stopping worker");
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "connect failed, backing off");
                tokio::time::sleep(self.reconnect_backoff).await;
                Ok(false)
            }
        }
    }
}
