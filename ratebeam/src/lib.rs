//! ratebeam - a beanstalk-backed exchange rate worker.
//!
//! The worker reserves currency-pair jobs from a designated tube, fetches
//! the pair's exchange rate from a pluggable source, persists it, and
//! either resubmits the job for another round or retires it. Jobs carry
//! attempt counters: ten successful rounds retire a pair, three failed
//! rounds discard it (left buried for inspection).
//!
//! # Core pieces
//!
//! - [`TubeConnection`] - one role-specific connection (consumer or
//!   producer) to the queue server, with an explicit
//!   `Disconnected -> Connecting -> Subscribed` state machine.
//! - [`RatePayload`] - the job body plus the pure attempt-derivation
//!   policy ([`RatePayload::with_successful_attempt`] and friends).
//! - [`lifecycle::run_cycle`] - the reserve -> bury -> act -> finalize
//!   protocol for exactly one job.
//! - [`Worker`] - the loop that heals connections and drives cycles
//!   until a fatal setup error.
//!
//! The queue, rate-source and store capabilities are traits; production
//! implementations live here, test doubles in `ratebeam-testkit`.
//!
//! # Feature flags
//!
//! - `postgres` (default) - the sqlx-backed [`store::PostgresRateStore`].

/// Environment-based configuration for the binaries.
pub mod config;

/// Role-specific queue connections and their state machine.
pub mod connection;

/// The error taxonomy: what can fail, and how far the failure reaches.
pub mod error;

/// The single-job processing cycle.
pub mod lifecycle;

/// Job payload and the attempt-counting retry policy.
pub mod payload;

/// The beanstalkd wire protocol client.
pub mod protocol;

/// Capability traits for the consumer and producer queue roles.
pub mod queue;

/// Exchange-rate sources and the HTTP fetch path.
pub mod source;

/// Durable recording of fetched rates.
pub mod store;

/// Tracing spans and subscriber setup.
pub mod telemetry;

/// The top-level worker loop.
pub mod worker;

pub use config::Settings;
pub use connection::{Connectable, ConnectionRole, ConnectionState, TubeConnection};
pub use error::{
    ConnectError, CycleError, ProtocolError, QueueError, RateError, SetupError,
    StoreError,
};
pub use lifecycle::{CycleOutcome, JobOptions};
pub use payload::{Attempts, RatePayload};
pub use queue::{JobConsumer, JobProducer, ReservedJob};
pub use source::{ExchangeRateSource, HttpRateFinder, RateFinder, SourceKind};
pub use store::RateStore;
pub use worker::{Step, Worker};
