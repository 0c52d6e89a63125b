//! Test doubles for ratebeam: an in-memory tube that implements both queue
//! roles, stub rate finders, and a recording store.

pub mod queue;
pub mod source;
pub mod store;

pub use queue::{InMemoryTube, PutRecord};
pub use source::StubRateFinder;
pub use store::{RecordingRateStore, StoredRate};
