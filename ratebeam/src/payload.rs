use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of successful cycles after which a job is retired for good.
pub const SUCCESS_ATTEMPT_LIMIT: u32 = 10;

/// Number of failed cycles after which a job is discarded.
pub const FAILURE_ATTEMPT_LIMIT: u32 = 3;

/// Per-payload counters tracking how often the logical job has been
/// processed across resubmissions. Absent on a job's first cycle; once
/// present the counters only ever grow.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Attempts {
    /// Cycles that fetched and persisted a rate.
    pub successful: u32,
    /// Cycles where the rate source failed or the response had no rate.
    pub failed: u32,
}

/// The body of a currency-pair job as it travels through the queue.
///
/// Serialized as JSON on `put` and parsed back on `reserve`; the two must
/// round-trip exactly. Fields the worker does not know about are carried
/// through untouched so resubmitted payloads stay comparable to what an
/// outside producer enqueued.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatePayload {
    /// Source currency code, e.g. "HKD".
    pub from: String,
    /// Target currency code, e.g. "USD".
    pub to: String,
    /// Attempt counters; `None` until the first cycle completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<Attempts>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RatePayload {
    /// Create a first-cycle payload for a currency pair.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            attempts: None,
            extra: Map::new(),
        }
    }

    /// Derive the payload to resubmit after a successful cycle.
    ///
    /// Returns a copy with `attempts.successful` incremented by one,
    /// initializing the counters to zero first if they were absent. The
    /// original payload is left untouched.
    pub fn with_successful_attempt(&self) -> Self {
        let mut next = self.clone();
        let mut attempts = next.attempts.unwrap_or_default();
        attempts.successful += 1;
        next.attempts = Some(attempts);
        next
    }

    /// Derive the payload to resubmit after a failed cycle.
    ///
    /// Symmetric to [`with_successful_attempt`](Self::with_successful_attempt):
    /// increments `attempts.failed` by one.
    pub fn with_failed_attempt(&self) -> Self {
        let mut next = self.clone();
        let mut attempts = next.attempts.unwrap_or_default();
        attempts.failed += 1;
        next.attempts = Some(attempts);
        next
    }

    /// Whether the job has succeeded often enough to be retired.
    pub fn is_finished(&self) -> bool {
        self.attempts
            .is_some_and(|a| a.successful >= SUCCESS_ATTEMPT_LIMIT)
    }

    /// Whether the job has failed often enough to be discarded.
    pub fn should_discard(&self) -> bool {
        self.attempts
            .is_some_and(|a| a.failed >= FAILURE_ATTEMPT_LIMIT)
    }
}
