use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use ratebeam::{RateStore, StoreError};

/// One recorded store call.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredRate {
    pub from: String,
    pub to: String,
    pub rate: f64,
}

/// A rate store that records writes, optionally failing them.
#[derive(Clone, Default)]
pub struct RecordingRateStore {
    stored: Arc<Mutex<Vec<StoredRate>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes fail until [`set_failing`](Self::set_failing)
    /// turns them back on.
    pub fn failing() -> Self {
        let store = Self::default();
        *store.failing.lock() = true;
        store
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Everything stored so far, in write order.
    pub fn stored(&self) -> Vec<StoredRate> {
        self.stored.lock().clone()
    }
}

#[async_trait]
impl RateStore for RecordingRateStore {
    async fn store(&self, from: &str, to: &str, rate: f64) -> Result<(), StoreError> {
        if *self.failing.lock() {
            return Err(StoreError(anyhow::anyhow!("simulated store failure")));
        }
        self.stored.lock().push(StoredRate {
            from: from.to_string(),
            to: to.to_string(),
            rate,
        });
        Ok(())
    }
}
