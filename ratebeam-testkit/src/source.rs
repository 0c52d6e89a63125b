use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use ratebeam::{RateError, RateFinder};

/// A rate finder with a scripted result, recording every lookup.
#[derive(Clone)]
pub struct StubRateFinder {
    rate: Arc<Mutex<Option<f64>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl StubRateFinder {
    /// Always find the given rate.
    pub fn returning(rate: f64) -> Self {
        Self {
            rate: Arc::new(Mutex::new(Some(rate))),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail every lookup as if the response carried no rate.
    pub fn failing() -> Self {
        Self {
            rate: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Change the scripted result mid-test.
    pub fn set_rate(&self, rate: Option<f64>) {
        *self.rate.lock() = rate;
    }

    /// Every `(from, to)` pair looked up so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RateFinder for StubRateFinder {
    async fn find_rate(&self, from: &str, to: &str) -> Result<f64, RateError> {
        self.calls.lock().push((from.to_string(), to.to_string()));
        match *self.rate.lock() {
            Some(rate) => Ok(rate),
            None => Err(RateError::RateNotFound {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}
