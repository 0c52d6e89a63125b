//! Environment-based configuration for the worker binaries.

use serde::Deserialize;

use crate::lifecycle::JobOptions;
use crate::source::SourceKind;

/// Everything the worker reads from the environment, prefixed with
/// `RATEBEAM_` (e.g. `RATEBEAM_QUEUE_HOST`). A `.env` file is honored.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    /// Queue server host.
    #[serde(default = "default_queue_host")]
    pub queue_host: String,
    /// Queue server port.
    #[serde(default = "default_queue_port")]
    pub queue_port: u16,
    /// The tube this worker watches and publishes into.
    #[serde(default = "default_tube")]
    pub tube: String,
    /// Priority for bury and put.
    #[serde(default = "default_job_priority")]
    pub job_priority: u32,
    /// Time-to-run granted to resubmitted jobs, in seconds.
    #[serde(default = "default_time_to_run")]
    pub job_time_to_run_secs: u32,
    /// Pause between failed connect attempts, in milliseconds.
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_ms: u64,
    /// Which exchange-rate source to scrape.
    #[serde(default)]
    pub rate_source: SourceKind,
    /// Postgres connection string for the rate store.
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Settings {
    /// Load settings from the process environment (and `.env`, if any).
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(envy::prefixed("RATEBEAM_").from_env()?)
    }

    /// `host:port` of the queue server.
    pub fn queue_addr(&self) -> String {
        format!("{}:{}", self.queue_host, self.queue_port)
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            priority: self.job_priority,
            time_to_run_secs: self.job_time_to_run_secs,
        }
    }
}

fn default_queue_host() -> String {
    "127.0.0.1".to_string()
}

fn default_queue_port() -> u16 {
    11300
}

fn default_tube() -> String {
    "exchange-rates".to_string()
}

fn default_job_priority() -> u32 {
    1024
}

fn default_time_to_run() -> u32 {
    60
}

fn default_reconnect_backoff() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.queue_addr(), "127.0.0.1:11300");
        assert_eq!(settings.tube, "exchange-rates");
        assert_eq!(settings.job_options().priority, 1024);
        assert_eq!(settings.job_options().time_to_run_secs, 60);
        assert_eq!(settings.rate_source, SourceKind::XeCom);
        assert!(settings.database_url.is_none());
    }
}
