//! Tracing instrumentation for the worker.
//!
//! Span helpers used around the two interesting stretches of work: a
//! connect attempt and a single job cycle. The binaries call
//! [`init_tracing`] once at startup; the library only emits events.

use tracing::{info_span, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber, honoring `RUST_LOG` when set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "ratebeam=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Span covering one job cycle, from reservation to finalization.
#[must_use]
pub fn cycle_span(job_id: u64, from: &str, to: &str) -> Span {
    info_span!("ratebeam.cycle", job_id, from, to)
}

/// Span covering one connect attempt for a role.
#[must_use]
pub fn connect_span(role: crate::connection::ConnectionRole) -> Span {
    info_span!("ratebeam.connect", role = %role)
}
