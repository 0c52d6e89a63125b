use thiserror::Error;

use crate::connection::ConnectionRole;

/// Wire-level failures while talking to the queue server.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o failure on queue connection: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the connection (EOF mid-conversation).
    #[error("queue server closed the connection")]
    ConnectionClosed,

    /// `NOT_FOUND` reply: the job id is unknown or not held by us.
    #[error("job not found on the queue server")]
    NotFound,

    /// `NOT_IGNORED` reply: the server refused to drop the last watched tube.
    #[error("queue server refused to ignore the tube")]
    NotIgnored,

    #[error("unexpected reply `{reply}` to `{command}`")]
    Unexpected {
        command: &'static str,
        reply: String,
    },

    #[error("malformed reply `{0}`")]
    Malformed(String),
}

impl ProtocolError {
    /// Whether the transport is gone, as opposed to a per-command refusal.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }
}

/// Non-recoverable connection setup failures. The only errors allowed to
/// stop the worker.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("still watching {watching} tubes {tubes:?} after subscribing to `{tube}`")]
    TooManyTubesWatched {
        tube: String,
        watching: u32,
        tubes: Vec<String>,
    },
}

/// Failure of a single connect attempt, before the role reached readiness.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to reach queue server at {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection setup failed: {0}")]
    Transport(#[from] ProtocolError),

    #[error(transparent)]
    Setup(#[from] SetupError),
}

impl ConnectError {
    /// Fatal errors stop the worker; everything else is retried on the
    /// next loop iteration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Setup(_))
    }
}

/// Failure of a queue operation after the connection reached readiness.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The connection dropped mid-operation; the role must reconnect
    /// before further queue work.
    #[error("{role} connection lost: {source}")]
    ConnectionLost {
        role: ConnectionRole,
        #[source]
        source: ProtocolError,
    },

    #[error("queue protocol failure: {0}")]
    Protocol(#[from] ProtocolError),

    /// Operation attempted on a connection that is not subscribed.
    #[error("not connected to the queue server")]
    NotConnected,

    #[error("payload codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Failure to obtain a rate from the configured source. Routed through the
/// failure attempt counter, never fatal to the worker.
#[derive(Debug, Error)]
pub enum RateError {
    #[error("rate request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no {from}->{to} rate found in the response")]
    RateNotFound { from: String, to: String },
}

/// Failure to durably record a fetched rate. Aborts the cycle and leaves
/// the job buried so the unpersisted result stays visible.
#[derive(Debug, Error)]
#[error("failed to store rate: {0}")]
pub struct StoreError(pub anyhow::Error);

/// Everything that can abort one job cycle. Logged by the worker loop,
/// which then carries on with the next cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("queue operation failed mid-cycle: {0}")]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
