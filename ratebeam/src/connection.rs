//! Role-specific queue connections and their state machine.
//!
//! Each worker holds two independent connections to the same server: a
//! consumer watching the designated tube and a producer using it. A role
//! cycles `Disconnected -> Connecting -> Subscribed -> Disconnected`; the
//! worker loop reconnects whichever role reports itself not ready.

use std::fmt;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{ConnectError, ProtocolError, QueueError, SetupError};
use crate::payload::RatePayload;
use crate::protocol::Beanstalk;
use crate::queue::{JobConsumer, JobProducer, ReservedJob};

/// Which side of the queue protocol a connection speaks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionRole {
    /// Watches the designated tube and reserves jobs from it.
    Consumer,
    /// Uses the designated tube and puts resubmitted jobs into it.
    Producer,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consumer => write!(f, "consumer"),
            Self::Producer => write!(f, "producer"),
        }
    }
}

/// Lifecycle of one role's connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Transport up and subscribed to exactly the named tube.
    Subscribed(String),
}

/// Something the worker loop can (re-)establish before using.
#[async_trait]
pub trait Connectable: Send {
    fn is_ready(&self) -> bool;

    /// Bring the connection to readiness. Invoked by the worker loop
    /// whenever [`is_ready`](Self::is_ready) reports false.
    async fn connect(&mut self) -> Result<(), ConnectError>;
}

/// A single role-specific connection to the queue server.
pub struct TubeConnection {
    role: ConnectionRole,
    addr: String,
    tube: String,
    state: ConnectionState,
    client: Option<Beanstalk<TcpStream>>,
}

impl TubeConnection {
    /// A consumer connection watching `tube` on `addr`.
    pub fn consumer(addr: impl Into<String>, tube: impl Into<String>) -> Self {
        Self::new(ConnectionRole::Consumer, addr, tube)
    }

    /// A producer connection using `tube` on `addr`.
    pub fn producer(addr: impl Into<String>, tube: impl Into<String>) -> Self {
        Self::new(ConnectionRole::Producer, addr, tube)
    }

    fn new(
        role: ConnectionRole,
        addr: impl Into<String>,
        tube: impl Into<String>,
    ) -> Self {
        Self {
            role,
            addr: addr.into(),
            tube: tube.into(),
            state: ConnectionState::Disconnected,
            client: None,
        }
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    async fn establish(&mut self) -> Result<Beanstalk<TcpStream>, ConnectError> {
        let stream =
            TcpStream::connect(&self.addr)
                .await
                .map_err(|source| ConnectError::Dial {
                    addr: self.addr.clone(),
                    source,
                })?;
        let mut client = Beanstalk::new(stream);

        match self.role {
            ConnectionRole::Consumer => {
                watch_designated_tube_only(&mut client, &self.tube).await?;
            }
            ConnectionRole::Producer => {
                let used = client.use_tube(&self.tube).await?;
                debug!(tube = %used, "producer using tube");
            }
        }
        Ok(client)
    }

    /// Route an operation failure: transport loss flips the state to
    /// `Disconnected` (once per observed close) so the worker loop
    /// reconnects; protocol refusals leave the connection usable.
    fn op_failed(&mut self, err: ProtocolError) -> QueueError {
        if err.is_disconnect() {
            warn!(role = %self.role, error = %err, "connection lost");
            self.state = ConnectionState::Disconnected;
            self.client = None;
            QueueError::ConnectionLost {
                role: self.role,
                source: err,
            }
        } else {
            QueueError::Protocol(err)
        }
    }

    fn client_mut(&mut self) -> Result<&mut Beanstalk<TcpStream>, QueueError> {
        match self.state {
            ConnectionState::Subscribed(_) => {
                self.client.as_mut().ok_or(QueueError::NotConnected)
            }
            _ => Err(QueueError::NotConnected),
        }
    }
}

#[async_trait]
impl Connectable for TubeConnection {
    fn is_ready(&self) -> bool {
        matches!(self.state, ConnectionState::Subscribed(_))
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        self.state = ConnectionState::Connecting;
        self.client = None;

        match self.establish().await {
            Ok(client) => {
                self.client = Some(client);
                self.state = ConnectionState::Subscribed(self.tube.clone());
                info!(role = %self.role, tube = %self.tube, addr = %self.addr, "connection ready");
                Ok(())
            }
            Err(err) => {
                self.state = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl JobConsumer for TubeConnection {
    async fn reserve(&mut self) -> Result<ReservedJob, QueueError> {
        let result = self.client_mut()?.reserve().await;
        let (id, body) = result.map_err(|err| self.op_failed(err))?;
        let payload: RatePayload = serde_json::from_slice(&body)?;
        debug!(job_id = id, from = %payload.from, to = %payload.to, "reserved job");
        Ok(ReservedJob { id, payload })
    }

    async fn bury(&mut self, id: u64, priority: u32) -> Result<(), QueueError> {
        let result = self.client_mut()?.bury(id, priority).await;
        result.map_err(|err| self.op_failed(err))?;
        debug!(job_id = id, "buried job");
        Ok(())
    }

    async fn delete(&mut self, id: u64) -> Result<(), QueueError> {
        let result = self.client_mut()?.delete(id).await;
        result.map_err(|err| self.op_failed(err))?;
        debug!(job_id = id, "deleted job");
        Ok(())
    }
}

#[async_trait]
impl JobProducer for TubeConnection {
    async fn put(
        &mut self,
        payload: &RatePayload,
        priority: u32,
        delay_secs: u32,
        time_to_run_secs: u32,
    ) -> Result<u64, QueueError> {
        let body = serde_json::to_vec(payload)?;
        let result = self
            .client_mut()?
            .put(priority, delay_secs, time_to_run_secs, &body)
            .await;
        let id = result.map_err(|err| self.op_failed(err))?;
        debug!(job_id = id, delay_secs, "put job");
        Ok(id)
    }
}

/// Subscribe the consumer to exactly the designated tube.
///
/// A fresh connection implicitly watches `default`; after watching the
/// designated tube the default one is dropped. Watching more than the
/// designated tube after that is a fatal setup error, not something a
/// reconnect can heal.
async fn watch_designated_tube_only<S>(
    client: &mut Beanstalk<S>,
    tube: &str,
) -> Result<(), ConnectError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    let watching = client.watch(tube).await?;
    debug!(tube, watching, "watching designated tube");

    if watching > 2 {
        return Err(SetupError::TooManyTubesWatched {
            tube: tube.to_string(),
            watching,
            tubes: Vec::new(),
        }
        .into());
    }
    if watching == 1 {
        return Ok(());
    }

    let after_ignore = client.ignore("default").await?;
    if after_ignore != 1 {
        // list what we are stuck watching, best effort
        let tubes = client.watched_tubes().await.unwrap_or_default();
        return Err(SetupError::TooManyTubesWatched {
            tube: tube.to_string(),
            watching: after_ignore,
            tubes,
        }
        .into());
    }
    debug!(tube, "ignored default tube");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    async fn expect(server: &mut BufReader<DuplexStream>, line: &str, reply: &[u8]) {
        let mut got = String::new();
        server.read_line(&mut got).await.unwrap();
        assert_eq!(got.trim_end_matches(['\r', '\n']), line);
        server.get_mut().write_all(reply).await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_setup_ignores_default_tube() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let mut client = Beanstalk::new(client_io);
        let mut server = BufReader::new(server_io);

        let server_task = tokio::spawn(async move {
            expect(&mut server, "watch rates", b"WATCHING 2\r\n").await;
            expect(&mut server, "ignore default", b"WATCHING 1\r\n").await;
        });

        watch_designated_tube_only(&mut client, "rates").await.unwrap();
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_setup_single_tube_skips_ignore() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let mut client = Beanstalk::new(client_io);
        let mut server = BufReader::new(server_io);

        let server_task = tokio::spawn(async move {
            expect(&mut server, "watch rates", b"WATCHING 1\r\n").await;
        });

        watch_designated_tube_only(&mut client, "rates").await.unwrap();
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_setup_fails_when_ignore_does_not_help() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let mut client = Beanstalk::new(client_io);
        let mut server = BufReader::new(server_io);

        let server_task = tokio::spawn(async move {
            expect(&mut server, "watch rates", b"WATCHING 2\r\n").await;
            expect(&mut server, "ignore default", b"WATCHING 2\r\n").await;
            let body = b"---\n- default\n- rates\n";
            let reply = format!("OK {}\r\n", body.len());
            expect(&mut server, "list-tubes-watched", reply.as_bytes()).await;
            server.get_mut().write_all(body).await.unwrap();
            server.get_mut().write_all(b"\r\n").await.unwrap();
        });

        let err = watch_designated_tube_only(&mut client, "rates")
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        match err {
            ConnectError::Setup(SetupError::TooManyTubesWatched {
                watching, tubes, ..
            }) => {
                assert_eq!(watching, 2);
                assert_eq!(tubes, vec!["default".to_string(), "rates".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_setup_fails_on_excess_watch_count() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let mut client = Beanstalk::new(client_io);
        let mut server = BufReader::new(server_io);

        let server_task = tokio::spawn(async move {
            expect(&mut server, "watch rates", b"WATCHING 3\r\n").await;
        });

        let err = watch_designated_tube_only(&mut client, "rates")
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_failure_during_setup_is_retryable() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let mut client = Beanstalk::new(client_io);
        drop(server_io);

        let err = watch_designated_tube_only(&mut client, "rates")
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
    }
}
