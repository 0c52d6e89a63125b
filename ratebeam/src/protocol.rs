//! Minimal beanstalkd client speaking the text protocol over any async
//! stream.
//!
//! Only the commands the worker consumes are implemented: `use`, `watch`,
//! `ignore`, `put`, `reserve`, `bury`, `delete`, `list-tubes-watched` and
//! `list-tube-used`. Job bodies are opaque bytes here; the payload codec
//! lives at the queue trait layer.

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
    BufStream,
};

use crate::error::ProtocolError;

/// A beanstalkd protocol session over a bidirectional stream.
///
/// Generic over the transport so tests can script the server side with
/// [`tokio::io::duplex`]; production code wraps a `TcpStream`.
#[derive(Debug)]
pub struct Beanstalk<S> {
    stream: BufStream<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Beanstalk<S> {
    /// Wrap an established stream in a protocol session.
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    /// Select the tube that subsequent `put` commands publish into.
    ///
    /// Returns the tube name echoed by the server.
    pub async fn use_tube(&mut self, tube: &str) -> Result<String, ProtocolError> {
        self.send(&format!("use {tube}"), None).await?;
        let reply = self.read_reply_line().await?;
        match reply.split_once(' ') {
            Some(("USING", name)) => Ok(name.to_string()),
            _ => Err(Self::refusal("use", reply)),
        }
    }

    /// Add a tube to the reserve watch list. Returns the watched count.
    pub async fn watch(&mut self, tube: &str) -> Result<u32, ProtocolError> {
        self.send(&format!("watch {tube}"), None).await?;
        let reply = self.read_reply_line().await?;
        Self::parse_watching("watch", reply)
    }

    /// Remove a tube from the watch list. Returns the remaining count.
    pub async fn ignore(&mut self, tube: &str) -> Result<u32, ProtocolError> {
        self.send(&format!("ignore {tube}"), None).await?;
        let reply = self.read_reply_line().await?;
        Self::parse_watching("ignore", reply)
    }

    /// Enqueue a job body. Returns the id assigned by the server.
    pub async fn put(
        &mut self,
        priority: u32,
        delay_secs: u32,
        time_to_run_secs: u32,
        body: &[u8],
    ) -> Result<u64, ProtocolError> {
        let line =
            format!("put {priority} {delay_secs} {time_to_run_secs} {}", body.len());
        self.send(&line, Some(body)).await?;
        let reply = self.read_reply_line().await?;
        match reply.split_once(' ') {
            Some(("INSERTED", id)) => Self::parse_id(id, &reply),
            _ => Err(Self::refusal("put", reply)),
        }
    }

    /// Block until a watched job can be reserved. Returns id and raw body.
    pub async fn reserve(&mut self) -> Result<(u64, Vec<u8>), ProtocolError> {
        self.send("reserve", None).await?;
        let reply = self.read_reply_line().await?;
        let mut parts = reply.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("RESERVED"), Some(id), Some(len)) => {
                let id = Self::parse_id(id, &reply)?;
                let len: usize = len
                    .parse()
                    .map_err(|_| ProtocolError::Malformed(reply.clone()))?;
                let body = self.read_body(len).await?;
                Ok((id, body))
            }
            _ => Err(Self::refusal("reserve", reply)),
        }
    }

    /// Quarantine a reserved job at the given priority.
    pub async fn bury(&mut self, id: u64, priority: u32) -> Result<(), ProtocolError> {
        self.send(&format!("bury {id} {priority}"), None).await?;
        let reply = self.read_reply_line().await?;
        match reply.as_str() {
            "BURIED" => Ok(()),
            _ => Err(Self::refusal("bury", reply)),
        }
    }

    /// Delete a reserved or buried job.
    pub async fn delete(&mut self, id: u64) -> Result<(), ProtocolError> {
        self.send(&format!("delete {id}"), None).await?;
        let reply = self.read_reply_line().await?;
        match reply.as_str() {
            "DELETED" => Ok(()),
            _ => Err(Self::refusal("delete", reply)),
        }
    }

    /// List the tubes currently on the watch list.
    pub async fn watched_tubes(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.send("list-tubes-watched", None).await?;
        let reply = self.read_reply_line().await?;
        match reply.split_once(' ') {
            Some(("OK", len)) => {
                let len: usize = len
                    .parse()
                    .map_err(|_| ProtocolError::Malformed(reply.clone()))?;
                let body = self.read_body(len).await?;
                Ok(Self::parse_tube_list(&body))
            }
            _ => Err(Self::refusal("list-tubes-watched", reply)),
        }
    }

    /// Name of the tube `put` currently publishes into.
    pub async fn used_tube(&mut self) -> Result<String, ProtocolError> {
        self.send("list-tube-used", None).await?;
        let reply = self.read_reply_line().await?;
        match reply.split_once(' ') {
            Some(("USING", name)) => Ok(name.to_string()),
            _ => Err(Self::refusal("list-tube-used", reply)),
        }
    }

    async fn send(&mut self, line: &str, body: Option<&[u8]>) -> Result<(), ProtocolError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        if let Some(body) = body {
            self.stream.write_all(body).await?;
            self.stream.write_all(b"\r\n").await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_reply_line(&mut self) -> Result<String, ProtocolError> {
        let mut line = String::new();
        let n = self.stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn read_body(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        // body is followed by a trailing \r\n
        let mut buf = vec![0u8; len + 2];
        self.stream.read_exact(&mut buf).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtocolError::ConnectionClosed
            } else {
                ProtocolError::Io(err)
            }
        })?;
        buf.truncate(len);
        Ok(buf)
    }

    fn parse_watching(
        command: &'static str,
        reply: String,
    ) -> Result<u32, ProtocolError> {
        match reply.split_once(' ') {
            Some(("WATCHING", count)) => count
                .parse()
                .map_err(|_| ProtocolError::Malformed(reply.clone())),
            _ => Err(Self::refusal(command, reply)),
        }
    }

    fn parse_id(id: &str, reply: &str) -> Result<u64, ProtocolError> {
        id.parse()
            .map_err(|_| ProtocolError::Malformed(reply.to_string()))
    }

    /// The tube list body is a YAML sequence of plain names.
    fn parse_tube_list(body: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(body)
            .lines()
            .filter_map(|line| line.strip_prefix("- "))
            .map(|name| name.trim().to_string())
            .collect()
    }

    fn refusal(command: &'static str, reply: String) -> ProtocolError {
        match reply.as_str() {
            "NOT_FOUND" => ProtocolError::NotFound,
            "NOT_IGNORED" => ProtocolError::NotIgnored,
            _ => ProtocolError::Unexpected { command, reply },
        }
    }
}
