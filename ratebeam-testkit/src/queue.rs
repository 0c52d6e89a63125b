use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use ratebeam::{
    ConnectError, Connectable, JobConsumer, JobProducer, ProtocolError, QueueError,
    RatePayload, ReservedJob, SetupError,
};

/// An in-memory stand-in for one beanstalkd tube, usable as both the
/// consumer and the producer side of a worker (clones share state, like
/// two connections to the same server).
///
/// Put delays are recorded, not simulated: resubmitted jobs become ready
/// immediately so multi-cycle tests can chain without a clock. Payloads
/// still round-trip through their serialized form, as on the wire.
#[derive(Clone, Default)]
pub struct InMemoryTube {
    state: Arc<Mutex<TubeState>>,
}

#[derive(Default)]
struct TubeState {
    next_id: u64,
    ready: VecDeque<(u64, Vec<u8>)>,
    reserved: HashMap<u64, Vec<u8>>,
    buried: HashMap<u64, Vec<u8>>,
    deleted: Vec<u64>,
    puts: Vec<PutRecord>,
    connected: bool,
    connect_count: u32,
    fail_connects: Option<ConnectFailure>,
    ops: Vec<&'static str>,
}

#[derive(Clone, Copy)]
enum ConnectFailure {
    Retryable,
    Fatal,
}

/// One observed `put`, with the payload as it went over the wire.
#[derive(Clone, Debug)]
pub struct PutRecord {
    pub job_id: u64,
    pub payload: RatePayload,
    pub priority: u32,
    pub delay_secs: u32,
    pub time_to_run_secs: u32,
}

impl InMemoryTube {
    /// A tube that is already connected and ready.
    pub fn new() -> Self {
        let tube = Self::default();
        tube.state.lock().connected = true;
        tube
    }

    /// A tube that needs a `connect` call first, for worker loop tests.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Enqueue a payload directly, as an outside producer would.
    pub fn seed(&self, payload: &RatePayload) -> u64 {
        let mut state = self.state.lock();
        let id = state.assign_id();
        let body = serde_json::to_vec(payload).expect("payload serializes");
        state.ready.push_back((id, body));
        id
    }

    /// Drop the simulated connection; queue operations fail until the
    /// next `connect`.
    pub fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    /// Make the next `connect` calls fail with a retryable transport
    /// error (`fatal = false`) or a fatal setup error (`fatal = true`).
    pub fn fail_connects(&self, fatal: bool) {
        self.state.lock().fail_connects = Some(if fatal {
            ConnectFailure::Fatal
        } else {
            ConnectFailure::Retryable
        });
    }

    /// Let `connect` succeed again.
    pub fn allow_connects(&self) {
        self.state.lock().fail_connects = None;
    }

    pub fn connect_count(&self) -> u32 {
        self.state.lock().connect_count
    }

    /// Queue operations observed so far, in call order.
    pub fn ops(&self) -> Vec<&'static str> {
        self.state.lock().ops.clone()
    }

    pub fn puts(&self) -> Vec<PutRecord> {
        self.state.lock().puts.clone()
    }

    pub fn deleted_ids(&self) -> Vec<u64> {
        self.state.lock().deleted.clone()
    }

    pub fn is_buried(&self, id: u64) -> bool {
        self.state.lock().buried.contains_key(&id)
    }

    pub fn ready_len(&self) -> usize {
        self.state.lock().ready.len()
    }
}

impl TubeState {
    fn assign_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

fn connection_lost() -> QueueError {
    QueueError::ConnectionLost {
        role: ratebeam::ConnectionRole::Consumer,
        source: ProtocolError::ConnectionClosed,
    }
}

#[async_trait]
impl Connectable for InMemoryTube {
    fn is_ready(&self) -> bool {
        self.state.lock().connected
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        let mut state = self.state.lock();
        match state.fail_connects {
            Some(ConnectFailure::Retryable) => {
                Err(ConnectError::Transport(ProtocolError::ConnectionClosed))
            }
            Some(ConnectFailure::Fatal) => Err(SetupError::TooManyTubesWatched {
                tube: "test".to_string(),
                watching: 2,
                tubes: vec!["default".to_string(), "test".to_string()],
            }
            .into()),
            None => {
                state.connected = true;
                state.connect_count += 1;
                state.ops.push("connect");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl JobConsumer for InMemoryTube {
    async fn reserve(&mut self) -> Result<ReservedJob, QueueError> {
        self.state.lock().ops.push("reserve");
        loop {
            {
                let mut state = self.state.lock();
                if !state.connected {
                    return Err(connection_lost());
                }
                if let Some((id, body)) = state.ready.pop_front() {
                    let payload: RatePayload = serde_json::from_slice(&body)?;
                    state.reserved.insert(id, body);
                    return Ok(ReservedJob { id, payload });
                }
            }
            // block, as a real reserve would, until a job shows up
            tokio::task::yield_now().await;
        }
    }

    async fn bury(&mut self, id: u64, _priority: u32) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        state.ops.push("bury");
        if !state.connected {
            return Err(connection_lost());
        }
        match state.reserved.remove(&id) {
            Some(body) => {
                state.buried.insert(id, body);
                Ok(())
            }
            None => Err(QueueError::Protocol(ProtocolError::NotFound)),
        }
    }

    async fn delete(&mut self, id: u64) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        state.ops.push("delete");
        if !state.connected {
            return Err(connection_lost());
        }
        if state.reserved.remove(&id).is_none() && state.buried.remove(&id).is_none() {
            return Err(QueueError::Protocol(ProtocolError::NotFound));
        }
        state.deleted.push(id);
        Ok(())
    }
}

#[async_trait]
impl JobProducer for InMemoryTube {
    async fn put(
        &mut self,
        payload: &RatePayload,
        priority: u32,
        delay_secs: u32,
        time_to_run_secs: u32,
    ) -> Result<u64, QueueError> {
        let mut state = self.state.lock();
        state.ops.push("put");
        if !state.connected {
            return Err(connection_lost());
        }
        let id = state.assign_id();
        let body = serde_json::to_vec(payload)?;
        state.ready.push_back((id, body));
        state.puts.push(PutRecord {
            job_id: id,
            payload: payload.clone(),
            priority,
            delay_secs,
            time_to_run_secs,
        });
        Ok(id)
    }
}
