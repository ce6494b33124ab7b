// Async command engine (spec §4.7): one command is one small state
// machine driven by a Tokio task instead of a dedicated OS thread.
// Pipelining, cooperative per-reactor scheduling and the delay-queue
// backpressure path are the full reactor's job; this module covers
// the per-command state machine and a single-shot async round trip,
// which is as far as this client's async surface goes for now (see
// DESIGN.md).

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use aerospike_base::{err, Error, ErrorKind, Result};
use aerospike_buf::{Key, ReadBuf, Record as WireRecord};
use aerospike_cluster::{Address, Cluster};
use aerospike_proto::{Message, ProtoHeader, PROTO_HEADER_LEN};

use crate::command::{build_message, decode_record, Action};
use crate::policy::Policy;

/// Per-command lifecycle (spec §4.7: "REGISTERED -> ... ->
/// COMPLETE/RETRY/ERROR").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Registered,
    Writing,
    Reading,
    Complete,
    Retry,
    Error,
}

pub struct AsyncCommandResult {
    pub state: CommandState,
    pub record: Option<WireRecord>,
}

/// A single async round trip against one node, with no retry of its
/// own — callers loop on `CommandState::Retry` the same way the sync
/// engine's `execute` loop retries (spec §4.6/§4.7 share the same
/// retry policy, only the I/O driver differs).
pub async fn execute_once(
    cluster: &Cluster,
    policy: &Policy,
    namespace: &str,
    set: &str,
    key: &Key,
    action: Action,
    addr: &Address,
) -> AsyncCommandResult {
    trace!(target: "aerospike", state = ?CommandState::Registered, "");

    let connect = timeout(
        policy.socket_timeout,
        TcpStream::connect((addr.ip, addr.port)),
    )
    .await;

    let mut stream = match connect {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            cluster
                .counters
                .retries
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return AsyncCommandResult {
                state: classify_io_error(Error::new(ErrorKind::AsyncConnection, e)),
                record: None,
            };
        }
        Err(_) => {
            return AsyncCommandResult {
                state: CommandState::Retry,
                record: None,
            };
        }
    };
    let _ = stream.set_nodelay(true);

    trace!(target: "aerospike", state = ?CommandState::Writing, "");
    let msg = match build_message(namespace, set, key, &action, policy) {
        Ok(msg) => msg,
        Err(_) => return AsyncCommandResult { state: CommandState::Error, record: None },
    };
    let write_result = timeout(policy.socket_timeout, write_frame_async(&mut stream, &msg)).await;
    if let Err(_) | Ok(Err(_)) = write_result {
        return AsyncCommandResult {
            state: CommandState::Retry,
            record: None,
        };
    }

    trace!(target: "aerospike", state = ?CommandState::Reading, "");
    let read_result = timeout(policy.socket_timeout, read_frame_async(&mut stream)).await;
    let response = match read_result {
        Ok(Ok(m)) => m,
        Ok(Err(e)) => return AsyncCommandResult { state: classify_io_error(e), record: None },
        Err(_) => return AsyncCommandResult { state: CommandState::Retry, record: None },
    };

    if let Some(kind) = crate::result_code::classify(response.header.result_code) {
        return AsyncCommandResult {
            state: if kind.is_retryable() { CommandState::Retry } else { CommandState::Error },
            record: None,
        };
    }

    AsyncCommandResult {
        state: CommandState::Complete,
        record: match action {
            Action::Delete => None,
            _ => Some(decode_record(&response)),
        },
    }
}

fn classify_io_error(_e: Error) -> CommandState {
    CommandState::Retry
}

async fn write_frame_async(stream: &mut TcpStream, msg: &Message) -> Result<()> {
    let bytes = msg.encode_frame(false, usize::MAX)?;
    stream
        .write_all(&bytes)
        .await
        .map_err(|e| Error::new(ErrorKind::AsyncConnection, e))
}

async fn read_frame_async(stream: &mut TcpStream) -> Result<Message> {
    let mut header_bytes = [0u8; PROTO_HEADER_LEN];
    stream
        .read_exact(&mut header_bytes)
        .await
        .map_err(|e| Error::new(ErrorKind::AsyncConnection, e))?;
    let mut hbuf = ReadBuf::new(&header_bytes);
    let header = ProtoHeader::decode(&mut hbuf)?;

    let mut body = vec![0u8; header.size as usize];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| Error::new(ErrorKind::AsyncConnection, e))?;

    Message::decode_body(header.kind, &body)
}

/// Reactors reject new work once their delay queue is full (spec
/// §4.7 Backpressure): callers bump `delay_queue_timeouts` and
/// surface a queue-full error rather than blocking.
pub fn queue_full_error() -> Error {
    err(ErrorKind::QueueFull, "reactor delay queue is at capacity")
}
