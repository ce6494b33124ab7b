// Sync command engine (spec §4.6): per-call deadline and socket
// deadline, node/replica resolution, checkout-write-read, and the
// retry loop. Batch and scan/query build on top of `execute_once` —
// see `batch.rs` and `partition_tracker.rs`.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use aerospike_base::{err, Error, ErrorKind, Result};
use aerospike_buf::{BufferPool, Key, Record as WireRecord, Ttl, Value};
use aerospike_cluster::{Cluster, ReplicaPolicy};
use aerospike_proto::{
    info1, info2, read_frame, Field, FieldType, Message, MsgHeader, Op, OpCode,
};

use crate::policy::Policy;

/// Everything a single command needs besides the policy: the key it
/// targets and which op set to send.
pub enum Action {
    Get { bin_names: Vec<String> },
    Put { bins: Vec<(String, Value)>, ttl: Ttl },
    Delete,
    Operate { ops: Vec<Op> },
    /// Server-side UDF application (spec §4.6 Non-goals lift): the
    /// server runs `package.function(args)` against the record and
    /// returns its result the way a read returns bins.
    Udf {
        package: String,
        function: String,
        args: Vec<Value>,
    },
}

pub struct CommandResult {
    pub record: Option<WireRecord>,
}

/// Runs one command end to end against `cluster`, following spec
/// §4.6 steps 1-6.
pub fn execute(
    cluster: &Cluster,
    pool: &BufferPool,
    policy: &Policy,
    namespace: &str,
    set: &str,
    key: &Key,
    action: Action,
) -> Result<CommandResult> {
    let deadline = if policy.total_timeout.is_zero() {
        None
    } else {
        Some(Instant::now() + policy.total_timeout)
    };

    let table = cluster.partition_table_or_create(namespace, 1);
    let partition_id = key.partition_id(table.partition_count().max(1) as u32);
    let replica_policy: ReplicaPolicy = policy.replica.into();
    let preferred_rack = cluster.preferred_rack(namespace);

    let mut iteration = 0u32;
    let mut replica_index = 0usize;

    loop {
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return Err(err(ErrorKind::Timeout, "total timeout exceeded"));
            }
        }

        let node = table.get_node(partition_id, replica_policy, replica_index, preferred_rack)?;
        let addr = node.addresses.primary();

        let mut conn = match node.sync_pool.checkout(addr, policy.socket_timeout) {
            Ok(c) => c,
            Err(e) => {
                node.record_error();
                cluster.counters.retries.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                iteration += 1;
                replica_index += 1;
                if iteration > policy.max_retries || deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
                    return Err(e);
                }
                thread::sleep(policy.sleep_between_retries);
                continue;
            }
        };

        let socket_deadline = policy.socket_timeout;
        let outcome = run_once(
            conn.stream_mut(),
            pool,
            socket_deadline,
            namespace,
            set,
            key,
            &action,
            policy,
        );

        cluster
            .counters
            .commands_issued
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        match outcome {
            Ok(result) => {
                node.sync_pool.put_back(conn);
                return Ok(result);
            }
            Err(e) if e.is_retryable() => {
                node.sync_pool.discard(conn);
                node.record_error();
                if matches!(e.kind(), ErrorKind::Timeout) {
                    node.record_timeout();
                }
                cluster
                    .counters
                    .retries
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                iteration += 1;
                replica_index += 1;
                if iteration > policy.max_retries {
                    return Err(e);
                }
                if let Some(d) = deadline {
                    if Instant::now() >= d {
                        return Err(e);
                    }
                }
                thread::sleep(policy.sleep_between_retries);
                continue;
            }
            Err(e) => {
                node.sync_pool.put_back(conn);
                return Err(e);
            }
        }
    }
}

pub(crate) fn build_fields(namespace: &str, set: &str, key: &Key) -> Vec<Field> {
    vec![
        Field::string(FieldType::Namespace, namespace),
        Field::string(FieldType::SetName, set),
        Field::new(FieldType::Digest, key.digest().to_vec()),
    ]
}

pub(crate) fn build_message(namespace: &str, set: &str, key: &Key, action: &Action, policy: &Policy) -> Result<Message> {
    let mut fields = build_fields(namespace, set, key);
    let mut header = MsgHeader::default();

    let (ops, info1_bits, info2_bits) = match action {
        Action::Get { bin_names } => {
            if bin_names.is_empty() {
                (Vec::new(), info1::READ | info1::GET_ALL, 0)
            } else {
                let ops = bin_names.iter().map(|b| Op::read(b.clone())).collect();
                (ops, info1::READ, 0)
            }
        }
        Action::Put { bins, ttl } => {
            header.record_ttl = ttl.to_wire();
            let ops = bins
                .iter()
                .map(|(name, value)| Op::write(name.clone(), value.clone()))
                .collect();
            let mut flags = 0u8;
            if policy.durable_delete {
                flags |= info2::DURABLE_DELETE;
            }
            (ops, 0, info2::WRITE | flags)
        }
        Action::Delete => (Vec::new(), 0, info2::WRITE | info2::DELETE),
        Action::Operate { ops } => (ops.clone(), info1::READ, info2::WRITE),
        Action::Udf { package, function, args } => {
            fields.extend(aerospike_proto::build_udf_fields(package, function, args)?);
            (Vec::new(), 0, info2::WRITE)
        }
    };

    header.info1 = info1_bits;
    header.info2 = info2_bits;

    Ok(Message::new(header, fields, ops))
}

fn run_once(
    stream: &mut TcpStream,
    pool: &BufferPool,
    socket_timeout: Duration,
    namespace: &str,
    set: &str,
    key: &Key,
    action: &Action,
    policy: &Policy,
) -> Result<CommandResult> {
    stream
        .set_write_timeout(Some(socket_timeout))
        .map_err(|e| Error::new(ErrorKind::Connection, e))?;
    stream
        .set_read_timeout(Some(socket_timeout))
        .map_err(|e| Error::new(ErrorKind::Connection, e))?;

    let msg = build_message(namespace, set, key, action, policy)?;
    let bytes = msg.encode_frame_pooled(pool, policy.compress, 128)?;
    stream
        .write_all(&bytes)
        .map_err(|e| Error::new(ErrorKind::Connection, e))?;

    // Past this point the write is on the wire: if the response never
    // comes back we genuinely don't know whether the server applied it
    // (spec §7 in_doubt). Reads and deletes-that-never-ran carry no
    // such ambiguity, so only actions with write side effects get the
    // flag.
    let is_write = matches!(
        action,
        Action::Put { .. } | Action::Delete | Action::Operate { .. } | Action::Udf { .. }
    );

    let response = match read_frame(stream, 16 * 1024 * 1024) {
        Ok(response) => response,
        Err(e) => return Err(if is_write { e.with_in_doubt(true) } else { e }),
    };

    if let Some(kind) = crate::result_code::classify(response.header.result_code) {
        return Err(err(kind, "server returned a non-zero result code"));
    }

    let record = match action {
        Action::Delete => None,
        _ => Some(decode_record(&response)),
    };

    Ok(CommandResult { record })
}

pub(crate) fn decode_record(msg: &Message) -> WireRecord {
    let mut record = WireRecord::new();
    record.generation = msg.header.generation;
    record.ttl = Some(Ttl::from_wire(msg.header.record_ttl));
    for op in &msg.ops {
        if op.code == OpCode::Read || op.code == OpCode::CdtRead {
            record.set_bin(op.bin_name.clone(), op.value.clone());
        }
    }
    record
}

#[cfg(test)]
mod test {
    use super::*;
    use aerospike_buf::UserKey;

    #[test]
    fn build_message_for_get_all_sets_get_all_flag() {
        let key = Key::new("test", "demo", UserKey::Int(1));
        let policy = Policy::default();
        let msg = build_message("test", "demo", &key, &Action::Get { bin_names: vec![] }, &policy).unwrap();
        assert_eq!(msg.header.info1 & info1::GET_ALL, info1::GET_ALL);
        assert_eq!(msg.ops.len(), 0);
    }

    #[test]
    fn build_message_for_put_sets_write_flag_and_ttl() {
        let key = Key::new("test", "demo", UserKey::Int(1));
        let policy = Policy::default();
        let action = Action::Put {
            bins: vec![("a".to_owned(), Value::Int(42))],
            ttl: Ttl::NeverExpire,
        };
        let msg = build_message("test", "demo", &key, &action, &policy).unwrap();
        assert_eq!(msg.header.info2 & info2::WRITE, info2::WRITE);
        assert_eq!(msg.header.record_ttl, Ttl::NeverExpire.to_wire());
        assert_eq!(msg.ops.len(), 1);
    }

    #[test]
    fn build_message_for_delete_sets_delete_flag() {
        let key = Key::new("test", "demo", UserKey::Int(1));
        let policy = Policy::default();
        let msg = build_message("test", "demo", &key, &Action::Delete, &policy).unwrap();
        assert_eq!(msg.header.info2 & info2::DELETE, info2::DELETE);
    }

    #[test]
    fn build_message_for_udf_carries_package_function_and_args() {
        let key = Key::new("test", "demo", UserKey::Int(1));
        let policy = Policy::default();
        let action = Action::Udf {
            package: "mypkg".to_owned(),
            function: "myfunc".to_owned(),
            args: vec![Value::Int(7)],
        };
        let msg = build_message("test", "demo", &key, &action, &policy).unwrap();
        assert_eq!(msg.header.info2 & info2::WRITE, info2::WRITE);
        assert_eq!(msg.ops.len(), 0);
        assert_eq!(msg.fields.len(), 6);
    }

    #[test]
    fn write_action_dropped_mid_response_is_marked_in_doubt() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                // Accept the write, then vanish before responding —
                // the caller can't tell whether the server applied it.
                drop(stream);
            }
        });

        let mut stream = TcpStream::connect(addr).unwrap();
        let key = Key::new("test", "demo", UserKey::Int(1));
        let policy = Policy::default();
        let pool = BufferPool::new(4);
        let action = Action::Put {
            bins: vec![("a".to_owned(), Value::Int(1))],
            ttl: Ttl::NeverExpire,
        };
        let e = run_once(
            &mut stream,
            &pool,
            Duration::from_millis(500),
            "test",
            "demo",
            &key,
            &action,
            &policy,
        )
        .unwrap_err();
        assert!(e.in_doubt());
        handle.join().unwrap();
    }

    #[test]
    fn read_action_dropped_mid_response_is_not_marked_in_doubt() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                drop(stream);
            }
        });

        let mut stream = TcpStream::connect(addr).unwrap();
        let key = Key::new("test", "demo", UserKey::Int(1));
        let policy = Policy::default();
        let pool = BufferPool::new(4);
        let action = Action::Get { bin_names: vec![] };
        let e = run_once(
            &mut stream,
            &pool,
            Duration::from_millis(500),
            "test",
            "demo",
            &key,
            &action,
            &policy,
        )
        .unwrap_err();
        assert!(!e.in_doubt());
        handle.join().unwrap();
    }
}
