// Batch reads (spec §4.6 tail): every key is assigned to the node
// that owns its partition, one batch-index frame is compiled per
// node, and all per-node frames are sent concurrently. Results are
// stitched back into the caller's original order once every node has
// answered. A node that can't be reached fails only the keys it was
// responsible for — the rest of the batch still completes.

use std::collections::HashMap;
use std::net::TcpStream;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use aerospike_base::{err, Error, ErrorKind, Result};
use aerospike_buf::{Key, Record as WireRecord};
use aerospike_cluster::Cluster;
use aerospike_proto::{
    info1, info3, read_frame, write_frame, BatchIndexField, BatchKeyEntry, Field, FieldType,
    Message, MsgHeader, Op, OpCode,
};

use crate::policy::BatchPolicy;

pub struct BatchReadRequest {
    pub key: Key,
    /// Empty means "read all bins".
    pub bin_names: Vec<String>,
}

pub struct BatchResult {
    pub key: Key,
    pub outcome: Result<Option<WireRecord>>,
}

pub fn execute_batch_read(
    cluster: &Cluster,
    policy: &BatchPolicy,
    namespace: &str,
    requests: Vec<BatchReadRequest>,
) -> Result<Vec<BatchResult>> {
    let deadline = if policy.base.total_timeout.is_zero() {
        None
    } else {
        Some(Instant::now() + policy.base.total_timeout)
    };

    let table = cluster.partition_table_or_create(namespace, 1);
    let replica_policy: aerospike_cluster::ReplicaPolicy = policy.base.replica.into();

    // Group request indices by owning node.
    let mut by_node: HashMap<String, (std::sync::Arc<aerospike_cluster::Node>, Vec<usize>)> =
        HashMap::new();
    for (idx, req) in requests.iter().enumerate() {
        let partition_id = req.key.partition_id(table.partition_count().max(1) as u32);
        let node = table.get_node(partition_id, replica_policy, 0, None)?;
        by_node
            .entry(node.name.clone())
            .or_insert_with(|| (node, Vec::new()))
            .1
            .push(idx);
    }

    let socket_timeout = policy.base.socket_timeout;
    let results: Vec<Mutex<Option<Result<Option<WireRecord>>>>> =
        (0..requests.len()).map(|_| Mutex::new(None)).collect();

    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for (_, (node, indices)) in by_node.iter() {
            let requests = &requests;
            let results = &results;
            handles.push(scope.spawn(move || {
                let outcome = run_node_batch(node, socket_timeout, namespace, requests, indices);
                match outcome {
                    Ok(per_key) => {
                        for (idx, record) in per_key {
                            *results[idx].lock() = Some(Ok(record));
                        }
                    }
                    Err(e) => {
                        for &idx in indices {
                            *results[idx].lock() = Some(Err(clone_error(&e)));
                        }
                    }
                }
            }));
        }
        for h in handles {
            let _ = h.join();
        }
    });

    if let Some(d) = deadline {
        if Instant::now() >= d {
            cluster
                .counters
                .delay_queue_timeouts
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    Ok(requests
        .into_iter()
        .zip(results.into_iter())
        .map(|(req, slot)| BatchResult {
            key: req.key,
            outcome: slot
                .into_inner()
                .unwrap_or_else(|| Err(err(ErrorKind::Client, "node never answered for this key"))),
        })
        .collect())
}

fn clone_error(e: &Error) -> Error {
    err(e.kind(), "batch sub-request failed (see per-node log)")
}

fn run_node_batch(
    node: &aerospike_cluster::Node,
    socket_timeout: Duration,
    namespace: &str,
    requests: &[BatchReadRequest],
    indices: &[usize],
) -> Result<Vec<(usize, Option<WireRecord>)>> {
    let addr = node.addresses.primary();
    let mut conn = node.sync_pool.checkout(addr, socket_timeout)?;
    let stream = conn.stream_mut();
    stream
        .set_write_timeout(Some(socket_timeout))
        .map_err(|e| Error::new(ErrorKind::Connection, e))?;
    stream
        .set_read_timeout(Some(socket_timeout))
        .map_err(|e| Error::new(ErrorKind::Connection, e))?;

    let entries = indices
        .iter()
        .map(|&idx| {
            let req = &requests[idx];
            let ops = if req.bin_names.is_empty() {
                vec![Op::read_all_bins()]
            } else {
                req.bin_names.iter().map(|b| Op::read(b.clone())).collect()
            };
            BatchKeyEntry {
                original_index: idx as u32,
                digest: *req.key.digest(),
                set_name: Some(req.key.set.clone()),
                ops,
            }
        })
        .collect();

    let batch_field = BatchIndexField { entries };
    let mut field_buf = aerospike_buf::WriteBuf::new();
    batch_field.encode(&mut field_buf)?;

    let request = Message::new(
        MsgHeader {
            info1: info1::READ | info1::BATCH_INDEX,
            ..Default::default()
        },
        vec![
            Field::string(FieldType::Namespace, namespace),
            Field::new(FieldType::BatchIndex, field_buf.into_vec()),
        ],
        vec![],
    );

    let result = send_and_collect(stream, &request, indices.len());
    match result {
        Ok(records) => {
            node.sync_pool.put_back(conn);
            Ok(records)
        }
        Err(e) => {
            node.sync_pool.discard(conn);
            Err(e)
        }
    }
}

/// Reads one frame per key (spec §4.6 Non-goals lift), stopping at
/// `info3::LAST` or once every expected key has answered.
fn send_and_collect(
    stream: &mut TcpStream,
    request: &Message,
    expected: usize,
) -> Result<Vec<(usize, Option<WireRecord>)>> {
    write_frame(stream, request, false, usize::MAX)?;

    let mut out = Vec::with_capacity(expected);
    loop {
        let response = read_frame(stream, 16 * 1024 * 1024)?;
        let original_index = response
            .fields
            .iter()
            .find(|f| f.kind == FieldType::BatchIndex)
            .and_then(|f| f.data.get(0..4))
            .map(|b| u32::from_be_bytes(b.try_into().unwrap()) as usize)
            .ok_or_else(|| err(ErrorKind::Client, "batch response missing original index field"))?;

        let record = if crate::result_code::classify(response.header.result_code)
            == Some(ErrorKind::RecordNotFound)
        {
            None
        } else if let Some(kind) = crate::result_code::classify(response.header.result_code) {
            return Err(err(kind, "batch sub-request returned an error result code"));
        } else {
            let mut record = WireRecord::new();
            record.generation = response.header.generation;
            for op in &response.ops {
                if op.code == OpCode::Read || op.code == OpCode::CdtRead {
                    record.set_bin(op.bin_name.clone(), op.value.clone());
                }
            }
            Some(record)
        };

        out.push((original_index, record));

        if response.header.info3 & info3::LAST != 0 || out.len() >= expected {
            break;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn batch_read_request_defaults_to_all_bins_when_empty() {
        let key = Key::new("test", "demo", aerospike_buf::UserKey::Int(1));
        let req = BatchReadRequest {
            key,
            bin_names: vec![],
        };
        assert!(req.bin_names.is_empty());
    }
}
