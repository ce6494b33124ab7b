// Scan/query execution (spec §4.8): drives a `PartitionTracker`
// across iterations, issuing one frame-stream per node per iteration
// and folding per-partition completion back into the tracker.
//
// Wire shape: each node stream is a sequence of record frames tagged
// with the partition id they belong to (`FieldType::PidArray`,
// reused here to carry a single id rather than an array — this
// client never sends it with more than one entry). A frame's
// `info3::PARTITION_DONE` bit closes that partition out; the final
// frame of the stream also carries `info3::LAST`.

use std::collections::HashMap;
use std::net::TcpStream;
use std::time::Duration;

use aerospike_base::{err, ErrorKind, Result};
use aerospike_buf::{Record as WireRecord, DIGEST_LEN};
use aerospike_cluster::{Cluster, ReplicaPolicy};
use aerospike_proto::{
    info1, info3, read_frame, write_frame, Field, FieldType, Message, MsgHeader, Op, OpCode,
};

use crate::partition_tracker::{exhausted_error, PartitionTracker};
use crate::policy::ScanPolicy;

pub fn scan(
    cluster: &Cluster,
    policy: &ScanPolicy,
    namespace: &str,
    set: &str,
    bin_names: &[String],
    mut on_record: impl FnMut(WireRecord),
) -> Result<()> {
    let table = cluster.partition_table_or_create(namespace, 1);
    let mut tracker = PartitionTracker::new_range(0, table.partition_count() as u32, policy.max_records);
    let replica_policy: ReplicaPolicy = policy.base.replica.into();

    let budget = policy.base.max_retries + 1;
    for _iteration in 0..budget {
        if tracker.is_done() {
            return Ok(());
        }

        let assignments = tracker.assign(&table, replica_policy)?;
        for (node, indices, cap) in assignments {
            let mut partition_ids: HashMap<u32, usize> = HashMap::new();
            for &idx in &indices {
                partition_ids.insert(tracker.statuses[idx].partition_id, idx);
            }

            let outcome = run_node_scan(
                &node,
                policy.base.socket_timeout,
                namespace,
                set,
                bin_names,
                &indices.iter().map(|&i| tracker.statuses[i].partition_id).collect::<Vec<_>>(),
                cap,
                &mut |partition_id, record, partition_done| {
                    if let Some(&idx) = partition_ids.get(&partition_id) {
                        if let Some(r) = record {
                            on_record(r);
                        }
                        if partition_done {
                            tracker.mark_done(idx, 1);
                        } else {
                            tracker.mark_partial(idx, [0u8; DIGEST_LEN], 1);
                        }
                    }
                },
            );

            if outcome.is_err() {
                for &idx in &indices {
                    tracker.mark_unavailable(idx, node.name.clone());
                }
                node.record_error();
            }
        }
    }

    if tracker.is_done() {
        Ok(())
    } else {
        Err(exhausted_error(&tracker))
    }
}

fn run_node_scan(
    node: &aerospike_cluster::Node,
    socket_timeout: Duration,
    namespace: &str,
    set: &str,
    bin_names: &[String],
    partition_ids: &[u32],
    max_records: u64,
    on_frame: &mut impl FnMut(u32, Option<WireRecord>, bool),
) -> Result<()> {
    let addr = node.addresses.primary();
    let mut conn = node.sync_pool.checkout(addr, socket_timeout)?;
    let stream = conn.stream_mut();
    stream
        .set_write_timeout(Some(socket_timeout))
        .map_err(|e| aerospike_base::Error::new(ErrorKind::Connection, e))?;
    stream
        .set_read_timeout(Some(socket_timeout))
        .map_err(|e| aerospike_base::Error::new(ErrorKind::Connection, e))?;

    let ops = if bin_names.is_empty() {
        vec![Op::read_all_bins()]
    } else {
        bin_names.iter().map(|b| Op::read(b.clone())).collect()
    };

    let mut fields = vec![
        Field::string(FieldType::Namespace, namespace),
        Field::string(FieldType::SetName, set),
    ];
    for pid in partition_ids {
        fields.push(Field::new(FieldType::PidArray, pid.to_be_bytes().to_vec()));
    }
    if max_records > 0 {
        fields.push(Field::new(FieldType::MaxRecords, (max_records as u32).to_be_bytes().to_vec()));
    }

    let request = Message::new(
        MsgHeader {
            info1: info1::READ,
            ..Default::default()
        },
        fields,
        ops,
    );

    let result = send_scan(stream, &request, on_frame);
    match result {
        Ok(()) => {
            node.sync_pool.put_back(conn);
            Ok(())
        }
        Err(e) => {
            node.sync_pool.discard(conn);
            Err(e)
        }
    }
}

fn send_scan(
    stream: &mut TcpStream,
    request: &Message,
    on_frame: &mut impl FnMut(u32, Option<WireRecord>, bool),
) -> Result<()> {
    write_frame(stream, request, false, usize::MAX)?;

    loop {
        let response = read_frame(stream, 16 * 1024 * 1024)?;
        let partition_id = response
            .fields
            .iter()
            .find(|f| f.kind == FieldType::PidArray)
            .and_then(|f| f.data.get(0..4))
            .map(|b| u32::from_be_bytes(b.try_into().unwrap()))
            .ok_or_else(|| err(ErrorKind::Client, "scan frame missing partition id field"))?;

        let is_last = response.header.info3 & info3::LAST != 0;
        let partition_done = response.header.info3 & info3::PARTITION_DONE != 0;

        let record = if response.ops.is_empty() {
            None
        } else {
            let mut r = WireRecord::new();
            r.generation = response.header.generation;
            for op in &response.ops {
                if op.code == OpCode::Read || op.code == OpCode::CdtRead {
                    r.set_bin(op.bin_name.clone(), op.value.clone());
                }
            }
            Some(r)
        };

        on_frame(partition_id, record, partition_done);

        if is_last {
            break;
        }
    }
    Ok(())
}
