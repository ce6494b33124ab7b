// Scan/query partition tracker (spec §4.8). Tracks one status entry
// per partition across pages: which replica index to try next, a
// resume digest for partitions that returned rows but not an
// end-of-partition marker, and a done flag. Reused across pages until
// every partition is done or the iteration budget is exhausted.

use std::collections::HashMap;
use std::sync::Arc;

use aerospike_base::{err, ErrorKind, Result};
use aerospike_buf::DIGEST_LEN;
use aerospike_cluster::{Node, PartitionTable, ReplicaPolicy};

#[derive(Debug, Clone)]
pub struct PartitionStatus {
    pub partition_id: u32,
    pub replica_index: usize,
    pub retry: bool,
    pub resume_digest: Option<[u8; DIGEST_LEN]>,
    pub last_node: Option<String>,
    pub done: bool,
}

pub struct PartitionTracker {
    pub statuses: Vec<PartitionStatus>,
    pub max_records: u64,
    pub records_fetched: u64,
}

impl PartitionTracker {
    /// One status entry per partition in `[begin, begin+count)`.
    pub fn new_range(begin: u32, count: u32, max_records: u64) -> Self {
        let statuses = (begin..begin + count)
            .map(|pid| PartitionStatus {
                partition_id: pid,
                replica_index: 0,
                retry: true,
                resume_digest: None,
                last_node: None,
                done: false,
            })
            .collect();
        Self {
            statuses,
            max_records,
            records_fetched: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.statuses.iter().all(|s| s.done)
            || (self.max_records != 0 && self.records_fetched >= self.max_records)
    }

    pub fn remaining_cap(&self) -> u64 {
        if self.max_records == 0 {
            0
        } else {
            self.max_records.saturating_sub(self.records_fetched)
        }
    }

    fn pending_indices(&self) -> Vec<usize> {
        self.statuses
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.done && s.retry)
            .map(|(i, _)| i)
            .collect()
    }

    /// Step 1 (spec §4.8): assign every pending partition to its
    /// owning node for this iteration, and split `max_records` across
    /// the participating nodes: `max / node_count` plus the remainder
    /// spread over the first nodes, or a ceiling of 1 each when
    /// `max < node_count` (the client trims the excess client-side).
    pub fn assign(
        &self,
        table: &PartitionTable,
        policy: ReplicaPolicy,
    ) -> Result<Vec<(Arc<Node>, Vec<usize>, u64)>> {
        let pending = self.pending_indices();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_node: HashMap<String, (Arc<Node>, Vec<usize>)> = HashMap::new();
        for idx in pending {
            let status = &self.statuses[idx];
            let node = table.get_node(status.partition_id, policy, status.replica_index, None)?;
            by_node
                .entry(node.name.clone())
                .or_insert_with(|| (node, Vec::new()))
                .1
                .push(idx);
        }

        let node_count = by_node.len() as u64;
        let remaining = self.remaining_cap();
        let (base, remainder) = if self.max_records == 0 {
            (0, 0)
        } else if remaining < node_count {
            (1, 0)
        } else {
            (remaining / node_count, remaining % node_count)
        };

        Ok(by_node
            .into_values()
            .enumerate()
            .map(|(i, (node, indices))| {
                let cap = if self.max_records == 0 {
                    0
                } else {
                    base + if (i as u64) < remainder { 1 } else { 0 }
                };
                (node, indices, cap)
            })
            .collect())
    }

    pub fn mark_done(&mut self, idx: usize, rows_in_partition: u64) {
        self.statuses[idx].done = true;
        self.statuses[idx].retry = false;
        self.records_fetched += rows_in_partition;
    }

    /// Partition returned rows but no end-of-partition marker: resume
    /// from the last digest next iteration (spec §4.8 step 3).
    pub fn mark_partial(&mut self, idx: usize, resume_digest: [u8; DIGEST_LEN], rows: u64) {
        let s = &mut self.statuses[idx];
        s.resume_digest = Some(resume_digest);
        s.retry = true;
        self.records_fetched += rows;
    }

    /// Partition's assigned node was unreachable: advance the replica
    /// cursor and retry it against the next replica next iteration
    /// (spec §4.8 step 3).
    pub fn mark_unavailable(&mut self, idx: usize, node_name: impl Into<String>) {
        let s = &mut self.statuses[idx];
        s.replica_index += 1;
        s.retry = true;
        s.last_node = Some(node_name.into());
    }
}

/// Runs out of retries with partitions still outstanding (spec §4.8:
/// "a structured error lists each sub-error").
pub fn exhausted_error(tracker: &PartitionTracker) -> aerospike_base::Error {
    let outstanding: Vec<String> = tracker
        .statuses
        .iter()
        .filter(|s| !s.done)
        .map(|s| format!("partition {} (last node {:?})", s.partition_id, s.last_node))
        .collect();
    err(
        ErrorKind::Client,
        format!("scan/query iteration budget exhausted: {}", outstanding.join(", ")),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_range_starts_with_every_partition_pending() {
        let t = PartitionTracker::new_range(0, 4096, 0);
        assert_eq!(t.statuses.len(), 4096);
        assert!(!t.is_done());
    }

    #[test]
    fn marking_every_partition_done_completes_the_tracker() {
        let mut t = PartitionTracker::new_range(0, 4, 0);
        for i in 0..4 {
            t.mark_done(i, 10);
        }
        assert!(t.is_done());
        assert_eq!(t.records_fetched, 40);
    }

    #[test]
    fn max_records_caps_completion_before_every_partition_is_done() {
        let mut t = PartitionTracker::new_range(0, 4, 5);
        t.mark_done(0, 5);
        assert!(t.is_done());
    }

    #[test]
    fn unavailable_partition_advances_replica_index_and_stays_pending() {
        let mut t = PartitionTracker::new_range(0, 1, 0);
        t.mark_unavailable(0, "BB9");
        assert_eq!(t.statuses[0].replica_index, 1);
        assert!(!t.statuses[0].done);
        assert!(t.statuses[0].retry);
    }
}
