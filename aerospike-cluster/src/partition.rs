// Per-namespace partition map (spec §3 Partition table, §4.2).
//
// Each partition entry holds an ordered replica vector of node
// references; regime/generation metadata lets the tender skip
// unchanged tables. Installation is a single atomic pointer swap over
// the whole namespace's partition vector — coarser than swapping each
// partition individually, but it keeps the "readers never observe a
// partial update" invariant trivially true, and partition maps are
// small enough (a few thousand entries of a pointer each) that
// whole-table copies on update are cheap relative to a 1s tend
// interval.

use std::sync::Arc;

use arc_swap::ArcSwap;
use base64::Engine;

use aerospike_base::{err, ErrorKind, Result};

use crate::node::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaPolicy {
    Master,
    Sequence,
    PreferRack,
    Random,
}

#[derive(Clone, Default)]
pub struct PartitionEntry {
    pub replicas: Vec<Option<Arc<Node>>>,
    pub regime: u32,
}

pub struct PartitionTable {
    partition_count: usize,
    replica_count: usize,
    partitions: ArcSwap<Vec<PartitionEntry>>,
}

impl PartitionTable {
    pub fn new(partition_count: usize, replica_count: usize) -> Self {
        let entries = (0..partition_count)
            .map(|_| PartitionEntry {
                replicas: vec![None; replica_count],
                regime: 0,
            })
            .collect();
        Self {
            partition_count,
            replica_count,
            partitions: ArcSwap::from_pointee(entries),
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    pub fn replica_count(&self) -> usize {
        self.replica_count
    }

    /// Installs a brand new table wholesale. Returns the old table so
    /// the caller (the tender) can push it onto the garbage list
    /// instead of dropping it immediately (spec §4.5 step 7).
    pub fn install(&self, entries: Vec<PartitionEntry>) -> Arc<Vec<PartitionEntry>> {
        self.partitions.swap(Arc::new(entries))
    }

    pub fn snapshot(&self) -> Arc<Vec<PartitionEntry>> {
        self.partitions.load_full()
    }

    /// Selects the replica for `partition_id` under the given policy.
    /// `replica_index` is the caller-advanced cursor used by
    /// `SEQUENCE`/`PREFER_RACK` fallback on retry (spec §4.6 step 1).
    pub fn get_node(
        &self,
        partition_id: u32,
        policy: ReplicaPolicy,
        replica_index: usize,
        preferred_rack: Option<u32>,
    ) -> Result<Arc<Node>> {
        let table = self.partitions.load();
        let entry = table.get(partition_id as usize).ok_or_else(|| {
            err(ErrorKind::InvalidNode, "partition id out of range for this table")
        })?;

        let live = |n: &Option<Arc<Node>>| n.as_ref().filter(|n| n.is_active() && n.is_healthy());

        let pick = match policy {
            ReplicaPolicy::Master => entry.replicas.first().and_then(live).cloned(),
            ReplicaPolicy::Sequence => entry
                .replicas
                .iter()
                .cycle()
                .skip(replica_index % entry.replicas.len().max(1))
                .take(entry.replicas.len())
                .find_map(live)
                .cloned(),
            ReplicaPolicy::PreferRack => {
                if let Some(rack) = preferred_rack {
                    let in_rack = entry
                        .replicas
                        .iter()
                        .find_map(live)
                        .filter(|n| n.rack_id() == rack)
                        .cloned();
                    in_rack.or_else(|| {
                        entry
                            .replicas
                            .iter()
                            .cycle()
                            .skip(replica_index % entry.replicas.len().max(1))
                            .take(entry.replicas.len())
                            .find_map(live)
                            .cloned()
                    })
                } else {
                    entry
                        .replicas
                        .iter()
                        .cycle()
                        .skip(replica_index % entry.replicas.len().max(1))
                        .take(entry.replicas.len())
                        .find_map(live)
                        .cloned()
                }
            }
            ReplicaPolicy::Random => {
                use rand::Rng;
                let live_nodes: Vec<_> = entry.replicas.iter().filter_map(live).collect();
                if live_nodes.is_empty() {
                    None
                } else {
                    let idx = rand::thread_rng().gen_range(0..live_nodes.len());
                    Some(live_nodes[idx].clone())
                }
            }
        };

        pick.ok_or_else(|| err(ErrorKind::InvalidNode, "no healthy replica for partition"))
    }
}

/// Decodes the server's packed base64 "which partitions does this
/// node own" bitmap from a `replicas-all` / legacy master/prole info
/// response into a bitset of owned partition ids (spec §4.2).
pub fn decode_ownership_bitmap(encoded: &str, partition_count: usize) -> Result<Vec<bool>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| aerospike_base::Error::new(ErrorKind::Client, e))?;
    let mut owned = vec![false; partition_count];
    for pid in 0..partition_count {
        let byte = pid / 8;
        let bit = 7 - (pid % 8);
        if byte < bytes.len() && (bytes[byte] >> bit) & 1 == 1 {
            owned[pid] = true;
        }
    }
    Ok(owned)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::IpAddr;
    use std::time::Duration;

    use crate::address::Address;

    fn node(name: &str) -> Arc<Node> {
        Arc::new(Node::new(
            name,
            vec![Address::new("h", IpAddr::from([127, 0, 0, 1]), 3000)],
            1,
            4,
            Duration::from_secs(30),
            5,
        ))
    }

    #[test]
    fn master_policy_picks_the_first_replica() {
        let table = PartitionTable::new(4, 2);
        let n0 = node("n0");
        let entries = vec![PartitionEntry {
            replicas: vec![Some(n0.clone()), None],
            regime: 1,
        }; 4];
        table.install(entries);
        let picked = table.get_node(0, ReplicaPolicy::Master, 0, None).unwrap();
        assert_eq!(picked.name, "n0");
    }

    #[test]
    fn no_healthy_replica_is_an_error() {
        let table = PartitionTable::new(1, 1);
        let e = table.get_node(0, ReplicaPolicy::Master, 0, None).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidNode);
    }

    #[test]
    fn ownership_bitmap_decodes_set_bits() {
        // byte 0 = 0b1010_0000 -> partitions 0 and 2 owned
        let encoded = base64::engine::general_purpose::STANDARD.encode([0b1010_0000u8]);
        let owned = decode_ownership_bitmap(&encoded, 8).unwrap();
        assert_eq!(owned, vec![true, false, true, false, false, false, false, false]);
    }
}
