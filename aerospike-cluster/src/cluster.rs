// Process-wide cluster handle (spec §3 Cluster). Owns the
// reference-counted node array, a per-namespace partition-table
// index, the seed list, an IP-alias map, authentication state, and
// cumulative counters. Lifecycle: created at connect, destroyed at
// close — `close` joins the tender, closes all pools, then drains the
// garbage list.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};

use aerospike_auth::Credential;
use aerospike_base::{err, ErrorKind, Result};

use crate::address::Address;
use crate::node::Node;
use crate::partition::{PartitionEntry, PartitionTable};

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub tend_interval: Duration,
    pub connect_timeout: Duration,
    pub initial_connect_timeout: Duration,
    pub min_conns_per_node: u32,
    pub max_conns_per_node: u32,
    pub max_socket_idle: Duration,
    pub error_rate_cap: u32,
    /// Threshold of consecutive info failures before a node in a one-
    /// or two-node cluster is removed (spec §4.5 step 5 rule iii).
    pub info_failure_removal_threshold: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            tend_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
            initial_connect_timeout: Duration::from_secs(30),
            min_conns_per_node: 1,
            max_conns_per_node: 100,
            max_socket_idle: Duration::from_millis(55_000),
            error_rate_cap: 100,
            info_failure_removal_threshold: 5,
        }
    }
}

/// Swapped-out state kept alive for one extra tend iteration so
/// readers that grabbed a pointer just before a swap still see valid
/// memory (spec §4.5 step 1).
pub enum Garbage {
    NodeArray(Arc<Vec<Arc<Node>>>),
    PartitionEntries(Arc<Vec<PartitionEntry>>),
}

#[derive(Default)]
pub struct ClusterCounters {
    pub commands_issued: AtomicU64,
    pub retries: AtomicU64,
    pub delay_queue_timeouts: AtomicU64,
    pub invalid_node_events: AtomicU64,
}

pub struct Cluster {
    nodes: ArcSwap<Vec<Arc<Node>>>,
    partition_tables: RwLock<HashMap<String, Arc<PartitionTable>>>,
    /// Per-namespace preferred rack id (SPEC_FULL §C supplement: the
    /// original tracks one global preferred rack, this client allows
    /// a map so multi-namespace deployments can pin different racks).
    preferred_racks: RwLock<HashMap<String, u32>>,
    ip_aliases: RwLock<HashMap<IpAddr, String>>,
    seeds: Vec<Address>,
    garbage_prev: Mutex<Vec<Garbage>>,
    garbage_curr: Mutex<Vec<Garbage>>,
    credential: Option<Credential>,
    partition_count: AtomicU32,
    stabilized: AtomicBool,
    pub config: ClusterConfig,
    pub counters: ClusterCounters,
}

impl Cluster {
    pub fn new(seeds: Vec<Address>, config: ClusterConfig, credential: Option<Credential>) -> Self {
        Self {
            nodes: ArcSwap::from_pointee(Vec::new()),
            partition_tables: RwLock::new(HashMap::new()),
            preferred_racks: RwLock::new(HashMap::new()),
            ip_aliases: RwLock::new(HashMap::new()),
            seeds,
            garbage_prev: Mutex::new(Vec::new()),
            garbage_curr: Mutex::new(Vec::new()),
            credential,
            partition_count: AtomicU32::new(0),
            stabilized: AtomicBool::new(false),
            config,
            counters: ClusterCounters::default(),
        }
    }

    pub fn seeds(&self) -> &[Address] {
        &self.seeds
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn nodes(&self) -> Arc<Vec<Arc<Node>>> {
        self.nodes.load_full()
    }

    pub fn active_node_count(&self) -> usize {
        self.nodes.load().iter().filter(|n| n.is_active()).count()
    }

    pub fn node_by_name(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes.load().iter().find(|n| n.name == name).cloned()
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count.load(Ordering::Acquire)
    }

    /// Installed once, on the first successful tend (spec §4.5 step
    /// 3). Later tends must agree or the cluster is misconfigured.
    pub fn install_partition_count(&self, count: u32) -> Result<()> {
        let prev = self.partition_count.swap(count, Ordering::AcqRel);
        if prev != 0 && prev != count {
            return Err(err(
                ErrorKind::Cluster,
                "server reported a different partition count than a previous tend",
            ));
        }
        Ok(())
    }

    pub fn partition_table(&self, namespace: &str) -> Option<Arc<PartitionTable>> {
        self.partition_tables.read().get(namespace).cloned()
    }

    pub fn partition_table_or_create(&self, namespace: &str, replica_count: usize) -> Arc<PartitionTable> {
        let existing = self.partition_tables.read().get(namespace).cloned();
        if let Some(t) = existing {
            return t;
        }
        let mut tables = self.partition_tables.write();
        tables
            .entry(namespace.to_owned())
            .or_insert_with(|| {
                Arc::new(PartitionTable::new(
                    self.partition_count().max(1) as usize,
                    replica_count,
                ))
            })
            .clone()
    }

    pub fn preferred_rack(&self, namespace: &str) -> Option<u32> {
        self.preferred_racks.read().get(namespace).copied()
    }

    pub fn set_preferred_rack(&self, namespace: impl Into<String>, rack: u32) {
        self.preferred_racks.write().insert(namespace.into(), rack);
    }

    pub fn record_ip_alias(&self, ip: IpAddr, node_name: impl Into<String>) {
        self.ip_aliases.write().insert(ip, node_name.into());
    }

    /// Installs a new node array via an atomic pointer swap, pushing
    /// the old array onto this iteration's garbage list (spec §4.5
    /// step 7).
    pub fn install_nodes(&self, nodes: Vec<Arc<Node>>) {
        let old = self.nodes.swap(Arc::new(nodes));
        self.garbage_curr.lock().push(Garbage::NodeArray(old));
    }

    pub fn push_garbage(&self, item: Garbage) {
        self.garbage_curr.lock().push(item);
    }

    /// Runs the previous iteration's garbage list, then rotates
    /// current into previous (spec §4.5 step 1: "one-interval defer
    /// protects readers that saw a soon-to-be-freed pointer").
    pub fn collect_garbage(&self) {
        let mut prev = self.garbage_prev.lock();
        prev.clear();
        drop(prev);
        let mut curr = self.garbage_curr.lock();
        let swapped = std::mem::take(&mut *curr);
        drop(curr);
        *self.garbage_prev.lock() = swapped;
    }

    pub fn mark_stabilized(&self) {
        self.stabilized.store(true, Ordering::Release);
    }

    pub fn is_stabilized(&self) -> bool {
        self.stabilized.load(Ordering::Acquire)
    }

    /// Closes every node's pools. Does not stop the tend task; callers
    /// join that separately (spec §3 Cluster: "destroy path must join
    /// the tender, close all pools, then drain the garbage list").
    pub fn close(&self) {
        for node in self.nodes.load().iter() {
            node.sync_pool.close_all();
            node.pipeline_pool.close_all();
        }
        self.collect_garbage();
        self.collect_garbage();
    }

    /// Whether `node_name` appears as a replica anywhere in any
    /// namespace's partition table (spec §4.5 step 5 rule ii: a node
    /// unreferenced by peers is only removed once it is also unmapped
    /// here, so a stale "friends" report can't drop a node still
    /// serving partitions).
    pub fn node_mapped_in_any_partition_table(&self, node_name: &str) -> bool {
        self.partition_tables.read().values().any(|table| {
            table
                .snapshot()
                .iter()
                .any(|entry| entry.replicas.iter().flatten().any(|n| n.name == node_name))
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partition_count_rejects_disagreement() {
        let cluster = Cluster::new(vec![], ClusterConfig::default(), None);
        cluster.install_partition_count(4096).unwrap();
        let e = cluster.install_partition_count(2048).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Cluster);
    }

    #[test]
    fn stabilization_flag_round_trips() {
        let cluster = Cluster::new(vec![], ClusterConfig::default(), None);
        assert!(!cluster.is_stabilized());
        cluster.mark_stabilized();
        assert!(cluster.is_stabilized());
    }

    #[test]
    fn garbage_collection_defers_by_one_iteration() {
        let cluster = Cluster::new(vec![], ClusterConfig::default(), None);
        cluster.install_nodes(vec![]);
        // first collect rotates into "previous", doesn't drop yet
        cluster.collect_garbage();
        assert_eq!(cluster.garbage_prev.lock().len(), 1);
        // second collect actually drops it
        cluster.collect_garbage();
        assert_eq!(cluster.garbage_prev.lock().len(), 0);
    }
}
