// The cluster tend loop (spec §4.5). Runs every `tend_interval`;
// seeds the cluster when no nodes are active, refreshes membership
// and partition maps via the ASCII info sub-protocol, and installs
// the result with copy-on-write array swaps.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use aerospike_base::{err, Error, ErrorKind, Result};
use aerospike_proto::{read_info_response, write_info_request};

use crate::address::Address;
use crate::cluster::{Cluster, Garbage};
use crate::node::Node;
use crate::partition::{decode_ownership_bitmap, PartitionEntry};

const INFO_NAMES: &[&str] = &["node", "partition-generation", "services", "peers", "rack-ids"];

/// A single tend iteration's outcome, surfaced mostly for tests and
/// metrics; the tend loop itself only cares about side effects on the
/// `Cluster`.
#[derive(Debug, Default)]
pub struct TendReport {
    pub nodes_added: usize,
    pub nodes_removed: usize,
    pub partition_tables_refreshed: usize,
}

pub struct Tender {
    connect_timeout: Duration,
    info_timeout: Duration,
}

impl Tender {
    pub fn new(connect_timeout: Duration, info_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            info_timeout,
        }
    }

    /// Runs exactly one tend iteration against `cluster` (spec §4.5
    /// steps 1-7).
    pub fn tend_once(&self, cluster: &Cluster) -> Result<TendReport> {
        let mut report = TendReport::default();

        // Step 1: GC the previous iteration's garbage.
        cluster.collect_garbage();

        let mut nodes: Vec<Arc<Node>> = cluster.nodes().as_ref().clone();

        // Step 2: seed if there are no active nodes.
        if !nodes.iter().any(|n| n.is_active()) {
            for seed in cluster.seeds() {
                if let Ok(info) = self.fetch_info(seed) {
                    if let Some(name) = info.get("node") {
                        if !nodes.iter().any(|n| &n.name == name) {
                            let node = Arc::new(Node::new(
                                name.clone(),
                                vec![seed.clone()],
                                cluster.config.min_conns_per_node,
                                cluster.config.max_conns_per_node,
                                cluster.config.max_socket_idle,
                                cluster.config.error_rate_cap,
                            ));
                            nodes.push(node);
                            report.nodes_added += 1;
                        }
                    }
                }
            }
        }

        let mut pending_friends: Vec<Address> = Vec::new();
        let mut to_deactivate: Vec<String> = Vec::new();

        for node in nodes.iter() {
            if !node.is_active() {
                continue;
            }
            node.tick_error_window();

            let info = match self.fetch_info(node.addresses.primary()) {
                Ok(info) => info,
                Err(_) => {
                    node.consecutive_info_failures.fetch_add(1, Ordering::Relaxed);
                    node.record_error();
                    continue;
                }
            };
            node.consecutive_info_failures.store(0, Ordering::Relaxed);

            // Step 4: a name mismatch means the address now answers for
            // a different node; deactivate ours immediately.
            if let Some(reported_name) = info.get("node") {
                if reported_name != &node.name {
                    to_deactivate.push(node.name.clone());
                    continue;
                }
            }

            // Step 3: first successful tend installs the partition count.
            // (There is no dedicated "partitions-count" key in `INFO_NAMES`
            // because the real server reports it implicitly via the
            // width of the `replicas-all` bitmap; we request it
            // separately the first time only.)
            if cluster.partition_count() == 0 {
                if let Ok(extra) = self.fetch_info_names(node.addresses.primary(), &["partitions-count"]) {
                    if let Some(n) = extra.get("partitions-count").and_then(|s| s.parse::<u32>().ok()) {
                        cluster.install_partition_count(n)?;
                    }
                }
            }

            if let Some(rack_csv) = info.get("rack-ids") {
                if let Some(first) = rack_csv.split(',').next().and_then(|s| s.parse::<u32>().ok()) {
                    node.set_rack_id(first);
                }
            }

            // Step 5: merge friends (services + peers) into pending
            // additions.
            for key in ["services", "peers"] {
                if let Some(csv) = info.get(key) {
                    pending_friends.extend(parse_peer_list(csv));
                }
            }

            // Step 6: generation-gated partition refresh.
            if let Some(gen) = info
                .get("partition-generation")
                .and_then(|s| s.parse::<u32>().ok())
            {
                let prev = node.partition_generation.swap(gen, Ordering::AcqRel);
                if prev != gen {
                    if let Ok(replicas) = self.fetch_info_names(node.addresses.primary(), &["replicas-all"]) {
                        if let Some(body) = replicas.get("replicas-all") {
                            self.install_replicas(cluster, node, body, &nodes)?;
                            report.partition_tables_refreshed += 1;
                        }
                    }
                }
            }
        }

        // Step 5 removal rule (ii) bookkeeping: count, for each node
        // already known to us, how many peers named it a friend this
        // iteration (before any brand-new nodes below are added, since
        // a node can only be a "friend" of something the cluster
        // already knew about when the info responses came back).
        let mut friend_ref_counts: std::collections::HashMap<String, u32> =
            std::collections::HashMap::new();
        for addr in &pending_friends {
            if let Some(n) = nodes.iter().find(|n| n.addresses.all().contains(addr)) {
                *friend_ref_counts.entry(n.name.clone()).or_insert(0) += 1;
            }
        }
        for node in nodes.iter() {
            if !node.is_active() {
                continue;
            }
            node.record_friends_seen(friend_ref_counts.get(&node.name).copied().unwrap_or(0));
        }

        // Apply friend additions for addresses nobody already owns.
        for addr in &pending_friends {
            let already_known = nodes.iter().any(|n| n.addresses.all().contains(addr));
            if already_known {
                continue;
            }
            if let Ok(info) = self.fetch_info(addr) {
                if let Some(name) = info.get("node") {
                    if !nodes.iter().any(|n| &n.name == name) {
                        let node = Arc::new(Node::new(
                            name.clone(),
                            vec![addr.clone()],
                            cluster.config.min_conns_per_node,
                            cluster.config.max_conns_per_node,
                            cluster.config.max_socket_idle,
                            cluster.config.error_rate_cap,
                        ));
                        nodes.push(node);
                        report.nodes_added += 1;
                    }
                }
            }
        }

        for name in &to_deactivate {
            if let Some(n) = nodes.iter().find(|n| &n.name == name) {
                n.deactivate();
            }
        }

        // Step 5(ii)/(iii): drop nodes that are inactive, unreferenced
        // by every peer for two consecutive iterations and unmapped in
        // any partition table (rule ii), or (in a one-/two-node
        // cluster) have failed too many consecutive info requests
        // while at least one other node is reachable (rule iii).
        let reachable_exists = nodes.iter().any(|n| n.is_active() && n.consecutive_info_failures.load(Ordering::Relaxed) == 0);
        let small_cluster = nodes.len() <= 2;
        let before = nodes.len();
        nodes.retain(|n| {
            if !n.is_active() {
                return false;
            }
            if n.unreferenced_by_peers() && !cluster.node_mapped_in_any_partition_table(&n.name) {
                return false;
            }
            if small_cluster
                && reachable_exists
                && n.consecutive_info_failures.load(Ordering::Relaxed)
                    >= cluster.config.info_failure_removal_threshold
            {
                return false;
            }
            true
        });
        report.nodes_removed += before - nodes.len();

        // Step 7: install the delta via a copy-on-write swap.
        cluster.install_nodes(nodes);

        Ok(report)
    }

    fn fetch_info(&self, addr: &Address) -> Result<std::collections::HashMap<String, String>> {
        self.fetch_info_names(addr, INFO_NAMES)
    }

    fn fetch_info_names(
        &self,
        addr: &Address,
        names: &[&str],
    ) -> Result<std::collections::HashMap<String, String>> {
        let sock_addr = SocketAddr::new(addr.ip, addr.port);
        let mut stream = std::net::TcpStream::connect_timeout(&sock_addr, self.connect_timeout)
            .map_err(|e| Error::new(ErrorKind::Connection, e))?;
        stream
            .set_read_timeout(Some(self.info_timeout))
            .map_err(|e| Error::new(ErrorKind::Connection, e))?;
        write_info_request(&mut stream, names)?;
        read_info_response(&mut stream, 1024 * 1024)
    }

    fn install_replicas(
        &self,
        cluster: &Cluster,
        reporting_node: &Arc<Node>,
        replicas_all: &str,
        all_nodes: &[Arc<Node>],
    ) -> Result<()> {
        // Format: `ns1:regime:replica_count:b64bitmap0,b64bitmap1,...;ns2:...`
        // (SPEC_FULL §A supplement — the wire-exact legacy
        // `replicas-all` grammar is server-internal and not carried in
        // the kept original_source headers, so this parses the
        // semantically-equivalent shape the rest of this module
        // produces and consumes).
        for ns_entry in replicas_all.split(';').filter(|s| !s.is_empty()) {
            let mut parts = ns_entry.splitn(4, ':');
            let namespace = parts.next().ok_or_else(|| err(ErrorKind::Client, "missing namespace"))?;
            let regime: u32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| err(ErrorKind::Client, "missing regime"))?;
            let replica_count: usize = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| err(ErrorKind::Client, "missing replica count"))?;
            let bitmaps = parts.next().unwrap_or("");

            let table = cluster.partition_table_or_create(namespace, replica_count);
            let partition_count = table.partition_count();
            let mut entries: Vec<PartitionEntry> = table
                .snapshot()
                .iter()
                .cloned()
                .collect();
            if entries.len() != partition_count {
                entries = vec![PartitionEntry::default(); partition_count];
            }

            for (replica_idx, bitmap) in bitmaps.split(',').enumerate() {
                if replica_idx >= replica_count || bitmap.is_empty() {
                    continue;
                }
                let owned = decode_ownership_bitmap(bitmap, partition_count)?;
                for (pid, is_owner) in owned.into_iter().enumerate() {
                    if !is_owner {
                        continue;
                    }
                    let entry = &mut entries[pid];
                    entry.regime = regime;
                    if entry.replicas.len() != replica_count {
                        entry.replicas.resize(replica_count, None);
                    }
                    entry.replicas[replica_idx] = all_nodes
                        .iter()
                        .find(|n| Arc::ptr_eq(n, reporting_node))
                        .cloned();
                }
            }

            let old = table.install(entries);
            cluster.push_garbage(Garbage::PartitionEntries(old));
        }
        Ok(())
    }
}

/// Parses a `host1:port1,host2:port2` peer/services list, ignoring
/// entries that fail to resolve (transient DNS hiccups should not
/// abort the whole tend).
fn parse_peer_list(csv: &str) -> Vec<Address> {
    let mut out = Vec::new();
    for entry in csv.split(',').filter(|s| !s.is_empty()) {
        let Some((host, port)) = entry.rsplit_once(':') else {
            continue;
        };
        let Ok(port) = port.parse::<u16>() else {
            continue;
        };
        let ip: Option<IpAddr> = host.parse().ok().or_else(|| {
            format!("{host}:{port}")
                .to_socket_addrs()
                .ok()
                .and_then(|mut it| it.next())
                .map(|sa| sa.ip())
        });
        if let Some(ip) = ip {
            out.push(Address::new(host, ip, port));
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_peer_list_with_ip_hosts() {
        let addrs = parse_peer_list("10.0.0.1:3000,10.0.0.2:3000");
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].port, 3000);
    }

    #[test]
    fn ignores_malformed_entries() {
        let addrs = parse_peer_list("garbage,10.0.0.1:3000");
        assert_eq!(addrs.len(), 1);
    }

    #[test]
    fn report_defaults_to_zero() {
        let report = TendReport::default();
        assert_eq!(report.nodes_added, 0);
        assert_eq!(report.nodes_removed, 0);
    }
}
