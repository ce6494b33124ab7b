// Cluster membership: node/address model, per-node connection pools,
// the per-namespace partition map, and the tend loop that keeps them
// current (spec §3 Node/Address/Partition table, §4.2-4.5).

mod address;
mod cluster;
mod node;
mod partition;
mod pool;
mod tender;

pub use address::{Address, AddressList};
pub use cluster::{Cluster, ClusterConfig, ClusterCounters, Garbage};
pub use node::{Node, ERROR_WINDOW};
pub use partition::{decode_ownership_bitmap, PartitionEntry, PartitionTable, ReplicaPolicy};
pub use pool::{Connection, ConnectionPool, PoolCounters};
pub use tender::{Tender, TendReport};
