// The top-level facade (spec §1 Overview): re-exports the pieces an
// application actually touches — the client, its policies, the
// record/value model, transactions, and metrics — so callers depend
// on one crate instead of the nine subsystem crates underneath it.

pub use aerospike_base::{err, Error, ErrorKind, Result};
pub use aerospike_buf::{BlobSubtype, Key, MapOrder, MapValue, Record, Ttl, UserKey, Value};
pub use aerospike_proto::Op;

pub use aerospike_auth::{Credential, NullHasher, PasswordHasher};

pub use aerospike_cluster::{Address, Cluster, ClusterConfig, ReplicaPolicy};

pub use aerospike_client::{
    execute_async, queue_full_error, Action, AsyncCommandResult, BatchPolicy, BatchReadRequest,
    BatchResult, Client, ClientPolicy, CommandResult, CommandState, CommitLevel, ExistsPolicy,
    GenerationPolicy, KeyPolicy, Policy, QueryPolicy, ReadModeAp, ReadModeSc, ReadPolicy,
    ReplicaPolicyCfg, ScanPolicy, WritePolicy,
};

pub use aerospike_txn::{Outcome as TxnOutcome, RecordDigest, State as TxnState, Transaction, TxnBackend};

pub use aerospike_metrics::{
    ClusterSnapshot, EventLoopSnapshot, LatencyHistogram, MetricsWriter, NodeLatency,
    NodeSnapshot, MIN_REPORT_SIZE_LIMIT, SCHEMA_VERSION,
};
