// The Aerospike cluster client core (spec §1-§9): sync command
// engine, batch, scan/query pagination, and the client facade that
// wires them to `aerospike-cluster`'s tend loop.

mod batch;
mod client;
mod command;
mod partition_tracker;
mod policy;
mod reactor;
mod result_code;
mod scan;

pub use batch::{BatchReadRequest, BatchResult};
pub use client::Client;
pub use command::{Action, CommandResult};
pub use partition_tracker::{PartitionStatus, PartitionTracker};
pub use policy::{
    BatchPolicy, ClientPolicy, CommitLevel, ExistsPolicy, GenerationPolicy, KeyPolicy, Policy,
    QueryPolicy, ReadModeAp, ReadModeSc, ReadPolicy, ReplicaPolicyCfg, ScanPolicy, WritePolicy,
};
pub use reactor::{execute_once as execute_async, queue_full_error, AsyncCommandResult, CommandState};
pub use result_code::classify;
