// Periodic metrics snapshots and the size-capped rotating log that
// records them (spec §4.10).

mod histogram;
mod writer;

pub use histogram::LatencyHistogram;
pub use writer::{
    ClusterSnapshot, EventLoopSnapshot, MetricsWriter, NodeLatency, NodeSnapshot,
    MIN_REPORT_SIZE_LIMIT, SCHEMA_VERSION,
};
