// Per-operation policies (spec §6 Configuration). Plain serde-derived
// structs with `Default` impls, the same shape the teacher's config
// structs take.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use aerospike_cluster::ReplicaPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadModeAp {
    One,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadModeSc {
    Session,
    Linearize,
    AllowReplica,
    AllowUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitLevel {
    CommitAll,
    CommitMaster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationPolicy {
    None,
    ExpectGenEqual,
    ExpectGenGreater,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExistsPolicy {
    Update,
    CreateOnly,
    UpdateOnly,
    Replace,
    CreateOrReplace,
    ReplaceOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPolicy {
    Digest,
    SendKey,
}

fn serde_duration_ms() -> Duration {
    Duration::from_millis(1000)
}

/// Fields shared by every per-call policy (spec §6: `total_timeout_ms`,
/// `socket_timeout_ms`, `max_retries`, `sleep_between_retries_ms`,
/// `replica`, `read_mode_AP`, `read_mode_SC`, `commit_level`,
/// `gen_policy`, `exists_policy`, `key_policy`, `durable_delete`,
/// `compress`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(with = "duration_ms", default = "serde_duration_ms")]
    pub total_timeout: Duration,
    #[serde(with = "duration_ms", default = "serde_duration_ms")]
    pub socket_timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "duration_ms", default)]
    pub sleep_between_retries: Duration,
    pub replica: ReplicaPolicyCfg,
    pub read_mode_ap: ReadModeAp,
    pub read_mode_sc: ReadModeSc,
    pub commit_level: CommitLevel,
    pub gen_policy: GenerationPolicy,
    pub exists_policy: ExistsPolicy,
    pub key_policy: KeyPolicy,
    pub durable_delete: bool,
    pub compress: bool,
}

/// Serializable mirror of `aerospike_cluster::ReplicaPolicy` (kept
/// separate so the cluster crate doesn't need a serde dependency just
/// for config plumbing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaPolicyCfg {
    Master,
    Sequence,
    PreferRack,
    Random,
}

impl From<ReplicaPolicyCfg> for ReplicaPolicy {
    fn from(v: ReplicaPolicyCfg) -> Self {
        match v {
            ReplicaPolicyCfg::Master => ReplicaPolicy::Master,
            ReplicaPolicyCfg::Sequence => ReplicaPolicy::Sequence,
            ReplicaPolicyCfg::PreferRack => ReplicaPolicy::PreferRack,
            ReplicaPolicyCfg::Random => ReplicaPolicy::Random,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            total_timeout: Duration::from_millis(1000),
            socket_timeout: Duration::from_millis(30_000),
            max_retries: 2,
            sleep_between_retries: Duration::from_millis(0),
            replica: ReplicaPolicyCfg::Sequence,
            read_mode_ap: ReadModeAp::One,
            read_mode_sc: ReadModeSc::Session,
            commit_level: CommitLevel::CommitAll,
            gen_policy: GenerationPolicy::None,
            exists_policy: ExistsPolicy::Update,
            key_policy: KeyPolicy::Digest,
            durable_delete: false,
            compress: false,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

pub type ReadPolicy = Policy;
pub type WritePolicy = Policy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPolicy {
    #[serde(flatten)]
    pub base: Policy,
    pub allow_inline: bool,
    pub respond_all_keys: bool,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            base: Policy::default(),
            allow_inline: true,
            respond_all_keys: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPolicy {
    #[serde(flatten)]
    pub base: Policy,
    pub max_records: u64,
    pub records_per_second: u32,
    pub concurrent_nodes: bool,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            base: Policy::default(),
            max_records: 0,
            records_per_second: 0,
            concurrent_nodes: true,
        }
    }
}

pub type QueryPolicy = ScanPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientPolicy {
    #[serde(with = "duration_ms", default = "serde_duration_ms")]
    pub tend_interval: Duration,
    #[serde(with = "duration_ms", default)]
    pub conn_timeout: Duration,
    #[serde(with = "duration_ms", default)]
    pub login_timeout: Duration,
    pub max_socket_idle_sec: u32,
    pub min_conns_per_node: u32,
    pub max_conns_per_node: u32,
    pub async_min_conns_per_node: u32,
    pub async_max_conns_per_node: u32,
    pub pipe_max_conns_per_node: u32,
    pub conn_pools_per_node: u32,
    pub max_error_rate: u32,
    pub error_rate_window: u32,
    pub rack_aware: bool,
    pub rack_ids: Vec<u32>,
    pub cluster_name: Option<String>,
}

impl Default for ClientPolicy {
    fn default() -> Self {
        Self {
            tend_interval: Duration::from_secs(1),
            conn_timeout: Duration::from_secs(1),
            login_timeout: Duration::from_secs(5),
            max_socket_idle_sec: 55,
            min_conns_per_node: 1,
            max_conns_per_node: 100,
            async_min_conns_per_node: 0,
            async_max_conns_per_node: 100,
            pipe_max_conns_per_node: 0,
            conn_pools_per_node: 1,
            max_error_rate: 100,
            error_rate_window: 1,
            rack_aware: false,
            rack_ids: Vec::new(),
            cluster_name: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn policy_default_matches_spec_baseline() {
        let p = Policy::default();
        assert_eq!(p.max_retries, 2);
        assert_eq!(p.replica, ReplicaPolicyCfg::Sequence);
    }

    #[test]
    fn client_policy_default_matches_spec_tend_interval() {
        let p = ClientPolicy::default();
        assert_eq!(p.tend_interval, Duration::from_secs(1));
    }
}
