// The public facade (spec §3 Cluster/Node ownership summary): owns
// the cluster handle and the tend thread, and exposes the record API
// on top of `command`/`batch`/`scan`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use aerospike_base::{ErrorKind, Result};
use aerospike_buf::{BufferPool, Key, Record, Value};
use aerospike_cluster::{Address, Cluster, ClusterConfig, Tender};
use aerospike_proto::Op;
use aerospike_txn::Transaction;

use crate::batch::{execute_batch_read, BatchReadRequest, BatchResult};
use crate::command::{self, Action};
use crate::policy::{BatchPolicy, ClientPolicy, Policy, ScanPolicy};
use crate::scan;

/// How many scratch write-buffers the client keeps on hand for the
/// single-record command path (spec §9).
const COMMAND_BUFFER_POOL_SIZE: usize = 16;

pub struct Client {
    cluster: Arc<Cluster>,
    buffer_pool: BufferPool,
    stop: Arc<AtomicBool>,
    tend_thread: Option<JoinHandle<()>>,
}

impl Client {
    /// Connects to the cluster and starts the tend thread (spec §4.5:
    /// the tender runs on its own interval independent of command
    /// traffic).
    pub fn connect(policy: &ClientPolicy, seeds: Vec<Address>) -> Result<Self> {
        let config = ClusterConfig {
            tend_interval: policy.tend_interval,
            connect_timeout: policy.conn_timeout,
            initial_connect_timeout: Duration::from_secs(30).max(policy.conn_timeout),
            min_conns_per_node: policy.min_conns_per_node,
            max_conns_per_node: policy.max_conns_per_node,
            max_socket_idle: Duration::from_secs(policy.max_socket_idle_sec as u64),
            error_rate_cap: policy.max_error_rate,
            info_failure_removal_threshold: 5,
        };
        let cluster = Arc::new(Cluster::new(seeds, config, None));

        let stop = Arc::new(AtomicBool::new(false));
        let tend_cluster = cluster.clone();
        let tend_stop = stop.clone();
        let tend_interval = cluster.config.tend_interval;
        let connect_timeout = cluster.config.connect_timeout;

        let tend_thread = thread::spawn(move || {
            let tender = Tender::new(connect_timeout, connect_timeout);
            while !tend_stop.load(Ordering::Acquire) {
                let _ = tender.tend_once(&tend_cluster);
                thread::sleep(tend_interval);
            }
        });

        Ok(Self {
            cluster,
            buffer_pool: BufferPool::new(COMMAND_BUFFER_POOL_SIZE),
            stop,
            tend_thread: Some(tend_thread),
        })
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn get(
        &self,
        policy: &Policy,
        namespace: &str,
        set: &str,
        key: &Key,
        bin_names: Vec<String>,
    ) -> Result<Option<Record>> {
        match command::execute(&self.cluster, &self.buffer_pool, policy, namespace, set, key, Action::Get { bin_names }) {
            Ok(result) => Ok(result.record),
            Err(e) if e.kind() == ErrorKind::RecordNotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn put(
        &self,
        policy: &Policy,
        namespace: &str,
        set: &str,
        key: &Key,
        bins: Vec<(String, Value)>,
    ) -> Result<()> {
        command::execute(
            &self.cluster,
            &self.buffer_pool,
            policy,
            namespace,
            set,
            key,
            Action::Put {
                bins,
                ttl: aerospike_buf::Ttl::ServerDefault,
            },
        )?;
        Ok(())
    }

    /// Returns whether the record existed before the delete.
    pub fn delete(&self, policy: &Policy, namespace: &str, set: &str, key: &Key) -> Result<bool> {
        match command::execute(&self.cluster, &self.buffer_pool, policy, namespace, set, key, Action::Delete) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::RecordNotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn operate(
        &self,
        policy: &Policy,
        namespace: &str,
        set: &str,
        key: &Key,
        ops: Vec<Op>,
    ) -> Result<Option<Record>> {
        match command::execute(&self.cluster, &self.buffer_pool, policy, namespace, set, key, Action::Operate { ops }) {
            Ok(result) => Ok(result.record),
            Err(e) if e.kind() == ErrorKind::RecordNotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Reads `key` and folds the result into `txn`'s read-version set
    /// (spec §4.9: a transaction's verify step compares these against
    /// the record's generation at commit time). A multi-record
    /// transaction's footprint is the caller's responsibility to route
    /// consistently — `aerospike-txn` tracks digests, not full keys,
    /// so it cannot replay these reads itself; this is the one place
    /// that bridges the two (see DESIGN.md's transaction section).
    pub fn get_in_txn(
        &self,
        txn: &mut Transaction,
        policy: &Policy,
        namespace: &str,
        set: &str,
        key: &Key,
        bin_names: Vec<String>,
    ) -> Result<Option<Record>> {
        let record = self.get(policy, namespace, set, key, bin_names)?;
        if let Some(record) = &record {
            txn.record_read(*key.digest(), record.generation);
        }
        Ok(record)
    }

    /// Writes `bins` to `key` and folds it into `txn`'s write set. A
    /// write that fails with `in_doubt` set (spec §7: the socket write
    /// landed but the response never came back) sticks that flag on
    /// the transaction too, per spec §8 invariant #8.
    pub fn put_in_txn(
        &self,
        txn: &mut Transaction,
        policy: &Policy,
        namespace: &str,
        set: &str,
        key: &Key,
        bins: Vec<(String, Value)>,
    ) -> Result<()> {
        let result = self.put(policy, namespace, set, key, bins);
        if let Err(e) = &result {
            if e.in_doubt() {
                txn.mark_in_doubt();
            }
        }
        txn.record_write(*key.digest());
        result
    }

    /// Deletes `key` and folds it into `txn`'s write set.
    pub fn delete_in_txn(&self, txn: &mut Transaction, policy: &Policy, namespace: &str, set: &str, key: &Key) -> Result<bool> {
        let result = self.delete(policy, namespace, set, key);
        if let Err(e) = &result {
            if e.in_doubt() {
                txn.mark_in_doubt();
            }
        }
        txn.record_write(*key.digest());
        result
    }

    /// Applies a server-side UDF to the record at `key` (spec §4.6
    /// Non-goals lift) and returns its result, decoded the same way a
    /// read's bins are.
    pub fn udf_apply(
        &self,
        policy: &Policy,
        namespace: &str,
        set: &str,
        key: &Key,
        package: &str,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Option<Record>> {
        let action = Action::Udf {
            package: package.to_owned(),
            function: function.to_owned(),
            args,
        };
        match command::execute(&self.cluster, &self.buffer_pool, policy, namespace, set, key, action) {
            Ok(result) => Ok(result.record),
            Err(e) if e.kind() == ErrorKind::RecordNotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn batch_get(
        &self,
        policy: &BatchPolicy,
        namespace: &str,
        requests: Vec<BatchReadRequest>,
    ) -> Result<Vec<BatchResult>> {
        execute_batch_read(&self.cluster, policy, namespace, requests)
    }

    pub fn scan(
        &self,
        policy: &ScanPolicy,
        namespace: &str,
        set: &str,
        bin_names: &[String],
        on_record: impl FnMut(Record),
    ) -> Result<()> {
        scan::scan(&self.cluster, policy, namespace, set, bin_names, on_record)
    }

    /// Stops the tend thread and closes every node's connection
    /// pools. Safe to call once; subsequent calls are no-ops since
    /// the handle has already been taken.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.tend_thread.take() {
            let _ = handle.join();
        }
        self.cluster.close();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}
