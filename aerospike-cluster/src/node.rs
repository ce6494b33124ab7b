// A server peer (spec §3 Node, §4.3). Identified by a stable,
// server-assigned name rather than by address; only the tender
// inserts or deactivates a node, everyone else holds an `Arc<Node>`
// while using it — so the node's own reference count is just the
// `Arc`'s strong count, not a field we track by hand.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::address::{Address, AddressList};
use crate::pool::ConnectionPool;

/// Width of the rolling window (in tend iterations) used to judge
/// node health (spec §4.3: "error rate is tracked over a rolling
/// window of tend iterations").
pub const ERROR_WINDOW: usize = 100;

/// Fixed-size ring counting errors per recent tend iteration. `tick`
/// advances the window, `record_error` bumps the current slot.
struct ErrorWindow {
    slots: [u32; ERROR_WINDOW],
    cursor: usize,
}

impl ErrorWindow {
    fn new() -> Self {
        Self {
            slots: [0; ERROR_WINDOW],
            cursor: 0,
        }
    }

    fn tick(&mut self) {
        self.cursor = (self.cursor + 1) % ERROR_WINDOW;
        self.slots[self.cursor] = 0;
    }

    fn record_error(&mut self) {
        self.slots[self.cursor] += 1;
    }

    fn total(&self) -> u32 {
        self.slots.iter().sum()
    }
}

pub struct Node {
    pub name: String,
    pub addresses: AddressList,
    pub sync_pool: ConnectionPool,
    pub pipeline_pool: ConnectionPool,
    pub rack_id: AtomicU32,
    pub partition_generation: AtomicU32,
    /// Consecutive tend iterations in which `friends_count` came back
    /// zero (spec §4.5 step 5 removal rule ii). Reset to zero as soon
    /// as any peer names this node a friend again.
    pub peers_generation: AtomicU32,
    /// Count of peers that named this node a friend in the most
    /// recent tend iteration (spec §4.5 step 5 removal rule ii).
    pub friends_count: AtomicU32,
    /// Consecutive tend iterations this node has failed to answer an
    /// info request (spec §4.5 step 5 removal rule iii).
    pub consecutive_info_failures: AtomicU32,
    pub active: AtomicBool,
    error_window: Mutex<ErrorWindow>,
    pub error_rate_cap: u32,
    pub timeouts: AtomicU64,
    pub errors: AtomicU64,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        addresses: Vec<Address>,
        min_conns: u32,
        max_conns: u32,
        max_socket_idle: Duration,
        error_rate_cap: u32,
    ) -> Self {
        Self {
            name: name.into(),
            addresses: AddressList::new(addresses),
            sync_pool: ConnectionPool::new(min_conns, max_conns, max_socket_idle),
            pipeline_pool: ConnectionPool::new(0, max_conns, max_socket_idle),
            rack_id: AtomicU32::new(0),
            partition_generation: AtomicU32::new(0),
            peers_generation: AtomicU32::new(0),
            friends_count: AtomicU32::new(0),
            consecutive_info_failures: AtomicU32::new(0),
            active: AtomicBool::new(true),
            error_window: Mutex::new(ErrorWindow::new()),
            error_rate_cap,
            timeouts: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.error_window.lock().record_error();
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.error_window.lock().record_error();
    }

    /// Advances the rolling window by one tend iteration. Called once
    /// per tend, per node.
    pub fn tick_error_window(&self) {
        self.error_window.lock().tick();
    }

    /// A node is unhealthy (and skipped by partition selection) once
    /// its rolling error count exceeds the configured cap (spec
    /// §4.3).
    pub fn is_healthy(&self) -> bool {
        self.error_window.lock().total() <= self.error_rate_cap
    }

    pub fn rack_id(&self) -> u32 {
        self.rack_id.load(Ordering::Relaxed)
    }

    pub fn set_rack_id(&self, id: u32) {
        self.rack_id.store(id, Ordering::Relaxed);
    }

    /// Records how many peers named this node a friend in the
    /// iteration just finished, advancing the zero-friends streak used
    /// by rule ii (spec §4.5 step 5).
    pub fn record_friends_seen(&self, count: u32) {
        self.friends_count.store(count, Ordering::Relaxed);
        if count == 0 {
            self.peers_generation.fetch_add(1, Ordering::Relaxed);
        } else {
            self.peers_generation.store(0, Ordering::Relaxed);
        }
    }

    /// True once a node has gone unreferenced by every peer for at
    /// least two consecutive tend iterations (spec §4.5 step 5 rule
    /// ii's first half; the second half is the caller's partition-table
    /// check).
    pub fn unreferenced_by_peers(&self) -> bool {
        self.peers_generation.load(Ordering::Relaxed) >= 2
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .field("primary", &self.addresses.primary())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::IpAddr;

    fn node() -> Node {
        Node::new(
            "BB9",
            vec![Address::new("h", IpAddr::from([127, 0, 0, 1]), 3000)],
            1,
            8,
            Duration::from_secs(55),
            5,
        )
    }

    #[test]
    fn starts_active_and_healthy() {
        let n = node();
        assert!(n.is_active());
        assert!(n.is_healthy());
    }

    #[test]
    fn unhealthy_once_error_cap_exceeded() {
        let n = node();
        for _ in 0..6 {
            n.record_error();
        }
        assert!(!n.is_healthy());
    }

    #[test]
    fn tick_rolls_old_errors_out_after_a_full_window() {
        let n = node();
        n.record_error();
        for _ in 0..ERROR_WINDOW {
            n.tick_error_window();
        }
        assert!(n.is_healthy());
    }

    #[test]
    fn deactivate_is_observed() {
        let n = node();
        n.deactivate();
        assert!(!n.is_active());
    }

    #[test]
    fn unreferenced_streak_requires_two_consecutive_zero_counts() {
        let n = node();
        n.record_friends_seen(0);
        assert!(!n.unreferenced_by_peers());
        n.record_friends_seen(0);
        assert!(n.unreferenced_by_peers());
        n.record_friends_seen(1);
        assert!(!n.unreferenced_by_peers());
    }
}
