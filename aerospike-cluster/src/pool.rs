// Per-node connection pools (spec §3 Connection, §4.4).
//
// A pool is a bounded queue with `(min, max)` bounds and `opened`/
// `closed` counters. Checkout pops the head, discarding anything that
// has been idle too long or that shows a stray readable byte (server
// push / half-close); if the queue is empty and the pool has room it
// opens a new socket, otherwise the caller is told there is no
// capacity (sync path) — the async reactor's delay queue lives in
// `aerospike-client` instead.

use std::collections::VecDeque;
use std::io::Read;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use aerospike_base::{err, Error, ErrorKind, Result};
use parking_lot::Mutex;

use crate::address::Address;

/// A pooled socket. Invariant (spec §3 Connection): a `Connection` is
/// in exactly one of in-pool, checked-out, or closing — enforced by
/// ownership: checkout moves it out of the queue, and it is either
/// dropped (closing) or pushed back (in-pool).
pub struct Connection {
    stream: TcpStream,
    last_used: Instant,
    pipeline: bool,
}

impl Connection {
    pub fn connect(addr: &Address, connect_timeout: Duration) -> Result<Self> {
        let std_addr = std::net::SocketAddr::new(addr.ip, addr.port);
        let stream = TcpStream::connect_timeout(&std_addr, connect_timeout)
            .map_err(|e| Error::new(ErrorKind::Connection, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::new(ErrorKind::Connection, e))?;
        Ok(Self {
            stream,
            last_used: Instant::now(),
            pipeline: false,
        })
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    pub fn mark_pipeline(&mut self) {
        self.pipeline = true;
    }

    pub fn is_pipeline(&self) -> bool {
        self.pipeline
    }

    /// Non-blocking peek used on checkout: a readable byte with
    /// nobody expecting one means the peer pushed something
    /// unsolicited (or closed), either way the connection is no
    /// longer trustworthy (spec §4.4).
    fn looks_stale(&self) -> bool {
        let mut buf = [0u8; 1];
        match self.stream.set_nonblocking(true) {
            Ok(()) => {}
            Err(_) => return true,
        }
        let result = match self.stream.peek(&mut buf) {
            Ok(0) => true,      // EOF
            Ok(_) => true,      // stray byte
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(_) => true,
        };
        let _ = self.stream.set_nonblocking(false);
        result
    }
}

pub struct PoolCounters {
    pub opened: AtomicU64,
    pub closed: AtomicU64,
}

impl Default for PoolCounters {
    fn default() -> Self {
        Self {
            opened: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        }
    }
}

pub struct ConnectionPool {
    idle: Mutex<VecDeque<Connection>>,
    in_use: AtomicU64,
    min: u32,
    max: u32,
    max_socket_idle: Duration,
    pub counters: PoolCounters,
}

impl ConnectionPool {
    pub fn new(min: u32, max: u32, max_socket_idle: Duration) -> Self {
        Self {
            idle: Mutex::new(VecDeque::new()),
            in_use: AtomicU64::new(0),
            min,
            max,
            max_socket_idle,
            counters: PoolCounters::default(),
        }
    }

    pub fn in_use(&self) -> u64 {
        self.in_use.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.in_use() + self.idle.lock().len() as u64
    }

    /// Pops a usable idle connection, trimming stale/idle-expired ones
    /// along the way; opens a fresh one if the pool has room, else
    /// returns `NoMoreConnections`.
    pub fn checkout(&self, addr: &Address, connect_timeout: Duration) -> Result<Connection> {
        loop {
            let popped = self.idle.lock().pop_front();
            match popped {
                Some(conn) => {
                    if conn.idle_for() > self.max_socket_idle || conn.looks_stale() {
                        self.counters.closed.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    self.in_use.fetch_add(1, Ordering::Relaxed);
                    return Ok(conn);
                }
                None => break,
            }
        }

        if self.total() >= self.max as u64 {
            return Err(err(
                ErrorKind::NoMoreConnections,
                "connection pool exhausted",
            ));
        }

        let conn = Connection::connect(addr, connect_timeout)?;
        self.counters.opened.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    /// Returns a connection to the pool, closing it instead if that
    /// would push the pool over its cap.
    pub fn put_back(&self, mut conn: Connection) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        conn.touch();
        let mut idle = self.idle.lock();
        if idle.len() as u32 + 1 > self.max {
            self.counters.closed.fetch_add(1, Ordering::Relaxed);
            return;
        }
        idle.push_back(conn);
    }

    /// Drops a connection outright (used on protocol/IO error instead
    /// of `put_back`).
    pub fn discard(&self, _conn: Connection) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        self.counters.closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Trims idle connections down to `min`, closing the oldest first.
    /// Called by the tender when a node's health recovers and it no
    /// longer needs every idle connection kept warm.
    pub fn close_all_idle(&self) {
        let mut idle = self.idle.lock();
        let n = idle.len();
        let keep = self.min as usize;
        for _ in keep..n {
            idle.pop_back();
            self.counters.closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Closes every idle connection regardless of `min`. Used for full
    /// shutdown (`Cluster::close`) and node removal, where `min` no
    /// longer applies because nothing will check a connection back out.
    pub fn close_all(&self) {
        let mut idle = self.idle.lock();
        let n = idle.len();
        idle.clear();
        self.counters.closed.fetch_add(n as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checkout_fails_when_empty_and_at_cap() {
        let pool = ConnectionPool::new(0, 0, Duration::from_secs(1));
        let addr = Address::new("x", std::net::IpAddr::from([127, 0, 0, 1]), 1);
        let e = pool
            .checkout(&addr, Duration::from_millis(1))
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::NoMoreConnections);
    }

    #[test]
    fn counters_start_at_zero() {
        let pool = ConnectionPool::new(1, 4, Duration::from_secs(30));
        assert_eq!(pool.counters.opened.load(Ordering::Relaxed), 0);
        assert_eq!(pool.counters.closed.load(Ordering::Relaxed), 0);
        assert_eq!(pool.total(), 0);
    }
}
