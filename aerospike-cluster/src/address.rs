// A node's reachable addresses (spec §3 Address). A node may have
// several: the seed address, `services`-reported alternates, and
// `services-alternate` addresses for clients behind NAT.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host_name: String,
    pub ip: IpAddr,
    pub port: u16,
    pub tls_name: Option<String>,
}

impl Address {
    pub fn new(host_name: impl Into<String>, ip: IpAddr, port: u16) -> Self {
        Self {
            host_name: host_name.into(),
            ip,
            port,
            tls_name: None,
        }
    }

    pub fn with_tls_name(mut self, tls_name: impl Into<String>) -> Self {
        self.tls_name = Some(tls_name.into());
        self
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// An address list with an atomically-promotable primary. Any worker
/// that connects successfully on an alternate may promote it; the
/// primary index is a hint, not a lock (spec §3 Address, §4.3).
#[derive(Debug)]
pub struct AddressList {
    addresses: Vec<Address>,
    primary_index: AtomicUsize,
}

impl AddressList {
    pub fn new(addresses: Vec<Address>) -> Self {
        assert!(!addresses.is_empty(), "a node needs at least one address");
        Self {
            addresses,
            primary_index: AtomicUsize::new(0),
        }
    }

    pub fn primary(&self) -> &Address {
        &self.addresses[self.primary_index.load(Ordering::Acquire) % self.addresses.len()]
    }

    /// Iterates addresses starting at the current primary, wrapping
    /// around — the order the sync command loop tries them in (spec
    /// §4.3 Node: "tries the current primary address; on failure it
    /// tries the remaining addresses in order").
    pub fn in_try_order(&self) -> impl Iterator<Item = &Address> {
        let start = self.primary_index.load(Ordering::Acquire) % self.addresses.len();
        let n = self.addresses.len();
        (0..n).map(move |i| &self.addresses[(start + i) % n])
    }

    /// Promotes the address at `index` (as returned by
    /// `in_try_order`'s enumeration) to primary. Racy promotions from
    /// concurrent workers are fine: worst case two workers both
    /// "win" and the index just bounces, never corrupting state.
    pub fn promote(&self, addr: &Address) {
        if let Some(idx) = self.addresses.iter().position(|a| a == addr) {
            self.primary_index.store(idx, Ordering::Release);
        }
    }

    pub fn all(&self) -> &[Address] {
        &self.addresses
    }

    pub fn replace_all(&mut self, addresses: Vec<Address>) {
        assert!(!addresses.is_empty());
        self.addresses = addresses;
        self.primary_index.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new(format!("host{n}"), IpAddr::from([127, 0, 0, n]), 3000)
    }

    #[test]
    fn try_order_starts_at_primary() {
        let list = AddressList::new(vec![addr(1), addr(2), addr(3)]);
        list.promote(&addr(2));
        let order: Vec<_> = list.in_try_order().cloned().collect();
        assert_eq!(order, vec![addr(2), addr(3), addr(1)]);
    }

    #[test]
    fn promote_unknown_address_is_a_no_op() {
        let list = AddressList::new(vec![addr(1), addr(2)]);
        list.promote(&addr(9));
        assert_eq!(list.primary(), &addr(1));
    }
}
