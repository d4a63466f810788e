//! A thread-safe FIFO of free tunnel addresses.

use std::collections::{HashSet, VecDeque};
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use parking_lot::Mutex;

use crate::error::{IpPoolError, Result};

/// Addresses a subnet reserves regardless of role: network address, the
/// gateway's own address, and the broadcast address.
pub const RESERVED_LAST_OCTETS: [u8; 3] = [0, 1, 255];

/// Pool of tunnel IPv4 addresses available for assignment to new WireGuard
/// peers.
///
/// `acquire` pops the head of the queue; `release` pushes an address back
/// onto the tail. Both are O(1) and serialized by an internal lock, so
/// concurrent `add_wg_peer` calls contend for addresses safely.
#[derive(Debug)]
pub struct IpQueue {
    free: Mutex<VecDeque<Ipv4Addr>>,
}

impl IpQueue {
    /// Builds a queue directly from a list of free addresses.
    #[must_use]
    pub fn new(free: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self { free: Mutex::new(free.into_iter().collect()) }
    }

    /// Builds a queue as `all_addresses_in_subnet − used − reserved`, the
    /// boot-time recovery procedure for rebuilding the pool from storage.
    /// Reserved addresses are identified by their last octet (`.0`, `.1`,
    /// `.255` by default).
    pub fn from_subnet(subnet: Ipv4Net, used: &HashSet<Ipv4Addr>, reserved_last_octets: &[u8]) -> Result<Self> {
        if subnet.prefix_len() > 30 {
            return Err(IpPoolError::InvalidSubnet(format!(
                "subnet {subnet} is too small to host any host addresses"
            )));
        }
        let free = subnet
            .hosts()
            .filter(|ip| !reserved_last_octets.contains(&ip.octets()[3]))
            .filter(|ip| !used.contains(ip))
            .collect::<VecDeque<_>>();
        Ok(Self { free: Mutex::new(free) })
    }

    /// Pops one address off the pool.
    pub fn acquire(&self) -> Result<Ipv4Addr> {
        self.free.lock().pop_front().ok_or(IpPoolError::Exhausted)
    }

    /// Returns an address to the pool.
    pub fn release(&self, ip: Ipv4Addr) {
        self.free.lock().push_back(ip);
    }

    /// Number of addresses currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}
