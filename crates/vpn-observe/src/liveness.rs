//! Liveness probing for WireGuard peers. Xray liveness goes through
//! `XrayWorker::is_connected` directly; there is no on-path ICMP equivalent
//! for that dataplane.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Answers "is this WireGuard tunnel address alive right now". A trait
/// rather than a concrete ICMP client so the connection observer's tests
/// don't need a raw socket.
#[allow(async_fn_in_trait)]
pub trait LivenessProbe: Send + Sync + 'static {
    /// Sends an ICMP echo and waits up to a short fixed timeout for a reply.
    async fn ping(&self, addr: Ipv4Addr) -> bool;
}

/// Real ICMP echo over a shared `surge_ping` client.
pub struct IcmpProbe {
    client: surge_ping::Client,
    timeout: Duration,
}

impl IcmpProbe {
    /// Builds a client bound to an IPv4 ICMP socket. Requires the process to
    /// have `CAP_NET_RAW` (or run as root) on Linux.
    pub fn new(timeout: Duration) -> std::io::Result<Self> {
        let config = surge_ping::Config::default();
        let client = surge_ping::Client::new(&config)?;
        Ok(Self { client, timeout })
    }
}

impl LivenessProbe for IcmpProbe {
    async fn ping(&self, addr: Ipv4Addr) -> bool {
        let payload = [0u8; 8];
        let mut pinger = self.client.pinger(IpAddr::V4(addr), surge_ping::PingIdentifier(rand::random())).await;
        pinger.timeout(self.timeout);
        matches!(pinger.ping(surge_ping::PingSequence(0), &payload).await, Ok(_))
    }
}

/// Test double: a fixed set of addresses that answer as alive.
#[derive(Clone, Default)]
pub struct FakeProbe {
    alive: Arc<Mutex<HashSet<Ipv4Addr>>>,
}

impl FakeProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_alive(&self, addr: Ipv4Addr, alive: bool) {
        let mut set = self.alive.lock();
        if alive {
            set.insert(addr);
        } else {
            set.remove(&addr);
        }
    }
}

impl LivenessProbe for FakeProbe {
    async fn ping(&self, addr: Ipv4Addr) -> bool {
        self.alive.lock().contains(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_probe_reports_only_addresses_marked_alive() {
        let probe = FakeProbe::new();
        let addr = Ipv4Addr::new(10, 8, 0, 2);
        assert!(!probe.ping(addr).await);
        probe.set_alive(addr, true);
        assert!(probe.ping(addr).await);
        probe.set_alive(addr, false);
        assert!(!probe.ping(addr).await);
    }
}
