//! Core types shared by the interface file parser and the hub.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WireGuardError};

/// An allowed IP address or network in CIDR notation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllowedIp {
    network: IpNet,
}

impl AllowedIp {
    #[must_use]
    pub fn new(network: IpNet) -> Self {
        Self { network }
    }

    #[must_use]
    pub fn network(&self) -> &IpNet {
        &self.network
    }

    pub fn from_cidr(s: &str) -> Result<Self> {
        let network = s
            .parse::<IpNet>()
            .map_err(|e| WireGuardError::InvalidAddress(e.to_string()))?;
        Ok(Self { network })
    }

    /// A single host address advertised as a `/32`, the shape every peer's
    /// `AllowedIPs` takes in the generated hub stanza.
    #[must_use]
    pub fn host32(addr: Ipv4Addr) -> Self {
        Self { network: IpNet::new(IpAddr::V4(addr), 32).expect("/32 is always valid") }
    }
}

impl FromStr for AllowedIp {
    type Err = WireGuardError;
    fn from_str(s: &str) -> Result<Self> {
        Self::from_cidr(s)
    }
}

impl fmt::Display for AllowedIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.network)
    }
}

/// A WireGuard peer endpoint (`host:port`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    address: SocketAddr,
}

impl Endpoint {
    #[must_use]
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }

    #[must_use]
    pub fn from_ip_port(ip: IpAddr, port: u16) -> Self {
        Self { address: SocketAddr::new(ip, port) }
    }

    #[must_use]
    pub fn address(&self) -> &SocketAddr {
        &self.address
    }
}

impl FromStr for Endpoint {
    type Err = WireGuardError;
    fn from_str(s: &str) -> Result<Self> {
        let address = s
            .parse::<SocketAddr>()
            .map_err(|e| WireGuardError::InvalidAddress(e.to_string()))?;
        Ok(Self { address })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Amnezia jitter parameters carried by an Amnezia WireGuard peer.
///
/// Ranges are enforced at construction: `Jc` in `[3,127]`, `Jmin` in
/// `[3,700]`, `Jmax` in `(Jmin,1270]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmneziaJitter {
    pub jc: u16,
    pub jmin: u16,
    pub jmax: u16,
}

impl AmneziaJitter {
    pub fn new(jc: u16, jmin: u16, jmax: u16) -> Result<Self> {
        if !(3..=127).contains(&jc) {
            return Err(WireGuardError::InvalidJitter(format!("Jc={jc} outside [3,127]")));
        }
        if !(3..=700).contains(&jmin) {
            return Err(WireGuardError::InvalidJitter(format!("Jmin={jmin} outside [3,700]")));
        }
        if !(jmin + 1..=1270).contains(&jmax) {
            return Err(WireGuardError::InvalidJitter(format!(
                "Jmax={jmax} outside (Jmin={jmin},1270]"
            )));
        }
        Ok(Self { jc, jmin, jmax })
    }

    /// Draws jitter parameters uniformly at random within their valid
    /// ranges, used when a new Amnezia peer is provisioned without explicit
    /// values.
    #[must_use]
    pub fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let jc = rng.gen_range(3..=127);
        let jmin = rng.gen_range(3..=700);
        let jmax = rng.gen_range((jmin + 1)..=1270);
        Self { jc, jmin, jmax }
    }
}

/// The server-side Amnezia obfuscation header magic values, configured once
/// per interface from `[WireguardServer] Junk` and shared by every peer's
/// generated client config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmneziaHeaders {
    pub s1: u16,
    pub s2: u16,
    pub h1: u32,
    pub h2: u32,
    pub h3: u32,
    pub h4: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_rejects_jc_out_of_range() {
        assert!(AmneziaJitter::new(2, 10, 20).is_err());
        assert!(AmneziaJitter::new(128, 10, 20).is_err());
    }

    #[test]
    fn jitter_rejects_jmax_not_greater_than_jmin() {
        assert!(AmneziaJitter::new(10, 100, 100).is_err());
        assert!(AmneziaJitter::new(10, 100, 1271).is_err());
    }

    #[test]
    fn jitter_accepts_boundary_values() {
        assert!(AmneziaJitter::new(3, 3, 4).is_ok());
        assert!(AmneziaJitter::new(127, 700, 1270).is_ok());
    }

    #[test]
    fn random_jitter_is_always_valid() {
        for _ in 0..50 {
            let j = AmneziaJitter::random();
            assert!(AmneziaJitter::new(j.jc, j.jmin, j.jmax).is_ok());
        }
    }

    #[test]
    fn allowed_ip_host32_renders_as_slash_32() {
        let ip = AllowedIp::host32(Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(ip.to_string(), "10.0.0.7/32");
    }
}
