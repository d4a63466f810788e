//! Domain types shared by every component that reads or writes peer and
//! user state.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vpn_wireguard::{AmneziaJitter, PresharedKey, PrivateKey, PublicKey};

/// Surrogate id for a [`User`], stable for the lifetime of the account.
pub type UserId = i64;

/// Surrogate id for a [`Peer`], monotonic per installation.
pub type PeerId = i64;

/// Account-level lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Created,
    IpBlocked,
    AccountBlocked,
    TimeExpired,
    Connected,
    Disconnected,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A principal identified by a stable external id (e.g. a messaging
/// platform's user id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub external_id: String,
    pub display_name: String,
    pub status: UserStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

/// Which dataplane a [`Peer`] rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerKind {
    Wireguard,
    AmneziaWireguard,
    Xray,
}

impl PeerKind {
    #[must_use]
    pub const fn is_wireguard(self) -> bool {
        matches!(self, Self::Wireguard | Self::AmneziaWireguard)
    }
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-peer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerStatus {
    Disconnected,
    Connected,
    TimeExpired,
    Blocked,
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Maximum length of a peer's display name.
pub const PEER_NAME_MAX_LEN: usize = 16;

/// Fields common to every peer, regardless of dataplane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub user_id: UserId,
    pub name: String,
    pub kind: PeerKind,
    pub status: PeerStatus,
    pub active_until: Option<DateTime<Utc>>,
}

/// A WireGuard (or Amnezia) [`Peer`]'s protocol-specific extension row.
#[derive(Clone, Serialize, Deserialize)]
pub struct WireguardPeer {
    pub peer: Peer,
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
    pub preshared_key: PresharedKey,
    pub shared_ip: Ipv4Addr,
    pub is_amnezia: bool,
    pub jitter: Option<AmneziaJitter>,
}

impl fmt::Debug for WireguardPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireguardPeer")
            .field("peer", &self.peer)
            .field("public_key", &self.public_key)
            .field("shared_ip", &self.shared_ip)
            .field("is_amnezia", &self.is_amnezia)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

/// An Xray [`Peer`]'s protocol-specific extension row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XrayPeer {
    pub peer: Peer,
    pub inbound_id: i64,
    pub flow: String,
}

/// A peer together with its protocol-specific extension, for code that
/// needs to dispatch on dataplane kind without re-querying storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerRecord {
    Wireguard(WireguardPeer),
    Xray(XrayPeer),
}

impl PeerRecord {
    #[must_use]
    pub fn peer(&self) -> &Peer {
        match self {
            Self::Wireguard(w) => &w.peer,
            Self::Xray(x) => &x.peer,
        }
    }

    #[must_use]
    pub fn kind(&self) -> PeerKind {
        self.peer().kind
    }
}
