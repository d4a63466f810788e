//! The relational store backing the control plane: users, peers, and their
//! protocol-specific extensions, plus the foreign-key invariants that tie
//! them together.

#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod schema;
pub mod store;

pub use error::{Error, Result};
pub use model::{
    Peer, PeerId, PeerKind, PeerRecord, PeerStatus, User, UserId, UserStatus, WireguardPeer,
    XrayPeer, PEER_NAME_MAX_LEN,
};
pub use store::Storage;
