//! Error types for the persistent store.

use thiserror::Error;

use crate::model::{PeerId, UserId};

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or writing persisted state.
#[derive(Debug, Error)]
pub enum Error {
    /// No user with this surrogate id.
    #[error("user not found: {id}")]
    UserNotFound {
        /// The user id that was not found.
        id: UserId,
    },

    /// No peer with this surrogate id.
    #[error("peer not found: {id}")]
    PeerNotFound {
        /// The peer id that was not found.
        id: PeerId,
    },

    /// No WireGuard peer owns this tunnel address.
    #[error("no wireguard peer owns {0}")]
    IpNotFound(std::net::Ipv4Addr),

    /// Adding a peer whose name duplicates an existing peer of the same user
    /// (peer names are unique per user).
    #[error("peer name {name:?} is already used by another peer of user {user_id}")]
    PeerNameTaken {
        /// The user the duplicate name was attempted under.
        user_id: UserId,
        /// The name that was already taken.
        name: String,
    },

    /// A peer name was too long.
    #[error("peer name {0:?} is {1} characters, must be under {max}", max = crate::model::PEER_NAME_MAX_LEN)]
    PeerNameTooLong(String, usize),

    /// Underlying SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored WireGuard key field failed to decode.
    #[error("corrupted key material for peer {0}: {1}")]
    CorruptKey(PeerId, vpn_wireguard::WireGuardError),
}
