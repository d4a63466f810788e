//! Error types for the WireGuard hub.

use thiserror::Error;

/// Errors that can occur during WireGuard key and interface operations.
#[derive(Debug, Error)]
pub enum WireGuardError {
    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid base64 encoding.
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    /// Invalid key length.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// Invalid CIDR / address literal.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A peer with this public key is already present in the hub.
    #[error("peer already exists: {0}")]
    PeerExists(String),

    /// No peer with this public key is tracked by the hub.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// Jitter parameter outside the range required for the Amnezia variant.
    #[error("amnezia jitter parameter out of range: {0}")]
    InvalidJitter(String),

    /// The on-disk interface file failed to parse.
    #[error("failed to parse interface file: {0}")]
    ParseFailed(String),

    /// Invoking the `wg`/`awg` CLI failed.
    #[error("wireguard backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Filesystem I/O on the interface file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for fallible WireGuard hub operations.
pub type Result<T> = std::result::Result<T, WireGuardError>;
