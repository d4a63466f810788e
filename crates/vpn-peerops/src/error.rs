//! Error types for peer dispatch operations.

use thiserror::Error;

/// Result type alias for peer dispatch operations.
pub type Result<T> = std::result::Result<T, PeerOpsError>;

/// Errors that can occur while enabling or disabling a peer.
#[derive(Debug, Error)]
pub enum PeerOpsError {
    #[error(transparent)]
    WireGuard(#[from] vpn_wireguard::WireGuardError),

    #[error(transparent)]
    Xray(#[from] vpn_xray::XrayError),

    #[error(transparent)]
    Storage(#[from] vpn_storage::Error),
}
