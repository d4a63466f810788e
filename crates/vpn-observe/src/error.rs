//! Error types for the observer crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ObserveError>;

#[derive(Debug, Error)]
pub enum ObserveError {
    #[error(transparent)]
    Storage(#[from] vpn_storage::Error),

    #[error(transparent)]
    WireGuard(#[from] vpn_wireguard::WireGuardError),

    #[error(transparent)]
    Xray(#[from] vpn_xray::XrayError),

    #[error(transparent)]
    PeerOps(#[from] vpn_peerops::PeerOpsError),

    #[error("icmp socket setup failed: {0}")]
    IcmpSetup(#[from] std::io::Error),
}
