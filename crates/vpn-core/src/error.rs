//! Top-level error type for the control plane binary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] vpn_config::ConfigError),

    #[error(transparent)]
    Storage(#[from] vpn_storage::Error),

    #[error(transparent)]
    WireGuard(#[from] vpn_wireguard::WireGuardError),

    #[error(transparent)]
    Xray(#[from] vpn_xray::XrayError),

    #[error(transparent)]
    PeerOps(#[from] vpn_peerops::PeerOpsError),

    #[error(transparent)]
    Observe(#[from] vpn_observe::ObserveError),

    #[error("IP pool error: {0}")]
    IpPool(#[from] vpn_network::IpPoolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
