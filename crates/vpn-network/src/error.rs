//! Error types for IP pool management.

use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors that can occur while allocating or releasing tunnel addresses.
#[derive(Debug, Clone, Error)]
pub enum IpPoolError {
    /// The pool has no free addresses left to hand out.
    #[error("IP pool exhausted")]
    Exhausted,

    /// The address is not tracked by this pool (outside the subnet, or
    /// reserved).
    #[error("address {0} is not managed by this pool")]
    NotManaged(Ipv4Addr),

    /// The address was already released (or never allocated).
    #[error("address {0} is not currently allocated")]
    NotAllocated(Ipv4Addr),

    /// Invalid subnet configuration.
    #[error("invalid subnet configuration: {0}")]
    InvalidSubnet(String),
}

/// Convenience alias for fallible IP pool operations.
pub type Result<T> = std::result::Result<T, IpPoolError>;
