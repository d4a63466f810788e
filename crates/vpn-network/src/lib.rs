//! Tunnel IP address pool management for the WireGuard/Amnezia dataplane.
//!
//! The control plane hands out one IPv4 address per WireGuard peer from a
//! fixed subnet. [`IpQueue`] tracks which addresses are currently free.

#![forbid(unsafe_code)]

pub mod error;
pub mod ip_queue;

pub use error::IpPoolError;
pub use ip_queue::{IpQueue, RESERVED_LAST_OCTETS};
