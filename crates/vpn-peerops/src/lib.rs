//! Pure dispatcher that routes enable/disable calls to the dataplane owning
//! each peer (WireGuard/Amnezia via the interface hub, Xray via its admin
//! API), keeping storage status in sync with the dataplane call outcome.

#![forbid(unsafe_code)]

pub mod error;
pub mod ops;

pub use error::{PeerOpsError, Result};
pub use ops::{disable_peers, enable_peers};
