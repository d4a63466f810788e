//! Client for the Xray/VLESS-Reality dataplane's remote admin panel.
//!
//! Unlike the WireGuard dataplane, Xray peers are not managed by editing a
//! local config file — they live behind a stateful HTTP admin API that this
//! crate logs into and drives.

#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod worker;

pub use error::{Result, XrayError};
pub use model::{ClientRecord, Inbound, RealityPublicSettings};
pub use worker::{XrayConfig, XrayWorker};
