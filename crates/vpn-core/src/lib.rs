//! Boot assembly and the top-level supervisor loop for the VPN control
//! plane binary.

#![forbid(unsafe_code)]

pub mod error;
pub mod supervisor;

pub use error::{CoreError, Result};
pub use supervisor::Supervisor;
