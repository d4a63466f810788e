//! WireGuard/Amnezia dataplane control: key material, the interface file
//! format, live-sync, and the hub that owns both.

pub mod client_config;
pub mod config;
pub mod error;
pub mod hub;
pub mod interface;
pub mod keys;
pub mod types;

pub use client_config::{render_client_config, ClientPeerProfile, ServerProfile};
pub use config::{InterfaceFile, InterfaceSection, PeerStanza};
pub use error::WireGuardError;
pub use hub::WireGuardHub;
pub use interface::{CliWgControl, FakeWgControl, WgControl};
pub use keys::{CliKeyTool, FakeKeyTool, KeyTool, KeyTriple, PresharedKey, PrivateKey, PublicKey, KEY_SIZE};
pub use types::{AllowedIp, AmneziaHeaders, AmneziaJitter, Endpoint};
