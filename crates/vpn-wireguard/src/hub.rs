//! The WireGuard hub: an in-memory mirror of the interface config file plus
//! a transactional write + live-sync procedure against the running
//! interface.

use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{InterfaceFile, PeerStanza};
use crate::error::{Result, WireGuardError};
use crate::interface::WgControl;
use crate::keys::PublicKey;

struct HubState {
    file: InterfaceFile,
}

/// Owns one WireGuard (or Amnezia) interface: its on-disk config file and
/// the live kernel interface it drives.
///
/// Every mutating method follows the write-then-sync contract: the
/// in-memory model is mutated, serialized to `config_path`, and then
/// `sync_config` is invoked, all under a single lock so no interleaving
/// file-level operation on the same interface can occur. Setting
/// `auto_sync = false` (used in tests) disables the final sync step; the
/// caller must invoke [`WireGuardHub::sync_config`] explicitly.
pub struct WireGuardHub<C: WgControl> {
    interface_name: String,
    config_path: PathBuf,
    control: C,
    auto_sync: bool,
    is_amnezia: bool,
    state: Mutex<HubState>,
}

impl<C: WgControl> WireGuardHub<C> {
    /// Loads the interface config from `config_path`. The interface name is
    /// derived from the file's basename, matching `wg-quick`'s convention.
    pub async fn load(config_path: impl Into<PathBuf>, control: C, auto_sync: bool, is_amnezia: bool) -> Result<Self> {
        let config_path = config_path.into();
        let interface_name = config_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| WireGuardError::ParseFailed("config path has no file stem".to_string()))?
            .to_string();
        let contents = tokio::fs::read_to_string(&config_path).await?;
        let file = InterfaceFile::parse(&contents)?;
        Ok(Self {
            interface_name,
            config_path,
            control,
            auto_sync,
            is_amnezia,
            state: Mutex::new(HubState { file }),
        })
    }

    #[must_use]
    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    #[must_use]
    pub fn is_amnezia(&self) -> bool {
        self.is_amnezia
    }

    /// Appends a peer stanza. Errors if a peer with this public key is
    /// already tracked.
    pub async fn add_peer(&self, peer: PeerStanza) -> Result<()> {
        let mut guard = self.state.lock().await;
        if guard.file.peers.iter().any(|p| p.public_key == peer.public_key) {
            warn!(interface = %self.interface_name, peer = %peer.name, "add_peer: public key already tracked");
            return Err(WireGuardError::PeerExists(peer.public_key.to_base64()));
        }
        info!(interface = %self.interface_name, peer = %peer.name, "adding peer");
        guard.file.peers.push(peer);
        self.write_then_sync(&guard).await
    }

    /// Removes a peer stanza. Errors if no such peer is tracked.
    pub async fn delete_peer(&self, public_key: &PublicKey) -> Result<()> {
        let mut guard = self.state.lock().await;
        let before = guard.file.peers.len();
        guard.file.peers.retain(|p| &p.public_key != public_key);
        if guard.file.peers.len() == before {
            warn!(interface = %self.interface_name, "delete_peer: public key not tracked");
            return Err(WireGuardError::PeerNotFound(public_key.to_base64()));
        }
        info!(interface = %self.interface_name, "deleted peer");
        self.write_then_sync(&guard).await
    }

    /// Enables a single peer's stanza.
    pub async fn enable_peer(&self, public_key: &PublicKey) -> Result<()> {
        self.set_enabled(&[public_key.clone()], true).await
    }

    /// Disables a single peer's stanza.
    pub async fn disable_peer(&self, public_key: &PublicKey) -> Result<()> {
        self.set_enabled(&[public_key.clone()], false).await
    }

    /// Enables a batch of peers, atomic with respect to the write-then-sync
    /// step: every stanza is flipped before the single resulting sync call.
    pub async fn enable_peers(&self, public_keys: &[PublicKey]) -> Result<()> {
        self.set_enabled(public_keys, true).await
    }

    /// Disables a batch of peers. See [`WireGuardHub::enable_peers`].
    pub async fn disable_peers(&self, public_keys: &[PublicKey]) -> Result<()> {
        self.set_enabled(public_keys, false).await
    }

    async fn set_enabled(&self, public_keys: &[PublicKey], enabled: bool) -> Result<()> {
        let mut guard = self.state.lock().await;
        for key in public_keys {
            let peer = guard
                .file
                .peers
                .iter_mut()
                .find(|p| &p.public_key == key)
                .ok_or_else(|| WireGuardError::PeerNotFound(key.to_base64()))?;
            peer.enabled = enabled;
        }
        debug!(interface = %self.interface_name, count = public_keys.len(), enabled, "flipped peer stanzas");
        self.write_then_sync(&guard).await
    }

    /// Returns whether a tracked peer's stanza is currently enabled.
    pub async fn get_peer_enabled(&self, public_key: &PublicKey) -> Result<bool> {
        let guard = self.state.lock().await;
        guard
            .file
            .peers
            .iter()
            .find(|p| &p.public_key == public_key)
            .map(|p| p.enabled)
            .ok_or_else(|| WireGuardError::PeerNotFound(public_key.to_base64()))
    }

    /// Returns a clone of a tracked peer's stanza.
    pub async fn get_peer(&self, public_key: &PublicKey) -> Option<PeerStanza> {
        let guard = self.state.lock().await;
        guard.file.peers.iter().find(|p| &p.public_key == public_key).cloned()
    }

    /// Reconciles the running interface with the current file contents,
    /// conceptually `wg-quick strip` followed by `wg syncconf`.
    pub async fn sync_config(&self) -> Result<()> {
        debug!(interface = %self.interface_name, "syncing live interface from config file");
        self.control
            .sync_config(&self.interface_name, self.config_path.to_string_lossy().as_ref())
            .await
    }

    async fn write_then_sync(&self, guard: &tokio::sync::MutexGuard<'_, HubState>) -> Result<()> {
        let rendered = guard.file.render();
        tokio::fs::write(&self.config_path, rendered).await?;
        if self.auto_sync {
            self.sync_config().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterfaceSection;
    use crate::interface::FakeWgControl;
    use crate::keys::{FakeKeyTool, KeyTool};
    use crate::types::AllowedIp;
    use std::net::Ipv4Addr;

    async fn fresh_hub() -> (WireGuardHub<FakeWgControl>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wg0.conf");
        let interface =
            InterfaceSection::new(crate::keys::PrivateKey::generate(), AllowedIp::from_cidr("10.0.0.1/24").unwrap());
        let file = InterfaceFile::new(interface);
        tokio::fs::write(&path, file.render()).await.unwrap();
        let hub = WireGuardHub::load(&path, FakeWgControl::new(), true, false).await.unwrap();
        (hub, dir)
    }

    async fn new_stanza(name: &str, ip: Ipv4Addr) -> PeerStanza {
        let triple = FakeKeyTool.generate_triple().await.unwrap();
        PeerStanza::new(name, triple.public, triple.preshared, ip)
    }

    #[tokio::test]
    async fn add_then_get_peer() {
        let (hub, _dir) = fresh_hub().await;
        let stanza = new_stanza("alice_1", Ipv4Addr::new(10, 0, 0, 2)).await;
        let key = stanza.public_key;
        hub.add_peer(stanza).await.unwrap();

        let fetched = hub.get_peer(&key).await.unwrap();
        assert_eq!(fetched.name, "alice_1");
        assert!(fetched.enabled);
    }

    #[tokio::test]
    async fn add_duplicate_public_key_fails() {
        let (hub, _dir) = fresh_hub().await;
        let stanza = new_stanza("alice_1", Ipv4Addr::new(10, 0, 0, 2)).await;
        let dup = stanza.clone();
        hub.add_peer(stanza).await.unwrap();
        assert!(matches!(hub.add_peer(dup).await, Err(WireGuardError::PeerExists(_))));
    }

    #[tokio::test]
    async fn disable_then_enable_peer() {
        let (hub, _dir) = fresh_hub().await;
        let stanza = new_stanza("alice_1", Ipv4Addr::new(10, 0, 0, 2)).await;
        let key = stanza.public_key;
        hub.add_peer(stanza).await.unwrap();

        hub.disable_peer(&key).await.unwrap();
        assert!(!hub.get_peer_enabled(&key).await.unwrap());

        hub.enable_peer(&key).await.unwrap();
        assert!(hub.get_peer_enabled(&key).await.unwrap());
    }

    #[tokio::test]
    async fn delete_missing_peer_fails() {
        let (hub, _dir) = fresh_hub().await;
        let ghost = FakeKeyTool.generate_private_key().await.unwrap().public_key();
        assert!(matches!(hub.delete_peer(&ghost).await, Err(WireGuardError::PeerNotFound(_))));
    }

    #[tokio::test]
    async fn enable_missing_peer_fails() {
        let (hub, _dir) = fresh_hub().await;
        let ghost = FakeKeyTool.generate_private_key().await.unwrap().public_key();
        assert!(matches!(hub.enable_peer(&ghost).await, Err(WireGuardError::PeerNotFound(_))));
    }

    #[tokio::test]
    async fn mutations_sync_when_auto_sync_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wg0.conf");
        let interface =
            InterfaceSection::new(crate::keys::PrivateKey::generate(), AllowedIp::from_cidr("10.0.0.1/24").unwrap());
        tokio::fs::write(&path, InterfaceFile::new(interface).render()).await.unwrap();
        let control = FakeWgControl::new();
        let hub = WireGuardHub::load(&path, control.clone(), true, false).await.unwrap();

        let stanza = new_stanza("bob_1", Ipv4Addr::new(10, 0, 0, 3)).await;
        hub.add_peer(stanza).await.unwrap();

        assert_eq!(control.calls().len(), 1);
    }

    #[tokio::test]
    async fn auto_sync_false_does_not_sync() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wg0.conf");
        let interface =
            InterfaceSection::new(crate::keys::PrivateKey::generate(), AllowedIp::from_cidr("10.0.0.1/24").unwrap());
        tokio::fs::write(&path, InterfaceFile::new(interface).render()).await.unwrap();
        let control = FakeWgControl::new();
        let hub = WireGuardHub::load(&path, control.clone(), false, false).await.unwrap();

        let stanza = new_stanza("bob_1", Ipv4Addr::new(10, 0, 0, 3)).await;
        hub.add_peer(stanza).await.unwrap();

        assert!(control.calls().is_empty());
        hub.sync_config().await.unwrap();
        assert_eq!(control.calls().len(), 1);
    }
}
