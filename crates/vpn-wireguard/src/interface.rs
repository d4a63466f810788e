//! Live interface synchronization.
//!
//! `WgControl` is the capability the hub uses to push an on-disk interface
//! file into the running kernel interface without dropping existing
//! connections. The production implementation shells out to `wg syncconf`
//! (or `awg syncconf` for the Amnezia variant); an in-process test double
//! records calls instead of touching a real interface.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, WireGuardError};

/// Capability for synchronizing a rendered interface file into the
/// kernel-level WireGuard interface.
#[allow(async_fn_in_trait)]
pub trait WgControl {
    /// Applies the current contents of `config_path` to `interface_name`
    /// without tearing down existing peer sessions.
    async fn sync_config(&self, interface_name: &str, config_path: &str) -> Result<()>;
}

/// Shells out to `wg syncconf` / `awg syncconf`.
#[derive(Debug, Clone)]
pub struct CliWgControl {
    binary: String,
}

impl CliWgControl {
    #[must_use]
    pub fn wg() -> Self {
        Self { binary: "wg".to_string() }
    }

    #[must_use]
    pub fn awg() -> Self {
        Self { binary: "awg".to_string() }
    }
}

impl WgControl for CliWgControl {
    async fn sync_config(&self, interface_name: &str, config_path: &str) -> Result<()> {
        // `wg syncconf` requires the config in the stripped `wg setconf`
        // format; `wg-quick strip` produces that from the full interface
        // file without needing the interface to exist yet on first boot.
        let strip = tokio::process::Command::new(format!("{}-quick", self.binary))
            .arg("strip")
            .arg(config_path)
            .output()
            .await
            .map_err(|e| WireGuardError::BackendUnavailable(e.to_string()))?;
        if !strip.status.success() {
            return Err(WireGuardError::BackendUnavailable(format!(
                "{}-quick strip exited with {}",
                self.binary, strip.status
            )));
        }

        let stripped_path = format!("{config_path}.stripped");
        tokio::fs::write(&stripped_path, &strip.stdout).await?;

        let sync = tokio::process::Command::new(&self.binary)
            .arg("syncconf")
            .arg(interface_name)
            .arg(&stripped_path)
            .output()
            .await
            .map_err(|e| WireGuardError::BackendUnavailable(e.to_string()))?;

        let _ = tokio::fs::remove_file(&stripped_path).await;

        if !sync.status.success() {
            return Err(WireGuardError::BackendUnavailable(format!(
                "{} syncconf exited with {}",
                self.binary, sync.status
            )));
        }
        Ok(())
    }
}

/// Records every sync call in memory; used by hub tests that run with
/// `auto_sync = true` but must not invoke a real CLI.
#[derive(Debug, Clone, Default)]
pub struct FakeWgControl {
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeWgControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the `(interface_name, config_path)` pairs passed to every
    /// `sync_config` call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

impl WgControl for FakeWgControl {
    async fn sync_config(&self, interface_name: &str, config_path: &str) -> Result<()> {
        self.calls.lock().push((interface_name.to_string(), config_path.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_control_records_calls() {
        let control = FakeWgControl::new();
        control.sync_config("wg0", "/etc/wireguard/wg0.conf").await.unwrap();
        control.sync_config("wg0", "/etc/wireguard/wg0.conf").await.unwrap();
        assert_eq!(control.calls().len(), 2);
    }
}
