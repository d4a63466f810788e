//! WireGuard key types.
//!
//! WireGuard uses Curve25519 for key exchange. Keys and preshared secrets
//! are 32 bytes, always exchanged with peers as base64.

use crate::error::WireGuardError;
use base64::Engine;
use rand_core::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// WireGuard key size in bytes (256-bit Curve25519 keys).
pub const KEY_SIZE: usize = 32;

/// A WireGuard public key (Curve25519, 32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Creates a public key from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireGuardError> {
        if bytes.len() != KEY_SIZE {
            return Err(WireGuardError::InvalidKeyLength(bytes.len()));
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Returns the raw bytes of the public key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encodes the key as base64, the wire format used in interface files.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decodes a public key from base64.
    pub fn from_base64(s: &str) -> Result<Self, WireGuardError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| WireGuardError::InvalidBase64(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        let short = &b64[..8.min(b64.len())];
        write!(f, "PublicKey({short}...)")
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

impl From<X25519PublicKey> for PublicKey {
    fn from(key: X25519PublicKey) -> Self {
        Self(*key.as_bytes())
    }
}

/// A WireGuard private key (Curve25519, 32 bytes). Never logged or serialized.
#[derive(Clone)]
pub struct PrivateKey([u8; KEY_SIZE]);

impl PrivateKey {
    /// Generates a new random private key.
    #[must_use]
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self(secret.to_bytes())
    }

    /// Creates a private key from a 32-byte array.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a private key from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireGuardError> {
        if bytes.len() != KEY_SIZE {
            return Err(WireGuardError::InvalidKeyLength(bytes.len()));
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Returns the raw bytes of the private key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Derives the corresponding public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        let public = X25519PublicKey::from(&secret);
        PublicKey::from(public)
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decodes a private key from base64.
    pub fn from_base64(s: &str) -> Result<Self, WireGuardError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| WireGuardError::InvalidBase64(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PrivateKey {}

/// A WireGuard preshared key (32 bytes), mixed into the handshake for
/// post-quantum symmetric defense in depth.
#[derive(Clone, Serialize, Deserialize)]
pub struct PresharedKey([u8; KEY_SIZE]);

impl PresharedKey {
    /// Creates from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireGuardError> {
        if bytes.len() != KEY_SIZE {
            return Err(WireGuardError::InvalidKeyLength(bytes.len()));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Generates a new random preshared key.
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, WireGuardError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| WireGuardError::InvalidBase64(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresharedKey").field("key", &"[REDACTED]").finish()
    }
}

impl PartialEq for PresharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PresharedKey {}

/// A freshly generated (private, public, preshared) key triple for a new peer.
#[derive(Debug, Clone)]
pub struct KeyTriple {
    pub private: PrivateKey,
    pub public: PublicKey,
    pub preshared: PresharedKey,
}

/// Produces WireGuard key material. The production implementation shells out
/// to the `wg`/`awg` CLI (see design note on subprocess invocation); an
/// in-process test double is provided for tests that must not touch a CLI.
#[allow(async_fn_in_trait)]
pub trait KeyTool {
    /// Generates a new private key.
    async fn generate_private_key(&self) -> Result<PrivateKey, WireGuardError>;

    /// Derives the public key for a private key.
    async fn derive_public_key(&self, private: &PrivateKey) -> Result<PublicKey, WireGuardError>;

    /// Generates a new preshared key.
    async fn generate_preshared_key(&self) -> Result<PresharedKey, WireGuardError>;

    /// Convenience: generates a full key triple for a new peer.
    async fn generate_triple(&self) -> Result<KeyTriple, WireGuardError> {
        let private = self.generate_private_key().await?;
        let public = self.derive_public_key(&private).await?;
        let preshared = self.generate_preshared_key().await?;
        Ok(KeyTriple { private, public, preshared })
    }
}

/// Shells out to the `wg` (or `awg`, for the Amnezia variant) CLI for key
/// generation, mirroring how the running interface itself is managed.
#[derive(Debug, Clone)]
pub struct CliKeyTool {
    binary: String,
}

impl CliKeyTool {
    /// Uses the standard `wg` binary.
    #[must_use]
    pub fn wg() -> Self {
        Self { binary: "wg".to_string() }
    }

    /// Uses the Amnezia `awg` binary.
    #[must_use]
    pub fn awg() -> Self {
        Self { binary: "awg".to_string() }
    }

    async fn run_genkey(&self) -> Result<String, WireGuardError> {
        debug!(binary = %self.binary, "generating private key via subprocess");
        let output = tokio::process::Command::new(&self.binary)
            .arg("genkey")
            .output()
            .await
            .map_err(|e| WireGuardError::BackendUnavailable(e.to_string()))?;
        if !output.status.success() {
            warn!(binary = %self.binary, status = %output.status, "genkey subprocess failed");
            return Err(WireGuardError::BackendUnavailable(format!(
                "{} genkey exited with {}",
                self.binary, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl KeyTool for CliKeyTool {
    async fn generate_private_key(&self) -> Result<PrivateKey, WireGuardError> {
        let line = self.run_genkey().await?;
        PrivateKey::from_base64(&line)
    }

    async fn derive_public_key(&self, private: &PrivateKey) -> Result<PublicKey, WireGuardError> {
        debug!(binary = %self.binary, "deriving public key via subprocess");
        use std::process::Stdio;
        let mut child = tokio::process::Command::new(&self.binary)
            .arg("pubkey")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| WireGuardError::BackendUnavailable(e.to_string()))?;
        {
            use tokio::io::AsyncWriteExt;
            let mut stdin = child.stdin.take().ok_or_else(|| {
                WireGuardError::BackendUnavailable("failed to open stdin".to_string())
            })?;
            stdin
                .write_all(private.to_base64().as_bytes())
                .await
                .map_err(|e| WireGuardError::BackendUnavailable(e.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| WireGuardError::BackendUnavailable(e.to_string()))?;
        if !output.status.success() {
            warn!(binary = %self.binary, status = %output.status, "pubkey subprocess failed");
            return Err(WireGuardError::BackendUnavailable(format!(
                "{} pubkey exited with {}",
                self.binary, output.status
            )));
        }
        PublicKey::from_base64(String::from_utf8_lossy(&output.stdout).trim())
    }

    async fn generate_preshared_key(&self) -> Result<PresharedKey, WireGuardError> {
        debug!(binary = %self.binary, "generating preshared key via subprocess");
        let output = tokio::process::Command::new(&self.binary)
            .arg("genpsk")
            .output()
            .await
            .map_err(|e| WireGuardError::BackendUnavailable(e.to_string()))?;
        if !output.status.success() {
            warn!(binary = %self.binary, status = %output.status, "genpsk subprocess failed");
            return Err(WireGuardError::BackendUnavailable(format!(
                "{} genpsk exited with {}",
                self.binary, output.status
            )));
        }
        PresharedKey::from_base64(String::from_utf8_lossy(&output.stdout).trim())
    }
}

/// In-process key generator for tests, never touches the filesystem or a
/// subprocess.
#[derive(Debug, Clone, Default)]
pub struct FakeKeyTool;

impl KeyTool for FakeKeyTool {
    async fn generate_private_key(&self) -> Result<PrivateKey, WireGuardError> {
        Ok(PrivateKey::generate())
    }

    async fn derive_public_key(&self, private: &PrivateKey) -> Result<PublicKey, WireGuardError> {
        Ok(private.public_key())
    }

    async fn generate_preshared_key(&self) -> Result<PresharedKey, WireGuardError> {
        Ok(PresharedKey::generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_generate_produces_valid_key() {
        let key = PrivateKey::generate();
        assert_eq!(key.as_bytes().len(), KEY_SIZE);
    }

    #[test]
    fn private_key_to_public_key_is_deterministic() {
        let private = PrivateKey::generate();
        assert_eq!(private.public_key(), private.public_key());
    }

    #[test]
    fn different_private_keys_produce_different_public_keys() {
        let private1 = PrivateKey::generate();
        let private2 = PrivateKey::generate();
        assert_ne!(private1.public_key(), private2.public_key());
    }

    #[test]
    fn public_key_base64_roundtrip() {
        let private = PrivateKey::generate();
        let public = private.public_key();
        let decoded = PublicKey::from_base64(&public.to_base64()).expect("decode failed");
        assert_eq!(public, decoded);
    }

    #[test]
    fn private_key_base64_roundtrip() {
        let private = PrivateKey::generate();
        let decoded = PrivateKey::from_base64(&private.to_base64()).expect("decode failed");
        assert_eq!(private, decoded);
    }

    #[test]
    fn private_key_debug_redacts() {
        let private = PrivateKey::generate();
        assert!(format!("{private:?}").contains("REDACTED"));
    }

    #[test]
    fn preshared_key_debug_redacts() {
        let psk = PresharedKey::generate();
        assert!(format!("{psk:?}").contains("REDACTED"));
    }

    #[test]
    fn invalid_key_length_rejected() {
        let short_bytes = [0u8; 16];
        assert!(PrivateKey::from_bytes(&short_bytes).is_err());
        assert!(PublicKey::from_bytes(&short_bytes).is_err());
    }

    #[tokio::test]
    async fn fake_key_tool_generates_consistent_triple() {
        let tool = FakeKeyTool;
        let triple = tool.generate_triple().await.expect("generate");
        assert_eq!(triple.public, triple.private.public_key());
    }
}
