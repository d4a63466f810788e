//! WireGuard interface file parsing and rendering.
//!
//! The file format is the standard `wg`/`awg` interface config: one
//! `[Interface]` section followed by one `[Peer]` section per peer. Each
//! peer stanza is preceded by a `# <name>` comment that the hub uses to
//! identify the peer in logs and front-end messages; a peer is "disabled"
//! by commenting out its `[Peer]` section and every key line beneath it.

use std::fmt::Write as FmtWrite;
use std::net::{IpAddr, Ipv4Addr};

use crate::error::{Result, WireGuardError};
use crate::keys::{PresharedKey, PrivateKey, PublicKey};
use crate::types::AllowedIp;

/// The `[Interface]` section of the hub's own config file.
#[derive(Clone, Debug)]
pub struct InterfaceSection {
    pub private_key: PrivateKey,
    pub address: AllowedIp,
    pub listen_port: Option<u16>,
    pub dns: Vec<IpAddr>,
}

impl InterfaceSection {
    #[must_use]
    pub fn new(private_key: PrivateKey, address: AllowedIp) -> Self {
        Self { private_key, address, listen_port: None, dns: Vec::new() }
    }

    #[must_use]
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    #[must_use]
    pub fn with_dns(mut self, dns: IpAddr) -> Self {
        self.dns.push(dns);
        self
    }
}

/// One peer stanza in the interface file.
#[derive(Clone, Debug)]
pub struct PeerStanza {
    /// The `# <name>` header comment preceding the stanza.
    pub name: String,
    pub public_key: PublicKey,
    pub preshared_key: PresharedKey,
    pub allowed_ip: AllowedIp,
    /// Whether the stanza is live (uncommented) or disabled (commented out).
    pub enabled: bool,
}

impl PeerStanza {
    #[must_use]
    pub fn new(name: impl Into<String>, public_key: PublicKey, preshared_key: PresharedKey, address: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            public_key,
            preshared_key,
            allowed_ip: AllowedIp::host32(address),
            enabled: true,
        }
    }
}

/// A parsed WireGuard interface file, held in memory by the hub.
#[derive(Clone, Debug)]
pub struct InterfaceFile {
    pub interface: InterfaceSection,
    pub peers: Vec<PeerStanza>,
}

impl InterfaceFile {
    #[must_use]
    pub fn new(interface: InterfaceSection) -> Self {
        Self { interface, peers: Vec::new() }
    }

    /// Serializes the file back to the `wg`/`awg` interface config format.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[Interface]");
        let _ = writeln!(out, "PrivateKey = {}", self.interface.private_key.to_base64());
        let _ = writeln!(out, "Address = {}", self.interface.address);
        if let Some(port) = self.interface.listen_port {
            let _ = writeln!(out, "ListenPort = {port}");
        }
        if !self.interface.dns.is_empty() {
            let dns = self.interface.dns.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
            let _ = writeln!(out, "DNS = {dns}");
        }

        for peer in &self.peers {
            out.push('\n');
            let _ = writeln!(out, "# {}", peer.name);
            let prefix = if peer.enabled { "" } else { "#" };
            let _ = writeln!(out, "{prefix}[Peer]");
            let _ = writeln!(out, "{prefix}PublicKey = {}", peer.public_key.to_base64());
            let _ = writeln!(out, "{prefix}PresharedKey = {}", peer.preshared_key.to_base64());
            let _ = writeln!(out, "{prefix}AllowedIPs = {}", peer.allowed_ip);
        }
        out
    }

    /// Parses an interface file previously produced by [`InterfaceFile::render`].
    pub fn parse(content: &str) -> Result<Self> {
        let lines: Vec<&str> = content.lines().collect();
        let mut i = 0;

        let mut private_key = None;
        let mut address = None;
        let mut listen_port = None;
        let mut dns = Vec::new();

        // [Interface] section: read key/value lines until a blank line or a
        // peer header comment is reached.
        if i < lines.len() && strip_comment(lines[i]).eq_ignore_ascii_case("[Interface]") {
            i += 1;
            while i < lines.len() {
                let line = lines[i].trim();
                if line.is_empty() || line.starts_with('#') {
                    break;
                }
                let Some((key, value)) = split_kv(line) else { i += 1; continue };
                match key.to_ascii_lowercase().as_str() {
                    "privatekey" => private_key = Some(PrivateKey::from_base64(value)?),
                    "address" => address = Some(AllowedIp::from_cidr(value)?),
                    "listenport" => {
                        listen_port = Some(value.parse::<u16>().map_err(|e| {
                            WireGuardError::ParseFailed(format!("bad ListenPort: {e}"))
                        })?);
                    }
                    "dns" => {
                        for part in value.split(',') {
                            let part = part.trim();
                            if !part.is_empty() {
                                dns.push(part.parse::<IpAddr>().map_err(|e| {
                                    WireGuardError::ParseFailed(format!("bad DNS entry: {e}"))
                                })?);
                            }
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
        }

        let private_key = private_key
            .ok_or_else(|| WireGuardError::ParseFailed("missing PrivateKey".to_string()))?;
        let address =
            address.ok_or_else(|| WireGuardError::ParseFailed("missing Address".to_string()))?;
        let mut interface = InterfaceSection::new(private_key, address);
        interface.listen_port = listen_port;
        interface.dns = dns;

        let mut peers = Vec::new();
        let mut pending_name: Option<String> = None;

        while i < lines.len() {
            let raw = lines[i];
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                i += 1;
                continue;
            }
            let uncommented = strip_comment(raw);
            if uncommented.eq_ignore_ascii_case("[Peer]") {
                let enabled = !trimmed.starts_with('#');
                let name = pending_name.take().unwrap_or_default();
                i += 1;
                let mut public_key = None;
                let mut preshared_key = None;
                let mut allowed_ip = None;
                while i < lines.len() {
                    let line = lines[i].trim();
                    if line.is_empty() {
                        break;
                    }
                    let body = strip_comment(line);
                    if body.eq_ignore_ascii_case("[Peer]") || body.starts_with('[') {
                        break;
                    }
                    let Some((key, value)) = split_kv(body) else { i += 1; continue };
                    match key.to_ascii_lowercase().as_str() {
                        "publickey" => public_key = Some(PublicKey::from_base64(value)?),
                        "presharedkey" => preshared_key = Some(PresharedKey::from_base64(value)?),
                        "allowedips" => {
                            let first = value.split(',').next().unwrap_or(value).trim();
                            allowed_ip = Some(AllowedIp::from_cidr(first)?);
                        }
                        _ => {}
                    }
                    i += 1;
                }
                let public_key = public_key.ok_or_else(|| {
                    WireGuardError::ParseFailed(format!("peer '{name}' missing PublicKey"))
                })?;
                let preshared_key = preshared_key.ok_or_else(|| {
                    WireGuardError::ParseFailed(format!("peer '{name}' missing PresharedKey"))
                })?;
                let allowed_ip = allowed_ip.ok_or_else(|| {
                    WireGuardError::ParseFailed(format!("peer '{name}' missing AllowedIPs"))
                })?;
                peers.push(PeerStanza { name, public_key, preshared_key, allowed_ip, enabled });
                continue;
            }
            // A plain `# <name>` comment that precedes a [Peer] header.
            if let Some(stripped) = trimmed.strip_prefix('#') {
                pending_name = Some(stripped.trim().to_string());
            }
            i += 1;
        }

        Ok(Self { interface, peers })
    }
}

/// Strips a leading `#` and surrounding whitespace, used to compare
/// possibly-commented-out lines against their canonical form.
fn strip_comment(line: &str) -> &str {
    line.trim().trim_start_matches('#').trim()
}

fn split_kv(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{FakeKeyTool, KeyTool};
    use std::net::Ipv4Addr;

    fn sample_file() -> InterfaceFile {
        let private = PrivateKey::generate();
        let interface = InterfaceSection::new(private, AllowedIp::from_cidr("10.0.0.1/24").unwrap())
            .with_listen_port(51820)
            .with_dns("1.1.1.1".parse().unwrap());
        InterfaceFile::new(interface)
    }

    #[tokio::test]
    async fn render_then_parse_is_a_roundtrip() {
        let tool = FakeKeyTool;
        let mut file = sample_file();
        for i in 0..3 {
            let triple = tool.generate_triple().await.unwrap();
            let mut stanza =
                PeerStanza::new(format!("peer{i}"), triple.public, triple.preshared, Ipv4Addr::new(10, 0, 0, 2 + i));
            stanza.enabled = i != 1;
            file.peers.push(stanza);
        }

        let rendered = file.render();
        let parsed = InterfaceFile::parse(&rendered).expect("parse");

        assert_eq!(parsed.interface.listen_port, Some(51820));
        assert_eq!(parsed.peers.len(), 3);
        assert_eq!(parsed.peers[0].name, "peer0");
        assert!(parsed.peers[0].enabled);
        assert!(!parsed.peers[1].enabled);
        assert_eq!(parsed.peers[1].public_key, file.peers[1].public_key);
        assert_eq!(parsed.render(), rendered);
    }

    #[test]
    fn parse_rejects_missing_private_key() {
        let content = "[Interface]\nAddress = 10.0.0.1/24\n";
        assert!(InterfaceFile::parse(content).is_err());
    }
}
