//! Renders the `.conf` file handed to a VPN client for one WireGuard peer
//! as returned to the client.

use std::fmt::Write as FmtWrite;
use std::net::Ipv4Addr;

use crate::keys::{PresharedKey, PrivateKey, PublicKey};
use crate::types::{AmneziaHeaders, AmneziaJitter};

/// Everything about the server side needed to render a client config,
/// sourced from `[WireguardServer]`.
#[derive(Clone, Debug)]
pub struct ServerProfile {
    pub public_key: PublicKey,
    pub endpoint_ip: String,
    pub endpoint_port: u16,
    pub dns: String,
    pub ip_mask: u8,
    pub amnezia_headers: Option<AmneziaHeaders>,
}

/// The peer-specific fields needed to render a client config.
#[derive(Clone, Debug)]
pub struct ClientPeerProfile {
    pub private_key: PrivateKey,
    pub preshared_key: PresharedKey,
    pub address: Ipv4Addr,
    pub jitter: Option<AmneziaJitter>,
}

/// Renders the `.conf` file content for `peer` against `server`.
#[must_use]
pub fn render_client_config(server: &ServerProfile, peer: &ClientPeerProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[Interface]");
    let _ = writeln!(out, "Address = {}/{}", peer.address, server.ip_mask);
    let _ = writeln!(out, "DNS = {}", server.dns);
    let _ = writeln!(out, "PrivateKey = {}", peer.private_key.to_base64());
    if let (Some(jitter), Some(headers)) = (peer.jitter, server.amnezia_headers) {
        let _ = writeln!(out, "Jc = {}", jitter.jc);
        let _ = writeln!(out, "Jmin = {}", jitter.jmin);
        let _ = writeln!(out, "Jmax = {}", jitter.jmax);
        let _ = writeln!(out, "S1 = {}", headers.s1);
        let _ = writeln!(out, "S2 = {}", headers.s2);
        let _ = writeln!(out, "H1 = {}", headers.h1);
        let _ = writeln!(out, "H2 = {}", headers.h2);
        let _ = writeln!(out, "H3 = {}", headers.h3);
        let _ = writeln!(out, "H4 = {}", headers.h4);
    }
    out.push('\n');
    let _ = writeln!(out, "[Peer]");
    let _ = writeln!(out, "PublicKey = {}", server.public_key.to_base64());
    let _ = writeln!(out, "PresharedKey = {}", peer.preshared_key.to_base64());
    let _ = writeln!(out, "AllowedIPs = 0.0.0.0/0");
    let _ = writeln!(out, "Endpoint = {}:{}", server.endpoint_ip, server.endpoint_port);
    let _ = writeln!(out, "PersistentKeepalive = 60");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{FakeKeyTool, KeyTool};

    #[tokio::test]
    async fn renders_expected_shape_without_amnezia() {
        let triple = FakeKeyTool.generate_triple().await.unwrap();
        let peer_triple = FakeKeyTool.generate_triple().await.unwrap();
        let server = ServerProfile {
            public_key: triple.public,
            endpoint_ip: "203.0.113.5".to_string(),
            endpoint_port: 51820,
            dns: "1.1.1.1".to_string(),
            ip_mask: 32,
            amnezia_headers: None,
        };
        let peer = ClientPeerProfile {
            private_key: peer_triple.private,
            preshared_key: peer_triple.preshared,
            address: Ipv4Addr::new(10, 0, 0, 5),
            jitter: None,
        };

        let rendered = render_client_config(&server, &peer);
        assert!(rendered.contains("[Interface]"));
        assert!(rendered.contains("Address = 10.0.0.5/32"));
        assert!(rendered.contains("[Peer]"));
        assert!(rendered.contains("Endpoint = 203.0.113.5:51820"));
        assert!(rendered.contains("PersistentKeepalive = 60"));
        assert!(!rendered.contains("Jc ="));
    }

    #[tokio::test]
    async fn renders_amnezia_extras_when_present() {
        let triple = FakeKeyTool.generate_triple().await.unwrap();
        let peer_triple = FakeKeyTool.generate_triple().await.unwrap();
        let server = ServerProfile {
            public_key: triple.public,
            endpoint_ip: "203.0.113.5".to_string(),
            endpoint_port: 51820,
            dns: "1.1.1.1".to_string(),
            ip_mask: 32,
            amnezia_headers: Some(AmneziaHeaders { s1: 1, s2: 2, h1: 3, h2: 4, h3: 5, h4: 6 }),
        };
        let peer = ClientPeerProfile {
            private_key: peer_triple.private,
            preshared_key: peer_triple.preshared,
            address: Ipv4Addr::new(10, 0, 0, 6),
            jitter: Some(AmneziaJitter::new(10, 50, 100).unwrap()),
        };

        let rendered = render_client_config(&server, &peer);
        assert!(rendered.contains("Jc = 10"));
        assert!(rendered.contains("S1 = 1"));
        assert!(rendered.contains("H4 = 6"));
    }
}
