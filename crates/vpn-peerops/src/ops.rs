//! Dispatch of enable/disable calls to the dataplane owning each peer.

use tracing::{info, warn};
use vpn_storage::{PeerRecord, PeerStatus, Storage};
use vpn_wireguard::{WgControl, WireGuardHub};
use vpn_xray::XrayWorker;

use crate::error::Result;

/// Brings peers live on their dataplane and marks them ready-but-not-yet-connected.
pub async fn enable_peers<C: WgControl>(
    wghub: &WireGuardHub<C>,
    xray: &XrayWorker,
    storage: &Storage,
    peers: &[PeerRecord],
) -> Result<()> {
    for record in peers {
        match record {
            PeerRecord::Wireguard(wg) => wghub.enable_peer(&wg.public_key).await?,
            PeerRecord::Xray(x) => xray.enable_peer(x).await?,
        }
        storage.set_peer_status(record.peer().id, PeerStatus::Disconnected)?;
        info!(peer_id = record.peer().id, kind = %record.kind(), "enabled peer");
    }
    Ok(())
}

/// Takes peers off their dataplane and marks them blocked.
pub async fn disable_peers<C: WgControl>(
    wghub: &WireGuardHub<C>,
    xray: &XrayWorker,
    storage: &Storage,
    peers: &[PeerRecord],
) -> Result<()> {
    for record in peers {
        match record {
            PeerRecord::Wireguard(wg) => wghub.disable_peer(&wg.public_key).await?,
            PeerRecord::Xray(x) => xray.disable_peer(x).await?,
        }
        storage.set_peer_status(record.peer().id, PeerStatus::Blocked)?;
        warn!(peer_id = record.peer().id, kind = %record.kind(), "disabled peer");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use vpn_storage::PeerKind;
    use vpn_wireguard::{FakeKeyTool, FakeWgControl, PeerStanza};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn dummy_xray() -> XrayWorker {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "msg": "", "obj": null
            })))
            .mount(&server)
            .await;
        let addr = server.address();
        XrayWorker::login(vpn_xray::XrayConfig {
            scheme: "http".to_string(),
            host: addr.ip().to_string(),
            port: addr.port(),
            web_path: None,
            username: "admin".to_string(),
            password: "hunter2".to_string(),
            token: None,
        })
        .await
        .unwrap()
    }

    async fn fixture() -> (WireGuardHub<FakeWgControl>, Storage, i64, PeerRecord) {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("wg0.conf");
        std::fs::write(
            &config_path,
            "[Interface]\nPrivateKey = AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\nListenPort = 51820\n",
        )
        .unwrap();
        let hub = WireGuardHub::load(config_path, FakeWgControl::default(), false, false).await.unwrap();

        let storage = Storage::open_in_memory().unwrap();
        let user = storage.get_or_create_user("tg:1001", "alice").unwrap();
        let wg_peer = storage
            .add_wg_peer(user.id, Ipv4Addr::new(10, 8, 0, 2), false, None, Some("alice_1"), &FakeKeyTool)
            .await
            .unwrap();
        hub.add_peer(PeerStanza::new(
            "alice_1",
            wg_peer.public_key.clone(),
            wg_peer.preshared_key.clone(),
            wg_peer.shared_ip,
        ))
        .await
        .unwrap();

        (hub, storage, user.id, PeerRecord::Wireguard(wg_peer))
    }

    #[tokio::test]
    async fn enable_peers_flips_hub_stanza_and_storage_status() {
        let (hub, storage, _user_id, record) = fixture().await;
        let xray = dummy_xray().await;
        assert_eq!(record.kind(), PeerKind::Wireguard);

        enable_peers(&hub, &xray, &storage, std::slice::from_ref(&record)).await.unwrap();

        let public_key = match &record {
            PeerRecord::Wireguard(wg) => wg.public_key.clone(),
            PeerRecord::Xray(_) => unreachable!(),
        };
        assert!(hub.get_peer_enabled(&public_key).await.unwrap());
        let peer = storage.get_peer_by_id(record.peer().id).unwrap();
        assert_eq!(peer.status, PeerStatus::Disconnected);
    }

    #[tokio::test]
    async fn disable_peers_flips_hub_stanza_and_storage_status() {
        let (hub, storage, _user_id, record) = fixture().await;
        let xray = dummy_xray().await;

        disable_peers(&hub, &xray, &storage, std::slice::from_ref(&record)).await.unwrap();

        let public_key = match &record {
            PeerRecord::Wireguard(wg) => wg.public_key.clone(),
            PeerRecord::Xray(_) => unreachable!(),
        };
        assert!(!hub.get_peer_enabled(&public_key).await.unwrap());
        let peer = storage.get_peer_by_id(record.peer().id).unwrap();
        assert_eq!(peer.status, PeerStatus::Blocked);
    }
}
