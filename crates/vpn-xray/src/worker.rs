//! Stateful client against the Xray admin panel's REST API.

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Url;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vpn_storage::XrayPeer;

use crate::error::{Result, XrayError};
use crate::model::{ApiEnvelope, ClientRecord, ClientSettings, Inbound};

/// Everything needed to reach and authenticate against one Xray admin panel.
#[derive(Debug, Clone)]
pub struct XrayConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub web_path: Option<String>,
    pub username: String,
    pub password: String,
    /// The panel's optional "secret token" feature; sent as a header on
    /// every request when set, independent of the username/password login.
    pub token: Option<String>,
}

impl XrayConfig {
    fn base_url(&self) -> std::result::Result<Url, url::ParseError> {
        let web_path = self.web_path.as_deref().unwrap_or("").trim_matches('/');
        let raw = if web_path.is_empty() {
            format!("{}://{}:{}/", self.scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}/", self.scheme, self.host, self.port, web_path)
        };
        Url::parse(&raw)
    }
}

/// Stateful client of the remote Xray admin API. Logs in at construction;
/// failure to log in is fatal.
pub struct XrayWorker {
    http: reqwest::Client,
    base_url: Url,
    config: XrayConfig,
    /// Guards login/refresh ordering so only one re-login is ever in flight.
    session: Mutex<()>,
}

impl XrayWorker {
    /// Connects and logs in. The returned worker owns an authenticated
    /// session (tracked via the HTTP client's cookie jar).
    pub async fn login(config: XrayConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().cookie_store(true);
        if let Some(token) = &config.token {
            let mut headers = reqwest::header::HeaderMap::new();
            let mut value = reqwest::header::HeaderValue::from_str(token)
                .map_err(|e| XrayError::LoginFailed(format!("invalid secret token: {e}")))?;
            value.set_sensitive(true);
            headers.insert("x-secret-token", value);
            builder = builder.default_headers(headers);
        }
        let http = builder.build().map_err(XrayError::Transport)?;
        let base_url = config.base_url().map_err(|e| XrayError::LoginFailed(e.to_string()))?;

        let worker = Self { http, base_url, config, session: Mutex::new(()) };
        worker.do_login().await.map_err(|e| XrayError::LoginFailed(e.to_string()))?;
        info!(host = %worker.config.host, "logged into xray admin API");
        Ok(worker)
    }

    async fn do_login(&self) -> Result<()> {
        let url = self.base_url.join("login").expect("login is a valid relative path");
        let body = serde_json::json!({
            "username": self.config.username,
            "password": self.config.password,
        });
        let resp = self.http.post(url).json(&body).send().await?;
        let envelope: ApiEnvelope<serde_json::Value> = resp.json().await.map_err(XrayError::Transport)?;
        if !envelope.success {
            return Err(XrayError::LoginFailed(envelope.msg));
        }
        Ok(())
    }

    async fn relogin(&self) -> Result<()> {
        let _guard = self.session.lock().await;
        self.do_login().await.map_err(|e| XrayError::ReauthFailed(e.to_string()))
    }

    fn inbound_url(&self, inbound_id: i64) -> Url {
        self.base_url.join(&format!("panel/api/inbounds/get/{inbound_id}")).expect("valid path")
    }

    fn add_clients_url(&self) -> Url {
        self.base_url.join("panel/api/inbounds/addClient").expect("valid path")
    }

    fn update_client_url(&self, uuid: &str) -> Url {
        self.base_url.join(&format!("panel/api/inbounds/updateClient/{uuid}")).expect("valid path")
    }

    fn delete_client_url(&self, inbound_id: i64, uuid: &str) -> Url {
        self.base_url
            .join(&format!("panel/api/inbounds/{inbound_id}/delClient/{uuid}"))
            .expect("valid path")
    }

    fn online_clients_url(&self) -> Url {
        self.base_url.join("panel/api/inbounds/onlines").expect("valid path")
    }

    /// Whether a peer's current status should translate to an enabled
    /// client record on the admin panel (disconnected/connected peers stay
    /// enabled; expired or blocked peers do not).
    fn status_enables_client(status: vpn_storage::PeerStatus) -> bool {
        matches!(status, vpn_storage::PeerStatus::Connected | vpn_storage::PeerStatus::Disconnected)
    }

    fn to_client_record(peer: &XrayPeer, enable: bool, expiry: Option<DateTime<Utc>>) -> ClientRecord {
        ClientRecord {
            id: peer.peer.id.to_string(),
            email: peer.peer.name.clone(),
            enable,
            flow: peer.flow.clone(),
            inbound_id: peer.inbound_id,
            expiry_time: expiry.map_or(0, |t| t.timestamp_millis()),
        }
    }

    /// Adds peers to `inbound_id`. Warns (does not fail) for any peer whose
    /// stored `inbound_id` disagrees with the target inbound.
    pub async fn add_peers(&self, inbound_id: i64, peers: &[XrayPeer], expiry: Option<DateTime<Utc>>) -> Result<()> {
        for peer in peers {
            if peer.inbound_id != inbound_id {
                warn!(peer_id = peer.peer.id, peer.inbound_id, inbound_id, "peer's inbound id disagrees with target");
            }
        }
        let clients = peers
            .iter()
            .map(|p| Self::to_client_record(p, Self::status_enables_client(p.peer.status), expiry))
            .collect::<Vec<_>>();
        let settings = serde_json::to_string(&ClientSettings { clients }).expect("serializable");
        let body = serde_json::json!({ "id": inbound_id, "settings": settings });

        let resp = self.http.post(self.add_clients_url()).json(&body).send().await?;
        self.check_envelope(resp, "add_peers").await?;
        info!(inbound_id, count = peers.len(), "added xray peers");
        Ok(())
    }

    /// Replaces a peer's client record (PATCH-by-recreate, matching the
    /// admin API's update-by-uuid endpoint). `enable` and `expiry` override
    /// what the peer's current status would otherwise imply.
    pub async fn update_peer(&self, peer: &XrayPeer, enable: bool, expiry: Option<DateTime<Utc>>) -> Result<()> {
        let record = Self::to_client_record(peer, enable, expiry);
        let settings = serde_json::to_string(&ClientSettings { clients: vec![record] }).expect("serializable");
        let body = serde_json::json!({ "id": peer.inbound_id, "settings": settings });

        let resp = self.http.post(self.update_client_url(&peer.peer.id.to_string())).json(&body).send().await?;
        self.check_envelope(resp, "update_peer").await?;
        debug!(peer_id = peer.peer.id, enable, "updated xray peer");
        Ok(())
    }

    /// Deletes a peer's client record.
    pub async fn delete_peer(&self, peer: &XrayPeer) -> Result<()> {
        let resp = self.http.post(self.delete_client_url(peer.inbound_id, &peer.peer.id.to_string())).send().await?;
        self.check_envelope(resp, "delete_peer").await?;
        info!(peer_id = peer.peer.id, "deleted xray peer");
        Ok(())
    }

    /// Enables the peer's client record on the admin panel.
    pub async fn enable_peer(&self, peer: &XrayPeer) -> Result<()> {
        self.update_peer(peer, true, None).await
    }

    /// Disables the peer's client record on the admin panel.
    pub async fn disable_peer(&self, peer: &XrayPeer) -> Result<()> {
        self.update_peer(peer, false, None).await
    }

    /// Queries the online-clients list and checks membership by peer name.
    /// On a JSON decode error, assumes the session expired: re-logs in and
    /// reports not-connected for this call.
    pub async fn is_connected(&self, peer: &XrayPeer) -> bool {
        let Ok(resp) = self.http.post(self.online_clients_url()).send().await else {
            return false;
        };
        let envelope: std::result::Result<ApiEnvelope<Vec<String>>, _> = resp.json().await;
        let Ok(envelope) = envelope else {
            warn!(peer_id = peer.peer.id, "online-clients response failed to decode, assuming session expired");
            let _ = self.relogin().await;
            return false;
        };
        let online = envelope.obj.unwrap_or_default();
        let connected = online.iter().any(|name| name == &peer.peer.name);
        if !connected {
            debug!(peer_id = peer.peer.id, online = ?online, "peer not in online clients list");
        }
        connected
    }

    /// Builds the `vless://` connection string for `peer` from its
    /// inbound's public reality settings.
    pub async fn get_connection_string(&self, peer: &XrayPeer) -> Result<String> {
        let resp = self.http.get(self.inbound_url(peer.inbound_id)).send().await?;
        let envelope: ApiEnvelope<Inbound> = resp.json().await.map_err(XrayError::Transport)?;
        let inbound = envelope.obj.ok_or(XrayError::MalformedResponse("get_connection_string"))?;
        let stream = inbound.stream_settings().map_err(|_| XrayError::MalformedResponse("get_connection_string"))?;
        let reality = stream.reality_settings;

        let short_id = reality.short_ids.first().ok_or(XrayError::MalformedResponse("get_connection_string"))?;
        let server_name =
            reality.server_names.first().ok_or(XrayError::MalformedResponse("get_connection_string"))?;

        let remark = utf8_percent_encode(&inbound.remark, NON_ALPHANUMERIC).to_string();
        let name = utf8_percent_encode(&peer.peer.name, NON_ALPHANUMERIC).to_string();

        Ok(format!(
            "vless://{}@{}:{}?type=tcp&security=reality&pbk={}&fp={}&sni={}&sid={}&spx=%2F&flow={}#{}-{}",
            peer.peer.id,
            self.config.host,
            inbound.port,
            reality.settings.public_key,
            reality.settings.fingerprint,
            server_name,
            short_id,
            peer.flow,
            remark,
            name,
        ))
    }

    async fn check_envelope(&self, resp: reqwest::Response, operation: &'static str) -> Result<()> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(XrayError::ApiError { status: status.as_u16(), operation, body });
        }
        let envelope: ApiEnvelope<serde_json::Value> = resp.json().await.map_err(XrayError::Transport)?;
        if !envelope.success {
            return Err(XrayError::ApiError { status: status.as_u16(), operation, body: envelope.msg });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_joins_web_path() {
        let config = XrayConfig {
            scheme: "https".to_string(),
            host: "example.com".to_string(),
            port: 2053,
            web_path: Some("panel".to_string()),
            username: "admin".to_string(),
            password: "hunter2".to_string(),
            token: None,
        };
        assert_eq!(config.base_url().unwrap().as_str(), "https://example.com:2053/panel/");
    }

    #[test]
    fn base_url_without_web_path() {
        let config = XrayConfig {
            scheme: "http".to_string(),
            host: "10.0.0.1".to_string(),
            port: 54321,
            web_path: None,
            username: "admin".to_string(),
            password: "hunter2".to_string(),
            token: None,
        };
        assert_eq!(config.base_url().unwrap().as_str(), "http://10.0.0.1:54321/");
    }

    use vpn_storage::{Peer, PeerKind, PeerStatus, XrayPeer};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_peer() -> XrayPeer {
        XrayPeer {
            peer: Peer {
                id: 7,
                user_id: 1,
                name: "alice_1".to_string(),
                kind: PeerKind::Xray,
                status: PeerStatus::Disconnected,
                active_until: None,
            },
            inbound_id: 3,
            flow: "xtls-rprx-vision".to_string(),
        }
    }

    async fn login_ok(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "msg": "", "obj": null
            })))
            .mount(server)
            .await;
    }

    async fn worker_against(server: &MockServer) -> XrayWorker {
        let addr = server.address();
        XrayWorker::login(XrayConfig {
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

    #[tokio::test]
    async fn login_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false, "msg": "bad creds"
            })))
            .mount(&server)
            .await;

        let addr = server.address();
        let err = XrayWorker::login(XrayConfig {
            scheme: "http".to_string(),
            host: addr.ip().to_string(),
            port: addr.port(),
            web_path: None,
            username: "admin".to_string(),
            password: "wrong".to_string(),
            token: None,
        })
        .await;
        assert!(matches!(err, Err(XrayError::LoginFailed(_))));
    }

    #[tokio::test]
    async fn add_peers_tolerates_inbound_mismatch() {
        let server = MockServer::start().await;
        login_ok(&server).await;
        Mock::given(method("POST"))
            .and(path("/panel/api/inbounds/addClient"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "msg": "", "obj": null
            })))
            .mount(&server)
            .await;

        let worker = worker_against(&server).await;
        let mut peer = sample_peer();
        peer.inbound_id = 99;
        assert!(worker.add_peers(3, &[peer], None).await.is_ok());
    }

    #[tokio::test]
    async fn is_connected_true_when_peer_name_in_online_list() {
        let server = MockServer::start().await;
        login_ok(&server).await;
        Mock::given(method("POST"))
            .and(path("/panel/api/inbounds/onlines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "msg": "", "obj": ["alice_1"]
            })))
            .mount(&server)
            .await;

        let worker = worker_against(&server).await;
        assert!(worker.is_connected(&sample_peer()).await);
    }

    #[tokio::test]
    async fn is_connected_false_on_decode_error() {
        let server = MockServer::start().await;
        login_ok(&server).await;
        Mock::given(method("POST"))
            .and(path("/panel/api/inbounds/onlines"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let worker = worker_against(&server).await;
        assert!(!worker.is_connected(&sample_peer()).await);
    }

    #[tokio::test]
    async fn get_connection_string_synthesizes_vless_url() {
        let server = MockServer::start().await;
        login_ok(&server).await;

        let stream_settings_json = serde_json::json!({
            "realitySettings": {
                "settings": {"publicKey": "pbk123", "fingerprint": "chrome"},
                "shortIds": ["abcd"],
                "serverNames": ["example.com"]
            }
        })
        .to_string();

        Mock::given(method("GET"))
            .and(path("/panel/api/inbounds/get/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "msg": "", "obj": {
                    "id": 3, "remark": "my-inbound", "port": 443,
                    "streamSettings": stream_settings_json
                }
            })))
            .mount(&server)
            .await;

        let worker = worker_against(&server).await;
        let url = worker.get_connection_string(&sample_peer()).await.unwrap();
        assert!(url.starts_with("vless://7@"));
        assert!(url.contains("pbk=pbk123"));
        assert!(url.contains("sni=example.com"));
        assert!(url.contains("sid=abcd"));
        assert!(url.contains("flow=xtls-rprx-vision"));
    }
}
