//! Wire types for the Xray admin panel's REST API.

use serde::{Deserialize, Serialize};

/// The client record the admin API expects for add/update operations.
#[derive(Debug, Clone, Serialize)]
pub struct ClientRecord {
    pub id: String,
    pub email: String,
    pub enable: bool,
    pub flow: String,
    #[serde(rename = "inboundId")]
    pub inbound_id: i64,
    #[serde(rename = "expiryTime")]
    pub expiry_time: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ClientSettings {
    pub clients: Vec<ClientRecord>,
}

/// The `settings` object nested under `realitySettings`: the pieces needed
/// to synthesize a `vless://` connection string.
#[derive(Debug, Clone, Deserialize)]
pub struct RealityPublicSettings {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RealitySettings {
    pub settings: RealityPublicSettings,
    #[serde(rename = "shortIds")]
    pub short_ids: Vec<String>,
    #[serde(rename = "serverNames")]
    pub server_names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StreamSettings {
    #[serde(rename = "realitySettings")]
    pub reality_settings: RealitySettings,
}

/// An inbound as returned by `GET /panel/api/inbounds/get/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct Inbound {
    pub id: i64,
    pub remark: String,
    pub port: u16,
    /// 3x-ui serializes this sub-object as a JSON string, not nested JSON.
    #[serde(rename = "streamSettings")]
    pub(crate) stream_settings_json: String,
}

impl Inbound {
    pub(crate) fn stream_settings(&self) -> serde_json::Result<StreamSettings> {
        serde_json::from_str(&self.stream_settings_json)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    pub obj: Option<T>,
}
