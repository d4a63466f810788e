//! Loads the flat INI document that drives the control plane: bot admin
//! list, storage path, timer defaults, and the two dataplanes' connection
//! settings.

#![forbid(unsafe_code)]

pub mod error;

pub use error::{ConfigError, Result};

use std::path::{Path, PathBuf};

use ini::Ini;
use tracing::warn;

/// Top-level configuration, one section per sub-struct.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot: BotConfig,
    pub db: DbConfig,
    pub core: CoreConfig,
    pub wireguard: WireguardServerConfig,
    pub xray: XrayServerConfig,
}

impl Config {
    /// Parses `path` as an INI document and validates every section.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let ini = Ini::load_from_file(path)?;
        Ok(Self {
            bot: BotConfig::from_ini(&ini)?,
            db: DbConfig::from_ini(&ini),
            core: CoreConfig::from_ini(&ini),
            wireguard: WireguardServerConfig::from_ini(&ini)?,
            xray: XrayServerConfig::from_ini(&ini)?,
        })
    }
}

fn get<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section)).and_then(|s| s.get(key))
}

/// `[TelegramBot]`. The core itself only consumes `admins`; `token` and
/// `faq_url` exist for the front-end process sharing this config file.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub admins: Vec<i64>,
    pub faq_url: Option<String>,
}

impl BotConfig {
    fn from_ini(ini: &Ini) -> Result<Self> {
        let token = get(ini, "TelegramBot", "token")
            .filter(|t| !t.eq_ignore_ascii_case("none") && !t.is_empty())
            .ok_or(ConfigError::MissingBotToken)?
            .to_string();

        let admins = get(ini, "TelegramBot", "admins")
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<i64>().map_err(|_| ConfigError::InvalidAdminId(s.to_string())))
            .collect::<Result<Vec<_>>>()?;

        let faq_url = get(ini, "TelegramBot", "faq_url").and_then(|url| {
            if url.is_empty() || url.eq_ignore_ascii_case("none") {
                None
            } else if !url.starts_with("http") {
                warn!(faq_url = url, "faq_url should start with http or https, ignoring");
                None
            } else {
                Some(url.to_string())
            }
        });

        Ok(Self { token, admins, faq_url })
    }
}

/// `[db]`.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl DbConfig {
    fn from_ini(ini: &Ini) -> Self {
        Self { path: PathBuf::from(get(ini, "db", "path").unwrap_or("db.sqlite")) }
    }
}

/// `[core]`.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub peer_active_time_hours: u32,
    pub connection_listen_timer_secs: u64,
    pub connection_connected_only_listen_timer_secs: u64,
    pub connection_update_timer_secs: u64,
    pub logs_path: PathBuf,
    pub debug: bool,
}

impl CoreConfig {
    fn from_ini(ini: &Ini) -> Self {
        Self {
            peer_active_time_hours: parse_or(ini, "core", "peer_active_time", 6),
            connection_listen_timer_secs: parse_or(ini, "core", "connection_listen_timer", 120),
            connection_connected_only_listen_timer_secs: parse_or(
                ini,
                "core",
                "connection_connected_only_listen_timer",
                60,
            ),
            connection_update_timer_secs: parse_or(ini, "core", "connection_update_timer", 360),
            logs_path: PathBuf::from(get(ini, "core", "logs_path").unwrap_or("./logs")),
            debug: get(ini, "core", "debug").map(|v| v == "true" || v == "1").unwrap_or(false),
        }
    }
}

/// `[WireguardServer]`. `junk` is the raw `"S1 S2 H1 H2 H3 H4"` string;
/// use [`WireguardServerConfig::amnezia_headers`] to parse it.
#[derive(Debug, Clone)]
pub struct WireguardServerConfig {
    pub interface_path: PathBuf,
    pub subnet_prefix: String,
    pub ip_mask: u8,
    pub private_key: String,
    pub public_key: String,
    pub endpoint_ip: String,
    pub endpoint_port: u16,
    pub dns: String,
    pub junk: String,
}

impl WireguardServerConfig {
    fn from_ini(ini: &Ini) -> Result<Self> {
        let default_path = std::env::current_dir().unwrap_or_default().join("wg0.conf");
        Ok(Self {
            interface_path: get(ini, "WireguardServer", "Path")
                .map(PathBuf::from)
                .unwrap_or(default_path),
            subnet_prefix: get(ini, "WireguardServer", "IP").unwrap_or("127.0.0").to_string(),
            ip_mask: parse_field(ini, "WireguardServer", "IPMask", "IPMask", 32)?,
            private_key: get(ini, "WireguardServer", "PrivateKey").unwrap_or("@!ChAngEME!@").to_string(),
            public_key: get(ini, "WireguardServer", "PublicKey").unwrap_or("@!ChAngEME!@").to_string(),
            endpoint_ip: get(ini, "WireguardServer", "EndpointIP").unwrap_or("192.168.27.27").to_string(),
            endpoint_port: parse_field(ini, "WireguardServer", "EndpointPort", "EndpointPort", 10000)?,
            dns: get(ini, "WireguardServer", "DNS").unwrap_or("8.8.8.8").to_string(),
            junk: get(ini, "WireguardServer", "Junk").unwrap_or("").to_string(),
        })
    }

    /// Splits `junk` into the six Amnezia header magic values. Returns
    /// `None` if unset (Amnezia is opt-in per peer).
    pub fn amnezia_headers(&self) -> Result<Option<vpn_wireguard::AmneziaHeaders>> {
        if self.junk.trim().is_empty() {
            return Ok(None);
        }
        let parts: Vec<&str> = self.junk.split_whitespace().collect();
        if parts.len() != 6 {
            return Err(ConfigError::InvalidJunk(parts.len()));
        }
        let parse_u16 = |s: &str| s.parse::<u16>().map_err(|_| ConfigError::InvalidNumber("Junk", s.to_string()));
        let parse_u32 = |s: &str| s.parse::<u32>().map_err(|_| ConfigError::InvalidNumber("Junk", s.to_string()));
        Ok(Some(vpn_wireguard::AmneziaHeaders {
            s1: parse_u16(parts[0])?,
            s2: parse_u16(parts[1])?,
            h1: parse_u32(parts[2])?,
            h2: parse_u32(parts[3])?,
            h3: parse_u32(parts[4])?,
            h4: parse_u32(parts[5])?,
        }))
    }
}

/// `[Xray]`. `host`/`port`/`web_path`/`username`/`password` have no
/// fallback upstream — the worker cannot function without them.
#[derive(Debug, Clone)]
pub struct XrayServerConfig {
    pub host: String,
    pub port: u16,
    pub web_path: Option<String>,
    pub username: String,
    pub password: String,
    pub token: Option<String>,
    pub tls: bool,
    pub inbound_id: i64,
}

impl XrayServerConfig {
    fn from_ini(ini: &Ini) -> Result<Self> {
        let required = |key: &'static str| {
            get(ini, "Xray", key)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(ConfigError::MissingXraySetting(key))
        };
        let required_port = required("port")?;
        let port = required_port
            .parse()
            .map_err(|_| ConfigError::InvalidNumber("port", required_port.clone()))?;
        Ok(Self {
            host: required("host")?,
            port,
            web_path: Some(required("web_path")?).filter(|v| !v.is_empty()),
            username: required("username")?,
            password: required("password")?,
            token: get(ini, "Xray", "token").filter(|v| !v.is_empty()).map(str::to_string),
            tls: get(ini, "Xray", "tls").map(|v| v != "false" && v != "0").unwrap_or(true),
            inbound_id: parse_or(ini, "Xray", "inbound_id", 1),
        })
    }
}

fn parse_or<T: std::str::FromStr>(ini: &Ini, section: &str, key: &str, default: T) -> T {
    get(ini, section, key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_field<T: std::str::FromStr>(
    ini: &Ini,
    section: &str,
    key: &str,
    field_name: &'static str,
    default: T,
) -> Result<T> {
    match get(ini, section, key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidNumber(field_name, v.to_string())),
    }
}
