//! The transactional relational store.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{
    Peer, PeerId, PeerKind, PeerStatus, User, UserId, UserStatus, WireguardPeer, XrayPeer,
    PEER_NAME_MAX_LEN,
};
use vpn_wireguard::{AmneziaJitter, KeyTool, KeyTriple, PresharedKey, PrivateKey, PublicKey};

/// Owns the single SQLite connection backing the control plane's state.
///
/// All mutating calls serialize through an internal lock; there is no
/// connection pool because `rusqlite`'s `Connection` is not `Sync` and the
/// write volume this service sees (peer CRUD from a handful of admins) never
/// approaches the point a pool would help.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Opens (creating if needed) the database at `path` and runs the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(crate::schema::SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Opens an in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(crate::schema::SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Looks up a user by external id, creating it (status `Created`) if
    /// absent. If the display name has changed, it is updated in place.
    pub fn get_or_create_user(&self, external_id: &str, display_name: &str) -> Result<User> {
        let conn = self.conn.lock();
        let existing = conn
            .query_row(
                "SELECT id, display_name, status, expires_at, registered_at FROM users WHERE external_id = ?1",
                params![external_id],
                row_to_user(external_id),
            )
            .optional()?;

        if let Some(mut user) = existing {
            if user.display_name != display_name {
                conn.execute(
                    "UPDATE users SET display_name = ?1 WHERE id = ?2",
                    params![display_name, user.id],
                )?;
                debug!(user_id = user.id, "user display name changed");
                user.display_name = display_name.to_string();
            }
            return Ok(user);
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO users (external_id, display_name, status, expires_at, registered_at) VALUES (?1, ?2, ?3, NULL, ?4)",
            params![external_id, display_name, user_status_to_i64(UserStatus::Created), now.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        info!(user_id = id, external_id, "registered new user");
        Ok(User {
            id,
            external_id: external_id.to_string(),
            display_name: display_name.to_string(),
            status: UserStatus::Created,
            expires_at: None,
            registered_at: now,
        })
    }

    /// Fetches a user by id.
    pub fn get_user_by_id(&self, user_id: UserId) -> Result<User> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, external_id, display_name, status, expires_at, registered_at FROM users WHERE id = ?1",
            params![user_id],
            row_to_user_full,
        )
        .optional()?
        .ok_or(Error::UserNotFound { id: user_id })
    }

    /// Every registered user, for roster snapshots.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, external_id, display_name, status, expires_at, registered_at FROM users ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_user_full)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Sets a user's account status.
    pub fn set_user_status(&self, user_id: UserId, status: UserStatus) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE users SET status = ?1 WHERE id = ?2",
            params![user_status_to_i64(status), user_id],
        )?;
        if rows == 0 {
            return Err(Error::UserNotFound { id: user_id });
        }
        Ok(())
    }

    /// Sets (or clears) a user's expiry timestamp.
    pub fn set_user_expiry(&self, user_id: UserId, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE users SET expires_at = ?1 WHERE id = ?2",
            params![expires_at.map(|t| t.to_rfc3339()), user_id],
        )?;
        if rows == 0 {
            return Err(Error::UserNotFound { id: user_id });
        }
        Ok(())
    }

    /// Adds a WireGuard peer. Any key not supplied in `keys` is generated via
    /// `keytool`; if `name` is absent, one is allocated as
    /// `"<user display name>_<next peer id>"`. For Amnezia peers, fresh
    /// random jitter parameters are drawn.
    pub async fn add_wg_peer<K: KeyTool>(
        &self,
        user_id: UserId,
        shared_ip: Ipv4Addr,
        is_amnezia: bool,
        keys: Option<KeyTriple>,
        name: Option<&str>,
        keytool: &K,
    ) -> Result<WireguardPeer> {
        let triple = match keys {
            Some(triple) => triple,
            None => keytool.generate_triple().await.map_err(|e| Error::CorruptKey(0, e))?,
        };
        let jitter = is_amnezia.then(AmneziaJitter::random);

        let kind = if is_amnezia { PeerKind::AmneziaWireguard } else { PeerKind::Wireguard };
        let owned_name;
        let name = match name {
            Some(name) => name,
            None => {
                let user = self.get_user_by_id(user_id)?;
                owned_name = format!("{}_{}", user.display_name, self.next_peer_id()?);
                &owned_name
            }
        };
        validate_peer_name(name)?;
        let peer_id = self.insert_base_peer(user_id, name, kind)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO wireguard_peers (peer_id, private_key, public_key, preshared_key, shared_ip, is_amnezia, jc, jmin, jmax)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                peer_id,
                triple.private.to_base64(),
                triple.public.to_base64(),
                triple.preshared.to_base64(),
                shared_ip.to_string(),
                is_amnezia,
                jitter.map(|j| j.jc),
                jitter.map(|j| j.jmin),
                jitter.map(|j| j.jmax),
            ],
        )?;
        drop(conn);
        info!(peer_id, user_id, shared_ip = %shared_ip, "added wireguard peer");

        Ok(WireguardPeer {
            peer: self.get_peer_by_id(peer_id)?,
            private_key: triple.private,
            public_key: triple.public,
            preshared_key: triple.preshared,
            shared_ip,
            is_amnezia,
            jitter,
        })
    }

    /// Adds an Xray peer.
    pub fn add_xray_peer(&self, user_id: UserId, name: &str, inbound_id: i64, flow: &str) -> Result<XrayPeer> {
        validate_peer_name(name)?;
        let peer_id = self.insert_base_peer(user_id, name, PeerKind::Xray)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO xray_peers (peer_id, inbound_id, flow) VALUES (?1, ?2, ?3)",
            params![peer_id, inbound_id, flow],
        )?;
        drop(conn);
        info!(peer_id, user_id, inbound_id, "added xray peer");
        Ok(XrayPeer { peer: self.get_peer_by_id(peer_id)?, inbound_id, flow: flow.to_string() })
    }

    /// The id the next inserted peer will receive, for auto-naming.
    fn next_peer_id(&self) -> Result<PeerId> {
        let conn = self.conn.lock();
        let next: i64 = conn.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM peers", [], |row| row.get(0))?;
        Ok(next)
    }

    fn insert_base_peer(&self, user_id: UserId, name: &str, kind: PeerKind) -> Result<PeerId> {
        let conn = self.conn.lock();
        let taken: Option<i64> = conn
            .query_row(
                "SELECT id FROM peers WHERE user_id = ?1 AND name = ?2",
                params![user_id, name],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(Error::PeerNameTaken { user_id, name: name.to_string() });
        }

        conn.execute(
            "INSERT INTO peers (user_id, name, kind, status, active_until) VALUES (?1, ?2, ?3, ?4, NULL)",
            params![user_id, name, kind_to_i64(kind), peer_status_to_i64(PeerStatus::Disconnected)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetches a peer's common fields.
    pub fn get_peer_by_id(&self, peer_id: PeerId) -> Result<Peer> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, user_id, name, kind, status, active_until FROM peers WHERE id = ?1",
            params![peer_id],
            row_to_peer,
        )
        .optional()?
        .ok_or(Error::PeerNotFound { id: peer_id })
    }

    /// All peers (any kind) belonging to a user.
    pub fn get_peers(&self, user_id: UserId) -> Result<Vec<Peer>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, kind, status, active_until FROM peers WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_peer)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// All WireGuard/Amnezia peers for a user.
    pub fn get_wireguard_peers(&self, user_id: UserId) -> Result<Vec<WireguardPeer>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.user_id, p.name, p.kind, p.status, p.active_until,
                    w.private_key, w.public_key, w.preshared_key, w.shared_ip, w.is_amnezia, w.jc, w.jmin, w.jmax
             FROM peers p JOIN wireguard_peers w ON w.peer_id = p.id
             WHERE p.user_id = ?1 ORDER BY p.id",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_wireguard_peer)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// All Xray peers for a user.
    pub fn get_xray_peers(&self, user_id: UserId) -> Result<Vec<XrayPeer>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.user_id, p.name, p.kind, p.status, p.active_until, x.inbound_id, x.flow
             FROM peers p JOIN xray_peers x ON x.peer_id = p.id
             WHERE p.user_id = ?1 ORDER BY p.id",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_xray_peer)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Looks up the WireGuard peer owning a tunnel address.
    pub fn get_peer_by_ip(&self, ip: Ipv4Addr) -> Result<WireguardPeer> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT p.id, p.user_id, p.name, p.kind, p.status, p.active_until,
                    w.private_key, w.public_key, w.preshared_key, w.shared_ip, w.is_amnezia, w.jc, w.jmin, w.jmax
             FROM peers p JOIN wireguard_peers w ON w.peer_id = p.id
             WHERE w.shared_ip = ?1",
            params![ip.to_string()],
            row_to_wireguard_peer,
        )
        .optional()?
        .ok_or(Error::IpNotFound(ip))
    }

    /// Every tunnel address currently owned by a WireGuard peer, used to
    /// rebuild the IP pool on boot.
    pub fn list_used_ips(&self) -> Result<HashSet<Ipv4Addr>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT shared_ip FROM wireguard_peers")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.map(|r| {
            r.map_err(Error::from).and_then(|s| {
                s.parse().map_err(|_| Error::Sqlite(rusqlite::Error::InvalidColumnType(0, "shared_ip".into(), rusqlite::types::Type::Text)))
            })
        })
        .collect()
    }

    /// Deletes a peer and, via `ON DELETE CASCADE`, its extension row.
    pub fn delete_peer(&self, peer_id: PeerId) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM peers WHERE id = ?1", params![peer_id])?;
        if rows == 0 {
            return Err(Error::PeerNotFound { id: peer_id });
        }
        info!(peer_id, "deleted peer");
        Ok(())
    }

    /// Renames a peer. Not atomic with the caller's external-dataplane
    /// rename when the peer is Xray — the caller is responsible for calling
    /// `XrayWorker::update_peer` in the same logical step.
    pub fn rename_peer(&self, peer_id: PeerId, new_name: &str) -> Result<()> {
        validate_peer_name(new_name)?;
        let conn = self.conn.lock();
        let user_id: UserId = conn.query_row(
            "SELECT user_id FROM peers WHERE id = ?1",
            params![peer_id],
            |row| row.get(0),
        ).optional()?.ok_or(Error::PeerNotFound { id: peer_id })?;

        let taken: Option<i64> = conn
            .query_row(
                "SELECT id FROM peers WHERE user_id = ?1 AND name = ?2 AND id != ?3",
                params![user_id, new_name, peer_id],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(Error::PeerNameTaken { user_id, name: new_name.to_string() });
        }

        conn.execute("UPDATE peers SET name = ?1 WHERE id = ?2", params![new_name, peer_id])?;
        Ok(())
    }

    /// Sets a peer's status.
    pub fn set_peer_status(&self, peer_id: PeerId, status: PeerStatus) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE peers SET status = ?1 WHERE id = ?2",
            params![peer_status_to_i64(status), peer_id],
        )?;
        if rows == 0 {
            return Err(Error::PeerNotFound { id: peer_id });
        }
        Ok(())
    }

    /// Sets (or clears) a peer's active-until timestamp.
    pub fn set_peer_active_until(&self, peer_id: PeerId, active_until: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE peers SET active_until = ?1 WHERE id = ?2",
            params![active_until.map(|t| t.to_rfc3339()), peer_id],
        )?;
        if rows == 0 {
            return Err(Error::PeerNotFound { id: peer_id });
        }
        Ok(())
    }
}

fn validate_peer_name(name: &str) -> Result<()> {
    if name.chars().count() >= PEER_NAME_MAX_LEN {
        return Err(Error::PeerNameTooLong(name.to_string(), name.chars().count()));
    }
    Ok(())
}

fn user_status_to_i64(status: UserStatus) -> i64 {
    match status {
        UserStatus::Created => 0,
        UserStatus::IpBlocked => 1,
        UserStatus::AccountBlocked => 2,
        UserStatus::TimeExpired => 3,
        UserStatus::Connected => 4,
        UserStatus::Disconnected => 5,
    }
}

fn i64_to_user_status(v: i64) -> UserStatus {
    match v {
        1 => UserStatus::IpBlocked,
        2 => UserStatus::AccountBlocked,
        3 => UserStatus::TimeExpired,
        4 => UserStatus::Connected,
        5 => UserStatus::Disconnected,
        _ => UserStatus::Created,
    }
}

fn peer_status_to_i64(status: PeerStatus) -> i64 {
    match status {
        PeerStatus::Disconnected => 0,
        PeerStatus::Connected => 1,
        PeerStatus::TimeExpired => 2,
        PeerStatus::Blocked => 3,
    }
}

fn i64_to_peer_status(v: i64) -> PeerStatus {
    match v {
        1 => PeerStatus::Connected,
        2 => PeerStatus::TimeExpired,
        3 => PeerStatus::Blocked,
        _ => PeerStatus::Disconnected,
    }
}

fn kind_to_i64(kind: PeerKind) -> i64 {
    match kind {
        PeerKind::Wireguard => 0,
        PeerKind::AmneziaWireguard => 1,
        PeerKind::Xray => 2,
    }
}

fn i64_to_kind(v: i64) -> PeerKind {
    match v {
        1 => PeerKind::AmneziaWireguard,
        2 => PeerKind::Xray,
        _ => PeerKind::Wireguard,
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_user(external_id: &str) -> impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<User> + '_ {
    move |row| {
        Ok(User {
            id: row.get(0)?,
            external_id: external_id.to_string(),
            display_name: row.get(1)?,
            status: i64_to_user_status(row.get(2)?),
            expires_at: row.get::<_, Option<String>>(3)?.map(|s| parse_rfc3339(&s)),
            registered_at: parse_rfc3339(&row.get::<_, String>(4)?),
        })
    }
}

fn row_to_user_full(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        display_name: row.get(2)?,
        status: i64_to_user_status(row.get(3)?),
        expires_at: row.get::<_, Option<String>>(4)?.map(|s| parse_rfc3339(&s)),
        registered_at: parse_rfc3339(&row.get::<_, String>(5)?),
    })
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Peer> {
    Ok(Peer {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        kind: i64_to_kind(row.get(3)?),
        status: i64_to_peer_status(row.get(4)?),
        active_until: row.get::<_, Option<String>>(5)?.map(|s| parse_rfc3339(&s)),
    })
}

fn row_to_wireguard_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<WireguardPeer> {
    let peer = row_to_peer(row)?;
    let private_key: String = row.get(6)?;
    let public_key: String = row.get(7)?;
    let preshared_key: String = row.get(8)?;
    let shared_ip: String = row.get(9)?;
    let is_amnezia: bool = row.get(10)?;
    let jc: Option<u16> = row.get(11)?;
    let jmin: Option<u16> = row.get(12)?;
    let jmax: Option<u16> = row.get(13)?;

    let to_col_err = |_: vpn_wireguard::WireGuardError| {
        rusqlite::Error::InvalidColumnType(6, "key material".into(), rusqlite::types::Type::Text)
    };

    Ok(WireguardPeer {
        jitter: match (jc, jmin, jmax) {
            (Some(jc), Some(jmin), Some(jmax)) => AmneziaJitter::new(jc, jmin, jmax).ok(),
            _ => None,
        },
        peer,
        private_key: PrivateKey::from_base64(&private_key).map_err(to_col_err)?,
        public_key: PublicKey::from_base64(&public_key).map_err(to_col_err)?,
        preshared_key: PresharedKey::from_base64(&preshared_key).map_err(to_col_err)?,
        shared_ip: shared_ip.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(9, "shared_ip".into(), rusqlite::types::Type::Text)
        })?,
        is_amnezia,
    })
}

fn row_to_xray_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<XrayPeer> {
    Ok(XrayPeer { peer: row_to_peer(row)?, inbound_id: row.get(6)?, flow: row.get(7)? })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpn_wireguard::FakeKeyTool;

    #[tokio::test]
    async fn get_or_create_user_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        let first = storage.get_or_create_user("tg:1001", "alice").unwrap();
        let second = storage.get_or_create_user("tg:1001", "alice").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.status, UserStatus::Created);
    }

    #[tokio::test]
    async fn get_or_create_user_updates_changed_display_name() {
        let storage = Storage::open_in_memory().unwrap();
        let first = storage.get_or_create_user("tg:1001", "alice").unwrap();
        let renamed = storage.get_or_create_user("tg:1001", "alice2").unwrap();
        assert_eq!(first.id, renamed.id);
        assert_eq!(renamed.display_name, "alice2");
    }

    #[tokio::test]
    async fn add_wg_peer_generates_keys_and_draws_jitter_for_amnezia() {
        let storage = Storage::open_in_memory().unwrap();
        let user = storage.get_or_create_user("tg:1001", "alice").unwrap();
        let peer = storage
            .add_wg_peer(user.id, Ipv4Addr::new(10, 8, 0, 2), true, None, Some("alice_1"), &FakeKeyTool)
            .await
            .unwrap();
        assert!(peer.jitter.is_some());
        assert_eq!(peer.public_key, peer.private_key.public_key());
    }

    #[tokio::test]
    async fn add_wg_peer_allocates_name_and_accepts_supplied_keys() {
        let storage = Storage::open_in_memory().unwrap();
        let user = storage.get_or_create_user("tg:1001", "alice").unwrap();
        let keys = FakeKeyTool.generate_triple().await.unwrap();
        let peer = storage
            .add_wg_peer(user.id, Ipv4Addr::new(10, 8, 0, 2), false, Some(keys.clone()), None, &FakeKeyTool)
            .await
            .unwrap();
        assert_eq!(peer.peer.name, "alice_1");
        assert_eq!(peer.private_key, keys.private);
        assert_eq!(peer.public_key, keys.public);
        assert_eq!(peer.preshared_key, keys.preshared);
    }

    #[tokio::test]
    async fn add_wg_peer_without_amnezia_has_no_jitter() {
        let storage = Storage::open_in_memory().unwrap();
        let user = storage.get_or_create_user("tg:1001", "alice").unwrap();
        let peer = storage
            .add_wg_peer(user.id, Ipv4Addr::new(10, 8, 0, 2), false, None, Some("alice_1"), &FakeKeyTool)
            .await
            .unwrap();
        assert!(peer.jitter.is_none());
    }

    #[tokio::test]
    async fn duplicate_peer_name_for_same_user_is_rejected() {
        let storage = Storage::open_in_memory().unwrap();
        let user = storage.get_or_create_user("tg:1001", "alice").unwrap();
        storage.add_xray_peer(user.id, "alice_1", 3, "xtls-rprx-vision").unwrap();
        let dup = storage.add_xray_peer(user.id, "alice_1", 3, "xtls-rprx-vision");
        assert!(matches!(dup, Err(Error::PeerNameTaken { .. })));
    }

    #[tokio::test]
    async fn deleting_peer_removes_extension_row() {
        let storage = Storage::open_in_memory().unwrap();
        let user = storage.get_or_create_user("tg:1001", "alice").unwrap();
        let peer = storage
            .add_wg_peer(user.id, Ipv4Addr::new(10, 8, 0, 2), false, None, Some("alice_1"), &FakeKeyTool)
            .await
            .unwrap();
        storage.delete_peer(peer.peer.id).unwrap();
        assert!(matches!(storage.get_peer_by_id(peer.peer.id), Err(Error::PeerNotFound { .. })));
        assert!(storage.list_used_ips().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_user_cascades_to_peers() {
        let storage = Storage::open_in_memory().unwrap();
        let user = storage.get_or_create_user("tg:1001", "alice").unwrap();
        let peer = storage
            .add_wg_peer(user.id, Ipv4Addr::new(10, 8, 0, 2), false, None, Some("alice_1"), &FakeKeyTool)
            .await
            .unwrap();
        storage.conn.lock().execute("DELETE FROM users WHERE id = ?1", params![user.id]).unwrap();
        assert!(matches!(storage.get_peer_by_id(peer.peer.id), Err(Error::PeerNotFound { .. })));
    }

    #[tokio::test]
    async fn get_peer_by_ip_finds_owner() {
        let storage = Storage::open_in_memory().unwrap();
        let user = storage.get_or_create_user("tg:1001", "alice").unwrap();
        let ip = Ipv4Addr::new(10, 8, 0, 9);
        storage.add_wg_peer(user.id, ip, false, None, Some("alice_1"), &FakeKeyTool).await.unwrap();
        let found = storage.get_peer_by_ip(ip).unwrap();
        assert_eq!(found.shared_ip, ip);
    }

    #[tokio::test]
    async fn rename_peer_rejects_name_collision() {
        let storage = Storage::open_in_memory().unwrap();
        let user = storage.get_or_create_user("tg:1001", "alice").unwrap();
        let a = storage.add_xray_peer(user.id, "alice_1", 3, "flow").unwrap();
        storage.add_xray_peer(user.id, "alice_2", 3, "flow").unwrap();
        assert!(matches!(
            storage.rename_peer(a.peer.id, "alice_2"),
            Err(Error::PeerNameTaken { .. })
        ));
    }

    #[tokio::test]
    async fn list_users_returns_every_registered_user() {
        let storage = Storage::open_in_memory().unwrap();
        storage.get_or_create_user("tg:1001", "alice").unwrap();
        storage.get_or_create_user("tg:1002", "bob").unwrap();
        let users = storage.list_users().unwrap();
        assert_eq!(users.len(), 2);
    }

    #[tokio::test]
    async fn peer_name_too_long_is_rejected() {
        let storage = Storage::open_in_memory().unwrap();
        let user = storage.get_or_create_user("tg:1001", "alice").unwrap();
        let err = storage.add_xray_peer(user.id, "a_name_sixteen_plus", 3, "flow");
        assert!(matches!(err, Err(Error::PeerNameTooLong(..))));
    }
}
