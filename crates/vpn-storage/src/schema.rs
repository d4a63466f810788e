//! Table definitions for the relational store.
//!
//! Four tables: `users`, `peers` (common fields), `wireguard_peers` and
//! `xray_peers` (one-to-one extensions). Deleting a user cascades to its
//! peers; deleting a peer cascades to its extension row.

pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id   TEXT NOT NULL UNIQUE,
    display_name  TEXT NOT NULL,
    status        INTEGER NOT NULL,
    expires_at    TEXT,
    registered_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS peers (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name         TEXT NOT NULL,
    kind         INTEGER NOT NULL,
    status       INTEGER NOT NULL,
    active_until TEXT,
    UNIQUE(user_id, name)
);

CREATE TABLE IF NOT EXISTS wireguard_peers (
    peer_id       INTEGER PRIMARY KEY REFERENCES peers(id) ON DELETE CASCADE,
    private_key   TEXT NOT NULL,
    public_key    TEXT NOT NULL,
    preshared_key TEXT NOT NULL,
    shared_ip     TEXT NOT NULL UNIQUE,
    is_amnezia    INTEGER NOT NULL,
    jc            INTEGER,
    jmin          INTEGER,
    jmax          INTEGER
);

CREATE TABLE IF NOT EXISTS xray_peers (
    peer_id    INTEGER PRIMARY KEY REFERENCES peers(id) ON DELETE CASCADE,
    inbound_id INTEGER NOT NULL,
    flow       TEXT NOT NULL
);
";
