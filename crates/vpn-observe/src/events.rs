//! Event payloads delivered through the observer's event buses.

use vpn_storage::{PeerRecord, User};

/// A peer transitioned from not-live to live.
#[derive(Debug, Clone)]
pub struct ConnectEvent {
    pub user: User,
    pub peer: PeerRecord,
}

/// A peer transitioned from live to not-live.
#[derive(Debug, Clone)]
pub struct DisconnectEvent {
    pub user: User,
    pub peer: PeerRecord,
}

/// Fired when a peer's active-until timer is near or past expiry.
/// `disconnect` is `false` for a warning, `true` when the peer was just
/// forced into `TimeExpired`.
#[derive(Debug, Clone)]
pub struct TimerEvent {
    pub user: User,
    pub peer: PeerRecord,
    pub disconnect: bool,
}

/// Fired the day before a user's account expires.
#[derive(Debug, Clone)]
pub struct ExpireWarnEvent {
    pub user: User,
}

/// Fired once a user's account has expired and been blocked.
#[derive(Debug, Clone)]
pub struct ExpireBlockEvent {
    pub user: User,
}

/// Fired once, after the connection observer's roster has loaded and its
/// periodic tasks are about to start. Lets a collaborator (e.g. the chat
/// front-end) know the core finished recovering from a restart.
#[derive(Debug, Clone, Copy)]
pub struct ObserverStartupEvent;
