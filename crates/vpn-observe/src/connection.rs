//! Periodic liveness probing and connect/disconnect/timeout event emission.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use vpn_storage::{PeerRecord, PeerStatus, Storage, User, UserStatus};
use vpn_wireguard::{WgControl, WireGuardHub};
use vpn_xray::XrayWorker;

use crate::events::{ConnectEvent, DisconnectEvent, ObserverStartupEvent, TimerEvent};
use crate::liveness::LivenessProbe;
use crate::EventBus;

/// Config knobs for the connection observer's three periodic tasks.
#[derive(Debug, Clone)]
pub struct ConnectionObserverConfig {
    pub listen_timer: Duration,
    pub connected_only_listen_timer: Duration,
    pub update_timer: Duration,
    pub active_hours: i64,
}

impl Default for ConnectionObserverConfig {
    fn default() -> Self {
        Self {
            listen_timer: Duration::from_secs(120),
            connected_only_listen_timer: Duration::from_secs(60),
            update_timer: Duration::from_secs(360),
            active_hours: 5,
        }
    }
}

type Roster = Vec<(User, Vec<PeerRecord>)>;

/// Owns the in-memory roster snapshot and the connect/disconnect/timer
/// event buses, and drives the refresh/probe-all/probe-connected tasks.
pub struct ConnectionObserver<C: WgControl, P: LivenessProbe> {
    config: ConnectionObserverConfig,
    storage: Arc<Storage>,
    wghub: Arc<WireGuardHub<C>>,
    xray: Arc<XrayWorker>,
    probe: Arc<P>,
    roster: RwLock<Roster>,
    /// Mutual exclusion between a probe cycle's full traversal and a roster
    /// reload, independent of `roster`'s own per-access lock.
    cycle_lock: RwLock<()>,
    pub connected: EventBus<ConnectEvent>,
    pub disconnected: EventBus<DisconnectEvent>,
    pub timer: EventBus<TimerEvent>,
    pub startup: EventBus<ObserverStartupEvent>,
}

impl<C: WgControl + Send + Sync + 'static, P: LivenessProbe> ConnectionObserver<C, P> {
    pub fn new(
        config: ConnectionObserverConfig,
        storage: Arc<Storage>,
        wghub: Arc<WireGuardHub<C>>,
        xray: Arc<XrayWorker>,
        probe: Arc<P>,
    ) -> Self {
        Self {
            config,
            storage,
            wghub,
            xray,
            probe,
            roster: RwLock::new(Vec::new()),
            cycle_lock: RwLock::new(()),
            connected: EventBus::new(),
            disconnected: EventBus::new(),
            timer: EventBus::new(),
            startup: EventBus::new(),
        }
    }

    fn load_roster(&self) -> vpn_storage::Result<Roster> {
        let users = self.storage.list_users()?;
        let mut roster = Vec::with_capacity(users.len());
        for user in users {
            let mut peers = Vec::new();
            for wg in self.storage.get_wireguard_peers(user.id)? {
                peers.push(PeerRecord::Wireguard(wg));
            }
            for xray in self.storage.get_xray_peers(user.id)? {
                peers.push(PeerRecord::Xray(xray));
            }
            roster.push((user, peers));
        }
        Ok(roster)
    }

    /// Reloads the roster from storage. Waits for any in-flight probe cycle
    /// to finish before swapping the roster, and blocks new cycles from
    /// starting until the swap is done.
    pub async fn refresh(&self) -> vpn_storage::Result<()> {
        let fresh = self.load_roster()?;
        let _cycle_guard = self.cycle_lock.write().await;
        let mut guard = self.roster.write().await;
        *guard = fresh;
        debug!(update_timer = ?self.config.update_timer, "refreshed client roster");
        Ok(())
    }

    /// One probe traversal, optionally restricted to currently-connected peers.
    ///
    /// Holds `cycle_lock` in shared mode for the whole traversal, including
    /// the awaited checks, so a concurrent `refresh()` (which takes
    /// `cycle_lock` exclusively) cannot replace the roster mid-cycle. This is
    /// a separate lock from `roster` itself, which individual checks still
    /// take (briefly, in write mode) to patch a single peer's status.
    pub async fn probe_cycle(&self, warn_on_timer: bool, connected_only: bool) {
        let _cycle_guard = self.cycle_lock.read().await;
        let roster = self.roster.read().await;
        let mut tasks = Vec::new();
        for (user, peers) in roster.iter() {
            if matches!(user.status, UserStatus::AccountBlocked | UserStatus::TimeExpired) {
                continue;
            }
            for peer in peers {
                let status = peer.peer().status;
                if matches!(status, PeerStatus::TimeExpired | PeerStatus::Blocked) {
                    continue;
                }
                if connected_only && status != PeerStatus::Connected {
                    continue;
                }
                tasks.push(self.check(user.clone(), peer.clone(), warn_on_timer));
            }
        }
        drop(roster);
        futures::future::join_all(tasks).await;
    }

    /// Checks one peer's timer and liveness, firing events on state change.
    pub async fn check(&self, user: User, peer: PeerRecord, warn: bool) {
        if let Some(active_until) = peer.peer().active_until {
            if peer.peer().status == PeerStatus::Connected {
                let delta = active_until - Utc::now();
                if delta <= chrono::Duration::zero() {
                    self.timer.trigger(TimerEvent { user: user.clone(), peer: peer.clone(), disconnect: true }).await;
                    self.emit_timeout_disconnect(user, peer).await;
                    return;
                }
                if warn && delta <= chrono::Duration::minutes(15) {
                    self.timer.trigger(TimerEvent { user: user.clone(), peer: peer.clone(), disconnect: false }).await;
                }
            }
        }

        let alive = match &peer {
            PeerRecord::Wireguard(wg) => self.probe.ping(wg.shared_ip).await,
            PeerRecord::Xray(x) => self.xray.is_connected(x).await,
        };

        let status = peer.peer().status;
        if alive {
            if status == PeerStatus::Disconnected {
                self.emit_connect(user, peer).await;
            }
        } else if status == PeerStatus::Connected {
            self.emit_disconnect(user, peer).await;
        }
    }

    async fn emit_connect(&self, user: User, peer: PeerRecord) {
        let active_until = Utc::now() + chrono::Duration::hours(self.config.active_hours);
        if let Err(e) = self.storage.set_peer_active_until(peer.peer().id, Some(active_until)) {
            warn!(peer_id = peer.peer().id, error = %e, "failed to persist active-until on connect");
        }
        if let Err(e) = self.storage.set_peer_status(peer.peer().id, PeerStatus::Connected) {
            warn!(peer_id = peer.peer().id, error = %e, "failed to persist status on connect");
        }
        if let Err(e) = self.storage.set_user_status(user.id, UserStatus::Connected) {
            warn!(user_id = user.id, error = %e, "failed to persist user status on connect");
        }
        self.patch_roster_status(peer.peer().id, PeerStatus::Connected, Some(active_until)).await;
        self.connected.trigger(ConnectEvent { user, peer }).await;
    }

    async fn emit_disconnect(&self, user: User, peer: PeerRecord) {
        if let Err(e) = self.storage.set_peer_status(peer.peer().id, PeerStatus::Disconnected) {
            warn!(peer_id = peer.peer().id, error = %e, "failed to persist status on disconnect");
        }
        self.patch_roster_status(peer.peer().id, PeerStatus::Disconnected, peer.peer().active_until).await;
        if self.user_has_connected_peer(user.id).await == Some(false) {
            if let Err(e) = self.storage.set_user_status(user.id, UserStatus::Disconnected) {
                warn!(user_id = user.id, error = %e, "failed to persist user status on disconnect");
            }
        }
        self.disconnected.trigger(DisconnectEvent { user, peer }).await;
    }

    async fn emit_timeout_disconnect(&self, user: User, peer: PeerRecord) {
        if let Err(e) = self.storage.set_peer_status(peer.peer().id, PeerStatus::TimeExpired) {
            warn!(peer_id = peer.peer().id, error = %e, "failed to persist status on timeout");
        }
        self.patch_roster_status(peer.peer().id, PeerStatus::TimeExpired, peer.peer().active_until).await;

        let disable_result = match &peer {
            PeerRecord::Wireguard(wg) => self.wghub.disable_peer(&wg.public_key).await.map_err(|e| e.to_string()),
            PeerRecord::Xray(x) => self.xray.disable_peer(x).await.map_err(|e| e.to_string()),
        };
        if let Err(e) = disable_result {
            warn!(peer_id = peer.peer().id, error = %e, "failed to disable expired peer on dataplane");
        }

        if self.user_has_connected_peer(user.id).await == Some(false) {
            if let Err(e) = self.storage.set_user_status(user.id, UserStatus::TimeExpired) {
                warn!(user_id = user.id, error = %e, "failed to persist user status on timeout");
            }
        }
        self.disconnected.trigger(DisconnectEvent { user, peer }).await;
    }

    /// Updates the in-memory roster so re-entrant probes within the same
    /// cycle see the new status without waiting for the next refresh.
    async fn patch_roster_status(&self, peer_id: vpn_storage::PeerId, status: PeerStatus, active_until: Option<chrono::DateTime<Utc>>) {
        let mut roster = self.roster.write().await;
        for (_, peers) in roster.iter_mut() {
            for record in peers.iter_mut() {
                if record.peer().id == peer_id {
                    match record {
                        PeerRecord::Wireguard(wg) => {
                            wg.peer.status = status;
                            wg.peer.active_until = active_until;
                        }
                        PeerRecord::Xray(x) => {
                            x.peer.status = status;
                            x.peer.active_until = active_until;
                        }
                    }
                }
            }
        }
    }

    async fn user_has_connected_peer(&self, user_id: vpn_storage::UserId) -> Option<bool> {
        let roster = self.roster.read().await;
        roster.iter().find(|(u, _)| u.id == user_id).map(|(_, peers)| {
            peers.iter().any(|p| p.peer().status == PeerStatus::Connected)
        })
    }

}
