//! Daily and periodic policy jobs: warning users ahead of expiry and
//! blocking them (and their peers) once their account time runs out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime, Utc};
use tracing::{info, warn};

use vpn_storage::{PeerRecord, Storage, UserStatus};
use vpn_wireguard::{WgControl, WireGuardHub};
use vpn_xray::XrayWorker;

use crate::events::{ExpireBlockEvent, ExpireWarnEvent};
use crate::EventBus;

#[derive(Debug, Clone)]
pub struct IntervalObserverConfig {
    /// Time of day the expiration sweep runs, local time.
    pub check_expirations_at: NaiveTime,
}

impl Default for IntervalObserverConfig {
    fn default() -> Self {
        Self { check_expirations_at: NaiveTime::from_hms_opt(3, 0, 0).unwrap() }
    }
}

/// Runs the daily expiration sweep and exposes warn/block event buses that
/// a notification layer (e.g. a Telegram bot) can subscribe to.
pub struct IntervalObserver<C: WgControl> {
    config: IntervalObserverConfig,
    storage: Arc<Storage>,
    wghub: Arc<WireGuardHub<C>>,
    xray: Arc<XrayWorker>,
    pub expire_warn: EventBus<ExpireWarnEvent>,
    pub expire_block: EventBus<ExpireBlockEvent>,
}

impl<C: WgControl + Send + Sync + 'static> IntervalObserver<C> {
    pub fn new(
        config: IntervalObserverConfig,
        storage: Arc<Storage>,
        wghub: Arc<WireGuardHub<C>>,
        xray: Arc<XrayWorker>,
    ) -> Self {
        Self {
            config,
            storage,
            wghub,
            xray,
            expire_warn: EventBus::new(),
            expire_block: EventBus::new(),
        }
    }

    /// Sleeps until the next occurrence of `config.check_expirations_at`
    /// local time, then runs `check_expirations`, repeating forever.
    pub async fn scheduled_runner(&self) {
        loop {
            let sleep_for = Self::duration_until(self.config.check_expirations_at);
            tokio::time::sleep(sleep_for).await;
            if let Err(e) = self.check_expirations().await {
                warn!(error = %e, "expiration sweep failed");
            }
        }
    }

    fn duration_until(target: NaiveTime) -> Duration {
        let now = Local::now();
        let today_target = now.date_naive().and_time(target);
        let next = if now.naive_local() < today_target {
            today_target
        } else {
            today_target + chrono::Duration::days(1)
        };
        (next - now.naive_local()).to_std().unwrap_or(Duration::from_secs(1))
    }

    /// Warns users within a day of expiry, and blocks (account + all peers)
    /// any user whose `expires_at` has already passed.
    pub async fn check_expirations(&self) -> crate::error::Result<()> {
        let now = Utc::now();
        for user in self.storage.list_users()? {
            let Some(expires_at) = user.expires_at else { continue };
            if user.status == UserStatus::AccountBlocked {
                continue;
            }

            let today = now.date_naive();
            if expires_at.date_naive() <= today {
                let mut peers = Vec::new();
                for wg in self.storage.get_wireguard_peers(user.id)? {
                    peers.push(PeerRecord::Wireguard(wg));
                }
                for xray in self.storage.get_xray_peers(user.id)? {
                    peers.push(PeerRecord::Xray(xray));
                }
                vpn_peerops::disable_peers(&self.wghub, &self.xray, &self.storage, &peers).await?;
                self.storage.set_user_status(user.id, UserStatus::AccountBlocked)?;
                info!(user_id = user.id, "blocked user: account expired");
                self.expire_block.trigger(ExpireBlockEvent { user: user.clone() }).await;
            } else if (expires_at - chrono::Duration::days(1)).date_naive() <= today {
                self.expire_warn.trigger(ExpireWarnEvent { user }).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vpn_storage::{PeerStatus, UserId};
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

    async fn fixture_hub() -> WireGuardHub<FakeWgControl> {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("wg0.conf");
        std::fs::write(
            &config_path,
            "[Interface]\nPrivateKey = AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\nListenPort = 51820\n",
        )
        .unwrap();
        WireGuardHub::load(config_path, FakeWgControl::default(), false, false).await.unwrap()
    }

    #[tokio::test]
    async fn check_expirations_blocks_user_past_expiry() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let hub = Arc::new(fixture_hub().await);
        let xray = Arc::new(dummy_xray().await);

        let user = storage.get_or_create_user("tg:2001", "bob").unwrap();
        let ip = Ipv4Addr::new(10, 8, 0, 5);
        let wg_peer = storage.add_wg_peer(user.id, ip, false, None, Some("bob_1"), &FakeKeyTool).await.unwrap();
        hub.add_peer(PeerStanza::new("bob_1", wg_peer.public_key.clone(), wg_peer.preshared_key.clone(), ip))
            .await
            .unwrap();
        storage.set_user_expiry(user.id, Some(Utc::now() - chrono::Duration::seconds(1))).unwrap();

        let observer = IntervalObserver::new(IntervalObserverConfig::default(), storage.clone(), hub.clone(), xray);
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        observer.expire_block.register(move |_e| {
            let f = f.clone();
            async move {
                f.fetch_add(1, Ordering::SeqCst);
            }
        }).await;

        observer.check_expirations().await.unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let reloaded = storage.get_user_by_id(user.id).unwrap();
        assert_eq!(reloaded.status, UserStatus::AccountBlocked);
        let peer = storage.get_peer_by_id(wg_peer.peer.id).unwrap();
        assert_eq!(peer.status, PeerStatus::Blocked);
        assert!(!hub.get_peer_enabled(&wg_peer.public_key).await.unwrap());
    }

    #[tokio::test]
    async fn check_expirations_warns_user_within_a_day() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let hub = Arc::new(fixture_hub().await);
        let xray = Arc::new(dummy_xray().await);

        let user = storage.get_or_create_user("tg:2002", "carol").unwrap();
        storage.set_user_expiry(user.id, Some(Utc::now() + chrono::Duration::hours(2))).unwrap();

        let observer = IntervalObserver::new(IntervalObserverConfig::default(), storage.clone(), hub, xray);
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        observer.expire_warn.register(move |_e| {
            let f = f.clone();
            async move {
                f.fetch_add(1, Ordering::SeqCst);
            }
        }).await;

        observer.check_expirations().await.unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let reloaded = storage.get_user_by_id(user.id).unwrap();
        assert_eq!(reloaded.status, UserStatus::Created);
        let _: UserId = reloaded.id;
    }

    #[tokio::test]
    async fn check_expirations_blocks_user_expiring_later_today() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let hub = Arc::new(fixture_hub().await);
        let xray = Arc::new(dummy_xray().await);

        let user = storage.get_or_create_user("tg:2003", "dave").unwrap();
        let end_of_today = Utc::now().date_naive().and_hms_opt(23, 0, 0).unwrap().and_utc();
        storage.set_user_expiry(user.id, Some(end_of_today)).unwrap();

        let observer = IntervalObserver::new(IntervalObserverConfig::default(), storage.clone(), hub, xray);
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        observer.expire_block.register(move |_e| {
            let f = f.clone();
            async move {
                f.fetch_add(1, Ordering::SeqCst);
            }
        }).await;

        observer.check_expirations().await.unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let reloaded = storage.get_user_by_id(user.id).unwrap();
        assert_eq!(reloaded.status, UserStatus::AccountBlocked);
    }
}
