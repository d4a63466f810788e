//! Boots every component from a loaded [`vpn_config::Config`] and runs the
//! connection/interval observers until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use ipnet::Ipv4Net;
use tokio::sync::broadcast;
use tracing::{info, warn};

use vpn_config::Config;
use vpn_network::IpQueue;
use vpn_observe::{ConnectionObserver, ConnectionObserverConfig, IcmpProbe, IntervalObserver, IntervalObserverConfig};
use vpn_storage::Storage;
use vpn_wireguard::{CliWgControl, WireGuardHub};
use vpn_xray::{XrayConfig, XrayWorker};

use crate::error::Result;

pub type ShutdownRx = broadcast::Receiver<()>;
pub type ShutdownTx = broadcast::Sender<()>;

/// Every live component the supervisor assembles at boot.
pub struct Supervisor {
    pub storage: Arc<Storage>,
    pub ip_queue: Arc<IpQueue>,
    pub wghub: Arc<WireGuardHub<CliWgControl>>,
    pub xray: Arc<XrayWorker>,
    pub connection: Arc<ConnectionObserver<CliWgControl, IcmpProbe>>,
    pub interval: Arc<IntervalObserver<CliWgControl>>,
    timers: ConnectionObserverConfig,
    shutdown_tx: ShutdownTx,
}

impl Supervisor {
    /// Opens storage, loads the WireGuard interface, logs into the Xray
    /// admin panel, and wires the observers together. Does not start any
    /// background task yet — call [`Supervisor::run`] for that.
    pub async fn boot(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config.db.path)?);

        let control = if config.wireguard.junk.trim().is_empty() { CliWgControl::wg() } else { CliWgControl::awg() };
        let is_amnezia = !config.wireguard.junk.trim().is_empty();
        let wghub = Arc::new(WireGuardHub::load(config.wireguard.interface_path.clone(), control, true, is_amnezia).await?);

        let xray = Arc::new(
            XrayWorker::login(XrayConfig {
                scheme: if config.xray.tls { "https".to_string() } else { "http".to_string() },
                host: config.xray.host.clone(),
                port: config.xray.port,
                web_path: config.xray.web_path.clone(),
                username: config.xray.username.clone(),
                password: config.xray.password.clone(),
                token: config.xray.token.clone(),
            })
            .await?,
        );

        let ip_queue = Arc::new(build_ip_queue(config, &storage)?);

        let timers = ConnectionObserverConfig {
            listen_timer: Duration::from_secs(config.core.connection_listen_timer_secs),
            connected_only_listen_timer: Duration::from_secs(config.core.connection_connected_only_listen_timer_secs),
            update_timer: Duration::from_secs(config.core.connection_update_timer_secs),
            active_hours: i64::from(config.core.peer_active_time_hours),
        };

        let probe = Arc::new(IcmpProbe::new(Duration::from_secs(2))?);
        let connection = Arc::new(ConnectionObserver::new(
            timers.clone(),
            storage.clone(),
            wghub.clone(),
            xray.clone(),
            probe,
        ));

        let interval = Arc::new(IntervalObserver::new(
            IntervalObserverConfig::default(),
            storage.clone(),
            wghub.clone(),
            xray.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self { storage, ip_queue, wghub, xray, connection, interval, timers, shutdown_tx })
    }

    pub fn shutdown_rx(&self) -> ShutdownRx {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown(&self) {
        info!("shutdown signal received");
        let _ = self.shutdown_tx.send(());
    }

    /// Runs the observer background tasks until shutdown is signaled.
    pub async fn run(&self) {
        self.connection.timer.register(|e| async move {
            info!(user_id = e.user.id, disconnect = e.disconnect, "peer timer event");
        }).await;
        self.connection.connected.register(|e| async move {
            info!(user_id = e.user.id, peer_id = e.peer.peer().id, "peer connected");
        }).await;
        self.connection.disconnected.register(|e| async move {
            info!(user_id = e.user.id, peer_id = e.peer.peer().id, "peer disconnected");
        }).await;
        self.interval.expire_warn.register(|e| async move {
            info!(user_id = e.user.id, "account expiring within a day");
        }).await;
        self.interval.expire_block.register(|e| async move {
            warn!(user_id = e.user.id, "account blocked: expired");
        }).await;
        self.connection.startup.register(|_| async move {
            info!("observer startup complete");
        }).await;

        if let Err(e) = self.connection.refresh().await {
            warn!(error = %e, "initial roster refresh failed");
        }
        self.connection.startup.trigger(vpn_observe::ObserverStartupEvent).await;

        let mut shutdown_listen = self.shutdown_rx();
        let mut shutdown_connected_only = self.shutdown_rx();
        let mut shutdown_refresh = self.shutdown_rx();
        let mut shutdown_interval = self.shutdown_rx();

        tokio::join!(
            self.probe_loop(self.timers.listen_timer, false, true, &mut shutdown_listen),
            self.probe_loop(self.timers.connected_only_listen_timer, true, false, &mut shutdown_connected_only),
            self.refresh_loop(self.timers.update_timer, &mut shutdown_refresh),
            self.interval_loop(&mut shutdown_interval),
        );
    }

    async fn probe_loop(&self, period: Duration, connected_only: bool, warn_on_timer: bool, shutdown: &mut ShutdownRx) {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.connection.probe_cycle(warn_on_timer, connected_only).await;
                }
                _ = shutdown.recv() => {
                    info!(connected_only, "probe loop stopping");
                    return;
                }
            }
        }
    }

    async fn refresh_loop(&self, period: Duration, shutdown: &mut ShutdownRx) {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.connection.refresh().await {
                        warn!(error = %e, "roster refresh failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("refresh loop stopping");
                    return;
                }
            }
        }
    }

    async fn interval_loop(&self, shutdown: &mut ShutdownRx) {
        tokio::select! {
            () = self.interval.scheduled_runner() => {}
            _ = shutdown.recv() => {
                info!("interval loop stopping");
            }
        }
    }
}

/// The configured `IP` is always a 3-octet prefix (`.0`/`.1`/`.255` are
/// reserved), so the pool is always a `/24` regardless of `IPMask` — that
/// setting controls the mask written into each client's own `Address =`
/// line, a separate concern handled by `vpn_wireguard::render_client_config`.
fn build_ip_queue(config: &Config, storage: &Storage) -> Result<IpQueue> {
    let prefix = &config.wireguard.subnet_prefix;
    let cidr = format!("{prefix}.0/24");
    let subnet: Ipv4Net = cidr.parse().unwrap_or_else(|_| "10.8.0.0/24".parse().unwrap());

    let used = storage.list_used_ips()?;
    Ok(IpQueue::from_subnet(subnet, &used, &vpn_network::RESERVED_LAST_OCTETS)?)
}
