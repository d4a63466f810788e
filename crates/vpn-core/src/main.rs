#![allow(clippy::expect_used)]
//! `vpnd` — the control plane daemon binary.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vpn_config::Config;
use vpn_core::Supervisor;

/// The VPN control plane daemon.
#[derive(Parser, Debug)]
#[command(name = "vpnd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the INI configuration file.
    #[arg(short, long, env = "VPND_CONFIG", default_value = "config.conf")]
    config: PathBuf,

    /// Log level override (error, warn, info, debug, trace).
    #[arg(short, long, env = "VPND_LOG_LEVEL")]
    log_level: Option<String>,
}

fn init_tracing(level: Option<&str>) {
    let filter = level
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

async fn run(cli: Cli) -> vpn_core::Result<()> {
    let config = Config::load(&cli.config)?;
    info!(admins = config.bot.admins.len(), xray_host = %config.xray.host, "configuration loaded");

    let supervisor = std::sync::Arc::new(Supervisor::boot(&config).await?);
    info!("control plane booted");

    let run_handle = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run().await })
    };

    tokio::select! {
        res = run_handle => {
            if let Err(e) = res {
                error!(error = %e, "observer task panicked");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
            supervisor.shutdown();
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    if let Err(e) = runtime.block_on(run(cli)) {
        error!(error = %e, "vpnd exited with an error");
        std::process::exit(1);
    }
}
