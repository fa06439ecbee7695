use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::Config;
use crate::events::EventBus;
use crate::orchestrator::{CancellationToken, Orchestrator};
use crate::store::Store;
use crate::utils::is_privileged;
use crate::vault::InMemoryVault;

#[derive(Parser)]
#[command(name = "reconnet")]
#[command(author = "ReconNet Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "LAN reconnaissance service: device discovery, classification and topology tracking", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, default_value = "reconnet.toml", help = "Path to the config file")]
    pub config: String,

    #[arg(short, long, global = true, help = "Verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Suppress non-error logging")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run one scan against a subnet and print the result")]
    Scan {
        #[arg(help = "CIDR subnet to sweep, e.g. 192.168.1.0/24")]
        subnet: String,
    },

    #[command(about = "Run the long-lived service: scheduler, lost-device sweeper, metrics rollup, passive listeners")]
    Daemon,

    #[command(about = "List known devices")]
    Devices,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config).with_context(|| format!("loading config from {}", cli.config))?;

    if (config.arp_enabled || config.portscan_enabled) && !is_privileged() {
        warn!("not running as root: raw ICMP/ARP collection will fail, falling back to best-effort probes where possible");
    }

    let store = Store::connect(&config.database_path)
        .await
        .context("connecting to store")?;
    store.migrate_recon().await.context("running migrations")?;

    let running_version = if config.dev_mode { "dev".to_string() } else { env!("CARGO_PKG_VERSION").to_string() };
    store.check_version(&running_version).await.context("schema version check")?;

    let events = EventBus::new();
    let vault = Arc::new(InMemoryVault::new());
    let orchestrator = Arc::new(Orchestrator::new(store, events, vault, config));

    match cli.command {
        Commands::Scan { subnet } => {
            let result = orchestrator.run_scan(&subnet, CancellationToken::new()).await?;
            info!(
                subnet = %result.subnet,
                total = result.total,
                online = result.online,
                status = %result.status,
                "scan complete"
            );
            println!(
                "scan {} on {}: {} hosts online out of {} enriched",
                result.id, result.subnet, result.online, result.total
            );
        }
        Commands::Daemon => {
            run_daemon(orchestrator).await?;
        }
        Commands::Devices => {
            for device in orchestrator.store().list_devices().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    device.id,
                    device.mac_address.as_deref().unwrap_or("-"),
                    device.hostname.as_deref().unwrap_or("-"),
                    device.device_type
                );
            }
        }
    }

    Ok(())
}

/// Runs every background loop the service carries (scheduler, lost-device
/// sweeper, metrics rollup, mDNS/UPnP listeners, WiFi/Proxmox syncers) until
/// interrupted, then cancels them all and waits for a clean shutdown.
async fn run_daemon(orchestrator: Arc<Orchestrator>) -> Result<()> {
    let cancel = CancellationToken::new();

    let handles = vec![
        orchestrator.spawn_scheduler(cancel.clone()),
        orchestrator.spawn_lost_checker(cancel.clone()),
        orchestrator.spawn_metrics_loop(cancel.clone()),
        orchestrator.spawn_mdns_listener(cancel.clone()),
        orchestrator.spawn_upnp_listener(cancel.clone()),
        orchestrator.spawn_wifi_sync(cancel.clone()),
        orchestrator.spawn_proxmox_sync(cancel.clone()),
    ];

    info!("reconnet daemon running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown requested, cancelling background tasks");
    cancel.cancel();

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
