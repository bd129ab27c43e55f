mod supervisor;

use std::sync::Mutex;

use md_common::EnvConfig;
use md_dhcp::{DhcpConfig, DhcpServer, SharedDhcpState};
use signal_hook::consts::SIGUSR1;
use signal_hook_tokio::Signals;
use supervisor::{ServicePriority, spawn_supervised};
use tokio_stream::StreamExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// The lease table is only ever touched from this one thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let env = EnvConfig::load(None);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&env.log_filter)),
        )
        .init();

    info!("minidhcp starting...");

    let config = DhcpConfig::load(&env.config_path)?;
    if !config.enabled {
        info!("DHCP disabled in {}, nothing to do", env.config_path.display());
        return Ok(());
    }

    let state = md_dhcp::new_state(&config)?;
    {
        let s = state.read().await;
        let table = s.dispatcher.table();
        info!(
            "Serving {} address(es) from {} (capacity {}), lease {}s",
            table.len(),
            config.range_start,
            table.capacity(),
            config.lease_time_secs,
        );
    }

    // Bind errors end the process here instead of looping in the supervisor.
    let server = DhcpServer::bind(&config, state.clone()).await?;

    // DHCP server (Critical): first run on the socket bound above, rebind on restart
    let mut dhcp = {
        let bound = Mutex::new(Some(server));
        let state_c = state.clone();
        let config_c = config.clone();
        spawn_supervised("dhcp", ServicePriority::Critical, move || {
            let server = bound.lock().ok().and_then(|mut slot| slot.take());
            let state = state_c.clone();
            let config = config_c.clone();
            async move {
                match server {
                    Some(server) => server.run().await,
                    None => md_dhcp::server::run_dhcp_server(config, state).await,
                }
            }
        })
    };

    // Lease dump on SIGUSR1 (Background)
    {
        let state_c = state.clone();
        spawn_supervised("lease-dump", ServicePriority::Background, move || {
            let state = state_c.clone();
            async move { handle_sigusr1(state).await }
        });
    }

    info!("minidhcp started successfully");

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Shutting down...");
        }
        res = &mut dhcp => {
            log_leases(&state).await;
            return res?.map_err(|e| e.context("DHCP service stopped"));
        }
    }
    log_leases(&state).await;

    Ok(())
}

async fn handle_sigusr1(state: SharedDhcpState) -> anyhow::Result<()> {
    let mut signals = Signals::new([SIGUSR1])?;

    while let Some(signal) = signals.next().await {
        if signal == SIGUSR1 {
            log_leases(&state).await;
        }
    }

    error!("SIGUSR1 stream ended");
    Ok(())
}

async fn log_leases(state: &SharedDhcpState) {
    let s = state.read().await;
    let table = s.dispatcher.table();
    info!("Lease table: {}/{} bound", table.bound_count(), table.len());
    for entry in table.entries() {
        match entry.owner {
            Some(owner) => info!("  {} -> {} ({}s)", entry.address, owner, entry.lease_secs),
            None => info!("  {} free", entry.address),
        }
    }
}
