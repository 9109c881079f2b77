use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use relaychat_relay::api::{self, AppState};
use relaychat_relay::config::RelayConfig;
use relaychat_shared::MemoryRelay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,relaychat_relay=debug")),
        )
        .init();

    let config = RelayConfig::from_env();
    info!(?config, "Relay configuration loaded");

    if config.teams.is_empty() {
        tracing::warn!("RELAY_TEAMS is empty, every request will be refused");
    }

    let relay = Arc::new(MemoryRelay::new());
    for (team, secret) in config.teams {
        info!(team = %team, "Team registered");
        relay.register(team, secret).await;
    }

    let state = AppState {
        relay,
        max_batch: config.max_batch,
    };

    tokio::select! {
        result = api::serve(state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Relay HTTP server failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down relay");
        }
    }

    Ok(())
}
