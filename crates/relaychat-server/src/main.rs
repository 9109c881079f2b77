//! # relaychat-server
//!
//! Chat server binary. It provides:
//! - **JSON RPC endpoint** (axum) for the client protocol
//! - **Write-through persistence** of every entity to SQLite
//! - **Relay synchronization** with other servers when `RELAY_URL` is set

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relaychat_server::api::{self, AppState};
use relaychat_server::config::ServerConfig;
use relaychat_server::controller::Controller;
use relaychat_server::generator::RandomUuidGenerator;
use relaychat_server::relay::HttpRelay;
use relaychat_server::server::{RelayLink, Server};
use relaychat_server::timeline::Timeline;
use relaychat_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,relaychat_server=debug")),
        )
        .init();

    info!("Starting relaychat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let database = Database::open_at(&config.database_path)?;
    let history = database.load_history()?;
    let ids = RandomUuidGenerator::from_clock(config.server_id.clone());
    let controller = Controller::restore(Box::new(ids), Box::new(database), history)?;

    let (timeline, handle) = Timeline::new();
    let mut server = Server::new(controller, handle.clone());

    match &config.relay_url {
        Some(url) => {
            let relay = HttpRelay::new(url, config.relay_timeout)?;
            server = server.with_relay(RelayLink::new(
                Arc::new(relay),
                config.server_id.clone(),
                config.secret.clone(),
                config.relay_batch_size,
                config.relay_poll,
            ));
            info!(relay = %url, team = %config.server_id, "Relay synchronization enabled");
        }
        None => info!("RELAY_URL not set, running standalone"),
    }

    // -----------------------------------------------------------------------
    // 4. Spawn the server loop (sole owner of chat state)
    // -----------------------------------------------------------------------
    let mut server_task = tokio::spawn(server.run(timeline));

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let state = AppState { timeline: handle };

    tokio::select! {
        result = api::serve(state, config.http_addr) => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        result = &mut server_task => {
            if let Err(e) = result {
                error!(error = %e, "Server loop crashed");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
