//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a single server can start with zero
//! configuration for local development. Without `RELAY_URL` the server runs
//! standalone and never polls or pushes.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use relaychat_shared::constants::{DEFAULT_HTTP_PORT, RELAY_BATCH_SIZE, RELAY_REFRESH_MS};
use relaychat_shared::relay::decode_secret;
use relaychat_shared::Uuid;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Identifier of this server. Roots every identifier it mints and names
    /// it to the relay.
    /// Env: `SERVER_ID` (dotted identifier)
    /// Default: `1`
    pub server_id: Uuid,

    /// Secret shared with the relay.
    /// Env: `SERVER_SECRET` (hex)
    /// Default: empty
    pub secret: Vec<u8>,

    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Base URL of the relay service.
    /// Env: `RELAY_URL`
    /// Default: none (synchronization disabled)
    pub relay_url: Option<String>,

    /// Env: `RELAY_POLL_MS`
    /// Default: `5000`
    pub relay_poll: Duration,

    /// Env: `RELAY_BATCH_SIZE`
    /// Default: `32`
    pub relay_batch_size: usize,

    /// Upper bound on one relay HTTP call.
    /// Env: `RELAY_TIMEOUT_MS`
    /// Default: `3000`
    pub relay_timeout: Duration,

    /// SQLite file receiving write-through copies of every entity.
    /// Env: `DATABASE_PATH`
    /// Default: `./relaychat.db`
    pub database_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_id: Uuid::top(1),
            secret: Vec::new(),
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            relay_url: None,
            relay_poll: Duration::from_millis(RELAY_REFRESH_MS),
            relay_batch_size: RELAY_BATCH_SIZE,
            relay_timeout: Duration::from_millis(3000),
            database_path: PathBuf::from("./relaychat.db"),
        }
    }
}

// The secret stays out of logs.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("server_id", &self.server_id.to_string())
            .field("secret_len", &self.secret.len())
            .field("http_addr", &self.http_addr)
            .field("relay_url", &self.relay_url)
            .field("relay_poll", &self.relay_poll)
            .field("relay_batch_size", &self.relay_batch_size)
            .field("relay_timeout", &self.relay_timeout)
            .field("database_path", &self.database_path)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(id) = lookup("SERVER_ID") {
            match id.parse::<Uuid>() {
                Ok(parsed) => config.server_id = parsed,
                Err(e) => tracing::warn!(value = %id, error = %e, "Invalid SERVER_ID, using default"),
            }
        }

        if let Some(secret) = lookup("SERVER_SECRET") {
            match decode_secret(secret.trim()) {
                Ok(bytes) => config.secret = bytes,
                Err(e) => tracing::warn!(error = %e, "Invalid SERVER_SECRET, using empty secret"),
            }
        }

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(url) = lookup("RELAY_URL") {
            if !url.trim().is_empty() {
                config.relay_url = Some(url.trim().to_string());
            }
        }

        if let Some(ms) = parse_number::<u64>(&lookup, "RELAY_POLL_MS") {
            config.relay_poll = Duration::from_millis(ms);
        }

        if let Some(n) = parse_number::<usize>(&lookup, "RELAY_BATCH_SIZE") {
            if n > 0 {
                config.relay_batch_size = n;
            } else {
                tracing::warn!("RELAY_BATCH_SIZE must be positive, using default");
            }
        }

        if let Some(ms) = parse_number::<u64>(&lookup, "RELAY_TIMEOUT_MS") {
            config.relay_timeout = Duration::from_millis(ms);
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid number, using default");
            None
        }
    }
}
