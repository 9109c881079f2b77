/// Interval between two relay polls in milliseconds
pub const RELAY_REFRESH_MS: u64 = 5000;

/// Maximum number of bundles requested from the relay per poll
pub const RELAY_BATCH_SIZE: usize = 32;

/// Credential given to users learned through the relay. Such users cannot
/// log in through this path.
pub const RELAY_USER_PASSWORD: &str = "Temporal Password for Relay";

/// Name and credential of the user created on first start
pub const ADMIN_NAME: &str = "Admin";
pub const ADMIN_PASSWORD: &str = "admin";

/// Upper bound on identifier candidates drawn for one entity
pub const MAX_ID_ATTEMPTS: usize = 64;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default HTTP API port (relay)
pub const DEFAULT_RELAY_PORT: u16 = 8090;
