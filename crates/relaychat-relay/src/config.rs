//! Relay configuration loaded from environment variables.

use std::fmt;
use std::net::SocketAddr;

use relaychat_shared::constants::{DEFAULT_RELAY_PORT, RELAY_BATCH_SIZE};
use relaychat_shared::relay::decode_secret;
use relaychat_shared::Uuid;

#[derive(Clone)]
pub struct RelayConfig {
    /// Env: `RELAY_HTTP_ADDR`
    /// Default: `0.0.0.0:8090`
    pub http_addr: SocketAddr,

    /// Servers allowed to pull and push, with their shared secrets.
    /// Env: `RELAY_TEAMS` as `id=hexsecret,id=hexsecret`
    /// Default: none
    pub teams: Vec<(Uuid, Vec<u8>)>,

    /// Most bundles handed out by one pull, whatever the caller asks for.
    /// Env: `RELAY_MAX_BATCH`
    /// Default: `32`
    pub max_batch: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_RELAY_PORT).into(),
            teams: Vec::new(),
            max_batch: RELAY_BATCH_SIZE,
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let teams: Vec<String> = self.teams.iter().map(|(id, _)| id.to_string()).collect();
        f.debug_struct("RelayConfig")
            .field("http_addr", &self.http_addr)
            .field("teams", &teams)
            .field("max_batch", &self.max_batch)
            .finish()
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("RELAY_HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid RELAY_HTTP_ADDR, using default");
            }
        }

        if let Some(teams) = lookup("RELAY_TEAMS") {
            config.teams = parse_teams(&teams);
        }

        if let Some(raw) = lookup("RELAY_MAX_BATCH") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_batch = n,
                _ => tracing::warn!(value = %raw, "Invalid RELAY_MAX_BATCH, using default"),
            }
        }

        config
    }
}

/// Entries that fail to parse are skipped with a warning.
fn parse_teams(raw: &str) -> Vec<(Uuid, Vec<u8>)> {
    let mut teams = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((id, secret)) = entry.split_once('=') else {
            tracing::warn!(entry, "RELAY_TEAMS entry lacks '=', skipped");
            continue;
        };

        let id = match id.trim().parse::<Uuid>() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(entry, error = %e, "Invalid team id in RELAY_TEAMS, skipped");
                continue;
            }
        };

        match decode_secret(secret.trim()) {
            Ok(secret) => teams.push((id, secret)),
            Err(e) => tracing::warn!(team = %id, error = %e, "Invalid team secret, skipped"),
        }
    }

    teams
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_lookup(|_| None);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8090).into());
        assert!(config.teams.is_empty());
        assert_eq!(config.max_batch, 32);
    }

    #[test]
    fn test_teams_are_parsed_and_bad_entries_skipped() {
        let config = RelayConfig::from_lookup(|key| match key {
            "RELAY_TEAMS" => Some("1=00ff, 2.5=cafe,broken,x=00,3=zz".to_string()),
            "RELAY_HTTP_ADDR" => Some("127.0.0.1:9000".to_string()),
            "RELAY_MAX_BATCH" => Some("0".to_string()),
            _ => None,
        });

        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.max_batch, 32);
        assert_eq!(
            config.teams,
            vec![
                (Uuid::top(1), vec![0x00, 0xff]),
                (Uuid::new(Some(Uuid::top(2)), 5), vec![0xca, 0xfe]),
            ]
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = RelayConfig::from_lookup(|key| {
            (key == "RELAY_TEAMS").then(|| "1=deadbeef".to_string())
        });
        assert!(!format!("{config:?}").contains("deadbeef"));
    }
}
