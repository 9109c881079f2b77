//! Relay contract shared by chat servers and the relay service.
//!
//! Servers push one [`Bundle`] per locally created message and pull bundles
//! pushed by every team, including their own. Bundles carry snapshots of
//! the entities they reference, never ownership or links.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::RelayError;
use crate::types::Uuid;

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

/// Snapshot of one entity: its identifier, display text and creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Component {
    pub id: Uuid,
    pub text: String,
    pub time: DateTime<Utc>,
}

impl Component {
    pub fn pack(id: Uuid, text: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            id,
            text: text.into(),
            time,
        }
    }
}

/// One relay event. A bundle always names a user; it names a message only
/// together with the conversation the message belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bundle {
    /// Relay-assigned identifier, strictly increasing in push order.
    pub id: Uuid,
    /// Server that pushed the bundle.
    pub team: Uuid,
    /// When the relay accepted the bundle.
    pub time: DateTime<Utc>,
    pub user: Component,
    pub conversation: Option<Component>,
    pub message: Option<Component>,
}

// ---------------------------------------------------------------------------
// Relay contract
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Relay: Send + Sync {
    /// Fetch up to `max` bundles whose id is strictly greater than `after`,
    /// in ascending id order.
    async fn pull(
        &self,
        team: &Uuid,
        secret: &[u8],
        after: Option<&Uuid>,
        max: usize,
    ) -> Result<Vec<Bundle>, RelayError>;

    /// Publish one message event. Returns the id the relay assigned to it.
    async fn push(
        &self,
        team: &Uuid,
        secret: &[u8],
        user: Component,
        conversation: Component,
        message: Component,
    ) -> Result<Uuid, RelayError>;
}

// ---------------------------------------------------------------------------
// HTTP wire types
// ---------------------------------------------------------------------------

/// Hex form of a shared secret as carried in wire requests.
pub fn encode_secret(secret: &[u8]) -> String {
    hex::encode(secret)
}

pub fn decode_secret(secret: &str) -> Result<Vec<u8>, RelayError> {
    hex::decode(secret).map_err(|e| RelayError::Malformed(format!("secret is not hex: {e}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub team: Uuid,
    /// Hex-encoded shared secret.
    pub secret: String,
    pub after: Option<Uuid>,
    pub max: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub bundles: Vec<Bundle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub team: Uuid,
    /// Hex-encoded shared secret.
    pub secret: String,
    pub user: Component,
    pub conversation: Component,
    pub message: Component,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub id: Uuid,
}

// ---------------------------------------------------------------------------
// In-process relay
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    teams: HashMap<Uuid, Vec<u8>>,
    bundles: Vec<Bundle>,
    last_id: u32,
}

/// Relay holding every bundle in memory. Only registered teams may pull
/// or push.
#[derive(Default)]
pub struct MemoryRelay {
    inner: Mutex<Inner>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `team` to use the relay with the given shared secret.
    pub async fn register(&self, team: Uuid, secret: Vec<u8>) {
        self.inner.lock().await.teams.insert(team, secret);
    }

    /// Number of bundles accepted so far.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.bundles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn authorize(inner: &Inner, team: &Uuid, secret: &[u8]) -> Result<(), RelayError> {
        let Some(expected) = inner.teams.get(team) else {
            return Err(RelayError::Unauthorized(team.to_string()));
        };
        if expected.len() != secret.len() || expected.as_slice().ct_eq(secret).unwrap_u8() != 1 {
            return Err(RelayError::Unauthorized(team.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn pull(
        &self,
        team: &Uuid,
        secret: &[u8],
        after: Option<&Uuid>,
        max: usize,
    ) -> Result<Vec<Bundle>, RelayError> {
        let inner = self.inner.lock().await;
        Self::authorize(&inner, team, secret)?;

        // Bundles are appended with increasing ids, so the vector is sorted.
        let start = match after {
            Some(after) => inner.bundles.partition_point(|b| &b.id <= after),
            None => 0,
        };
        let bundles: Vec<Bundle> = inner.bundles[start..].iter().take(max).cloned().collect();

        debug!(team = %team, count = bundles.len(), "Relay pull served");
        Ok(bundles)
    }

    async fn push(
        &self,
        team: &Uuid,
        secret: &[u8],
        user: Component,
        conversation: Component,
        message: Component,
    ) -> Result<Uuid, RelayError> {
        let mut inner = self.inner.lock().await;
        Self::authorize(&inner, team, secret)?;

        let next = inner
            .last_id
            .checked_add(1)
            .ok_or_else(|| RelayError::Malformed("relay bundle ids exhausted".to_string()))?;
        inner.last_id = next;

        let id = Uuid::top(next);
        inner.bundles.push(Bundle {
            id: id.clone(),
            team: team.clone(),
            time: Utc::now(),
            user,
            conversation: Some(conversation),
            message: Some(message),
        });

        debug!(team = %team, bundle = %id, "Relay push accepted");
        Ok(id)
    }
}
