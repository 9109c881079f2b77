//! HTTP client for the relay service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use relaychat_shared::relay::{
    encode_secret, PullRequest, PullResponse, PushRequest, PushResponse,
};
use relaychat_shared::{Bundle, Component, Relay, RelayError, Uuid};

/// Relay reached over `POST {base}/relay/pull` and `POST {base}/relay/push`.
pub struct HttpRelay {
    base: String,
    client: Client,
}

impl HttpRelay {
    /// Every request is bounded by `timeout`.
    pub fn new(base: &str, timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Unreachable(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post<B, R>(&self, path: &str, team: &Uuid, body: &B) -> Result<R, RelayError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let url = format!("{}{}", self.base, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| RelayError::Unreachable(format!("{url}: {e}")))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(RelayError::Unauthorized(team.to_string()))
            }
            status if !status.is_success() => {
                Err(RelayError::Unreachable(format!("{url} answered {status}")))
            }
            _ => resp
                .json()
                .await
                .map_err(|e| RelayError::Malformed(format!("{url}: {e}"))),
        }
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn pull(
        &self,
        team: &Uuid,
        secret: &[u8],
        after: Option<&Uuid>,
        max: usize,
    ) -> Result<Vec<Bundle>, RelayError> {
        let request = PullRequest {
            team: team.clone(),
            secret: encode_secret(secret),
            after: after.cloned(),
            max,
        };
        let response: PullResponse = self.post("/relay/pull", team, &request).await?;

        // The cursor logic relies on ascending ids.
        if response.bundles.windows(2).any(|pair| pair[0].id > pair[1].id) {
            return Err(RelayError::Malformed("bundles out of order".to_string()));
        }

        debug!(count = response.bundles.len(), "relay pull");
        Ok(response.bundles)
    }

    async fn push(
        &self,
        team: &Uuid,
        secret: &[u8],
        user: Component,
        conversation: Component,
        message: Component,
    ) -> Result<Uuid, RelayError> {
        let request = PushRequest {
            team: team.clone(),
            secret: encode_secret(secret),
            user,
            conversation,
            message,
        };
        let response: PushResponse = self.post("/relay/push", team, &request).await?;
        Ok(response.id)
    }
}
