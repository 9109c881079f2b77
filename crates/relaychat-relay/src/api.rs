use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use relaychat_shared::relay::{
    decode_secret, PullRequest, PullResponse, PushRequest, PushResponse,
};
use relaychat_shared::{MemoryRelay, Relay};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<MemoryRelay>,
    /// Upper bound on the bundles returned by one pull.
    pub max_batch: usize,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/relay/pull", post(pull))
        .route("/relay/push", post(push))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn pull(
    State(state): State<AppState>,
    payload: Result<Json<PullRequest>, JsonRejection>,
) -> Result<Json<PullResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let secret = decode_secret(&request.secret)?;
    let max = request.max.min(state.max_batch);

    let bundles = state
        .relay
        .pull(&request.team, &secret, request.after.as_ref(), max)
        .await
        .map_err(|e| {
            warn!(team = %request.team, error = %e, "pull refused");
            e
        })?;

    Ok(Json(PullResponse { bundles }))
}

async fn push(
    State(state): State<AppState>,
    payload: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let secret = decode_secret(&request.secret)?;

    let id = state
        .relay
        .push(
            &request.team,
            &secret,
            request.user,
            request.conversation,
            request.message,
        )
        .await
        .map_err(|e| {
            warn!(team = %request.team, error = %e, "push refused");
            e
        })?;

    Ok(Json(PushResponse { id }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting relay HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use relaychat_shared::{Component, Uuid};

    use super::*;

    async fn app() -> Router {
        let relay = Arc::new(MemoryRelay::new());
        relay.register(Uuid::top(1), vec![0xca, 0xfe]).await;
        build_router(AppState {
            relay,
            max_batch: 2,
        })
    }

    async fn call(app: Router, path: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn push_body(secret: &str, text: &str) -> Value {
        let c = |id: u32, text: &str| {
            serde_json::to_value(Component::pack(Uuid::top(id), text, Utc::now())).unwrap()
        };
        json!({
            "team": "1",
            "secret": secret,
            "user": c(10, "ada"),
            "conversation": c(20, "general"),
            "message": c(30, text),
        })
    }

    #[tokio::test]
    async fn test_push_then_pull() {
        let app = app().await;

        let (status, first) = call(app.clone(), "/relay/push", push_body("cafe", "hi")).await;
        assert_eq!(status, StatusCode::OK);
        let (_, second) = call(app.clone(), "/relay/push", push_body("cafe", "there")).await;

        let (status, body) = call(
            app,
            "/relay/pull",
            json!({ "team": "1", "secret": "cafe", "after": first["id"], "max": 32 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let bundles = body["bundles"].as_array().unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0]["id"], second["id"]);
        assert_eq!(bundles[0]["message"]["text"], "there");
    }

    #[tokio::test]
    async fn test_pull_is_capped_at_max_batch() {
        let app = app().await;
        for text in ["a", "b", "c"] {
            let (status, _) = call(app.clone(), "/relay/push", push_body("cafe", text)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = call(
            app,
            "/relay/pull",
            json!({ "team": "1", "secret": "cafe", "after": null, "max": 1000 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bundles"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_unauthorized() {
        let (status, body) = call(
            app().await,
            "/relay/pull",
            json!({ "team": "1", "secret": "beef", "after": null, "max": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_garbage_is_bad_request() {
        let app = app().await;

        let (status, _) = call(app.clone(), "/relay/push", push_body("not hex", "hi")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(app, "/relay/pull", json!({ "team": "1" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
