use axum::{
    extract::{rejection::JsonRejection, State},
    http::Method,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use relaychat_shared::protocol::{Request, Response};

use crate::error::ServerError;
use crate::server::Event;
use crate::timeline::TimelineHandle;

#[derive(Clone)]
pub struct AppState {
    pub timeline: TimelineHandle<Event>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/rpc", post(rpc))
        .layer(cors)
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

async fn rpc(
    State(state): State<AppState>,
    payload: Result<Json<Request>, JsonRejection>,
) -> Result<Json<Response>, ServerError> {
    let Json(request) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let response = submit(&state.timeline, request).await?;
    Ok(Json(response))
}

/// Queue `request` on the timeline and wait for the server loop to answer.
pub async fn submit(
    timeline: &TimelineHandle<Event>,
    request: Request,
) -> Result<Response, ServerError> {
    let (reply, answer) = oneshot::channel();
    timeline
        .schedule_now(Event::Request { request, reply })
        .map_err(|e| ServerError::Unavailable(e.to_string()))?;

    answer
        .await
        .map_err(|_| ServerError::Unavailable("request dropped by server loop".to_string()))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    use relaychat_shared::{MemorySink, Uuid};

    use super::*;
    use crate::controller::Controller;
    use crate::generator::RandomUuidGenerator;
    use crate::server::Server;
    use crate::timeline::Timeline;

    fn spawn_server() -> AppState {
        let ids = RandomUuidGenerator::new(Uuid::top(1), 3);
        let controller = Controller::new(Box::new(ids), Box::new(MemorySink::new())).unwrap();
        let (timeline, handle) = Timeline::new();
        tokio::spawn(Server::new(controller, handle.clone()).run(timeline));
        AppState { timeline: handle }
    }

    async fn call(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
        let request = HttpRequest::post("/rpc")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(spawn_server());
        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rpc_round_trip() {
        let app = build_router(spawn_server());

        let (status, body) = call(
            app.clone(),
            r#"{"type":"new_user","name":"ada","password":"pw"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "user");
        assert_eq!(body["body"]["name"], "ada");
        assert!(body["body"].get("password").is_none());

        let (_, body) = call(app, r#"{"type":"check_username","name":"ADA"}"#).await;
        assert_eq!(body["type"], "username_taken");
        assert_eq!(body["body"], true);
    }

    #[tokio::test]
    async fn test_rpc_rejects_bad_payload() {
        let app = build_router(spawn_server());
        let (status, body) = call(app, r#"{"type":"launch_rockets"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_rpc_without_server_loop_is_unavailable() {
        let (timeline, handle) = Timeline::<Event>::new();
        drop(timeline);
        let app = build_router(AppState { timeline: handle });

        let (status, _) = call(app, r#"{"type":"get_user_generation"}"#).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
