use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use warden_core::Warden;
use warden_core::gate::{DENIAL_MESSAGE, LoginDecision};

/// HTTP surface the proxy plugin calls. Thin translation onto the core;
/// every domain decision lives behind [`Warden`].
pub fn router(warden: Arc<Warden>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/gate/login", post(gate_login))
        .route("/v1/gate/server-switch", post(gate_server_switch))
        .route("/v1/verify/submit", post(verify_submit))
        .route("/v1/xp", post(xp_event))
        .route("/v1/playtime", post(playtime))
        .with_state(warden)
}

pub async fn serve(bind_addr: String, warden: Arc<Warden>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "proxy API listening");
    axum::serve(listener, router(warden)).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

#[derive(Deserialize)]
struct LoginRequest {
    player_uuid: Uuid,
    username: String,
}

#[derive(Serialize)]
struct LoginResponse {
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    confined_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

/// Login hook: the proxy blocks the connection on this answer, and the
/// gate itself downgrades timeouts and storage failures to denials.
async fn gate_login(
    State(warden): State<Arc<Warden>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let response = match warden
        .login_decision(request.player_uuid, &request.username)
        .await
    {
        LoginDecision::Allow => LoginResponse {
            allowed: true,
            confined_to: None,
            message: None,
        },
        LoginDecision::Confined(server) => LoginResponse {
            allowed: true,
            confined_to: Some(server),
            message: None,
        },
        LoginDecision::Deny => LoginResponse {
            allowed: false,
            confined_to: None,
            message: Some(DENIAL_MESSAGE),
        },
    };
    Json(response).into_response()
}

#[derive(Deserialize)]
struct ServerSwitchRequest {
    username: String,
    target_server: String,
}

#[derive(Serialize)]
struct ServerSwitchResponse {
    allowed: bool,
}

async fn gate_server_switch(
    State(warden): State<Arc<Warden>>,
    Json(request): Json<ServerSwitchRequest>,
) -> Response {
    let allowed = warden
        .server_connect_allowed(&request.username, &request.target_server)
        .await;
    Json(ServerSwitchResponse { allowed }).into_response()
}

#[derive(Deserialize)]
struct SubmitCodeRequest {
    username: String,
    code: String,
    player_uuid: Uuid,
}

#[derive(Serialize)]
struct SubmitCodeResponse {
    verified: bool,
}

/// In-game `/verify <code>` lands here. Wrong/expired/exhausted codes are a
/// plain `verified: false`; only persistence trouble is a 500.
async fn verify_submit(
    State(warden): State<Arc<Warden>>,
    Json(request): Json<SubmitCodeRequest>,
) -> Response {
    match warden
        .submit_code(&request.username, &request.code, request.player_uuid)
        .await
    {
        Ok(verified) => Json(SubmitCodeResponse { verified }).into_response(),
        Err(err) => {
            error!(?err, username = %request.username, "verification completion failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
struct XpEventRequest {
    player_uuid: Uuid,
    event_type: String,
    event_source: String,
    base_xp: i64,
    server_name: String,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct XpEventResponse {
    accepted: bool,
}

async fn xp_event(
    State(warden): State<Arc<Warden>>,
    Json(request): Json<XpEventRequest>,
) -> Response {
    match warden
        .record_xp(
            request.player_uuid,
            &request.event_type,
            &request.event_source,
            request.base_xp,
            &request.server_name,
            request.metadata,
        )
        .await
    {
        Ok(accepted) => Json(XpEventResponse { accepted }).into_response(),
        Err(err) => {
            error!(?err, player = %request.player_uuid, "xp ingestion failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
struct PlaytimeRequest {
    player_uuid: Uuid,
    minutes: i64,
    server_name: String,
}

#[derive(Serialize)]
struct PlaytimeResponse {
    recorded: bool,
}

async fn playtime(
    State(warden): State<Arc<Warden>>,
    Json(request): Json<PlaytimeRequest>,
) -> Response {
    match warden
        .record_play_time(request.player_uuid, request.minutes, &request.server_name)
        .await
    {
        Ok(recorded) => Json(PlaytimeResponse { recorded }).into_response(),
        Err(err) => {
            error!(?err, player = %request.player_uuid, "playtime ingestion failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
