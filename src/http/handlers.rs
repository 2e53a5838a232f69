use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::observability::metrics;
use crate::session::{SessionError, SessionStore};

/// User id granted to the configured administrator.
pub const ADMIN_USER_ID: i64 = 1;

/// Administrator credentials accepted by `/api/login`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub admin: String,
    pub passwd: String,
}

impl Credentials {
    fn matches(&self, request: &LoginRequest) -> bool {
        request.name == self.admin && request.passwd == self.passwd
    }
}

/// State injected into handlers.
#[derive(Clone)]
pub struct WebState {
    pub sessions: Arc<SessionStore>,
    pub credentials: Arc<Credentials>,
    pub started_at: Instant,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub passwd: String,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub session_backend: String,
    pub uptime_secs: u64,
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn session_failure(route: &'static str, err: SessionError) -> Response {
    let status = match err {
        SessionError::Invalid => StatusCode::UNAUTHORIZED,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    metrics::record_request(route, status.as_u16());
    error_body(status, &err.to_string())
}

pub async fn login(
    State(state): State<WebState>,
    request: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Response {
    if !state.credentials.matches(&body) {
        tracing::warn!(name = %body.name, "Rejected login attempt");
        metrics::record_request("login", StatusCode::UNAUTHORIZED.as_u16());
        return error_body(StatusCode::UNAUTHORIZED, "invalid credentials");
    }

    let mut headers = HeaderMap::new();
    if let Err(e) = state.sessions.login(&mut headers, &request, ADMIN_USER_ID).await {
        return session_failure("login", e);
    }

    metrics::record_request("login", StatusCode::OK.as_u16());
    (StatusCode::OK, headers, Json(json!({ "user_id": ADMIN_USER_ID }))).into_response()
}

pub async fn logout(State(state): State<WebState>, request: HeaderMap) -> Response {
    let mut headers = HeaderMap::new();
    if let Err(e) = state.sessions.logout(&mut headers, &request).await {
        return session_failure("logout", e);
    }

    metrics::record_request("logout", StatusCode::OK.as_u16());
    (StatusCode::OK, headers, Json(json!({ "logged_out": true }))).into_response()
}

pub async fn session(State(state): State<WebState>, request: HeaderMap) -> Response {
    match state.sessions.user_id(&request).await {
        Ok(user_id) => {
            metrics::record_request("session", StatusCode::OK.as_u16());
            Json(json!({ "user_id": user_id })).into_response()
        }
        Err(e) => session_failure("session", e),
    }
}

pub async fn get_status(State(state): State<WebState>) -> Json<SystemStatus> {
    metrics::record_request("status", StatusCode::OK.as_u16());
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        session_backend: state.sessions.backend_kind().to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
