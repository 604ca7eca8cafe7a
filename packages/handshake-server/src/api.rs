//! HTTP API handlers.
//!
//! Thin mapping from routes onto the core services. Every handler returns
//! either a JSON payload or an [`ApiError`] carrying the core error.
//!
//! - `POST /v1/user/create`                          — Sign up (body = contact document)
//! - `POST /v1/location/create`                      — Record a location sample
//! - `GET  /v1/location/list/:user_id`               — Location history
//! - `GET  /v1/discoverable/:user_id`                — Discoverable users (alias `/v1/nearby/:user_id`)
//! - `POST /v1/requests/create/:from/:to`            — Ask for contact details
//! - `POST /v1/requests/allowed/:request_id/:answer` — Grant (`true`) or deny
//! - `GET  /v1/requests/get/:request_id`             — Request state
//! - `GET  /v1/requests/list/:user_id`               — Pending incoming requests
//! - `GET  /v1/requests/granted/:user_id`            — Granted contact documents

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use handshake_core::{ContactDocument, Error, ErrorKind};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the application router with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/v1/version", get(version_handler))
        .route("/v1/user/create", post(create_user))
        .route("/v1/location/create", post(create_location))
        .route("/v1/location/list/:user_id", get(list_locations))
        .route("/v1/discoverable/:user_id", get(list_discoverable))
        .route("/v1/nearby/:user_id", get(list_discoverable))
        .route("/v1/requests/create/:from/:to", post(create_request))
        .route("/v1/requests/allowed/:request_id/:answer", post(resolve_request))
        .route("/v1/requests/get/:request_id", get(get_request))
        .route("/v1/requests/list/:user_id", get(list_pending))
        .route("/v1/requests/granted/:user_id", get(list_granted))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// A core error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(Error);

type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Store | ErrorKind::Dispatch => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::InvalidPayload(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(code = self.0.code(), error = %self.0, "Request rejected");
        }

        (
            status,
            Json(json!({
                "error": self.0.to_string(),
                "code": self.0.code(),
            })),
        )
            .into_response()
    }
}

// ── Request Bodies ───────────────────────────────────────────────────────────

/// POST /v1/location/create
#[derive(Debug, Deserialize)]
pub struct CreateLocationBody {
    pub latitude: f64,
    pub longitude: f64,
    pub user_id: String,
}

// ── Service Handlers ─────────────────────────────────────────────────────────

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "handshake-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let stats = state.handshake.stats()?;
    Ok(Json(json!({
        "users": stats.users,
        "locations": stats.locations,
        "pending_requests": stats.pending_requests,
        "granted_requests": stats.granted_requests,
        "denied_requests": stats.denied_requests,
        "push_enabled": state.push_enabled(),
    })))
}

/// Plain-text version string.
async fn version_handler() -> &'static str {
    handshake_core::version()
}

// ── Directory Handlers ───────────────────────────────────────────────────────

/// Sign up. The body is the contact document and must carry `user_id`.
async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(value) = payload?;
    let document = ContactDocument::from_value(value)?;
    let user_id = document
        .user_id()
        .ok_or_else(|| Error::InvalidUserId("user_id must be a non-empty string".into()))?
        .to_string();

    state.handshake.directory.create_user(&user_id, document)?;

    Ok((StatusCode::CREATED, Json(json!({ "user_id": user_id }))))
}

/// Record a location sample.
async fn create_location(
    State(state): State<AppState>,
    payload: Result<Json<CreateLocationBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = payload?;
    let location = state
        .handshake
        .directory
        .record_location(&body.user_id, body.latitude, body.longitude)?;

    Ok((StatusCode::CREATED, Json(location)))
}

/// A user's location samples, oldest first.
async fn list_locations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.handshake.directory.location_history(&user_id)?))
}

/// Users the caller can still send requests to.
async fn list_discoverable(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.handshake.visibility.list_discoverable(&user_id)?))
}

// ── Request Handlers ─────────────────────────────────────────────────────────

/// Ask `to` for their contact details.
async fn create_request(
    State(state): State<AppState>,
    Path((from, to)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let request_id = state.handshake.ledger.create_request(&from, &to)?;
    Ok((StatusCode::CREATED, Json(json!({ "request_id": request_id }))))
}

/// Answer a request. Only the literal `true` grants; anything else denies.
async fn resolve_request(
    State(state): State<AppState>,
    Path((request_id, answer)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let allowed = answer == "true";
    let from = state.handshake.ledger.resolve_request(&request_id, allowed)?;
    Ok((StatusCode::CREATED, Json(json!({ "from": from }))))
}

/// Current state of one request.
async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let request = state.handshake.ledger.get_request(&request_id)?;
    Ok(Json(json!({
        "id": request.id,
        "from": request.from,
        "to": request.to,
        "created_at": request.created_at,
        "allowed": request.allowed,
        "state": request.state(),
    })))
}

/// Unanswered requests addressed to the user.
async fn list_pending(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.handshake.visibility.list_pending_incoming(&user_id)?))
}

/// Contact documents the user has been granted, without device IDs.
async fn list_granted(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.handshake.visibility.list_granted(&user_id)?))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerConfig;
    use axum::body::Body;
    use axum::http::{header, Request};
    use handshake_core::{Database, Notification, NotificationDispatcher};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tower::ServiceExt;

    fn test_app() -> (Router, UnboundedReceiver<Notification>) {
        let database = Arc::new(Database::open(None).unwrap());
        let (notifier, outbox) = NotificationDispatcher::channel();
        let state = AppState::new(ServerConfig::default(), database, notifier);
        (router(state), outbox)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    async fn signup(app: &Router, id: &str, first: &str, last: &str) {
        let body = json!({
            "user_id": id,
            "first_name": first,
            "last_name": last,
            "image": format!("{}.png", id),
            "device_id": format!("\"device-{}\"", id),
        })
        .to_string();
        let (status, _) = call(app, Method::POST, "/v1/user/create", Some(&body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_health_and_version() {
        let (app, _outbox) = test_app();

        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "handshake-server");

        let (status, body) = call(&app, Method::GET, "/v1/version", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String(handshake_core::version().to_string()));
    }

    #[tokio::test]
    async fn test_signup_conflict_and_validation() {
        let (app, _outbox) = test_app();
        signup(&app, "alice", "Alice", "Adams").await;

        let dup = json!({ "user_id": "alice" }).to_string();
        let (status, body) = call(&app, Method::POST, "/v1/user/create", Some(&dup)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], 200);

        let (status, body) = call(&app, Method::POST, "/v1/user/create", Some("{broken")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 104);

        let no_id = json!({ "first_name": "Nobody" }).to_string();
        let (status, body) = call(&app, Method::POST, "/v1/user/create", Some(&no_id)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 100);
    }

    #[tokio::test]
    async fn test_locations() {
        let (app, _outbox) = test_app();
        signup(&app, "alice", "Alice", "Adams").await;

        let body = json!({ "latitude": 51.5, "longitude": -0.12, "user_id": "alice" }).to_string();
        let (status, created) = call(&app, Method::POST, "/v1/location/create", Some(&body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["user_id"], "alice");

        let bad = json!({ "latitude": 123.0, "longitude": 0.0, "user_id": "alice" }).to_string();
        let (status, _) = call(&app, Method::POST, "/v1/location/create", Some(&bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let ghost = json!({ "latitude": 1.0, "longitude": 1.0, "user_id": "ghost" }).to_string();
        let (status, _) = call(&app, Method::POST, "/v1/location/create", Some(&ghost)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, history) = call(&app, Method::GET, "/v1/location/list/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_full_introduction_flow() {
        let (app, mut outbox) = test_app();
        signup(&app, "a", "Ann", "Archer").await;
        signup(&app, "b", "Ben", "Baker").await;
        signup(&app, "c", "Cat", "Cooper").await;

        let (status, to_b) = call(&app, Method::POST, "/v1/requests/create/a/b", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, to_c) = call(&app, Method::POST, "/v1/requests/create/a/c", None).await;
        let to_c = to_c["request_id"].as_str().unwrap().to_string();

        let push = outbox.try_recv().unwrap();
        assert_eq!(push.device_token, "device-b");

        let (status, from) = call(
            &app,
            Method::POST,
            &format!("/v1/requests/allowed/{}/true", to_c),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(from["from"], "a");

        let (_, discoverable) = call(&app, Method::GET, "/v1/nearby/a", None).await;
        let ids: Vec<_> = discoverable
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["user_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["b"]);

        let (_, pending) = call(&app, Method::GET, "/v1/requests/list/b", None).await;
        let pending = pending.as_array().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0]["user_id"], "a");
        assert_eq!(pending[0]["first_name"], "Ann");
        assert_eq!(pending[0]["request_id"], to_b["request_id"]);

        let (_, granted) = call(&app, Method::GET, "/v1/requests/granted/a", None).await;
        let granted = granted.as_array().unwrap();
        assert_eq!(granted.len(), 1);
        assert_eq!(granted[0]["user_id"], "c");
        assert!(granted[0].get("device_id").is_none());

        let (status, request) = call(
            &app,
            Method::GET,
            &format!("/v1/requests/get/{}", to_c),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(request["state"], "granted");
        assert_eq!(request["allowed"], true);
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let (app, _outbox) = test_app();
        signup(&app, "a", "Ann", "Archer").await;
        signup(&app, "b", "Ben", "Baker").await;

        let (_, created) = call(&app, Method::POST, "/v1/requests/create/a/b", None).await;
        let id = created["request_id"].as_str().unwrap().to_string();

        // anything but "true" denies
        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/v1/requests/allowed/{}/yes", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/v1/requests/allowed/{}/true", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], 201);

        let (_, request) = call(&app, Method::GET, &format!("/v1/requests/get/{}", id), None).await;
        assert_eq!(request["state"], "denied");

        let (status, _) = call(&app, Method::POST, "/v1/requests/allowed/missing/true", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_request_errors() {
        let (app, _outbox) = test_app();
        signup(&app, "a", "Ann", "Archer").await;

        let (status, body) = call(&app, Method::POST, "/v1/requests/create/a/a", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 103);

        let (status, _) = call(&app, Method::POST, "/v1/requests/create/a/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats() {
        let (app, _outbox) = test_app();
        signup(&app, "a", "Ann", "Archer").await;
        signup(&app, "b", "Ben", "Baker").await;
        call(&app, Method::POST, "/v1/requests/create/a/b", None).await;

        let (status, stats) = call(&app, Method::GET, "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["users"], 2);
        assert_eq!(stats["pending_requests"], 1);
        assert_eq!(stats["push_enabled"], false);
    }
}
