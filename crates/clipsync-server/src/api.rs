use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use clipsync_shared::constants::HUB_PATH;
use clipsync_shared::RoomKey;

use crate::auth::Principal;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hub::Hub;
use crate::session::hub_socket;

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(hub: Hub, config: ServerConfig) -> Self {
        Self {
            hub,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(banner))
        .route("/health", get(health_check))
        .route("/auth/status", get(auth_status))
        .route("/auth/google", post(auth_google))
        .route("/auth/whoami", get(auth_whoami))
        .route("/download/:room_id/:item_id", get(download))
        .route(HUB_PATH, get(hub_socket))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthStatusResponse {
    enabled: bool,
    issuer_configured: bool,
    audience_configured: bool,
    identity_provider_ids_configured: bool,
    issuer: String,
    audience: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAuthRequest {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAuthResponse {
    token: String,
    expires_utc_ms: i64,
    subject: String,
    email: Option<String>,
}

#[derive(Serialize)]
struct WhoAmIResponse {
    subject: String,
    email: Option<String>,
}

async fn banner() -> &'static str {
    "ClipboardSync relay is running. Connect to /hub/clipboard (WebSocket, bincode frames)."
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn auth_status(State(state): State<AppState>) -> Json<AuthStatusResponse> {
    let auth = state.hub.auth();
    let status = auth.get_status();
    Json(AuthStatusResponse {
        enabled: status.enabled,
        issuer_configured: status.issuer_configured,
        audience_configured: status.audience_configured,
        identity_provider_ids_configured: status.identity_provider_configured,
        issuer: auth.config().jwt_issuer.clone(),
        audience: auth.config().jwt_audience.clone(),
    })
}

/// Exchange a Google credential for a relay bearer token.
async fn auth_google(
    State(state): State<AppState>,
    Json(req): Json<GoogleAuthRequest>,
) -> Result<Json<GoogleAuthResponse>, ServerError> {
    let auth = state.hub.auth();
    if !auth.enabled() {
        return Err(ServerError::BadRequest("auth disabled on server".into()));
    }

    let principal = auth
        .validate_identity(req.id_token.as_deref(), req.access_token.as_deref())
        .await?;
    let issued = auth.issue_token(&principal.subject, principal.email.as_deref())?;

    info!(subject = %principal.subject, "Issued relay token");

    Ok(Json(GoogleAuthResponse {
        token: issued.token,
        expires_utc_ms: issued.expires_at.timestamp_millis(),
        subject: principal.subject,
        email: principal.email,
    }))
}

async fn auth_whoami(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WhoAmIResponse>, ServerError> {
    let principal = require_principal(&state, &headers)?;
    Ok(Json(WhoAmIResponse {
        subject: principal.subject,
        email: principal.email,
    }))
}

/// Relay-mode file payload. With auth on, the bearer's subject scopes the room.
async fn download(
    State(state): State<AppState>,
    Path((room_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServerError> {
    let room_key = if state.hub.auth().enabled() {
        let principal = require_principal(&state, &headers)?;
        RoomKey::for_subject(&principal.subject, &room_id)
    } else {
        RoomKey::shared(&room_id)
    };

    let bytes = state
        .hub
        .files()
        .get(&room_key, &item_id)
        .await
        .ok_or(ServerError::NotFound)?;

    debug!(room_key = %room_key, item = %item_id, size = bytes.len(), "File downloaded");

    let disposition = format!("attachment; filename=\"{}\"", item_id.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// `Authorization: Bearer <token>` value, if present.
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn require_principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, ServerError> {
    let token = bearer_from_headers(headers)
        .ok_or_else(|| ServerError::Unauthorized("missing bearer token".into()))?;
    state
        .hub
        .auth()
        .authenticate(token)
        .map_err(|e| ServerError::Unauthorized(e.to_string()))
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
    use super::*;
    use crate::auth::testing::fake_service;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use clipsync_shared::protocol::ClipboardFilePublish;
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::hub::Session;

    fn app_state(auth_enabled: bool) -> AppState {
        let config = ServerConfig::default();
        let hub = Hub::new(&config, fake_service(auth_enabled));
        AppState::new(hub, config)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with_bearer(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        req.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_banner_and_health() {
        let app = build_router(app_state(false));
        let response = app
            .clone()
            .oneshot(get_with_bearer("/", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_with_bearer("/health", None)).await.unwrap();
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_auth_status_shape() {
        let app = build_router(app_state(true));
        let response = app
            .oneshot(get_with_bearer("/auth/status", None))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["enabled"], true);
        assert_eq!(json["issuer"], "ClipboardSync");
        assert_eq!(json["audience"], "ClipboardSync");
        assert_eq!(json["identityProviderIdsConfigured"], true);
        assert_eq!(json["issuerConfigured"], true);
        assert_eq!(json["audienceConfigured"], true);
    }

    #[tokio::test]
    async fn test_google_exchange_disabled_is_bad_request() {
        let app = build_router(app_state(false));
        let response = app
            .oneshot(post_json("/auth/google", serde_json::json!({"idToken": "alice"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "auth disabled on server");
    }

    #[tokio::test]
    async fn test_google_exchange_and_whoami() {
        let app = build_router(app_state(true));
        let response = app
            .clone()
            .oneshot(post_json("/auth/google", serde_json::json!({"idToken": "alice"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["subject"], "alice");
        assert_eq!(json["email"], "alice@example.com");
        assert!(json["expiresUtcMs"].as_i64().unwrap() > 0);
        let token = json["token"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(get_with_bearer("/auth/whoami", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["subject"], "alice");

        let response = app
            .oneshot(get_with_bearer("/auth/whoami", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_google_exchange_without_token_is_bad_request() {
        let app = build_router(app_state(true));
        let response = app
            .oneshot(post_json("/auth/google", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    async fn publish_file(state: &AppState, session: &Session) -> String {
        state
            .hub
            .publish_file(
                session,
                ClipboardFilePublish {
                    device_id: Uuid::new_v4(),
                    file_name: "notes.txt".into(),
                    content_type: "text/plain".into(),
                    bytes: b"file body".to_vec(),
                },
            )
            .await
            .unwrap();
        state
            .hub
            .get_history(session, 1)
            .await
            .unwrap()
            .items
            .remove(0)
            .id
    }

    #[tokio::test]
    async fn test_download_shared_room() {
        let state = app_state(false);
        let (tx, _rx) = mpsc::channel(16);
        let session = Session::new(None, tx);
        state.hub.join_room(&session, "room", "secret").await.unwrap();
        let item_id = publish_file(&state, &session).await;

        let app = build_router(state);
        let response = app
            .clone()
            .oneshot(get_with_bearer(&format!("/download/room/{item_id}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains(&item_id));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"file body");

        let response = app
            .oneshot(get_with_bearer("/download/room/unknown", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_scoped_by_subject() {
        let state = app_state(true);
        let (tx, _rx) = mpsc::channel(16);
        let alice = Principal {
            subject: "alice".into(),
            email: None,
        };
        let session = Session::new(Some(alice), tx);
        state.hub.join_room(&session, "default", "").await.unwrap();
        let item_id = publish_file(&state, &session).await;

        let alice_token = state.hub.auth().issue_token("alice", None).unwrap().token;
        let bob_token = state.hub.auth().issue_token("bob", None).unwrap().token;
        let uri = format!("/download/default/{item_id}");
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(get_with_bearer(&uri, Some(&alice_token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get_with_bearer(&uri, Some(&bob_token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get_with_bearer(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_bearer_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_from_headers(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_from_headers(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_from_headers(&headers), None);
    }
}
