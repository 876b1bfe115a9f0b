//! HTTP surface: the chat WebSocket and the REST API.
//!
//! `/ws/chat?token=...` authenticates during the upgrade request; a refused
//! credential gets a plain HTTP error and no socket is ever opened. The REST
//! endpoints under `/api/v1` take the same credential as a bearer token.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, put};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::{AuthError, StoreError};
use crate::server::SharedState;
use crate::store::{MessageStore, PersistedMessage, UserProfile};
use crate::verifiers::{self, VerifiedUser};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_CONVERSATION_LIMIT: usize = 20;

// ── Axum router ────────────────────────────────────────────────────────

/// Build the axum router with WebSocket and REST endpoints.
pub fn router(state: Arc<SharedState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/ws/chat", get(ws_upgrade))
        .route("/api/v1/health", get(api_health))
        .route("/api/v1/messages", get(api_messages))
        .route("/api/v1/conversations/recent", get(api_recent_conversations))
        .route("/api/v1/users/me", put(api_update_me))
        .route("/api/v1/users/resolve", get(api_resolve_user))
        .layer(cors)
        .with_state(state)
}

/// CORS for browser clients. Entries may use `*` and `?` wildcards; an empty
/// list allows any origin. Credentials are never allowed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let patterns: Vec<String> = origins.iter().map(|o| o.trim().to_string()).collect();
        AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .is_ok_and(|o| patterns.iter().any(|p| wildcard_match(p, o)))
        })
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(false)
}

/// Simple wildcard matching (* and ?), case-insensitive.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    wildcard_match_inner(pattern.as_bytes(), text.as_bytes())
}

fn wildcard_match_inner(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            wildcard_match_inner(&pattern[1..], text)
                || (!text.is_empty() && wildcard_match_inner(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => wildcard_match_inner(&pattern[1..], &text[1..]),
        (Some(a), Some(b)) if a == b => wildcard_match_inner(&pattern[1..], &text[1..]),
        _ => false,
    }
}

// ── Errors ─────────────────────────────────────────────────────────────

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { error: msg.into() }))
}

fn auth_error(e: AuthError) -> ApiError {
    match e {
        AuthError::Unavailable(reason) => {
            tracing::warn!("Identity verifier unavailable: {reason}");
            api_error(StatusCode::SERVICE_UNAVAILABLE, "identity verifier unavailable")
        }
        other => api_error(StatusCode::UNAUTHORIZED, other.to_string()),
    }
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::Conflict(msg) => api_error(StatusCode::CONFLICT, msg),
        other => {
            tracing::error!("Store error: {other}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

async fn require_user(state: &SharedState, headers: &HeaderMap) -> Result<VerifiedUser, ApiError> {
    verifiers::authenticate(state.verifier.as_ref(), verifiers::bearer_token(headers))
        .await
        .map_err(auth_error)
}

// ── WebSocket ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(q): Query<WsQuery>,
    State(state): State<Arc<SharedState>>,
) -> Response {
    let user = match verifiers::authenticate(state.verifier.as_ref(), q.token.as_deref()).await {
        Ok(user) => user,
        Err(e) => {
            tracing::info!(%peer, "Handshake refused: {e}");
            return auth_error(e).into_response();
        }
    };
    tracing::debug!(%peer, identity = %user.uid, "Handshake accepted");
    ws.on_upgrade(move |socket| crate::connection::handle_socket(socket, user.uid, state))
}

// ── REST ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    server_name: String,
    connections: usize,
    uptime_secs: u64,
}

async fn api_health(State(state): State<Arc<SharedState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        server_name: state.server_name.clone(),
        connections: state.registry.len(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesQuery {
    with_user: Option<String>,
    limit: Option<usize>,
    /// Only messages strictly older than this, milliseconds since epoch.
    before: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
    id: String,
    sender_id: String,
    receiver_id: String,
    timestamp: String,
    message: String,
}

impl From<PersistedMessage> for MessageResponse {
    fn from(m: PersistedMessage) -> Self {
        Self {
            timestamp: m.timestamp_rfc3339(),
            id: m.id,
            sender_id: m.sender_id,
            receiver_id: m.receiver_id,
            message: m.body,
        }
    }
}

fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max.max(1))
}

async fn api_messages(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Query(q): Query<MessagesQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let me = require_user(&state, &headers).await?;
    let Some(other) = q.with_user.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "withUser is required"));
    };
    let limit = clamp_limit(q.limit, DEFAULT_HISTORY_LIMIT, state.config.history_limit_max);
    let messages = state
        .store
        .recent_between(&me.uid, other, limit, q.before)
        .map_err(store_error)?;
    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationResponse {
    other_uid: String,
    other_email: Option<String>,
    last_timestamp_iso: String,
}

async fn api_recent_conversations(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Query(q): Query<RecentQuery>,
) -> Result<Json<Vec<ConversationResponse>>, ApiError> {
    let me = require_user(&state, &headers).await?;
    let limit = clamp_limit(q.limit, DEFAULT_CONVERSATION_LIMIT, state.config.history_limit_max);
    let summaries = state.store.recent_counterparties(&me.uid, limit).map_err(store_error)?;

    let mut out = Vec::with_capacity(summaries.len());
    for s in summaries {
        let other_email = state.store.find_user(&s.counterparty).map_err(store_error)?.and_then(|u| u.email);
        let last = chrono::DateTime::from_timestamp_millis(s.last_timestamp_ms).unwrap_or_default();
        out.push(ConversationResponse {
            other_uid: s.counterparty,
            other_email,
            last_timestamp_iso: last.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        });
    }
    Ok(Json(out))
}

/// Directory entry as exposed to other users: no display name.
#[derive(Debug, Serialize)]
struct UserResponse {
    uid: String,
    email: Option<String>,
}

impl From<UserProfile> for UserResponse {
    fn from(u: UserProfile) -> Self {
        Self { uid: u.uid, email: u.email }
    }
}

async fn api_update_me(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, ApiError> {
    let me = require_user(&state, &headers).await?;
    let profile = state
        .store
        .upsert_user(&me.uid, me.email.as_deref(), me.display_name.as_deref())
        .map_err(store_error)?;
    tracing::debug!(identity = %me.uid, "Directory entry updated");
    Ok(Json(UserResponse::from(profile)))
}

#[derive(Deserialize)]
struct ResolveQuery {
    email: Option<String>,
    uid: Option<String>,
}

async fn api_resolve_user(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Query(q): Query<ResolveQuery>,
) -> Result<Json<UserResponse>, ApiError> {
    let me = require_user(&state, &headers).await?;
    let email = q.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
    let uid = q.uid.as_deref().map(str::trim).filter(|u| !u.is_empty());

    let found = match (email, uid) {
        (Some(email), _) => state.store.find_user_by_email(email),
        (None, Some(uid)) if uid == me.uid => return Err(resolve_self_error()),
        (None, Some(uid)) => state.store.find_user(uid),
        (None, None) => return Err(api_error(StatusCode::BAD_REQUEST, "Provide email or uid")),
    }
    .map_err(store_error)?;

    match found {
        Some(user) if user.uid == me.uid => Err(resolve_self_error()),
        Some(user) => Ok(Json(UserResponse::from(user))),
        None => Err(api_error(StatusCode::NOT_FOUND, "User not found")),
    }
}

fn resolve_self_error() -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "Cannot start conversation with yourself")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_origins() {
        assert!(wildcard_match("https://*.web.app", "https://chat-demo.web.app"));
        assert!(wildcard_match("https://*.web.app", "HTTPS://Chat.Web.App"));
        assert!(!wildcard_match("https://*.web.app", "https://web.app.evil.com"));
        assert!(wildcard_match("http://localhost:????", "http://localhost:4200"));
        assert!(!wildcard_match("http://localhost:4200", "http://localhost:4201"));
        assert!(wildcard_match("*", "anything"));
    }

    #[test]
    fn limit_clamping() {
        assert_eq!(clamp_limit(None, 50, 200), 50);
        assert_eq!(clamp_limit(Some(0), 50, 200), 1);
        assert_eq!(clamp_limit(Some(10_000), 50, 200), 200);
        assert_eq!(clamp_limit(None, 50, 20), 20);
    }

    #[test]
    fn auth_errors_map_to_status() {
        assert_eq!(auth_error(AuthError::Missing).0, StatusCode::UNAUTHORIZED);
        assert_eq!(auth_error(AuthError::Expired).0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            auth_error(AuthError::Unavailable("down".into())).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
