//! HTTP collection endpoint for session records.
//!
//! This module provides an HTTP server that:
//! - Accepts session records posted by trackers via POST /track
//! - Keeps the latest version of each session, keyed by `sessionId`
//! - Exposes collected sessions for inspection
//!
//! # Architecture
//!
//! ```text
//! landing page ──→ tracker ──(debounced)──→ POST /track ──→ session store
//!                                                              ↓
//!                                              GET /sessions[/:session_id]
//! ```

use crate::core::session::SessionRecord;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// A collected session and its bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    /// Latest version received
    pub record: SessionRecord,
    /// Number of submissions received for this session
    pub revisions: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Shared server state
#[derive(Default)]
pub struct ServerState {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl ServerState {
    /// Store `record` as the latest version of its session.
    async fn upsert(&self, record: SessionRecord) -> u64 {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .entry(record.session_id.clone())
            .or_insert_with(|| StoredSession {
                record: record.clone(),
                revisions: 0,
                first_seen: now,
                last_seen: now,
            });
        entry.record = record;
        entry.revisions += 1;
        entry.last_seen = now;
        entry.revisions
    }
}

/// Response from the track endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackResponse {
    pub status: String,
    pub session_id: String,
    pub revision: u64,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /track
///
/// Accepts a full session record and keeps it as the session's latest version.
async fn track(
    State(state): State<Arc<ServerState>>,
    Json(record): Json<SessionRecord>,
) -> Result<Json<TrackResponse>, ApiError> {
    if record.session_id.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "sessionId must not be empty",
            "INVALID_SESSION",
        ));
    }

    let session_id = record.session_id.clone();
    let revision = state.upsert(record).await;
    tracing::debug!(%session_id, revision, "session stored");

    Ok(Json(TrackResponse {
        status: "ok".to_string(),
        session_id,
        revision,
    }))
}

/// GET /sessions
async fn list_sessions(State(state): State<Arc<ServerState>>) -> Json<Vec<StoredSession>> {
    let sessions = state.sessions.read().await;
    let mut all: Vec<StoredSession> = sessions.values().cloned().collect();
    all.sort_by_key(|s| s.first_seen);
    Json(all)
}

/// GET /sessions/:session_id
async fn get_session(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Result<Json<StoredSession>, ApiError> {
    let sessions = state.sessions.read().await;
    sessions.get(&session_id).cloned().map(Json).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            format!("Unknown session: {session_id}"),
            "NOT_FOUND",
        )
    })
}

/// Build the router around `state`.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/track", post(track))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:session_id", get(get_session))
        .layer(
            // Landing pages are served from arbitrary origins.
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(Arc::new(ServerState::default()));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Collection endpoint listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_counts_revisions() {
        let state = ServerState::default();
        let mut record = SessionRecord::with_session_id("s-1");
        assert_eq!(state.upsert(record.clone()).await, 1);

        record.email = Some("a@b.co".to_string());
        assert_eq!(state.upsert(record).await, 2);

        let sessions = state.sessions.read().await;
        let stored = &sessions["s-1"];
        assert_eq!(stored.revisions, 2);
        assert_eq!(stored.record.email.as_deref(), Some("a@b.co"));
        assert!(stored.first_seen <= stored.last_seen);
    }
}
