//! Request handlers for the remote transport.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{Request, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::http::server::AppState;
use crate::security::client_ip::client_identity;
use crate::security::enumeration::not_found;
use crate::session::{DeliveryError, RemoteSession, SessionEvent, SessionManager};

/// Events buffered per session before `deliver` reports backpressure.
const SESSION_EVENT_BUFFER: usize = 64;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "kimai_url": state.kimai_url.as_ref(),
    }))
}

/// Open an SSE stream and register its session.
pub async fn sse_connect(State(state): State<AppState>, request: Request<axum::body::Body>) -> Response {
    let client = client_identity(&request);
    let session_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel(SESSION_EVENT_BUFFER);

    let session = RemoteSession::new(session_id.clone(), client.clone(), tx);
    if !state.sessions.create(session_id.clone(), session).await {
        crate::observability::metrics::record_rejected("session_limit");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "session_limit_reached",
                "message": "Too many active sessions, retry later",
            })),
        )
            .into_response();
    }

    tracing::info!(session_id = %session_id, client = %client, "SSE session opened");

    let guard = SessionGuard {
        id: session_id.clone(),
        sessions: state.sessions.clone(),
    };
    Sse::new(session_stream(&session_id, rx, guard))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn session_stream(
    session_id: &str,
    rx: mpsc::Receiver<SessionEvent>,
    guard: SessionGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?session_id={session_id}"));

    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        match rx.recv().await {
            Some(SessionEvent::Message(message)) => {
                let event = Event::default().event("message").data(message.to_string());
                Some((Ok(event), (rx, guard)))
            }
            Some(SessionEvent::Close) | None => None,
        }
    });

    stream::once(async move { Ok(endpoint) }).chain(events)
}

/// Removes the session when its stream is dropped (client disconnect).
struct SessionGuard {
    id: String,
    sessions: Arc<SessionManager<RemoteSession>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let id = std::mem::take(&mut self.id);
        let sessions = self.sessions.clone();
        runtime.spawn(async move {
            if sessions.remove(&id).await.is_some() {
                tracing::info!(session_id = %id, "SSE client disconnected");
            }
        });
    }
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub session_id: String,
}

/// Accept a client message for an open session.
pub async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(session) = state.sessions.get(&query.session_id) else {
        return not_found();
    };

    let message: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_json", "message": "Invalid JSON" })),
            )
                .into_response();
        }
    };

    match session.deliver(message) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "received" }))).into_response(),
        Err(DeliveryError::Full) => {
            tracing::warn!(session_id = %session.id(), "Session stream backed up");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "session_busy", "message": "Session is not keeping up" })),
            )
                .into_response()
        }
        Err(DeliveryError::Closed) => not_found(),
    }
}

pub async fn fallback() -> Response {
    not_found()
}
