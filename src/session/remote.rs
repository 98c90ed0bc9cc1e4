//! Session payload for the SSE transport.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::security::ClientIdentity;
use crate::session::manager::Closeable;

/// Events queued for a client's SSE stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Message(Value),
    /// Ends the stream.
    Close,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("session stream is full")]
    Full,
    #[error("session stream is closed")]
    Closed,
}

/// One connected MCP client.
#[derive(Debug)]
pub struct RemoteSession {
    id: String,
    client: ClientIdentity,
    created_at: Instant,
    events: mpsc::Sender<SessionEvent>,
}

impl RemoteSession {
    pub fn new(id: impl Into<String>, client: ClientIdentity, events: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            id: id.into(),
            client,
            created_at: Instant::now(),
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client(&self) -> &ClientIdentity {
        &self.client
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Queue a message without waiting; a slow reader gets `Full`.
    pub fn deliver(&self, message: Value) -> Result<(), DeliveryError> {
        self.events
            .try_send(SessionEvent::Message(message))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }
}

#[async_trait]
impl Closeable for RemoteSession {
    async fn close(&self) {
        // A full queue still ends once the last sender is dropped.
        let _ = self.events.try_send(SessionEvent::Close);
        tracing::debug!(
            session_id = %self.id,
            client = %self.client,
            age_secs = self.age().as_secs(),
            "Remote session closed"
        );
    }
}
