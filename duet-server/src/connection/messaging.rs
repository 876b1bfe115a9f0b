//! The relay engine: validate, persist, deliver, echo, notify.

use std::sync::Arc;

use super::routing::{RouteResult, deliver};
use crate::error::RelayError;
use crate::notifier::{self, Notification, Notifier};
use crate::protocol::{DEFAULT_MAX_MESSAGE_BYTES, error_frame, parse_frame};
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::store::{MessageStore, PersistedMessage};

/// Processes inbound chat frames for every connection.
pub struct RelayEngine {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn MessageStore>,
    notifier: Arc<dyn Notifier>,
    max_message_bytes: usize,
}

impl RelayEngine {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { registry, store, notifier, max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES }
    }

    /// Cap on a decoded message body; longer messages get an error frame.
    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Handle one text frame from `conn`. Failures are answered with an
    /// error frame on the same connection, which stays open.
    pub fn process_frame(&self, conn: &ConnectionHandle, raw: &str) {
        if let Err(e) = self.handle_frame(conn, raw) {
            match &e {
                RelayError::Persistence(source) => {
                    tracing::error!(identity = %conn.identity(), conn_id = conn.id(), "Failed to store message: {source}")
                }
                other => {
                    tracing::debug!(identity = %conn.identity(), conn_id = conn.id(), "Rejected frame: {other}")
                }
            }
            let _ = conn.send_text(error_frame(&e.client_message()));
        }
    }

    /// Run the relay steps for one frame and return the stored message.
    ///
    /// Nothing is written unless the frame parses, names the connection's own
    /// identity as sender, and targets someone else. Once stored, delivery,
    /// echo, and notification are best-effort. Must run inside a Tokio
    /// runtime; the notification is spawned.
    pub fn handle_frame(&self, conn: &ConnectionHandle, raw: &str) -> Result<PersistedMessage, RelayError> {
        let msg = parse_frame(raw, self.max_message_bytes)?;
        if msg.sender_id != conn.identity() {
            return Err(RelayError::SenderMismatch);
        }
        if msg.sender_id == msg.receiver_id {
            return Err(RelayError::SelfMessage);
        }

        let stored = self
            .store
            .append(&msg.sender_id, &msg.receiver_id, &msg.message, msg.timestamp.as_deref())
            .map_err(RelayError::Persistence)?;

        match deliver(&self.registry, &stored.receiver_id, raw) {
            RouteResult::Delivered => {
                tracing::debug!(message_id = %stored.id, receiver = %stored.receiver_id, "Delivered")
            }
            RouteResult::Offline => {
                tracing::debug!(message_id = %stored.id, receiver = %stored.receiver_id, "Recipient offline")
            }
            RouteResult::Failed(e) => {
                tracing::warn!(message_id = %stored.id, receiver = %stored.receiver_id, "Delivery failed: {e}")
            }
        }

        if let Err(e) = conn.send_text(raw) {
            tracing::debug!(message_id = %stored.id, conn_id = conn.id(), "Echo failed: {e}");
        }

        notifier::dispatch(
            Arc::clone(&self.notifier),
            Notification {
                receiver_id: stored.receiver_id.clone(),
                sender_id: stored.sender_id.clone(),
                message_id: stored.id.clone(),
            },
        );

        Ok(stored)
    }
}
