//! Error taxonomy for the relay.
//!
//! Only [`AuthError`] and [`RelayError::Persistence`] change what a user
//! perceives as success. Delivery and notification failures are logged and
//! dropped.

use thiserror::Error;

/// Handshake / bearer authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("invalid credential: {0}")]
    Invalid(String),
    #[error("credential expired")]
    Expired,
    #[error("identity verifier unavailable: {0}")]
    Unavailable(String),
}

/// Message store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Writing a frame to a live connection failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    Full,
}

/// Push notification failures. Never reach a client.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notify request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("notify endpoint returned {0}")]
    Status(u16),
    #[error("{0}")]
    Other(String),
}

/// Per-frame failures reported back to the sender as an error frame.
/// None of these close the connection.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid message: {0}")]
    Malformed(String),
    #[error("senderId mismatch")]
    SenderMismatch,
    #[error("cannot send message to yourself")]
    SelfMessage,
    #[error("failed to store message")]
    Persistence(#[source] StoreError),
}

impl RelayError {
    /// Text placed in the `error` field of the frame sent back to the client.
    /// Store internals stay in the server log.
    pub fn client_message(&self) -> String {
        self.to_string()
    }
}
