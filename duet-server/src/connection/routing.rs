//! Recipient lookup and delivery.
//!
//! Presence is local to this process: an identity is reachable only while it
//! holds an entry in the [`ConnectionRegistry`]. Anyone else reads the message
//! from history later.

use crate::error::DeliveryError;
use crate::registry::ConnectionRegistry;

/// Outcome of routing one frame to an identity.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RouteResult {
    /// Queued on the recipient's connection.
    Delivered,
    /// No live connection.
    Offline,
    /// Connection found but the write failed.
    Failed(DeliveryError),
}

/// Queue `frame` for the live connection of `identity`, if any.
pub(crate) fn deliver(registry: &ConnectionRegistry, identity: &str, frame: &str) -> RouteResult {
    let Some(conn) = registry.lookup(identity) else {
        return RouteResult::Offline;
    };
    match conn.send_text(frame) {
        Ok(()) => RouteResult::Delivered,
        Err(e) => RouteResult::Failed(e),
    }
}
