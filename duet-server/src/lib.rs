//! One-to-one chat relay.
//!
//! Clients authenticate during the WebSocket upgrade, then exchange JSON chat
//! frames. Every accepted message is persisted before it is forwarded, so a
//! recipient that is offline picks it up later through the history API.

pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod msgid;
pub mod notifier;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod store;
pub mod verifiers;
pub mod web;
