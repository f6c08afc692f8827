//! Beacon -- realtime coordinator for a developer social platform
//!
//! One WebSocket per client, JSON events both ways. A single coordinator task
//! owns the presence set, the session table, and the live-stream registry;
//! chat messages and social notifications are persisted through collaborator
//! stores before they are forwarded to connected recipients.
//!
//! Durable state (users, messages, notifications) belongs to the stores;
//! everything in the registries is ephemeral and dies with the process.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod levels;
pub mod server;
pub mod store;
