#![deny(missing_docs)]
//! Qinglong panel bot core library.
//!
//! Control plane shared by every transport: credential lifecycle,
//! per-conversation caching, the cached panel gateway, callback action
//! encoding, conversation state, and the handlers that drive them.

/// Compact callback action encoding.
pub mod action;
/// Per-conversation TTL cache.
pub mod cache;
/// Configuration management.
pub mod config;
/// Handlers implementing every bot operation.
pub mod controller;
/// Pending multi-step conversations.
pub mod conversation;
/// Inbound events and command routing.
pub mod dispatch;
/// Messaging collaborator interface.
pub mod messenger;
/// Automation panel client, credentials and models.
pub mod panel;
