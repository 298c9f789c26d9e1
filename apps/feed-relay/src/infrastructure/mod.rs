//! Infrastructure layer - Adapters and external integrations.

/// Relay broker TCP client.
pub mod broker;

/// Configuration loading from environment variables.
pub mod config;

/// Upstream feed adapters (WebSocket and polling).
pub mod feeds;

/// Health check HTTP endpoint.
pub mod health;
