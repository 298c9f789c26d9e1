//! Application layer - Ports and the use cases that drive them.

/// Fan-in consumers bridging upstream feeds into the publisher.
pub mod consumer;

/// Port interfaces for the broker and upstream feeds.
pub mod ports;

/// Routed, confirmation-gated publisher.
pub mod publisher;
