#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Feed Relay - Routed Stream Collector
//!
//! Consumes payloads from independent upstream market-data feeds
//! (exchange WebSocket streams, periodically polled pages) and
//! republishes each payload, confirmation-gated, onto the broker stream
//! selected by its provenance.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Pure types and logic
//!   - `payload`: Provenance tags and the payload container
//!   - `routing`: Ordered first-match routing policy
//!   - `quotes`: Latest-quote selection transform
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for the broker and upstream feeds
//!   - `publisher`: Routed, confirmation-gated publisher
//!   - `consumer`: Fan-in consumers bridging feeds into the publisher
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `broker`: TCP client for the relay broker protocol
//!   - `feeds`: WebSocket and polling feed adapters
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Exchange WS (spot)   --+
//! Exchange WS (linear) --+--> Fan-in     --> Routed      --> broker stream A
//! Scraped metrics      --+    Consumers      Publisher   --> broker stream B
//! Aggregator pages     --+    (transform)    (confirm)   --> broker stream C
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure payload, routing, and quote-selection logic.
pub mod domain;

/// Application layer - Ports and use cases.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::payload::{Payload, Provider, Source};
pub use domain::quotes::{QuoteSelectError, select_latest};
pub use domain::routing::{RoutingTable, StreamKind};

// Ports
pub use application::ports::{
    BrokerConnection, BrokerConnector, BrokerError, ConfirmHook, Confirmation, FeedError,
    MarketFeed, StreamProducer,
};

// Publisher and consumers
pub use application::consumer::FeedConsumer;
pub use application::publisher::{OutputStreams, PublishError, PublishTicket, RoutedPublisher};

// Infrastructure config
pub use infrastructure::config::{
    BrokerSettings, ConfigError, FeedEndpoints, FeedToggles, RelayConfig, ServerSettings,
    StreamSettings,
};

// Broker adapter
pub use infrastructure::broker::TcpBrokerConnector;

// Feed adapters
pub use infrastructure::feeds::{PollingFeed, WebSocketFeed};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
