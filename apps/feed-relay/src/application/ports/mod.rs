//! Port Interfaces
//!
//! Interfaces for the external systems the relay core talks to, following
//! the Hexagonal Architecture pattern. Infrastructure adapters implement
//! these contracts; the core never sees a concrete broker client or feed
//! transport.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`BrokerConnector`] / [`BrokerConnection`] / [`StreamProducer`]:
//!   the streaming broker that confirms published messages
//!
//! ## Driver Ports (Inbound)
//!
//! - [`MarketFeed`]: an upstream payload sequence (WebSocket stream,
//!   polled page, anything else) started once and ended by `stop` or
//!   natural upstream closure

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::payload::Payload;

// =============================================================================
// Broker Ports
// =============================================================================

/// Broker-level outcome of one sent message.
#[derive(Debug, Clone)]
pub struct Confirmation {
    /// Whether the broker durably accepted the message.
    pub confirmed: bool,
    /// Broker-supplied rejection detail, if any.
    pub detail: Option<String>,
}

impl Confirmation {
    /// A positive confirmation.
    #[must_use]
    pub const fn accepted() -> Self {
        Self {
            confirmed: true,
            detail: None,
        }
    }

    /// A rejection carrying the broker's detail string.
    #[must_use]
    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            confirmed: false,
            detail: Some(detail.into()),
        }
    }
}

/// Callback invoked exactly once with the broker's confirmation.
///
/// Runs on a broker-owned context; implementations must only post the
/// outcome onward, never touch publisher state directly.
pub type ConfirmHook = Box<dyn FnOnce(Confirmation) + Send + 'static>;

/// Broker interaction failure.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker is unreachable or rejected authentication.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// A named output stream could not be opened.
    #[error("producer setup failed for stream {stream:?}: {reason}")]
    ProducerSetup {
        /// The stream that could not be opened.
        stream: String,
        /// Underlying failure detail.
        reason: String,
    },

    /// A message could not be handed to the broker client.
    #[error("broker send failed: {0}")]
    Send(String),
}

/// An open, named channel to a single broker stream.
///
/// Owned exclusively by the publisher; one producer per distinct output
/// stream, never shared across streams.
#[async_trait]
pub trait StreamProducer: Send + Sync {
    /// Hand one message body to the broker.
    ///
    /// The hook is invoked exactly once when the broker confirms or
    /// rejects the message; confirmations are not ordered with respect to
    /// other sends on the same producer.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Send`] when the message cannot be handed to
    /// the broker client at all (the hook is then never invoked).
    fn send(&self, body: Vec<u8>, on_confirm: ConfirmHook) -> Result<(), BrokerError>;

    /// Close the producer.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the broker rejects the close; the
    /// publisher logs and continues.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// An established connection to the streaming broker.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Open a producer for the named stream.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ProducerSetup`] when the stream cannot be
    /// opened.
    async fn open_producer(&self, stream: &str) -> Result<Box<dyn StreamProducer>, BrokerError>;

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when teardown fails; the publisher logs and
    /// continues.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Factory for broker connections, injected into the publisher.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Establish the outbound connection.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connection`] when the broker is unreachable
    /// or authentication is rejected.
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

// =============================================================================
// Feed Port
// =============================================================================

/// Upstream feed failure.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The upstream sequence could not be started.
    #[error("feed subscription failed: {0}")]
    Subscribe(String),
}

/// One upstream payload sequence.
///
/// The core only consumes this interface; how the sequence is produced
/// (WebSocket, polling, scraping) belongs to the adapter. The receiver
/// closing means the upstream ended naturally.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Begin producing payloads.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Subscribe`] when the upstream cannot be
    /// attached.
    async fn start(&self) -> Result<mpsc::Receiver<Payload>, FeedError>;

    /// Stop producing payloads. Safe to call when never started.
    async fn stop(&self);
}
