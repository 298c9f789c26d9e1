//! Routed, Confirmation-Gated Publisher
//!
//! Owns the broker connection and one producer handle per output stream
//! in the routing table's codomain. `publish` never blocks: it snapshots
//! the current handle set, hands the payload body to the matching
//! producer, and returns a [`PublishTicket`] that resolves once the broker
//! confirms or rejects the message.
//!
//! # Lifecycle
//!
//! `start` and `stop` are serialized by an internal lifecycle mutex; only
//! they mutate the handle set. `publish` takes an atomic snapshot and
//! treats an absent connection or handle as "no-op success", the intended
//! behavior for payload kinds with no configured destination and for
//! publishes racing `stop`.
//!
//! # Confirmation
//!
//! The broker invokes the confirm hook on its own context; the hook only
//! posts the outcome through a oneshot channel, and the ticket resolves on
//! the awaiting task. No timeout is imposed: a confirmation that never
//! arrives leaves its ticket pending (the hook being dropped unfired
//! resolves the ticket to [`PublishError::NotConfirmed`] instead, so
//! producer teardown cannot wedge a waiting caller).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, oneshot};

use crate::application::ports::{
    BrokerConnection, BrokerConnector, BrokerError, ConfirmHook, Confirmation, StreamProducer,
};
use crate::domain::payload::Payload;
use crate::domain::routing::{RoutingTable, StreamKind};

// =============================================================================
// Output Stream Names
// =============================================================================

/// Configured broker stream name per logical destination.
#[derive(Debug, Clone)]
pub struct OutputStreams {
    /// Stream carrying raw exchange tickers.
    pub ticks: String,
    /// Stream carrying scraped exchange metrics.
    pub insights: String,
    /// Stream carrying aggregator quotes.
    pub quotes: String,
}

impl OutputStreams {
    /// Resolve the configured name of a logical destination.
    #[must_use]
    pub fn name(&self, kind: StreamKind) -> &str {
        match kind {
            StreamKind::ExchangeTicks => &self.ticks,
            StreamKind::ExchangeInsights => &self.insights,
            StreamKind::AggregatorQuotes => &self.quotes,
        }
    }
}

// =============================================================================
// Publish Outcome
// =============================================================================

/// Per-message publish failure, surfaced through the ticket.
///
/// Never fatal to the process; callers log and continue.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The broker declined the message, or the confirmation was dropped
    /// before resolution.
    #[error("stream publish not confirmed: {0}")]
    NotConfirmed(String),

    /// The payload data could not be serialized.
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The broker client refused the send outright.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Single-resolution token for one publish call.
///
/// Resolves exactly once: either pre-resolved (no route, no handle, local
/// failure) or when the broker's confirmation arrives.
#[derive(Debug)]
pub struct PublishTicket {
    inner: TicketInner,
}

#[derive(Debug)]
enum TicketInner {
    Resolved(Result<(), PublishError>),
    Pending(oneshot::Receiver<Result<(), PublishError>>),
}

impl PublishTicket {
    fn resolved(outcome: Result<(), PublishError>) -> Self {
        Self {
            inner: TicketInner::Resolved(outcome),
        }
    }

    fn pending(rx: oneshot::Receiver<Result<(), PublishError>>) -> Self {
        Self {
            inner: TicketInner::Pending(rx),
        }
    }

    /// Wait for the publish outcome.
    ///
    /// # Errors
    ///
    /// Returns the [`PublishError`] the publish resolved to. A hook
    /// dropped without being invoked maps to
    /// [`PublishError::NotConfirmed`].
    pub async fn confirmed(self) -> Result<(), PublishError> {
        match self.inner {
            TicketInner::Resolved(outcome) => outcome,
            TicketInner::Pending(rx) => match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(PublishError::NotConfirmed(
                    "confirmation dropped before resolution".to_string(),
                )),
            },
        }
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// The installed connection and its per-destination producer handles.
struct Channels {
    connection: Box<dyn BrokerConnection>,
    producers: HashMap<StreamKind, Box<dyn StreamProducer>>,
}

/// Routed publisher over an injected broker connector.
pub struct RoutedPublisher {
    connector: Box<dyn BrokerConnector>,
    routing: RoutingTable,
    streams: OutputStreams,
    /// Serializes `start`/`stop`: one lifecycle transition in flight.
    lifecycle: Mutex<()>,
    /// Mutated only under the lifecycle mutex; `publish` and `is_ready`
    /// take cheap read snapshots.
    channels: RwLock<Option<Arc<Channels>>>,
}

impl RoutedPublisher {
    /// Create a publisher. No I/O happens until [`Self::start`].
    #[must_use]
    pub fn new(
        connector: Box<dyn BrokerConnector>,
        routing: RoutingTable,
        streams: OutputStreams,
    ) -> Self {
        Self {
            connector,
            routing,
            streams,
            lifecycle: Mutex::new(()),
            channels: RwLock::new(None),
        }
    }

    /// Connect to the broker and open one producer per destination.
    ///
    /// Not all-or-nothing: on a producer failure the partial handle set is
    /// still installed so the next [`Self::stop`] cleans it up, and the
    /// setup error propagates.
    ///
    /// # Errors
    ///
    /// [`BrokerError::Connection`] when the broker is unreachable or
    /// rejects authentication; [`BrokerError::ProducerSetup`] when a
    /// configured stream cannot be opened. Both are fatal to startup.
    pub async fn start(&self) -> Result<(), BrokerError> {
        let _lifecycle = self.lifecycle.lock().await;

        let connection = self.connector.connect().await?;

        let mut producers = HashMap::new();
        let mut setup_error = None;
        for kind in self.routing.destinations() {
            let stream = self.streams.name(kind);
            match connection.open_producer(stream).await {
                Ok(producer) => {
                    tracing::debug!(stream, "Stream producer opened");
                    producers.insert(kind, producer);
                }
                Err(error) => {
                    tracing::error!(stream, %error, "Failed to open stream producer");
                    setup_error = Some(error);
                    break;
                }
            }
        }

        let opened = producers.len();
        *self.channels.write() = Some(Arc::new(Channels {
            connection,
            producers,
        }));

        match setup_error {
            Some(error) => Err(error),
            None => {
                tracing::info!(producers = opened, "Publisher started");
                Ok(())
            }
        }
    }

    /// Close every open producer, then the connection.
    ///
    /// Never fails: close errors are logged and swallowed, and every
    /// handle is still attempted. Idempotent; safe before `start`.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        let taken = self.channels.write().take();
        let Some(channels) = taken else {
            tracing::debug!("Publisher stop with nothing open");
            return;
        };

        for (kind, producer) in &channels.producers {
            if let Err(error) = producer.close().await {
                tracing::warn!(stream = kind.as_str(), %error, "Error closing stream producer");
            }
        }
        if let Err(error) = channels.connection.close().await {
            tracing::warn!(%error, "Error closing broker connection");
        }

        tracing::info!("Publisher stopped");
    }

    /// Publish one payload to its routed stream.
    ///
    /// Returns immediately; the caller's task is never blocked. No route,
    /// no installed connection, or no open handle all resolve to success
    /// without any broker interaction. Each call is independent: in-flight
    /// publishes never wait on one another, and confirmation order is not
    /// send order.
    #[must_use]
    pub fn publish(&self, payload: &Payload) -> PublishTicket {
        let Some(kind) = self.routing.route(payload.provider, payload.source) else {
            tracing::debug!(
                provider = payload.provider.as_str(),
                source = payload.source.as_str(),
                "Skipping publish: no stream route"
            );
            return PublishTicket::resolved(Ok(()));
        };

        let snapshot = self.channels.read().clone();
        let Some(channels) = snapshot else {
            return PublishTicket::resolved(Ok(()));
        };
        let Some(producer) = channels.producers.get(&kind) else {
            tracing::debug!(stream = kind.as_str(), "Skipping publish: producer not open");
            return PublishTicket::resolved(Ok(()));
        };

        let body = match serde_json::to_vec(&payload.data) {
            Ok(body) => body,
            Err(error) => return PublishTicket::resolved(Err(PublishError::Encode(error))),
        };

        let (tx, rx) = oneshot::channel();
        let hook: ConfirmHook = Box::new(move |confirmation: Confirmation| {
            let outcome = if confirmation.confirmed {
                Ok(())
            } else {
                Err(PublishError::NotConfirmed(
                    confirmation
                        .detail
                        .unwrap_or_else(|| "broker rejected the message".to_string()),
                ))
            };
            // The caller may have abandoned the ticket.
            let _ = tx.send(outcome);
        });

        if let Err(error) = producer.send(body, hook) {
            tracing::error!(stream = kind.as_str(), %error, "Failed to hand message to broker");
            return PublishTicket::resolved(Err(error.into()));
        }

        PublishTicket::pending(rx)
    }

    /// Whether the connection and every configured producer are open.
    ///
    /// Computed from the current handle set on every call, never cached.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.channels.read().as_ref().is_some_and(|channels| {
            self.routing
                .destinations()
                .iter()
                .all(|kind| channels.producers.contains_key(kind))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Map;

    use super::*;
    use crate::domain::payload::{Provider, Source};

    fn streams() -> OutputStreams {
        OutputStreams {
            ticks: "ticks".to_string(),
            insights: "insights".to_string(),
            quotes: "quotes".to_string(),
        }
    }

    struct RefusingConnector;

    #[async_trait]
    impl BrokerConnector for RefusingConnector {
        async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError> {
            Err(BrokerError::Connection("refused".to_string()))
        }
    }

    fn payload(provider: Provider, source: Source) -> Payload {
        Payload::new(provider, source, Map::new())
    }

    #[tokio::test]
    async fn resolved_ticket_yields_its_outcome() {
        let ticket = PublishTicket::resolved(Ok(()));
        assert!(ticket.confirmed().await.is_ok());

        let ticket = PublishTicket::resolved(Err(PublishError::NotConfirmed("x".to_string())));
        assert!(matches!(
            ticket.confirmed().await,
            Err(PublishError::NotConfirmed(detail)) if detail == "x"
        ));
    }

    #[tokio::test]
    async fn pending_ticket_resolves_when_posted() {
        let (tx, rx) = oneshot::channel();
        let ticket = PublishTicket::pending(rx);
        tx.send(Ok(())).unwrap();
        assert!(ticket.confirmed().await.is_ok());
    }

    #[tokio::test]
    async fn dropped_confirmation_maps_to_not_confirmed() {
        let (tx, rx) = oneshot::channel::<Result<(), PublishError>>();
        drop(tx);
        let ticket = PublishTicket::pending(rx);
        assert!(matches!(
            ticket.confirmed().await,
            Err(PublishError::NotConfirmed(_))
        ));
    }

    #[tokio::test]
    async fn not_ready_before_start() {
        let publisher = RoutedPublisher::new(
            Box::new(RefusingConnector),
            RoutingTable::standard(),
            streams(),
        );
        assert!(!publisher.is_ready());
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let publisher = RoutedPublisher::new(
            Box::new(RefusingConnector),
            RoutingTable::standard(),
            streams(),
        );
        publisher.stop().await;
        publisher.stop().await;
        assert!(!publisher.is_ready());
    }

    #[tokio::test]
    async fn connection_failure_propagates_from_start() {
        let publisher = RoutedPublisher::new(
            Box::new(RefusingConnector),
            RoutingTable::standard(),
            streams(),
        );
        let error = publisher.start().await.unwrap_err();
        assert!(matches!(error, BrokerError::Connection(_)));
        assert!(!publisher.is_ready());
    }

    #[tokio::test]
    async fn publish_before_start_resolves_ok_for_routed_payload() {
        let publisher = RoutedPublisher::new(
            Box::new(RefusingConnector),
            RoutingTable::standard(),
            streams(),
        );
        let ticket = publisher.publish(&payload(Provider::Exchange, Source::SpotTicker));
        assert!(ticket.confirmed().await.is_ok());
    }

    #[tokio::test]
    async fn publish_without_route_resolves_ok() {
        let publisher = RoutedPublisher::new(
            Box::new(RefusingConnector),
            RoutingTable::standard(),
            streams(),
        );
        let ticket = publisher.publish(&payload(Provider::Exchange, Source::BtcUsdDaily));
        assert!(ticket.confirmed().await.is_ok());
    }
}
