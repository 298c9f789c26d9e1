//! Fan-in Consumers
//!
//! Bridges one or more upstream payload sequences into the routed
//! publisher. Each sequence is drained by its own task, so a slow or
//! stalled upstream never blocks delivery from another. Sources in the
//! configured selection set get the latest-quote transform applied to
//! their data before forwarding.
//!
//! Forwarding is fire-and-forget per item: the publish ticket is observed
//! on a detached task that logs non-success, and no backpressure is ever
//! signalled upstream.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::application::ports::{FeedError, MarketFeed};
use crate::application::publisher::RoutedPublisher;
use crate::domain::payload::{Payload, Source};
use crate::domain::quotes;

/// One fan-in consumer over a fixed set of upstream feeds.
pub struct FeedConsumer {
    name: &'static str,
    feeds: Vec<Arc<dyn MarketFeed>>,
    publisher: Arc<RoutedPublisher>,
    select_latest_for: HashSet<Source>,
    drains: Mutex<Vec<JoinHandle<()>>>,
}

impl FeedConsumer {
    /// Create a consumer that forwards every payload unchanged.
    #[must_use]
    pub fn new(
        name: &'static str,
        feeds: Vec<Arc<dyn MarketFeed>>,
        publisher: Arc<RoutedPublisher>,
    ) -> Self {
        Self {
            name,
            feeds,
            publisher,
            select_latest_for: HashSet::new(),
            drains: Mutex::new(Vec::new()),
        }
    }

    /// Apply the latest-quote transform to payloads of these sources.
    #[must_use]
    pub fn with_quote_selection(mut self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.select_latest_for = sources.into_iter().collect();
        self
    }

    /// Start every configured feed and begin forwarding.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] when any upstream sequence cannot be
    /// attached. Feeds already started keep their drain tasks; the caller
    /// aborts startup and calls [`Self::stop`].
    pub async fn start(&self) -> Result<(), FeedError> {
        for feed in &self.feeds {
            let rx = feed.start().await?;
            let handle = tokio::spawn(drain(
                self.name,
                rx,
                Arc::clone(&self.publisher),
                self.select_latest_for.clone(),
            ));
            self.drains.lock().push(handle);
        }
        tracing::info!(consumer = self.name, feeds = self.feeds.len(), "Consumer started");
        Ok(())
    }

    /// Stop every feed and tear down the drain tasks.
    ///
    /// Safe to call when never started, after natural upstream closure,
    /// or twice.
    pub async fn stop(&self) {
        for feed in &self.feeds {
            feed.stop().await;
        }
        for handle in self.drains.lock().drain(..) {
            handle.abort();
        }
        tracing::info!(consumer = self.name, "Consumer stopped");
    }
}

/// Drain one upstream sequence into the publisher.
async fn drain(
    consumer: &'static str,
    mut rx: mpsc::Receiver<Payload>,
    publisher: Arc<RoutedPublisher>,
    select_latest_for: HashSet<Source>,
) {
    while let Some(mut payload) = rx.recv().await {
        if select_latest_for.contains(&payload.source) {
            match quotes::select_latest(&payload.data) {
                Ok(reduced) => payload.data = reduced,
                Err(error) => {
                    tracing::warn!(
                        consumer,
                        source = payload.source.as_str(),
                        %error,
                        "Dropping payload: quote selection failed"
                    );
                    continue;
                }
            }
        }

        let ticket = publisher.publish(&payload);
        let provider = payload.provider;
        let source = payload.source;
        tokio::spawn(async move {
            if let Err(error) = ticket.confirmed().await {
                tracing::warn!(
                    consumer,
                    provider = provider.as_str(),
                    source = source.as_str(),
                    %error,
                    "Publish not confirmed"
                );
            }
        });
    }
    tracing::debug!(consumer, "Upstream sequence ended");
}

// =============================================================================
// Tests
// =============================================================================
