//! Upstream Feed Adapters
//!
//! Concrete [`MarketFeed`] implementations: a WebSocket stream feed for
//! live exchange tickers and a polling feed for scraped pages. Each frame
//! or fetched page is parsed as a JSON mapping and tagged with the feed's
//! configured provenance.
//!
//! No reconnection policy lives here: a dropped upstream ends the
//! sequence, which the consumer observes as natural closure.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedError, MarketFeed};
use crate::domain::payload::{Payload, Provider, Source};

// =============================================================================
// WebSocket Feed
// =============================================================================

/// Live exchange feed over a WebSocket connection.
pub struct WebSocketFeed {
    provider: Provider,
    source: Source,
    url: String,
    capacity: usize,
    shutdown: Mutex<Option<CancellationToken>>,
}

impl WebSocketFeed {
    /// Create a feed for one WebSocket endpoint.
    #[must_use]
    pub const fn new(provider: Provider, source: Source, url: String, capacity: usize) -> Self {
        Self {
            provider,
            source,
            url,
            capacity,
            shutdown: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MarketFeed for WebSocketFeed {
    async fn start(&self) -> Result<mpsc::Receiver<Payload>, FeedError> {
        let (socket, _) = connect_async(&self.url)
            .await
            .map_err(|e| FeedError::Subscribe(format!("{}: {e}", self.url)))?;
        tracing::info!(url = %self.url, source = self.source.as_str(), "Feed connected");

        let (tx, rx) = mpsc::channel(self.capacity);
        let token = CancellationToken::new();
        *self.shutdown.lock() = Some(token.clone());
        tokio::spawn(ws_pump(socket, tx, token, self.provider, self.source));
        Ok(rx)
    }

    async fn stop(&self) {
        if let Some(token) = self.shutdown.lock().take() {
            token.cancel();
        }
    }
}

async fn ws_pump(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    tx: mpsc::Sender<Payload>,
    token: CancellationToken,
    provider: Provider,
    source: Source,
) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            () = token.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Map<String, Value>>(text.as_str()) {
                        Ok(data) => {
                            if tx.send(Payload::new(provider, source, data)).await.is_err() {
                                // Receiver gone: the consumer stopped.
                                break;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(source = source.as_str(), %error, "Unparseable feed frame");
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(source = source.as_str(), "Feed closed upstream");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::warn!(source = source.as_str(), %error, "Feed read failed");
                    break;
                }
            }
        }
    }
}

// =============================================================================
// Polling Feed
// =============================================================================

/// Scraped-page feed that polls an HTTP endpoint on an interval.
pub struct PollingFeed {
    provider: Provider,
    source: Source,
    url: String,
    interval: Duration,
    capacity: usize,
    client: reqwest::Client,
    shutdown: Mutex<Option<CancellationToken>>,
}

impl PollingFeed {
    /// Create a feed polling one URL.
    #[must_use]
    pub fn new(
        provider: Provider,
        source: Source,
        url: String,
        interval: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            provider,
            source,
            url,
            interval,
            capacity,
            client: reqwest::Client::new(),
            shutdown: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MarketFeed for PollingFeed {
    async fn start(&self) -> Result<mpsc::Receiver<Payload>, FeedError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let token = CancellationToken::new();
        *self.shutdown.lock() = Some(token.clone());
        tokio::spawn(poll_pump(
            self.client.clone(),
            self.url.clone(),
            self.interval,
            tx,
            token,
            self.provider,
            self.source,
        ));
        Ok(rx)
    }

    async fn stop(&self) {
        if let Some(token) = self.shutdown.lock().take() {
            token.cancel();
        }
    }
}

async fn poll_pump(
    client: reqwest::Client,
    url: String,
    interval: Duration,
    tx: mpsc::Sender<Payload>,
    token: CancellationToken,
    provider: Provider,
    source: Source,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => match fetch(&client, &url).await {
                Ok(data) => {
                    if tx.send(Payload::new(provider, source, data)).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!(source = source.as_str(), error, "Feed poll failed");
                }
            }
        }
    }
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<Map<String, Value>, String> {
    let response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| e.to_string())?;
    response
        .json::<Map<String, Value>>()
        .await
        .map_err(|e| e.to_string())
}

// =============================================================================
// Tests
// =============================================================================
