//! Relay Broker Client
//!
//! TCP adapter for the relay broker's stream protocol, implementing the
//! broker ports. Frames are line-delimited JSON:
//!
//! - client -> broker: `auth`, `open`, `publish` (each publish carries a
//!   client-assigned id)
//! - broker -> client: `auth_ok`/`auth_err`, `open_ok`/`open_err`, and
//!   `confirm` frames correlated to publish ids
//!
//! One writer task owns the socket's write half; one reader task parses
//! broker frames and dispatches confirmations to the pending-hook map.
//! Hooks run on the reader task, which is the "broker-owned context" of
//! the port contract: they must only post outcomes onward. When the
//! connection drops, outstanding hooks are dropped, which surfaces as
//! `NotConfirmed` to anyone still waiting on a ticket.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    BrokerConnection, BrokerConnector, BrokerError, ConfirmHook, Confirmation, StreamProducer,
};
use crate::infrastructure::config::BrokerSettings;

// =============================================================================
// Wire Frames
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ClientFrame<'a> {
    Auth { username: &'a str, password: &'a str },
    Open { stream: &'a str },
    Publish { stream: &'a str, id: u64, body: &'a str },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ServerFrame {
    AuthOk,
    AuthErr {
        detail: String,
    },
    OpenOk {
        stream: String,
    },
    OpenErr {
        stream: String,
        detail: String,
    },
    Confirm {
        id: u64,
        ok: bool,
        #[serde(default)]
        detail: Option<String>,
    },
}

// =============================================================================
// Shared Connection State
// =============================================================================

struct Shared {
    writer_tx: mpsc::UnboundedSender<String>,
    /// Publish-id to confirm-hook, resolved by the reader task.
    pending_confirms: Mutex<HashMap<u64, ConfirmHook>>,
    /// Control replies awaited by `connect`/`open_producer`, keyed by
    /// `"auth"` or `"open:<stream>"`.
    pending_controls: Mutex<HashMap<String, oneshot::Sender<Result<(), String>>>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

fn send_frame(shared: &Shared, frame: &ClientFrame<'_>) -> Result<(), String> {
    let line = serde_json::to_string(frame).map_err(|e| e.to_string())?;
    shared
        .writer_tx
        .send(line)
        .map_err(|_| "broker connection closed".to_string())
}

async fn write_loop(
    mut half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            line = rx.recv() => {
                let Some(mut line) = line else { break };
                line.push('\n');
                if let Err(error) = half.write_all(line.as_bytes()).await {
                    tracing::warn!(%error, "Broker write failed");
                    break;
                }
            }
        }
    }
    let _ = half.shutdown().await;
}

async fn read_loop(half: OwnedReadHalf, shared: Arc<Shared>) {
    let mut lines = BufReader::new(half).lines();
    loop {
        let line = tokio::select! {
            () = shared.shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<ServerFrame>(&line) {
                Ok(frame) => dispatch(&shared, frame),
                Err(error) => tracing::warn!(%error, "Unparseable broker frame"),
            },
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(%error, "Broker read failed");
                break;
            }
        }
    }

    // Connection gone. Fail outstanding control waits and drop pending
    // hooks: tickets still waiting then resolve to NotConfirmed.
    for (_, tx) in shared.pending_controls.lock().drain() {
        let _ = tx.send(Err("broker connection closed".to_string()));
    }
    shared.pending_confirms.lock().clear();
    tracing::debug!("Broker reader stopped");
}

fn dispatch(shared: &Shared, frame: ServerFrame) {
    match frame {
        ServerFrame::AuthOk => resolve_control(shared, "auth", Ok(())),
        ServerFrame::AuthErr { detail } => resolve_control(shared, "auth", Err(detail)),
        ServerFrame::OpenOk { stream } => {
            resolve_control(shared, &format!("open:{stream}"), Ok(()));
        }
        ServerFrame::OpenErr { stream, detail } => {
            resolve_control(shared, &format!("open:{stream}"), Err(detail));
        }
        ServerFrame::Confirm { id, ok, detail } => {
            let hook = shared.pending_confirms.lock().remove(&id);
            match hook {
                Some(hook) => {
                    let confirmation = if ok {
                        Confirmation::accepted()
                    } else {
                        Confirmation::rejected(
                            detail.unwrap_or_else(|| "broker rejected the message".to_string()),
                        )
                    };
                    hook(confirmation);
                }
                None => tracing::debug!(id, "Confirmation for unknown publish id"),
            }
        }
    }
}

fn resolve_control(shared: &Shared, key: &str, outcome: Result<(), String>) {
    match shared.pending_controls.lock().remove(key) {
        Some(tx) => {
            let _ = tx.send(outcome);
        }
        None => tracing::debug!(key, "Control reply with no waiter"),
    }
}

// =============================================================================
// Connector / Connection / Producer
// =============================================================================

/// Broker connector over TCP.
pub struct TcpBrokerConnector {
    settings: BrokerSettings,
}

impl TcpBrokerConnector {
    /// Create a connector for the configured broker.
    #[must_use]
    pub const fn new(settings: BrokerSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrokerConnector for TcpBrokerConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        let socket = TcpStream::connect(&addr)
            .await
            .map_err(|e| BrokerError::Connection(format!("{addr}: {e}")))?;
        let (read_half, write_half) = socket.into_split();

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared {
            writer_tx,
            pending_confirms: Mutex::new(HashMap::new()),
            pending_controls: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            shutdown: shutdown.clone(),
        });

        tokio::spawn(write_loop(write_half, writer_rx, shutdown));
        tokio::spawn(read_loop(read_half, Arc::clone(&shared)));

        let (tx, rx) = oneshot::channel();
        shared.pending_controls.lock().insert("auth".to_string(), tx);
        send_frame(
            &shared,
            &ClientFrame::Auth {
                username: &self.settings.username,
                password: self.settings.password(),
            },
        )
        .map_err(BrokerError::Connection)?;

        match rx.await {
            Ok(Ok(())) => {
                tracing::info!(addr, "Broker connection established");
                Ok(Box::new(TcpBrokerConnection { shared }))
            }
            Ok(Err(detail)) => {
                shared.shutdown.cancel();
                Err(BrokerError::Connection(detail))
            }
            Err(_) => Err(BrokerError::Connection(
                "connection closed during authentication".to_string(),
            )),
        }
    }
}

struct TcpBrokerConnection {
    shared: Arc<Shared>,
}

#[async_trait]
impl BrokerConnection for TcpBrokerConnection {
    async fn open_producer(&self, stream: &str) -> Result<Box<dyn StreamProducer>, BrokerError> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending_controls
            .lock()
            .insert(format!("open:{stream}"), tx);
        send_frame(&self.shared, &ClientFrame::Open { stream }).map_err(|reason| {
            BrokerError::ProducerSetup {
                stream: stream.to_string(),
                reason,
            }
        })?;

        match rx.await {
            Ok(Ok(())) => Ok(Box::new(TcpStreamProducer {
                stream: stream.to_string(),
                shared: Arc::clone(&self.shared),
            })),
            Ok(Err(reason)) => Err(BrokerError::ProducerSetup {
                stream: stream.to_string(),
                reason,
            }),
            Err(_) => Err(BrokerError::ProducerSetup {
                stream: stream.to_string(),
                reason: "connection closed while opening stream".to_string(),
            }),
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        // Idempotent: cancelling twice is a no-op.
        self.shared.shutdown.cancel();
        Ok(())
    }
}

struct TcpStreamProducer {
    stream: String,
    shared: Arc<Shared>,
}

#[async_trait]
impl StreamProducer for TcpStreamProducer {
    fn send(&self, body: Vec<u8>, on_confirm: ConfirmHook) -> Result<(), BrokerError> {
        let body = String::from_utf8(body)
            .map_err(|e| BrokerError::Send(format!("body is not UTF-8: {e}")))?;
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.pending_confirms.lock().insert(id, on_confirm);

        let frame = ClientFrame::Publish {
            stream: &self.stream,
            id,
            body: &body,
        };
        if let Err(reason) = send_frame(&self.shared, &frame) {
            // The hook must not fire when send fails; take it back out.
            self.shared.pending_confirms.lock().remove(&id);
            return Err(BrokerError::Send(reason));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        // Producers multiplex one connection; there is no per-stream
        // teardown in the wire protocol.
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use super::*;

    fn settings(port: u16) -> BrokerSettings {
        BrokerSettings::new(
            "127.0.0.1".to_string(),
            port,
            "relay".to_string(),
            "secret".to_string(),
        )
    }

    /// Fake broker: accepts one connection, answers auth/open, confirms
    /// every publish, rejecting bodies that contain `"reject"`.
    async fn spawn_fake_broker() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let frame: Value = serde_json::from_str(&line).unwrap();
                let reply = match frame["op"].as_str().unwrap() {
                    "auth" => {
                        if frame["password"] == json!("secret") {
                            json!({ "op": "auth_ok" })
                        } else {
                            json!({ "op": "auth_err", "detail": "bad credentials" })
                        }
                    }
                    "open" => json!({ "op": "open_ok", "stream": frame["stream"] }),
                    "publish" => {
                        let ok = !frame["body"].as_str().unwrap().contains("reject");
                        if ok {
                            json!({ "op": "confirm", "id": frame["id"], "ok": true })
                        } else {
                            json!({
                                "op": "confirm",
                                "id": frame["id"],
                                "ok": false,
                                "detail": "stream full",
                            })
                        }
                    }
                    other => panic!("unexpected op {other}"),
                };
                let mut out = reply.to_string();
                out.push('\n');
                write_half.write_all(out.as_bytes()).await.unwrap();
            }
        });
        port
    }

    #[tokio::test]
    async fn connect_open_publish_confirm_round_trip() {
        let port = spawn_fake_broker().await;
        let connector = TcpBrokerConnector::new(settings(port));
        let connection = connector.connect().await.unwrap();
        let producer = connection.open_producer("ticks").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        producer
            .send(
                br#"{"price":1}"#.to_vec(),
                Box::new(move |confirmation| {
                    let _ = tx.send(confirmation);
                }),
            )
            .unwrap();

        let confirmation = rx.recv().await.unwrap();
        assert!(confirmation.confirmed);
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn rejection_carries_broker_detail() {
        let port = spawn_fake_broker().await;
        let connector = TcpBrokerConnector::new(settings(port));
        let connection = connector.connect().await.unwrap();
        let producer = connection.open_producer("ticks").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        producer
            .send(
                br#"{"note":"reject me"}"#.to_vec(),
                Box::new(move |confirmation| {
                    let _ = tx.send(confirmation);
                }),
            )
            .unwrap();

        let confirmation = rx.recv().await.unwrap();
        assert!(!confirmation.confirmed);
        assert_eq!(confirmation.detail.as_deref(), Some("stream full"));
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn bad_credentials_fail_connect() {
        let port = spawn_fake_broker().await;
        let bad = BrokerSettings::new(
            "127.0.0.1".to_string(),
            port,
            "relay".to_string(),
            "wrong".to_string(),
        );
        let connector = TcpBrokerConnector::new(bad);
        let Err(error) = connector.connect().await else {
            panic!("expected authentication failure");
        };
        assert!(matches!(error, BrokerError::Connection(detail) if detail == "bad credentials"));
    }

    #[tokio::test]
    async fn unreachable_broker_fails_connect() {
        // Port 1 is essentially never listening.
        let connector = TcpBrokerConnector::new(settings(1));
        let Err(error) = connector.connect().await else {
            panic!("expected connection failure");
        };
        assert!(matches!(error, BrokerError::Connection(_)));
    }
}
