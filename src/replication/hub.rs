//! # Master Hub
//!
//! Accepts slave connections on the master. A connection must open with
//! `WS_REGISTER`; the secret is compared in constant time and answered
//! with the JSON string `"OK"` or `"Failed to valid client secret."`.
//!
//! After registration the connection gets the current snapshot as its
//! baseline and then every later one, each as a `WS_MASTER_DATA`
//! envelope. Pushes run on a writer task per connection that drains the
//! store's watch channel, so a slow slave never blocks a mutation; it may
//! skip intermediate versions but always ends on the latest.
//!
//! [`MasterHub::close`] ends every slave session; slaves see the master go
//! away and fall back to their reconnect loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use subtle::ConstantTimeEq;
use tokio::sync::watch;

use super::command::{ControlCommand, Envelope, SlaveHello, WS_MASTER_DATA};
use super::errors::{ReplicationError, ReplicationResult};
use super::registry::SlaveRegistry;
use crate::master::{ApiNode, MasterStore, Snapshot};

/// Reply to an accepted registration
pub const REGISTER_OK: &str = "OK";
/// Reply to a registration with the wrong secret
pub const REGISTER_REJECTED: &str = "Failed to valid client secret.";

/// How long a fresh connection may take to send its registration
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MasterHub {
    store: Arc<MasterStore>,
    secret: String,
    registry: Arc<SlaveRegistry>,
    closing: watch::Sender<bool>,
}

impl MasterHub {
    pub fn new(store: Arc<MasterStore>, secret: impl Into<String>) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            store,
            secret: secret.into(),
            registry: Arc::new(SlaveRegistry::new()),
            closing,
        }
    }

    /// Drop every slave connection and refuse new ones
    pub fn close(&self) {
        if !self.closing.send_replace(true) {
            tracing::info!(slaves = self.registry.len(), "closing slave channel");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closing.borrow()
    }

    pub fn registry(&self) -> Arc<SlaveRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn verify(&self, hello: &SlaveHello) -> bool {
        hello.secret.as_bytes().ct_eq(self.secret.as_bytes()).into()
    }

    /// Serve one slave connection until it drops
    pub async fn serve(self: Arc<Self>, socket: WebSocket, peer: SocketAddr) {
        let mut closing = self.closing.subscribe();
        if *closing.borrow_and_update() {
            tracing::debug!(peer = %peer, "slave channel closed, refusing connection");
            return;
        }
        let (mut sink, mut stream) = socket.split();

        let hello = match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_hello(&mut stream)).await {
            Ok(Ok(hello)) => hello,
            Ok(Err(e)) => {
                tracing::warn!(peer = %peer, error = %e, "slave handshake failed");
                return;
            }
            Err(_) => {
                tracing::warn!(peer = %peer, "slave handshake timed out");
                return;
            }
        };

        if !self.verify(&hello) {
            tracing::warn!(peer = %peer, slave = %hello.id, "slave secret rejected");
            let _ = send_json_string(&mut sink, REGISTER_REJECTED).await;
            let _ = sink.close().await;
            return;
        }
        // listed before the slave can observe its registration
        let key = self.registry.insert(ApiNode {
            id: hello.id.clone(),
            name: peer.to_string(),
            ..Default::default()
        });
        if let Err(e) = send_json_string(&mut sink, REGISTER_OK).await {
            tracing::warn!(peer = %peer, error = %e, "slave dropped during handshake");
            self.registry.remove(&key);
            return;
        }
        tracing::info!(peer = %peer, slave = %hello.id, "slave registered");

        let mut writer = tokio::spawn(push_snapshots(sink, self.store.subscribe(), peer));
        tokio::select! {
            _ = &mut writer => {}
            _ = drain(&mut stream) => writer.abort(),
            _ = async { let _ = closing.wait_for(|closed| *closed).await; } => writer.abort(),
        }

        self.registry.remove(&key);
        tracing::info!(peer = %peer, slave = %hello.id, "slave disconnected");
    }
}

async fn read_hello(stream: &mut SplitStream<WebSocket>) -> ReplicationResult<SlaveHello> {
    while let Some(message) = stream.next().await {
        match message.map_err(ReplicationError::transport)? {
            Message::Text(text) => {
                let envelope = Envelope::from_json(&text)?;
                return match ControlCommand::decode(&envelope)? {
                    ControlCommand::Register(hello) => Ok(hello),
                    other => Err(ReplicationError::handshake(format!(
                        "expected WS_REGISTER, got {}",
                        other.tag()
                    ))),
                };
            }
            Message::Close(_) => break,
            _ => continue,
        }
    }
    Err(ReplicationError::handshake("connection closed before registering"))
}

async fn send_json_string(
    sink: &mut SplitSink<WebSocket, Message>,
    text: &str,
) -> ReplicationResult<()> {
    let json = serde_json::Value::String(text.to_string()).to_string();
    sink.send(Message::Text(json))
        .await
        .map_err(ReplicationError::transport)
}

/// Push the baseline and every later snapshot until the socket fails
async fn push_snapshots(
    mut sink: SplitSink<WebSocket, Message>,
    mut snapshots: watch::Receiver<Snapshot>,
    peer: SocketAddr,
) {
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        let envelope = Envelope::new(WS_MASTER_DATA, snapshot.payload.as_ref());
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode snapshot push");
                return;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            tracing::warn!(peer = %peer, version = snapshot.data.version, error = %e, "snapshot push failed");
            return;
        }
        tracing::debug!(peer = %peer, version = snapshot.data.version, "snapshot pushed");
        if snapshots.changed().await.is_err() {
            return;
        }
    }
}

/// Read until the slave goes away; slaves send nothing after registering
async fn drain(stream: &mut SplitStream<WebSocket>) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(Message::Text(text)) => tracing::debug!(len = text.len(), "ignoring slave message"),
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::MasterData;

    fn hub(secret: &str) -> MasterHub {
        MasterHub::new(Arc::new(MasterStore::new(MasterData::default())), secret)
    }

    #[test]
    fn test_secret_check() {
        let hub = hub("s3cret");
        let mut hello = SlaveHello {
            id: "slave-1".into(),
            secret: "s3cret".into(),
        };
        assert!(hub.verify(&hello));
        hello.secret = "s3cre".into();
        assert!(!hub.verify(&hello));
        hello.secret = "s3cret!".into();
        assert!(!hub.verify(&hello));
    }

    #[test]
    fn test_registry_starts_empty() {
        assert!(hub("x").registry().is_empty());
    }

    #[test]
    fn test_close_is_sticky() {
        let hub = hub("x");
        assert!(!hub.is_closed());
        hub.close();
        hub.close();
        assert!(hub.is_closed());
    }
}
