//! # Slave Link
//!
//! Keeps a slave attached to its master: dial `ws://<master>/sys/ws`,
//! register with the shared secret, then install every pushed snapshot.
//! When the connection drops the link reports itself disconnected, waits
//! the reconnect delay and starts over. It never gives up.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::command::{ControlCommand, Envelope, SlaveHello};
use super::errors::{ReplicationError, ReplicationResult};
use super::hub::REGISTER_OK;
use crate::master::MasterStore;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Registration state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Registered,
}

pub struct SlaveLink {
    master: String,
    hello: SlaveHello,
    store: Arc<MasterStore>,
    reconnect_delay: Duration,
    status: watch::Sender<LinkStatus>,
}

impl SlaveLink {
    pub fn new(master: impl Into<String>, hello: SlaveHello, store: Arc<MasterStore>) -> Self {
        let (status, _) = watch::channel(LinkStatus::Disconnected);
        Self {
            master: master.into(),
            hello,
            store,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            status,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    fn url(&self) -> String {
        format!("ws://{}/sys/ws", self.master)
    }

    /// Stay connected forever
    pub async fn run(&self) {
        loop {
            match self.session().await {
                Ok(()) => tracing::warn!(master = %self.master, "master closed the connection"),
                Err(e) => tracing::warn!(master = %self.master, error = %e, "master link dropped"),
            }
            self.status.send_replace(LinkStatus::Disconnected);
            tracing::info!(
                master = %self.master,
                delay_secs = self.reconnect_delay.as_secs(),
                "reconnecting to master"
            );
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// One connection: dial, register, apply pushes until it drops
    pub async fn session(&self) -> ReplicationResult<()> {
        let (socket, _) = tokio_tungstenite::connect_async(self.url())
            .await
            .map_err(ReplicationError::transport)?;
        let (mut sink, mut stream) = socket.split();

        let register = ControlCommand::Register(self.hello.clone())
            .encode()?
            .to_json()?;
        sink.send(Message::Text(register))
            .await
            .map_err(ReplicationError::transport)?;

        let reply = next_text(&mut stream)
            .await?
            .ok_or_else(|| ReplicationError::handshake("master closed before answering"))?;
        match serde_json::from_str::<String>(&reply) {
            Ok(answer) if answer == REGISTER_OK => {}
            Ok(answer) => return Err(ReplicationError::secret_rejected(answer)),
            Err(_) => {
                return Err(ReplicationError::handshake(format!(
                    "unexpected registration reply: {}",
                    reply
                )))
            }
        }
        self.status.send_replace(LinkStatus::Registered);
        tracing::info!(master = %self.master, slave = %self.hello.id, "registered with master");

        while let Some(text) = next_text(&mut stream).await? {
            if let Err(e) = self.apply(&text).await {
                tracing::warn!(error = %e, "ignoring master message");
            }
        }
        Ok(())
    }

    async fn apply(&self, text: &str) -> ReplicationResult<()> {
        let envelope = Envelope::from_json(text)?;
        match ControlCommand::decode(&envelope)? {
            ControlCommand::MasterSnapshot(data) => {
                let version = data.version;
                self.store.replace(data).await?;
                tracing::debug!(version, "master data applied");
                Ok(())
            }
            other => Err(ReplicationError::unsupported(other.tag())),
        }
    }
}

/// Next text frame, `None` once the master closes
async fn next_text<S>(stream: &mut S) -> ReplicationResult<Option<String>>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message.map_err(ReplicationError::transport)? {
            Message::Text(text) => return Ok(Some(text)),
            Message::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::MasterData;

    fn link() -> SlaveLink {
        SlaveLink::new(
            "127.0.0.1:1",
            SlaveHello {
                id: "s1".into(),
                secret: "x".into(),
            },
            Arc::new(MasterStore::new(MasterData::default())),
        )
    }

    #[tokio::test]
    async fn test_apply_installs_snapshot() {
        let link = link();
        let data = MasterData {
            version: 42,
            ..Default::default()
        };
        let text = ControlCommand::MasterSnapshot(data)
            .encode()
            .unwrap()
            .to_json()
            .unwrap();
        link.apply(&text).await.unwrap();
        assert_eq!(link.store.current().version, 42);
    }

    #[tokio::test]
    async fn test_apply_rejects_other_commands() {
        let link = link();
        let text = Envelope::new("CLI_SHOW_MASTER", "").to_json().unwrap();
        assert!(link.apply(&text).await.is_err());
        assert_eq!(link.store.current().version, 0);
    }

    #[tokio::test]
    async fn test_unreachable_master_is_transport_error() {
        let err = link().session().await.unwrap_err();
        assert_eq!(
            err.kind(),
            crate::replication::errors::ReplicationErrorKind::Transport
        );
    }
}
