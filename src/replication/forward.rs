//! HTTP client for a node's control endpoint. The CLI talks to a node
//! through it, and a slave relays CLI commands to its master with it.

use std::time::Duration;

use super::command::Envelope;
use super::errors::{ReplicationError, ReplicationResult};

pub const CONTROL_PATH: &str = "/sys/cli";

#[derive(Debug, Clone)]
pub struct ControlClient {
    client: reqwest::Client,
    url: String,
}

impl ControlClient {
    /// Client for the node at `host:port`
    pub fn new(node: &str, timeout: Option<Duration>) -> ReplicationResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ReplicationError::transport)?;
        Ok(Self {
            client,
            url: control_url(node),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post the envelope and return the node's answer text
    pub async fn send(&self, envelope: &Envelope) -> ReplicationResult<String> {
        let response = self
            .client
            .post(&self.url)
            .json(envelope)
            .send()
            .await
            .map_err(ReplicationError::transport)?;
        response.text().await.map_err(ReplicationError::transport)
    }
}

fn control_url(node: &str) -> String {
    let node = node.trim().trim_end_matches('/');
    if node.starts_with("http://") || node.starts_with("https://") {
        format!("{}{}", node, CONTROL_PATH)
    } else {
        format!("http://{}{}", node, CONTROL_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_url() {
        assert_eq!(control_url("10.0.0.1:1103"), "http://10.0.0.1:1103/sys/cli");
        assert_eq!(
            control_url("https://gw.example.com/"),
            "https://gw.example.com/sys/cli"
        );
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let client = ControlClient::new("127.0.0.1:1", Some(Duration::from_secs(1))).unwrap();
        let err = client
            .send(&Envelope::new("CLI_SHOW_MASTER", ""))
            .await
            .unwrap_err();
        assert_eq!(
            err.kind(),
            crate::replication::errors::ReplicationErrorKind::Transport
        );
    }
}
