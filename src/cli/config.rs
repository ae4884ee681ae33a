//! Node configuration file
//!
//! JSON, every field optional except `secret`. Command line flags given to
//! `service start` override the file.
//!
//! Search order when no file is named:
//! `~/.netgate/netgate.json`, then `/etc/netgate/netgate.json`.
//! The master data file follows the same order with `netgate_master.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{CliError, CliResult};
use crate::auth::MailConfig;
use crate::core::interceptors::DEFAULT_REMOTE_TIMEOUT;
use crate::http_server::DEFAULT_PORT;
use crate::replication::DEFAULT_RECONNECT_DELAY;

pub const CONFIG_FILE_NAME: &str = "netgate.json";
pub const DATA_FILE_NAME: &str = "netgate_master.json";
pub const HOME_DIR_NAME: &str = ".netgate";
pub const SYSTEM_DIR: &str = "/etc/netgate";

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node id; a random one is generated when blank
    #[serde(default)]
    pub id: String,

    /// Master `host:port`; blank makes this node the master
    #[serde(default)]
    pub slave_of: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared slave secret and session signing key
    #[serde(default)]
    pub secret: String,

    /// Master data file; searched for when blank
    #[serde(default)]
    pub data_file: String,

    /// Script directory name under the home and working directories
    #[serde(default = "default_script_dir")]
    pub script_dir: String,

    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,

    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Verification mail; mails are only logged without it
    #[serde(default)]
    pub smtp: Option<MailConfig>,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_script_dir() -> String {
    HOME_DIR_NAME.to_string()
}
fn default_remote_timeout_secs() -> u64 {
    DEFAULT_REMOTE_TIMEOUT.as_secs()
}
fn default_reconnect_delay_secs() -> u64 {
    DEFAULT_RECONNECT_DELAY.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: String::new(),
            slave_of: String::new(),
            host: default_host(),
            port: default_port(),
            secret: String::new(),
            data_file: String::new(),
            script_dir: default_script_dir(),
            remote_timeout_secs: default_remote_timeout_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            smtp: None,
            cors_origins: Vec::new(),
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// `~/.netgate/<name>` then `/etc/netgate/<name>`
fn search_paths(name: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = home_dir() {
        paths.push(home.join(HOME_DIR_NAME).join(name));
    }
    paths.push(Path::new(SYSTEM_DIR).join(name));
    paths
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config_error(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        Ok(config)
    }

    /// Load the named file, or the first one found on the search path,
    /// or defaults when there is none
    pub fn discover(explicit: Option<&Path>) -> CliResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match search_paths(CONFIG_FILE_NAME).into_iter().find(|p| p.is_file()) {
            Some(path) => {
                tracing::info!(path = %path.display(), "config file found");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Validate after flags have been applied
    pub fn validate(&self) -> CliResult<()> {
        if self.port == 0 {
            return Err(CliError::config_error("port must be > 0"));
        }
        if self.secret.is_empty() {
            return Err(CliError::config_error("secret must not be empty"));
        }
        if !self.slave_of.trim().is_empty() && !self.slave_of.contains(':') {
            return Err(CliError::config_error(format!(
                "Invalid slave_of: '{}'. Expected host:port.",
                self.slave_of
            )));
        }
        if self.remote_timeout_secs == 0 {
            return Err(CliError::config_error("remote_timeout_secs must be > 0"));
        }
        if self.reconnect_delay_secs == 0 {
            return Err(CliError::config_error("reconnect_delay_secs must be > 0"));
        }
        Ok(())
    }

    /// Fill in the generated node id
    pub fn ensure_id(&mut self) -> &str {
        if self.id.trim().is_empty() {
            self.id = Uuid::new_v4().simple().to_string();
        }
        &self.id
    }

    /// Master data file: the configured one, an existing file on the
    /// search path, or `~/.netgate/netgate_master.json`
    pub fn data_path(&self) -> PathBuf {
        if !self.data_file.trim().is_empty() {
            return PathBuf::from(self.data_file.trim());
        }
        let candidates = search_paths(DATA_FILE_NAME);
        candidates
            .iter()
            .find(|p| p.is_file())
            .or_else(|| candidates.first())
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DATA_FILE_NAME))
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("netgate.json");
        fs::write(&path, r#"{"secret": "s3cret", "slave_of": "10.0.0.1:1103"}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 1103);
        assert_eq!(config.remote_timeout_secs, 10);
        assert_eq!(config.reconnect_delay_secs, 5);
        assert_eq!(config.script_dir, ".netgate");
        assert!(config.smtp.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = Config::discover(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(err.message().starts_with("Failed to read config"));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.secret = "x".into();
        config.validate().unwrap();

        config.slave_of = "no-port".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generated_id_is_stable() {
        let mut config = Config::default();
        let id = config.ensure_id().to_string();
        assert_eq!(id.len(), 32);
        assert_eq!(config.ensure_id(), id);
    }

    #[test]
    fn test_configured_data_file_wins() {
        let config = Config {
            data_file: "/var/lib/netgate/master.json".into(),
            ..Default::default()
        };
        assert_eq!(
            config.data_path(),
            PathBuf::from("/var/lib/netgate/master.json")
        );
    }
}
