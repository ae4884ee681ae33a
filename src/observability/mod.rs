//! Observability subsystem
//!
//! Structured logging through `tracing`. The binary installs one global
//! subscriber; library code only emits events.
//!
//! # Usage
//!
//! ```ignore
//! use netgate::observability::{init, log_event, Event, LogConfig};
//!
//! init(&LogConfig::from_env(false));
//! log_event(Event::BootStart);
//! ```

mod events;

pub use events::Event;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `netgate=debug`
pub const LOG_ENV: &str = "NETGATE_LOG";

pub const DEFAULT_FILTER: &str = "info";

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Filter from `NETGATE_LOG`, falling back to `info`
    pub fn from_env(json: bool) -> Self {
        let filter = std::env::var(LOG_ENV)
            .ok()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        Self { filter, json }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber. Returns false when one is already set.
pub fn init(config: &LogConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(true)
        .with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.is_ok()
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    if event.is_fatal() {
        tracing::error!(event = event.as_str(), "lifecycle");
    } else {
        tracing::info!(event = event.as_str(), "lifecycle");
    }
}
