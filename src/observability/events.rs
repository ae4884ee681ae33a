//! Node lifecycle events
//!
//! Lifecycle milestones are logged under a stable `event` name so they can
//! be grepped or filtered regardless of the message wording.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    BootStart,
    /// Listener bound, ready to serve
    Serving,
    ShutdownStart,
    ShutdownComplete,

    // Configuration
    ConfigLoaded,
    MasterDataLoaded,

    // Replication
    SlaveLinkStarted,

    // Jobs
    AutoJobsStarted,

    /// Startup could not complete
    BootFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "BOOT_START",
            Event::Serving => "SERVING",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::MasterDataLoaded => "MASTER_DATA_LOADED",
            Event::SlaveLinkStarted => "SLAVE_LINK_STARTED",
            Event::AutoJobsStarted => "AUTO_JOBS_STARTED",
            Event::BootFailed => "BOOT_FAILED",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::BootFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::MasterDataLoaded.to_string(), "MASTER_DATA_LOADED");
        assert!(Event::BootFailed.is_fatal());
        assert!(!Event::Serving.is_fatal());
    }
}
