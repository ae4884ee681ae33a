//! Node Role
//!
//! A node is the master unless it is configured with the address of one.
//! The role is fixed at startup.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRole {
    /// Holds the authoritative configuration and executes commands
    Master,

    /// Follows the master at `master` (`host:port`) and relays commands to it
    Slave { master: String },
}

impl NodeRole {
    /// Role from the `slave_of` setting; blank means master
    pub fn from_slave_of(slave_of: &str) -> Self {
        let master = slave_of.trim();
        if master.is_empty() {
            NodeRole::Master
        } else {
            NodeRole::Slave {
                master: master.to_string(),
            }
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, NodeRole::Master)
    }

    pub fn master_address(&self) -> Option<&str> {
        match self {
            NodeRole::Master => None,
            NodeRole::Slave { master } => Some(master),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Slave { master } => write!(f, "slave of {}", master),
        }
    }
}
