//! Live slave connections on the master, keyed by connection id so that a
//! slave reconnecting under the same node id never collides with its own
//! stale entry.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use crate::master::ApiNode;

#[derive(Debug, Default)]
pub struct SlaveRegistry {
    connections: RwLock<BTreeMap<Uuid, ApiNode>>,
}

impl SlaveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a registered connection and return its key
    pub fn insert(&self, node: ApiNode) -> Uuid {
        let key = Uuid::new_v4();
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, node);
        key
    }

    pub fn remove(&self, key: &Uuid) -> Option<ApiNode> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Connected slaves, in registration order of their keys
    pub fn api_nodes(&self) -> Vec<ApiNode> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, addr: &str) -> ApiNode {
        ApiNode {
            id: id.into(),
            name: addr.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_reconnect_keeps_entries_apart() {
        let registry = SlaveRegistry::new();
        let stale = registry.insert(node("s1", "10.0.0.2:40100"));
        let fresh = registry.insert(node("s1", "10.0.0.2:40188"));
        assert_eq!(registry.len(), 2);

        registry.remove(&stale);
        let nodes = registry.api_nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "10.0.0.2:40188");

        assert!(registry.remove(&fresh).is_some());
        assert!(registry.is_empty());
    }
}
