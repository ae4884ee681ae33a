//! # Connector Registry
//!
//! Caches one connector per app. A cached entry is reused only while the
//! app and its data node still describe the same database; any change to
//! either produces a fresh connector on the next lookup.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::backend::SqlConnector;
use super::errors::{SqlError, SqlResult};
use crate::master::{App, DataNode, MasterData};

/// Creates connectors for apps
pub trait ConnectorFactory: Send + Sync {
    fn connect(&self, app: &App, node: &DataNode) -> SqlResult<Arc<dyn SqlConnector>>;
}

/// Factory handing out one shared connector for every app
pub struct SharedConnectorFactory {
    connector: Arc<dyn SqlConnector>,
}

impl SharedConnectorFactory {
    pub fn new(connector: Arc<dyn SqlConnector>) -> Self {
        Self { connector }
    }
}

impl ConnectorFactory for SharedConnectorFactory {
    fn connect(&self, _app: &App, _node: &DataNode) -> SqlResult<Arc<dyn SqlConnector>> {
        Ok(Arc::clone(&self.connector))
    }
}

struct CachedConnector {
    fingerprint: String,
    connector: Arc<dyn SqlConnector>,
}

pub struct ConnectorRegistry {
    factory: Arc<dyn ConnectorFactory>,
    cache: RwLock<HashMap<String, CachedConnector>>,
}

impl ConnectorRegistry {
    pub fn new(factory: Arc<dyn ConnectorFactory>) -> Self {
        Self {
            factory,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Connector for `app_id` as described by `data`
    pub fn connector(&self, data: &MasterData, app_id: &str) -> SqlResult<Arc<dyn SqlConnector>> {
        let app = data
            .app(app_id)
            .ok_or_else(|| SqlError::AppNotFound(app_id.to_string()))?;
        let node = data
            .data_node(&app.data_node_id)
            .ok_or_else(|| SqlError::DataNodeNotFound(app.data_node_id.clone()))?;
        let fingerprint = fingerprint(app, node);

        if let Some(cached) = self
            .read_cache()
            .get(app_id)
            .filter(|c| c.fingerprint == fingerprint)
        {
            return Ok(Arc::clone(&cached.connector));
        }

        let connector = self.factory.connect(app, node)?;
        tracing::debug!(app_id, host = %node.host, "connector created");
        self.write_cache().insert(
            app_id.to_string(),
            CachedConnector {
                fingerprint,
                connector: Arc::clone(&connector),
            },
        );
        Ok(connector)
    }

    /// Drop connectors for apps no longer present in `data`
    pub fn retain(&self, data: &MasterData) {
        self.write_cache()
            .retain(|app_id, _| data.app(app_id).is_some());
    }

    // entries are inserted and removed whole; a poisoned cache is still consistent
    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, CachedConnector>> {
        self.cache.read().unwrap_or_else(|poisoned| {
            tracing::warn!("connector cache lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, CachedConnector>> {
        self.cache.write().unwrap_or_else(|poisoned| {
            tracing::warn!("connector cache lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }
}

fn fingerprint(app: &App, node: &DataNode) -> String {
    format!(
        "{}|{}|{}:{}|{}|{}",
        app.id, app.db_name, node.host, node.port, node.username, node.password
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::sql::memory::MemoryConnector;

    struct CountingFactory(AtomicUsize);

    impl ConnectorFactory for CountingFactory {
        fn connect(&self, _app: &App, _node: &DataNode) -> SqlResult<Arc<dyn SqlConnector>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MemoryConnector::new()))
        }
    }

    fn data(host: &str) -> MasterData {
        MasterData {
            data_nodes: vec![DataNode {
                id: "d1".into(),
                host: host.into(),
                ..Default::default()
            }],
            apps: vec![App {
                id: "a1".into(),
                db_name: "shop".into(),
                data_node_id: "d1".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_connector_cached_until_node_changes() {
        let factory = Arc::new(CountingFactory(AtomicUsize::new(0)));
        let registry = ConnectorRegistry::new(factory.clone());

        registry.connector(&data("h1"), "a1").unwrap();
        registry.connector(&data("h1"), "a1").unwrap();
        assert_eq!(factory.0.load(Ordering::SeqCst), 1);

        registry.connector(&data("h2"), "a1").unwrap();
        assert_eq!(factory.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_app() {
        let registry = ConnectorRegistry::new(Arc::new(CountingFactory(AtomicUsize::new(0))));
        assert!(matches!(
            registry.connector(&data("h"), "zz"),
            Err(SqlError::AppNotFound(_))
        ));
    }

    #[test]
    fn test_poisoned_cache_still_serves() {
        let factory = Arc::new(CountingFactory(AtomicUsize::new(0)));
        let registry = Arc::new(ConnectorRegistry::new(factory.clone()));
        registry.connector(&data("h1"), "a1").unwrap();

        let poisoner = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.cache.write().unwrap();
            panic!("poison the cache");
        })
        .join();
        assert!(registry.cache.is_poisoned());

        registry.connector(&data("h1"), "a1").unwrap();
        assert_eq!(factory.0.load(Ordering::SeqCst), 1);

        registry.retain(&MasterData::default());
        registry.connector(&data("h1"), "a1").unwrap();
        assert_eq!(factory.0.load(Ordering::SeqCst), 2);
    }
}
