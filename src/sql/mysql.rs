//! # MySQL Backend
//!
//! sqlx-backed connector for tenant databases. Pools are created lazily so
//! that building a connector never blocks on the network.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row, Transaction};

use super::backend::{BoxFuture, RowSet, SqlConnector, SqlTransaction};
use super::errors::SqlResult;
use super::registry::ConnectorFactory;
use crate::master::{App, DataNode};

/// Connector over a lazily connected MySQL pool
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    pool: MySqlPool,
}

impl MySqlConnector {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Pool for an app's tenant database. The tenant user is named after
    /// the database and authenticates with the app id.
    pub fn for_app(app: &App, node: &DataNode) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&node.host)
            .port(node.port)
            .username(&app.db_name)
            .password(&app.id)
            .database(&tenant_database(&app.db_name));
        let pool = MySqlPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options);
        Self { pool }
    }

    /// Administrative pool on a data node, without a default database
    pub fn for_node(node: &DataNode) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&node.host)
            .port(node.port)
            .username(&node.username)
            .password(&node.password);
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options);
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

/// Physical database name for a tenant
pub fn tenant_database(db_name: &str) -> String {
    format!("nd_{}", db_name)
}

impl SqlConnector for MySqlConnector {
    fn begin(&self) -> BoxFuture<'_, SqlResult<Box<dyn SqlTransaction>>> {
        Box::pin(async move {
            let tx = self.pool.begin().await?;
            Ok(Box::new(MySqlTransaction { tx }) as Box<dyn SqlTransaction>)
        })
    }
}

struct MySqlTransaction {
    tx: Transaction<'static, MySql>,
}

impl SqlTransaction for MySqlTransaction {
    fn execute<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, SqlResult<u64>> {
        Box::pin(async move {
            let result = bind_all(sqlx::query(sql), params)
                .execute(&mut *self.tx)
                .await?;
            Ok(result.rows_affected())
        })
    }

    fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, SqlResult<RowSet>> {
        Box::pin(async move {
            let rows = bind_all(sqlx::query(sql), params)
                .fetch_all(&mut *self.tx)
                .await?;
            let headers = rows
                .first()
                .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default();
            let rows = rows
                .iter()
                .map(|r| (0..r.len()).map(|i| decode_cell(r, i)).collect())
                .collect();
            Ok(RowSet { headers, rows })
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, SqlResult<()>> {
        Box::pin(async move { Ok(self.tx.commit().await?) })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, SqlResult<()>> {
        Box::pin(async move { Ok(self.tx.rollback().await?) })
    }
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [Value],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => query.bind(i),
                (None, Some(u)) => query.bind(u),
                _ => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.as_str()),
            nested => query.bind(nested.to_string()),
        };
    }
    query
}

fn decode_cell(row: &MySqlRow, i: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(i) {
        return v
            .map(|t| Value::String(t.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(i) {
        return v
            .map(|b| Value::String(String::from_utf8_lossy(&b).into_owned()))
            .unwrap_or(Value::Null);
    }
    // DECIMAL and other text-encoded types
    row.try_get_unchecked::<Option<String>, _>(i)
        .ok()
        .flatten()
        .map(Value::String)
        .unwrap_or(Value::Null)
}

/// Builds MySQL connectors for apps
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlFactory;

impl ConnectorFactory for MySqlFactory {
    fn connect(&self, app: &App, node: &DataNode) -> SqlResult<Arc<dyn SqlConnector>> {
        Ok(Arc::new(MySqlConnector::for_app(app, node)))
    }
}
