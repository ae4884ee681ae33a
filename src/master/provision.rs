//! # Tenant Provisioning
//!
//! Creating or updating an app makes sure its database and tenant user
//! exist on the owning data node; removing an app drops both.

use crate::sql::mysql::{tenant_database, MySqlConnector};
use crate::sql::BoxFuture;

use super::errors::{MasterError, MasterResult};
use super::model::{App, DataNode};

pub trait TenantProvisioner: Send + Sync {
    fn provision<'a>(&'a self, app: &'a App, node: &'a DataNode) -> BoxFuture<'a, MasterResult<()>>;

    fn deprovision<'a>(&'a self, app: &'a App, node: &'a DataNode)
        -> BoxFuture<'a, MasterResult<()>>;
}

/// Provisioner that touches nothing; used by slaves and tests
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProvisioner;

impl TenantProvisioner for NoopProvisioner {
    fn provision<'a>(&'a self, _app: &'a App, _node: &'a DataNode) -> BoxFuture<'a, MasterResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn deprovision<'a>(
        &'a self,
        _app: &'a App,
        _node: &'a DataNode,
    ) -> BoxFuture<'a, MasterResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Provisions tenant databases on MySQL data nodes using the node's
/// administrative credentials
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlProvisioner;

impl MySqlProvisioner {
    async fn run(node: &DataNode, statements: &[String]) -> MasterResult<()> {
        let connector = MySqlConnector::for_node(node);
        for sql in statements {
            sqlx::query(sql)
                .execute(connector.pool())
                .await
                .map_err(|e| MasterError::Provisioning(e.to_string()))?;
        }
        connector.pool().close().await;
        Ok(())
    }
}

impl TenantProvisioner for MySqlProvisioner {
    fn provision<'a>(&'a self, app: &'a App, node: &'a DataNode) -> BoxFuture<'a, MasterResult<()>> {
        Box::pin(async move {
            let database = tenant_database(&app.db_name);
            let statements = [
                format!(
                    "CREATE DATABASE IF NOT EXISTS `{}` DEFAULT CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
                    database
                ),
                format!(
                    "CREATE USER IF NOT EXISTS `{}`@`%` IDENTIFIED BY '{}'",
                    app.db_name,
                    app.id.replace('\'', "''")
                ),
                format!(
                    "GRANT ALL PRIVILEGES ON `{}`.* TO `{}`@`%`",
                    database, app.db_name
                ),
            ];
            Self::run(node, &statements).await?;
            tracing::info!(app = %app.name, database = %database, node = %node.name, "tenant provisioned");
            Ok(())
        })
    }

    fn deprovision<'a>(
        &'a self,
        app: &'a App,
        node: &'a DataNode,
    ) -> BoxFuture<'a, MasterResult<()>> {
        Box::pin(async move {
            let statements = [
                format!("DROP DATABASE IF EXISTS `{}`", tenant_database(&app.db_name)),
                format!("DROP USER IF EXISTS `{}`@`%`", app.db_name),
            ];
            Self::run(node, &statements).await?;
            tracing::info!(app = %app.name, node = %node.name, "tenant removed");
            Ok(())
        })
    }
}
