//! Tenant and application directory backed by the `tenant` and `sp_app` tables.

use super::error::StoreOperation;
use super::{StorageError, traits::*};
use crate::models::{ApplicationId, CorsApplication, TenantId};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::info;

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: i64,
    uuid: String,
    app_name: String,
}

/// Resolves tenant domains and application resource ids.
pub struct SqliteIdentityDirectory {
    pool: SqlitePool,
}

impl SqliteIdentityDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a tenant and return its assigned id.
    pub async fn register_tenant(&self, domain: &str) -> Result<TenantId, StorageError> {
        let id = sqlx::query_scalar::<_, i64>("INSERT INTO tenant (domain) VALUES (?) RETURNING id")
            .bind(domain)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::operation(StoreOperation::ResolveTenant, domain, e))?;

        info!("Registered tenant {} with id {}", domain, id);
        Ok(TenantId(id))
    }

    /// Register a tenant under a caller-chosen id.
    pub async fn register_tenant_with_id(
        &self,
        tenant_id: TenantId,
        domain: &str,
    ) -> Result<TenantId, StorageError> {
        sqlx::query("INSERT INTO tenant (id, domain) VALUES (?, ?)")
            .bind(tenant_id.0)
            .bind(domain)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::operation(StoreOperation::ResolveTenant, domain, e))?;

        info!("Registered tenant {} with id {}", domain, tenant_id);
        Ok(tenant_id)
    }

    /// Register an application of a tenant.
    pub async fn register_application(
        &self,
        tenant_id: TenantId,
        resource_id: &str,
        name: &str,
    ) -> Result<CorsApplication, StorageError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO sp_app (tenant_id, uuid, app_name) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(tenant_id.0)
        .bind(resource_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::operation(StoreOperation::ResolveApplication, resource_id, e))?;

        Ok(CorsApplication {
            id: ApplicationId(id),
            resource_id: resource_id.to_string(),
            name: name.to_string(),
        })
    }

    /// Register an application under a caller-chosen id.
    pub async fn register_application_with_id(
        &self,
        application_id: ApplicationId,
        tenant_id: TenantId,
        resource_id: &str,
        name: &str,
    ) -> Result<CorsApplication, StorageError> {
        sqlx::query("INSERT INTO sp_app (id, tenant_id, uuid, app_name) VALUES (?, ?, ?, ?)")
            .bind(application_id.0)
            .bind(tenant_id.0)
            .bind(resource_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StorageError::operation(StoreOperation::ResolveApplication, resource_id, e)
            })?;

        Ok(CorsApplication {
            id: application_id,
            resource_id: resource_id.to_string(),
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl TenantResolver for SqliteIdentityDirectory {
    async fn tenant_id(&self, tenant_domain: &str) -> Result<Option<TenantId>, StorageError> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM tenant WHERE domain = ?")
            .bind(tenant_domain)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::operation(StoreOperation::ResolveTenant, tenant_domain, e))?;

        Ok(id.map(TenantId))
    }
}

#[async_trait]
impl ApplicationResolver for SqliteIdentityDirectory {
    async fn application_by_resource_id(
        &self,
        tenant_domain: &str,
        resource_id: &str,
    ) -> Result<Option<CorsApplication>, StorageError> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT sp_app.id AS id, sp_app.uuid AS uuid, sp_app.app_name AS app_name
            FROM sp_app
            INNER JOIN tenant ON tenant.id = sp_app.tenant_id
            WHERE tenant.domain = ? AND sp_app.uuid = ?
            "#,
        )
        .bind(tenant_domain)
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::operation(StoreOperation::ResolveApplication, resource_id, e))?;

        Ok(row.map(|row| CorsApplication {
            id: ApplicationId(row.id),
            resource_id: row.uuid,
            name: row.app_name,
        }))
    }
}
