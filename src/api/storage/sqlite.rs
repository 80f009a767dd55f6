//! SQLite storage backend for CORS origins.
//!
//! Uses sqlx for database operations and implements the CorsOriginStore trait.
//! Each mutation opens one write transaction; returning early drops the
//! transaction, which rolls it back, so a failed call never leaves partial
//! state behind.

use super::begin_write;
use super::error::StoreOperation;
use super::{StorageError, traits::*};
use crate::models::{
    ApplicationId, CorsApplication, CorsOrigin, OriginExternalId, OriginId, TenantId,
    ValidatedOrigin,
};
use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use std::fmt;
use tracing::debug;

/// Origins joined with their associated applications, one row per
/// association (or a single row with null application columns). `$filter`
/// is the WHERE clause selecting the origins.
macro_rules! origins_with_applications {
    ($filter:literal) => {
        concat!(
            r#"
    SELECT cors_origin.id AS id, cors_origin.uuid AS uuid,
           cors_origin.origin AS origin, cors_origin.is_tenant_level AS is_tenant_level,
           sp_app.id AS app_id, sp_app.uuid AS app_uuid, sp_app.app_name AS app_name
    FROM cors_origin
    LEFT JOIN cors_association ON cors_association.cors_origin_id = cors_origin.id
    LEFT JOIN sp_app ON sp_app.id = cors_association.sp_app_id
    "#,
            $filter,
            r#"
    ORDER BY cors_origin.id ASC, sp_app.id ASC
"#
        )
    };
}

const ORIGINS_BY_TENANT: &str = origins_with_applications!("WHERE cors_origin.tenant_id = ?");

const ORIGINS_BY_APPLICATION: &str = origins_with_applications!(
    r#"WHERE cors_origin.tenant_id = ?
      AND EXISTS (
          SELECT 1 FROM cors_association AS scope
          WHERE scope.cors_origin_id = cors_origin.id AND scope.sp_app_id = ?
      )"#
);

const ORIGIN_BY_ID: &str = origins_with_applications!("WHERE cors_origin.id = ?");

const ORIGIN_BY_EXTERNAL_ID: &str = origins_with_applications!("WHERE cors_origin.uuid = ?");

const ORIGIN_ID_BY_TEXT: &str = "SELECT id FROM cors_origin WHERE tenant_id = ? AND origin = ?";

const INSERT_ORIGIN: &str = r#"
    INSERT INTO cors_origin (tenant_id, origin, uuid, is_tenant_level)
    VALUES (?, ?, ?, ?)
    RETURNING id
"#;

const INSERT_ASSOCIATION: &str =
    "INSERT INTO cors_association (cors_origin_id, sp_app_id) VALUES (?, ?)";

const CLEAR_TENANT_LEVEL: &str =
    "UPDATE cors_origin SET is_tenant_level = 0 WHERE id = ? AND tenant_id = ?";

const DELETE_ASSOCIATION: &str =
    "DELETE FROM cors_association WHERE cors_origin_id = ? AND sp_app_id = ?";

const APPLICATIONS_BY_ORIGIN: &str = r#"
    SELECT sp_app.id AS id, sp_app.uuid AS uuid, sp_app.app_name AS app_name
    FROM sp_app
    INNER JOIN cors_association ON cors_association.sp_app_id = sp_app.id
    WHERE cors_association.cors_origin_id = ?
    ORDER BY sp_app.id ASC
"#;

#[derive(sqlx::FromRow)]
struct OriginApplicationRow {
    id: i64,
    uuid: String,
    origin: String,
    is_tenant_level: bool,
    app_id: Option<i64>,
    app_uuid: Option<String>,
    app_name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: i64,
    uuid: String,
    app_name: String,
}

impl From<ApplicationRow> for CorsApplication {
    fn from(row: ApplicationRow) -> Self {
        CorsApplication {
            id: ApplicationId(row.id),
            resource_id: row.uuid,
            name: row.app_name,
        }
    }
}

/// Fold joined rows, ordered by origin id, into origins carrying their
/// applications.
fn collect_origins(rows: Vec<OriginApplicationRow>) -> Vec<CorsOrigin> {
    let mut origins: Vec<CorsOrigin> = Vec::new();

    for row in rows {
        let application = match (row.app_id, row.app_uuid, row.app_name) {
            (Some(id), Some(resource_id), Some(name)) => Some(CorsApplication {
                id: ApplicationId(id),
                resource_id,
                name,
            }),
            _ => None,
        };

        match origins.last_mut() {
            Some(origin) if origin.id == OriginId(row.id) => {
                origin.associated_applications.extend(application);
            }
            _ => origins.push(CorsOrigin {
                id: OriginId(row.id),
                external_id: OriginExternalId::from(row.uuid),
                origin: row.origin,
                tenant_level: row.is_tenant_level,
                associated_applications: application.into_iter().collect(),
            }),
        }
    }

    origins
}

/// Identifies the tenant in error messages.
struct TenantKey(TenantId);

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tenant {}", self.0)
    }
}

fn failed(
    operation: StoreOperation,
    key: impl fmt::Display,
) -> impl FnOnce(sqlx::Error) -> StorageError {
    let key = key.to_string();
    move |e| StorageError::operation(operation, key, e)
}

/// SQLite storage backend implementation.
pub struct SqliteCorsOriginStore {
    pool: SqlitePool,
}

impl SqliteCorsOriginStore {
    /// Create a new SQLite CORS origin store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_origin_id(
        conn: &mut SqliteConnection,
        tenant_id: TenantId,
        origin: &ValidatedOrigin,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(ORIGIN_ID_BY_TEXT)
            .bind(tenant_id.0)
            .bind(origin.as_str())
            .fetch_optional(&mut *conn)
            .await
    }

    async fn insert_origin(
        conn: &mut SqliteConnection,
        tenant_id: TenantId,
        origin: &ValidatedOrigin,
        tenant_level: bool,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(INSERT_ORIGIN)
            .bind(tenant_id.0)
            .bind(origin.as_str())
            .bind(OriginExternalId::generate().as_str())
            .bind(tenant_level)
            .fetch_optional(&mut *conn)
            .await
    }

    /// Id of the origin row for `origin`, inserting it without the tenant-level
    /// flag when it does not exist yet.
    async fn ensure_origin(
        conn: &mut SqliteConnection,
        tenant_id: TenantId,
        origin: &ValidatedOrigin,
    ) -> Result<i64, StorageError> {
        let existing = Self::find_origin_id(conn, tenant_id, origin)
            .await
            .map_err(failed(StoreOperation::AddOrigins, TenantKey(tenant_id)))?;
        if let Some(id) = existing {
            return Ok(id);
        }

        Self::insert_origin(conn, tenant_id, origin, false)
            .await
            .map_err(failed(StoreOperation::AddOrigins, TenantKey(tenant_id)))?
            .ok_or_else(|| {
                StorageError::operation(
                    StoreOperation::AddOrigins,
                    TenantKey(tenant_id),
                    format!("no id returned for origin {}", origin),
                )
            })
    }

    async fn insert_association(
        conn: &mut SqliteConnection,
        origin_id: i64,
        application_id: ApplicationId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(INSERT_ASSOCIATION)
            .bind(origin_id)
            .bind(application_id.0)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Delete tenant origins that are neither tenant-level nor associated with
    /// any application. Must run inside the transaction of the mutation that
    /// may have removed the last reference.
    async fn cleanup_dangling_origins(
        conn: &mut SqliteConnection,
        tenant_id: TenantId,
    ) -> Result<u64, sqlx::Error> {
        let removed = sqlx::query(
            r#"
            DELETE FROM cors_origin
            WHERE tenant_id = ?
              AND is_tenant_level = 0
              AND NOT EXISTS (
                  SELECT 1 FROM cors_association
                  WHERE cors_association.cors_origin_id = cors_origin.id
              )
            "#,
        )
        .bind(tenant_id.0)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if removed > 0 {
            debug!(
                "Removed {} dangling CORS origins for tenant {}",
                removed, tenant_id
            );
        }
        Ok(removed)
    }
}

impl Prioritized for SqliteCorsOriginStore {}

#[async_trait]
impl CorsOriginStore for SqliteCorsOriginStore {
    async fn origins_by_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<CorsOrigin>, StorageError> {
        let rows = sqlx::query_as::<_, OriginApplicationRow>(ORIGINS_BY_TENANT)
            .bind(tenant_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(failed(StoreOperation::RetrieveOrigins, TenantKey(tenant_id)))?;

        Ok(collect_origins(rows))
    }

    async fn origins_by_application(
        &self,
        tenant_id: TenantId,
        application_id: ApplicationId,
    ) -> Result<Vec<CorsOrigin>, StorageError> {
        let rows = sqlx::query_as::<_, OriginApplicationRow>(ORIGINS_BY_APPLICATION)
            .bind(tenant_id.0)
            .bind(application_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(failed(StoreOperation::RetrieveOrigins, TenantKey(tenant_id)))?;

        Ok(collect_origins(rows))
    }

    async fn origin_by_id(&self, origin_id: OriginId) -> Result<Option<CorsOrigin>, StorageError> {
        let rows = sqlx::query_as::<_, OriginApplicationRow>(ORIGIN_BY_ID)
            .bind(origin_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(failed(StoreOperation::RetrieveOrigins, origin_id))?;

        Ok(collect_origins(rows).into_iter().next())
    }

    async fn origin_by_external_id(
        &self,
        external_id: &OriginExternalId,
    ) -> Result<Option<CorsOrigin>, StorageError> {
        let rows = sqlx::query_as::<_, OriginApplicationRow>(ORIGIN_BY_EXTERNAL_ID)
            .bind(external_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(failed(StoreOperation::RetrieveOrigins, external_id))?;

        Ok(collect_origins(rows).into_iter().next())
    }

    async fn set_tenant_origins(
        &self,
        tenant_id: TenantId,
        origins: &[ValidatedOrigin],
    ) -> Result<(), StorageError> {
        debug!(
            "Replacing tenant-level CORS origins of tenant {} with {} origins",
            tenant_id,
            origins.len()
        );
        let on_error = || failed(StoreOperation::AddOrigins, TenantKey(tenant_id));
        let mut tx = begin_write(&self.pool).await.map_err(on_error())?;

        sqlx::query("UPDATE cors_origin SET is_tenant_level = 0 WHERE tenant_id = ?")
            .bind(tenant_id.0)
            .execute(&mut *tx)
            .await
            .map_err(on_error())?;

        Self::cleanup_dangling_origins(&mut tx, tenant_id)
            .await
            .map_err(on_error())?;

        for origin in origins {
            let existing = Self::find_origin_id(&mut tx, tenant_id, origin)
                .await
                .map_err(on_error())?;
            match existing {
                Some(id) => {
                    sqlx::query("UPDATE cors_origin SET is_tenant_level = 1 WHERE id = ?")
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .map_err(on_error())?;
                }
                None => {
                    Self::insert_origin(&mut tx, tenant_id, origin, true)
                        .await
                        .map_err(on_error())?;
                }
            }
        }

        tx.commit().await.map_err(on_error())
    }

    async fn set_application_origins(
        &self,
        tenant_id: TenantId,
        application_id: ApplicationId,
        origins: &[ValidatedOrigin],
    ) -> Result<(), StorageError> {
        debug!(
            "Replacing CORS origins of application {} in tenant {} with {} origins",
            application_id,
            tenant_id,
            origins.len()
        );
        let on_error = || failed(StoreOperation::AddOrigins, TenantKey(tenant_id));
        let mut tx = begin_write(&self.pool).await.map_err(on_error())?;

        sqlx::query(
            r#"
            DELETE FROM cors_association
            WHERE sp_app_id = ?
              AND cors_origin_id IN (SELECT id FROM cors_origin WHERE tenant_id = ?)
            "#,
        )
        .bind(application_id.0)
        .bind(tenant_id.0)
        .execute(&mut *tx)
        .await
        .map_err(on_error())?;

        Self::cleanup_dangling_origins(&mut tx, tenant_id)
            .await
            .map_err(on_error())?;

        for origin in origins {
            let origin_id = Self::ensure_origin(&mut tx, tenant_id, origin).await?;
            Self::insert_association(&mut tx, origin_id, application_id)
                .await
                .map_err(on_error())?;
        }

        tx.commit().await.map_err(on_error())
    }

    async fn add_tenant_origins(
        &self,
        tenant_id: TenantId,
        origins: &[ValidatedOrigin],
    ) -> Result<(), StorageError> {
        debug!(
            "Adding {} tenant-level CORS origins to tenant {}",
            origins.len(),
            tenant_id
        );
        let on_error = || failed(StoreOperation::AddOrigins, TenantKey(tenant_id));
        let mut tx = begin_write(&self.pool).await.map_err(on_error())?;

        // The (tenant_id, origin) unique constraint rejects duplicates.
        for origin in origins {
            Self::insert_origin(&mut tx, tenant_id, origin, true)
                .await
                .map_err(on_error())?;
        }

        tx.commit().await.map_err(on_error())
    }

    async fn add_application_origins(
        &self,
        tenant_id: TenantId,
        application_id: ApplicationId,
        origins: &[ValidatedOrigin],
    ) -> Result<(), StorageError> {
        debug!(
            "Adding {} CORS origins to application {} in tenant {}",
            origins.len(),
            application_id,
            tenant_id
        );
        let on_error = || failed(StoreOperation::AddOrigins, TenantKey(tenant_id));
        // The first statement is a read; the write lock must be held before it.
        let mut tx = begin_write(&self.pool).await.map_err(on_error())?;

        for origin in origins {
            let origin_id = Self::ensure_origin(&mut tx, tenant_id, origin).await?;
            Self::insert_association(&mut tx, origin_id, application_id)
                .await
                .map_err(on_error())?;
        }

        tx.commit().await.map_err(on_error())
    }

    async fn delete_tenant_origin_associations(
        &self,
        tenant_id: TenantId,
        origin_ids: &[OriginId],
    ) -> Result<(), StorageError> {
        debug!(
            "Removing tenant-level flag from {} CORS origins of tenant {}",
            origin_ids.len(),
            tenant_id
        );
        let operation = StoreOperation::DeleteOriginAssociations;
        let on_error = || failed(operation, TenantKey(tenant_id));
        let mut tx = begin_write(&self.pool).await.map_err(on_error())?;

        for origin_id in origin_ids {
            // Unknown ids update nothing; callers validate existence beforehand.
            sqlx::query(CLEAR_TENANT_LEVEL)
                .bind(origin_id.0)
                .bind(tenant_id.0)
                .execute(&mut *tx)
                .await
                .map_err(failed(operation, origin_id))?;
        }

        Self::cleanup_dangling_origins(&mut tx, tenant_id)
            .await
            .map_err(on_error())?;

        tx.commit().await.map_err(on_error())
    }

    async fn delete_application_origin_associations(
        &self,
        tenant_id: TenantId,
        application_id: ApplicationId,
        origin_ids: &[OriginId],
    ) -> Result<(), StorageError> {
        debug!(
            "Removing {} CORS origins from application {} in tenant {}",
            origin_ids.len(),
            application_id,
            tenant_id
        );
        let operation = StoreOperation::DeleteOriginAssociations;
        let on_error = || failed(operation, TenantKey(tenant_id));
        let mut tx = begin_write(&self.pool).await.map_err(on_error())?;

        for origin_id in origin_ids {
            sqlx::query(DELETE_ASSOCIATION)
                .bind(origin_id.0)
                .bind(application_id.0)
                .execute(&mut *tx)
                .await
                .map_err(failed(operation, origin_id))?;
        }

        Self::cleanup_dangling_origins(&mut tx, tenant_id)
            .await
            .map_err(on_error())?;

        tx.commit().await.map_err(on_error())
    }

    async fn origin_applications(
        &self,
        origin_id: OriginId,
    ) -> Result<Vec<CorsApplication>, StorageError> {
        let rows = sqlx::query_as::<_, ApplicationRow>(APPLICATIONS_BY_ORIGIN)
            .bind(origin_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(failed(StoreOperation::RetrieveOriginApplications, origin_id))?;

        Ok(rows.into_iter().map(CorsApplication::from).collect())
    }
}
