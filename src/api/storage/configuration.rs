//! Generic tenant-scoped configuration resources.
//!
//! A resource type names a family of resources; each tenant owns at most one
//! resource of a given name per type, and each resource holds an ordered list
//! of unique key/value attributes.

use super::begin_write;
use crate::models::{Attribute, Resource, ResourceAdd, ResourceType, ResourceTypeAdd, TenantId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

const TYPE_ID_BY_NAME: &str = "SELECT id FROM config_resource_type WHERE name = ?";

const INSERT_RESOURCE: &str = r#"
    INSERT INTO config_resource (id, tenant_id, type_id, name, created_at, last_modified)
    VALUES (?, ?, ?, ?, ?, ?)
"#;

const ATTRIBUTES_BY_RESOURCE: &str = r#"
    SELECT attr_key, attr_value
    FROM config_attribute
    WHERE resource_id = ?
    ORDER BY id ASC
"#;

const INSERT_ATTRIBUTE: &str =
    "INSERT INTO config_attribute (resource_id, attr_key, attr_value) VALUES (?, ?, ?)";

const DELETE_ATTRIBUTE: &str =
    "DELETE FROM config_attribute WHERE resource_id = ? AND attr_key = ?";

/// Configuration manager errors.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Resource type {0} does not exist")]
    ResourceTypeDoesNotExist(String),
    #[error("Resource type {0} already exists")]
    ResourceTypeAlreadyExists(String),
    #[error("Resource {name} of type {resource_type} does not exist")]
    ResourceDoesNotExist { resource_type: String, name: String },
    #[error("Attribute {key} already exists in resource {resource}")]
    AttributeAlreadyExists { resource: String, key: String },
    #[error("Attribute {key} does not exist in resource {resource}")]
    AttributeDoesNotExist { resource: String, key: String },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Invalid attribute value: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Resource-type, resource and attribute CRUD.
///
/// The tenant is always an explicit argument.
#[async_trait]
pub trait ConfigurationManager: Send + Sync {
    async fn get_resource_type(&self, name: &str) -> Result<ResourceType, ConfigurationError>;

    async fn add_resource_type(
        &self,
        resource_type: &ResourceTypeAdd,
    ) -> Result<ResourceType, ConfigurationError>;

    /// Fetch the resource type, creating it on first use.
    async fn ensure_resource_type(
        &self,
        resource_type: &ResourceTypeAdd,
    ) -> Result<ResourceType, ConfigurationError> {
        match self.get_resource_type(&resource_type.name).await {
            Err(ConfigurationError::ResourceTypeDoesNotExist(_)) => {
                self.add_resource_type(resource_type).await
            }
            other => other,
        }
    }

    /// `Ok(None)` when the type exists but the tenant has no such resource.
    async fn get_resource(
        &self,
        tenant_id: TenantId,
        resource_type: &str,
        name: &str,
    ) -> Result<Option<Resource>, ConfigurationError>;

    /// Create the resource, or replace all attributes of an existing one.
    async fn replace_resource(
        &self,
        tenant_id: TenantId,
        resource_type: &str,
        resource: &ResourceAdd,
    ) -> Result<Resource, ConfigurationError>;

    async fn add_attribute(
        &self,
        tenant_id: TenantId,
        resource_type: &str,
        resource_name: &str,
        attribute: &Attribute,
    ) -> Result<Attribute, ConfigurationError>;

    async fn delete_attribute(
        &self,
        tenant_id: TenantId,
        resource_type: &str,
        resource_name: &str,
        key: &str,
    ) -> Result<(), ConfigurationError>;
}

#[derive(sqlx::FromRow)]
struct ResourceTypeRow {
    id: String,
    name: String,
    description: Option<String>,
}

impl From<ResourceTypeRow> for ResourceType {
    fn from(row: ResourceTypeRow) -> Self {
        ResourceType {
            id: row.id,
            name: row.name,
            description: row.description,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AttributeRow {
    attr_key: String,
    attr_value: String,
}

/// SQLite implementation of [`ConfigurationManager`].
pub struct SqliteConfigurationManager {
    pool: SqlitePool,
}

impl SqliteConfigurationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn type_id(
        conn: &mut SqliteConnection,
        resource_type: &str,
    ) -> Result<String, ConfigurationError> {
        sqlx::query_scalar::<_, String>(TYPE_ID_BY_NAME)
            .bind(resource_type)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| ConfigurationError::ResourceTypeDoesNotExist(resource_type.to_string()))
    }

    async fn find_resource(
        conn: &mut SqliteConnection,
        tenant_id: TenantId,
        type_id: &str,
        name: &str,
    ) -> Result<Option<ResourceRow>, ConfigurationError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"
            SELECT id, name, created_at, last_modified
            FROM config_resource
            WHERE tenant_id = ? AND type_id = ? AND name = ?
            "#,
        )
        .bind(tenant_id.0)
        .bind(type_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row)
    }

    async fn require_resource(
        conn: &mut SqliteConnection,
        tenant_id: TenantId,
        resource_type: &str,
        name: &str,
    ) -> Result<ResourceRow, ConfigurationError> {
        let type_id = Self::type_id(conn, resource_type).await?;
        Self::find_resource(conn, tenant_id, &type_id, name)
            .await?
            .ok_or_else(|| ConfigurationError::ResourceDoesNotExist {
                resource_type: resource_type.to_string(),
                name: name.to_string(),
            })
    }

    async fn load_attributes(
        conn: &mut SqliteConnection,
        resource_id: &str,
    ) -> Result<Vec<Attribute>, ConfigurationError> {
        let rows = sqlx::query_as::<_, AttributeRow>(ATTRIBUTES_BY_RESOURCE)
            .bind(resource_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Attribute::new(row.attr_key, row.attr_value))
            .collect())
    }

    async fn touch(
        conn: &mut SqliteConnection,
        resource_id: &str,
    ) -> Result<(), ConfigurationError> {
        sqlx::query("UPDATE config_resource SET last_modified = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(resource_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigurationManager for SqliteConfigurationManager {
    async fn get_resource_type(&self, name: &str) -> Result<ResourceType, ConfigurationError> {
        sqlx::query_as::<_, ResourceTypeRow>(
            "SELECT id, name, description FROM config_resource_type WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .map(ResourceType::from)
        .ok_or_else(|| ConfigurationError::ResourceTypeDoesNotExist(name.to_string()))
    }

    async fn add_resource_type(
        &self,
        resource_type: &ResourceTypeAdd,
    ) -> Result<ResourceType, ConfigurationError> {
        let mut tx = begin_write(&self.pool).await?;

        let existing = sqlx::query_scalar::<_, String>(TYPE_ID_BY_NAME)
            .bind(&resource_type.name)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(ConfigurationError::ResourceTypeAlreadyExists(resource_type.name.clone()));
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO config_resource_type (id, name, description) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(&resource_type.name)
            .bind(resource_type.description.as_deref())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Created configuration resource type {}", resource_type.name);
        Ok(ResourceType {
            id,
            name: resource_type.name.clone(),
            description: resource_type.description.clone(),
        })
    }

    async fn get_resource(
        &self,
        tenant_id: TenantId,
        resource_type: &str,
        name: &str,
    ) -> Result<Option<Resource>, ConfigurationError> {
        let mut conn = self.pool.acquire().await?;

        let type_id = Self::type_id(&mut conn, resource_type).await?;
        let Some(row) = Self::find_resource(&mut conn, tenant_id, &type_id, name).await? else {
            return Ok(None);
        };
        let attributes = Self::load_attributes(&mut conn, &row.id).await?;

        Ok(Some(Resource {
            id: row.id,
            name: row.name,
            resource_type: resource_type.to_string(),
            attributes,
            created_at: row.created_at,
            last_modified: row.last_modified,
        }))
    }

    async fn replace_resource(
        &self,
        tenant_id: TenantId,
        resource_type: &str,
        resource: &ResourceAdd,
    ) -> Result<Resource, ConfigurationError> {
        debug!(
            "Replacing resource {} of type {} for tenant {} with {} attributes",
            resource.name,
            resource_type,
            tenant_id,
            resource.attributes.len()
        );
        let mut tx = begin_write(&self.pool).await?;
        let type_id = Self::type_id(&mut tx, resource_type).await?;
        let now = Utc::now();

        let existing = Self::find_resource(&mut tx, tenant_id, &type_id, &resource.name).await?;
        let (id, created_at) = match existing {
            Some(existing) => {
                sqlx::query("DELETE FROM config_attribute WHERE resource_id = ?")
                    .bind(&existing.id)
                    .execute(&mut *tx)
                    .await?;
                Self::touch(&mut tx, &existing.id).await?;
                (existing.id, existing.created_at)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                sqlx::query(INSERT_RESOURCE)
                    .bind(&id)
                    .bind(tenant_id.0)
                    .bind(&type_id)
                    .bind(&resource.name)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                (id, now)
            }
        };

        for attribute in &resource.attributes {
            sqlx::query(INSERT_ATTRIBUTE)
                .bind(&id)
                .bind(&attribute.key)
                .bind(&attribute.value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(Resource {
            id,
            name: resource.name.clone(),
            resource_type: resource_type.to_string(),
            attributes: resource.attributes.clone(),
            created_at,
            last_modified: now,
        })
    }

    async fn add_attribute(
        &self,
        tenant_id: TenantId,
        resource_type: &str,
        resource_name: &str,
        attribute: &Attribute,
    ) -> Result<Attribute, ConfigurationError> {
        let mut tx = begin_write(&self.pool).await?;
        let resource =
            Self::require_resource(&mut tx, tenant_id, resource_type, resource_name).await?;

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM config_attribute WHERE resource_id = ? AND attr_key = ?",
        )
        .bind(&resource.id)
        .bind(&attribute.key)
        .fetch_one(&mut *tx)
        .await?;
        if existing > 0 {
            return Err(ConfigurationError::AttributeAlreadyExists {
                resource: resource_name.to_string(),
                key: attribute.key.clone(),
            });
        }

        sqlx::query(INSERT_ATTRIBUTE)
            .bind(&resource.id)
            .bind(&attribute.key)
            .bind(&attribute.value)
            .execute(&mut *tx)
            .await?;
        Self::touch(&mut tx, &resource.id).await?;
        tx.commit().await?;

        Ok(attribute.clone())
    }

    async fn delete_attribute(
        &self,
        tenant_id: TenantId,
        resource_type: &str,
        resource_name: &str,
        key: &str,
    ) -> Result<(), ConfigurationError> {
        let mut tx = begin_write(&self.pool).await?;
        let resource =
            Self::require_resource(&mut tx, tenant_id, resource_type, resource_name).await?;

        let removed = sqlx::query(DELETE_ATTRIBUTE)
            .bind(&resource.id)
            .bind(key)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(ConfigurationError::AttributeDoesNotExist {
                resource: resource_name.to_string(),
                key: key.to_string(),
            });
        }

        Self::touch(&mut tx, &resource.id).await?;
        tx.commit().await?;
        Ok(())
    }
}
