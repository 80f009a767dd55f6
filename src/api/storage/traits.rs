//! Storage trait definitions for the CORS storage backends.

use super::StorageError;
use super::configuration::ConfigurationError;
use crate::models::{
    ApplicationId, CorsApplication, CorsConfiguration, CorsOrigin, OriginExternalId, OriginId,
    TenantId, ValidatedOrigin,
};

/// Implementations registered for the same role are ordered by priority.
pub trait Prioritized {
    /// Higher wins. On a tie the implementation registered last wins.
    fn priority(&self) -> i32 {
        1
    }
}

/// Relational store for CORS origins and their application associations.
///
/// Every mutating method runs in a single transaction. Methods that can remove
/// the last reference to an origin delete dangling rows before committing.
#[async_trait::async_trait]
pub trait CorsOriginStore: Prioritized + Send + Sync {
    /// All origins of the tenant, tenant-level or application scoped, by id.
    async fn origins_by_tenant(&self, tenant_id: TenantId)
    -> Result<Vec<CorsOrigin>, StorageError>;

    /// Origins associated with one application of the tenant, by id.
    async fn origins_by_application(
        &self,
        tenant_id: TenantId,
        application_id: ApplicationId,
    ) -> Result<Vec<CorsOrigin>, StorageError>;

    /// Get an origin by its internal id
    async fn origin_by_id(&self, origin_id: OriginId) -> Result<Option<CorsOrigin>, StorageError>;

    /// Get an origin by its external id
    async fn origin_by_external_id(
        &self,
        external_id: &OriginExternalId,
    ) -> Result<Option<CorsOrigin>, StorageError>;

    /// Replace the tenant-level origin set.
    async fn set_tenant_origins(
        &self,
        tenant_id: TenantId,
        origins: &[ValidatedOrigin],
    ) -> Result<(), StorageError>;

    /// Replace the origin set associated with an application.
    async fn set_application_origins(
        &self,
        tenant_id: TenantId,
        application_id: ApplicationId,
        origins: &[ValidatedOrigin],
    ) -> Result<(), StorageError>;

    /// Insert new tenant-level origins. Existing origin text is rejected.
    async fn add_tenant_origins(
        &self,
        tenant_id: TenantId,
        origins: &[ValidatedOrigin],
    ) -> Result<(), StorageError>;

    /// Associate origins with an application, creating missing origin rows.
    async fn add_application_origins(
        &self,
        tenant_id: TenantId,
        application_id: ApplicationId,
        origins: &[ValidatedOrigin],
    ) -> Result<(), StorageError>;

    /// Clear the tenant-level flag of the given origins.
    async fn delete_tenant_origin_associations(
        &self,
        tenant_id: TenantId,
        origin_ids: &[OriginId],
    ) -> Result<(), StorageError>;

    /// Remove the association of the given origins with an application.
    async fn delete_application_origin_associations(
        &self,
        tenant_id: TenantId,
        application_id: ApplicationId,
        origin_ids: &[OriginId],
    ) -> Result<(), StorageError>;

    /// Applications associated with an origin.
    async fn origin_applications(
        &self,
        origin_id: OriginId,
    ) -> Result<Vec<CorsApplication>, StorageError>;
}

/// Resolves tenant domains to internal tenant ids.
#[async_trait::async_trait]
pub trait TenantResolver: Send + Sync {
    async fn tenant_id(&self, tenant_domain: &str) -> Result<Option<TenantId>, StorageError>;
}

/// Resolves application resource ids within a tenant.
#[async_trait::async_trait]
pub trait ApplicationResolver: Send + Sync {
    async fn application_by_resource_id(
        &self,
        tenant_domain: &str,
        resource_id: &str,
    ) -> Result<Option<CorsApplication>, StorageError>;
}

/// Persistence for tenant-wide CORS behaviour settings.
#[async_trait::async_trait]
pub trait CorsConfigurationStore: Prioritized + Send + Sync {
    /// Stored configuration, or the defaults when none was saved.
    async fn cors_configuration(
        &self,
        tenant_id: TenantId,
    ) -> Result<CorsConfiguration, ConfigurationError>;

    async fn set_cors_configuration(
        &self,
        tenant_id: TenantId,
        configuration: &CorsConfiguration,
    ) -> Result<(), ConfigurationError>;
}
