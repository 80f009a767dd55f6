//! CORS origin management service.
//!
//! Resolves tenant domains and application resource ids, enforces the
//! duplicate and existence checks of the public operations, and delegates the
//! mutations to the highest-priority registered origin store.

use super::error::CorsError;
use super::origin_validation::validate_origins;
use crate::models::{
    ApplicationId, CorsApplication, CorsConfiguration, CorsOrigin, OriginExternalId, OriginId,
    TenantId, ValidatedOrigin,
};
use crate::storage::{
    ApplicationResolver, CorsConfigurationStore, CorsOriginStore, Prioritized, StorageError,
    TenantResolver,
};
use std::sync::Arc;
use tracing::{debug, warn};

const ORIGIN_STORE_ROLE: &str = "CORS origin";
const CONFIGURATION_STORE_ROLE: &str = "CORS configuration";

/// Tenant and application scoped CORS origin operations.
pub struct CorsManagementService {
    tenants: Arc<dyn TenantResolver>,
    applications: Arc<dyn ApplicationResolver>,
    origin_stores: Vec<Arc<dyn CorsOriginStore>>,
    configuration_stores: Vec<Arc<dyn CorsConfigurationStore>>,
}

/// Keep `stores` in ascending priority. The sort is stable, so the last
/// element is the highest priority store registered most recently.
fn register<T: Prioritized + ?Sized>(stores: &mut Vec<Arc<T>>, store: Arc<T>) {
    stores.push(store);
    stores.sort_by_key(|s| s.priority());
}

impl CorsManagementService {
    pub fn new(
        tenants: Arc<dyn TenantResolver>,
        applications: Arc<dyn ApplicationResolver>,
    ) -> Self {
        Self {
            tenants,
            applications,
            origin_stores: Vec::new(),
            configuration_stores: Vec::new(),
        }
    }

    pub fn with_origin_store(mut self, store: Arc<dyn CorsOriginStore>) -> Self {
        register(&mut self.origin_stores, store);
        self
    }

    pub fn with_configuration_store(mut self, store: Arc<dyn CorsConfigurationStore>) -> Self {
        register(&mut self.configuration_stores, store);
        self
    }

    fn origin_store(&self) -> Result<&dyn CorsOriginStore, CorsError> {
        self.origin_stores
            .last()
            .map(|store| store.as_ref())
            .ok_or(CorsError::StoreUnavailable(ORIGIN_STORE_ROLE))
    }

    fn configuration_store(&self) -> Result<&dyn CorsConfigurationStore, CorsError> {
        self.configuration_stores
            .last()
            .map(|store| store.as_ref())
            .ok_or(CorsError::StoreUnavailable(CONFIGURATION_STORE_ROLE))
    }

    async fn resolve_tenant(&self, tenant_domain: &str) -> Result<TenantId, CorsError> {
        if tenant_domain.trim().is_empty() {
            return Err(CorsError::InvalidTenantDomain(tenant_domain.to_string()));
        }

        self.tenants
            .tenant_id(tenant_domain)
            .await
            .map_err(CorsError::storage(tenant_domain))?
            .ok_or_else(|| {
                warn!("Rejected CORS request for unknown tenant {}", tenant_domain);
                CorsError::InvalidTenantDomain(tenant_domain.to_string())
            })
    }

    async fn resolve_application(
        &self,
        tenant_domain: &str,
        application_resource_id: &str,
    ) -> Result<ApplicationId, CorsError> {
        if application_resource_id.trim().is_empty() {
            return Err(CorsError::InvalidApplicationId(application_resource_id.to_string()));
        }

        let application = self
            .applications
            .application_by_resource_id(tenant_domain, application_resource_id)
            .await
            .map_err(CorsError::storage(application_resource_id))?;

        match application {
            Some(application) => Ok(application.id),
            None => {
                warn!(
                    "Rejected CORS request for unknown application {} in tenant {}",
                    application_resource_id, tenant_domain
                );
                Err(CorsError::InvalidApplicationId(application_resource_id.to_string()))
            }
        }
    }

    /// All CORS origins of the tenant, including application-only ones.
    pub async fn get_tenant_cors_origins(
        &self,
        tenant_domain: &str,
    ) -> Result<Vec<CorsOrigin>, CorsError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;

        self.origin_store()?
            .origins_by_tenant(tenant_id)
            .await
            .map_err(CorsError::storage(tenant_domain))
    }

    pub async fn get_application_cors_origins(
        &self,
        tenant_domain: &str,
        application_resource_id: &str,
    ) -> Result<Vec<CorsOrigin>, CorsError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;
        let application_id = self
            .resolve_application(tenant_domain, application_resource_id)
            .await?;

        self.origin_store()?
            .origins_by_application(tenant_id, application_id)
            .await
            .map_err(CorsError::storage(tenant_domain))
    }

    /// Replace the tenant-level origins.
    pub async fn set_tenant_cors_origins<S: AsRef<str>>(
        &self,
        tenant_domain: &str,
        origins: &[S],
    ) -> Result<(), CorsError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;
        let origins = validate_origins(origins)?;
        debug!(
            "Setting {} tenant CORS origins for {}",
            origins.len(),
            tenant_domain
        );

        self.origin_store()?
            .set_tenant_origins(tenant_id, &origins)
            .await
            .map_err(CorsError::storage(tenant_domain))
    }

    /// Replace the origins associated with an application.
    pub async fn set_application_cors_origins<S: AsRef<str>>(
        &self,
        tenant_domain: &str,
        application_resource_id: &str,
        origins: &[S],
    ) -> Result<(), CorsError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;
        let application_id = self
            .resolve_application(tenant_domain, application_resource_id)
            .await?;
        let origins = validate_origins(origins)?;
        debug!(
            "Setting {} CORS origins for application {} of {}",
            origins.len(),
            application_resource_id,
            tenant_domain
        );

        self.origin_store()?
            .set_application_origins(tenant_id, application_id, &origins)
            .await
            .map_err(CorsError::storage(tenant_domain))
    }

    /// Add tenant-level origins. Fails without adding anything if any origin
    /// is already registered for the tenant.
    pub async fn add_tenant_cors_origins<S: AsRef<str>>(
        &self,
        tenant_domain: &str,
        origins: &[S],
    ) -> Result<(), CorsError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;
        let origins = validate_origins(origins)?;
        let store = self.origin_store()?;

        let existing = store
            .origins_by_tenant(tenant_id)
            .await
            .map_err(CorsError::storage(tenant_domain))?;
        ensure_not_registered(tenant_domain, &existing, &origins)?;

        store
            .add_tenant_origins(tenant_id, &origins)
            .await
            .map_err(CorsError::storage(tenant_domain))
    }

    /// Associate origins with an application. Fails without adding anything if
    /// any origin is already associated with it.
    pub async fn add_application_cors_origins<S: AsRef<str>>(
        &self,
        tenant_domain: &str,
        application_resource_id: &str,
        origins: &[S],
    ) -> Result<(), CorsError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;
        let application_id = self
            .resolve_application(tenant_domain, application_resource_id)
            .await?;
        let origins = validate_origins(origins)?;
        let store = self.origin_store()?;

        let existing = store
            .origins_by_application(tenant_id, application_id)
            .await
            .map_err(CorsError::storage(tenant_domain))?;
        ensure_not_registered(tenant_domain, &existing, &origins)?;

        store
            .add_application_origins(tenant_id, application_id, &origins)
            .await
            .map_err(CorsError::storage(tenant_domain))
    }

    /// Drop the tenant-level association of the given origins. Fails without
    /// deleting anything if any id is not an origin of the tenant.
    pub async fn delete_tenant_cors_origins<S: AsRef<str>>(
        &self,
        tenant_domain: &str,
        origin_ids: &[S],
    ) -> Result<(), CorsError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;
        let store = self.origin_store()?;

        let existing = store
            .origins_by_tenant(tenant_id)
            .await
            .map_err(CorsError::storage(tenant_domain))?;
        let ids = internal_ids(tenant_domain, &existing, origin_ids)?;

        store
            .delete_tenant_origin_associations(tenant_id, &ids)
            .await
            .map_err(CorsError::storage(tenant_domain))
    }

    /// Drop the association of the given origins with an application. Fails
    /// without deleting anything if any id is not associated with it.
    pub async fn delete_application_cors_origins<S: AsRef<str>>(
        &self,
        tenant_domain: &str,
        application_resource_id: &str,
        origin_ids: &[S],
    ) -> Result<(), CorsError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;
        let application_id = self
            .resolve_application(tenant_domain, application_resource_id)
            .await?;
        let store = self.origin_store()?;

        let existing = store
            .origins_by_application(tenant_id, application_id)
            .await
            .map_err(CorsError::storage(tenant_domain))?;
        let ids = internal_ids(tenant_domain, &existing, origin_ids)?;

        store
            .delete_application_origin_associations(tenant_id, application_id, &ids)
            .await
            .map_err(CorsError::storage(tenant_domain))
    }

    /// Applications associated with the origin identified by `origin_id`.
    pub async fn get_cors_origin_applications(
        &self,
        origin_id: &str,
    ) -> Result<Vec<CorsApplication>, CorsError> {
        let store = self.origin_store()?;
        let external_id = OriginExternalId::from(origin_id);

        let origin = store
            .origin_by_external_id(&external_id)
            .await
            .map_err(CorsError::storage(origin_id))?
            .ok_or_else(|| CorsError::Storage {
                key: origin_id.to_string(),
                source: StorageError::NotFound {
                    entity_type: "CORS origin".to_string(),
                    entity_id: origin_id.to_string(),
                },
            })?;

        Ok(origin.associated_applications)
    }

    pub async fn get_cors_configuration(
        &self,
        tenant_domain: &str,
    ) -> Result<CorsConfiguration, CorsError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;

        self.configuration_store()?
            .cors_configuration(tenant_id)
            .await
            .map_err(|source| CorsError::Configuration {
                key: tenant_domain.to_string(),
                source,
            })
    }

    pub async fn set_cors_configuration(
        &self,
        tenant_domain: &str,
        configuration: &CorsConfiguration,
    ) -> Result<(), CorsError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;

        self.configuration_store()?
            .set_cors_configuration(tenant_id, configuration)
            .await
            .map_err(|source| CorsError::Configuration {
                key: tenant_domain.to_string(),
                source,
            })
    }
}

fn ensure_not_registered(
    tenant_domain: &str,
    existing: &[CorsOrigin],
    candidates: &[ValidatedOrigin],
) -> Result<(), CorsError> {
    for candidate in candidates {
        if existing.iter().any(|o| o.origin == candidate.as_str()) {
            warn!(
                "Tenant {} already has {} as a CORS origin",
                tenant_domain, candidate
            );
            return Err(CorsError::OriginAlreadyRegistered {
                tenant_domain: tenant_domain.to_string(),
                origin: candidate.to_string(),
            });
        }
    }
    Ok(())
}

/// Translate external ids to internal ids within the scoped set `existing`.
fn internal_ids<S: AsRef<str>>(
    tenant_domain: &str,
    existing: &[CorsOrigin],
    origin_ids: &[S],
) -> Result<Vec<OriginId>, CorsError> {
    origin_ids
        .iter()
        .map(|origin_id| {
            let origin_id = origin_id.as_ref();
            existing
                .iter()
                .find(|o| o.external_id.as_str() == origin_id)
                .map(|o| o.id)
                .ok_or_else(|| {
                    warn!(
                        "Tenant {} doesn't have a CORS origin with id {}",
                        tenant_domain, origin_id
                    );
                    CorsError::OriginNotPresent {
                        tenant_domain: tenant_domain.to_string(),
                        origin_id: origin_id.to_string(),
                    }
                })
        })
        .collect()
}
