//! Configuration-backed CORS URL allow-list.
//!
//! Each tenant owns one `CORS_URL` resource named `corsUrls`; every URL is an
//! attribute keyed by the hash of its text. There is no application scoping.

use super::error::CorsUrlError;
use super::url_conversion::{resource_to_urls, url_key, url_to_attribute, urls_to_resource};
use crate::models::{Resource, ResourceTypeAdd, TenantId};
use crate::storage::{ConfigurationError, ConfigurationManager, TenantResolver};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub const CORS_URL_RESOURCE_TYPE: &str = "CORS_URL";
pub const CORS_URL_RESOURCE_NAME: &str = "corsUrls";

const GETTING: &str = "getting CORS URLs";
const UPDATING: &str = "updating CORS URLs";
const ADDING: &str = "adding CORS URLs";
const DELETING: &str = "deleting CORS URLs";

pub struct CorsUrlService {
    tenants: Arc<dyn TenantResolver>,
    manager: Arc<dyn ConfigurationManager>,
}

fn distinct<S: AsRef<str>>(urls: &[S]) -> Vec<&str> {
    let mut seen = HashSet::new();
    urls.iter()
        .map(|url| url.as_ref())
        .filter(|url| seen.insert(*url))
        .collect()
}

impl CorsUrlService {
    pub fn new(tenants: Arc<dyn TenantResolver>, manager: Arc<dyn ConfigurationManager>) -> Self {
        Self { tenants, manager }
    }

    async fn resolve_tenant(&self, tenant_domain: &str) -> Result<TenantId, CorsUrlError> {
        self.tenants
            .tenant_id(tenant_domain)
            .await
            .map_err(|source| CorsUrlError::Storage {
                tenant_domain: tenant_domain.to_string(),
                source,
            })?
            .ok_or_else(|| CorsUrlError::InvalidTenantDomain(tenant_domain.to_string()))
    }

    async fn ensure_resource_type(&self, context: &'static str) -> Result<(), CorsUrlError> {
        self.manager
            .ensure_resource_type(&ResourceTypeAdd {
                name: CORS_URL_RESOURCE_TYPE.to_string(),
                description: Some("CORS allowed URLs".to_string()),
            })
            .await
            .map_err(CorsUrlError::configuration(context))?;
        Ok(())
    }

    /// The tenant's URL resource. A missing resource type counts as no resource.
    async fn resource(
        &self,
        tenant_id: TenantId,
        context: &'static str,
    ) -> Result<Option<Resource>, CorsUrlError> {
        match self
            .manager
            .get_resource(tenant_id, CORS_URL_RESOURCE_TYPE, CORS_URL_RESOURCE_NAME)
            .await
        {
            Ok(resource) => Ok(resource),
            Err(ConfigurationError::ResourceTypeDoesNotExist(_)) => Ok(None),
            Err(e) => Err(CorsUrlError::configuration(context)(e)),
        }
    }

    pub async fn get_cors_urls(&self, tenant_domain: &str) -> Result<Vec<String>, CorsUrlError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;

        match self.resource(tenant_id, GETTING).await? {
            Some(resource) => Ok(resource_to_urls(&resource)),
            None => Err(CorsUrlError::NoCorsUrls(tenant_domain.to_string())),
        }
    }

    /// Replace the tenant's URL list.
    pub async fn set_cors_urls<S: AsRef<str>>(
        &self,
        tenant_domain: &str,
        urls: &[S],
    ) -> Result<(), CorsUrlError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;
        self.ensure_resource_type(UPDATING).await?;
        debug!("Setting {} CORS URLs for {}", urls.len(), tenant_domain);

        self.manager
            .replace_resource(
                tenant_id,
                CORS_URL_RESOURCE_TYPE,
                &urls_to_resource(CORS_URL_RESOURCE_NAME, urls),
            )
            .await
            .map_err(CorsUrlError::configuration(UPDATING))?;
        Ok(())
    }

    pub async fn add_cors_url(&self, tenant_domain: &str, url: &str) -> Result<(), CorsUrlError> {
        self.add_cors_urls(tenant_domain, &[url]).await
    }

    /// Add URLs to the tenant's list. Fails without adding anything if any URL
    /// is already a member.
    pub async fn add_cors_urls<S: AsRef<str>>(
        &self,
        tenant_domain: &str,
        urls: &[S],
    ) -> Result<(), CorsUrlError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;
        self.ensure_resource_type(ADDING).await?;
        let urls = distinct(urls);

        let Some(resource) = self.resource(tenant_id, ADDING).await? else {
            self.manager
                .replace_resource(
                    tenant_id,
                    CORS_URL_RESOURCE_TYPE,
                    &urls_to_resource(CORS_URL_RESOURCE_NAME, urls.as_slice()),
                )
                .await
                .map_err(CorsUrlError::configuration(ADDING))?;
            return Ok(());
        };

        let existing = resource_to_urls(&resource);
        let is_member = |url: &str| existing.iter().any(|e| e == url);
        if let Some(url) = urls.iter().find(|url| is_member(**url)) {
            warn!("Tenant {} already has {} as a CORS URL", tenant_domain, url);
            return Err(CorsUrlError::UrlAlreadyRegistered {
                tenant_domain: tenant_domain.to_string(),
                url: url.to_string(),
            });
        }

        for url in urls {
            self.manager
                .add_attribute(
                    tenant_id,
                    CORS_URL_RESOURCE_TYPE,
                    CORS_URL_RESOURCE_NAME,
                    &url_to_attribute(url),
                )
                .await
                .map_err(CorsUrlError::configuration(ADDING))?;
        }
        Ok(())
    }

    pub async fn delete_cors_url(
        &self,
        tenant_domain: &str,
        url: &str,
    ) -> Result<(), CorsUrlError> {
        self.delete_cors_urls(tenant_domain, &[url]).await
    }

    /// Remove URLs from the tenant's list. Fails without deleting anything if
    /// any URL is not a member.
    pub async fn delete_cors_urls<S: AsRef<str>>(
        &self,
        tenant_domain: &str,
        urls: &[S],
    ) -> Result<(), CorsUrlError> {
        let tenant_id = self.resolve_tenant(tenant_domain).await?;
        let urls = distinct(urls);

        let Some(resource) = self.resource(tenant_id, DELETING).await? else {
            return Err(CorsUrlError::NoCorsUrls(tenant_domain.to_string()));
        };

        let existing = resource_to_urls(&resource);
        let is_member = |url: &str| existing.iter().any(|e| e == url);
        if let Some(url) = urls.iter().find(|url| !is_member(**url)) {
            warn!(
                "Tenant {} doesn't have {} as a CORS URL",
                tenant_domain, url
            );
            return Err(CorsUrlError::UrlNotRegistered {
                tenant_domain: tenant_domain.to_string(),
                url: url.to_string(),
            });
        }

        for url in urls {
            self.manager
                .delete_attribute(
                    tenant_id,
                    CORS_URL_RESOURCE_TYPE,
                    CORS_URL_RESOURCE_NAME,
                    &url_key(url),
                )
                .await
                .map_err(CorsUrlError::configuration(DELETING))?;
        }
        Ok(())
    }
}
