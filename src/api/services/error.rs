//! Service-level error types.

use crate::models::OriginValidationError;
use crate::storage::{ConfigurationError, StorageError};
use thiserror::Error;

/// Errors of the CORS origin management service.
#[derive(Error, Debug)]
pub enum CorsError {
    #[error("Invalid tenant domain: {0}")]
    InvalidTenantDomain(String),

    #[error("Invalid application id: {0}")]
    InvalidApplicationId(String),

    #[error("Tenant {tenant_domain} already has {origin} as a CORS origin")]
    OriginAlreadyRegistered {
        tenant_domain: String,
        origin: String,
    },

    #[error("Tenant {tenant_domain} doesn't have a CORS origin with id {origin_id}")]
    OriginNotPresent {
        tenant_domain: String,
        origin_id: String,
    },

    #[error("Invalid CORS origin: {0}")]
    InvalidOrigin(#[from] OriginValidationError),

    #[error("Storage failure for {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Configuration failure for {key}: {source}")]
    Configuration {
        key: String,
        #[source]
        source: ConfigurationError,
    },

    #[error("No {0} store is registered")]
    StoreUnavailable(&'static str),
}

impl CorsError {
    /// Whether the caller can fix the request. Everything else is a server failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CorsError::InvalidTenantDomain(_)
                | CorsError::InvalidApplicationId(_)
                | CorsError::OriginAlreadyRegistered { .. }
                | CorsError::OriginNotPresent { .. }
                | CorsError::InvalidOrigin(_)
        )
    }

    pub(crate) fn storage(key: impl Into<String>) -> impl FnOnce(StorageError) -> CorsError {
        let key = key.into();
        move |source| CorsError::Storage { key, source }
    }
}

/// Errors of the configuration-backed CORS URL service.
#[derive(Error, Debug)]
pub enum CorsUrlError {
    #[error("Invalid tenant domain: {0}")]
    InvalidTenantDomain(String),

    #[error("Tenant {0} does not have any CORS URLs")]
    NoCorsUrls(String),

    #[error("Tenant {tenant_domain} already has {url} as a CORS URL")]
    UrlAlreadyRegistered { tenant_domain: String, url: String },

    #[error("Tenant {tenant_domain} doesn't have {url} as a CORS URL")]
    UrlNotRegistered { tenant_domain: String, url: String },

    #[error("Error while {context}: {source}")]
    Configuration {
        context: &'static str,
        #[source]
        source: ConfigurationError,
    },

    #[error("Error while resolving tenant {tenant_domain}: {source}")]
    Storage {
        tenant_domain: String,
        #[source]
        source: StorageError,
    },
}

impl CorsUrlError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CorsUrlError::InvalidTenantDomain(_)
                | CorsUrlError::NoCorsUrls(_)
                | CorsUrlError::UrlAlreadyRegistered { .. }
                | CorsUrlError::UrlNotRegistered { .. }
        )
    }

    pub(crate) fn configuration(
        context: &'static str,
    ) -> impl FnOnce(ConfigurationError) -> CorsUrlError {
        move |source| CorsUrlError::Configuration { context, source }
    }
}
