//! Tenant CORS settings persisted as one configuration resource.
//!
//! Every settings field becomes an attribute whose value is the JSON encoding
//! of the field, so fields added later fall back to their defaults on read.

use super::configuration::{ConfigurationError, ConfigurationManager};
use super::traits::{CorsConfigurationStore, Prioritized};
use crate::models::{Attribute, CorsConfiguration, ResourceAdd, ResourceTypeAdd, TenantId};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

pub const CORS_CONFIGURATION_RESOURCE_TYPE: &str = "CORS_CONFIGURATION";
pub const CORS_CONFIGURATION_RESOURCE_NAME: &str = "corsConfiguration";

/// [`CorsConfigurationStore`] on top of a [`ConfigurationManager`].
pub struct ConfigurationBackedCorsConfigurationStore {
    manager: Arc<dyn ConfigurationManager>,
}

impl ConfigurationBackedCorsConfigurationStore {
    pub fn new(manager: Arc<dyn ConfigurationManager>) -> Self {
        Self { manager }
    }
}

fn to_attributes(configuration: &CorsConfiguration) -> Result<Vec<Attribute>, ConfigurationError> {
    let Value::Object(fields) = serde_json::to_value(configuration)? else {
        return Ok(Vec::new());
    };
    Ok(fields
        .into_iter()
        .map(|(key, value)| Attribute::new(key, value.to_string()))
        .collect())
}

fn from_attributes(attributes: &[Attribute]) -> Result<CorsConfiguration, ConfigurationError> {
    let mut fields = Map::new();
    for attribute in attributes {
        let value = serde_json::from_str(&attribute.value)?;
        fields.insert(attribute.key.clone(), value);
    }
    Ok(serde_json::from_value(Value::Object(fields))?)
}

impl Prioritized for ConfigurationBackedCorsConfigurationStore {}

#[async_trait]
impl CorsConfigurationStore for ConfigurationBackedCorsConfigurationStore {
    async fn cors_configuration(
        &self,
        tenant_id: TenantId,
    ) -> Result<CorsConfiguration, ConfigurationError> {
        let resource = match self
            .manager
            .get_resource(
                tenant_id,
                CORS_CONFIGURATION_RESOURCE_TYPE,
                CORS_CONFIGURATION_RESOURCE_NAME,
            )
            .await
        {
            Ok(resource) => resource,
            Err(ConfigurationError::ResourceTypeDoesNotExist(_)) => None,
            Err(e) => return Err(e),
        };

        match resource {
            Some(resource) => from_attributes(&resource.attributes),
            None => {
                debug!(
                    "No CORS configuration for tenant {}, using defaults",
                    tenant_id
                );
                Ok(CorsConfiguration::default())
            }
        }
    }

    async fn set_cors_configuration(
        &self,
        tenant_id: TenantId,
        configuration: &CorsConfiguration,
    ) -> Result<(), ConfigurationError> {
        self.manager
            .ensure_resource_type(&ResourceTypeAdd {
                name: CORS_CONFIGURATION_RESOURCE_TYPE.to_string(),
                description: Some("Tenant CORS behaviour settings".to_string()),
            })
            .await?;

        let resource = ResourceAdd {
            name: CORS_CONFIGURATION_RESOURCE_NAME.to_string(),
            attributes: to_attributes(configuration)?,
        };
        self.manager
            .replace_resource(tenant_id, CORS_CONFIGURATION_RESOURCE_TYPE, &resource)
            .await?;
        Ok(())
    }
}
