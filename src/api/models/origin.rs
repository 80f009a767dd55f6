use super::ids::{ApplicationId, OriginExternalId, OriginId};
use serde::{Deserialize, Serialize};

/// Application associated with a CORS origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsApplication {
    pub id: ApplicationId,
    /// Resource id of the application as known to callers
    pub resource_id: String,
    pub name: String,
}

/// A stored CORS origin row together with its application associations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsOrigin {
    pub id: OriginId,
    pub external_id: OriginExternalId,
    pub origin: String,
    /// Applies to every application of the tenant
    pub tenant_level: bool,
    #[serde(default)]
    pub associated_applications: Vec<CorsApplication>,
}

impl CorsOrigin {
    /// Whether the origin is associated with the given application.
    pub fn is_associated_with(&self, application_id: ApplicationId) -> bool {
        self.associated_applications
            .iter()
            .any(|app| app.id == application_id)
    }
}
