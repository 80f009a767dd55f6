// Models module - contains CORS origins, applications, identifiers and configuration resources

pub mod configuration;
pub mod cors_configuration;
pub mod ids;
pub mod origin;
pub mod validated_origin;

pub use configuration::{Attribute, Resource, ResourceAdd, ResourceType, ResourceTypeAdd};
pub use cors_configuration::CorsConfiguration;
pub use ids::{ApplicationId, OriginExternalId, OriginId, TenantId};
pub use origin::{CorsApplication, CorsOrigin};
pub use validated_origin::{OriginValidationError, ValidatedOrigin};
