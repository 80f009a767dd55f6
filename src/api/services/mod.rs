//! Services module - tenant and application scoped CORS management on top of the storage layer.

pub mod cors_management_service;
pub mod cors_url_service;
pub mod error;
pub mod origin_validation;
pub mod url_conversion;

// Re-export for convenience
pub use cors_management_service::CorsManagementService;
pub use cors_url_service::{CORS_URL_RESOURCE_NAME, CORS_URL_RESOURCE_TYPE, CorsUrlService};
pub use error::{CorsError, CorsUrlError};
pub use origin_validation::validate_origins;
