use serde::{Deserialize, Serialize};

/// Tenant-wide CORS behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfiguration {
    /// Let non-CORS requests through the filter
    pub allow_generic_http_requests: bool,
    pub allow_any_origin: bool,
    /// Accept subdomains of registered origins
    pub allow_subdomains: bool,
    pub supported_methods: Vec<String>,
    pub support_any_header: bool,
    pub supported_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub supports_credentials: bool,
    /// Preflight cache lifetime in seconds, negative disables the header
    pub max_age: i64,
}

impl Default for CorsConfiguration {
    fn default() -> Self {
        Self {
            allow_generic_http_requests: true,
            allow_any_origin: false,
            allow_subdomains: false,
            supported_methods: ["GET", "POST", "HEAD", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            support_any_header: true,
            supported_headers: Vec::new(),
            exposed_headers: Vec::new(),
            supports_credentials: false,
            max_age: 3600,
        }
    }
}
