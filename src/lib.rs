// API module for the CORS management backend
pub mod api;

// Re-export api modules at crate root so services and storage can use crate::models, crate::storage
pub use api::config;
pub use api::middleware;
pub use api::models;
pub use api::services;
pub use api::storage;
