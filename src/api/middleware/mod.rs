// Middleware module - contains observability setup

pub mod observability;

// Re-export for convenience
pub use observability::init_tracing;
