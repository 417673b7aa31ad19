pub mod config;
pub mod errors;
pub mod infrastructure;
pub mod logging;

// Re-export commonly used items for convenience
pub use config::ContainerConfig;
pub use errors::{AppError, ConfigError};
pub use infrastructure::container::{
    predicate, BoxError, Container, ContainerContext, ContainerError, ContainerErrorKind, ContainerStats,
    ContextPredicate, Lifecycle, Scope, ServiceInstance, REQUEST_ID_KEY,
};
