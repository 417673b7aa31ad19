pub mod container_config;
pub mod loader;

pub use container_config::{ContainerConfig, PartialContainerConfig};
pub use container_config::{CONFIG_FILE_NAME, ENV_PREFIX, USER_CONFIG_PATH};
pub use loader::ConfigLoader;
