use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::errors::ConfigError;

use super::container_config::{
    ContainerConfig, PartialContainerConfig, CONFIG_FILE_NAME, ENV_PREFIX, USER_CONFIG_PATH,
};

/// Configuration loader responsible for loading config from files and environment
pub struct ConfigLoader {
    base_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default paths
    pub fn new() -> Self {
        Self { base_path: None }
    }

    /// Create a config loader with custom base path (for testing)
    pub fn with_base_path(base_path: PathBuf) -> Self {
        Self {
            base_path: Some(base_path),
        }
    }

    /// 从默认配置文件加载；文件不存在时只使用环境变量与默认值
    pub fn load_config(&self) -> Result<ContainerConfig, ConfigError> {
        let config_path = self.config_path();
        self.load_from(&config_path)
    }

    /// 从指定文件加载
    pub fn load_from(&self, config_path: &Path) -> Result<ContainerConfig, ConfigError> {
        let partial = self.load_partial_config(config_path)?;
        let env_map = self.collect_env_vars();
        tracing::debug!(
            path = %config_path.display(),
            from_file = partial.is_some(),
            env_overrides = env_map.len(),
            "Loading container configuration"
        );
        ContainerConfig::from_partial_and_env(partial, env_map)
    }

    /// 配置文件路径
    pub fn config_path(&self) -> PathBuf {
        self.extract_file_path(USER_CONFIG_PATH, CONFIG_FILE_NAME)
    }

    /// Extract file path with tilde expansion and base path override
    fn extract_file_path(&self, base_dir: &str, file_name: &str) -> PathBuf {
        let expanded_base = if let Some(base_path) = &self.base_path {
            base_path.join(base_dir.trim_start_matches("~/"))
        } else {
            let expanded = shellexpand::tilde(base_dir);
            PathBuf::from(expanded.as_ref())
        };

        expanded_base.join(file_name)
    }

    /// Load partial configuration from TOML file
    fn load_partial_config(&self, config_path: &Path) -> Result<Option<PartialContainerConfig>, ConfigError> {
        if !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(config_path)
            .map_err(|e| ConfigError::FileRead(config_path.to_string_lossy().to_string(), e))?;

        let partial: PartialContainerConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::TomlParse(config_path.to_string_lossy().to_string(), e))?;

        Ok(Some(partial))
    }

    /// 收集带前缀的环境变量
    fn collect_env_vars(&self) -> HashMap<String, String> {
        env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)).collect()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
