use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::ConfigError;
use crate::logging::LogFormat;

use super::loader::ConfigLoader;

// Configuration location constants
pub const USER_CONFIG_PATH: &str = "~/.config/scoped-container";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// 环境变量前缀；`SCOPED_CONTAINER_VALUE_<KEY>` 写入基础上下文
pub const ENV_PREFIX: &str = "SCOPED_CONTAINER_";
const ENV_VALUE_PREFIX: &str = "SCOPED_CONTAINER_VALUE_";

const ENV_INITIAL_CAPACITY: &str = "SCOPED_CONTAINER_INITIAL_CAPACITY";
const ENV_TRACKER_POOL_CAPACITY: &str = "SCOPED_CONTAINER_TRACKER_POOL_CAPACITY";
const ENV_LOG_LEVEL: &str = "SCOPED_CONTAINER_LOG_LEVEL";
const ENV_LOG_FORMAT: &str = "SCOPED_CONTAINER_LOG_FORMAT";

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// 绑定表初始容量
    pub initial_capacity: usize,
    /// 解析链状态复用池上限
    pub tracker_pool_capacity: usize,
    /// 写入基础上下文的键值
    pub base_values: BTreeMap<String, String>,
    pub log_level: String,
    pub log_format: String,
}

/// 从 TOML 文件读取的部分配置
#[derive(Deserialize, Debug, Default)]
pub struct PartialContainerConfig {
    pub initial_capacity: Option<usize>,
    pub tracker_pool_capacity: Option<usize>,
    #[serde(default)]
    pub base_values: Option<BTreeMap<String, String>>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            tracker_pool_capacity: default_tracker_pool_capacity(),
            base_values: BTreeMap::new(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl ContainerConfig {
    /// 从默认位置的配置文件与环境变量加载
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load_config()
    }

    /// 使用自定义根目录加载（测试用）
    pub fn load_with_base_path(base_path: PathBuf) -> Result<Self, ConfigError> {
        ConfigLoader::with_base_path(base_path).load_config()
    }

    /// 合并文件配置与环境变量，环境变量优先
    pub fn from_partial_and_env(
        partial: Option<PartialContainerConfig>,
        env_map: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let partial = partial.unwrap_or_default();

        let initial_capacity = match env_map.get(ENV_INITIAL_CAPACITY) {
            Some(raw) => parse_number("initial_capacity", raw)?,
            None => partial.initial_capacity.unwrap_or_else(default_initial_capacity),
        };

        let tracker_pool_capacity = match env_map.get(ENV_TRACKER_POOL_CAPACITY) {
            Some(raw) => parse_number("tracker_pool_capacity", raw)?,
            None => partial
                .tracker_pool_capacity
                .unwrap_or_else(default_tracker_pool_capacity),
        };

        let mut base_values = partial.base_values.unwrap_or_default();
        for (key, value) in &env_map {
            if let Some(name) = key.strip_prefix(ENV_VALUE_PREFIX) {
                if !name.is_empty() {
                    base_values.insert(name.to_lowercase(), value.clone());
                }
            }
        }

        let log_level = env_map
            .get(ENV_LOG_LEVEL)
            .cloned()
            .or(partial.log_level)
            .unwrap_or_else(default_log_level);
        let log_format = env_map
            .get(ENV_LOG_FORMAT)
            .cloned()
            .or(partial.log_format)
            .unwrap_or_else(default_log_format);

        let config = Self {
            initial_capacity,
            tracker_pool_capacity,
            base_values,
            log_level,
            log_format,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::invalid("log_level", self.log_level.as_str()))?;
        LogFormat::from_str(&self.log_format)?;

        if self.base_values.keys().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::invalid("base_values", "<empty key>"));
        }
        Ok(())
    }
}

fn parse_number(field: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::invalid(field, raw))
}

// Default functions
fn default_initial_capacity() -> usize {
    32
}

fn default_tracker_pool_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
