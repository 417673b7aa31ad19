//! 容器错误类型

use thiserror::Error;

/// 生命周期钩子与谓词返回的错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 依赖注入容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 绑定时未提供实现
    #[error("nil service provided for type: {type_name}")]
    NilService { type_name: String },

    /// 解析的 (作用域, 类型) 未注册
    #[error("no binding found for type: {type_name}")]
    BindingNotFound { type_name: String },

    /// 同一调用链上重复解析同一类型
    #[error("circular dependency detected for type: {key}")]
    CircularDependency { key: String },

    /// 缺少必需的上下文值
    #[error("required context value not found: {key}")]
    MissingContextValue { key: String },

    /// 解析得到的实例不满足请求的能力类型
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    /// `on_boot` 失败
    #[error("initialization failed for type {type_name}: {source}")]
    Initialization {
        type_name: String,
        #[source]
        source: BoxError,
    },

    /// `on_shutdown` 失败
    #[error("shutdown failed for type {type_name}: {source}")]
    Shutdown {
        type_name: String,
        #[source]
        source: BoxError,
    },

    /// 条件绑定谓词失败或返回了错误的类型
    #[error("predicate evaluation failed for type {type_name}: {source}")]
    Predicate {
        type_name: String,
        #[source]
        source: BoxError,
    },

    /// 批量启动失败（保留，当前启动流程直接返回具体错误）
    #[error("boot failed for type {type_name}: {source}")]
    Boot {
        type_name: String,
        #[source]
        source: BoxError,
    },

    /// 作用域误用（保留，当前流程不会触发）
    #[error("invalid scope {scope} for type {type_name}")]
    InvalidScope { type_name: String, scope: String },
}

/// 错误种类，便于匹配与日志归类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerErrorKind {
    NilService,
    BindingNotFound,
    CircularDependency,
    MissingContextValue,
    TypeMismatch,
    Initialization,
    Shutdown,
    Predicate,
    Boot,
    InvalidScope,
}

impl ContainerError {
    /// 错误种类
    pub fn kind(&self) -> ContainerErrorKind {
        match self {
            ContainerError::NilService { .. } => ContainerErrorKind::NilService,
            ContainerError::BindingNotFound { .. } => ContainerErrorKind::BindingNotFound,
            ContainerError::CircularDependency { .. } => ContainerErrorKind::CircularDependency,
            ContainerError::MissingContextValue { .. } => ContainerErrorKind::MissingContextValue,
            ContainerError::TypeMismatch { .. } => ContainerErrorKind::TypeMismatch,
            ContainerError::Initialization { .. } => ContainerErrorKind::Initialization,
            ContainerError::Shutdown { .. } => ContainerErrorKind::Shutdown,
            ContainerError::Predicate { .. } => ContainerErrorKind::Predicate,
            ContainerError::Boot { .. } => ContainerErrorKind::Boot,
            ContainerError::InvalidScope { .. } => ContainerErrorKind::InvalidScope,
        }
    }

    /// 出错的能力类型名（缺少上下文值的错误没有类型）
    pub fn type_name(&self) -> Option<&str> {
        match self {
            ContainerError::NilService { type_name }
            | ContainerError::BindingNotFound { type_name }
            | ContainerError::Initialization { type_name, .. }
            | ContainerError::Shutdown { type_name, .. }
            | ContainerError::Predicate { type_name, .. }
            | ContainerError::Boot { type_name, .. }
            | ContainerError::InvalidScope { type_name, .. } => Some(type_name),
            ContainerError::TypeMismatch { expected, .. } => Some(expected),
            ContainerError::CircularDependency { key } => Some(key),
            ContainerError::MissingContextValue { .. } => None,
        }
    }

    pub(crate) fn missing_request_id() -> Self {
        ContainerError::MissingContextValue {
            key: super::context::REQUEST_ID_KEY.to_string(),
        }
    }
}
