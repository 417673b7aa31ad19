//! 基础设施层
//!
//! 提供依赖注入容器及其上下文、生命周期与循环依赖检测。

// 容器实现
pub mod container;

// 重新导出API
pub use container::{Container, ContainerContext, ContainerError, Lifecycle, Scope};
