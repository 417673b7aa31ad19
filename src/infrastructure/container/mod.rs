//! 依赖注入容器
//!
//! 按 (作用域, 能力类型) 注册服务实现，并按作用域语义解析：
//! - 瞬态：每次解析都重新执行 shutdown→boot 生命周期
//! - 请求作用域：绑定上下文必须携带 `request_id`，首次解析后缓存
//! - 单例：只启动一次
//!
//! 本模块的自由函数作用于进程级容器 [`Container::global`]。

pub mod binding;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod stats;
pub mod tracker;

use std::fmt;
use std::sync::Arc;

pub use binding::BindingKey;
pub use context::{Background, ContainerContext, ContextValue, ParentContext, StaticValues, REQUEST_ID_KEY};
pub use error::{BoxError, ContainerError, ContainerErrorKind};
pub use lifecycle::{predicate, ContextPredicate, Lifecycle, ServiceInstance};
pub use registry::Container;
pub use stats::ContainerStats;
pub use tracker::{ResolutionGuard, ResolutionTracker};

/// 服务作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// 每次解析都重新启动
    Transient,
    /// 在一个请求内共享
    Request,
    /// 整个进程生命周期内唯一
    Singleton,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Transient => "transient",
            Scope::Request => "request",
            Scope::Singleton => "singleton",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn bind_transient<T>(
    service: Option<Arc<T>>,
    ctx: Option<ContainerContext>,
    predicate: Option<ContextPredicate>,
) -> Result<(), ContainerError>
where
    T: Lifecycle + ?Sized + 'static,
{
    Container::global().bind_transient(service, ctx, predicate)
}

pub fn bind_request<T>(
    service: Option<Arc<T>>,
    ctx: Option<ContainerContext>,
    predicate: Option<ContextPredicate>,
) -> Result<(), ContainerError>
where
    T: Lifecycle + ?Sized + 'static,
{
    Container::global().bind_request(service, ctx, predicate)
}

pub fn bind_singleton<T>(service: Option<Arc<T>>, ctx: Option<ContainerContext>) -> Result<(), ContainerError>
where
    T: Lifecycle + ?Sized + 'static,
{
    Container::global().bind_singleton(service, ctx)
}

pub fn resolve_transient<T: ?Sized + 'static>() -> Result<Arc<T>, ContainerError> {
    Container::global().resolve_transient::<T>()
}

pub fn resolve_request<T: ?Sized + 'static>() -> Result<Arc<T>, ContainerError> {
    Container::global().resolve_request::<T>()
}

pub fn resolve_singleton<T: ?Sized + 'static>() -> Result<Arc<T>, ContainerError> {
    Container::global().resolve_singleton::<T>()
}

pub fn boot() -> Result<(), ContainerError> {
    Container::global().boot()
}

pub fn shutdown(clear_singletons: bool) -> Result<(), ContainerError> {
    Container::global().shutdown(clear_singletons)
}

/// 清空进程级容器（测试用）
pub fn reset() {
    Container::global().reset()
}
