//! 绑定注册表
//!
//! 持有绑定表，实现绑定、三种作用域的解析、批量启动与关闭。
//!
//! 并发约定：
//! - 绑定表由一把读写锁保护；解析与启动时生命周期钩子在锁外执行。
//! - 两个并发的瞬态解析可能同时看到"未初始化"并各自启动，这是允许的竞争。
//!   请求作用域与单例在启动后持写锁复查，只缓存一次，但钩子本身在争用下
//!   仍可能执行多次。
//! - 关闭在整个过程中持有写锁，包括执行钩子。

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

use super::binding::{Binding, BindingKey, BindingSource};
use super::context::{ContainerContext, REQUEST_ID_KEY};
use super::error::ContainerError;
use super::lifecycle::{ContextPredicate, Lifecycle, ServiceInstance};
use super::stats::{ContainerStats, InnerStats};
use super::tracker::{ResolutionGuard, ResolutionTracker};
use super::Scope;
use crate::config::ContainerConfig;
use crate::logging::OperationTimer;

static GLOBAL: OnceLock<Container> = OnceLock::new();

pub(crate) struct ContainerInner {
    bindings: RwLock<HashMap<BindingKey, Binding>>,
    base: ContainerContext,
    tracker: ResolutionTracker,
    /// 串行化并发的 boot()
    boot_lock: Mutex<()>,
    booted: AtomicBool,
    /// 每次清空状态时递增，防止进行中的 boot() 把已清空的容器标记为已启动
    epoch: AtomicU64,
    generation: AtomicU64,
    stats: InnerStats,
}

/// 依赖注入容器
///
/// 克隆只复制句柄，所有克隆共享同一张绑定表。
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// 使用默认配置创建独立的容器
    pub fn new() -> Self {
        Self::with_config(&ContainerConfig::default())
    }

    /// 按配置创建容器；`base_values` 写入基础上下文
    pub fn with_config(config: &ContainerConfig) -> Self {
        let base = config
            .base_values
            .iter()
            .fold(ContainerContext::background(), |ctx, (key, value)| {
                ctx.with_value(key.clone(), value.clone())
            });
        Self::build(base, config.initial_capacity, config.tracker_pool_capacity)
    }

    /// 以给定基础上下文创建容器
    pub fn with_base_context(base: ContainerContext) -> Self {
        let config = ContainerConfig::default();
        Self::build(base, config.initial_capacity, config.tracker_pool_capacity)
    }

    fn build(base: ContainerContext, capacity: usize, pool_capacity: usize) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                bindings: RwLock::new(HashMap::with_capacity(capacity)),
                base,
                tracker: ResolutionTracker::new(pool_capacity),
                boot_lock: Mutex::new(()),
                booted: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                stats: InnerStats::default(),
            }),
        }
    }

    /// 进程级容器，首次访问时创建
    pub fn global() -> &'static Container {
        GLOBAL.get_or_init(Container::new)
    }

    pub(crate) fn from_inner(inner: Arc<ContainerInner>) -> Self {
        Self { inner }
    }

    /// 注册瞬态服务：每次解析都会重新执行 shutdown→boot
    pub fn bind_transient<T>(
        &self,
        service: Option<Arc<T>>,
        ctx: Option<ContainerContext>,
        predicate: Option<ContextPredicate>,
    ) -> Result<(), ContainerError>
    where
        T: Lifecycle + ?Sized + 'static,
    {
        self.bind(service, Scope::Transient, ctx, predicate)
    }

    /// 注册请求作用域服务：绑定上下文必须携带 `request_id`
    pub fn bind_request<T>(
        &self,
        service: Option<Arc<T>>,
        ctx: Option<ContainerContext>,
        predicate: Option<ContextPredicate>,
    ) -> Result<(), ContainerError>
    where
        T: Lifecycle + ?Sized + 'static,
    {
        self.bind(service, Scope::Request, ctx, predicate)
    }

    /// 注册单例服务
    pub fn bind_singleton<T>(
        &self,
        service: Option<Arc<T>>,
        ctx: Option<ContainerContext>,
    ) -> Result<(), ContainerError>
    where
        T: Lifecycle + ?Sized + 'static,
    {
        self.bind(service, Scope::Singleton, ctx, None)
    }

    /// 注册绑定；同一 (作用域, 类型) 的旧绑定被直接替换
    pub fn bind<T>(
        &self,
        service: Option<Arc<T>>,
        scope: Scope,
        ctx: Option<ContainerContext>,
        predicate: Option<ContextPredicate>,
    ) -> Result<(), ContainerError>
    where
        T: Lifecycle + ?Sized + 'static,
    {
        let key = BindingKey::of::<T>(scope);
        let service = service.ok_or_else(|| ContainerError::NilService {
            type_name: key.type_name().to_string(),
        })?;

        // 未提供上下文时直接使用基础上下文；否则绑定时的值优先
        let context = match ctx {
            None => self.inner.base.clone(),
            Some(ctx) => ctx.layered_over(&self.inner.base),
        };

        let source = match predicate {
            Some(predicate) => BindingSource::Predicate(predicate),
            None => BindingSource::Direct,
        };

        let binding = Binding {
            key,
            instance: ServiceInstance::new(service),
            initialized: false,
            context,
            source,
            generation: self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1,
        };
        let conditional = binding.predicate().is_some();

        let replaced = self.inner.bindings.write().insert(key, binding).is_some();
        InnerStats::incr(&self.inner.stats.bindings_registered);

        tracing::debug!(
            scope = %scope,
            service = key.type_name(),
            conditional,
            replaced,
            "Service bound"
        );
        Ok(())
    }

    /// 解析瞬态服务
    ///
    /// 同一个实现对象被复用，但每次解析都会重新触发其生命周期：
    /// 已初始化时先调用 `on_shutdown`，再调用 `on_boot`。
    pub fn resolve_transient<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + 'static,
    {
        InnerStats::incr(&self.inner.stats.transient_resolutions);
        let result = self.resolve_transient_inner::<T>();
        self.record(BindingKey::of::<T>(Scope::Transient), result)
    }

    fn resolve_transient_inner<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + 'static,
    {
        let key = BindingKey::of::<T>(Scope::Transient);
        let _guard = self.start_resolving(key)?;
        let mut binding = self.lookup(&key)?;
        let ctx = self.hook_context(&binding);

        if binding.initialized {
            InnerStats::incr(&self.inner.stats.shutdown_hooks);
            binding
                .instance
                .shutdown(&ctx)
                .map_err(|source| ContainerError::Shutdown {
                    type_name: key.type_name().to_string(),
                    source,
                })?;
            binding.initialized = false;
            self.write_back(&binding, None, false);
        }

        let instance = self.select(&binding, &ctx)?;
        let typed = instance.typed::<T>()?;
        self.run_boot(&binding, &instance, &ctx)?;
        self.write_back(&binding, Some(instance), true);

        Ok(typed)
    }

    /// 解析请求作用域服务
    ///
    /// 已初始化时直接返回现有实例，不再触发钩子。
    pub fn resolve_request<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + 'static,
    {
        InnerStats::incr(&self.inner.stats.request_resolutions);
        let result = self.resolve_request_inner::<T>();
        self.record(BindingKey::of::<T>(Scope::Request), result)
    }

    fn resolve_request_inner<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + 'static,
    {
        let key = BindingKey::of::<T>(Scope::Request);
        let _guard = self.start_resolving(key)?;
        let binding = self.lookup(&key)?;

        if !binding.context.contains(REQUEST_ID_KEY) {
            return Err(ContainerError::missing_request_id());
        }

        if binding.initialized {
            InnerStats::incr(&self.inner.stats.cache_hits);
            return binding.instance.typed::<T>();
        }

        let ctx = self.hook_context(&binding);
        let instance = self.select(&binding, &ctx)?;
        instance.typed::<T>()?;
        self.run_boot(&binding, &instance, &ctx)?;
        self.commit_boot(&binding, instance).typed::<T>()
    }

    /// 解析单例服务：只启动一次并缓存
    pub fn resolve_singleton<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + 'static,
    {
        InnerStats::incr(&self.inner.stats.singleton_resolutions);
        let result = self.resolve_singleton_inner::<T>();
        self.record(BindingKey::of::<T>(Scope::Singleton), result)
    }

    fn resolve_singleton_inner<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + 'static,
    {
        let key = BindingKey::of::<T>(Scope::Singleton);
        let binding = self.lookup(&key)?;
        let _guard = self.start_resolving(key)?;

        if binding.initialized {
            InnerStats::incr(&self.inner.stats.cache_hits);
            return binding.instance.typed::<T>();
        }

        let ctx = self.hook_context(&binding);
        let instance = self.select(&binding, &ctx)?;
        instance.typed::<T>()?;
        self.run_boot(&binding, &instance, &ctx)?;
        self.commit_boot(&binding, instance).typed::<T>()
    }

    /// 启动所有未初始化的单例与请求作用域服务
    ///
    /// 成功后再次调用不做任何事；失败时返回第一个错误，之后可以重试。
    /// 瞬态服务不在此处启动。
    pub fn boot(&self) -> Result<(), ContainerError> {
        let _serial = self.inner.boot_lock.lock();
        if self.inner.booted.load(Ordering::Acquire) {
            return Ok(());
        }

        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let timer = OperationTimer::new("container.boot");

        let mut pending: Vec<Binding> = self
            .inner
            .bindings
            .read()
            .values()
            .filter(|b| !b.initialized && matches!(b.scope(), Scope::Singleton | Scope::Request))
            .cloned()
            .collect();
        // 按注册顺序启动
        pending.sort_by_key(|b| b.generation);

        let count = pending.len();
        for binding in pending {
            // 前面的启动钩子可能已经解析过它
            if self.is_committed(&binding) {
                continue;
            }
            if let Err(err) = self.boot_binding(&binding) {
                InnerStats::incr(&self.inner.stats.failures);
                tracing::warn!(service = binding.type_name(), error = %err, "Container boot aborted");
                return Err(err);
            }
        }

        if self.inner.epoch.load(Ordering::Acquire) == epoch {
            self.inner.booted.store(true, Ordering::Release);
        }

        tracing::info!(services = count, "Container booted");
        timer.finish();
        Ok(())
    }

    fn boot_binding(&self, binding: &Binding) -> Result<(), ContainerError> {
        let _guard = self.start_resolving(binding.key)?;
        let ctx = self.hook_context(binding);
        let instance = self.select(binding, &ctx)?;
        self.run_boot(binding, &instance, &ctx)?;
        self.commit_boot(binding, instance);
        Ok(())
    }

    /// 关闭服务
    ///
    /// 对所有非单例绑定调用 `on_shutdown`，`clear_singletons` 为真时单例也包括在内。
    /// 任一钩子失败立即返回，此前已关闭的服务不会回滚。
    /// 清空单例时整张绑定表、启动状态与解析链一并清除；否则只移除非单例绑定。
    ///
    /// 钩子执行期间持有绑定表写锁，`on_shutdown` 中不能再访问容器。
    pub fn shutdown(&self, clear_singletons: bool) -> Result<(), ContainerError> {
        let timer = OperationTimer::new("container.shutdown")
            .with_metadata("clear_singletons", if clear_singletons { "true" } else { "false" });
        let mut bindings = self.inner.bindings.write();

        let mut targets: Vec<&Binding> = bindings
            .values()
            .filter(|b| b.scope() != Scope::Singleton || clear_singletons)
            .collect();
        // 按注册的逆序关闭
        targets.sort_by_key(|b| Reverse(b.generation));

        let count = targets.len();
        for binding in targets {
            InnerStats::incr(&self.inner.stats.shutdown_hooks);
            let ctx = self.hook_context(binding);
            if let Err(source) = binding.instance.shutdown(&ctx) {
                InnerStats::incr(&self.inner.stats.failures);
                tracing::warn!(service = binding.type_name(), error = %source, "Service shutdown failed");
                return Err(ContainerError::Shutdown {
                    type_name: binding.type_name().to_string(),
                    source,
                });
            }
        }

        if clear_singletons {
            bindings.clear();
            self.clear_state();
        } else {
            bindings.retain(|_, b| b.scope() == Scope::Singleton);
        }
        drop(bindings);

        tracing::info!(services = count, clear_singletons, "Container shut down");
        timer.finish();
        Ok(())
    }

    /// 无条件清空绑定表、解析链与启动状态，用于测试之间隔离
    pub fn reset(&self) {
        let mut bindings = self.inner.bindings.write();
        bindings.clear();
        self.clear_state();
        drop(bindings);
        tracing::debug!("Container reset");
    }

    /// 给定作用域下是否已绑定 `T`
    pub fn is_bound<T: ?Sized + 'static>(&self, scope: Scope) -> bool {
        self.inner
            .bindings
            .read()
            .contains_key(&BindingKey::of::<T>(scope))
    }

    /// 绑定是否已初始化；未绑定时返回 `None`
    pub fn is_initialized<T: ?Sized + 'static>(&self, scope: Scope) -> Option<bool> {
        self.inner
            .bindings
            .read()
            .get(&BindingKey::of::<T>(scope))
            .map(|b| b.initialized)
    }

    /// 当前绑定数量
    pub fn binding_count(&self) -> usize {
        self.inner.bindings.read().len()
    }

    /// boot() 是否已成功完成
    pub fn is_booted(&self) -> bool {
        self.inner.booted.load(Ordering::Acquire)
    }

    /// 未提供上下文的绑定所使用的基础上下文
    pub fn base_context(&self) -> &ContainerContext {
        &self.inner.base
    }

    /// 统计信息快照
    pub fn stats(&self) -> ContainerStats {
        self.inner.stats.snapshot(self.binding_count())
    }

    fn start_resolving(&self, key: BindingKey) -> Result<ResolutionGuard<'_>, ContainerError> {
        self.inner.tracker.start_resolving(key).map_err(|err| {
            InnerStats::incr(&self.inner.stats.circular_dependencies);
            err
        })
    }

    fn lookup(&self, key: &BindingKey) -> Result<Binding, ContainerError> {
        self.inner
            .bindings
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ContainerError::BindingNotFound {
                type_name: key.type_name().to_string(),
            })
    }

    fn hook_context(&self, binding: &Binding) -> ContainerContext {
        binding.context.attached_to(&self.inner)
    }

    /// 选出要启动的实例：有谓词时由谓词决定，并校验其能力类型
    fn select(&self, binding: &Binding, ctx: &ContainerContext) -> Result<ServiceInstance, ContainerError> {
        let Some(predicate) = binding.predicate() else {
            return Ok(binding.instance.clone());
        };

        let instance = predicate(ctx).map_err(|source| ContainerError::Predicate {
            type_name: binding.type_name().to_string(),
            source,
        })?;

        if !instance.is_capability(binding.key.type_id()) {
            return Err(ContainerError::Predicate {
                type_name: binding.type_name().to_string(),
                source: format!(
                    "predicate returned invalid type {} (expected {})",
                    instance.type_name(),
                    binding.type_name()
                )
                .into(),
            });
        }
        Ok(instance)
    }

    fn run_boot(
        &self,
        binding: &Binding,
        instance: &ServiceInstance,
        ctx: &ContainerContext,
    ) -> Result<(), ContainerError> {
        InnerStats::incr(&self.inner.stats.boot_hooks);
        instance.boot(ctx).map_err(|source| {
            // 钩子内部解析触发的循环依赖原样向上传递
            match source.downcast::<ContainerError>() {
                Ok(err) if matches!(*err, ContainerError::CircularDependency { .. }) => *err,
                Ok(err) => ContainerError::Initialization {
                    type_name: binding.type_name().to_string(),
                    source: err,
                },
                Err(source) => ContainerError::Initialization {
                    type_name: binding.type_name().to_string(),
                    source,
                },
            }
        })
    }

    /// 表中同一代的绑定是否已初始化
    fn is_committed(&self, binding: &Binding) -> bool {
        self.inner
            .bindings
            .read()
            .get(&binding.key)
            .map_or(false, |current| {
                current.generation == binding.generation && current.initialized
            })
    }

    /// 回写初始化状态；绑定已被替换或移除时什么也不做
    fn write_back(&self, booted: &Binding, instance: Option<ServiceInstance>, initialized: bool) {
        let mut bindings = self.inner.bindings.write();
        if let Some(current) = bindings.get_mut(&booted.key) {
            if current.generation == booted.generation {
                current.initialized = initialized;
                if let Some(instance) = instance {
                    current.instance = instance;
                }
            }
        }
    }

    /// 启动后持写锁复查：其他调用者已先完成初始化时返回其缓存的实例
    fn commit_boot(&self, booted: &Binding, instance: ServiceInstance) -> ServiceInstance {
        let mut bindings = self.inner.bindings.write();
        match bindings.get_mut(&booted.key) {
            Some(current) if current.generation == booted.generation => {
                if current.initialized {
                    return current.instance.clone();
                }
                current.initialized = true;
                current.instance = instance.clone();
                instance
            }
            // 绑定在启动期间被替换或清除，不把旧实例写回表中
            _ => instance,
        }
    }

    fn clear_state(&self) {
        self.inner.tracker.clear();
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.inner.booted.store(false, Ordering::Release);
    }

    fn record<T>(&self, key: BindingKey, result: Result<T, ContainerError>) -> Result<T, ContainerError> {
        match &result {
            Ok(_) => tracing::debug!(key = %key, "Service resolved"),
            Err(err) => {
                InnerStats::incr(&self.inner.stats.failures);
                tracing::debug!(key = %key, error = %err, "Service resolution failed");
            }
        }
        result
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.binding_count())
            .field("booted", &self.is_booted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::container::error::BoxError;
    use std::sync::atomic::AtomicUsize;

    trait Greeter: Lifecycle {
        fn greet(&self) -> String;
    }

    #[derive(Default)]
    struct EnglishGreeter {
        boots: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    impl Lifecycle for EnglishGreeter {
        fn on_boot(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
            self.boots.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Greeter for EnglishGreeter {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_bind_without_context_uses_base() {
        let base = ContainerContext::background().with_value("env", "test".to_string());
        let container = Container::with_base_context(base);
        let greeter: Arc<dyn Greeter> = Arc::new(EnglishGreeter::default());

        container.bind_singleton(Some(greeter), None).unwrap();

        let key = BindingKey::of::<dyn Greeter>(Scope::Singleton);
        let binding = container.lookup(&key).unwrap();
        assert_eq!(binding.context.get::<String>("env").as_deref().map(String::as_str), Some("test"));
    }

    #[test]
    fn test_bind_time_values_win_over_base() {
        let base = ContainerContext::background()
            .with_value("env", "prod".to_string())
            .with_value("region", "eu".to_string());
        let container = Container::with_base_context(base);
        let greeter: Arc<dyn Greeter> = Arc::new(EnglishGreeter::default());
        let ctx = ContainerContext::background().with_value("env", "test".to_string());

        container.bind_transient(Some(greeter), Some(ctx), None).unwrap();

        let binding = container
            .lookup(&BindingKey::of::<dyn Greeter>(Scope::Transient))
            .unwrap();
        assert_eq!(binding.context.get::<String>("env").as_deref().map(String::as_str), Some("test"));
        assert_eq!(binding.context.get::<String>("region").as_deref().map(String::as_str), Some("eu"));
    }

    #[test]
    fn test_rebind_bumps_generation() {
        let container = Container::new();
        let first: Arc<dyn Greeter> = Arc::new(EnglishGreeter::default());
        let second: Arc<dyn Greeter> = Arc::new(EnglishGreeter::default());
        let key = BindingKey::of::<dyn Greeter>(Scope::Singleton);

        container.bind_singleton(Some(first), None).unwrap();
        let g1 = container.lookup(&key).unwrap().generation;
        container.bind_singleton(Some(second), None).unwrap();
        let g2 = container.lookup(&key).unwrap().generation;

        assert!(g2 > g1);
        assert_eq!(container.binding_count(), 1);
    }

    #[test]
    fn test_commit_ignores_replaced_binding() {
        let container = Container::new();
        let first: Arc<dyn Greeter> = Arc::new(EnglishGreeter::default());
        let second: Arc<dyn Greeter> = Arc::new(EnglishGreeter::default());
        let key = BindingKey::of::<dyn Greeter>(Scope::Singleton);

        container.bind_singleton(Some(first), None).unwrap();
        let stale = container.lookup(&key).unwrap();
        container.bind_singleton(Some(second), None).unwrap();

        container.commit_boot(&stale, stale.instance.clone());
        assert_eq!(container.is_initialized::<dyn Greeter>(Scope::Singleton), Some(false));
    }

    #[test]
    fn test_hook_context_carries_container() {
        let container = Container::new();
        let greeter: Arc<dyn Greeter> = Arc::new(EnglishGreeter::default());
        container.bind_singleton(Some(greeter), None).unwrap();

        let binding = container
            .lookup(&BindingKey::of::<dyn Greeter>(Scope::Singleton))
            .unwrap();
        let ctx = container.hook_context(&binding);
        let attached = ctx.container().unwrap();
        assert!(attached.is_bound::<dyn Greeter>(Scope::Singleton));
    }

    #[test]
    fn test_resolve_singleton_greets() {
        let container = Container::new();
        let greeter: Arc<dyn Greeter> = Arc::new(EnglishGreeter::default());
        container.bind_singleton(Some(greeter), None).unwrap();

        let resolved = container.resolve_singleton::<dyn Greeter>().unwrap();
        assert_eq!(resolved.greet(), "hello");
        assert_eq!(container.stats().boot_hooks, 1);
    }
}
