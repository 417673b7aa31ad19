//! 集成测试共享的模拟服务

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use scoped_container::{BoxError, Container, ContainerContext, Lifecycle, REQUEST_ID_KEY};

/// 从钩子上下文取回容器
pub fn container_of(ctx: &ContainerContext) -> Result<Container, BoxError> {
    ctx.container().ok_or_else(|| "hook context carries no container".into())
}

/// 两个 `Arc` 是否指向同一对象（忽略 vtable）
pub fn same<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// 记录钩子调用顺序
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

pub trait Database: Lifecycle {
    fn is_connected(&self) -> bool;
    fn request_id(&self) -> Option<String>;
    fn context_value(&self, key: &str) -> Option<String>;
    fn boots(&self) -> usize;
    fn shutdowns(&self) -> usize;
}

#[derive(Default)]
pub struct MockDb {
    pub name: String,
    connected: AtomicBool,
    request_id: Mutex<Option<String>>,
    ctx: Mutex<Option<ContainerContext>>,
    boots: AtomicUsize,
    shutdowns: AtomicUsize,
    fail_boot: AtomicBool,
    fail_shutdown: AtomicBool,
    log: Option<EventLog>,
}

impl MockDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn named(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Self::default()
        })
    }

    pub fn logged(name: &str, log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: Some(log.clone()),
            ..Self::default()
        })
    }

    pub fn failing_boot() -> Arc<Self> {
        let db = Self::new();
        db.fail_boot.store(true, Ordering::SeqCst);
        db
    }

    pub fn failing_shutdown() -> Arc<Self> {
        let db = Self::new();
        db.fail_shutdown.store(true, Ordering::SeqCst);
        db
    }

    pub fn set_fail_boot(&self, fail: bool) {
        self.fail_boot.store(fail, Ordering::SeqCst);
    }

    /// 最近一次 on_boot 收到的上下文是否仍能取回容器
    pub fn container_alive(&self) -> bool {
        self.ctx
            .lock()
            .as_ref()
            .map_or(false, |ctx| ctx.container().is_some())
    }
}

impl Lifecycle for MockDb {
    fn on_boot(&self, ctx: &ContainerContext) -> Result<(), BoxError> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        if self.fail_boot.load(Ordering::SeqCst) {
            return Err("simulated boot failure".into());
        }
        self.connected.store(true, Ordering::SeqCst);
        *self.request_id.lock() = ctx.get::<String>(REQUEST_ID_KEY).map(|id| id.as_ref().clone());
        *self.ctx.lock() = Some(ctx.clone());
        if let Some(log) = &self.log {
            log.push(format!("boot:{}", self.name));
        }
        Ok(())
    }

    fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown.load(Ordering::SeqCst) {
            return Err("simulated shutdown failure".into());
        }
        self.connected.store(false, Ordering::SeqCst);
        *self.ctx.lock() = None;
        if let Some(log) = &self.log {
            log.push(format!("shutdown:{}", self.name));
        }
        Ok(())
    }
}

impl Database for MockDb {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn request_id(&self) -> Option<String> {
        self.request_id.lock().clone()
    }

    fn context_value(&self, key: &str) -> Option<String> {
        self.ctx
            .lock()
            .as_ref()
            .and_then(|ctx| ctx.get::<String>(key))
            .map(|v| v.as_ref().clone())
    }

    fn boots(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

pub trait Cache: Lifecycle {
    fn has_database(&self) -> bool;
}

/// 启动时解析瞬态 `Database`
#[derive(Default)]
pub struct MockCache {
    db: Mutex<Option<Arc<dyn Database>>>,
    log: Option<EventLog>,
}

impl MockCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn logged(log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            db: Mutex::new(None),
            log: Some(log.clone()),
        })
    }
}

impl Lifecycle for MockCache {
    fn on_boot(&self, ctx: &ContainerContext) -> Result<(), BoxError> {
        if let Some(log) = &self.log {
            log.push("boot:cache");
            return Ok(());
        }
        let db = container_of(ctx)?.resolve_transient::<dyn Database>()?;
        *self.db.lock() = Some(db);
        Ok(())
    }

    fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        if let Some(log) = &self.log {
            log.push("shutdown:cache");
        }
        *self.db.lock() = None;
        Ok(())
    }
}

impl Cache for MockCache {
    fn has_database(&self) -> bool {
        self.db.lock().is_some()
    }
}

pub trait ServiceA: Lifecycle {}
pub trait ServiceB: Lifecycle {}

/// 启动时解析 `ServiceB`
#[derive(Default)]
pub struct CircularA;

/// 启动时解析 `ServiceA`
#[derive(Default)]
pub struct CircularB;

impl Lifecycle for CircularA {
    fn on_boot(&self, ctx: &ContainerContext) -> Result<(), BoxError> {
        container_of(ctx)?.resolve_transient::<dyn ServiceB>()?;
        Ok(())
    }

    fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        Ok(())
    }
}

impl ServiceA for CircularA {}

impl Lifecycle for CircularB {
    fn on_boot(&self, ctx: &ContainerContext) -> Result<(), BoxError> {
        container_of(ctx)?.resolve_transient::<dyn ServiceA>()?;
        Ok(())
    }

    fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        Ok(())
    }
}

impl ServiceB for CircularB {}

pub trait DeepService3: Lifecycle {
    fn value(&self) -> String;
}

pub trait DeepService2: Lifecycle {
    fn service3(&self) -> Option<Arc<dyn DeepService3>>;
}

pub trait DeepService1: Lifecycle {
    fn service2(&self) -> Option<Arc<dyn DeepService2>>;
}

#[derive(Default)]
pub struct DeepImpl3 {
    value: Mutex<String>,
}

impl Lifecycle for DeepImpl3 {
    fn on_boot(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        *self.value.lock() = "deep".to_string();
        Ok(())
    }

    fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        Ok(())
    }
}

impl DeepService3 for DeepImpl3 {
    fn value(&self) -> String {
        self.value.lock().clone()
    }
}

#[derive(Default)]
pub struct DeepImpl2 {
    svc3: Mutex<Option<Arc<dyn DeepService3>>>,
}

impl Lifecycle for DeepImpl2 {
    fn on_boot(&self, ctx: &ContainerContext) -> Result<(), BoxError> {
        let svc3 = container_of(ctx)?.resolve_transient::<dyn DeepService3>()?;
        *self.svc3.lock() = Some(svc3);
        Ok(())
    }

    fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        Ok(())
    }
}

impl DeepService2 for DeepImpl2 {
    fn service3(&self) -> Option<Arc<dyn DeepService3>> {
        self.svc3.lock().clone()
    }
}

#[derive(Default)]
pub struct DeepImpl1 {
    svc2: Mutex<Option<Arc<dyn DeepService2>>>,
}

impl Lifecycle for DeepImpl1 {
    fn on_boot(&self, ctx: &ContainerContext) -> Result<(), BoxError> {
        let svc2 = container_of(ctx)?.resolve_transient::<dyn DeepService2>()?;
        *self.svc2.lock() = Some(svc2);
        Ok(())
    }

    fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
        Ok(())
    }
}

impl DeepService1 for DeepImpl1 {
    fn service2(&self) -> Option<Arc<dyn DeepService2>> {
        self.svc2.lock().clone()
    }
}

/// 带 `request_id` 的绑定上下文
pub fn request_ctx(request_id: &str) -> ContainerContext {
    ContainerContext::background().with_value(REQUEST_ID_KEY, request_id.to_string())
}
