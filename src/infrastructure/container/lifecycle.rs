//! 生命周期能力与类型擦除的服务实例

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use super::context::ContainerContext;
use super::error::{BoxError, ContainerError};

/// 所有可注册服务必须实现的生命周期能力
pub trait Lifecycle: Send + Sync {
    /// 服务初始化时调用
    fn on_boot(&self, ctx: &ContainerContext) -> Result<(), BoxError>;

    /// 服务终止时调用，应释放持有的资源
    fn on_shutdown(&self, ctx: &ContainerContext) -> Result<(), BoxError>;
}

/// 类型擦除的服务，内部持有 `Arc<T>`
trait ErasedService: Send + Sync {
    fn on_boot(&self, ctx: &ContainerContext) -> Result<(), BoxError>;
    fn on_shutdown(&self, ctx: &ContainerContext) -> Result<(), BoxError>;
    /// 返回 `&Arc<T>`，供解析时向下转型
    fn as_any(&self) -> &(dyn Any + Send + Sync);
    fn capability_id(&self) -> TypeId;
    fn capability_name(&self) -> &'static str;
    fn data_ptr(&self) -> *const ();
}

struct Handle<T: ?Sized> {
    service: Arc<T>,
}

impl<T> ErasedService for Handle<T>
where
    T: Lifecycle + ?Sized + 'static,
{
    fn on_boot(&self, ctx: &ContainerContext) -> Result<(), BoxError> {
        self.service.on_boot(ctx)
    }

    fn on_shutdown(&self, ctx: &ContainerContext) -> Result<(), BoxError> {
        self.service.on_shutdown(ctx)
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        &self.service
    }

    fn capability_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn capability_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn data_ptr(&self) -> *const () {
        Arc::as_ptr(&self.service) as *const ()
    }
}

/// 绑定或谓词产出的服务实例
///
/// 克隆只增加引用计数，底层对象始终是同一个。
#[derive(Clone)]
pub struct ServiceInstance {
    inner: Arc<dyn ErasedService>,
}

impl ServiceInstance {
    /// 以能力类型 `T` 包装一个实现
    pub fn new<T>(service: Arc<T>) -> Self
    where
        T: Lifecycle + ?Sized + 'static,
    {
        Self {
            inner: Arc::new(Handle { service }),
        }
    }

    /// 尝试取回 `Arc<T>`，能力类型不符时返回 `None`
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + 'static,
    {
        self.inner.as_any().downcast_ref::<Arc<T>>().cloned()
    }

    /// 实例是否以能力类型 `T` 包装
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.inner.capability_id() == TypeId::of::<T>()
    }

    pub(crate) fn is_capability(&self, type_id: TypeId) -> bool {
        self.inner.capability_id() == type_id
    }

    /// 包装时使用的能力类型名
    pub fn type_name(&self) -> &'static str {
        self.inner.capability_name()
    }

    /// 两个实例是否指向同一底层对象
    pub fn same_object(&self, other: &ServiceInstance) -> bool {
        self.inner.data_ptr() == other.inner.data_ptr()
    }

    pub(crate) fn boot(&self, ctx: &ContainerContext) -> Result<(), BoxError> {
        self.inner.on_boot(ctx)
    }

    pub(crate) fn shutdown(&self, ctx: &ContainerContext) -> Result<(), BoxError> {
        self.inner.on_shutdown(ctx)
    }

    /// 转成 `Arc<T>`，失败时给出类型不匹配错误
    pub(crate) fn typed<T: ?Sized + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            got: self.type_name().to_string(),
        })
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("type", &self.type_name())
            .finish()
    }
}

/// 条件绑定谓词：根据绑定上下文选择实例
pub type ContextPredicate =
    Arc<dyn Fn(&ContainerContext) -> Result<ServiceInstance, BoxError> + Send + Sync>;

/// 由闭包构造谓词
pub fn predicate<F>(f: F) -> ContextPredicate
where
    F: Fn(&ContainerContext) -> Result<ServiceInstance, BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Counter: Lifecycle {
        fn boots(&self) -> usize;
    }

    trait Other: Lifecycle {}

    #[derive(Default)]
    struct CountingService {
        boots: AtomicUsize,
    }

    impl Lifecycle for CountingService {
        fn on_boot(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
            self.boots.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_shutdown(&self, _ctx: &ContainerContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    impl Counter for CountingService {
        fn boots(&self) -> usize {
            self.boots.load(Ordering::SeqCst)
        }
    }

    impl Other for CountingService {}

    #[test]
    fn test_downcast_to_capability() {
        let service: Arc<dyn Counter> = Arc::new(CountingService::default());
        let instance = ServiceInstance::new(service.clone());

        instance.boot(&ContainerContext::background()).unwrap();
        let resolved = instance.downcast::<dyn Counter>().unwrap();

        assert!(Arc::ptr_eq(&resolved, &service));
        assert_eq!(resolved.boots(), 1);
        assert!(instance.is::<dyn Counter>());
    }

    #[test]
    fn test_wrong_capability_is_type_mismatch() {
        let service: Arc<dyn Counter> = Arc::new(CountingService::default());
        let instance = ServiceInstance::new(service);

        assert!(instance.downcast::<dyn Other>().is_none());
        let err = instance.typed::<dyn Other>().err().unwrap();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_same_object() {
        let concrete = Arc::new(CountingService::default());
        let as_counter: Arc<dyn Counter> = concrete.clone();
        let as_other: Arc<dyn Other> = concrete;

        let a = ServiceInstance::new(as_counter);
        let b = ServiceInstance::new(as_other);
        assert!(a.same_object(&b));
        assert!(a.same_object(&a.clone()));
    }
}
