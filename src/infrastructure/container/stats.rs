//! 容器统计信息

use std::sync::atomic::{AtomicU64, Ordering};

/// 内部容器统计信息（原子计数器）
#[derive(Default)]
pub(crate) struct InnerStats {
    pub(crate) bindings_registered: AtomicU64,
    pub(crate) transient_resolutions: AtomicU64,
    pub(crate) request_resolutions: AtomicU64,
    pub(crate) singleton_resolutions: AtomicU64,
    pub(crate) cache_hits: AtomicU64,
    pub(crate) boot_hooks: AtomicU64,
    pub(crate) shutdown_hooks: AtomicU64,
    pub(crate) circular_dependencies: AtomicU64,
    pub(crate) failures: AtomicU64,
}

impl InnerStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, active_bindings: usize) -> ContainerStats {
        ContainerStats {
            bindings_registered: self.bindings_registered.load(Ordering::Relaxed),
            active_bindings,
            transient_resolutions: self.transient_resolutions.load(Ordering::Relaxed),
            request_resolutions: self.request_resolutions.load(Ordering::Relaxed),
            singleton_resolutions: self.singleton_resolutions.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            boot_hooks: self.boot_hooks.load(Ordering::Relaxed),
            shutdown_hooks: self.shutdown_hooks.load(Ordering::Relaxed),
            circular_dependencies: self.circular_dependencies.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStats {
    /// 累计绑定次数（含覆盖）
    pub bindings_registered: u64,
    /// 当前绑定表大小
    pub active_bindings: usize,
    /// 瞬态解析次数
    pub transient_resolutions: u64,
    /// 请求作用域解析次数
    pub request_resolutions: u64,
    /// 单例解析次数
    pub singleton_resolutions: u64,
    /// 直接返回已初始化实例的次数
    pub cache_hits: u64,
    /// `on_boot` 调用次数
    pub boot_hooks: u64,
    /// `on_shutdown` 调用次数
    pub shutdown_hooks: u64,
    /// 检测到的循环依赖次数
    pub circular_dependencies: u64,
    /// 失败的解析、启动与关闭次数
    pub failures: u64,
}

impl ContainerStats {
    /// 总解析次数
    pub fn total_resolutions(&self) -> u64 {
        self.transient_resolutions + self.request_resolutions + self.singleton_resolutions
    }

    /// 缓存命中率（小数形式）
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_resolutions();
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// 性能指标摘要
    pub fn summary(&self) -> String {
        format!(
            "Container: {} bindings, {} resolutions ({:.1}% cached), {} boots, {} shutdowns, {} failures",
            self.active_bindings,
            self.total_resolutions(),
            self.hit_rate() * 100.0,
            self.boot_hooks,
            self.shutdown_hooks,
            self.failures
        )
    }
}
