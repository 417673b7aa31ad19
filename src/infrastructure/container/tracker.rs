//! 解析链追踪（循环依赖检测）
//!
//! 每个调用线程维护一组正在解析的绑定键。状态存放在 `DashMap` 中，
//! 不同线程互不干扰；链清空后状态回收到复用池。

use std::collections::HashSet;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::binding::BindingKey;
use super::error::ContainerError;

thread_local! {
    static CALLER_ID: ThreadId = thread::current().id();
}

/// 当前调用线程的标识，每个线程只查询一次
fn caller_id() -> ThreadId {
    CALLER_ID.with(|id| *id)
}

/// 单个调用者的解析链
#[derive(Debug, Default)]
struct ResolutionState {
    chain: HashSet<BindingKey>,
}

impl ResolutionState {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            chain: HashSet::with_capacity(capacity),
        }
    }
}

/// 解析链追踪器
pub struct ResolutionTracker {
    states: DashMap<ThreadId, ResolutionState>,
    pool: Mutex<Vec<ResolutionState>>,
    pool_capacity: usize,
}

impl ResolutionTracker {
    pub fn new(pool_capacity: usize) -> Self {
        Self {
            states: DashMap::new(),
            pool: Mutex::new(Vec::with_capacity(pool_capacity)),
            pool_capacity,
        }
    }

    /// 标记 `key` 开始解析；当前调用链已在解析时返回循环依赖错误
    pub fn start_resolving(&self, key: BindingKey) -> Result<ResolutionGuard<'_>, ContainerError> {
        let id = caller_id();

        // 已有条目走快路径，只锁对应分片
        let existing = self.states.get_mut(&id).map(|mut state| state.chain.insert(key));
        let inserted = match existing {
            Some(inserted) => inserted,
            None => {
                let mut state = self.pool.lock().pop().unwrap_or_else(|| ResolutionState::with_capacity(8));
                let inserted = state.chain.insert(key);
                self.states.insert(id, state);
                inserted
            }
        };

        if !inserted {
            tracing::warn!(key = %key, "Circular dependency detected");
            return Err(ContainerError::CircularDependency {
                key: key.to_string(),
            });
        }

        Ok(ResolutionGuard { tracker: self, key })
    }

    /// 结束 `key` 的解析；链清空时回收状态
    pub fn finish_resolving(&self, key: &BindingKey) {
        let id = caller_id();

        // 状态可能已被 clear() 清理
        let drained = self
            .states
            .get_mut(&id)
            .map_or(false, |mut state| {
                state.chain.remove(key);
                state.chain.is_empty()
            });

        if drained {
            if let Some((_, state)) = self.states.remove_if(&id, |_, s| s.chain.is_empty()) {
                self.recycle(state);
            }
        }
    }

    /// 当前调用者是否正在解析 `key`
    pub fn is_resolving(&self, key: &BindingKey) -> bool {
        self.states
            .get(&caller_id())
            .map_or(false, |state| state.chain.contains(key))
    }

    /// 丢弃所有调用者的解析链
    pub fn clear(&self) {
        self.states.clear();
    }

    /// 存在未完成解析链的调用者数量
    pub fn active_chains(&self) -> usize {
        self.states.len()
    }

    /// 复用池中的空闲状态数量
    pub fn pooled(&self) -> usize {
        self.pool.lock().len()
    }

    fn recycle(&self, mut state: ResolutionState) {
        state.chain.clear();
        let mut pool = self.pool.lock();
        if pool.len() < self.pool_capacity {
            pool.push(state);
        }
    }
}

impl Default for ResolutionTracker {
    fn default() -> Self {
        Self::new(64)
    }
}

/// 解析守卫，离开作用域时结束解析
#[must_use = "dropping the guard immediately ends the resolution"]
pub struct ResolutionGuard<'a> {
    tracker: &'a ResolutionTracker,
    key: BindingKey,
}

impl ResolutionGuard<'_> {
    pub fn key(&self) -> BindingKey {
        self.key
    }
}

impl Drop for ResolutionGuard<'_> {
    fn drop(&mut self) {
        self.tracker.finish_resolving(&self.key);
    }
}
