//! 容器上下文
//!
//! 不可变的键值载体：包装一个外部父上下文，支持写时复制的覆盖与双向合并。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use super::registry::{Container, ContainerInner};

/// 上下文中存放的值
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// 请求作用域解析所必需的上下文键
pub const REQUEST_ID_KEY: &str = "request_id";

/// 外部父上下文能力：只需要按键查值
pub trait ParentContext: Send + Sync {
    /// 查找键对应的值，未找到返回 `None`
    fn value(&self, key: &str) -> Option<ContextValue>;
}

/// 空的根上下文
#[derive(Debug, Clone, Copy, Default)]
pub struct Background;

impl ParentContext for Background {
    fn value(&self, _key: &str) -> Option<ContextValue> {
        None
    }
}

/// 由固定键值对构成的父上下文
#[derive(Clone, Default)]
pub struct StaticValues {
    values: HashMap<String, ContextValue>,
}

impl StaticValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个键值对
    pub fn with<V: Any + Send + Sync>(mut self, key: impl Into<String>, value: V) -> Self {
        self.values.insert(key.into(), Arc::new(value));
        self
    }
}

impl ParentContext for StaticValues {
    fn value(&self, key: &str) -> Option<ContextValue> {
        self.values.get(key).cloned()
    }
}

/// 容器上下文
///
/// 发布后的节点永不修改：`with_value` 与 `merge_with` 都返回新节点，
/// 因此可在线程间自由共享读取。
#[derive(Clone)]
pub struct ContainerContext {
    parent: Option<Arc<dyn ParentContext>>,
    values: Arc<HashMap<String, ContextValue>>,
    container: Option<Weak<ContainerInner>>,
}

impl ContainerContext {
    /// 包装一个父上下文，缺省时视为空根
    pub fn new(parent: Option<Arc<dyn ParentContext>>) -> Self {
        Self {
            parent,
            values: Arc::new(HashMap::new()),
            container: None,
        }
    }

    /// 空根上下文
    pub fn background() -> Self {
        Self::new(None)
    }

    /// 以另一个容器上下文作为父节点
    pub fn child_of(parent: &ContainerContext) -> Self {
        Self::new(Some(Arc::new(parent.clone())))
    }

    /// 返回携带新键值对的副本
    pub fn with_value<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) -> Self {
        self.with_shared_value(key, Arc::new(value))
    }

    /// 与 `with_value` 相同，但直接接收已共享的值
    pub fn with_shared_value(&self, key: impl Into<String>, value: ContextValue) -> Self {
        let mut values = HashMap::with_capacity(self.values.len() + 1);
        for (k, v) in self.values.iter() {
            values.insert(k.clone(), v.clone());
        }
        values.insert(key.into(), value);
        Self {
            parent: self.parent.clone(),
            values: Arc::new(values),
            container: self.container.clone(),
        }
    }

    /// 先查本地存储，再沿父链查找
    pub fn value(&self, key: &str) -> Option<ContextValue> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.value(key))
    }

    /// 带类型的取值，类型不符时返回 `None`
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.value(key).and_then(|value| value.downcast::<T>().ok())
    }

    /// 是否能解析到该键
    pub fn contains(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// 合并两个上下文的本地存储，冲突时 `other` 优先；父节点保持为接收者的父节点
    pub fn merge_with(&self, other: Option<&ContainerContext>) -> Self {
        let extra = other.map_or(0, |o| o.values.len());
        let mut values = HashMap::with_capacity(self.values.len() + extra);
        for (k, v) in self.values.iter() {
            values.insert(k.clone(), v.clone());
        }
        if let Some(other) = other {
            for (k, v) in other.values.iter() {
                values.insert(k.clone(), v.clone());
            }
        }
        Self {
            parent: self.parent.clone(),
            values: Arc::new(values),
            container: self.container.clone(),
        }
    }

    /// 把当前上下文叠加在基础上下文之上：本地值优先，父链保持不变
    pub(crate) fn layered_over(&self, base: &ContainerContext) -> Self {
        let mut values = HashMap::with_capacity(self.values.len() + base.values.len());
        for (k, v) in base.values.iter() {
            values.insert(k.clone(), v.clone());
        }
        for (k, v) in self.values.iter() {
            values.insert(k.clone(), v.clone());
        }
        Self {
            parent: self.parent.clone(),
            values: Arc::new(values),
            container: self.container.clone(),
        }
    }

    /// 父上下文
    pub fn parent(&self) -> Option<Arc<dyn ParentContext>> {
        self.parent.clone()
    }

    /// 本地存储的键（不含父链）
    pub fn local_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// 本地存储的键值对数量
    pub fn local_len(&self) -> usize {
        self.values.len()
    }

    /// 调用生命周期钩子的容器；只在钩子收到的上下文上可用
    pub fn container(&self) -> Option<Container> {
        self.container
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Container::from_inner)
    }

    pub(crate) fn attached_to(&self, inner: &Arc<ContainerInner>) -> Self {
        Self {
            parent: self.parent.clone(),
            values: self.values.clone(),
            container: Some(Arc::downgrade(inner)),
        }
    }
}

impl Default for ContainerContext {
    fn default() -> Self {
        Self::background()
    }
}

impl ParentContext for ContainerContext {
    fn value(&self, key: &str) -> Option<ContextValue> {
        ContainerContext::value(self, key)
    }
}

impl fmt::Debug for ContainerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerContext")
            .field("keys", &self.local_keys())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
