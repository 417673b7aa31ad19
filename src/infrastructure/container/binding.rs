//! 绑定记录与查找键

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::context::ContainerContext;
use super::lifecycle::{ContextPredicate, ServiceInstance};
use super::Scope;

/// 绑定查找键：由 (作用域, 能力类型) 确定
///
/// `TypeId` 在编译期确定，热路径上无需分配；文本形式只在诊断时生成。
#[derive(Clone, Copy)]
pub struct BindingKey {
    scope: Scope,
    type_id: TypeId,
    type_name: &'static str,
}

impl BindingKey {
    /// 能力类型 `T` 在给定作用域下的键
    pub fn of<T: ?Sized + 'static>(scope: Scope) -> Self {
        Self {
            scope,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl PartialEq for BindingKey {
    fn eq(&self, other: &Self) -> bool {
        self.scope == other.scope && self.type_id == other.type_id
    }
}

impl Eq for BindingKey {}

impl Hash for BindingKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scope.hash(state);
        self.type_id.hash(state);
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.type_name)
    }
}

impl fmt::Debug for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingKey({})", self)
    }
}

/// 实例来源：直接绑定或由谓词选择
#[derive(Clone)]
pub(crate) enum BindingSource {
    Direct,
    Predicate(ContextPredicate),
}

/// 绑定记录
#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) key: BindingKey,
    pub(crate) instance: ServiceInstance,
    pub(crate) initialized: bool,
    pub(crate) context: ContainerContext,
    pub(crate) source: BindingSource,
    /// 绑定代次，启动后回写时用于确认绑定未被替换
    pub(crate) generation: u64,
}

impl Binding {
    pub(crate) fn scope(&self) -> Scope {
        self.key.scope
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.key.type_name
    }

    pub(crate) fn predicate(&self) -> Option<&ContextPredicate> {
        match &self.source {
            BindingSource::Direct => None,
            BindingSource::Predicate(predicate) => Some(predicate),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("instance", &self.instance)
            .field("initialized", &self.initialized)
            .field("conditional", &self.predicate().is_some())
            .field("generation", &self.generation)
            .finish()
    }
}
