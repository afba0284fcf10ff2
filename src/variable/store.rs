use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::Scope;
use crate::variable::types::VariableContext;

/// 可按名称查找变量的作用域
pub trait VariableLookup {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl VariableLookup for VariableContext {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).map(str::to_string)
    }
}

/// suite 级别的 shared 作用域
///
/// 同一 suite 的多个序列可能并发读写；同名变量的并发写入以最后一次为准。
#[derive(Debug, Default)]
pub struct SharedVariables {
    inner: Mutex<VariableContext>,
}

impl SharedVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: VariableContext) -> Self {
        Self {
            inner: Mutex::new(seed),
        }
    }

    // 写入者 panic 后 map 本身仍然完整，直接继续使用
    fn lock(&self) -> MutexGuard<'_, VariableContext> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).map(str::to_string)
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.lock().insert(name, value);
    }

    pub fn extend(&self, vars: impl IntoIterator<Item = (String, String)>) {
        self.lock().extend(vars);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> VariableContext {
        self.lock().clone()
    }
}

impl VariableLookup for SharedVariables {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name)
    }
}

/// 一个 Call 执行时看到的变量视图
///
/// 查找顺序：本次响应刚提取的值 → local → shared。
/// 写入从不回退，由声明的作用域决定目标。
pub struct ScopedLookup<'a> {
    pending: Option<&'a VariableContext>,
    local: &'a VariableContext,
    shared: &'a SharedVariables,
}

impl<'a> ScopedLookup<'a> {
    pub fn new(local: &'a VariableContext, shared: &'a SharedVariables) -> Self {
        Self {
            pending: None,
            local,
            shared,
        }
    }

    pub fn with_pending(mut self, pending: &'a VariableContext) -> Self {
        self.pending = Some(pending);
        self
    }
}

impl VariableLookup for ScopedLookup<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.pending
            .and_then(|p| p.get(name))
            .or_else(|| self.local.get(name))
            .map(str::to_string)
            .or_else(|| self.shared.get(name))
    }
}

/// 按作用域写入变量
pub fn store_variable(
    scope: Scope,
    name: &str,
    value: String,
    local: &mut VariableContext,
    shared: &SharedVariables,
) {
    match scope {
        Scope::Local => local.insert(name, value),
        Scope::Shared => shared.set(name, value),
    }
}
