//! 运行中的 suite 注册表
//!
//! 每个 suite 启动时获得一个随机的 10 位 id，冲突时重新生成；
//! 结束后由 runner 移除。
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use tracing::debug;

use crate::runner::suite::SuiteInstance;

const MIN_SUITE_ID: u64 = 1_000_000_000;
const MAX_SUITE_ID: u64 = 9_999_999_999;

/// Suite 标识
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SuiteId(u64);

impl SuiteId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    fn random() -> Self {
        Self(rand::rng().random_range(MIN_SUITE_ID..=MAX_SUITE_ID))
    }
}

impl From<u64> for SuiteId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 并发安全的 `SuiteId → SuiteInstance` 映射
#[derive(Default)]
pub struct SuiteRegistry(DashMap<SuiteId, Arc<SuiteInstance>>);

impl SuiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 生成未被占用的 id，并用它构造和登记 suite
    ///
    /// `make` 在不持有任何分片锁的情况下调用，可以访问注册表；
    /// 并发登记撞上同一个 id 时会换一个 id 再调用一次。
    pub fn register(&self, make: impl FnMut(SuiteId) -> SuiteInstance) -> Arc<SuiteInstance> {
        self.register_with(SuiteId::random, make)
    }

    pub(crate) fn register_with(
        &self,
        mut next_id: impl FnMut() -> SuiteId,
        mut make: impl FnMut(SuiteId) -> SuiteInstance,
    ) -> Arc<SuiteInstance> {
        loop {
            let id = next_id();
            if self.0.contains_key(&id) {
                debug!(suite = %id, "suite id 冲突，重新生成");
                continue;
            }

            let suite = Arc::new(make(id));
            match self.0.entry(id) {
                Entry::Occupied(_) => debug!(suite = %id, "suite id 被并发登记占用，重新生成"),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&suite));
                    debug!(suite = %id, "suite 已登记");
                    return suite;
                }
            }
        }
    }

    pub fn get(&self, id: &SuiteId) -> Option<Arc<SuiteInstance>> {
        self.0.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &SuiteId) -> Option<Arc<SuiteInstance>> {
        self.0.remove(id).map(|(_, suite)| suite)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> Vec<SuiteId> {
        self.0.iter().map(|entry| *entry.key()).collect()
    }
}
