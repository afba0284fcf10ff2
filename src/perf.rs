//! 每个 Call 的耗时与结果记录

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::http::types::Method;
use crate::model::Call;

/// 执行器在 Call 开始、请求完成和出结果时回调
pub trait PerformanceTracker: Send + Sync {
    fn on_call_start(&self, call: &Call, resolved_url: &str);
    fn on_call_duration(&self, call_id: u64, millis: u64);
    fn on_call_result(&self, call_id: u64, success: bool);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallPerformance {
    pub call_id: u64,
    pub name: String,
    /// `METHOD:/path`
    pub endpoint: String,
    pub millis: Option<u64>,
    pub success: Option<bool>,
}

/// 内存中的记录器，按 Call 开始顺序保存
#[derive(Debug, Default)]
pub struct PerformanceRecorder {
    entries: Mutex<Vec<CallPerformance>>,
}

impl PerformanceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CallPerformance>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn entries(&self) -> Vec<CallPerformance> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn update(&self, call_id: u64, apply: impl FnOnce(&mut CallPerformance)) {
        if let Some(entry) = self.lock().iter_mut().rev().find(|e| e.call_id == call_id) {
            apply(entry);
        }
    }
}

impl PerformanceTracker for PerformanceRecorder {
    fn on_call_start(&self, call: &Call, resolved_url: &str) {
        let entry = CallPerformance {
            call_id: call.id,
            name: call.name.clone(),
            endpoint: endpoint(call.method, resolved_url),
            millis: None,
            success: None,
        };
        let mut entries = self.lock();
        entries.retain(|e| e.call_id != call.id);
        entries.push(entry);
    }

    fn on_call_duration(&self, call_id: u64, millis: u64) {
        self.update(call_id, |e| e.millis = Some(millis));
    }

    fn on_call_result(&self, call_id: u64, success: bool) {
        self.update(call_id, |e| e.success = Some(success));
    }
}

/// 去掉查询串与协议/主机部分
pub fn endpoint(method: Method, url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or_default();
    let path = if without_query.starts_with("http") || without_query.starts_with("www") {
        let absolute = if without_query.starts_with("www") {
            format!("http://{}", without_query)
        } else {
            without_query.to_string()
        };
        url::Url::parse(&absolute)
            .map(|u| u.path().to_string())
            .unwrap_or(absolute)
    } else {
        without_query.to_string()
    };
    format!("{}:{}", method, path)
}
