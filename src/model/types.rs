use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::http::types::Method;
use crate::model::tokens::{JSON_PATH_PREFIX, XPATH_PREFIX};

/// 变量作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Scope {
    /// 仅当前 Call 序列可见
    Local,
    /// 同一 suite 中所有序列可见
    Shared,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Local => write!(f, "local"),
            Scope::Shared => write!(f, "shared"),
        }
    }
}

/// 变量声明的值，在加载时分类一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    /// `$.data.id`
    JsonPath(String),
    /// `XPATH:/user/id`，保存去掉前缀后的表达式
    XmlPath(String),
    /// 其他任意文本，可包含 RANDOM_VALUE / SYSTEM_TIME
    Constant(String),
}

impl VariableValue {
    pub fn classify(raw: &str) -> Self {
        if raw.starts_with(JSON_PATH_PREFIX) {
            VariableValue::JsonPath(raw.to_string())
        } else if let Some(expr) = raw.strip_prefix(XPATH_PREFIX) {
            VariableValue::XmlPath(expr.to_string())
        } else {
            VariableValue::Constant(raw.to_string())
        }
    }

    pub fn is_extractor(&self) -> bool {
        !matches!(self, VariableValue::Constant(_))
    }

    /// 还原为声明时的原始文本
    pub fn raw(&self) -> String {
        match self {
            VariableValue::JsonPath(path) => path.clone(),
            VariableValue::XmlPath(expr) => format!("{}{}", XPATH_PREFIX, expr),
            VariableValue::Constant(value) => value.clone(),
        }
    }
}

/// 变量声明 `name=value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl {
    pub name: String,
    pub value: VariableValue,
    pub scope: Scope,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, raw: &str, scope: Scope) -> Self {
        Self {
            name: name.into(),
            value: VariableValue::classify(raw),
            scope,
        }
    }

    pub fn local(name: impl Into<String>, raw: &str) -> Self {
        Self::new(name, raw, Scope::Local)
    }

    pub fn shared(name: impl Into<String>, raw: &str) -> Self {
        Self::new(name, raw, Scope::Shared)
    }

    /// 解析 `name=value` 形式，值中可以再包含 `=`
    pub fn parse(decl: &str, scope: Scope) -> Option<Self> {
        decl.split_once('=')
            .map(|(name, value)| Self::new(name.trim(), value, scope))
    }
}

impl fmt::Display for VariableDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.name, self.value.raw(), self.scope)
    }
}

/// 一次 HTTP 交互
///
/// 加载后不再修改；每次执行的解析结果与响应记录在 `Attempt` 中。
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub id: u64,
    pub name: String,
    pub url: String,
    pub method: Method,
    pub expected_status: u16,
    pub request_body: Option<String>,
    pub expected_response: Option<String>,
    pub condition: Option<String>,
    pub variables: Vec<VariableDecl>,
    pub headers: Vec<(String, String)>,
    pub compare_response: bool,
    pub poll: bool,
    pub poll_duration: Option<Duration>,
    pub poll_interval: Option<Duration>,
    pub wait: Option<Duration>,
    pub log_message: Option<String>,
    pub first: bool,
    pub last: bool,
    /// 在源文件中的起始行号（用于错误报告）
    pub line_number: usize,
}

impl Call {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: String::new(),
            method: Method::Get,
            expected_status: 200,
            request_body: None,
            expected_response: None,
            condition: None,
            variables: Vec::new(),
            headers: Vec::new(),
            compare_response: false,
            poll: false,
            poll_duration: None,
            poll_interval: None,
            wait: None,
            log_message: None,
            first: false,
            last: false,
            line_number: 0,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    /// 设置期望响应，同时打开响应比较
    pub fn expecting(mut self, response: impl Into<String>) -> Self {
        self.expected_response = Some(response.into());
        self.compare_response = true;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_variable(mut self, decl: VariableDecl) -> Self {
        self.variables.push(decl);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn polling(mut self, duration: Duration, interval: Duration) -> Self {
        self.poll = true;
        self.poll_duration = Some(duration);
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = Some(wait);
        self
    }

    pub fn constants(&self) -> impl Iterator<Item = &VariableDecl> {
        self.variables.iter().filter(|v| !v.value.is_extractor())
    }

    pub fn extractors(&self) -> impl Iterator<Item = &VariableDecl> {
        self.variables.iter().filter(|v| v.value.is_extractor())
    }
}

/// 单调递增的 Call id，以创建时的毫秒时间为种子
#[derive(Debug)]
pub struct CallIdGenerator {
    next: AtomicU64,
}

impl CallIdGenerator {
    pub fn new() -> Self {
        let seed = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self::starting_at(seed)
    }

    pub fn starting_at(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for CallIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// 一个测试：共享同一名称、按声明顺序执行的 Call 列表
#[derive(Debug, Clone, PartialEq)]
pub struct CallSequence {
    pub name: String,
    pub calls: Vec<Call>,
    /// 源文件路径（用于错误报告）
    pub source_path: Option<PathBuf>,
}

impl CallSequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Vec::new(),
            source_path: None,
        }
    }

    pub fn with_source_path(mut self, path: PathBuf) -> Self {
        self.source_path = Some(path);
        self
    }

    /// 追加 Call 并重新标记首尾位置
    pub fn push(&mut self, call: Call) {
        self.calls.push(call);
        self.mark_positions();
    }

    pub fn with_call(mut self, call: Call) -> Self {
        self.push(call);
        self
    }

    pub fn mark_positions(&mut self) {
        let count = self.calls.len();
        for (index, call) in self.calls.iter_mut().enumerate() {
            call.first = index == 0;
            call.last = index + 1 == count;
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_variable_values() {
        assert_eq!(
            VariableValue::classify("$.data.id"),
            VariableValue::JsonPath("$.data.id".to_string())
        );
        assert_eq!(
            VariableValue::classify("XPATH:/user/id"),
            VariableValue::XmlPath("/user/id".to_string())
        );
        assert_eq!(
            VariableValue::classify("user-RANDOM_VALUE"),
            VariableValue::Constant("user-RANDOM_VALUE".to_string())
        );
        // 前缀判断区分大小写
        assert_eq!(
            VariableValue::classify("xpath:/a"),
            VariableValue::Constant("xpath:/a".to_string())
        );
    }

    #[test]
    fn test_parse_decl_keeps_equals_in_value() {
        let decl = VariableDecl::parse("query=a=b", Scope::Local).unwrap();
        assert_eq!(decl.name, "query");
        assert_eq!(decl.value, VariableValue::Constant("a=b".to_string()));
        assert!(VariableDecl::parse("novalue", Scope::Local).is_none());
    }

    #[test]
    fn test_raw_round_trips_prefix() {
        let decl = VariableDecl::shared("id", "XPATH://id");
        assert_eq!(decl.value.raw(), "XPATH://id");
    }

    #[test]
    fn test_sequence_marks_first_and_last() {
        let ids = CallIdGenerator::starting_at(10);
        let mut seq = CallSequence::new("users");
        seq.push(Call::new(ids.next_id(), "create"));
        assert!(seq.calls[0].first && seq.calls[0].last);

        seq.push(Call::new(ids.next_id(), "get"));
        seq.push(Call::new(ids.next_id(), "delete"));
        assert!(seq.calls[0].first && !seq.calls[0].last);
        assert!(!seq.calls[1].first && !seq.calls[1].last);
        assert!(!seq.calls[2].first && seq.calls[2].last);
        assert_eq!(seq.calls[2].id, 12);
    }

    #[test]
    fn test_call_splits_constants_and_extractors() {
        let call = Call::new(1, "login")
            .with_variable(VariableDecl::local("user", "bob"))
            .with_variable(VariableDecl::shared("token", "$.token"))
            .with_variable(VariableDecl::local("id", "XPATH:/r/id"));
        assert_eq!(call.constants().count(), 1);
        assert_eq!(call.extractors().count(), 2);
    }
}
