use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::TestFailure;
use crate::http::CallResponse;

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn serialize_failure<S: Serializer>(f: &Option<TestFailure>, s: S) -> Result<S::Ok, S::Error> {
    match f {
        Some(failure) => s.serialize_some(&failure.to_string()),
        None => s.serialize_none(),
    }
}

/// Call 执行器的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallState {
    Pending,
    Waiting,
    Resolving,
    Sending,
    Polling,
    Verifying,
    Extracting,
    Done,
    Failed,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Pending => "PENDING",
            CallState::Waiting => "WAITING",
            CallState::Resolving => "RESOLVING",
            CallState::Sending => "SENDING",
            CallState::Polling => "POLLING",
            CallState::Verifying => "VERIFYING",
            CallState::Extracting => "EXTRACTING",
            CallState::Done => "DONE",
            CallState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// 一次发送尝试的记录
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    /// 从 1 开始
    pub number: usize,
    pub url: String,
    pub request_body: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub response: Option<CallResponse>,
    #[serde(serialize_with = "serialize_failure")]
    pub failure: Option<TestFailure>,
}

impl Attempt {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// 单个 Call 的执行结果
#[derive(Debug, Clone, Serialize)]
pub struct CallReport {
    pub call_id: u64,
    pub name: String,
    pub method: String,
    pub url: String,
    pub states: Vec<CallState>,
    pub attempts: Vec<Attempt>,
    #[serde(serialize_with = "serialize_failure")]
    pub failure: Option<TestFailure>,
    /// 失败时附带的请求详情
    pub details: Option<String>,
    pub skipped: bool,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl CallReport {
    pub fn new(call_id: u64, name: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            call_id,
            name: name.into(),
            method: method.into(),
            url: url.into(),
            states: vec![CallState::Pending],
            attempts: Vec::new(),
            failure: None,
            details: None,
            skipped: false,
            duration: Duration::ZERO,
        }
    }

    /// 前面的 Call 失败后未执行
    pub fn skipped(call_id: u64, name: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        let mut report = Self::new(call_id, name, method, url);
        report.skipped = true;
        report
    }

    pub fn enter(&mut self, state: CallState) {
        self.states.push(state);
    }

    pub fn state(&self) -> CallState {
        self.states.last().copied().unwrap_or(CallState::Pending)
    }

    pub fn passed(&self) -> bool {
        !self.skipped && self.failure.is_none()
    }

    pub fn outcome(&self) -> Result<(), &TestFailure> {
        match &self.failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    pub fn last_response(&self) -> Option<&CallResponse> {
        self.attempts.iter().rev().find_map(|a| a.response.as_ref())
    }
}

/// 一个 Call 序列的执行结果
#[derive(Debug, Clone, Serialize)]
pub struct SequenceReport {
    pub name: String,
    pub source: Option<PathBuf>,
    pub calls: Vec<CallReport>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl SequenceReport {
    pub fn passed(&self) -> bool {
        self.calls.iter().all(CallReport::passed)
    }

    pub fn first_failure(&self) -> Option<&CallReport> {
        self.calls.iter().find(|c| c.failure.is_some())
    }
}

/// 一个 suite 的执行结果
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub suite_id: u64,
    pub name: String,
    pub sequences: Vec<SequenceReport>,
    #[serde(serialize_with = "serialize_failure")]
    pub setup_failure: Option<TestFailure>,
    #[serde(serialize_with = "serialize_failure")]
    pub teardown_failure: Option<TestFailure>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.setup_failure.is_none()
            && self.teardown_failure.is_none()
            && self.sequences.iter().all(SequenceReport::passed)
    }
}

/// 测试摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestSummary {
    pub sequences: usize,
    pub passed_sequences: usize,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub attempts: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub total_duration: Duration,
}

impl TestSummary {
    pub fn from_report(report: &SuiteReport) -> Self {
        let calls: Vec<&CallReport> = report.sequences.iter().flat_map(|s| &s.calls).collect();
        let passed = calls.iter().filter(|c| c.passed()).count();
        let skipped = calls.iter().filter(|c| c.skipped).count();

        Self {
            sequences: report.sequences.len(),
            passed_sequences: report.sequences.iter().filter(|s| s.passed()).count(),
            total: calls.len(),
            passed,
            failed: calls.len() - passed - skipped,
            skipped,
            attempts: calls.iter().map(|c| c.attempts.len()).sum(),
            total_duration: report.duration,
        }
    }
}
