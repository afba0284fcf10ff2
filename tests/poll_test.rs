use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use restassay::TestFailure;
use restassay::http::{CallResponse, OutboundRequest, SuiteClient, Transport, TransportError};
use restassay::model::{Call, VariableDecl};
use restassay::runner::{CallEnv, CallExecutor, CallState, ExecutorSettings};
use restassay::variable::{SharedVariables, VariableContext};

/// 第 `ready_on` 次请求起返回 200 与 done，之前返回 `pending_status` 与 pending
struct WarmingUpTransport {
    ready_on: usize,
    pending_status: u16,
    calls: AtomicUsize,
}

impl WarmingUpTransport {
    fn new(ready_on: usize) -> Arc<Self> {
        Self::with_pending_status(ready_on, 503)
    }

    fn with_pending_status(ready_on: usize, pending_status: u16) -> Arc<Self> {
        Arc::new(Self {
            ready_on,
            pending_status,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for WarmingUpTransport {
    async fn send(&self, _: &OutboundRequest) -> Result<CallResponse, TransportError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt >= self.ready_on {
            Ok(CallResponse::new(200, r#"{"state": "done"}"#))
        } else {
            Ok(CallResponse::new(self.pending_status, r#"{"state": "pending"}"#))
        }
    }
}

async fn execute(transport: Arc<WarmingUpTransport>, call: &Call) -> restassay::runner::CallReport {
    let client = SuiteClient::new(transport).with_base_url("http://api.test");
    let shared = SharedVariables::new();
    let mut local = VariableContext::new();
    let env = CallEnv {
        client: &client,
        shared: &shared,
        tracker: None,
    };
    CallExecutor::default().execute(call, env, &mut local).await
}

/// 10 秒预算、5 秒间隔只能容纳两次尝试，第三次才会成功时必须报告失败
#[tokio::test(start_paused = true)]
async fn test_poll_budget_bounds_attempts() {
    let transport = WarmingUpTransport::new(3);
    let call = Call::new(1, "job")
        .with_url("/jobs/1")
        .polling(Duration::from_secs(10), Duration::from_secs(5));

    let started = tokio::time::Instant::now();
    let report = execute(transport.clone(), &call).await;

    match &report.failure {
        Some(TestFailure::PollExhausted { attempts, last }) => {
            assert_eq!(*attempts, 2);
            assert!(matches!(
                **last,
                TestFailure::StatusMismatch {
                    expected: 200,
                    actual: 503
                }
            ));
        }
        other => panic!("expected exhausted poll, got {:?}", other),
    }
    assert_eq!(transport.calls(), 2);
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.state(), CallState::Failed);
    // 只在两次尝试之间睡眠一次
    assert_eq!(started.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_poll_succeeds_within_budget() {
    let transport = WarmingUpTransport::new(3);
    let call = Call::new(1, "job")
        .with_url("/jobs/1")
        .with_variable(VariableDecl::local("state", "$.state"))
        .polling(Duration::from_secs(30), Duration::from_secs(5));

    let report = execute(transport.clone(), &call).await;
    assert!(report.passed(), "{:?}", report.failure);
    assert_eq!(report.attempts.len(), 3);
    assert_eq!(
        report.attempts.iter().map(|a| a.passed()).collect::<Vec<_>>(),
        vec![false, false, true]
    );
    assert!(report.states.contains(&CallState::Polling));
    assert_eq!(report.state(), CallState::Done);
}

/// 未声明 poll 参数时使用执行器默认值
#[tokio::test(start_paused = true)]
async fn test_poll_uses_executor_defaults() {
    let transport = WarmingUpTransport::new(100);
    let mut call = Call::new(1, "job").with_url("/jobs/1");
    call.poll = true;

    let client = SuiteClient::new(transport.clone()).with_base_url("http://api.test");
    let shared = SharedVariables::new();
    let mut local = VariableContext::new();
    let env = CallEnv {
        client: &client,
        shared: &shared,
        tracker: None,
    };
    let executor = CallExecutor::new(ExecutorSettings {
        poll_duration: Duration::from_secs(3),
        poll_interval: Duration::from_secs(1),
    });
    let report = executor.execute(&call, env, &mut local).await;

    assert!(matches!(
        report.failure,
        Some(TestFailure::PollExhausted { attempts: 3, .. })
    ));
}

fn parse_call(content: &str) -> Call {
    restassay::parser::parse_content(content)
        .unwrap()
        .into_sequence()
        .calls
        .remove(0)
}

/// 文件中为 0 的 POLL_TIME 使用默认时长
#[tokio::test(start_paused = true)]
async fn test_zero_poll_time_uses_default_duration() {
    let transport = WarmingUpTransport::new(2);
    let call = parse_call("API_TEST=job\nAPI_URL=/jobs/1\nAPI_POLL\nPOLL_TIME=0\nPOLL_INTERVAL=5\n");

    let report = execute(transport.clone(), &call).await;
    assert!(report.passed(), "{:?}", report.failure);
    assert_eq!(transport.calls(), 2);
}

/// 文件中为 0 的 POLL_INTERVAL 使用默认间隔
#[tokio::test(start_paused = true)]
async fn test_zero_poll_interval_uses_default_interval() {
    let transport = WarmingUpTransport::new(2);
    let call = parse_call("API_TEST=job\nAPI_URL=/jobs/1\nAPI_POLL\nPOLL_TIME=60\nPOLL_INTERVAL=0\n");

    let started = tokio::time::Instant::now();
    let report = execute(transport.clone(), &call).await;
    assert!(report.passed(), "{:?}", report.failure);
    assert_eq!(transport.calls(), 2);
    assert_eq!(started.elapsed(), Duration::from_secs(5));
}

/// 执行器默认间隔为 0 时无法 poll
#[tokio::test(start_paused = true)]
async fn test_zero_default_interval_is_configuration_error() {
    let transport = WarmingUpTransport::new(1);
    let mut call = Call::new(1, "job").with_url("/jobs/1");
    call.poll = true;

    let client = SuiteClient::new(transport.clone()).with_base_url("http://api.test");
    let shared = SharedVariables::new();
    let mut local = VariableContext::new();
    let env = CallEnv {
        client: &client,
        shared: &shared,
        tracker: None,
    };
    let executor = CallExecutor::new(ExecutorSettings {
        poll_duration: Duration::from_secs(10),
        poll_interval: Duration::ZERO,
    });
    let report = executor.execute(&call, env, &mut local).await;

    assert!(matches!(report.failure, Some(TestFailure::Configuration(_))));
    assert_eq!(transport.calls(), 0);
}

/// 条件表达式失败同样会重试
#[tokio::test(start_paused = true)]
async fn test_condition_failure_is_retried() {
    let transport = WarmingUpTransport::with_pending_status(2, 200);
    let call = Call::new(1, "job")
        .with_url("/jobs/1")
        .with_variable(VariableDecl::local("state", "$.state"))
        .with_condition("'{state}' == 'done'")
        .polling(Duration::from_secs(60), Duration::from_secs(10));

    let report = execute(transport.clone(), &call).await;
    assert!(report.passed(), "{:?}", report.failure);
    assert_eq!(transport.calls(), 2);
}
