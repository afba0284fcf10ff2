use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::TestFailure;
use crate::http::{CallResponse, OutboundRequest, RequestBody, SuiteClient};
use crate::model::{AttemptTokens, Call};
use crate::perf::PerformanceTracker;
use crate::runner::types::{Attempt, CallReport, CallState};
use crate::variable::{
    FieldContext, FieldResolver, PendingVariables, ScopedLookup, SharedVariables, VariableContext,
    extract_variables, initialize_constants,
};
use crate::verify::Verifier;

pub const DEFAULT_POLL_DURATION: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Call 未声明 poll 参数时使用的默认值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub poll_duration: Duration,
    pub poll_interval: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            poll_duration: DEFAULT_POLL_DURATION,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// 执行 Call 时用到的 suite 资源
#[derive(Clone, Copy)]
pub struct CallEnv<'a> {
    pub client: &'a SuiteClient,
    pub shared: &'a SharedVariables,
    pub tracker: Option<&'a dyn PerformanceTracker>,
}

/// 单个 Call 的状态机：
/// PENDING → WAITING → RESOLVING → SENDING → (POLLING)* → VERIFYING → EXTRACTING → DONE，
/// 任何一步失败进入 FAILED
#[derive(Debug, Clone, Default)]
pub struct CallExecutor {
    settings: ExecutorSettings,
}

impl CallExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> ExecutorSettings {
        self.settings
    }

    /// 执行 Call，失败只记录在报告中，不会 panic
    pub async fn execute(
        &self,
        call: &Call,
        env: CallEnv<'_>,
        local: &mut VariableContext,
    ) -> CallReport {
        let started = Instant::now();
        let mut report = CallReport::new(call.id, &call.name, call.method.as_str(), &call.url);
        info!(call = %call.name, id = call.id, "开始执行 Call");

        let outcome = self.run(call, env, local, &mut report).await;
        report.duration = started.elapsed();

        match outcome {
            Ok(()) => {
                report.enter(CallState::Done);
                info!(
                    call = %call.name,
                    attempts = report.attempts.len(),
                    elapsed_ms = report.duration.as_millis() as u64,
                    "Call 通过"
                );
            }
            Err(failure) => {
                warn!(call = %call.name, state = %report.state(), "Call 失败: {}", failure);
                report.failure = Some(failure);
                report.details = Some(request_details(call, &report));
                report.enter(CallState::Failed);
            }
        }

        if let Some(tracker) = env.tracker {
            tracker.on_call_result(call.id, report.passed());
        }
        report
    }

    async fn run(
        &self,
        call: &Call,
        env: CallEnv<'_>,
        local: &mut VariableContext,
        report: &mut CallReport,
    ) -> Result<(), TestFailure> {
        report.enter(CallState::Waiting);
        if let Some(wait) = call.wait.filter(|w| !w.is_zero()) {
            debug!(call = %call.name, wait_ms = wait.as_millis() as u64, "等待后再发送");
            tokio::time::sleep(wait).await;
        }

        report.enter(CallState::Resolving);
        let tokens = AttemptTokens::generate();
        initialize_constants(call, &tokens, local, env.shared);
        let (request, body) = prepare_request(call, env, local, &tokens)?;

        if let Some(tracker) = env.tracker {
            tracker.on_call_start(call, &request.url);
        }

        let send_started = Instant::now();
        let result = if call.poll {
            self.poll(call, env, local, &request, body.as_deref(), report)
                .await
        } else {
            attempt(1, call, env, local, &request, body.as_deref(), report).await
        };
        if let Some(tracker) = env.tracker {
            tracker.on_call_duration(call.id, send_started.elapsed().as_millis() as u64);
        }
        let pending = result?;

        report.enter(CallState::Extracting);
        pending.commit(local, env.shared);
        Ok(())
    }

    /// 在时间预算内重复发送与校验，每次失败后预算减去一个间隔。
    /// Call 上为 0 的时长或间隔按未设置处理，使用执行器默认值。
    async fn poll(
        &self,
        call: &Call,
        env: CallEnv<'_>,
        local: &VariableContext,
        request: &OutboundRequest,
        body: Option<&str>,
        report: &mut CallReport,
    ) -> Result<PendingVariables, TestFailure> {
        let duration = call
            .poll_duration
            .filter(|d| !d.is_zero())
            .unwrap_or(self.settings.poll_duration);
        let interval = call
            .poll_interval
            .filter(|d| !d.is_zero())
            .unwrap_or(self.settings.poll_interval);
        if interval.is_zero() {
            return Err(TestFailure::Configuration(
                "default poll interval must be greater than zero".to_string(),
            ));
        }

        let mut remaining = duration;
        let mut number = 0;
        loop {
            number += 1;
            report.enter(CallState::Polling);
            match attempt(number, call, env, local, request, body, report).await {
                Ok(pending) => {
                    info!(call = %call.name, attempts = number, "poll 请求成功");
                    return Ok(pending);
                }
                Err(failure) if !failure.is_retryable() => return Err(failure),
                Err(failure) => {
                    remaining = remaining.saturating_sub(interval);
                    if remaining.is_zero() {
                        return Err(TestFailure::PollExhausted {
                            attempts: number,
                            last: Box::new(failure),
                        });
                    }
                    debug!(
                        call = %call.name,
                        attempt = number,
                        remaining_ms = remaining.as_millis() as u64,
                        "poll 尝试失败: {}",
                        failure
                    );
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}

/// 解析 URL、请求体、header 与日志消息并构造请求
fn prepare_request(
    call: &Call,
    env: CallEnv<'_>,
    local: &VariableContext,
    tokens: &AttemptTokens,
) -> Result<(OutboundRequest, Option<String>), TestFailure> {
    let lookup = ScopedLookup::new(local, env.shared);

    let url = FieldResolver::resolve_with_tokens(&call.url, FieldContext::Url, &lookup, tokens)?;
    let body = FieldResolver::resolve_optional(
        call.request_body.as_deref(),
        FieldContext::RequestBody,
        &lookup,
        tokens,
    )?;
    let headers = call
        .headers
        .iter()
        .map(|(name, value)| {
            FieldResolver::resolve_with_tokens(value, FieldContext::Header, &lookup, tokens)
                .map(|v| (name.clone(), v))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(message) = call.log_message.as_deref() {
        let message =
            FieldResolver::resolve_with_tokens(message, FieldContext::LogMessage, &lookup, tokens)?;
        info!(call = %call.name, "{}", message);
    }

    let request_body = RequestBody::parse(body.as_deref())
        .map_err(|e| TestFailure::Configuration(e.to_string()))?;
    let request = env
        .client
        .build_request(call.method, &url, &headers, request_body)
        .map_err(|e| TestFailure::Configuration(e.to_string()))?;
    Ok((request, body))
}

/// 一次发送与校验；结果记录为 Attempt
async fn attempt(
    number: usize,
    call: &Call,
    env: CallEnv<'_>,
    local: &VariableContext,
    request: &OutboundRequest,
    body: Option<&str>,
    report: &mut CallReport,
) -> Result<PendingVariables, TestFailure> {
    report.enter(CallState::Sending);
    let started_at = Utc::now();
    let start = Instant::now();
    let sent = env.client.send(request).await;
    let duration = start.elapsed();

    let (response, outcome) = match sent {
        Ok(response) => {
            report.enter(CallState::Verifying);
            let outcome = verify_response(call, &response, local, env.shared);
            (Some(response), outcome)
        }
        Err(e) => (None, Err(TestFailure::Transport(e.to_string()))),
    };

    report.attempts.push(Attempt {
        number,
        url: request.url.clone(),
        request_body: body.map(str::to_string),
        started_at,
        duration,
        response,
        failure: outcome.as_ref().err().cloned(),
    });
    outcome
}

/// 状态码通过后先提取变量，条件表达式可以引用本次响应中的值
fn verify_response(
    call: &Call,
    response: &CallResponse,
    local: &VariableContext,
    shared: &SharedVariables,
) -> Result<PendingVariables, TestFailure> {
    Verifier::check_status(call, response)?;
    let pending = extract_variables(call, &response.body)?;
    let lookup = ScopedLookup::new(local, shared).with_pending(pending.as_context());
    Verifier::check_condition(call, &lookup)?;
    Verifier::check_body(call, &response.body)?;
    Ok(pending)
}

/// 失败报告中的请求详情
fn request_details(call: &Call, report: &CallReport) -> String {
    let last = report.attempts.last();
    let url = last.map(|a| a.url.as_str()).unwrap_or(&call.url);
    let mut lines = vec![format!("{} {}", call.method, url)];

    if let Some(body) = last
        .and_then(|a| a.request_body.as_deref())
        .or(call.request_body.as_deref())
    {
        lines.push(format!("Request: {}", body));
    }
    lines.push(format!("Expected status: {}", call.expected_status));
    if let Some(expected) = call.expected_response.as_deref() {
        lines.push(format!("Expected response: {}", expected));
    }
    if let Some(condition) = call.condition.as_deref() {
        lines.push(format!("Test condition: {}", condition));
    }
    if !call.variables.is_empty() {
        let vars: Vec<String> = call.variables.iter().map(ToString::to_string).collect();
        lines.push(format!("Variables: {}", vars.join(", ")));
    }
    if let Some(response) = report.last_response() {
        lines.push(format!("Current status: {}", response.status));
        lines.push(format!("Current response: {}", response.body));
    }
    lines.join("\n")
}
