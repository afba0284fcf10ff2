use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::TestFailure;
use crate::http::{SuiteClient, Transport};
use crate::model::{Call, CallSequence};
use crate::perf::PerformanceTracker;
use crate::runner::executor::{CallEnv, CallExecutor};
use crate::runner::registry::SuiteRegistry;
use crate::runner::suite::{Authenticator, SuiteInstance};
use crate::runner::types::{CallReport, CallState, SequenceReport, SuiteReport};
use crate::variable::VariableContext;

/// 按声明顺序执行一个序列中的 Call
pub struct SequenceRunner<'a> {
    executor: &'a CallExecutor,
    suite: &'a SuiteInstance,
}

impl<'a> SequenceRunner<'a> {
    pub fn new(executor: &'a CallExecutor, suite: &'a SuiteInstance) -> Self {
        Self { executor, suite }
    }

    /// 某个 Call 失败后，后面的 Call 记为跳过。
    /// 首个 Call 执行前触发 suite set-up，最后一个 Call 结束（包括跳过）后通知 suite 序列完成。
    pub async fn run(&self, sequence: &CallSequence) -> SequenceReport {
        let started = Instant::now();
        let env = CallEnv {
            client: self.suite.client(),
            shared: self.suite.shared(),
            tracker: self.suite.tracker(),
        };
        let mut local = VariableContext::new();
        let mut calls = Vec::with_capacity(sequence.calls.len());
        let mut failed = false;

        info!(suite = %self.suite.id(), sequence = %sequence.name, calls = sequence.len(), "开始执行序列");
        for call in &sequence.calls {
            let report = if failed {
                CallReport::skipped(call.id, &call.name, call.method.as_str(), &call.url)
            } else {
                match self.before_call(call).await {
                    Ok(()) => self.executor.execute(call, env, &mut local).await,
                    Err(failure) => {
                        let mut report =
                            CallReport::new(call.id, &call.name, call.method.as_str(), &call.url);
                        report.failure = Some(failure);
                        report.enter(CallState::Failed);
                        report
                    }
                }
            };
            failed = failed || !report.passed();
            calls.push(report);

            if call.last {
                self.after_last_call(sequence).await;
            }
        }

        let report = SequenceReport {
            name: sequence.name.clone(),
            source: sequence.source_path.clone(),
            calls,
            duration: started.elapsed(),
        };
        if report.passed() {
            info!(sequence = %sequence.name, "序列通过");
        } else {
            warn!(sequence = %sequence.name, "序列失败");
        }
        report
    }
}

impl SequenceRunner<'_> {
    async fn before_call(&self, call: &Call) -> Result<(), TestFailure> {
        if call.first {
            self.suite.set_up().await?;
        }
        Ok(())
    }

    async fn after_last_call(&self, sequence: &CallSequence) {
        if let Some(Err(failure)) = self.suite.finish_sequence().await {
            warn!(sequence = %sequence.name, "suite teardown 失败: {}", failure);
        }
    }
}

/// 运行一个 suite：登记、认证、执行全部序列、teardown、注销
pub struct SuiteRunner {
    registry: Arc<SuiteRegistry>,
    transport: Arc<dyn Transport>,
    executor: CallExecutor,
    base_url: Option<String>,
    headers: Vec<(String, String)>,
    authenticator: Option<Arc<dyn Authenticator>>,
    tracker: Option<Arc<dyn PerformanceTracker>>,
    seed: VariableContext,
    parallel: bool,
}

impl SuiteRunner {
    pub fn new(registry: Arc<SuiteRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
            executor: CallExecutor::default(),
            base_url: None,
            headers: Vec::new(),
            authenticator: None,
            tracker: None,
            seed: VariableContext::new(),
            parallel: false,
        }
    }

    pub fn with_executor(mut self, executor: CallExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn PerformanceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_seed(mut self, seed: VariableContext) -> Self {
        self.seed = seed;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn build_suite(&self, name: &str, sequences: usize) -> Arc<SuiteInstance> {
        self.registry.register(|id| {
            let mut client = SuiteClient::new(Arc::clone(&self.transport));
            if let Some(base_url) = &self.base_url {
                client = client.with_base_url(base_url.as_str());
            }
            for (k, v) in &self.headers {
                client.add_header(k, v);
            }

            let mut suite =
                SuiteInstance::new(id, name, client, sequences).with_seed(self.seed.clone());
            if let Some(auth) = &self.authenticator {
                suite = suite.with_authenticator(Arc::clone(auth));
            }
            if let Some(tracker) = &self.tracker {
                suite = suite.with_tracker(Arc::clone(tracker));
            }
            suite
        })
    }

    pub async fn run(&self, name: &str, sequences: Vec<CallSequence>) -> SuiteReport {
        let started = Instant::now();
        let suite = self.build_suite(name, sequences.len());
        let id = suite.id();

        let mut setup_failure = None;
        let reports = match suite.set_up().await {
            Ok(()) => {
                if self.parallel {
                    self.run_parallel(&suite, sequences).await
                } else {
                    self.run_sequential(&suite, &sequences).await
                }
            }
            Err(failure) => {
                error!(suite = %id, "suite 启动失败: {}", failure);
                setup_failure = Some(failure);
                sequences.iter().map(skipped_sequence).collect()
            }
        };

        // 最后一个序列已触发 teardown 时返回当时的结果
        let teardown_failure = suite.tear_down().await.err();
        self.registry.remove(&id);

        SuiteReport {
            suite_id: id.as_u64(),
            name: name.to_string(),
            sequences: reports,
            setup_failure,
            teardown_failure,
            duration: started.elapsed(),
        }
    }

    async fn run_sequential(&self, suite: &SuiteInstance, sequences: &[CallSequence]) -> Vec<SequenceReport> {
        let runner = SequenceRunner::new(&self.executor, suite);
        let mut reports = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            reports.push(runner.run(sequence).await);
        }
        reports
    }

    async fn run_parallel(&self, suite: &Arc<SuiteInstance>, sequences: Vec<CallSequence>) -> Vec<SequenceReport> {
        let mut slots: Vec<Option<SequenceReport>> = vec![None; sequences.len()];
        let fallback: Vec<SequenceReport> = sequences.iter().map(skipped_sequence).collect();
        let mut set = JoinSet::new();

        for (index, sequence) in sequences.into_iter().enumerate() {
            let suite = Arc::clone(suite);
            let executor = self.executor.clone();
            set.spawn(async move {
                let report = SequenceRunner::new(&executor, &suite).run(&sequence).await;
                (index, report)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => error!(suite = %suite.id(), "序列任务异常退出: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(fallback)
            .map(|(slot, fallback)| slot.unwrap_or(fallback))
            .collect()
    }
}

/// 未执行的序列：所有 Call 记为跳过
fn skipped_sequence(sequence: &CallSequence) -> SequenceReport {
    SequenceReport {
        name: sequence.name.clone(),
        source: sequence.source_path.clone(),
        calls: sequence
            .calls
            .iter()
            .map(|c| CallReport::skipped(c.id, &c.name, c.method.as_str(), &c.url))
            .collect(),
        duration: Default::default(),
    }
}
