//! Suite 生命周期：共享变量、客户端、认证与 teardown

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::TestFailure;
use crate::http::SuiteClient;
use crate::perf::PerformanceTracker;
use crate::runner::registry::SuiteId;
use crate::variable::{SharedVariables, VariableContext};

/// 在 suite 开始和结束时调用，可以修改客户端的默认 header
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn set_up(&self, client: &SuiteClient) -> Result<(), TestFailure>;
    async fn tear_down(&self, client: &SuiteClient) -> Result<(), TestFailure>;
}

/// 固定 header 认证，例如 `Authorization: Bearer ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderAuthenticator {
    name: String,
    value: String,
}

impl HeaderAuthenticator {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Authenticator for HeaderAuthenticator {
    async fn set_up(&self, client: &SuiteClient) -> Result<(), TestFailure> {
        if self.name.trim().is_empty() {
            return Err(TestFailure::Authenticator(
                "auth header name is empty".to_string(),
            ));
        }
        client.add_header(&self.name, &self.value);
        Ok(())
    }

    async fn tear_down(&self, client: &SuiteClient) -> Result<(), TestFailure> {
        client.remove_header(&self.name);
        Ok(())
    }
}

/// 一个正在运行的 suite
///
/// 声明的序列全部结束后执行一次 teardown：调用认证器的 `tear_down` 并清空共享变量。
/// set-up 与 teardown 都只执行一次，之后的调用返回第一次的结果。
pub struct SuiteInstance {
    id: SuiteId,
    name: String,
    shared: SharedVariables,
    client: SuiteClient,
    authenticator: Option<Arc<dyn Authenticator>>,
    tracker: Option<Arc<dyn PerformanceTracker>>,
    declared_sequences: usize,
    completed: AtomicUsize,
    set_up_result: OnceCell<Result<(), TestFailure>>,
    tear_down_result: OnceCell<Result<(), TestFailure>>,
}

impl SuiteInstance {
    pub fn new(id: SuiteId, name: impl Into<String>, client: SuiteClient, declared_sequences: usize) -> Self {
        Self {
            id,
            name: name.into(),
            shared: SharedVariables::new(),
            client,
            authenticator: None,
            tracker: None,
            declared_sequences,
            completed: AtomicUsize::new(0),
            set_up_result: OnceCell::new(),
            tear_down_result: OnceCell::new(),
        }
    }

    /// 启动前写入共享变量的初始值（环境变量、`--var`）
    pub fn with_seed(mut self, seed: VariableContext) -> Self {
        self.shared = SharedVariables::with_seed(seed);
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

    pub fn id(&self) -> SuiteId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shared(&self) -> &SharedVariables {
        &self.shared
    }

    pub fn client(&self) -> &SuiteClient {
        &self.client
    }

    pub fn tracker(&self) -> Option<&dyn PerformanceTracker> {
        self.tracker.as_deref()
    }

    pub fn completed_sequences(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn is_torn_down(&self) -> bool {
        self.tear_down_result.initialized()
    }

    pub async fn set_up(&self) -> Result<(), TestFailure> {
        self.set_up_result
            .get_or_init(|| async {
                info!(suite = %self.id, name = %self.name, sequences = self.declared_sequences, "suite 启动");
                let result = match &self.authenticator {
                    Some(auth) => auth.set_up(&self.client).await,
                    None => Ok(()),
                };
                if result.is_ok() {
                    debug!(suite = %self.id, "认证完成");
                }
                result
            })
            .await
            .clone()
    }

    /// 序列结束时调用；最后一个序列结束时触发 teardown。
    /// 返回 `Some` 表示本次调用执行了 teardown。
    pub async fn finish_sequence(&self) -> Option<Result<(), TestFailure>> {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(suite = %self.id, completed, declared = self.declared_sequences, "序列完成");
        if completed < self.declared_sequences {
            return None;
        }
        Some(self.tear_down().await)
    }

    pub async fn tear_down(&self) -> Result<(), TestFailure> {
        self.tear_down_result
            .get_or_init(|| async {
                let result = match &self.authenticator {
                    Some(auth) => auth.tear_down(&self.client).await,
                    None => Ok(()),
                };
                self.shared.clear();
                info!(suite = %self.id, name = %self.name, "suite 结束");
                result
            })
            .await
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{CallResponse, OutboundRequest, Transport, TransportError};
    use std::sync::atomic::AtomicUsize;

    struct NoopTransport;

    #[async_trait]
    impl Transport for NoopTransport {
        async fn send(&self, _: &OutboundRequest) -> Result<CallResponse, TransportError> {
            Ok(CallResponse::new(200, ""))
        }
    }

    #[derive(Default)]
    struct CountingAuth {
        set_ups: AtomicUsize,
        tear_downs: AtomicUsize,
    }

    #[async_trait]
    impl Authenticator for CountingAuth {
        async fn set_up(&self, _: &SuiteClient) -> Result<(), TestFailure> {
            self.set_ups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn tear_down(&self, _: &SuiteClient) -> Result<(), TestFailure> {
            self.tear_downs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn suite(sequences: usize) -> SuiteInstance {
        let client = SuiteClient::new(Arc::new(NoopTransport));
        SuiteInstance::new(SuiteId::new(1234567890), "suite", client, sequences)
    }

    #[tokio::test]
    async fn test_teardown_after_last_sequence_only() {
        let auth = Arc::new(CountingAuth::default());
        let mut seed = VariableContext::new();
        seed.insert("env", "dev");
        let suite = suite(2).with_seed(seed).with_authenticator(auth.clone());

        suite.set_up().await.unwrap();
        suite.set_up().await.unwrap();
        assert_eq!(auth.set_ups.load(Ordering::SeqCst), 1);
        assert_eq!(suite.shared().get("env"), Some("dev".to_string()));

        assert!(suite.finish_sequence().await.is_none());
        assert!(!suite.is_torn_down());
        assert_eq!(suite.shared().len(), 1);

        assert!(matches!(suite.finish_sequence().await, Some(Ok(()))));
        assert!(suite.is_torn_down());
        assert!(suite.shared().is_empty());

        suite.tear_down().await.unwrap();
        assert_eq!(auth.tear_downs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_header_authenticator_adds_and_removes_header() {
        let suite = suite(1).with_authenticator(Arc::new(HeaderAuthenticator::new(
            "Authorization",
            "Bearer abc",
        )));
        suite.set_up().await.unwrap();
        assert_eq!(
            suite.client().header("authorization"),
            Some("Bearer abc".to_string())
        );

        suite.finish_sequence().await;
        assert_eq!(suite.client().header("Authorization"), None);
    }

    #[tokio::test]
    async fn test_empty_header_name_fails_set_up() {
        let suite = suite(1).with_authenticator(Arc::new(HeaderAuthenticator::new(" ", "x")));
        assert!(matches!(
            suite.set_up().await,
            Err(TestFailure::Authenticator(_))
        ));
    }
}
