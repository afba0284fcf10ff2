use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use restassay::TestFailure;
use restassay::http::{CallResponse, OutboundRequest, Transport, TransportError};
use restassay::model::{Call, CallSequence, VariableDecl};
use restassay::runner::{SuiteRegistry, SuiteRunner};
use restassay::variable::{FieldContext, VariableContext};

/// 记录每个请求的 URL，响应体由路径决定
#[derive(Default)]
struct EchoTransport {
    urls: Mutex<Vec<String>>,
}

impl EchoTransport {
    fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for EchoTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<CallResponse, TransportError> {
        self.urls.lock().unwrap().push(request.url.clone());
        let body = if request.url.ends_with("/sessions") {
            r#"{"session": {"id": "s/9 x", "owner": "ann"}}"#
        } else {
            "{}"
        };
        Ok(CallResponse::new(200, body))
    }
}

fn runner(transport: Arc<EchoTransport>) -> SuiteRunner {
    SuiteRunner::new(Arc::new(SuiteRegistry::new()), transport).with_base_url("http://api.test")
}

/// JSONPath 提取的值原样代入下一个 Call 的 URL
#[tokio::test]
async fn test_extracted_value_substituted_verbatim() {
    let transport = Arc::new(EchoTransport::default());
    let sequence = CallSequence::new("sessions")
        .with_call(
            Call::new(1, "open")
                .with_url("/sessions")
                .with_variable(VariableDecl::local("sid", "$.session.id")),
        )
        .with_call(Call::new(2, "read").with_url("/sessions/{sid}/items"));

    let report = runner(transport.clone()).run("suite", vec![sequence]).await;
    assert!(report.passed(), "{:?}", report.sequences[0].calls[1].failure);
    assert_eq!(
        transport.urls()[1],
        "http://api.test/sessions/s/9%20x/items"
    );
}

/// local 变量对其他序列不可见，shared 变量对之后的所有序列可见
#[tokio::test]
async fn test_local_and_shared_visibility_across_sequences() {
    let transport = Arc::new(EchoTransport::default());
    let first = CallSequence::new("a").with_call(
        Call::new(1, "open")
            .with_url("/sessions")
            .with_variable(VariableDecl::local("owner", "$.session.owner"))
            .with_variable(VariableDecl::shared("sid", "$.session.id")),
    );
    let uses_shared =
        CallSequence::new("b").with_call(Call::new(2, "read").with_url("/items?session={sid}"));
    let uses_local =
        CallSequence::new("c").with_call(Call::new(3, "owner").with_url("/owners/{owner}"));

    let report = runner(transport.clone())
        .run("suite", vec![first, uses_shared, uses_local])
        .await;

    assert!(report.sequences[0].passed());
    assert!(report.sequences[1].passed());
    assert!(matches!(
        &report.sequences[2].calls[0].failure,
        Some(TestFailure::Unresolved { name, context: FieldContext::Url }) if name == "owner"
    ));
    // 第三个序列没有发出请求
    assert_eq!(transport.urls().len(), 2);
}

/// 同名变量：local 优先于 shared
#[tokio::test]
async fn test_local_shadows_shared() {
    let transport = Arc::new(EchoTransport::default());
    let mut seed = VariableContext::new();
    seed.insert("tenant", "shared-tenant");

    let sequence = CallSequence::new("shadow")
        .with_call(Call::new(1, "shared").with_url("/t/{tenant}"))
        .with_call(
            Call::new(2, "local")
                .with_url("/t/{tenant}")
                .with_variable(VariableDecl::local("tenant", "local-tenant")),
        );

    let report = runner(transport.clone())
        .with_seed(seed)
        .run("suite", vec![sequence])
        .await;
    assert!(report.passed());
    assert_eq!(
        transport.urls(),
        vec![
            "http://api.test/t/shared-tenant".to_string(),
            "http://api.test/t/local-tenant".to_string(),
        ]
    );
}

/// RANDOM_VALUE 在同一个 Call 的 URL 与请求体中取相同的值
#[tokio::test]
async fn test_reserved_tokens_consistent_within_call() {
    let transport = Arc::new(EchoTransport::default());
    let sequence = CallSequence::new("tokens").with_call(
        Call::new(1, "create")
            .with_url("/users/u-RANDOM_VALUE")
            .with_variable(VariableDecl::local("name", "u-RANDOM_VALUE")),
    );

    let report = runner(transport.clone()).run("suite", vec![sequence]).await;
    assert!(report.passed());

    let url = &transport.urls()[0];
    let suffix = url.rsplit("u-").next().unwrap();
    assert!(suffix.parse::<u32>().is_ok(), "{}", url);
    assert!(!url.contains("RANDOM_VALUE"));
}
