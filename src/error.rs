use thiserror::Error;

use crate::variable::FieldContext;

#[derive(Error, Debug)]
pub enum RestAssayError {
    #[error("解析错误: {0}")]
    ParseError(String),

    #[error("无效的 URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP 请求失败: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL 解析错误: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for RestAssayError {
    fn from(err: anyhow::Error) -> Self {
        RestAssayError::Other(err.to_string())
    }
}

impl From<crate::parser::ParseError> for RestAssayError {
    fn from(err: crate::parser::ParseError) -> Self {
        RestAssayError::ParseError(err.to_string())
    }
}

/// Result type for restassay crate
pub type Result<T> = std::result::Result<T, RestAssayError>;

/// 单个 Call 的测试失败原因
///
/// 所有失败都只中止当前的 Call 序列，不影响同一 suite 中的其他序列。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TestFailure {
    #[error(
        "Unable to find the dynamic field {{{name}}} used in {context}\n\
         Resolve this issue by initializing the field in TEST_VARS or SUITE_VARS\n\
         1. [ .., {name}=<some constant value>] or\n\
         2. [ .., {name}=<JSON PATH>]"
    )]
    Unresolved { name: String, context: FieldContext },

    #[error("Expected request status {expected}, but current request status is {actual}")]
    StatusMismatch { expected: u16, actual: u16 },

    #[error("{kind} response mismatch:\n{details}\n\nExpected: {expected}\nCurrent: {actual}")]
    BodyMismatch {
        kind: BodyKind,
        details: String,
        expected: String,
        actual: String,
    },

    #[error("Evaluation result of test condition is false for: {condition}")]
    ConditionFalse { condition: String },

    #[error("Errors while evaluating test condition {condition}: {message}")]
    ConditionError { condition: String, message: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Unable to extract variable '{variable}': {message}")]
    Extraction { variable: String, message: String },

    #[error("This poll request has been unsuccessful after {attempts} attempt(s)!\n{last}")]
    PollExhausted {
        attempts: usize,
        last: Box<TestFailure>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authenticator failure: {0}")]
    Authenticator(String),
}

impl TestFailure {
    /// poll 循环中是否可以重试
    ///
    /// 提取失败说明响应结构已经损坏，占位符缺失和配置错误重试也无法恢复。
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            TestFailure::Extraction { .. }
                | TestFailure::Unresolved { .. }
                | TestFailure::Configuration(_)
        )
    }
}

/// 响应体比较器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum BodyKind {
    Json,
    Xml,
    Text,
}

impl std::fmt::Display for BodyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyKind::Json => write!(f, "JSON"),
            BodyKind::Xml => write!(f, "XML"),
            BodyKind::Text => write!(f, "Text"),
        }
    }
}
