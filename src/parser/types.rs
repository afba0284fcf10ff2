use std::path::PathBuf;

use crate::model::CallSequence;

/// 解析结果：一个文件对应一个 Call 序列
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    pub sequence: CallSequence,

    /// 源文件路径（用于错误报告）
    pub source_path: Option<PathBuf>,
}

impl ParsedFile {
    pub fn new(sequence: CallSequence) -> Self {
        Self {
            sequence,
            source_path: None,
        }
    }

    /// 设置源文件路径
    pub fn with_source_path(mut self, path: PathBuf) -> Self {
        self.sequence.source_path = Some(path.clone());
        self.source_path = Some(path);
        self
    }

    pub fn into_sequence(self) -> CallSequence {
        self.sequence
    }
}

/// 解析错误类型
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 行格式错误，缺少 `=`
    #[error("Invalid format at line {line}: {message}")]
    InvalidFormat { line: usize, message: String },

    /// 未知的 key
    #[error("Unknown key '{key}' at line {line}")]
    UnknownKey { key: String, line: usize },

    /// 第一个 API_TEST 之前出现了 Call 级别的 key
    #[error("Key '{key}' at line {line} must follow an API_TEST entry")]
    OutsideCall { key: String, line: usize },

    /// 值无法解析
    #[error("Invalid value for {key} at line {line}: {message}")]
    InvalidValue {
        key: String,
        line: usize,
        message: String,
    },

    /// 无效的 HTTP 方法
    #[error("Invalid HTTP method '{method}' at line {line}")]
    InvalidMethod { method: String, line: usize },

    /// 缺少必需的 URL
    #[error("Missing API_URL for call '{name}' starting at line {line}")]
    MissingUrl { name: String, line: usize },

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 空文件或没有找到 Call
    #[error("No API_TEST entries found in file")]
    NoCalls,
}

/// 解析结果类型别名
pub type ParseResult<T> = Result<T, ParseError>;
