pub mod properties;
pub mod types;

// Re-export commonly used types
pub use properties::SequenceFileParser;
pub use types::{ParseError, ParseResult, ParsedFile};

/// 使用新的 id 生成器解析单个文件
pub fn parse_file<P: AsRef<std::path::Path>>(path: P) -> ParseResult<ParsedFile> {
    SequenceFileParser::new().parse_file(path)
}

/// 使用新的 id 生成器解析字符串内容
pub fn parse_content(content: &str) -> ParseResult<ParsedFile> {
    SequenceFileParser::new().parse_content(content)
}
