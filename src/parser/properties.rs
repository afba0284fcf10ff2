use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::http::Method;
use crate::model::{Call, CallIdGenerator, CallSequence, Scope, VariableDecl};
use crate::parser::types::{ParseError, ParseResult, ParsedFile};

const DEFAULT_SEQUENCE_NAME: &str = "unnamed";

/// 行式测试描述文件解析器
///
/// 每行 `KEY=value`，`#` 开头的行与空行忽略，行尾 `\` 表示续行。
/// `API_TEST` 开始一个新的 Call，之后的 key 都属于该 Call。
pub struct SequenceFileParser {
    ids: CallIdGenerator,
}

/// 正在构建的 Call；`COMPARE_RESPONSE` 显式给出时优先于 `API_RESPONSE` 的默认值
struct CallBuilder {
    call: Call,
    compare: Option<bool>,
}

impl CallBuilder {
    fn finish(mut self) -> ParseResult<Call> {
        if self.call.url.trim().is_empty() {
            return Err(ParseError::MissingUrl {
                name: self.call.name,
                line: self.call.line_number,
            });
        }
        self.call.compare_response = self
            .compare
            .unwrap_or(self.call.expected_response.is_some());
        Ok(self.call)
    }
}

impl SequenceFileParser {
    pub fn new() -> Self {
        Self {
            ids: CallIdGenerator::new(),
        }
    }

    pub fn with_ids(ids: CallIdGenerator) -> Self {
        Self { ids }
    }

    /// 从文件路径解析，未设置 TEST_NAME 时使用文件名
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> ParseResult<ParsedFile> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut parsed = self.parse_content(&content)?;
        if parsed.sequence.name == DEFAULT_SEQUENCE_NAME {
            if let Some(stem) = path.file_stem() {
                parsed.sequence.name = stem.to_string_lossy().to_string();
            }
        }
        Ok(parsed.with_source_path(path.to_path_buf()))
    }

    /// 从字符串内容解析
    pub fn parse_content(&self, content: &str) -> ParseResult<ParsedFile> {
        let mut name: Option<String> = None;
        let mut calls: Vec<Call> = Vec::new();
        let mut current: Option<CallBuilder> = None;

        for (line_number, line) in logical_lines(content) {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (key, value) = match trimmed.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None if trimmed == "API_POLL" => (trimmed, ""),
                None => {
                    return Err(ParseError::InvalidFormat {
                        line: line_number,
                        message: format!("expected KEY=value, got '{}'", trimmed),
                    });
                }
            };

            match key {
                "TEST_NAME" => name = Some(value.to_string()),
                "API_TEST" => {
                    if let Some(builder) = current.take() {
                        calls.push(builder.finish()?);
                    }
                    let mut call = Call::new(self.ids.next_id(), value);
                    call.line_number = line_number;
                    current = Some(CallBuilder {
                        call,
                        compare: None,
                    });
                }
                _ => {
                    let builder = current.as_mut().ok_or_else(|| {
                        if is_call_key(key) {
                            ParseError::OutsideCall {
                                key: key.to_string(),
                                line: line_number,
                            }
                        } else {
                            ParseError::UnknownKey {
                                key: key.to_string(),
                                line: line_number,
                            }
                        }
                    })?;
                    apply_key(builder, key, value, line_number)?;
                }
            }
        }

        if let Some(builder) = current.take() {
            calls.push(builder.finish()?);
        }
        if calls.is_empty() {
            return Err(ParseError::NoCalls);
        }

        let mut sequence =
            CallSequence::new(name.unwrap_or_else(|| DEFAULT_SEQUENCE_NAME.to_string()));
        for call in calls {
            sequence.push(call);
        }
        debug!(sequence = %sequence.name, calls = sequence.len(), "解析完成");
        Ok(ParsedFile::new(sequence))
    }
}

impl Default for SequenceFileParser {
    fn default() -> Self {
        Self::new()
    }
}

fn is_call_key(key: &str) -> bool {
    matches!(
        key,
        "API_URL"
            | "API_METHOD"
            | "API_STATUS"
            | "API_REQUEST"
            | "API_RESPONSE"
            | "API_HEADERS"
            | "API_POLL"
            | "POLL_TIME"
            | "POLL_INTERVAL"
            | "WAIT_TIME"
            | "TEST_CONDITION"
            | "TEST_TYPE"
            | "COMPARE_RESPONSE"
            | "SUITE_VARS"
            | "TEST_VARS"
            | "LOG_MESSAGE"
    )
}

fn apply_key(builder: &mut CallBuilder, key: &str, value: &str, line: usize) -> ParseResult<()> {
    let call = &mut builder.call;
    match key {
        "API_URL" => call.url = value.to_string(),
        "API_METHOD" => {
            call.method = value.parse::<Method>().map_err(|_| ParseError::InvalidMethod {
                method: value.to_string(),
                line,
            })?;
        }
        "API_STATUS" => {
            call.expected_status = value.parse().map_err(|_| invalid(key, line, "expected an HTTP status code"))?;
        }
        "API_REQUEST" => call.request_body = non_empty(value),
        "API_RESPONSE" => call.expected_response = non_empty(value),
        "API_HEADERS" => {
            for entry in json_string_array(key, value, line)? {
                let (name, header_value) = entry
                    .split_once('=')
                    .ok_or_else(|| invalid(key, line, &format!("'{}' is not name=value", entry)))?;
                call.headers
                    .push((name.trim().to_string(), header_value.trim().to_string()));
            }
        }
        "API_POLL" => call.poll = !matches!(value.to_lowercase().as_str(), "false" | "off" | "no"),
        "POLL_TIME" => call.poll_duration = Some(seconds(key, value, line)?),
        "POLL_INTERVAL" => call.poll_interval = Some(seconds(key, value, line)?),
        "WAIT_TIME" => call.wait = Some(seconds(key, value, line)?),
        "TEST_CONDITION" => call.condition = non_empty(value),
        // 比较器由实际响应体决定
        "TEST_TYPE" => {}
        "COMPARE_RESPONSE" => {
            builder.compare = Some(matches!(value.to_lowercase().as_str(), "true" | "on"));
        }
        "SUITE_VARS" => push_vars(call, key, value, line, Scope::Shared)?,
        "TEST_VARS" => push_vars(call, key, value, line, Scope::Local)?,
        "LOG_MESSAGE" => call.log_message = non_empty(value),
        _ => {
            return Err(ParseError::UnknownKey {
                key: key.to_string(),
                line,
            });
        }
    }
    Ok(())
}

fn push_vars(call: &mut Call, key: &str, value: &str, line: usize, scope: Scope) -> ParseResult<()> {
    for entry in json_string_array(key, value, line)? {
        let decl = VariableDecl::parse(&entry, scope)
            .filter(|d| !d.name.is_empty())
            .ok_or_else(|| invalid(key, line, &format!("'{}' is not name=value", entry)))?;
        call.variables.push(decl);
    }
    Ok(())
}

fn json_string_array(key: &str, value: &str, line: usize) -> ParseResult<Vec<String>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(value).map_err(|e| invalid(key, line, &format!("expected a JSON array of strings ({})", e)))
}

fn seconds(key: &str, value: &str, line: usize) -> ParseResult<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| invalid(key, line, "expected whole seconds"))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn invalid(key: &str, line: usize, message: &str) -> ParseError {
    ParseError::InvalidValue {
        key: key.to_string(),
        line,
        message: message.to_string(),
    }
}

/// 合并以 `\` 结尾的续行，返回 (起始行号, 内容)
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (index, raw) in content.lines().enumerate() {
        let (start, mut text) = match pending.take() {
            Some((start, mut text)) => {
                text.push_str(raw.trim_start());
                (start, text)
            }
            None => (index + 1, raw.to_string()),
        };
        if text.ends_with('\\') {
            text.pop();
            pending = Some((start, text));
        } else {
            lines.push((start, text));
        }
    }
    if let Some(last) = pending {
        lines.push(last);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VariableValue;

    fn parser() -> SequenceFileParser {
        SequenceFileParser::with_ids(CallIdGenerator::starting_at(100))
    }

    #[test]
    fn test_parse_sequence() {
        let content = r#"
# user lifecycle
TEST_NAME=users
API_TEST=create
API_URL=/users
API_METHOD=post
API_STATUS=201
API_REQUEST={"name": "user-RANDOM_VALUE"}
API_HEADERS=["X-Trace=abc", "Accept=application/json"]
SUITE_VARS=["user_id=$.id"]

API_TEST=get
API_URL=/users/{user_id}
API_RESPONSE={"name": "IGNORE_STRING"}
TEST_VARS=["name=XPATH:/user/name", "limit=10"]
TEST_CONDITION={limit} > 5
"#;
        let parsed = parser().parse_content(content).unwrap();
        let seq = parsed.sequence;
        assert_eq!(seq.name, "users");
        assert_eq!(seq.len(), 2);

        let create = &seq.calls[0];
        assert_eq!(create.id, 100);
        assert_eq!(create.method, Method::Post);
        assert_eq!(create.expected_status, 201);
        assert_eq!(create.headers[0], ("X-Trace".to_string(), "abc".to_string()));
        assert_eq!(create.variables[0].scope, Scope::Shared);
        assert!(create.first && !create.last);
        assert!(!create.compare_response);

        let get = &seq.calls[1];
        assert_eq!(get.id, 101);
        assert_eq!(get.method, Method::Get);
        assert_eq!(get.expected_status, 200);
        assert!(get.compare_response);
        assert_eq!(
            get.variables[0].value,
            VariableValue::XmlPath("/user/name".to_string())
        );
        assert_eq!(get.condition.as_deref(), Some("{limit} > 5"));
        assert!(get.last);
    }

    #[test]
    fn test_poll_and_wait_settings() {
        let content = "API_TEST=job\nAPI_URL=/jobs/1\nAPI_POLL\nPOLL_TIME=10\nPOLL_INTERVAL=5\nWAIT_TIME=2\n";
        let call = &parser().parse_content(content).unwrap().sequence.calls[0];
        assert!(call.poll);
        assert_eq!(call.poll_duration, Some(Duration::from_secs(10)));
        assert_eq!(call.poll_interval, Some(Duration::from_secs(5)));
        assert_eq!(call.wait, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_compare_response_can_be_disabled() {
        let content = "API_TEST=a\nAPI_URL=/a\nCOMPARE_RESPONSE=off\nAPI_RESPONSE={}\n";
        let call = &parser().parse_content(content).unwrap().sequence.calls[0];
        assert!(!call.compare_response);
    }

    #[test]
    fn test_continuation_lines() {
        let content = "API_TEST=a\nAPI_URL=/a\nAPI_REQUEST={\"a\": 1, \\\n    \"b\": 2}\nAPI_STATUS=204\n";
        let call = &parser().parse_content(content).unwrap().sequence.calls[0];
        assert_eq!(call.request_body.as_deref(), Some("{\"a\": 1, \"b\": 2}"));
        assert_eq!(call.expected_status, 204);
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = parser()
            .parse_content("TEST_NAME=x\nAPI_URL=/a\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::OutsideCall { line: 2, .. }));

        let err = parser()
            .parse_content("API_TEST=a\nAPI_URL=/a\nAPI_METHOD=FETCH\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidMethod { line: 3, .. }));

        let err = parser()
            .parse_content("API_TEST=a\nAPI_URL=/a\nTEST_VARS=[\"novalue\"]\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { line: 3, .. }));

        let err = parser()
            .parse_content("API_TEST=a\nAPI_URL=/a\nBOGUS=1\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::UnknownKey { line: 3, .. }));

        let err = parser().parse_content("API_TEST=a\nAPI_METHOD=GET\n").unwrap_err();
        assert!(matches!(err, ParseError::MissingUrl { line: 1, .. }));
    }

    #[test]
    fn test_empty_file() {
        assert!(matches!(
            parser().parse_content("# nothing\n"),
            Err(ParseError::NoCalls)
        ));
    }
}
