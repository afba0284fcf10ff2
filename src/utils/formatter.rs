use colored::*;

use crate::http::CallResponse;

/// 紧凑模式下直接显示的响应体长度上限
const COMPACT_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Compact,
    Verbose,
}

/// 终端中显示 Call 的响应
pub struct ResponseFormatter {
    format: ResponseFormat,
    color: bool,
}

impl ResponseFormatter {
    pub fn new(format: ResponseFormat) -> Self {
        Self {
            format,
            color: true,
        }
    }

    pub fn without_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn format(&self, response: &CallResponse) -> String {
        let mut output = vec![self.status_line(response)];
        output.push(self.paint(
            format!("Time: {}ms", response.duration.as_millis()),
            |s| s.cyan(),
        ));

        match self.format {
            ResponseFormat::Compact => {
                let body = &response.body;
                if !body.is_empty() && body.len() < COMPACT_BODY_LIMIT {
                    output.push(pretty_json(body).unwrap_or_else(|| body.to_string()));
                } else if !body.is_empty() {
                    output.push(format!("Body: {} bytes", body.len()));
                }
            }
            ResponseFormat::Verbose => {
                if !response.headers.is_empty() {
                    output.push(String::new());
                    output.push(self.paint("Headers:".to_string(), |s| s.blue().bold()));
                    for (key, value) in &response.headers {
                        output.push(self.paint(format!("   {}: {}", key, value), |s| s.blue()));
                    }
                }
                if !response.body.is_empty() {
                    output.push(String::new());
                    output.push(self.paint("Body:".to_string(), |s| s.blue().bold()));
                    output.push(pretty_json(&response.body).unwrap_or_else(|| response.body.clone()));
                }
            }
        }

        output.join("\n")
    }

    fn status_line(&self, response: &CallResponse) -> String {
        let reason = reqwest::StatusCode::from_u16(response.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");
        let line = format!("HTTP {} {}", response.status, reason)
            .trim_end()
            .to_string();
        if !self.color {
            return line;
        }
        let colored = if response.is_success() {
            line.green()
        } else if (400..500).contains(&response.status) {
            line.yellow()
        } else {
            line.red()
        };
        match self.format {
            ResponseFormat::Verbose => colored.bold().to_string(),
            ResponseFormat::Compact => colored.to_string(),
        }
    }

    fn paint(&self, text: String, style: impl FnOnce(&str) -> ColoredString) -> String {
        if self.color {
            style(&text).to_string()
        } else {
            text
        }
    }
}

/// 不是 JSON 时返回 None
fn pretty_json(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_compact_pretty_prints_short_json() {
        let response = CallResponse::new(200, r#"{"id":1}"#).with_duration(Duration::from_millis(12));
        let text = ResponseFormatter::new(ResponseFormat::Compact)
            .without_color()
            .format(&response);
        assert_eq!(text, "HTTP 200 OK\nTime: 12ms\n{\n  \"id\": 1\n}");
    }

    #[test]
    fn test_compact_summarizes_long_body() {
        let response = CallResponse::new(500, "x".repeat(300));
        let text = ResponseFormatter::new(ResponseFormat::Compact)
            .without_color()
            .format(&response);
        assert!(text.starts_with("HTTP 500 Internal Server Error"));
        assert!(text.ends_with("Body: 300 bytes"));
    }

    #[test]
    fn test_verbose_includes_headers() {
        let response = CallResponse::new(201, "created").with_header("Location", "/users/1");
        let text = ResponseFormatter::new(ResponseFormat::Verbose)
            .without_color()
            .format(&response);
        assert!(text.contains("Headers:\n   Location: /users/1"));
        assert!(text.contains("Body:\ncreated"));
    }
}
