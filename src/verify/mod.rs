//! 响应校验：状态码 → 条件表达式 → 响应体比较

pub mod condition;
pub mod json;
pub mod string;
pub mod xml;

pub use condition::{CompareOp, ConditionError, ConditionExpr, ConditionValue, evaluate_condition, parse_condition};
pub use json::compare_json;
pub use string::strings_match;
pub use xml::compare_xml;

use tracing::debug;

use crate::error::{BodyKind, TestFailure};
use crate::http::CallResponse;
use crate::model::Call;
use crate::variable::{FieldContext, FieldResolver, VariableLookup};

impl BodyKind {
    /// 按实际响应体选择比较器：JSON 对象/数组 → XML → 文本
    pub fn classify(body: &str) -> Self {
        let trimmed = body.trim();
        let is_json = matches!(
            serde_json::from_str::<serde_json::Value>(trimmed),
            Ok(serde_json::Value::Object(_) | serde_json::Value::Array(_))
        );
        if is_json {
            BodyKind::Json
        } else if roxmltree::Document::parse(trimmed).is_ok() {
            BodyKind::Xml
        } else {
            BodyKind::Text
        }
    }
}

/// 响应校验器
pub struct Verifier;

impl Verifier {
    /// 完整校验：状态码、条件、响应体
    pub fn verify(
        call: &Call,
        response: &CallResponse,
        lookup: &dyn VariableLookup,
    ) -> Result<(), TestFailure> {
        Self::check_status(call, response)?;
        Self::check_condition(call, lookup)?;
        Self::check_body(call, &response.body)
    }

    pub fn check_status(call: &Call, response: &CallResponse) -> Result<(), TestFailure> {
        if call.expected_status != response.status {
            return Err(TestFailure::StatusMismatch {
                expected: call.expected_status,
                actual: response.status,
            });
        }
        Ok(())
    }

    /// 解析条件中的占位符后求值
    pub fn check_condition(call: &Call, lookup: &dyn VariableLookup) -> Result<(), TestFailure> {
        let Some(template) = call.condition.as_deref() else {
            return Ok(());
        };
        if template.trim().is_empty() {
            return Ok(());
        }

        let condition = FieldResolver::resolve(template, FieldContext::Condition, lookup)?;
        debug!(condition = %condition, "求值测试条件");

        match evaluate_condition(&condition) {
            Ok(true) => Ok(()),
            Ok(false) => Err(TestFailure::ConditionFalse { condition }),
            Err(e) => Err(TestFailure::ConditionError {
                condition,
                message: e.to_string(),
            }),
        }
    }

    /// 仅在 Call 打开响应比较时执行
    pub fn check_body(call: &Call, actual: &str) -> Result<(), TestFailure> {
        if !call.compare_response {
            return Ok(());
        }
        Self::compare_body(call.expected_response.as_deref(), actual)
    }

    pub fn compare_body(expected: Option<&str>, actual: &str) -> Result<(), TestFailure> {
        let expected = expected.unwrap_or_default();
        if expected.trim().is_empty() && actual.trim().is_empty() {
            return Ok(());
        }

        let kind = BodyKind::classify(actual);
        let details = match kind {
            BodyKind::Json => compare_json(expected, actual),
            BodyKind::Xml => compare_xml(expected, actual),
            BodyKind::Text => {
                if strings_match(Some(expected), Some(actual)) {
                    Vec::new()
                } else {
                    vec!["Expected and current results are not matching".to_string()]
                }
            }
        };

        if details.is_empty() {
            return Ok(());
        }
        debug!(kind = %kind, differences = details.len(), "响应体不匹配");
        Err(TestFailure::BodyMismatch {
            kind,
            details: details.join("\n\n"),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VariableContext;
    use std::time::Duration;

    fn response(status: u16, body: &str) -> CallResponse {
        CallResponse::new(status, body).with_duration(Duration::from_millis(5))
    }

    #[test]
    fn test_classify_body() {
        assert_eq!(BodyKind::classify(r#" {"a": 1} "#), BodyKind::Json);
        assert_eq!(BodyKind::classify("[1, 2]"), BodyKind::Json);
        assert_eq!(BodyKind::classify("<a>1</a>"), BodyKind::Xml);
        assert_eq!(BodyKind::classify("42"), BodyKind::Text);
        assert_eq!(BodyKind::classify("plain text"), BodyKind::Text);
    }

    #[test]
    fn test_status_checked_first() {
        let call = Call::new(1, "get")
            .with_status(201)
            .with_condition("{missing} == 1")
            .expecting("nope");
        let ctx = VariableContext::new();
        let err = Verifier::verify(&call, &response(200, "{}"), &ctx).unwrap_err();
        assert_eq!(
            err,
            TestFailure::StatusMismatch {
                expected: 201,
                actual: 200
            }
        );
    }

    #[test]
    fn test_condition_resolves_placeholders() {
        let mut ctx = VariableContext::new();
        ctx.insert("count", "5");
        let call = Call::new(1, "list").with_condition("{count} > 3");
        assert!(Verifier::verify(&call, &response(200, ""), &ctx).is_ok());

        let call = Call::new(1, "list").with_condition("{count} > 7");
        let err = Verifier::verify(&call, &response(200, ""), &ctx).unwrap_err();
        assert_eq!(
            err,
            TestFailure::ConditionFalse {
                condition: "5 > 7".to_string()
            }
        );
    }

    #[test]
    fn test_condition_errors() {
        let ctx = VariableContext::new();
        let call = Call::new(1, "list").with_condition("{count} > 3");
        assert!(matches!(
            Verifier::verify(&call, &response(200, ""), &ctx),
            Err(TestFailure::Unresolved {
                context: FieldContext::Condition,
                ..
            })
        ));

        let call = Call::new(1, "list").with_condition("status == 'ok'");
        assert!(matches!(
            Verifier::verify(&call, &response(200, ""), &ctx),
            Err(TestFailure::ConditionError { .. })
        ));
    }

    #[test]
    fn test_body_only_compared_when_enabled() {
        let ctx = VariableContext::new();
        let mut call = Call::new(1, "get").expecting(r#"{"id": 2}"#);
        call.compare_response = false;
        assert!(Verifier::verify(&call, &response(200, r#"{"id": 1}"#), &ctx).is_ok());

        call.compare_response = true;
        let err = Verifier::verify(&call, &response(200, r#"{"id": 1}"#), &ctx).unwrap_err();
        match err {
            TestFailure::BodyMismatch {
                kind,
                expected,
                actual,
                ..
            } => {
                assert_eq!(kind, BodyKind::Json);
                assert_eq!(expected, r#"{"id": 2}"#);
                assert_eq!(actual, r#"{"id": 1}"#);
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_blank_bodies_skip_comparison() {
        assert!(Verifier::compare_body(None, "  ").is_ok());
        assert!(Verifier::compare_body(Some(""), "").is_ok());
    }

    #[test]
    fn test_text_and_xml_bodies() {
        assert!(Verifier::compare_body(Some("OK"), "ok\n").is_ok());
        assert!(matches!(
            Verifier::compare_body(Some("OK"), "fail"),
            Err(TestFailure::BodyMismatch {
                kind: BodyKind::Text,
                ..
            })
        ));
        assert!(Verifier::compare_body(Some("<a><b>IGNORE_STRING</b></a>"), "<a><b>x</b></a>").is_ok());
    }
}
