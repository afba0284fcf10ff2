use tracing::debug;

use crate::error::TestFailure;
use crate::model::{AttemptTokens, Call, Scope, VariableValue};
use crate::variable::extract::{extract_json_path, extract_xpath};
use crate::variable::store::{SharedVariables, store_variable};
use crate::variable::types::VariableContext;

/// 发送前写入 Call 声明的常量变量
///
/// 常量中的 RANDOM_VALUE / SYSTEM_TIME 使用本次执行的 token，
/// 因此同一 Call 的 URL、请求体与常量变量看到的是同一组值。
pub fn initialize_constants(
    call: &Call,
    tokens: &AttemptTokens,
    local: &mut VariableContext,
    shared: &SharedVariables,
) {
    for decl in call.constants() {
        if let VariableValue::Constant(raw) = &decl.value {
            let value = tokens.apply(raw);
            debug!(variable = %decl.name, scope = %decl.scope, "初始化常量变量");
            store_variable(decl.scope, &decl.name, value, local, shared);
        }
    }
}

/// 从一次响应中提取、尚未写入作用域的变量
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingVariables {
    entries: Vec<(Scope, String, String)>,
    view: VariableContext,
}

impl PendingVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: Scope, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        self.view.insert(name.clone(), value.clone());
        self.entries.push((scope, name, value));
    }

    /// 供条件解析时优先查找的视图
    pub fn as_context(&self) -> &VariableContext {
        &self.view
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按声明顺序写入各自的作用域
    pub fn commit(self, local: &mut VariableContext, shared: &SharedVariables) {
        for (scope, name, value) in self.entries {
            debug!(variable = %name, scope = %scope, "写入提取变量");
            store_variable(scope, &name, value, local, shared);
        }
    }
}

/// 按 Call 的 JSONPath / XPath 声明从响应体提取变量
pub fn extract_variables(call: &Call, body: &str) -> Result<PendingVariables, TestFailure> {
    let mut pending = PendingVariables::new();

    for decl in call.extractors() {
        let extracted = match &decl.value {
            VariableValue::JsonPath(path) => extract_json_path(path, body),
            VariableValue::XmlPath(expr) => extract_xpath(expr, body),
            VariableValue::Constant(_) => continue,
        };

        let value = extracted.map_err(|e| TestFailure::Extraction {
            variable: decl.name.clone(),
            message: e.to_string(),
        })?;
        pending.push(decl.scope, decl.name.clone(), value);
    }

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VariableDecl;

    #[test]
    fn test_constants_use_attempt_tokens_and_scopes() {
        let call = Call::new(1, "create")
            .with_variable(VariableDecl::local("user", "user-RANDOM_VALUE"))
            .with_variable(VariableDecl::shared("stamp", "SYSTEM_TIME"))
            .with_variable(VariableDecl::local("id", "$.id"));
        let tokens = AttemptTokens::fixed(5, 1000);
        let mut local = VariableContext::new();
        let shared = SharedVariables::new();

        initialize_constants(&call, &tokens, &mut local, &shared);

        assert_eq!(local.get("user"), Some("user-5"));
        assert_eq!(shared.get("stamp"), Some("1000".to_string()));
        // 提取器不在发送前处理
        assert_eq!(local.get("id"), None);
    }

    #[test]
    fn test_extract_and_commit() {
        let call = Call::new(1, "create")
            .with_variable(VariableDecl::local("id", "$.id"))
            .with_variable(VariableDecl::shared("name", "$.user.name"));
        let pending = extract_variables(&call, r#"{"id": 7, "user": {"name": "bo"}}"#).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.as_context().get("id"), Some("7"));

        let mut local = VariableContext::new();
        let shared = SharedVariables::new();
        pending.commit(&mut local, &shared);
        assert_eq!(local.get("id"), Some("7"));
        assert_eq!(shared.get("name"), Some("bo".to_string()));
        assert_eq!(local.get("name"), None);
    }

    #[test]
    fn test_extract_xpath_variable() {
        let call = Call::new(1, "get").with_variable(VariableDecl::local("sku", "XPATH:/r/item/@sku"));
        let pending = extract_variables(&call, r#"<r><item sku="A1"/></r>"#).unwrap();
        assert_eq!(pending.as_context().get("sku"), Some("A1"));
    }

    #[test]
    fn test_extract_failure_names_variable() {
        let call = Call::new(1, "get").with_variable(VariableDecl::local("id", "$.id"));
        let err = extract_variables(&call, "<html>oops</html>").unwrap_err();
        match err {
            TestFailure::Extraction { variable, .. } => assert_eq!(variable, "id"),
            other => panic!("unexpected failure: {other:?}"),
        }
        assert!(!TestFailure::Extraction {
            variable: "id".into(),
            message: String::new()
        }
        .is_retryable());
    }
}
