use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::error::TestFailure;
use crate::model::AttemptTokens;
use crate::variable::store::VariableLookup;

/// 占位符所在的位置，用于错误提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldContext {
    Url,
    RequestBody,
    Header,
    Condition,
    LogMessage,
}

impl fmt::Display for FieldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldContext::Url => "URL",
            FieldContext::RequestBody => "REQUEST",
            FieldContext::Header => "HEADER",
            FieldContext::Condition => "TEST_CONDITION",
            FieldContext::LogMessage => "LOG_MESSAGE",
        };
        write!(f, "{}", name)
    }
}

/// `{name}` 占位符解析器
pub struct FieldResolver;

impl FieldResolver {
    /// 从左到右提取 `{...}` 中不含 `:` 的名称，去重并保持出现顺序
    ///
    /// 每个 `{` 只与它之后最近的 `}` 配对，所以 JSON 体 `{"id": "{id}"}` 只会得到 `id`。
    pub fn placeholders(template: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut index = 0;

        while let Some(offset) = template[index..].find('{') {
            let start = index + offset;
            if let Some(len) = template[start + 1..].find('}') {
                let field = &template[start + 1..start + 1 + len];
                if !field.is_empty() && !field.contains(':') && !names.iter().any(|n| n == field)
                {
                    names.push(field.to_string());
                }
            }
            index = start + 1;
        }

        names
    }

    /// 替换模板中的全部占位符，查不到时返回带修复提示的失败
    pub fn resolve(
        template: &str,
        context: FieldContext,
        lookup: &dyn VariableLookup,
    ) -> Result<String, TestFailure> {
        let mut resolved = template.to_string();
        for name in Self::placeholders(template) {
            let value = lookup
                .lookup(&name)
                .ok_or_else(|| TestFailure::Unresolved {
                    name: name.clone(),
                    context,
                })?;
            resolved = resolved.replace(&format!("{{{}}}", name), &value);
        }
        Ok(resolved)
    }

    /// 占位符替换后再替换保留 token
    pub fn resolve_with_tokens(
        template: &str,
        context: FieldContext,
        lookup: &dyn VariableLookup,
        tokens: &AttemptTokens,
    ) -> Result<String, TestFailure> {
        Self::resolve(template, context, lookup).map(|text| tokens.apply(&text))
    }

    pub fn resolve_optional(
        template: Option<&str>,
        context: FieldContext,
        lookup: &dyn VariableLookup,
        tokens: &AttemptTokens,
    ) -> Result<Option<String>, TestFailure> {
        template
            .map(|t| Self::resolve_with_tokens(t, context, lookup, tokens))
            .transpose()
    }
}

/// 配置文件中的系统环境变量替换
pub struct VariableResolver;

impl VariableResolver {
    /// 解析并替换系统环境变量 ${VAR}，未设置的保持原样
    pub fn resolve_env_vars(text: &str) -> String {
        static ENV_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = ENV_REGEX.get_or_init(|| {
            Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid")
        });

        re.replace_all(text, |caps: &Captures| {
            let env_name = &caps[1];
            std::env::var(env_name).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string()
    }
}
