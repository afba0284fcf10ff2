use regex::Regex;

use crate::model::tokens::{IGNORE_STRING, IGNORE_VALUE};

/// 宽松的字符串比较
///
/// 规则依次为：
/// 1. 两边去掉首尾空白后都为空则相等
/// 2. 去掉全部换行/回车后忽略大小写相等
/// 3. 期望值包含 `IGNORE_STRING` 时无条件相等
/// 4. 期望值包含 `IGNORE_VALUE` 时，将其作为 `.*` 通配构造锚定正则整体匹配
pub fn strings_match(expected: Option<&str>, actual: Option<&str>) -> bool {
    let expected = expected.map(str::trim).unwrap_or_default();
    let actual = actual.map(str::trim).unwrap_or_default();

    if expected.is_empty() && actual.is_empty() {
        return true;
    }

    let expected = strip_line_breaks(expected);
    let actual = strip_line_breaks(actual);

    if expected.to_lowercase() == actual.to_lowercase() {
        return true;
    }

    if expected.contains(IGNORE_STRING) {
        return true;
    }

    if expected.contains(IGNORE_VALUE) {
        return wildcard_match(&expected, &actual);
    }

    false
}

fn strip_line_breaks(text: &str) -> String {
    text.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

/// 将期望值转换为锚定正则，只转义 `[]{}()`
pub fn wildcard_pattern(expected: &str) -> String {
    let mut pattern = String::with_capacity(expected.len() + 8);
    for c in expected.chars().filter(|c| *c != '^' && *c != '$') {
        if matches!(c, '[' | ']' | '{' | '}' | '(' | ')') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    format!("^{}$", pattern.replace(IGNORE_VALUE, ".*"))
}

fn wildcard_match(expected: &str, actual: &str) -> bool {
    let actual: String = actual.chars().filter(|c| *c != '^' && *c != '$').collect();
    // 期望值里其余的正则元字符按原样生效，非法表达式视为不匹配
    match Regex::new(&wildcard_pattern(expected)) {
        Ok(re) => re.is_match(&actual),
        Err(e) => {
            tracing::debug!("通配表达式无效: {}", e);
            false
        }
    }
}
