use std::collections::HashMap;

use serde_json::Value;

use crate::model::tokens::{IGNORE_STRING, IGNORE_VALUE};
use crate::variable::extract::json_to_plain_string;
use crate::verify::string::strings_match;

/// 结构化 JSON 比较
///
/// 宽松模式：对象允许多余字段，数组不要求顺序且允许多余元素。
/// 返回所有差异的描述，空列表表示匹配。
pub fn compare_json(expected: &str, actual: &str) -> Vec<String> {
    let expected_text = normalize_json_text(expected);
    let actual_text = normalize_json_text(actual);

    let actual_value: Value = match serde_json::from_str(&actual_text) {
        Ok(v) => v,
        Err(e) => return vec![format!("Actual body is not valid JSON: {}", e)],
    };
    let expected_value: Value = match serde_json::from_str(&expected_text) {
        Ok(v) => v,
        Err(e) => {
            // 期望值整体是通配或纯文本时，退回字符串比较
            if strings_match(Some(expected), Some(actual)) {
                return Vec::new();
            }
            return vec![format!("Expected body is not valid JSON: {}", e)];
        }
    };

    let mut diffs = Vec::new();
    compare_values("$", &expected_value, &actual_value, &mut diffs);
    diffs
}

/// 去掉字面量 `\n`，并把转义的双引号替换为单引号
fn normalize_json_text(text: &str) -> String {
    text.replace("\\n", "").replace("\\\"", "'")
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// 叶子字符串本身不是 JSON 文档时才走字符串比较器
fn is_plain_leaf(value: &Value) -> bool {
    match value {
        Value::String(s) => serde_json::from_str::<Value>(s)
            .map(|v| !is_container(&v))
            .unwrap_or(true),
        other => !is_container(other),
    }
}

fn contains_token(value: &Value, token: &str) -> bool {
    matches!(value, Value::String(s) if s.contains(token))
}

fn compare_values(path: &str, expected: &Value, actual: &Value, diffs: &mut Vec<String>) {
    if contains_token(expected, IGNORE_STRING) {
        return;
    }

    match (expected, actual) {
        (Value::Object(expected_map), Value::Object(actual_map)) => {
            for (key, expected_child) in expected_map {
                let child_path = format!("{}.{}", path, key);
                match actual_map.get(key) {
                    Some(actual_child) => {
                        compare_values(&child_path, expected_child, actual_child, diffs)
                    }
                    None => diffs.push(format!("{}\nExpected: {}\n     but none found", path, key)),
                }
            }
        }
        (Value::Array(expected_items), Value::Array(actual_items)) => {
            if expected_items.iter().all(|v| !is_container(v)) {
                compare_scalar_arrays(path, expected_items, actual_items, diffs);
            } else {
                compare_object_arrays(path, expected_items, actual_items, diffs);
            }
        }
        (e, a) if !is_container(e) && !is_container(a) => {
            if !leaves_match(e, a) {
                diffs.push(format!(
                    "{}\nExpected: {}\n     got: {}",
                    path,
                    json_to_plain_string(e),
                    json_to_plain_string(a)
                ));
            }
        }
        (e, a) => diffs.push(format!(
            "{}\nExpected: {}\n     got: {}",
            path,
            kind_name(e),
            kind_name(a)
        )),
    }
}

fn leaves_match(expected: &Value, actual: &Value) -> bool {
    if is_plain_leaf(expected)
        && is_plain_leaf(actual)
        && strings_match(
            Some(&json_to_plain_string(expected)),
            Some(&json_to_plain_string(actual)),
        )
    {
        return true;
    }
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (e, a) => e == a,
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a JSON array",
        Value::Object(_) => "a JSON object",
    }
}

/// 标量数组按多重集合比较
fn compare_scalar_arrays(
    path: &str,
    expected: &[Value],
    actual: &[Value],
    diffs: &mut Vec<String>,
) {
    let mut used = vec![false; actual.len()];
    let mut expected_counts: Vec<(String, usize)> = Vec::new();

    for item in expected {
        if contains_token(item, IGNORE_STRING) {
            continue;
        }
        if contains_token(item, IGNORE_VALUE) {
            let token = json_to_plain_string(item);
            let hit = actual.iter().enumerate().position(|(idx, candidate)| {
                !used[idx] && strings_match(Some(&token), Some(&json_to_plain_string(candidate)))
            });
            match hit {
                Some(idx) => used[idx] = true,
                None => diffs.push(format!("{}[]\nExpected: {}\n     but none found", path, token)),
            }
            continue;
        }

        let key = item.to_string();
        match expected_counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => expected_counts.push((key, 1)),
        }
    }

    let mut actual_counts: HashMap<String, usize> = HashMap::new();
    for (idx, item) in actual.iter().enumerate() {
        if !used[idx] {
            *actual_counts.entry(item.to_string()).or_insert(0) += 1;
        }
    }

    for (key, expected_count) in expected_counts {
        let actual_count = actual_counts.get(&key).copied().unwrap_or(0);
        if actual_count == 0 {
            diffs.push(format!("{}[]\nExpected: {}\n     but none found", path, key));
        } else if actual_count < expected_count {
            diffs.push(format!(
                "{}[]: Expected {} occurrence(s) of {} but got {} occurrence(s)",
                path, expected_count, key, actual_count
            ));
        }
    }
}

/// 含对象/数组的数组：每个期望元素都要匹配一个尚未使用的实际元素
fn compare_object_arrays(
    path: &str,
    expected: &[Value],
    actual: &[Value],
    diffs: &mut Vec<String>,
) {
    let mut used = vec![false; actual.len()];

    for (index, item) in expected.iter().enumerate() {
        let hit = (0..actual.len()).find(|&idx| {
            if used[idx] {
                return false;
            }
            let mut scratch = Vec::new();
            compare_values(path, item, &actual[idx], &mut scratch);
            scratch.is_empty()
        });
        match hit {
            Some(idx) => used[idx] = true,
            None => diffs.push(format!(
                "{}[{}]\nCould not find match for element {}",
                path, index, item
            )),
        }
    }
}
