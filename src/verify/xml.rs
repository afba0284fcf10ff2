use roxmltree::{Document, Node};

use crate::model::tokens::IGNORE_STRING;
use crate::verify::json::compare_json;
use crate::verify::string::strings_match;

/// XML 树比较，返回差异列表
///
/// 忽略注释、处理指令和纯空白文本。文本节点不同时先尝试按 JSON 比较，
/// 再用字符串比较器；属性值不同时使用字符串比较器。
pub fn compare_xml(expected: &str, actual: &str) -> Vec<String> {
    let actual_doc = match Document::parse(actual.trim()) {
        Ok(doc) => doc,
        Err(e) => return vec![format!("Actual body is not valid XML: {}", e)],
    };
    let expected_doc = match Document::parse(expected.trim()) {
        Ok(doc) => doc,
        Err(e) => {
            if strings_match(Some(expected), Some(actual)) {
                return Vec::new();
            }
            return vec![format!("Expected body is not valid XML: {}", e)];
        }
    };

    let mut diffs = Vec::new();
    let expected_root = expected_doc.root_element();
    let actual_root = actual_doc.root_element();
    let path = format!("/{}", expected_root.tag_name().name());
    compare_elements(&path, expected_root, actual_root, &mut diffs);
    diffs
}

fn significant_children<'a, 'input>(node: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    node.children()
        .filter(|child| {
            child.is_element()
                || (child.is_text() && !child.text().unwrap_or_default().trim().is_empty())
        })
        .collect()
}

fn compare_elements(path: &str, expected: Node<'_, '_>, actual: Node<'_, '_>, diffs: &mut Vec<String>) {
    if expected.tag_name() != actual.tag_name() {
        diffs.push(format!(
            "{}: Expected element <{}> but got <{}>",
            path,
            expected.tag_name().name(),
            actual.tag_name().name()
        ));
        return;
    }

    for attr in expected.attributes() {
        match find_attribute(actual, attr.namespace(), attr.name()) {
            Some(value) if value == attr.value() || strings_match(Some(attr.value()), Some(value)) => {}
            Some(value) => diffs.push(format!(
                "{}/@{}: Expected '{}' but got '{}'",
                path,
                attr.name(),
                attr.value(),
                value
            )),
            None => diffs.push(format!("{}/@{}: Expected attribute but none found", path, attr.name())),
        }
    }
    for attr in actual.attributes() {
        if find_attribute(expected, attr.namespace(), attr.name()).is_none() {
            diffs.push(format!("{}/@{}: Unexpected attribute", path, attr.name()));
        }
    }

    let expected_children = significant_children(expected);
    if ignores_content(&expected_children) {
        return;
    }
    let actual_children = significant_children(actual);
    if expected_children.len() != actual_children.len() {
        diffs.push(format!(
            "{}: Expected {} child node(s) but got {}",
            path,
            expected_children.len(),
            actual_children.len()
        ));
    }

    for (index, (e, a)) in expected_children.iter().zip(actual_children.iter()).enumerate() {
        match (e.is_element(), a.is_element()) {
            (true, true) => {
                let position = expected_children[..index]
                    .iter()
                    .filter(|sibling| sibling.tag_name() == e.tag_name())
                    .count()
                    + 1;
                let child_path = format!("{}/{}[{}]", path, e.tag_name().name(), position);
                compare_elements(&child_path, *e, *a, diffs);
            }
            (false, false) => {
                let expected_text = e.text().unwrap_or_default().trim();
                let actual_text = a.text().unwrap_or_default().trim();
                if !texts_match(expected_text, actual_text) {
                    diffs.push(format!(
                        "{}/text(): Expected '{}' but got '{}'",
                        path, expected_text, actual_text
                    ));
                }
            }
            _ => diffs.push(format!(
                "{}: Expected {} but got {}",
                path,
                describe(*e),
                describe(*a)
            )),
        }
    }
}

/// 唯一的文本子节点含 IGNORE_STRING 时，元素内容可以是任意值（包括空）
fn ignores_content(children: &[Node<'_, '_>]) -> bool {
    matches!(children, [only] if only.is_text()
        && only.text().is_some_and(|text| text.contains(IGNORE_STRING)))
}

fn find_attribute<'a>(node: Node<'a, '_>, namespace: Option<&str>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|attr| attr.namespace() == namespace && attr.name() == name)
        .map(|attr| attr.value())
}

fn texts_match(expected: &str, actual: &str) -> bool {
    if expected == actual {
        return true;
    }
    let both_json = serde_json::from_str::<serde_json::Value>(expected).is_ok()
        && serde_json::from_str::<serde_json::Value>(actual).is_ok();
    if both_json && compare_json(expected, actual).is_empty() {
        return true;
    }
    strings_match(Some(expected), Some(actual))
}

fn describe(node: Node<'_, '_>) -> String {
    if node.is_element() {
        format!("element <{}>", node.tag_name().name())
    } else {
        format!("text '{}'", node.text().unwrap_or_default().trim())
    }
}
