use serde_json::Value;

/// 提取错误类型
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractError {
    #[error("Invalid path expression '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("Invalid {format} response body: {message}")]
    MalformedBody { format: &'static str, message: String },

    #[error("Unable to find value for JSON Path: {0}")]
    NotFound(String),
}

impl ExtractError {
    fn invalid(path: &str, message: impl Into<String>) -> Self {
        ExtractError::InvalidPath {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// JSONPath
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum JsonSegment {
    Child(String),
    Index(i64),
    Wildcard,
    Descendant(String),
    DescendantWildcard,
}

impl JsonSegment {
    fn is_definite(&self) -> bool {
        matches!(self, JsonSegment::Child(_) | JsonSegment::Index(_))
    }
}

/// 按 JSONPath 从响应体中取值，返回字符串形式
///
/// 支持 `$`、`.name`、`['name']`、`[n]`（可为负数）、`[*]`、`.*` 和 `..name`。
/// 确定路径选中数组时取数组第一个元素；通配路径取第一个匹配。
pub fn extract_json_path(path: &str, body: &str) -> Result<String, ExtractError> {
    let segments = parse_json_path(path)?;
    let document: Value =
        serde_json::from_str(body).map_err(|e| ExtractError::MalformedBody {
            format: "JSON",
            message: e.to_string(),
        })?;

    let mut current: Vec<&Value> = vec![&document];
    for segment in &segments {
        current = current
            .into_iter()
            .flat_map(|value| select_json(value, segment))
            .collect();
    }

    let first = current
        .first()
        .copied()
        .ok_or_else(|| ExtractError::NotFound(path.to_string()))?;

    let definite = segments.iter().all(JsonSegment::is_definite);
    let value = match first {
        Value::Array(items) if definite => items
            .first()
            .ok_or_else(|| ExtractError::NotFound(path.to_string()))?,
        other => other,
    };

    Ok(json_to_plain_string(value))
}

/// 字符串不带引号，其余值使用紧凑 JSON 形式
pub fn json_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn select_json<'a>(value: &'a Value, segment: &JsonSegment) -> Vec<&'a Value> {
    match segment {
        JsonSegment::Child(name) => value.get(name.as_str()).into_iter().collect(),
        JsonSegment::Index(index) => match value {
            Value::Array(items) => {
                let len = items.len() as i64;
                let idx = if *index < 0 { len + index } else { *index };
                if (0..len).contains(&idx) {
                    vec![&items[idx as usize]]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        },
        JsonSegment::Wildcard => children(value),
        JsonSegment::Descendant(name) => {
            let mut found = Vec::new();
            collect_descendants(value, &mut |v| {
                if let Some(child) = v.get(name.as_str()) {
                    found.push(child);
                }
            });
            found
        }
        JsonSegment::DescendantWildcard => {
            let mut found = Vec::new();
            collect_descendants(value, &mut |v| found.extend(children(v)));
            found
        }
    }
}

fn children(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    }
}

fn collect_descendants<'a>(value: &'a Value, visit: &mut dyn FnMut(&'a Value)) {
    visit(value);
    for child in children(value) {
        collect_descendants(child, visit);
    }
}

fn parse_json_path(path: &str) -> Result<Vec<JsonSegment>, ExtractError> {
    let trimmed = path.trim();
    let rest = trimmed
        .strip_prefix('$')
        .ok_or_else(|| ExtractError::invalid(path, "JSON path must start with '$'"))?;

    let chars: Vec<char> = rest.chars().collect();
    let mut segments = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' => {
                let descendant = chars.get(i + 1) == Some(&'.');
                i += if descendant { 2 } else { 1 };
                let start = i;
                while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                let segment = match (descendant, name.as_str()) {
                    (_, "") if descendant && chars.get(i) == Some(&'[') => {
                        // `..[0]` 等价于对所有后代应用下标
                        segments.push(JsonSegment::DescendantWildcard);
                        continue;
                    }
                    (_, "") => return Err(ExtractError::invalid(path, "empty property name")),
                    (true, "*") => JsonSegment::DescendantWildcard,
                    (true, _) => JsonSegment::Descendant(name),
                    (false, "*") => JsonSegment::Wildcard,
                    (false, _) => JsonSegment::Child(name),
                };
                segments.push(segment);
            }
            '[' => {
                let close = find_bracket_end(&chars, i)
                    .ok_or_else(|| ExtractError::invalid(path, "unclosed '['"))?;
                let inner: String = chars[i + 1..close].iter().collect();
                segments.push(parse_bracket(path, inner.trim())?);
                i = close + 1;
            }
            other => {
                return Err(ExtractError::invalid(
                    path,
                    format!("unexpected character '{}'", other),
                ));
            }
        }
    }

    Ok(segments)
}

fn find_bracket_end(chars: &[char], open: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, c) in chars[open + 1..].iter().enumerate() {
        match (quote, c) {
            (Some(q), c) if *c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(*c),
            (None, ']') => return Some(open + 1 + offset),
            _ => {}
        }
    }
    None
}

fn parse_bracket(path: &str, inner: &str) -> Result<JsonSegment, ExtractError> {
    if inner == "*" {
        return Ok(JsonSegment::Wildcard);
    }
    if inner.starts_with('?') || inner.starts_with('(') {
        return Err(ExtractError::invalid(path, "filter expressions are not supported"));
    }
    for quote in ['\'', '"'] {
        if let Some(name) = inner
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return Ok(JsonSegment::Child(name.to_string()));
        }
    }
    inner
        .parse::<i64>()
        .map(JsonSegment::Index)
        .map_err(|_| ExtractError::invalid(path, format!("invalid array index '{}'", inner)))
}

// ---------------------------------------------------------------------------
// XPath
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    AnyElement,
    Text,
    AnyNode,
    Attribute(String),
    AnyAttribute,
    SelfNode,
    Parent,
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    Last,
    AttrExists(String),
    AttrEquals(String, String),
    ChildEquals(String, String),
}

#[derive(Debug, Clone, PartialEq)]
struct XStep {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone)]
enum XItem<'a, 'input> {
    Node(roxmltree::Node<'a, 'input>),
    Value(String),
}

/// 按 XPath 从 XML 响应体中取值
///
/// 返回第一个匹配节点的字符串值；没有匹配时返回空串。
/// 支持绝对/相对路径、`//`、`*`、`@attr`、`text()`、`node()`、`.`、`..`，
/// 以及 `[n]`、`[last()]`、`[@a]`、`[@a='v']`、`[child='v']` 谓词。
pub fn extract_xpath(expr: &str, body: &str) -> Result<String, ExtractError> {
    let steps = parse_xpath(expr)?;
    let document =
        roxmltree::Document::parse(body.trim()).map_err(|e| ExtractError::MalformedBody {
            format: "XML",
            message: e.to_string(),
        })?;

    let mut current = vec![XItem::Node(document.root())];
    for step in &steps {
        let mut next = Vec::new();
        for item in &current {
            let XItem::Node(node) = item else {
                return Err(ExtractError::invalid(
                    expr,
                    "attribute or text values cannot have child steps",
                ));
            };
            let mut group = select_xml(*node, step);
            apply_predicates(&mut group, &step.predicates);
            for candidate in group {
                let duplicate = match &candidate {
                    XItem::Node(a) => next
                        .iter()
                        .any(|seen| matches!(seen, XItem::Node(b) if b.id() == a.id())),
                    XItem::Value(_) => false,
                };
                if !duplicate {
                    next.push(candidate);
                }
            }
        }
        current = next;
    }

    Ok(current.first().map(string_value).unwrap_or_default())
}

fn string_value(item: &XItem<'_, '_>) -> String {
    match item {
        XItem::Value(v) => v.clone(),
        XItem::Node(node) if node.is_text() => node.text().unwrap_or_default().to_string(),
        XItem::Node(node) => node
            .descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .collect(),
    }
}

fn name_matches(node: &roxmltree::Node<'_, '_>, name: &str) -> bool {
    let local = name.rsplit(':').next().unwrap_or(name);
    node.is_element() && node.tag_name().name() == local
}

fn select_xml<'a, 'input>(node: roxmltree::Node<'a, 'input>, step: &XStep) -> Vec<XItem<'a, 'input>> {
    let candidates: Vec<roxmltree::Node<'a, 'input>> = match (step.axis, &step.test) {
        (_, NodeTest::SelfNode) => vec![node],
        (_, NodeTest::Parent) => node.parent().into_iter().collect(),
        (Axis::Child, NodeTest::Attribute(_) | NodeTest::AnyAttribute) => vec![node],
        (Axis::Descendant, NodeTest::Attribute(_) | NodeTest::AnyAttribute) => {
            node.descendants().collect()
        }
        (Axis::Child, _) => node.children().collect(),
        (Axis::Descendant, _) => node.descendants().skip(1).collect(),
    };

    match &step.test {
        NodeTest::Name(name) => candidates
            .into_iter()
            .filter(|n| name_matches(n, name))
            .map(XItem::Node)
            .collect(),
        NodeTest::AnyElement => candidates
            .into_iter()
            .filter(|n| n.is_element())
            .map(XItem::Node)
            .collect(),
        NodeTest::Text => candidates
            .into_iter()
            .filter(|n| n.is_text())
            .map(XItem::Node)
            .collect(),
        NodeTest::AnyNode | NodeTest::SelfNode | NodeTest::Parent => {
            candidates.into_iter().map(XItem::Node).collect()
        }
        NodeTest::Attribute(name) => candidates
            .into_iter()
            .filter_map(|n| n.attribute(name.as_str()))
            .map(|v| XItem::Value(v.to_string()))
            .collect(),
        NodeTest::AnyAttribute => candidates
            .into_iter()
            .flat_map(|n| n.attributes().map(|a| a.value().to_string()).collect::<Vec<_>>())
            .map(XItem::Value)
            .collect(),
    }
}

fn apply_predicates(group: &mut Vec<XItem<'_, '_>>, predicates: &[Predicate]) {
    for predicate in predicates {
        let filtered: Vec<XItem<'_, '_>> = match predicate {
            Predicate::Position(n) => group.get(n.saturating_sub(1)).cloned().into_iter().collect(),
            Predicate::Last => group.last().cloned().into_iter().collect(),
            Predicate::AttrExists(attr) => group
                .iter()
                .filter(|item| matches!(item, XItem::Node(n) if n.has_attribute(attr.as_str())))
                .cloned()
                .collect(),
            Predicate::AttrEquals(attr, value) => group
                .iter()
                .filter(|item| {
                    matches!(item, XItem::Node(n) if n.attribute(attr.as_str()) == Some(value.as_str()))
                })
                .cloned()
                .collect(),
            Predicate::ChildEquals(child, value) => group
                .iter()
                .filter(|item| match item {
                    XItem::Node(n) => n.children().any(|c| {
                        name_matches(&c, child) && string_value(&XItem::Node(c)) == *value
                    }),
                    XItem::Value(_) => false,
                })
                .cloned()
                .collect(),
        };
        *group = filtered;
    }
}

fn parse_xpath(expr: &str) -> Result<Vec<XStep>, ExtractError> {
    let mut rest = expr.trim();
    if rest.is_empty() {
        return Err(ExtractError::invalid(expr, "empty XPath expression"));
    }

    let mut steps = Vec::new();
    let mut first = true;
    while !rest.is_empty() {
        let axis = if let Some(r) = rest.strip_prefix("//") {
            rest = r;
            Axis::Descendant
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
            Axis::Child
        } else if first {
            Axis::Child
        } else {
            return Err(ExtractError::invalid(expr, "expected '/' between steps"));
        };
        first = false;

        // 单独的 "/" 选中文档根
        if rest.is_empty() && axis == Axis::Child && steps.is_empty() {
            break;
        }

        let end = step_end(rest);
        let (step, remaining) = rest.split_at(end);
        steps.push(parse_step(expr, step, axis)?);
        rest = remaining;
    }

    Ok(steps)
}

fn step_end(text: &str) -> usize {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (idx, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, '/') if depth == 0 => return idx,
            _ => {}
        }
    }
    text.len()
}

fn parse_step(expr: &str, step: &str, axis: Axis) -> Result<XStep, ExtractError> {
    let (test_text, mut predicates_text) = match step.find('[') {
        Some(idx) => step.split_at(idx),
        None => (step, ""),
    };

    let test = match test_text.trim() {
        "" => return Err(ExtractError::invalid(expr, "empty location step")),
        "." => NodeTest::SelfNode,
        ".." => NodeTest::Parent,
        "*" => NodeTest::AnyElement,
        "text()" => NodeTest::Text,
        "node()" => NodeTest::AnyNode,
        "@*" => NodeTest::AnyAttribute,
        t if t.starts_with('@') => NodeTest::Attribute(t[1..].to_string()),
        t if t.contains('(') => {
            return Err(ExtractError::invalid(expr, format!("unsupported function '{}'", t)));
        }
        t => NodeTest::Name(t.to_string()),
    };

    let mut predicates = Vec::new();
    while !predicates_text.is_empty() {
        let chars: Vec<char> = predicates_text.chars().collect();
        if chars[0] != '[' {
            return Err(ExtractError::invalid(expr, "malformed predicate"));
        }
        let close = find_bracket_end(&chars, 0)
            .ok_or_else(|| ExtractError::invalid(expr, "unclosed predicate"))?;
        let inner: String = chars[1..close].iter().collect();
        predicates.push(parse_predicate(expr, inner.trim())?);
        let consumed: usize = chars[..=close].iter().map(|c| c.len_utf8()).sum();
        predicates_text = &predicates_text[consumed..];
    }

    Ok(XStep {
        axis,
        test,
        predicates,
    })
}

fn parse_predicate(expr: &str, inner: &str) -> Result<Predicate, ExtractError> {
    if inner == "last()" {
        return Ok(Predicate::Last);
    }
    if let Ok(position) = inner.parse::<usize>() {
        if position == 0 {
            return Err(ExtractError::invalid(expr, "positions start at 1"));
        }
        return Ok(Predicate::Position(position));
    }
    if let Some((left, right)) = inner.split_once('=') {
        let value = unquote(right.trim())
            .ok_or_else(|| ExtractError::invalid(expr, "predicate value must be quoted"))?;
        let left = left.trim();
        return Ok(match left.strip_prefix('@') {
            Some(attr) => Predicate::AttrEquals(attr.to_string(), value),
            None => Predicate::ChildEquals(left.to_string(), value),
        });
    }
    if let Some(attr) = inner.strip_prefix('@') {
        return Ok(Predicate::AttrExists(attr.to_string()));
    }
    Err(ExtractError::invalid(
        expr,
        format!("unsupported predicate '{}'", inner),
    ))
}

fn unquote(text: &str) -> Option<String> {
    ['\'', '"'].iter().find_map(|q| {
        text.strip_prefix(*q)
            .and_then(|s| s.strip_suffix(*q))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_JSON: &str = r#"{
        "user": {"id": 42, "name": "alice", "active": true, "nick": null},
        "tags": ["a", "b", "c"],
        "orders": [{"id": "o-1", "total": 10.5}, {"id": "o-2", "total": 3}]
    }"#;

    #[test]
    fn test_json_path_scalars() {
        assert_eq!(extract_json_path("$.user.id", USER_JSON).unwrap(), "42");
        assert_eq!(extract_json_path("$.user.name", USER_JSON).unwrap(), "alice");
        assert_eq!(extract_json_path("$.user.active", USER_JSON).unwrap(), "true");
        assert_eq!(extract_json_path("$.user.nick", USER_JSON).unwrap(), "null");
        assert_eq!(extract_json_path("$['user']['name']", USER_JSON).unwrap(), "alice");
    }

    #[test]
    fn test_json_path_indexes() {
        assert_eq!(extract_json_path("$.orders[1].id", USER_JSON).unwrap(), "o-2");
        assert_eq!(extract_json_path("$.tags[-1]", USER_JSON).unwrap(), "c");
        assert_eq!(extract_json_path("$.orders[0].total", USER_JSON).unwrap(), "10.5");
    }

    #[test]
    fn test_json_path_array_result_takes_first_element() {
        assert_eq!(extract_json_path("$.tags", USER_JSON).unwrap(), "a");
        assert_eq!(extract_json_path("$.orders[*].id", USER_JSON).unwrap(), "o-1");
        assert_eq!(extract_json_path("$..total", USER_JSON).unwrap(), "10.5");
    }

    #[test]
    fn test_json_path_object_result_is_json() {
        let out = extract_json_path("$.orders[1]", USER_JSON).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["id"], "o-2");
    }

    #[test]
    fn test_json_path_errors() {
        assert!(matches!(
            extract_json_path("$.user.missing", USER_JSON),
            Err(ExtractError::NotFound(_))
        ));
        assert!(matches!(
            extract_json_path("$.a", "not json"),
            Err(ExtractError::MalformedBody { .. })
        ));
        assert!(matches!(
            extract_json_path("user.id", USER_JSON),
            Err(ExtractError::InvalidPath { .. })
        ));
        assert!(matches!(
            extract_json_path("$.tags[?(@ == 'a')]", USER_JSON),
            Err(ExtractError::InvalidPath { .. })
        ));
    }

    const ORDER_XML: &str = r#"<order id="o-1" xmlns:x="urn:x">
        <customer type="vip"><name>Alice</name></customer>
        <item sku="A1"><qty>2</qty></item>
        <item sku="B2"><qty>5</qty></item>
        <x:note>fragile</x:note>
    </order>"#;

    #[test]
    fn test_xpath_paths() {
        assert_eq!(extract_xpath("/order/customer/name", ORDER_XML).unwrap(), "Alice");
        assert_eq!(extract_xpath("/order/@id", ORDER_XML).unwrap(), "o-1");
        assert_eq!(extract_xpath("//qty", ORDER_XML).unwrap(), "2");
        assert_eq!(extract_xpath("/order/item[2]/qty/text()", ORDER_XML).unwrap(), "5");
        assert_eq!(extract_xpath("/order/item[last()]/@sku", ORDER_XML).unwrap(), "B2");
        assert_eq!(extract_xpath("//item[@sku='B2']/qty", ORDER_XML).unwrap(), "5");
        assert_eq!(extract_xpath("//customer/@type", ORDER_XML).unwrap(), "vip");
        assert_eq!(extract_xpath("/order/x:note", ORDER_XML).unwrap(), "fragile");
        assert_eq!(extract_xpath("//item[qty='5']/@sku", ORDER_XML).unwrap(), "B2");
        assert_eq!(extract_xpath("//name/../@type", ORDER_XML).unwrap(), "vip");
    }

    #[test]
    fn test_xpath_no_match_is_empty() {
        assert_eq!(extract_xpath("/order/missing", ORDER_XML).unwrap(), "");
    }

    #[test]
    fn test_xpath_errors() {
        assert!(matches!(
            extract_xpath("/a", "<a><b></a>"),
            Err(ExtractError::MalformedBody { .. })
        ));
        assert!(matches!(
            extract_xpath("count(//item)", ORDER_XML),
            Err(ExtractError::InvalidPath { .. })
        ));
        assert!(matches!(
            extract_xpath("/order/@id/x", ORDER_XML),
            Err(ExtractError::InvalidPath { .. })
        ));
    }
}
