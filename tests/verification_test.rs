use restassay::TestFailure;
use restassay::error::BodyKind;
use restassay::verify::{Verifier, compare_json, compare_xml, evaluate_condition, strings_match};

#[test]
fn test_scalar_arrays_compare_as_multisets() {
    let diffs = compare_json(r#"{"tags": ["a", "a", "b"]}"#, r#"{"tags": ["b", "a"]}"#);
    assert_eq!(diffs.len(), 1, "{:?}", diffs);
    assert!(diffs[0].contains("Expected 2 occurrence(s)"), "{}", diffs[0]);
    assert!(diffs[0].contains("got 1 occurrence(s)"), "{}", diffs[0]);

    let diffs = compare_json(r#"{"tags": ["a", "a", "b"]}"#, r#"{"tags": ["a", "a", "b", "b"]}"#);
    assert!(diffs.is_empty(), "{:?}", diffs);
}

#[test]
fn test_ignore_sentinels() {
    assert!(strings_match(Some("id-IGNORE_VALUE-done"), Some("id-8f3a-done")));
    assert!(strings_match(Some("id-IGNORE_VALUE-done"), Some("id--done")));
    assert!(!strings_match(Some("id-IGNORE_VALUE-done"), Some("id-8f3a-open")));

    assert!(strings_match(Some("IGNORE_STRING"), Some("anything")));
    assert!(strings_match(Some("IGNORE_STRING"), Some("")));
    assert!(strings_match(Some("IGNORE_STRING"), None));
}

#[test]
fn test_string_normalization() {
    assert!(strings_match(Some("Hello\nWorld"), Some("helloworld")));
    assert!(!strings_match(Some("Hello World"), Some("helloworld")));
    assert!(strings_match(Some("  padded "), Some("PADDED")));
}

#[test]
fn test_json_leaf_uses_string_comparator() {
    let diffs = compare_json(
        r#"{"user": {"id": "IGNORE_STRING", "ref": "order-IGNORE_VALUE"}, "n": 1}"#,
        r#"{"user": {"id": 991, "ref": "order-2024-77", "extra": true}, "n": 1.0}"#,
    );
    assert!(diffs.is_empty(), "{:?}", diffs);
}

#[test]
fn test_json_object_arrays_match_unordered() {
    let expected = r#"[{"id": 1, "name": "a"}, {"id": 2}]"#;
    let actual = r#"[{"id": 2, "name": "b"}, {"id": 1, "name": "a"}]"#;
    assert!(compare_json(expected, actual).is_empty());

    let diffs = compare_json(r#"[{"id": 3}]"#, actual);
    assert_eq!(diffs.len(), 1);
}

#[test]
fn test_xml_compare() {
    let expected = r#"<user id="IGNORE_STRING"><name>Ann</name><role>admin</role></user>"#;
    assert!(compare_xml(expected, r#"<user id="17"><name>ann</name><role>admin</role></user>"#).is_empty());

    let diffs = compare_xml(expected, r#"<user id="17"><name>Bob</name><role>admin</role></user>"#);
    assert!(!diffs.is_empty());
    assert!(diffs.iter().any(|d| d.contains("/user/name")), "{:?}", diffs);
}

#[test]
fn test_comparator_selected_by_actual_body() {
    assert_eq!(BodyKind::classify(r#"{"a": 1}"#), BodyKind::Json);
    assert_eq!(BodyKind::classify("[1, 2]"), BodyKind::Json);
    assert_eq!(BodyKind::classify("<a/>"), BodyKind::Xml);
    assert_eq!(BodyKind::classify("42"), BodyKind::Text);
    assert_eq!(BodyKind::classify("plain text"), BodyKind::Text);

    match Verifier::compare_body(Some("expected"), "different") {
        Err(TestFailure::BodyMismatch { kind, .. }) => assert_eq!(kind, BodyKind::Text),
        other => panic!("unexpected {:?}", other),
    }
    assert!(Verifier::compare_body(None, "").is_ok());
}

#[test]
fn test_conditions() {
    assert_eq!(evaluate_condition("1 < 2 && ('a' == 'a' || false)"), Ok(true));
    assert_eq!(evaluate_condition("'10' > 9"), Ok(true));
    assert_eq!(evaluate_condition("!(3 >= 3)"), Ok(false));
    assert!(evaluate_condition("1 +").is_err());
    assert!(evaluate_condition("'text'").is_err());
}
