use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ResponseRule {
    #[serde(rename = "type")]
    rule_type: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    value: String,
}

/// Evaluates a probe's assertions against the captured response.
///
/// Passes iff the status code is in the expected set and every response
/// rule holds, in order. Unknown rule types and malformed rule
/// specifications fail the assertion.
pub fn evaluate(
    expected_status: &[u16],
    rules_spec: &serde_json::Value,
    status_code: u16,
    body: &str,
) -> bool {
    if !expected_status.contains(&status_code) {
        return false;
    }

    let rules: Vec<ResponseRule> = match rules_spec {
        serde_json::Value::Null => Vec::new(),
        spec => match serde_json::from_value(spec.clone()) {
            Ok(rules) => rules,
            Err(_) => return false,
        },
    };

    rules.iter().all(|rule| check_rule(rule, body))
}

fn check_rule(rule: &ResponseRule, body: &str) -> bool {
    match rule.rule_type.as_str() {
        "contains" => body.contains(&rule.value),
        "json_path_exists" => json_path_exists(body, &rule.path),
        "regex" => match regex::Regex::new(&rule.value) {
            Ok(re) => re.is_match(body),
            Err(_) => false,
        },
        _ => false,
    }
}

/// True iff the body parses as JSON and `path` resolves in the document.
/// Accepts JSON-pointer paths (`/data/items/0`) and dotted paths
/// (`data.items.0`); the empty path names the document root.
fn json_path_exists(body: &str, path: &str) -> bool {
    let Ok(document) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };

    let pointer = if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path.replace('.', "/"))
    };

    document.pointer(&pointer).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_must_be_in_expected_set() {
        assert!(evaluate(&[200], &serde_json::Value::Null, 200, ""));
        assert!(!evaluate(&[200], &serde_json::Value::Null, 503, ""));
        assert!(evaluate(&[200, 204], &serde_json::Value::Null, 204, ""));
        // an empty expected set accepts nothing
        assert!(!evaluate(&[], &serde_json::Value::Null, 200, ""));
    }

    #[test]
    fn contains_rule_checks_literal_substring() {
        let spec = serde_json::json!([
            {"type": "contains", "path": "", "value": "ok"}
        ]);
        assert!(evaluate(&[200], &spec, 200, "status: ok"));
        assert!(!evaluate(&[200], &spec, 200, "down"));
    }

    #[test]
    fn rules_are_evaluated_in_order_and_all_must_pass() {
        let spec = serde_json::json!([
            {"type": "contains", "path": "", "value": "healthy"},
            {"type": "contains", "path": "", "value": "db"}
        ]);
        assert!(evaluate(&[200], &spec, 200, "db healthy"));
        assert!(!evaluate(&[200], &spec, 200, "healthy"));
    }

    #[test]
    fn json_path_rule_resolves_dotted_and_pointer_paths() {
        let body = r#"{"data": {"items": [{"id": 7}]}, "status": "up"}"#;
        let dotted = serde_json::json!([
            {"type": "json_path_exists", "path": "data.items.0.id", "value": ""}
        ]);
        let pointer = serde_json::json!([
            {"type": "json_path_exists", "path": "/data/items/0/id", "value": ""}
        ]);
        let missing = serde_json::json!([
            {"type": "json_path_exists", "path": "data.missing", "value": ""}
        ]);

        assert!(evaluate(&[200], &dotted, 200, body));
        assert!(evaluate(&[200], &pointer, 200, body));
        assert!(!evaluate(&[200], &missing, 200, body));
    }

    #[test]
    fn json_path_rule_fails_on_non_json_body() {
        let spec = serde_json::json!([
            {"type": "json_path_exists", "path": "status", "value": ""}
        ]);
        assert!(!evaluate(&[200], &spec, 200, "plain text"));
    }

    #[test]
    fn regex_rule_matches_body() {
        let spec = serde_json::json!([
            {"type": "regex", "path": "", "value": r"uptime: \d+s"}
        ]);
        assert!(evaluate(&[200], &spec, 200, "uptime: 420s"));
        assert!(!evaluate(&[200], &spec, 200, "uptime: unknown"));
    }

    #[test]
    fn invalid_regex_fails_the_assertion() {
        let spec = serde_json::json!([
            {"type": "regex", "path": "", "value": "("}
        ]);
        assert!(!evaluate(&[200], &spec, 200, "anything"));
    }

    #[test]
    fn unknown_rule_type_fails() {
        let spec = serde_json::json!([
            {"type": "xpath", "path": "//status", "value": "up"}
        ]);
        assert!(!evaluate(&[200], &spec, 200, "up"));
    }

    #[test]
    fn malformed_rules_spec_fails() {
        let spec = serde_json::json!({"not": "a list"});
        assert!(!evaluate(&[200], &spec, 200, "ok"));
    }
}
