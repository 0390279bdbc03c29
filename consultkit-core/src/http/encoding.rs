//! Parameter encoding for query strings, form bodies and JSON bodies.

use serde_json::{Map, Value};

/// Request parameters as handed over by callers.
pub type Parameters = Map<String, Value>;

/// Flattens `params` into `(key, value)` pairs: arrays repeat their key,
/// `null`s are dropped and nested objects are sent as JSON text.
fn flatten(params: &Parameters) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Array(items) => {
                pairs.extend(items.iter().filter_map(scalar).map(|item| (key.clone(), item)));
            }
            other => {
                if let Some(item) = scalar(other) {
                    pairs.push((key.clone(), item));
                }
            }
        }
    }
    pairs
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn join(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Query string (without `?`) for a GET request.
#[must_use]
pub fn encode_query(params: &Parameters) -> String {
    join(&flatten(params))
}

/// `application/x-www-form-urlencoded` body.
///
/// Everything outside the unreserved set is escaped, including `+`, `&`, `=`
/// and `;`, which the backend would otherwise split on.
#[must_use]
pub fn encode_form(params: &Parameters) -> String {
    join(&flatten(params))
}

/// JSON body. Top-level `null`s are dropped unless listed in `explicit_nulls`.
#[must_use]
pub fn encode_json(params: &Parameters, explicit_nulls: &[&str]) -> Value {
    Value::Object(
        params
            .iter()
            .filter(|(key, value)| !value.is_null() || explicit_nulls.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> Parameters {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_query_repeats_array_keys() {
        let query = encode_query(&params(json!({"status": [1, 2]})));
        assert_eq!(query, "status=1&status=2");
    }

    #[test]
    fn test_query_skips_nulls_and_encodes() {
        let query = encode_query(&params(json!({
            "search": "ana maría",
            "page": 2,
            "archived": false,
            "ward": null,
        })));
        assert_eq!(query, "archived=false&page=2&search=ana%20mar%C3%ADa");
    }

    #[test]
    fn test_form_escapes_reserved_characters() {
        let body = encode_form(&params(json!({"password": "a+b&c=d;e f"})));
        assert_eq!(body, "password=a%2Bb%26c%3Dd%3Be%20f");
    }

    #[test]
    fn test_empty_parameters() {
        assert_eq!(encode_query(&Parameters::new()), "");
        assert_eq!(encode_json(&Parameters::new(), &[]), json!({}));
    }

    #[test]
    fn test_json_keeps_only_listed_nulls() {
        let body = encode_json(
            &params(json!({"notes": null, "email": null, "first_name": "Ana"})),
            &["notes"],
        );
        assert_eq!(body, json!({"notes": null, "first_name": "Ana"}));
    }

    #[test]
    fn test_nested_values() {
        let pairs = flatten(&params(json!({"filter": {"a": 1}, "ids": [1, null, 3]})));
        assert_eq!(
            pairs,
            vec![
                ("filter".to_string(), r#"{"a":1}"#.to_string()),
                ("ids".to_string(), "1".to_string()),
                ("ids".to_string(), "3".to_string()),
            ]
        );
    }
}
