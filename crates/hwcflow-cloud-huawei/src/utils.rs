//! JSON helpers shared by the resource adapters

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Look up a value by a dotted path with optional indexes,
/// e.g. `results[0].error_code` or `scaling_group.networks[1].id`
///
/// Returns `None` when any step is missing or the value is `null`.
pub fn path_search<'a>(path: &str, value: &'a Value) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        let (key, indexes) = split_indexes(segment)?;
        if !key.is_empty() {
            current = current.as_object()?.get(key)?;
        }
        for index in indexes {
            current = current.as_array()?.get(index)?;
        }
    }
    Some(current).filter(|v| !v.is_null())
}

fn split_indexes(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(open) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };
    let key = &segment[..open];
    let mut indexes = Vec::new();
    let mut rest = &segment[open..];
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        indexes.push(inner[..close].trim().parse().ok()?);
        rest = &inner[close + 1..];
    }
    Some((key, indexes))
}

/// String at `path`; numbers and booleans are rendered as text
pub fn path_str(path: &str, value: &Value) -> Option<String> {
    match path_search(path, value)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// String at `path`, empty when absent
pub fn path_string(path: &str, value: &Value) -> String {
    path_str(path, value).unwrap_or_default()
}

/// Integer at `path`, also accepting numeric strings
pub fn path_i64(path: &str, value: &Value) -> Option<i64> {
    match path_search(path, value)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn path_bool(path: &str, value: &Value) -> Option<bool> {
    match path_search(path, value)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Array at `path`, empty when absent
pub fn path_array<'a>(path: &str, value: &'a Value) -> &'a [Value] {
    match path_search(path, value) {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// Drop `null` members recursively, along with objects left empty inside arrays
pub fn remove_nil(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(remove_nil_map(map)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(remove_nil)
                .filter(|v| !matches!(v, Value::Object(m) if m.is_empty()))
                .collect(),
        ),
        other => other,
    }
}

fn remove_nil_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k, remove_nil(v)))
        .collect()
}

/// The value itself, or `null` when it is absent or a zero value
///
/// Used when building request bodies so that unset optional attributes are
/// left out after [`remove_nil`].
pub fn value_ignore_empty(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Null,
        Some(Value::String(s)) if s.is_empty() => Value::Null,
        Some(Value::Array(items)) if items.is_empty() => Value::Null,
        Some(Value::Object(map)) if map.is_empty() => Value::Null,
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => Value::Null,
        Some(Value::Bool(false)) => Value::Null,
        Some(other) => other.clone(),
    }
}

/// `{k: v}` tags as the `[{"key": k, "value": v}]` list the APIs expect
pub fn expand_resource_tags(tags: &BTreeMap<String, String>) -> Vec<Value> {
    tags.iter()
        .map(|(k, v)| json!({"key": k, "value": v}))
        .collect()
}

/// Inverse of [`expand_resource_tags`]
pub fn flatten_tag_list(tags: &[Value]) -> Map<String, Value> {
    tags.iter()
        .filter_map(|tag| {
            let key = path_str("key", tag)?;
            let value = path_string("value", tag);
            Some((key, Value::String(value)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_search() {
        let body = json!({
            "results": [{"id": "job-1", "error_code": "DRS.M00289"}],
            "job": {"status": "CONFIGURATION", "count": 3},
            "empty": null,
        });

        assert_eq!(path_string("results[0].error_code", &body), "DRS.M00289");
        assert_eq!(path_string("job.status", &body), "CONFIGURATION");
        assert_eq!(path_str("job.count", &body).as_deref(), Some("3"));
        assert_eq!(path_i64("job.count", &body), Some(3));
        assert!(path_search("results[1].id", &body).is_none());
        assert!(path_search("job.status.deeper", &body).is_none());
        assert!(path_search("empty", &body).is_none());
        assert!(path_search("results[x]", &body).is_none());
    }

    #[test]
    fn test_nested_indexes() {
        let body = json!({"matrix": [[1, 2], [3, 4]]});
        assert_eq!(path_i64("matrix[1][0]", &body), Some(3));
    }

    #[test]
    fn test_remove_nil() {
        let body = json!({
            "name": "group",
            "description": null,
            "networks": [{"id": null}, {"id": "net-1", "ipv6_bandwidth": null}],
            "nested": {"keep": 0, "drop": null},
        });
        assert_eq!(
            remove_nil(body),
            json!({
                "name": "group",
                "networks": [{"id": "net-1"}],
                "nested": {"keep": 0},
            })
        );
    }

    #[test]
    fn test_value_ignore_empty() {
        assert_eq!(value_ignore_empty(Some(&json!(""))), Value::Null);
        assert_eq!(value_ignore_empty(Some(&json!(0))), Value::Null);
        assert_eq!(value_ignore_empty(Some(&json!([]))), Value::Null);
        assert_eq!(value_ignore_empty(None), Value::Null);
        assert_eq!(value_ignore_empty(Some(&json!("x"))), json!("x"));
        assert_eq!(value_ignore_empty(Some(&json!(5))), json!(5));
    }

    #[test]
    fn test_tags() {
        let mut tags = BTreeMap::new();
        tags.insert("env".to_string(), "test".to_string());
        tags.insert("owner".to_string(), "".to_string());

        let list = expand_resource_tags(&tags);
        assert_eq!(
            Value::Array(list.clone()),
            json!([{"key": "env", "value": "test"}, {"key": "owner", "value": ""}])
        );

        let flat = flatten_tag_list(&list);
        assert_eq!(flat["env"], "test");
        assert_eq!(flat["owner"], "");
    }
}
