//! Field-level merge rules over JSON values.

use chrono::{DateTime, Utc};
use mindsync_core::models::MergeRule;
use serde_json::{Map, Value};

/// Combine the two sides of one field. A missing (`Null`) side yields the other.
pub fn apply_rule(rule: MergeRule, server: &Value, client: &Value, separator: &str) -> Value {
    if server.is_null() {
        return client.clone();
    }
    if client.is_null() {
        return server.clone();
    }
    match rule {
        MergeRule::ArrayUnion => array_union(server, client),
        MergeRule::ObjectMerge => object_merge(server, client),
        MergeRule::TextConcatenate => concatenate(server, client, separator),
        MergeRule::Maximum => maximum(server, client),
        MergeRule::PreferServer => server.clone(),
        MergeRule::PreferClient | MergeRule::None => client.clone(),
    }
}

/// Client elements first, then server elements the client lacks.
fn array_union(server: &Value, client: &Value) -> Value {
    match (server, client) {
        (Value::Array(s), Value::Array(c)) => {
            let mut out = c.clone();
            for item in s {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            Value::Array(out)
        }
        _ => client.clone(),
    }
}

/// Union of keys. Shared numeric keys keep the larger number, anything else
/// shared takes the client value.
fn object_merge(server: &Value, client: &Value) -> Value {
    match (server, client) {
        (Value::Object(s), Value::Object(c)) => {
            let mut out: Map<String, Value> = s.clone();
            for (key, client_value) in c {
                let merged = match (out.get(key), client_value) {
                    (Some(Value::Number(a)), Value::Number(b)) => {
                        if a.as_f64().unwrap_or(f64::MIN) > b.as_f64().unwrap_or(f64::MIN) {
                            Value::Number(a.clone())
                        } else {
                            Value::Number(b.clone())
                        }
                    }
                    _ => client_value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        _ => client.clone(),
    }
}

fn concatenate(server: &Value, client: &Value, separator: &str) -> Value {
    match (server.as_str(), client.as_str()) {
        (Some(s), Some(c)) => {
            let text = if c.is_empty() || s.contains(c) {
                s.to_string()
            } else if s.is_empty() || c.contains(s) {
                c.to_string()
            } else {
                format!("{s}{separator}{c}")
            };
            Value::String(text)
        }
        _ => client.clone(),
    }
}

/// Larger number, or later RFC 3339 timestamp.
fn maximum(server: &Value, client: &Value) -> Value {
    match (server, client) {
        (Value::Number(a), Value::Number(b)) => {
            if a.as_f64().unwrap_or(f64::MIN) > b.as_f64().unwrap_or(f64::MIN) {
                server.clone()
            } else {
                client.clone()
            }
        }
        (Value::String(a), Value::String(b)) => {
            match (parse_timestamp(a), parse_timestamp(b)) {
                (Some(sa), Some(sb)) if sa > sb => server.clone(),
                _ => client.clone(),
            }
        }
        _ => client.clone(),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Whether `side` survives inside `resolved`: equal, an array subset, an
/// object whose entries all survive, or a substring of resolved text.
/// Counters nested in objects survive when the resolved count is not smaller.
pub fn is_preserved(side: &Value, resolved: &Value) -> bool {
    if side == resolved || side.is_null() {
        return true;
    }
    match (side, resolved) {
        (Value::Array(s), Value::Array(r)) => s.iter().all(|item| r.contains(item)),
        (Value::Object(s), Value::Object(r)) => s.iter().all(|(key, value)| {
            r.get(key).is_some_and(|kept| match (value, kept) {
                (Value::Number(a), Value::Number(b)) => {
                    b.as_f64().unwrap_or(f64::MIN) >= a.as_f64().unwrap_or(f64::MAX)
                }
                _ => is_preserved(value, kept),
            })
        }),
        (Value::String(s), Value::String(r)) => r.contains(s.as_str()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_union_keeps_client_order_first() {
        let merged = apply_rule(MergeRule::ArrayUnion, &json!([1, 2]), &json!([3, 1]), "\n\n");
        assert_eq!(merged, json!([3, 1, 2]));
    }

    #[test]
    fn object_merge_keeps_larger_numbers() {
        let merged = apply_rule(
            MergeRule::ObjectMerge,
            &json!({"phone-1": 90, "web-1": 5}),
            &json!({"phone-1": 60, "tablet-1": 30}),
            "\n\n",
        );
        assert_eq!(merged, json!({"phone-1": 90, "tablet-1": 30, "web-1": 5}));
    }

    #[test]
    fn text_concatenation_skips_contained_text() {
        let sep = "\n\n";
        assert_eq!(
            apply_rule(MergeRule::TextConcatenate, &json!("a"), &json!("b"), sep),
            json!("a\n\nb")
        );
        assert_eq!(
            apply_rule(MergeRule::TextConcatenate, &json!("a"), &json!("a b"), sep),
            json!("a b")
        );
        assert_eq!(
            apply_rule(MergeRule::TextConcatenate, &json!(""), &json!("b"), sep),
            json!("b")
        );
    }

    #[test]
    fn maximum_understands_timestamps() {
        let later = apply_rule(
            MergeRule::Maximum,
            &json!("2024-01-01T10:00:00Z"),
            &json!("2024-01-01T09:00:00Z"),
            "",
        );
        assert_eq!(later, json!("2024-01-01T10:00:00Z"));
    }

    #[test]
    fn preservation_checks() {
        assert!(is_preserved(&json!([1]), &json!([1, 2])));
        assert!(!is_preserved(&json!([3]), &json!([1, 2])));
        assert!(is_preserved(&json!("b"), &json!("a\n\nb")));
        assert!(!is_preserved(&json!(4), &json!(5)));
        assert!(is_preserved(&json!({"phone-1": 60}), &json!({"phone-1": 90})));
        assert!(!is_preserved(
            &json!({"theme": {"value": "dark"}}),
            &json!({"theme": {"value": "light"}})
        ));
    }
}
