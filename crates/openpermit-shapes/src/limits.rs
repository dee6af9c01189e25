//! Structural limits checked before shape evaluation
//!
//! Inbound documents come from any room member. Oversized or deeply nested
//! documents are reported as violations before the schema engine sees them.

use serde_json::Value;

/// Maximum nesting depth of a document
pub const MAX_DEPTH: usize = 64;

/// Maximum number of members in one array
pub const MAX_ARRAY_MEMBERS: usize = 10_000;

/// Maximum number of properties in one object
pub const MAX_OBJECT_PROPERTIES: usize = 10_000;

/// First structural limit a document breaks, as a diagnostic line
pub fn check_limits(value: &Value) -> Option<String> {
    walk(value, "", 0)
}

fn walk(value: &Value, path: &str, depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return Some(format!(
            "{}: nesting exceeds {MAX_DEPTH} levels",
            format_path(path)
        ));
    }

    match value {
        Value::Array(items) => {
            if items.len() > MAX_ARRAY_MEMBERS {
                return Some(format!(
                    "{}: array has {} members, limit is {MAX_ARRAY_MEMBERS}",
                    format_path(path),
                    items.len()
                ));
            }
            items
                .iter()
                .enumerate()
                .find_map(|(i, item)| walk(item, &format!("{path}[{i}]"), depth + 1))
        }
        Value::Object(map) => {
            if map.len() > MAX_OBJECT_PROPERTIES {
                return Some(format!(
                    "{}: object has {} properties, limit is {MAX_OBJECT_PROPERTIES}",
                    format_path(path),
                    map.len()
                ));
            }
            map.iter()
                .find_map(|(key, item)| walk(item, &format!("{path}.{key}"), depth + 1))
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => None,
    }
}

fn format_path(path: &str) -> String {
    format!("${path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_ordinary_documents() {
        let doc = json!({"permitId": "P-1", "payload": {"items": [1, 2, 3]}});
        assert_eq!(check_limits(&doc), None);
    }

    #[test]
    fn reports_deep_nesting_with_path() {
        let mut doc = json!("leaf");
        for _ in 0..=MAX_DEPTH {
            doc = json!({ "n": doc });
        }
        let diagnostic = check_limits(&doc).unwrap();
        assert!(diagnostic.starts_with("$.n"));
        assert!(diagnostic.contains("nesting"));
    }

    #[test]
    fn reports_oversized_arrays() {
        let doc = json!({ "payload": { "items": vec![0; MAX_ARRAY_MEMBERS + 1] } });
        let diagnostic = check_limits(&doc).unwrap();
        assert!(diagnostic.starts_with("$.payload.items"));
    }
}
