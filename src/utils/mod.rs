// Utility functions and helpers

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Walk a dotted path (`a.b.0.c`) through a JSON value.
pub fn extract_json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(part)?;
            }
            Value::Array(arr) => {
                if let Ok(index) = part.parse::<usize>() {
                    current = arr.get(index)?;
                } else {
                    return None;
                }
            }
            _ => return None,
        }
    }

    Some(current)
}

/// Look up a claim by key in an object map. A literal key wins over a
/// dotted path, so claims such as `"ext.attr"` keep working.
pub fn lookup_claim<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(v) = map.get(key) {
        return Some(v);
    }
    let (head, rest) = key.split_once('.')?;
    extract_json_path(map.get(head)?, rest)
}

/// Hash an identifier for logging so that raw consumer ids never hit the logs.
pub fn redact(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    format!("REDACTED_{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_path() {
        let v = json!({"a": {"b": [{"c": "x"}]}});
        assert_eq!(extract_json_path(&v, "a.b.0.c"), Some(&json!("x")));
        assert_eq!(extract_json_path(&v, "a.z"), None);
        assert_eq!(extract_json_path(&v, "a.b.first"), None);
    }

    #[test]
    fn test_lookup_claim_prefers_literal_key() {
        let v = json!({"extra.unique": "literal", "extra": {"unique": "nested"}});
        let map = v.as_object().unwrap();
        assert_eq!(lookup_claim(map, "extra.unique"), Some(&json!("literal")));

        let v = json!({"extra": {"unique": "nested"}});
        let map = v.as_object().unwrap();
        assert_eq!(lookup_claim(map, "extra.unique"), Some(&json!("nested")));
        assert_eq!(lookup_claim(map, "missing"), None);
    }

    #[test]
    fn test_redact_is_stable_and_hides_input() {
        let a = redact("client-1");
        assert_eq!(a, redact("client-1"));
        assert!(a.starts_with("REDACTED_"));
        assert!(!a.contains("client-1"));
        assert_eq!(a.len(), "REDACTED_".len() + 64);
    }
}
