//! Per-item validation of API responses.
//!
//! List responses are decoded item by item so one malformed entry is logged and dropped
//! instead of failing the whole list.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::error;

/// Decode every item that matches `T`, logging and dropping the others.
pub fn decode_items<T: DeserializeOwned>(type_name: &str, items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| decode_item(type_name, item))
        .collect()
}

/// Decode a single item, logging why it was rejected.
pub fn decode_item<T: DeserializeOwned>(type_name: &str, item: Value) -> Option<T> {
    if !item.is_object() {
        error!(type_name, "{type_name} should be an object");
        return None;
    }
    match serde_json::from_value(item) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(type_name, "Invalid {type_name}: {e}");
            None
        }
    }
}

/// Read an array field of a response object. A missing field is an empty list.
pub fn array_field(body: &mut Value, field: &str) -> Vec<Value> {
    match body.get_mut(field).map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            error!(field, "Expected an array for \"{field}\", got {other}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlainProject;
    use serde_json::json;

    #[test]
    fn test_invalid_items_are_dropped() {
        let items = vec![
            json!({"id": "prj_1", "name": "web", "createdAt": 1, "accountId": "team_1"}),
            json!({"id": "prj_2", "name": "api"}),
            json!("not an object"),
            json!({"id": "prj_3", "name": "docs", "createdAt": 2, "accountId": "team_1"}),
        ];

        let projects: Vec<PlainProject> = decode_items("Project", items);
        let ids: Vec<&str> = projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["prj_1", "prj_3"]);
    }

    #[test]
    fn test_array_field() {
        let mut body = json!({"projects": [1, 2], "teams": null, "checks": {}});
        assert_eq!(array_field(&mut body, "projects").len(), 2);
        assert!(array_field(&mut body, "teams").is_empty());
        assert!(array_field(&mut body, "checks").is_empty());
        assert!(array_field(&mut body, "missing").is_empty());
    }
}
