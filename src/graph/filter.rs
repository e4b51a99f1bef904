//! Simple field matching used by list, children and instance queries.

use super::node::Node;
use crate::schema::TopicDesc;
use crate::types::PKEY;
use serde_json::{Map, Value};

/// True when `node` satisfies every entry of `filter`. Keys that are not columns of the
/// topic are ignored.
pub fn node_matches(node: &Node, desc: &TopicDesc, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, expected)| {
        let col = match desc.col(key) {
            Some(col) => col,
            None => return true,
        };
        if col.is_fkey() {
            let ids: Vec<&str> = node.fkey_refs(key).iter().map(|r| r.id.as_str()).collect();
            return ids_match(&ids, expected);
        }
        if col.is_hook() {
            let ids: Vec<&str> = node.hook_refs(key).iter().map(|c| c.id.as_str()).collect();
            return ids_match(&ids, expected);
        }
        if key == PKEY {
            if let Value::Array(ids) = expected {
                return ids.iter().any(|id| Some(id) == node.field(PKEY));
            }
        }
        value_matches(node.field(key).unwrap_or(&Value::Null), expected)
    })
}

/// Link filters: a string names one id, a list any of them, a dict all of its keys.
fn ids_match(ids: &[&str], expected: &Value) -> bool {
    match expected {
        Value::String(id) if id.is_empty() => ids.is_empty(),
        Value::String(id) => ids.contains(&id.as_str()),
        Value::Array(wanted) => wanted
            .iter()
            .filter_map(Value::as_str)
            .any(|id| ids.contains(&id)),
        Value::Object(wanted) => wanted.keys().all(|id| ids.contains(&id.as_str())),
        Value::Null => ids.is_empty(),
        _ => false,
    }
}

fn value_matches(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected
            .iter()
            .all(|(k, v)| value_matches(actual.get(k).unwrap_or(&Value::Null), v)),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_schema;
    use serde_json::json;

    fn desc() -> TopicDesc {
        parse_schema(&json!({
            "topics": [{
                "topic_name": "roles",
                "cols": {
                    "id": {"type": "string", "flag": "persistent"},
                    "disabled": {"type": "boolean", "flag": "persistent"},
                    "properties": {"type": "dict", "flag": "persistent"},
                    "level": {"type": "integer", "flag": "persistent"}
                }
            }]
        }))
        .unwrap()
        .topics[0]
            .clone()
    }

    fn filter(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_plain_equality_and_unknown_keys() {
        let desc = desc();
        let mut fields = Map::new();
        fields.insert("disabled".to_string(), json!(false));
        fields.insert("level".to_string(), json!(2));
        let node = Node::new(&desc, "admin", fields, true);

        assert!(node_matches(&node, &desc, &filter(json!({"disabled": false}))));
        assert!(!node_matches(&node, &desc, &filter(json!({"disabled": true}))));
        assert!(node_matches(&node, &desc, &filter(json!({"level": 2.0}))));
        assert!(node_matches(&node, &desc, &filter(json!({"unknown": 1}))));
        assert!(node_matches(&node, &desc, &filter(json!({"id": ["x", "admin"]}))));
    }

    #[test]
    fn test_object_subset_match() {
        let desc = desc();
        let mut fields = Map::new();
        fields.insert("properties".to_string(), json!({"a": 1, "b": 2}));
        let node = Node::new(&desc, "admin", fields, true);
        assert!(node_matches(&node, &desc, &filter(json!({"properties": {"a": 1}}))));
        assert!(!node_matches(&node, &desc, &filter(json!({"properties": {"c": 1}}))));
    }

    #[test]
    fn test_link_filters() {
        assert!(ids_match(&["a", "b"], &json!("a")));
        assert!(ids_match(&["a", "b"], &json!(["x", "b"])));
        assert!(!ids_match(&["a"], &json!({"a": true, "b": true})));
        assert!(ids_match(&[], &json!("")));
    }
}
