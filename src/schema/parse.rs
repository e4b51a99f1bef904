//! Structural parsing of schema documents.

use super::{validation, ColumnDesc, ColumnFlag, ColumnType, Schema, TopicDesc};
use crate::error::SchemaError;
use crate::types::PKEY;
use serde_json::Value;

/// Parse and validate a schema document. A schema with any error is rejected wholesale.
pub fn parse_schema(value: &Value) -> Result<Schema, SchemaError> {
    let doc = value
        .as_object()
        .ok_or_else(|| SchemaError::InvalidDocument("schema must be an object".to_string()))?;

    let id = doc
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let schema_version = doc.get("schema_version").map(scalar_to_string).unwrap_or_default();

    let topics_value = doc
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| SchemaError::InvalidDocument("'topics' list required".to_string()))?;

    let mut topics = Vec::with_capacity(topics_value.len());
    for topic in topics_value {
        topics.push(parse_topic(topic)?);
    }

    let schema = Schema {
        id,
        schema_version,
        topics,
        raw: value.clone(),
    };
    validation::validate_schema(&schema)?;
    Ok(schema)
}

fn parse_topic(value: &Value) -> Result<TopicDesc, SchemaError> {
    let obj = value.as_object().ok_or_else(|| {
        SchemaError::InvalidDocument("topic descriptor must be an object".to_string())
    })?;

    let topic_name = obj
        .get("topic_name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| obj.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()))
        .ok_or_else(|| {
            SchemaError::InvalidDocument("topic without 'topic_name' or 'id'".to_string())
        })?
        .to_string();

    let invalid = |reason: &str| SchemaError::InvalidTopic {
        topic: topic_name.clone(),
        reason: reason.to_string(),
    };

    let pkey = obj
        .get("pkey")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(PKEY)
        .to_string();

    let pkey2s = match obj.get("pkey2s") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => {
            let mut keys = Vec::new();
            for item in items {
                match item.as_str() {
                    Some(s) if !s.is_empty() => keys.push(s.to_string()),
                    Some(_) => {}
                    None => return Err(invalid("pkey2s entries must be strings")),
                }
            }
            keys
        }
        Some(_) => return Err(invalid("pkey2s must be a string or a list")),
    };

    let tkey = obj
        .get("tkey")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let topic_version = obj
        .get("topic_version")
        .map(scalar_to_string)
        .unwrap_or_default();

    let cols = match obj.get("cols") {
        Some(Value::Object(map)) => {
            let mut cols = Vec::with_capacity(map.len());
            for (name, desc) in map {
                cols.push(parse_column(&topic_name, Some(name), desc)?);
            }
            cols
        }
        Some(Value::Array(items)) => {
            let mut cols = Vec::with_capacity(items.len());
            for desc in items {
                cols.push(parse_column(&topic_name, None, desc)?);
            }
            cols
        }
        _ => return Err(invalid("'cols' must be an object or a list")),
    };

    Ok(TopicDesc {
        topic_name,
        pkey,
        pkey2s,
        tkey,
        topic_version,
        cols,
    })
}

fn parse_column(
    topic: &str,
    key: Option<&String>,
    value: &Value,
) -> Result<ColumnDesc, SchemaError> {
    let obj = value.as_object().ok_or_else(|| SchemaError::InvalidTopic {
        topic: topic.to_string(),
        reason: "column descriptor must be an object".to_string(),
    })?;

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| key.cloned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SchemaError::InvalidTopic {
            topic: topic.to_string(),
            reason: "column without 'id'".to_string(),
        })?;

    let invalid = |reason: String| SchemaError::InvalidColumn {
        topic: topic.to_string(),
        column: id.clone(),
        reason,
    };

    if let Some(k) = key {
        if *k != id {
            return Err(invalid(format!("key '{}' differs from column id", k)));
        }
    }

    let type_name = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("'type' required".to_string()))?;
    let col_type =
        ColumnType::parse(type_name).ok_or_else(|| invalid(format!("unknown type '{}'", type_name)))?;

    let flags = match obj.get("flag") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => s
            .split(|c: char| c == ',' || c == '|' || c.is_whitespace())
            .filter(|w| !w.is_empty())
            .map(ColumnFlag::parse)
            .collect(),
        Some(Value::Array(items)) => {
            let mut flags = Vec::with_capacity(items.len());
            for item in items {
                let word = item
                    .as_str()
                    .ok_or_else(|| invalid("flags must be strings".to_string()))?;
                flags.push(ColumnFlag::parse(word));
            }
            flags
        }
        Some(_) => return Err(invalid("'flag' must be a string or a list".to_string())),
    };

    let hook = match obj.get("hook") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(map)) => {
            let mut pairs = Vec::with_capacity(map.len());
            for (child_topic, field) in map {
                let field = field
                    .as_str()
                    .ok_or_else(|| invalid("hook child field must be a string".to_string()))?;
                pairs.push((child_topic.clone(), field.to_string()));
            }
            pairs
        }
        Some(_) => return Err(invalid("'hook' must be an object".to_string())),
    };

    let enum_values = match obj.get("enum") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items.clone()),
        Some(_) => return Err(invalid("'enum' must be a list".to_string())),
    };

    Ok(ColumnDesc {
        header: obj
            .get("header")
            .and_then(Value::as_str)
            .unwrap_or(&id)
            .to_string(),
        id,
        col_type,
        flags,
        default: obj.get("default").cloned(),
        hook,
        enum_values,
    })
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
