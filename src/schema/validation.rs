//! Cross-checks over a parsed schema: keys, types, defaults and hook/fkey pairing.

use super::{ColumnType, Schema, TopicDesc};
use crate::error::SchemaError;
use crate::types::PKEY;
use std::collections::{HashMap, HashSet};
use tracing::warn;

pub(super) fn validate_schema(schema: &Schema) -> Result<(), SchemaError> {
    let mut names = HashSet::new();
    for topic in &schema.topics {
        if topic.topic_name.starts_with("__") {
            return Err(SchemaError::InvalidTopic {
                topic: topic.topic_name.clone(),
                reason: "topic names starting with '__' are reserved".to_string(),
            });
        }
        if !names.insert(topic.topic_name.as_str()) {
            return Err(SchemaError::InvalidTopic {
                topic: topic.topic_name.clone(),
                reason: "duplicate topic".to_string(),
            });
        }
        validate_topic(topic)?;
    }
    validate_hooks(schema)
}

/// Checks that only involve one topic. Used for system topics too.
pub(crate) fn validate_topic(topic: &TopicDesc) -> Result<(), SchemaError> {
    let invalid_topic = |reason: String| SchemaError::InvalidTopic {
        topic: topic.topic_name.clone(),
        reason,
    };

    if topic.pkey != PKEY {
        return Err(invalid_topic(format!(
            "pkey must be '{}', found '{}'",
            PKEY, topic.pkey
        )));
    }
    match topic.col(PKEY) {
        Some(col) if col.col_type == ColumnType::String => {}
        Some(_) => return Err(invalid_topic("'id' column must be a string".to_string())),
        None => return Err(invalid_topic("'id' column required".to_string())),
    }

    let mut seen = HashSet::new();
    for col in &topic.cols {
        if !seen.insert(col.id.as_str()) {
            return Err(invalid_topic(format!("duplicate column '{}'", col.id)));
        }
    }

    for pkey2 in &topic.pkey2s {
        match topic.col(pkey2) {
            Some(col) if col.col_type == ColumnType::String && !col.is_link() => {}
            Some(_) => {
                return Err(invalid_topic(format!(
                    "pkey2 '{}' must be a plain string column",
                    pkey2
                )))
            }
            None => return Err(invalid_topic(format!("pkey2 '{}' is not a column", pkey2))),
        }
    }

    if let Some(tkey) = &topic.tkey {
        if topic.col(tkey).is_none() {
            return Err(invalid_topic(format!("tkey '{}' is not a column", tkey)));
        }
    }

    for col in &topic.cols {
        let invalid = |reason: &str| SchemaError::InvalidColumn {
            topic: topic.topic_name.clone(),
            column: col.id.clone(),
            reason: reason.to_string(),
        };

        if col.is_fkey() && col.is_hook() {
            return Err(invalid("a column cannot be both fkey and hook"));
        }
        if col.is_hook() {
            if !matches!(col.col_type, ColumnType::Array | ColumnType::Dict) {
                return Err(invalid("hook columns must be array or dict"));
            }
            if col.hook.is_empty() {
                return Err(invalid("hook column without 'hook' descriptor"));
            }
        }
        if col.is_fkey()
            && !matches!(
                col.col_type,
                ColumnType::String | ColumnType::Array | ColumnType::Dict
            )
        {
            return Err(invalid("fkey columns must be string, array or dict"));
        }
        if !col.hook.is_empty() && !col.is_hook() {
            return Err(invalid("'hook' descriptor on a column without the hook flag"));
        }

        if let Some(default) = &col.default {
            if !default.is_null() && !col.col_type.matches(default) {
                return Err(invalid(&format!(
                    "default {} does not match type {}",
                    default, col.col_type
                )));
            }
            if let Some(values) = &col.enum_values {
                if !default.is_null() && !values.contains(default) {
                    return Err(invalid("default is not an enum member"));
                }
            }
        }
    }
    Ok(())
}

/// Every hook maps existing child topics to child fkey columns, each claimed once.
fn validate_hooks(schema: &Schema) -> Result<(), SchemaError> {
    let mut claimed: HashMap<(String, String), (String, String)> = HashMap::new();

    for topic in &schema.topics {
        for hook in topic.hooks() {
            for (child_topic, child_field) in &hook.hook {
                let invalid = |reason: String| SchemaError::InvalidHook {
                    topic: topic.topic_name.clone(),
                    hook: hook.id.clone(),
                    reason,
                };
                let child = schema
                    .topic(child_topic)
                    .ok_or_else(|| invalid(format!("child topic '{}' not found", child_topic)))?;
                let field = child.col(child_field).ok_or_else(|| {
                    invalid(format!(
                        "child field '{}' not found in topic '{}'",
                        child_field, child_topic
                    ))
                })?;
                if !field.is_fkey() {
                    return Err(invalid(format!(
                        "child field '{}^{}' is not a fkey",
                        child_topic, child_field
                    )));
                }
                let key = (child_topic.clone(), child_field.clone());
                let owner = (topic.topic_name.clone(), hook.id.clone());
                if let Some(previous) = claimed.insert(key, owner) {
                    return Err(invalid(format!(
                        "fkey '{}^{}' already used by hook '{}^{}'",
                        child_topic, child_field, previous.0, previous.1
                    )));
                }
            }
        }
    }

    for topic in &schema.topics {
        for fkey in topic.links() {
            let key = (topic.topic_name.clone(), fkey.id.clone());
            if !claimed.contains_key(&key) {
                warn!(
                    topic_name = %topic.topic_name,
                    fkey = %fkey.id,
                    "fkey column is not referenced by any hook"
                );
            }
        }
    }
    Ok(())
}
