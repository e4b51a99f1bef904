//! SchemaRegistry: lookup tables over a validated schema plus the system topics.

use super::system::{graphs_topic, snaps_topic};
use super::{ColumnDesc, Schema, TopicDesc};
use crate::error::ApiError;
use std::collections::HashMap;

/// Read-only registry of the topics of one treedb
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schema: Schema,
    topics: Vec<TopicDesc>,
    by_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Build the registry; system topics are appended after the user topics.
    pub fn new(schema: Schema) -> Self {
        let mut topics = schema.topics.clone();
        topics.push(snaps_topic());
        topics.push(graphs_topic());
        let by_name = topics
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.topic_name.clone(), idx))
            .collect();
        Self {
            schema,
            topics,
            by_name,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// All topic names, user topics first
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.topic_name.clone()).collect()
    }

    pub fn topics(&self) -> &[TopicDesc] {
        &self.topics
    }

    pub fn get(&self, topic_name: &str) -> Option<&TopicDesc> {
        self.by_name.get(topic_name).map(|idx| &self.topics[*idx])
    }

    /// Topic descriptor or `TopicNotFound`
    pub fn topic_desc(&self, topic_name: &str) -> Result<&TopicDesc, ApiError> {
        self.get(topic_name)
            .ok_or_else(|| ApiError::TopicNotFound(topic_name.to_string()))
    }

    pub fn contains(&self, topic_name: &str) -> bool {
        self.by_name.contains_key(topic_name)
    }

    /// Names of the fkey columns of a topic
    pub fn topic_links(&self, topic_name: &str) -> Result<Vec<String>, ApiError> {
        Ok(self
            .topic_desc(topic_name)?
            .links()
            .map(|c| c.id.clone())
            .collect())
    }

    /// Names of the hook columns of a topic
    pub fn topic_hooks(&self, topic_name: &str) -> Result<Vec<String>, ApiError> {
        Ok(self
            .topic_desc(topic_name)?
            .hooks()
            .map(|c| c.id.clone())
            .collect())
    }

    pub fn pkey2s(&self, topic_name: &str) -> Result<&[String], ApiError> {
        Ok(&self.topic_desc(topic_name)?.pkey2s)
    }

    /// Hook column of a parent topic, or a link error when it is not a hook.
    pub fn hook_col(&self, parent_topic: &str, hook: &str) -> Result<&ColumnDesc, ApiError> {
        let col = self
            .topic_desc(parent_topic)?
            .col(hook)
            .ok_or_else(|| {
                ApiError::LinkError(format!("hook '{}' not found in topic '{}'", hook, parent_topic))
            })?;
        if !col.is_hook() {
            return Err(ApiError::LinkError(format!(
                "'{}^{}' is not a hook",
                parent_topic, hook
            )));
        }
        Ok(col)
    }

    /// Child fkey column that mirrors `parent_topic^hook` for `child_topic`.
    pub fn hook_child_field(
        &self,
        parent_topic: &str,
        hook: &str,
        child_topic: &str,
    ) -> Result<&ColumnDesc, ApiError> {
        let hook_col = self.hook_col(parent_topic, hook)?;
        let field = hook_col.hook_child_field(child_topic).ok_or_else(|| {
            ApiError::LinkError(format!(
                "topic '{}' not defined in hook '{}^{}'",
                child_topic, parent_topic, hook
            ))
        })?;
        self.topic_desc(child_topic)?.col(field).ok_or_else(|| {
            ApiError::LinkError(format!(
                "fkey '{}' not found in topic '{}'",
                field, child_topic
            ))
        })
    }

    /// Hook that owns a child fkey column, as (parent topic, hook column).
    pub fn fkey_owner(&self, child_topic: &str, fkey: &str) -> Option<(&TopicDesc, &ColumnDesc)> {
        self.topics.iter().find_map(|topic| {
            topic
                .hooks()
                .find(|hook| {
                    hook.hook
                        .iter()
                        .any(|(child, field)| child == child_topic && field == fkey)
                })
                .map(|hook| (topic, hook))
        })
    }
}
