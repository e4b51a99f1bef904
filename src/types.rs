//! Core types for the treedb graph engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rowid: position of a record in a topic's append log (1-based)
pub type Rowid = u64;

/// SnapTag: snapshot tag written on records (0 means untagged)
pub type SnapTag = u32;

/// Separator used in persisted link references
pub const REF_SEPARATOR: char = '^';

/// Separator used in materialized tree paths
pub const PATH_SEPARATOR: char = '`';

/// Metadata key carried by every node
pub const MD_TREEDB: &str = "__md_treedb__";

/// Primary key column name
pub const PKEY: &str = "id";

/// Reference from a child's fkey column to one parent: `topic^id^hook`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParentRef {
    pub topic_name: String,
    pub id: String,
    pub hook_name: String,
}

impl ParentRef {
    pub fn new(topic_name: &str, id: &str, hook_name: &str) -> Self {
        Self {
            topic_name: topic_name.to_string(),
            id: id.to_string(),
            hook_name: hook_name.to_string(),
        }
    }

    /// Persisted form `parent_topic^parent_id^hook_name`
    pub fn encode(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.topic_name,
            self.id,
            self.hook_name,
            sep = REF_SEPARATOR
        )
    }

    /// Parse a persisted reference; exactly three non-empty parts are required.
    pub fn decode(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split(REF_SEPARATOR).collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Reference to a child rendered from a hook: `topic^id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildRef {
    pub topic_name: String,
    pub id: String,
}

impl ChildRef {
    pub fn new(topic_name: &str, id: &str) -> Self {
        Self {
            topic_name: topic_name.to_string(),
            id: id.to_string(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.topic_name, REF_SEPARATOR, self.id)
    }

    /// Accepts `topic^id` or a bare id, in which case `default_topic` is used.
    pub fn decode(s: &str, default_topic: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split(REF_SEPARATOR).collect();
        match parts.as_slice() {
            [id] if !id.is_empty() => Some(Self::new(default_topic, id)),
            [topic, id] if !topic.is_empty() && !id.is_empty() => Some(Self::new(topic, id)),
            _ => None,
        }
    }
}

impl fmt::Display for ChildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Current time in epoch seconds
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Whether an option flag is set in an options object. Booleans, non-zero numbers and
/// non-empty strings count as set.
pub fn option_set(options: &serde_json::Value, key: &str) -> bool {
    use serde_json::Value;
    match options.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}
