//! Node: one instance of a topic record held in memory.

use crate::schema::{ColumnDesc, LinkShape, TopicDesc};
use crate::store::StoredRecord;
use crate::types::{ChildRef, ParentRef, Rowid, SnapTag, MD_TREEDB, PKEY};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::warn;

/// Record metadata kept alongside a node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMeta {
    pub rowid: Rowid,
    /// Append time of the current record version
    pub t: i64,
    /// Value of the topic's tkey column, if any
    pub tm: i64,
    pub tag: SnapTag,
}

/// A node. Hook and fkey collections are only reachable for writing from the graph module.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    topic_name: String,
    id: String,
    primary: bool,
    fields: Map<String, Value>,
    pub(super) fkeys: HashMap<String, Vec<ParentRef>>,
    pub(super) hooks: HashMap<String, Vec<ChildRef>>,
    pub(crate) meta: NodeMeta,
}

impl Node {
    /// Build a node with empty link collections.
    pub(crate) fn new(desc: &TopicDesc, id: &str, fields: Map<String, Value>, primary: bool) -> Self {
        let mut node = Self {
            topic_name: desc.topic_name.clone(),
            id: id.to_string(),
            primary,
            fields,
            fkeys: HashMap::new(),
            hooks: HashMap::new(),
            meta: NodeMeta::default(),
        };
        node.fields.insert(PKEY.to_string(), Value::String(id.to_string()));
        for col in desc.links() {
            node.fkeys.insert(col.id.clone(), Vec::new());
        }
        for col in desc.hooks() {
            node.hooks.insert(col.id.clone(), Vec::new());
        }
        node.refresh_tm(desc);
        node
    }

    /// Rebuild a node from a stored record. Hooks start empty and are attached by the loader.
    pub(crate) fn from_record(desc: &TopicDesc, record: &StoredRecord) -> Self {
        let payload = record.payload.as_object();
        let mut fields = Map::new();
        for col in desc.cols.iter().filter(|c| !c.is_link()) {
            if let Some(value) = payload.and_then(|p| p.get(&col.id)) {
                fields.insert(col.id.clone(), value.clone());
            }
        }

        let mut node = Node::new(desc, &record.key, fields, record.primary);
        for col in desc.links() {
            let raw = payload.and_then(|p| p.get(&col.id));
            let refs = raw.map(|v| decode_fkey(v)).unwrap_or_default();
            let valid = refs
                .into_iter()
                .filter_map(|s| {
                    let parsed = ParentRef::decode(&s);
                    if parsed.is_none() {
                        warn!(
                            topic_name = %desc.topic_name,
                            id = %record.key,
                            fkey = %col.id,
                            reference = %s,
                            "Skipping malformed fkey reference"
                        );
                    }
                    parsed
                })
                .collect();
            node.fkeys.insert(col.id.clone(), valid);
        }
        node.meta = NodeMeta {
            rowid: record.rowid,
            t: record.t,
            tm: node.meta.tm,
            tag: record.tag,
        };
        node
    }

    /// Persisted form: persistent plain columns plus fkey columns. Hooks are never stored.
    pub fn to_record(&self, desc: &TopicDesc) -> Value {
        let mut record = Map::new();
        for col in &desc.cols {
            if col.is_fkey() {
                record.insert(col.id.clone(), self.stored_fkey(col));
            } else if col.is_persistent() || col.id == PKEY {
                if let Some(value) = self.fields.get(&col.id) {
                    record.insert(col.id.clone(), value.clone());
                }
            }
        }
        Value::Object(record)
    }

    /// Fkey column as persisted: a ref string, an array of refs or `{ref: true}`.
    pub fn stored_fkey(&self, col: &ColumnDesc) -> Value {
        let refs = self.fkey_refs(&col.id);
        match col.link_shape() {
            LinkShape::Single => json!(refs.first().map(ParentRef::encode).unwrap_or_default()),
            LinkShape::List => Value::Array(refs.iter().map(|r| json!(r.encode())).collect()),
            LinkShape::Dict => Value::Object(
                refs.iter()
                    .map(|r| (r.encode(), Value::Bool(true)))
                    .collect(),
            ),
        }
    }

    /// Hook column as held in memory: `{child_id: topic}` for dict hooks, child ids otherwise.
    pub fn stored_hook(&self, col: &ColumnDesc) -> Value {
        let children = self.hook_refs(&col.id);
        match col.link_shape() {
            LinkShape::Dict => Value::Object(
                children
                    .iter()
                    .map(|c| (c.id.clone(), json!(c.topic_name)))
                    .collect(),
            ),
            _ => Value::Array(children.iter().map(|c| json!(c.id)).collect()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    /// Main instance of its id
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Plain (non-link) column values
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Non-empty string value of a key column
    pub fn key2(&self, pkey2: &str) -> Option<&str> {
        self.fields
            .get(pkey2)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Set a plain column. Link columns are owned by the link engine.
    pub(crate) fn set_field(&mut self, name: &str, value: Value) {
        if self.fkeys.contains_key(name) || self.hooks.contains_key(name) {
            return;
        }
        self.fields.insert(name.to_string(), value);
    }

    /// Parent references held by an fkey column
    pub fn fkey_refs(&self, fkey: &str) -> &[ParentRef] {
        self.fkeys.get(fkey).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Children held by a hook column, in insertion order
    pub fn hook_refs(&self, hook: &str) -> &[ChildRef] {
        self.hooks.get(hook).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_up_links(&self) -> bool {
        self.fkeys.values().any(|refs| !refs.is_empty())
    }

    pub fn has_down_links(&self) -> bool {
        self.hooks.values().any(|refs| !refs.is_empty())
    }

    /// Copy the fkey references of the main instance onto a new secondary instance.
    pub(crate) fn inherit_fkeys(&mut self, primary: &Node) {
        for (fkey, refs) in &primary.fkeys {
            self.fkeys.insert(fkey.clone(), refs.clone());
        }
    }

    /// Refresh the tkey-derived time
    pub(crate) fn refresh_tm(&mut self, desc: &TopicDesc) {
        self.meta.tm = desc
            .tkey
            .as_ref()
            .and_then(|tkey| self.fields.get(tkey))
            .and_then(Value::as_i64)
            .unwrap_or(0);
    }

    /// `__md_treedb__` block
    pub fn metadata(&self, treedb_name: &str, pure_node: bool) -> Value {
        json!({
            "treedb_name": treedb_name,
            "topic_name": self.topic_name,
            "__rowid__": self.meta.rowid,
            "__t__": self.meta.t,
            "__tm__": self.meta.tm,
            "__tag__": self.meta.tag,
            "__pure_node__": pure_node,
        })
    }

    /// Raw rendering: plain fields, link collections as stored, metadata included.
    pub fn to_raw_json(&self, desc: &TopicDesc, treedb_name: &str) -> Value {
        let mut out = match self.to_record(desc) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (name, value) in &self.fields {
            out.entry(name.clone()).or_insert_with(|| value.clone());
        }
        for col in desc.hooks() {
            out.insert(col.id.clone(), self.stored_hook(col));
        }
        out.insert(MD_TREEDB.to_string(), self.metadata(treedb_name, true));
        Value::Object(out)
    }
}

/// Reference strings held by a persisted fkey value of any shape.
fn decode_fkey(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}
