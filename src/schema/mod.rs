//! Schema Registry
//!
//! Declarative topic/column schema: parsing, validation and read-only accessors.

mod parse;
pub mod registry;
pub mod system;
mod validation;

pub use parse::parse_schema;
pub use registry::SchemaRegistry;

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::Path;

/// Semantic type of a column (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Real,
    Number,
    Boolean,
    Array,
    Dict,
    Blob,
}

impl ColumnType {
    /// Parse a type name, accepting the `list` and `object` aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" | "str" => Some(ColumnType::String),
            "integer" | "int" => Some(ColumnType::Integer),
            "real" | "float" => Some(ColumnType::Real),
            "number" => Some(ColumnType::Number),
            "boolean" | "bool" => Some(ColumnType::Boolean),
            "array" | "list" => Some(ColumnType::Array),
            "dict" | "object" => Some(ColumnType::Dict),
            "blob" => Some(ColumnType::Blob),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Array => "array",
            ColumnType::Dict => "dict",
            ColumnType::Blob => "blob",
        }
    }

    /// Whether a JSON value has this type. Blobs accept anything.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ColumnType::String => value.is_string(),
            ColumnType::Integer => value.is_i64() || value.is_u64(),
            ColumnType::Real | ColumnType::Number => value.is_number(),
            ColumnType::Boolean => value.is_boolean(),
            ColumnType::Array => value.is_array(),
            ColumnType::Dict => value.is_object(),
            ColumnType::Blob => true,
        }
    }

    /// Value used when a column has neither a supplied value nor a default
    pub fn empty_value(&self) -> Value {
        match self {
            ColumnType::String => Value::String(String::new()),
            ColumnType::Integer => json!(0),
            ColumnType::Real | ColumnType::Number => json!(0.0),
            ColumnType::Boolean => Value::Bool(false),
            ColumnType::Array => Value::Array(Vec::new()),
            ColumnType::Dict => Value::Object(Map::new()),
            ColumnType::Blob => Value::Null,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnFlag {
    Persistent,
    Required,
    Notnull,
    Writable,
    Hidden,
    Time,
    Now,
    Fkey,
    Hook,
    Inherit,
    Uuid,
    Rowid,
    Enum,
    Wild,
    /// Flags without engine semantics are kept verbatim
    Other(String),
}

impl ColumnFlag {
    pub fn parse(s: &str) -> Self {
        match s {
            "persistent" => ColumnFlag::Persistent,
            "required" => ColumnFlag::Required,
            "notnull" => ColumnFlag::Notnull,
            "writable" => ColumnFlag::Writable,
            "hidden" => ColumnFlag::Hidden,
            "time" => ColumnFlag::Time,
            "now" => ColumnFlag::Now,
            "fkey" => ColumnFlag::Fkey,
            "hook" => ColumnFlag::Hook,
            "inherit" => ColumnFlag::Inherit,
            "uuid" => ColumnFlag::Uuid,
            "rowid" => ColumnFlag::Rowid,
            "enum" => ColumnFlag::Enum,
            "wild" => ColumnFlag::Wild,
            other => ColumnFlag::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ColumnFlag::Persistent => "persistent",
            ColumnFlag::Required => "required",
            ColumnFlag::Notnull => "notnull",
            ColumnFlag::Writable => "writable",
            ColumnFlag::Hidden => "hidden",
            ColumnFlag::Time => "time",
            ColumnFlag::Now => "now",
            ColumnFlag::Fkey => "fkey",
            ColumnFlag::Hook => "hook",
            ColumnFlag::Inherit => "inherit",
            ColumnFlag::Uuid => "uuid",
            ColumnFlag::Rowid => "rowid",
            ColumnFlag::Enum => "enum",
            ColumnFlag::Wild => "wild",
            ColumnFlag::Other(s) => s.as_str(),
        }
    }
}

/// Shape of the collection held by a link column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkShape {
    /// One reference (fkey of type string)
    Single,
    /// Ordered references
    List,
    /// References keyed by id (hooks) or by ref (fkeys)
    Dict,
}

/// Column descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDesc {
    pub id: String,
    pub header: String,
    pub col_type: ColumnType,
    pub flags: Vec<ColumnFlag>,
    pub default: Option<Value>,
    /// For hook columns: (child topic, child fkey field), in declaration order
    pub hook: Vec<(String, String)>,
    pub enum_values: Option<Vec<Value>>,
}

impl ColumnDesc {
    pub fn has_flag(&self, flag: &ColumnFlag) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn is_fkey(&self) -> bool {
        self.has_flag(&ColumnFlag::Fkey)
    }

    pub fn is_hook(&self) -> bool {
        self.has_flag(&ColumnFlag::Hook)
    }

    pub fn is_link(&self) -> bool {
        self.is_fkey() || self.is_hook()
    }

    pub fn is_persistent(&self) -> bool {
        self.has_flag(&ColumnFlag::Persistent)
    }

    /// Plain column kept only in memory
    pub fn is_volatile(&self) -> bool {
        !self.is_persistent() && !self.is_link()
    }

    pub fn is_required(&self) -> bool {
        self.has_flag(&ColumnFlag::Required)
    }

    pub fn is_time(&self) -> bool {
        self.has_flag(&ColumnFlag::Time) || self.has_flag(&ColumnFlag::Now)
    }

    pub fn is_rowid(&self) -> bool {
        self.has_flag(&ColumnFlag::Rowid)
    }

    pub fn is_enum(&self) -> bool {
        self.has_flag(&ColumnFlag::Enum) || self.enum_values.is_some()
    }

    /// Collection shape of a link column
    pub fn link_shape(&self) -> LinkShape {
        match self.col_type {
            ColumnType::Array => LinkShape::List,
            ColumnType::Dict => LinkShape::Dict,
            _ => LinkShape::Single,
        }
    }

    /// Child fkey field declared by this hook for `child_topic`
    pub fn hook_child_field(&self, child_topic: &str) -> Option<&str> {
        self.hook
            .iter()
            .find(|(topic, _)| topic == child_topic)
            .map(|(_, field)| field.as_str())
    }

    /// JSON rendering used by topic introspection
    pub fn to_json(&self) -> Value {
        let mut desc = Map::new();
        desc.insert("id".to_string(), json!(self.id));
        desc.insert("header".to_string(), json!(self.header));
        desc.insert("type".to_string(), json!(self.col_type.as_str()));
        desc.insert(
            "flag".to_string(),
            Value::Array(self.flags.iter().map(|f| json!(f.as_str())).collect()),
        );
        if let Some(default) = &self.default {
            desc.insert("default".to_string(), default.clone());
        }
        if !self.hook.is_empty() {
            let hook: Map<String, Value> = self
                .hook
                .iter()
                .map(|(topic, field)| (topic.clone(), json!(field)))
                .collect();
            desc.insert("hook".to_string(), Value::Object(hook));
        }
        if let Some(values) = &self.enum_values {
            desc.insert("enum".to_string(), Value::Array(values.clone()));
        }
        Value::Object(desc)
    }
}

/// Topic descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct TopicDesc {
    pub topic_name: String,
    pub pkey: String,
    pub pkey2s: Vec<String>,
    pub tkey: Option<String>,
    pub topic_version: String,
    pub cols: Vec<ColumnDesc>,
}

impl TopicDesc {
    pub fn col(&self, name: &str) -> Option<&ColumnDesc> {
        self.cols.iter().find(|c| c.id == name)
    }

    /// fkey columns, in schema order
    pub fn links(&self) -> impl Iterator<Item = &ColumnDesc> {
        self.cols.iter().filter(|c| c.is_fkey())
    }

    /// hook columns, in schema order
    pub fn hooks(&self) -> impl Iterator<Item = &ColumnDesc> {
        self.cols.iter().filter(|c| c.is_hook())
    }

    pub fn is_system(&self) -> bool {
        self.topic_name.starts_with("__")
    }

    pub fn to_json(&self) -> Value {
        let cols: Map<String, Value> = self
            .cols
            .iter()
            .map(|c| (c.id.clone(), c.to_json()))
            .collect();
        json!({
            "topic_name": self.topic_name,
            "pkey": self.pkey,
            "pkey2s": self.pkey2s,
            "tkey": self.tkey.clone().unwrap_or_default(),
            "topic_version": self.topic_version,
            "cols": cols,
        })
    }
}

/// Parsed and validated schema document
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub id: String,
    pub schema_version: String,
    pub topics: Vec<TopicDesc>,
    /// Document as supplied, persisted verbatim
    pub raw: Value,
}

impl Schema {
    /// Parse and validate a schema from a JSON value.
    pub fn from_json(value: &Value) -> Result<Self, SchemaError> {
        parse_schema(value)
    }

    /// Load a schema file, see [`read_document`].
    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        parse_schema(&read_document(path)?)
    }

    /// Numeric value of `schema_version`; non-numeric versions count as 0.
    pub fn version_number(&self) -> i64 {
        self.schema_version.trim().parse().unwrap_or(0)
    }

    pub fn topic(&self, topic_name: &str) -> Option<&TopicDesc> {
        self.topics.iter().find(|t| t.topic_name == topic_name)
    }
}

/// Read a schema document; `.yaml`/`.yml` files are read as YAML, anything else as JSON.
pub fn read_document(path: &Path) -> Result<Value, SchemaError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        SchemaError::InvalidDocument(format!("cannot read {}: {}", path.display(), e))
    })?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&text)
            .map_err(|e| SchemaError::InvalidDocument(format!("bad yaml: {}", e)))
    } else {
        serde_json::from_str(&text)
            .map_err(|e| SchemaError::InvalidDocument(format!("bad json: {}", e)))
    }
}
