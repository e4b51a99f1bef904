//! Collapsed views
//!
//! Caller-facing rendering of a node. Without options hook and fkey collections pass through
//! as stored; the shaping options reshape them. The projector never reads the store.

use crate::graph::Node;
use crate::schema::TopicDesc;
use crate::types::{option_set, ChildRef, ParentRef, MD_TREEDB};
use serde_json::{json, Map, Value};

/// Rendering of hook collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookShape {
    /// `[{"size": n}]`
    Size,
    /// `["id", ...]`
    OnlyId,
    /// `["topic^id", ...]`
    Refs,
    /// `[{"id", "topic_name"}, ...]`
    ListDict,
    /// The hook as held: `{"id": "topic_name"}` for dict hooks, `["id", ...]` otherwise
    #[default]
    Stored,
}

/// Rendering of fkey references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FkeyShape {
    /// `"id"`
    OnlyId,
    /// `"topic^id^hook"`
    Refs,
    /// `{"id", "topic_name", "hook_name"}`
    ListDict,
    /// The fkey as persisted: a ref string, a list of refs or `{"ref": true}`
    #[default]
    Stored,
}

/// Options of a collapsed view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewOptions {
    pub hook_shape: HookShape,
    pub fkey_shape: FkeyShape,
    pub with_metadata: bool,
    pub without_rowid: bool,
    /// Emit stored collections unchanged, metadata included
    pub raw: bool,
}

impl ViewOptions {
    /// Read view options from a JSON options object. Specific keys (`hook_*`, `fkey_*`) win
    /// over the generic ones within the same precedence level.
    pub fn from_json(options: &Value) -> Self {
        let set = |key: &str| option_set(options, key);

        let hook_shape = if set("hook_size") || set("size") {
            HookShape::Size
        } else if set("hook_only_id") || set("only_id") {
            HookShape::OnlyId
        } else if set("hook_refs") || set("refs") {
            HookShape::Refs
        } else if set("hook_list_dict") || set("list_dict") {
            HookShape::ListDict
        } else {
            HookShape::Stored
        };

        let fkey_shape = if set("fkey_refs") || set("refs") {
            FkeyShape::Refs
        } else if set("fkey_only_id") || set("only_id") {
            FkeyShape::OnlyId
        } else if set("fkey_list_dict") || set("list_dict") {
            FkeyShape::ListDict
        } else {
            FkeyShape::Stored
        };

        Self {
            hook_shape,
            fkey_shape,
            with_metadata: set("with_metadata"),
            without_rowid: set("without_rowid"),
            raw: set("raw"),
        }
    }
}

/// Shape one parent reference
pub fn shape_parent_ref(parent: &ParentRef, shape: FkeyShape) -> Value {
    match shape {
        FkeyShape::OnlyId => json!(parent.id),
        FkeyShape::Refs | FkeyShape::Stored => json!(parent.encode()),
        FkeyShape::ListDict => json!({
            "id": parent.id,
            "topic_name": parent.topic_name,
            "hook_name": parent.hook_name,
        }),
    }
}

/// Shape a hook collection, keeping insertion order
pub fn shape_hook(children: &[ChildRef], shape: HookShape) -> Value {
    match shape {
        HookShape::Size => json!([{"size": children.len()}]),
        HookShape::OnlyId | HookShape::Stored => {
            Value::Array(children.iter().map(|c| json!(c.id)).collect())
        }
        HookShape::Refs => Value::Array(children.iter().map(|c| json!(c.encode())).collect()),
        HookShape::ListDict => Value::Array(
            children
                .iter()
                .map(|c| json!({"id": c.id, "topic_name": c.topic_name}))
                .collect(),
        ),
    }
}

/// Collapsed view of a node; columns in schema order.
pub fn collapse(node: &Node, desc: &TopicDesc, treedb_name: &str, options: &ViewOptions) -> Value {
    if options.raw {
        return node.to_raw_json(desc, treedb_name);
    }

    let mut view = Map::new();
    for col in &desc.cols {
        if col.id.starts_with("__") && !options.with_metadata {
            continue;
        }
        if options.without_rowid && col.is_rowid() {
            continue;
        }
        if col.is_hook() {
            let value = match options.hook_shape {
                HookShape::Stored => node.stored_hook(col),
                shape => shape_hook(node.hook_refs(&col.id), shape),
            };
            view.insert(col.id.clone(), value);
        } else if col.is_fkey() && options.fkey_shape == FkeyShape::Stored {
            view.insert(col.id.clone(), node.stored_fkey(col));
        } else if col.is_fkey() {
            let refs = node
                .fkey_refs(&col.id)
                .iter()
                .map(|r| shape_parent_ref(r, options.fkey_shape))
                .collect();
            view.insert(col.id.clone(), Value::Array(refs));
        } else if let Some(value) = node.field(&col.id) {
            view.insert(col.id.clone(), value.clone());
        }
    }
    if options.with_metadata {
        view.insert(MD_TREEDB.to_string(), node.metadata(treedb_name, false));
    }
    Value::Object(view)
}
