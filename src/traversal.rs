//! Traversal Engine: parents, children and hierarchical trees over hook/fkey links.

use crate::error::ApiError;
use crate::graph::{node_matches, Node};
use crate::schema::TopicDesc;
use crate::treedb::Treedb;
use crate::types::{option_set, PATH_SEPARATOR};
use crate::views::{collapse, shape_parent_ref, ViewOptions};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::warn;

/// Deepest level walked by recursive traversals
pub const MAX_DEPTH: usize = 256;

/// Options of parent/children/tree traversals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraversalOptions {
    pub view: ViewOptions,
    /// Walk the same hook down the children
    pub recursive: bool,
    /// Emit every node once, which also stops cycles
    pub dedup: bool,
    /// Parents: return the parent nodes rather than their references
    pub collapsed_view: bool,
}

impl TraversalOptions {
    pub fn from_json(options: &Value) -> Self {
        Self {
            view: ViewOptions::from_json(options),
            recursive: option_set(options, "recursive"),
            dedup: option_set(options, "dedup"),
            collapsed_view: option_set(options, "collapsed_view"),
        }
    }

    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Default::default()
        }
    }
}

impl Treedb {
    /// Parents of a node through one fkey, or through every fkey of the topic.
    pub fn node_parents(
        &self,
        topic_name: &str,
        kw: &Map<String, Value>,
        fkey: Option<&str>,
        options: &TraversalOptions,
    ) -> Result<Vec<Value>, ApiError> {
        let desc = self.registry.topic_desc(topic_name)?;
        let node = self.require_node(topic_name, kw)?;

        let fkeys: Vec<&str> = match fkey.filter(|f| !f.is_empty()) {
            Some(fkey) => match desc.col(fkey) {
                Some(col) if col.is_fkey() => vec![fkey],
                _ => {
                    return Err(ApiError::LinkError(format!(
                        "'{}' is not a fkey of topic {}",
                        fkey, topic_name
                    )))
                }
            },
            None => desc.links().map(|c| c.id.as_str()).collect(),
        };

        let mut parents = Vec::new();
        for fkey in fkeys {
            for parent_ref in node.fkey_refs(fkey) {
                if !options.collapsed_view {
                    parents.push(shape_parent_ref(parent_ref, options.view.fkey_shape));
                    continue;
                }
                match self.graph.node(&parent_ref.topic_name, &parent_ref.id) {
                    Some(parent) => parents.push(self.view(parent, &options.view)?),
                    None => warn!(
                        topic_name = %topic_name,
                        id = %node.id(),
                        reference = %parent_ref,
                        "Parent node not found"
                    ),
                }
            }
        }
        Ok(parents)
    }

    /// Children of a node through `hook`, as collapsed views.
    pub fn node_children(
        &self,
        topic_name: &str,
        kw: &Map<String, Value>,
        hook: &str,
        filter: &Map<String, Value>,
        options: &TraversalOptions,
    ) -> Result<Vec<Value>, ApiError> {
        self.children_of(topic_name, kw, hook, filter, options)?
            .into_iter()
            .map(|child| self.view(child, &options.view))
            .collect()
    }

    /// Children of a node through `hook`, depth first. Only matching children are walked.
    pub fn children_of(
        &self,
        topic_name: &str,
        kw: &Map<String, Value>,
        hook: &str,
        filter: &Map<String, Value>,
        options: &TraversalOptions,
    ) -> Result<Vec<&Node>, ApiError> {
        self.registry.hook_col(topic_name, hook)?;
        let node = self.require_node(topic_name, kw)?;
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_children(node, hook, filter, options, 0, &mut seen, &mut out);
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_children<'a>(
        &'a self,
        node: &Node,
        hook: &str,
        filter: &Map<String, Value>,
        options: &TraversalOptions,
        depth: usize,
        seen: &mut HashSet<(String, String)>,
        out: &mut Vec<&'a Node>,
    ) {
        for child_ref in node.hook_refs(hook) {
            let Some(child) = self.graph.node(&child_ref.topic_name, &child_ref.id) else {
                warn!(hook = %hook, child = %child_ref, "Child node not found");
                continue;
            };
            let Some(desc) = self.registry.get(&child_ref.topic_name) else {
                continue;
            };
            if !node_matches(child, desc, filter) {
                continue;
            }
            if options.dedup && !seen.insert((child_ref.topic_name.clone(), child_ref.id.clone())) {
                continue;
            }
            out.push(child);

            if options.recursive && desc.col(hook).map_or(false, |c| c.is_hook()) {
                if depth + 1 >= MAX_DEPTH {
                    warn!(hook = %hook, child = %child_ref, depth, "Traversal depth limit reached");
                    continue;
                }
                self.collect_children(child, hook, filter, options, depth + 1, seen, out);
            }
        }
    }

    /// Hierarchical tree under `hook`. The root is the node addressed by `kw`, or the first
    /// node of the topic without a parent when `kw` has no id. Every element carries its
    /// `__path__` and its matching children in the hook field (or `rename_hook`).
    pub fn topic_jtree(
        &self,
        topic_name: &str,
        hook: &str,
        rename_hook: Option<&str>,
        kw: &Map<String, Value>,
        filter: &Map<String, Value>,
        options: &TraversalOptions,
    ) -> Result<Value, ApiError> {
        self.registry.hook_col(topic_name, hook)?;
        let root = if kw.contains_key(crate::types::PKEY) {
            self.require_node(topic_name, kw)?
        } else {
            self.first_root(topic_name, hook)?
        };

        let tree_key = rename_hook.filter(|r| !r.is_empty()).unwrap_or(hook);
        let mut ancestors = vec![(root.topic_name().to_string(), root.id().to_string())];
        self.jtree_node(root, hook, tree_key, root.id().to_string(), filter, options, &mut ancestors)
    }

    #[allow(clippy::too_many_arguments)]
    fn jtree_node(
        &self,
        node: &Node,
        hook: &str,
        tree_key: &str,
        path: String,
        filter: &Map<String, Value>,
        options: &TraversalOptions,
        ancestors: &mut Vec<(String, String)>,
    ) -> Result<Value, ApiError> {
        let mut element = match self.view(node, &options.view)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        element.remove(hook);

        let mut children = Vec::new();
        for child_ref in node.hook_refs(hook) {
            let Some(child) = self.graph.node(&child_ref.topic_name, &child_ref.id) else {
                continue;
            };
            let Some(desc) = self.registry.get(&child_ref.topic_name) else {
                continue;
            };
            if !node_matches(child, desc, filter) {
                continue;
            }
            let key = (child_ref.topic_name.clone(), child_ref.id.clone());
            if ancestors.contains(&key) || ancestors.len() >= MAX_DEPTH {
                warn!(hook = %hook, child = %child_ref, "Cycle in tree, branch cut");
                continue;
            }
            ancestors.push(key);
            let child_path = format!("{}{}{}", path, PATH_SEPARATOR, child.id());
            children.push(self.jtree_node(child, hook, tree_key, child_path, filter, options, ancestors)?);
            ancestors.pop();
        }

        element.insert("__path__".to_string(), Value::String(path));
        element.insert(tree_key.to_string(), Value::Array(children));
        Ok(Value::Object(element))
    }

    /// First node, in id order, whose fkey mirrored by `hook` is empty
    fn first_root(&self, topic_name: &str, hook: &str) -> Result<&Node, ApiError> {
        let fkey = self
            .registry
            .hook_child_field(topic_name, hook, topic_name)
            .ok()
            .map(|c| c.id.clone());
        self.topic_index(topic_name)?
            .primaries()
            .find(|n| fkey.as_ref().map_or(true, |f| n.fkey_refs(f).is_empty()))
            .ok_or_else(|| ApiError::node_not_found(topic_name, ""))
    }

    pub(crate) fn require_node(&self, topic_name: &str, kw: &Map<String, Value>) -> Result<&Node, ApiError> {
        self.get_node(topic_name, kw)?.ok_or_else(|| {
            ApiError::node_not_found(
                topic_name,
                kw.get(crate::types::PKEY).and_then(Value::as_str).unwrap_or_default(),
            )
        })
    }

    /// Collapsed view of a node of this treedb
    pub fn view(&self, node: &Node, options: &ViewOptions) -> Result<Value, ApiError> {
        let desc: &TopicDesc = self.registry.topic_desc(node.topic_name())?;
        Ok(collapse(node, desc, &self.name, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LinkSpec;
    use crate::store::SledRecordStore;
    use crate::treedb::OpenOptions;
    use serde_json::json;
    use std::sync::Arc;

    fn kw(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    /// A -> {B, C}, B -> D, C -> D through the `roles` hook
    fn diamond() -> Treedb {
        let store = Arc::new(SledRecordStore::temporary().unwrap());
        let mut db = Treedb::open(
            store,
            &json!({
                "topics": [{
                    "topic_name": "roles",
                    "cols": {
                        "id": {"type": "string", "flag": ["persistent", "required"]},
                        "disabled": {"type": "boolean", "flag": "persistent", "default": false},
                        "roles": {"type": "dict", "flag": "hook", "hook": {"roles": "parent_role_id"}},
                        "parent_role_id": {"type": "array", "flag": "fkey"}
                    }
                }]
            }),
            OpenOptions::master("authzs"),
        )
        .unwrap();
        for id in ["A", "B", "C", "D"] {
            db.create_node("roles", &kw(json!({"id": id}))).unwrap();
        }
        for (parent, child) in [("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")] {
            db.link_nodes(&LinkSpec {
                hook: "roles",
                parent_topic: "roles",
                parent_id: parent,
                child_topic: "roles",
                child_id: child,
            })
            .unwrap();
        }
        db
    }

    fn ids(nodes: &[&Node]) -> Vec<String> {
        nodes.iter().map(|n| n.id().to_string()).collect()
    }

    #[test]
    fn test_recursive_children_repeat_diamond() {
        let db = diamond();
        let a = kw(json!({"id": "A"}));
        let direct = db
            .children_of("roles", &a, "roles", &Map::new(), &TraversalOptions::default())
            .unwrap();
        assert_eq!(ids(&direct), vec!["B", "C"]);

        let all = db
            .children_of("roles", &a, "roles", &Map::new(), &TraversalOptions::recursive())
            .unwrap();
        assert_eq!(ids(&all), vec!["B", "D", "C", "D"]);

        let dedup = TraversalOptions {
            dedup: true,
            ..TraversalOptions::recursive()
        };
        let once = db.children_of("roles", &a, "roles", &Map::new(), &dedup).unwrap();
        assert_eq!(ids(&once), vec!["B", "D", "C"]);
    }

    #[test]
    fn test_filter_stops_descent() {
        let mut db = diamond();
        db.update_node(
            "roles",
            &kw(json!({"id": "B", "disabled": true})),
            Default::default(),
        )
        .unwrap();
        let found = db
            .children_of(
                "roles",
                &kw(json!({"id": "A"})),
                "roles",
                &kw(json!({"disabled": false})),
                &TraversalOptions::recursive(),
            )
            .unwrap();
        assert_eq!(ids(&found), vec!["C", "D"]);
    }

    #[test]
    fn test_parents_shapes() {
        let db = diamond();
        let d = kw(json!({"id": "D"}));
        let refs = db
            .node_parents("roles", &d, None, &TraversalOptions::from_json(&json!({"refs": true})))
            .unwrap();
        assert_eq!(refs, vec![json!("roles^B^roles"), json!("roles^C^roles")]);

        let only_id = db
            .node_parents(
                "roles",
                &d,
                Some("parent_role_id"),
                &TraversalOptions::from_json(&json!({"fkey_only_id": true})),
            )
            .unwrap();
        assert_eq!(only_id, vec![json!("B"), json!("C")]);

        let nodes = db
            .node_parents("roles", &d, None, &TraversalOptions::from_json(&json!({"collapsed_view": true})))
            .unwrap();
        assert_eq!(nodes[0]["id"], json!("B"));

        assert!(matches!(
            db.node_parents("roles", &d, Some("roles"), &TraversalOptions::default()),
            Err(ApiError::LinkError(_))
        ));
    }

    #[test]
    fn test_jtree_paths() {
        let db = diamond();
        let tree = db
            .topic_jtree(
                "roles",
                "roles",
                Some("children"),
                &Map::new(),
                &Map::new(),
                &TraversalOptions::default(),
            )
            .unwrap();
        assert_eq!(tree["id"], json!("A"));
        assert_eq!(tree["__path__"], json!("A"));
        assert!(tree.get("roles").is_none());
        let b = &tree["children"][0];
        assert_eq!(b["__path__"], json!("A`B"));
        assert_eq!(b["children"][0]["__path__"], json!("A`B`D"));
        assert_eq!(tree["children"][1]["children"][0]["id"], json!("D"));
    }
}
