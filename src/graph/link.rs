//! Link engine.
//!
//! Every change to a hook or an fkey goes through this module so that a parent's hook lists
//! a child exactly when that child's fkey references the parent. Only the child side is
//! persisted; callers save the instances collected in the touched set.

use super::{Graph, NodeSlot};
use crate::error::ApiError;
use crate::schema::{LinkShape, SchemaRegistry};
use crate::types::{ChildRef, ParentRef};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Instances whose fkeys changed and need a new record version
pub type Touched = BTreeSet<NodeSlot>;

/// Both ends of a link through a parent hook
#[derive(Debug, Clone, Copy)]
pub struct LinkSpec<'a> {
    pub hook: &'a str,
    pub parent_topic: &'a str,
    pub parent_id: &'a str,
    pub child_topic: &'a str,
    pub child_id: &'a str,
}

impl<'a> LinkSpec<'a> {
    fn parent_ref(&self) -> ParentRef {
        ParentRef::new(self.parent_topic, self.parent_id, self.hook)
    }

    fn child_ref(&self) -> ChildRef {
        ChildRef::new(self.child_topic, self.child_id)
    }
}

/// Link `child` under `parent^hook`. Returns whether anything changed.
pub fn link(
    graph: &mut Graph,
    registry: &SchemaRegistry,
    spec: &LinkSpec<'_>,
    touched: &mut Touched,
) -> Result<bool, ApiError> {
    let fkey_col = registry
        .hook_child_field(spec.parent_topic, spec.hook, spec.child_topic)?
        .clone();

    if spec.parent_topic == spec.child_topic && spec.parent_id == spec.child_id {
        return Err(ApiError::LinkError(format!(
            "cannot link '{}^{}' to itself",
            spec.parent_topic, spec.parent_id
        )));
    }
    if graph.node(spec.parent_topic, spec.parent_id).is_none() {
        return Err(ApiError::node_not_found(spec.parent_topic, spec.parent_id));
    }
    let child_slots = graph.instance_slots(spec.child_topic, spec.child_id);
    if child_slots.is_empty() {
        return Err(ApiError::node_not_found(spec.child_topic, spec.child_id));
    }

    let parent_ref = spec.parent_ref();
    let child_ref = spec.child_ref();
    let shape = fkey_col.link_shape();
    let mut changed = false;

    if shape == LinkShape::Single {
        let previous = graph
            .node(spec.child_topic, spec.child_id)
            .and_then(|child| child.fkey_refs(&fkey_col.id).first().cloned());
        if let Some(previous) = previous.filter(|p| *p != parent_ref) {
            info!(
                topic_name = %spec.child_topic,
                id = %spec.child_id,
                fkey = %fkey_col.id,
                from = %previous,
                to = %parent_ref,
                "Reparenting node"
            );
            detach_from_hook(graph, &previous, &child_ref);
        }
    }

    for at in child_slots {
        let Some(child) = graph.instance_mut(&at) else {
            continue;
        };
        let refs = child.fkeys.entry(fkey_col.id.clone()).or_default();
        let updated = match shape {
            LinkShape::Single if refs.len() == 1 && refs[0] == parent_ref => false,
            LinkShape::Single => {
                *refs = vec![parent_ref.clone()];
                true
            }
            LinkShape::List | LinkShape::Dict if refs.contains(&parent_ref) => false,
            LinkShape::List | LinkShape::Dict => {
                refs.push(parent_ref.clone());
                true
            }
        };
        if updated {
            changed = true;
            touched.insert(at);
        }
    }

    if let Some(parent) = graph.node_mut(spec.parent_topic, spec.parent_id) {
        let children = parent.hooks.entry(spec.hook.to_string()).or_default();
        if !children.contains(&child_ref) {
            children.push(child_ref);
            changed = true;
        }
    }

    debug!(
        hook = %spec.hook,
        parent = %parent_ref,
        child_topic = %spec.child_topic,
        child_id = %spec.child_id,
        changed,
        "Link"
    );
    Ok(changed)
}

/// Remove the link between `parent^hook` and `child`, tolerating either side being absent.
pub fn unlink(
    graph: &mut Graph,
    registry: &SchemaRegistry,
    spec: &LinkSpec<'_>,
    touched: &mut Touched,
) -> Result<bool, ApiError> {
    let fkey = registry
        .hook_child_field(spec.parent_topic, spec.hook, spec.child_topic)?
        .id
        .clone();

    let parent_exists = graph.node(spec.parent_topic, spec.parent_id).is_some();
    let child_slots = graph.instance_slots(spec.child_topic, spec.child_id);
    if !parent_exists && child_slots.is_empty() {
        return Err(ApiError::node_not_found(spec.child_topic, spec.child_id));
    }

    let parent_ref = spec.parent_ref();
    let mut removed = detach_from_hook(graph, &parent_ref, &spec.child_ref());
    for at in child_slots {
        if drop_fkey_ref(graph, &at, &fkey, &parent_ref) {
            removed = true;
            touched.insert(at);
        }
    }

    debug!(
        hook = %spec.hook,
        parent = %parent_ref,
        child_topic = %spec.child_topic,
        child_id = %spec.child_id,
        removed,
        "Unlink"
    );
    Ok(removed)
}

/// Unlink every child held in any hook of a node. Returns the number of links removed.
pub fn unlink_children(
    graph: &mut Graph,
    registry: &SchemaRegistry,
    topic_name: &str,
    id: &str,
    touched: &mut Touched,
) -> Result<usize, ApiError> {
    let desc = registry.topic_desc(topic_name)?;
    let mut pending = Vec::new();
    if let Some(node) = graph.node(topic_name, id) {
        for hook in desc.hooks() {
            for child in node.hook_refs(&hook.id) {
                pending.push((hook.id.clone(), child.clone()));
            }
        }
    }

    let mut count = 0;
    for (hook, child) in pending {
        let spec = LinkSpec {
            hook: &hook,
            parent_topic: topic_name,
            parent_id: id,
            child_topic: &child.topic_name,
            child_id: &child.id,
        };
        if unlink(graph, registry, &spec, touched)? {
            count += 1;
        }
    }
    Ok(count)
}

/// Remove every up-link of a node: its fkey references and the matching parent hook entries.
pub fn clean_up_links(
    graph: &mut Graph,
    registry: &SchemaRegistry,
    topic_name: &str,
    id: &str,
    touched: &mut Touched,
) -> Result<usize, ApiError> {
    let desc = registry.topic_desc(topic_name)?;
    let child_ref = ChildRef::new(topic_name, id);
    let mut count = 0;
    for fkey in desc.links() {
        let mut refs: Vec<ParentRef> = Vec::new();
        for at in graph.instance_slots(topic_name, id) {
            if let Some(node) = graph.instance(&at) {
                for r in node.fkey_refs(&fkey.id) {
                    if !refs.contains(r) {
                        refs.push(r.clone());
                    }
                }
            }
        }
        for parent_ref in refs {
            detach_from_hook(graph, &parent_ref, &child_ref);
            for at in graph.instance_slots(topic_name, id) {
                if drop_fkey_ref(graph, &at, &fkey.id, &parent_ref) {
                    touched.insert(at);
                }
            }
            count += 1;
        }
    }
    Ok(count)
}

/// Rebuild hooks from the fkey references of loaded nodes. Returns the links attached.
pub fn attach_hooks(graph: &mut Graph, registry: &SchemaRegistry) -> usize {
    let mut pending: Vec<(ChildRef, String, ParentRef)> = Vec::new();
    for desc in registry.topics() {
        let Some(index) = graph.topic(&desc.topic_name) else {
            continue;
        };
        let mut seen = BTreeSet::new();
        let nodes = index.primaries().chain(index.instances(None));
        for node in nodes {
            if !seen.insert(node.id().to_string()) {
                continue;
            }
            for fkey in desc.links() {
                for parent_ref in node.fkey_refs(&fkey.id) {
                    pending.push((
                        ChildRef::new(&desc.topic_name, node.id()),
                        fkey.id.clone(),
                        parent_ref.clone(),
                    ));
                }
            }
        }
    }

    let mut attached = 0;
    for (child, fkey, parent_ref) in pending {
        let declared = registry
            .hook_child_field(&parent_ref.topic_name, &parent_ref.hook_name, &child.topic_name)
            .map(|col| col.id == fkey)
            .unwrap_or(false);
        if !declared {
            warn!(
                child = %child,
                fkey = %fkey,
                reference = %parent_ref,
                "fkey reference does not match any hook"
            );
            continue;
        }
        match graph.node_mut(&parent_ref.topic_name, &parent_ref.id) {
            Some(parent) => {
                let children = parent.hooks.entry(parent_ref.hook_name.clone()).or_default();
                if !children.contains(&child) {
                    children.push(child);
                    attached += 1;
                }
            }
            None => warn!(
                child = %child,
                reference = %parent_ref,
                "Parent node not found, link skipped"
            ),
        }
    }
    attached
}

fn detach_from_hook(graph: &mut Graph, parent_ref: &ParentRef, child: &ChildRef) -> bool {
    let Some(parent) = graph.node_mut(&parent_ref.topic_name, &parent_ref.id) else {
        return false;
    };
    let Some(children) = parent.hooks.get_mut(&parent_ref.hook_name) else {
        return false;
    };
    let before = children.len();
    children.retain(|c| c != child);
    children.len() != before
}

fn drop_fkey_ref(graph: &mut Graph, at: &NodeSlot, fkey: &str, parent_ref: &ParentRef) -> bool {
    let Some(refs) = graph.instance_mut(at).and_then(|n| n.fkeys.get_mut(fkey)) else {
        return false;
    };
    let before = refs.len();
    refs.retain(|r| r != parent_ref);
    refs.len() != before
}
