//! Treedb: schema registry, node graph and record store of one named database.
//!
//! Node store operations live here; traversal, snapshots and import/export extend
//! [`Treedb`] from their own modules.

use crate::error::ApiError;
use crate::graph::link::{self, Touched};
use crate::graph::{node_matches, Graph, LinkSpec, Node, NodeSlot, Slot, TopicIndex};
use crate::schema::system::SNAPS_TOPIC;
use crate::schema::{
    parse_schema, ColumnDesc, ColumnFlag, ColumnType, Schema, SchemaRegistry, TopicDesc,
};
use crate::store::{AppendOptions, MatchCond, RecordStore, StoredRecord};
use crate::types::{now_epoch, option_set, ChildRef, ParentRef, SnapTag, PKEY, REF_SEPARATOR};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Options for [`Treedb::open`]
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub name: String,
    /// Only the master instance writes
    pub master: bool,
}

impl OpenOptions {
    pub fn master(name: &str) -> Self {
        Self {
            name: name.to_string(),
            master: true,
        }
    }

    pub fn replica(name: &str) -> Self {
        Self {
            name: name.to_string(),
            master: false,
        }
    }
}

/// Write options of update and delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Update: create the node when it does not exist
    pub create: bool,
    /// Update: replace the links of the node with the ones given
    pub autolink: bool,
    /// Update: only touch volatile columns, nothing is written
    pub volatil: bool,
    /// Delete: sever links and ignore snapshot tags
    pub force: bool,
}

impl WriteOptions {
    pub fn from_json(options: &Value) -> Self {
        Self {
            create: option_set(options, "create"),
            autolink: option_set(options, "autolink"),
            volatil: option_set(options, "volatil"),
            force: option_set(options, "force"),
        }
    }
}

/// One open treedb
pub struct Treedb {
    pub(crate) name: String,
    pub(crate) master: bool,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) registry: SchemaRegistry,
    pub(crate) graph: Graph,
    pub(crate) active_tag: SnapTag,
}

impl Treedb {
    /// Open a treedb over `store`, resolving the schema against the stored one and loading
    /// every topic.
    pub fn open(
        store: Arc<dyn RecordStore>,
        schema_doc: &Value,
        options: OpenOptions,
    ) -> Result<Self, ApiError> {
        let schema = resolve_schema(store.as_ref(), schema_doc, &options)?;
        let registry = SchemaRegistry::new(schema);
        let graph = Graph::new(&registry);
        let mut treedb = Self {
            name: options.name,
            master: options.master,
            store,
            registry,
            graph,
            active_tag: 0,
        };
        treedb.load()?;
        info!(
            treedb_name = %treedb.name,
            topics = treedb.registry.topics().len(),
            master = treedb.master,
            active_tag = treedb.active_tag,
            "Treedb opened"
        );
        Ok(treedb)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_master(&self) -> bool {
        self.master
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Tag of the active snapshot, 0 when reading the present
    pub fn active_tag(&self) -> SnapTag {
        self.active_tag
    }

    pub fn schema_version(&self) -> &str {
        &self.registry.schema().schema_version
    }

    pub fn topics(&self) -> Vec<String> {
        self.registry.topic_names()
    }

    pub fn topic_desc(&self, topic_name: &str) -> Result<&TopicDesc, ApiError> {
        self.registry.topic_desc(topic_name)
    }

    pub fn topic_links(&self, topic_name: &str) -> Result<Vec<String>, ApiError> {
        self.registry.topic_links(topic_name)
    }

    pub fn topic_hooks(&self, topic_name: &str) -> Result<Vec<String>, ApiError> {
        self.registry.topic_hooks(topic_name)
    }

    /// Secondary key columns of a topic
    pub fn topic_pkey2s(&self, topic_name: &str) -> Result<&[String], ApiError> {
        self.registry.pkey2s(topic_name)
    }

    /// Number of main instances in a topic
    pub fn topic_size(&self, topic_name: &str) -> Result<usize, ApiError> {
        Ok(self.topic_index(topic_name)?.len())
    }

    pub(crate) fn topic_index(&self, topic_name: &str) -> Result<&TopicIndex, ApiError> {
        self.graph
            .topic(topic_name)
            .ok_or_else(|| ApiError::TopicNotFound(topic_name.to_string()))
    }

    /// Store-level name of a topic
    pub(crate) fn store_topic(&self, topic_name: &str) -> String {
        format!("{}/{}", self.name, topic_name)
    }

    pub(crate) fn ensure_master(&self) -> Result<(), ApiError> {
        if self.master {
            Ok(())
        } else {
            Err(ApiError::NotMaster(self.name.clone()))
        }
    }

    // ---------------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------------

    fn load(&mut self) -> Result<(), ApiError> {
        self.load_topic(SNAPS_TOPIC, None)?;
        self.active_tag = self.resolve_active_snap()?;

        let topics: Vec<(String, bool)> = self
            .registry
            .topics()
            .iter()
            .map(|t| (t.topic_name.clone(), t.is_system()))
            .collect();
        for (topic_name, system) in topics {
            if topic_name == SNAPS_TOPIC {
                continue;
            }
            let tag = (!system && self.active_tag != 0).then_some(self.active_tag);
            self.load_topic(&topic_name, tag)?;
        }

        let attached = link::attach_hooks(&mut self.graph, &self.registry);
        debug!(treedb_name = %self.name, links = attached, "Hooks rebuilt");
        Ok(())
    }

    /// Load the newest live version of every instance of a topic. With a tag, only records
    /// of that snapshot are considered and deletion flags are ignored.
    fn load_topic(&mut self, topic_name: &str, tag: Option<SnapTag>) -> Result<(), ApiError> {
        let desc = self.registry.topic_desc(topic_name)?.clone();
        let cond = MatchCond {
            backward: true,
            tag,
            ..Default::default()
        };
        let records = self.store.iterate(&self.store_topic(topic_name), &cond)?;

        let mut index = TopicIndex::new(&desc.pkey2s);
        let mut seen: HashSet<String> = HashSet::new();
        for record in records {
            let identity = instance_identity(&desc, &record);
            if record.deleted && tag.is_none() {
                seen.insert(identity);
                continue;
            }
            if !seen.insert(identity) {
                continue;
            }
            index.insert(Node::from_record(&desc, &record));
        }
        debug!(
            treedb_name = %self.name,
            topic_name = %topic_name,
            nodes = index.len(),
            "Topic loaded"
        );
        self.graph.set_topic(topic_name, index);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Append the current state of an instance as a new record version.
    pub(crate) fn save_instance(&mut self, at: &NodeSlot, tag: SnapTag) -> Result<(), ApiError> {
        let store_topic = self.store_topic(&at.topic_name);
        let desc = self.registry.topic_desc(&at.topic_name)?;
        let node = self
            .graph
            .instance(at)
            .ok_or_else(|| ApiError::TopicNotFound(at.topic_name.clone()))?;
        let record = node.to_record(desc);
        let stored = self.store.append(
            &store_topic,
            node.id(),
            &record,
            AppendOptions {
                tag,
                primary: node.is_primary(),
            },
        )?;
        if let Some(node) = self.graph.instance_mut(at) {
            node.meta.rowid = stored.rowid;
            node.meta.t = stored.t;
            node.meta.tag = tag;
            node.refresh_tm(desc);
        }
        Ok(())
    }

    pub(crate) fn save_touched(&mut self, touched: &Touched) -> Result<(), ApiError> {
        for at in touched {
            if self.graph.instance(at).is_some() {
                self.save_instance(at, 0)?;
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Node store
    // ---------------------------------------------------------------------

    /// Create a node. A new pkey2 value on an existing id creates a secondary instance.
    pub fn create_node(&mut self, topic_name: &str, kw: &Map<String, Value>) -> Result<Node, ApiError> {
        self.ensure_master()?;
        let desc = self.registry.topic_desc(topic_name)?.clone();
        let id = self.resolve_new_id(&desc, kw)?;
        let index = self.topic_index(topic_name)?;

        let mut primary = true;
        let mut inherit_from: Option<Node> = None;
        if let Some(main) = index.primary(&id) {
            let key2s: Vec<(&String, &str)> = desc
                .pkey2s
                .iter()
                .filter_map(|p| kw_str(kw, p).map(|k| (p, k)))
                .collect();
            let all_exist = key2s
                .iter()
                .all(|(p, k)| index.instance_slot(p, &id, k).is_some());
            if key2s.is_empty() || all_exist {
                return Err(ApiError::DuplicateKey {
                    topic: topic_name.to_string(),
                    id,
                });
            }
            primary = false;
            inherit_from = Some(main.clone());
        }

        let fields = build_fields(&desc, kw, inherit_from.as_ref())?;
        let mut node = Node::new(&desc, &id, fields, primary);
        if let Some(main) = &inherit_from {
            node.inherit_fkeys(main);
        }

        let slot = self
            .graph
            .topic_mut(topic_name)
            .ok_or_else(|| ApiError::TopicNotFound(topic_name.to_string()))?
            .insert(node);
        let at = NodeSlot::new(topic_name, slot);
        self.save_instance(&at, 0)?;

        debug!(treedb_name = %self.name, topic_name = %topic_name, id = %id, primary, "Node created");
        self.cloned(&at)
    }

    /// Update a node in place; see [`WriteOptions`] for the variants.
    pub fn update_node(
        &mut self,
        topic_name: &str,
        kw: &Map<String, Value>,
        options: WriteOptions,
    ) -> Result<Node, ApiError> {
        self.ensure_master()?;
        let desc = self.registry.topic_desc(topic_name)?.clone();

        let found = match kw_str(kw, PKEY) {
            Some(_) => self.fetch_slot(topic_name, kw)?,
            None => None,
        };
        let slot = match found {
            Some(slot) => slot,
            None if options.create => {
                let created = self.create_node(topic_name, kw)?;
                if !options.autolink {
                    return Ok(created);
                }
                let mut keyed = kw.clone();
                keyed.insert(PKEY.to_string(), Value::String(created.id().to_string()));
                self.fetch_slot(topic_name, &keyed)?
                    .ok_or_else(|| ApiError::node_not_found(topic_name, created.id()))?
            }
            None => {
                return Err(ApiError::node_not_found(
                    topic_name,
                    kw_str(kw, PKEY).unwrap_or_default(),
                ))
            }
        };
        let at = NodeSlot::new(topic_name, slot);

        if options.volatil {
            let mut updates = Vec::new();
            for col in desc.cols.iter().filter(|c| c.is_volatile() && c.id != PKEY) {
                if let Some(value) = kw.get(&col.id) {
                    check_value(&desc, col, value)?;
                    updates.push((col.id.clone(), value.clone()));
                }
            }
            if let Some(node) = self.graph.instance_mut(&at) {
                for (name, value) in updates {
                    node.set_field(&name, value);
                }
            }
            return self.cloned(&at);
        }

        let mut updates = Vec::new();
        for (name, value) in kw {
            let Some(col) = desc.col(name) else {
                continue;
            };
            if name == PKEY || desc.pkey2s.contains(name) || col.is_link() {
                continue;
            }
            if value.is_null() {
                if col.is_required() {
                    return Err(ApiError::ValidationFailed(format!(
                        "{}^{} is required",
                        topic_name, name
                    )));
                }
            } else {
                check_value(&desc, col, value)?;
            }
            updates.push((name.clone(), value.clone()));
        }
        let id = match self.graph.instance_mut(&at) {
            Some(node) => {
                for (name, value) in updates {
                    node.set_field(&name, value);
                }
                node.refresh_tm(&desc);
                node.id().to_string()
            }
            None => return Err(ApiError::node_not_found(topic_name, "")),
        };

        let mut touched = Touched::new();
        touched.insert(at.clone());
        let linked = if options.autolink {
            self.autolink(topic_name, &id, kw, &mut touched)
        } else {
            Ok(())
        };
        // links made before a failure stay, so persist them either way
        self.save_touched(&touched)?;
        linked?;

        debug!(treedb_name = %self.name, topic_name = %topic_name, id = %id, "Node updated");
        self.cloned(&at)
    }

    /// Delete the instances addressed by `kw`. Returns how many were deleted.
    pub fn delete_node(
        &mut self,
        topic_name: &str,
        kw: &Map<String, Value>,
        options: WriteOptions,
    ) -> Result<usize, ApiError> {
        self.ensure_master()?;
        let desc = self.registry.topic_desc(topic_name)?.clone();
        let id = kw_str(kw, PKEY)
            .ok_or_else(|| ApiError::ValidationFailed("delete requires 'id'".to_string()))?
            .to_string();
        let index = self.topic_index(topic_name)?;
        let main_slot = index
            .primary_slot(&id)
            .ok_or_else(|| ApiError::node_not_found(topic_name, &id))?;

        let mut filter = Map::new();
        filter.insert(PKEY.to_string(), Value::String(id.clone()));
        let mut secondaries = Vec::new();
        for pkey2 in &desc.pkey2s {
            if let Some(key2) = kw_str(kw, pkey2) {
                filter.insert(pkey2.clone(), Value::String(key2.to_string()));
                if let Some(slot) = index.instance_slot(pkey2, &id, key2) {
                    if slot != main_slot && !secondaries.contains(&slot) {
                        secondaries.push(slot);
                    }
                }
            }
        }

        let mut deleted = 0;
        for slot in secondaries {
            self.delete_instance(&desc, slot, options.force)?;
            deleted += 1;
        }

        let main_matches = self
            .graph
            .node(topic_name, &id)
            .map_or(false, |main| node_matches(main, &desc, &filter));
        if main_matches {
            deleted += self.delete_main(&desc, &id, options.force)?;
        }

        if deleted == 0 {
            return Err(ApiError::node_not_found(topic_name, &id));
        }
        info!(treedb_name = %self.name, topic_name = %topic_name, id = %id, deleted, "Node deleted");
        Ok(deleted)
    }

    /// Delete the main instance and with it every instance of the id.
    fn delete_main(&mut self, desc: &TopicDesc, id: &str, force: bool) -> Result<usize, ApiError> {
        let topic_name = desc.topic_name.as_str();
        let (tag, down, up) = match self.graph.node(topic_name, id) {
            Some(node) => (node.meta().tag, node.has_down_links(), node.has_up_links()),
            None => return Err(ApiError::node_not_found(topic_name, id)),
        };
        if tag != 0 && !force {
            return Err(ApiError::ValidationFailed(format!(
                "{}^{} belongs to snapshot {}, use force",
                topic_name, id, tag
            )));
        }
        if (down || up) && !force {
            let reason = match (down, up) {
                (true, true) => "has children and parents",
                (true, false) => "has children",
                _ => "has parents",
            };
            return Err(ApiError::HasDependents {
                topic: topic_name.to_string(),
                id: id.to_string(),
                reason: reason.to_string(),
            });
        }

        let mut touched = Touched::new();
        let mut severed =
            link::unlink_children(&mut self.graph, &self.registry, topic_name, id, &mut touched);
        if let Ok(children) = severed {
            severed =
                link::clean_up_links(&mut self.graph, &self.registry, topic_name, id, &mut touched)
                    .map(|parents| children + parents);
        }
        let instances = self.graph.instance_slots(topic_name, id);
        touched.retain(|at| !instances.contains(at));
        self.save_touched(&touched)?;
        let unlinked = severed?;
        if unlinked > 0 {
            info!(topic_name = %topic_name, id = %id, links = unlinked, "Links severed by forced delete");
        }

        let mut count = 0;
        for at in instances {
            self.delete_instance(desc, at.slot, true)?;
            count += 1;
        }
        Ok(count)
    }

    /// Soft delete one instance record and drop it from the indexes.
    fn delete_instance(&mut self, desc: &TopicDesc, slot: Slot, force: bool) -> Result<(), ApiError> {
        let store_topic = self.store_topic(&desc.topic_name);
        let index = self
            .graph
            .topic_mut(&desc.topic_name)
            .ok_or_else(|| ApiError::TopicNotFound(desc.topic_name.clone()))?;
        let (rowid, tag) = match index.get(slot) {
            Some(node) => (node.meta().rowid, node.meta().tag),
            None => return Ok(()),
        };
        if tag != 0 && !force {
            return Err(ApiError::ValidationFailed(format!(
                "instance of topic {} belongs to snapshot {}, use force",
                desc.topic_name, tag
            )));
        }
        index.remove(slot);
        if rowid != 0 {
            self.store.mark_deleted(&store_topic, rowid)?;
        }
        Ok(())
    }

    /// Link `child` under the hook of `parent` and persist the child side.
    pub fn link_nodes(&mut self, spec: &LinkSpec<'_>) -> Result<bool, ApiError> {
        self.ensure_master()?;
        let mut touched = Touched::new();
        let changed = link::link(&mut self.graph, &self.registry, spec, &mut touched)?;
        self.save_touched(&touched)?;
        Ok(changed)
    }

    /// Remove a link; succeeds when it was already absent.
    pub fn unlink_nodes(&mut self, spec: &LinkSpec<'_>) -> Result<bool, ApiError> {
        self.ensure_master()?;
        let mut touched = Touched::new();
        let removed = link::unlink(&mut self.graph, &self.registry, spec, &mut touched)?;
        self.save_touched(&touched)?;
        Ok(removed)
    }

    /// Two-phase lookup: main instance first, then the pkey2 indexes.
    pub fn get_node(&self, topic_name: &str, kw: &Map<String, Value>) -> Result<Option<&Node>, ApiError> {
        let index = self.topic_index(topic_name)?;
        Ok(self.fetch_slot(topic_name, kw)?.and_then(|slot| index.get(slot)))
    }

    pub(crate) fn fetch_slot(&self, topic_name: &str, kw: &Map<String, Value>) -> Result<Option<Slot>, ApiError> {
        let desc = self.registry.topic_desc(topic_name)?;
        let index = self.topic_index(topic_name)?;
        let id = kw_str(kw, PKEY)
            .ok_or_else(|| ApiError::ValidationFailed(format!("{}: 'id' required", topic_name)))?;

        let mut filter = Map::new();
        filter.insert(PKEY.to_string(), Value::String(id.to_string()));
        for pkey2 in &desc.pkey2s {
            if let Some(key2) = kw_str(kw, pkey2) {
                filter.insert(pkey2.clone(), Value::String(key2.to_string()));
            }
        }

        if let Some(slot) = index.primary_slot(id) {
            if index.get(slot).map_or(false, |n| node_matches(n, desc, &filter)) {
                return Ok(Some(slot));
            }
        }
        for pkey2 in &desc.pkey2s {
            let Some(key2) = kw_str(kw, pkey2) else {
                continue;
            };
            if let Some(slot) = index.instance_slot(pkey2, id, key2) {
                if index.get(slot).map_or(false, |n| node_matches(n, desc, &filter)) {
                    return Ok(Some(slot));
                }
            }
        }
        Ok(None)
    }

    /// Main instances matching `filter`, ordered by id. A `__filter__` object in the filter
    /// replaces it.
    pub fn list_nodes(&self, topic_name: &str, filter: &Map<String, Value>) -> Result<Vec<&Node>, ApiError> {
        let desc = self.registry.topic_desc(topic_name)?;
        let filter = effective_filter(filter);
        Ok(self
            .topic_index(topic_name)?
            .primaries()
            .filter(|n| node_matches(n, desc, filter))
            .collect())
    }

    /// Every instance of the pkey2 indexes (or only `pkey2`) matching `filter`.
    pub fn list_instances(
        &self,
        topic_name: &str,
        pkey2: Option<&str>,
        filter: &Map<String, Value>,
    ) -> Result<Vec<&Node>, ApiError> {
        let desc = self.registry.topic_desc(topic_name)?;
        if let Some(pkey2) = pkey2 {
            if !self.registry.pkey2s(topic_name)?.iter().any(|p| p == pkey2) {
                return Err(ApiError::ValidationFailed(format!(
                    "'{}' is not a pkey2 of topic {}",
                    pkey2, topic_name
                )));
            }
        }
        let filter = effective_filter(filter);
        Ok(self
            .topic_index(topic_name)?
            .instances(pkey2)
            .into_iter()
            .filter(|n| node_matches(n, desc, filter))
            .collect())
    }

    fn cloned(&self, at: &NodeSlot) -> Result<Node, ApiError> {
        self.graph
            .instance(at)
            .cloned()
            .ok_or_else(|| ApiError::TopicNotFound(at.topic_name.clone()))
    }

    fn resolve_new_id(&self, desc: &TopicDesc, kw: &Map<String, Value>) -> Result<String, ApiError> {
        let id_col = desc.col(PKEY);
        if id_col.map_or(false, ColumnDesc::is_rowid) {
            let next = self.store.last_rowid(&self.store_topic(&desc.topic_name))? + 1;
            return Ok(next.to_string());
        }
        if let Some(id) = kw_str(kw, PKEY) {
            return Ok(id.to_string());
        }
        if id_col.map_or(false, |c| c.has_flag(&ColumnFlag::Uuid)) {
            return Ok(self.generate_uuid(&desc.topic_name));
        }
        Err(ApiError::ValidationFailed(format!(
            "{}: 'id' required",
            desc.topic_name
        )))
    }

    fn generate_uuid(&self, topic_name: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_bytes());
        hasher.update(topic_name.as_bytes());
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        hasher.update(&nanos.to_le_bytes());
        let size = self.graph.topic(topic_name).map_or(0, TopicIndex::len);
        hasher.update(&size.to_le_bytes());
        hex::encode(&hasher.finalize().as_bytes()[..16])
    }

    // ---------------------------------------------------------------------
    // Autolink
    // ---------------------------------------------------------------------

    /// Drop every up-link of the node, relink from the fkeys in `kw` and reset the hooks in
    /// `kw` to exactly the children listed.
    fn autolink(
        &mut self,
        topic_name: &str,
        id: &str,
        kw: &Map<String, Value>,
        touched: &mut Touched,
    ) -> Result<(), ApiError> {
        let desc = self.registry.topic_desc(topic_name)?.clone();
        link::clean_up_links(&mut self.graph, &self.registry, topic_name, id, touched)?;

        for fkey in desc.links() {
            let Some(value) = kw.get(&fkey.id) else {
                continue;
            };
            for parent in self.parse_fkey_value(topic_name, &fkey.id, value)? {
                let spec = LinkSpec {
                    hook: &parent.hook_name,
                    parent_topic: &parent.topic_name,
                    parent_id: &parent.id,
                    child_topic: topic_name,
                    child_id: id,
                };
                link::link(&mut self.graph, &self.registry, &spec, touched)?;
            }
        }

        for hook in desc.hooks() {
            let Some(value) = kw.get(&hook.id) else {
                continue;
            };
            let wanted = parse_hook_value(hook, value)?;
            let current: Vec<ChildRef> = self
                .graph
                .node(topic_name, id)
                .map(|n| n.hook_refs(&hook.id).to_vec())
                .unwrap_or_default();
            for child in current.iter().filter(|c| !wanted.contains(c)) {
                let spec = LinkSpec {
                    hook: &hook.id,
                    parent_topic: topic_name,
                    parent_id: id,
                    child_topic: &child.topic_name,
                    child_id: &child.id,
                };
                link::unlink(&mut self.graph, &self.registry, &spec, touched)?;
            }
            for child in &wanted {
                let spec = LinkSpec {
                    hook: &hook.id,
                    parent_topic: topic_name,
                    parent_id: id,
                    child_topic: &child.topic_name,
                    child_id: &child.id,
                };
                link::link(&mut self.graph, &self.registry, &spec, touched)?;
            }
        }
        Ok(())
    }

    /// Parent references given for an fkey column, in any of the rendered shapes.
    fn parse_fkey_value(
        &self,
        topic_name: &str,
        fkey: &str,
        value: &Value,
    ) -> Result<Vec<ParentRef>, ApiError> {
        let owner = self
            .registry
            .fkey_owner(topic_name, fkey)
            .map(|(topic, hook)| (topic.topic_name.clone(), hook.id.clone()));
        let unresolved = |item: &str| {
            ApiError::LinkError(format!(
                "cannot resolve parent '{}' of {}^{}",
                item, topic_name, fkey
            ))
        };

        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) if map.contains_key(PKEY) => vec![value],
            Value::Object(map) => {
                return map
                    .keys()
                    .map(|k| self.parse_fkey_value(topic_name, fkey, &Value::String(k.clone())))
                    .collect::<Result<Vec<_>, _>>()
                    .map(|v| v.into_iter().flatten().collect());
            }
            Value::Null => Vec::new(),
            other => vec![other],
        };

        let mut refs = Vec::new();
        for item in items {
            let parent = match item {
                Value::String(s) if s.is_empty() => continue,
                Value::String(s) => {
                    let parts: Vec<&str> = s.split(REF_SEPARATOR).collect();
                    match (parts.as_slice(), &owner) {
                        ([_, _, _], _) => ParentRef::decode(s).ok_or_else(|| unresolved(s))?,
                        ([topic, id], Some((_, hook))) => ParentRef::new(topic, id, hook),
                        ([id], Some((topic, hook))) => ParentRef::new(topic, id, hook),
                        _ => return Err(unresolved(s)),
                    }
                }
                Value::Object(map) => {
                    let id = map
                        .get(PKEY)
                        .and_then(Value::as_str)
                        .ok_or_else(|| unresolved(&item.to_string()))?;
                    let topic = map
                        .get("topic_name")
                        .and_then(Value::as_str)
                        .or(owner.as_ref().map(|o| o.0.as_str()))
                        .ok_or_else(|| unresolved(id))?;
                    let hook = map
                        .get("hook_name")
                        .and_then(Value::as_str)
                        .or(owner.as_ref().map(|o| o.1.as_str()))
                        .ok_or_else(|| unresolved(id))?;
                    ParentRef::new(topic, id, hook)
                }
                other => return Err(unresolved(&other.to_string())),
            };
            if !refs.contains(&parent) {
                refs.push(parent);
            }
        }
        Ok(refs)
    }
}

/// Children given for a hook column, in any of the rendered shapes.
fn parse_hook_value(hook: &ColumnDesc, value: &Value) -> Result<Vec<ChildRef>, ApiError> {
    let default_topic = hook
        .hook
        .first()
        .map(|(topic, _)| topic.as_str())
        .unwrap_or_default();
    let bad = |item: &Value| {
        ApiError::LinkError(format!("bad child reference {} in hook {}", item, hook.id))
    };

    let mut children = Vec::new();
    let mut push = |child: ChildRef| {
        if !children.contains(&child) {
            children.push(child);
        }
    };
    match value {
        Value::Array(items) => {
            for item in items {
                let child = match item {
                    Value::String(s) => ChildRef::decode(s, default_topic).ok_or_else(|| bad(item))?,
                    Value::Object(map) => {
                        let id = map.get(PKEY).and_then(Value::as_str).ok_or_else(|| bad(item))?;
                        let topic = map
                            .get("topic_name")
                            .and_then(Value::as_str)
                            .unwrap_or(default_topic);
                        ChildRef::new(topic, id)
                    }
                    _ => return Err(bad(item)),
                };
                push(child);
            }
        }
        Value::Object(map) => {
            for (id, topic) in map {
                push(ChildRef::new(topic.as_str().unwrap_or(default_topic), id));
            }
        }
        Value::String(s) if !s.is_empty() => {
            push(ChildRef::decode(s, default_topic).ok_or_else(|| bad(value))?)
        }
        Value::String(_) | Value::Null => {}
        _ => return Err(bad(value)),
    }
    Ok(children)
}

/// Pick the schema to run with. Only a master stores or replaces the stored schema.
fn resolve_schema(
    store: &dyn RecordStore,
    schema_doc: &Value,
    options: &OpenOptions,
) -> Result<Schema, ApiError> {
    let key = format!("schema/{}", options.name);
    let stored = match store.get_meta(&key)? {
        Some(doc) => match parse_schema(&doc) {
            Ok(schema) => Some(schema),
            Err(err) => {
                warn!(treedb_name = %options.name, error = %err, "Stored schema is invalid");
                None
            }
        },
        None => None,
    };

    match parse_schema(schema_doc) {
        Ok(given) => match stored {
            None => {
                if options.master {
                    store.put_meta(&key, &given.raw)?;
                }
                Ok(given)
            }
            Some(stored) if options.master && given.version_number() > stored.version_number() => {
                info!(
                    treedb_name = %options.name,
                    from = %stored.schema_version,
                    to = %given.schema_version,
                    "Schema upgraded"
                );
                store.put_meta(&key, &given.raw)?;
                Ok(given)
            }
            Some(stored) => Ok(stored),
        },
        Err(err) if options.master => {
            error!(treedb_name = %options.name, error = %err, "Invalid schema");
            Err(err.into())
        }
        Err(err) => match stored {
            Some(stored) => {
                warn!(
                    treedb_name = %options.name,
                    error = %err,
                    "Invalid schema, using the last known good one"
                );
                Ok(stored)
            }
            None => Err(err.into()),
        },
    }
}

/// Key that identifies an instance across record versions
fn instance_identity(desc: &TopicDesc, record: &StoredRecord) -> String {
    if record.primary {
        return format!("P\u{1f}{}", record.key);
    }
    let key2s: Vec<&str> = desc
        .pkey2s
        .iter()
        .map(|p| record.payload.get(p).and_then(Value::as_str).unwrap_or(""))
        .collect();
    format!("S\u{1f}{}\u{1f}{}", record.key, key2s.join("\u{1f}"))
}

/// Field values of a new node: supplied, inherited, default, time or empty, in that order.
fn build_fields(
    desc: &TopicDesc,
    kw: &Map<String, Value>,
    inherit_from: Option<&Node>,
) -> Result<Map<String, Value>, ApiError> {
    let mut fields = Map::new();
    for col in desc.cols.iter().filter(|c| !c.is_link() && c.id != PKEY) {
        let supplied = kw.get(&col.id).filter(|v| !v.is_null());
        if let Some(value) = supplied {
            check_value(desc, col, value)?;
        }
        let is_numeric_time = col.is_time()
            && matches!(
                col.col_type,
                ColumnType::Integer | ColumnType::Real | ColumnType::Number
            );

        let value = match supplied {
            Some(value) if is_numeric_time && value.as_f64() == Some(0.0) => Value::from(now_epoch()),
            Some(value) => value.clone(),
            None => {
                let inherited = inherit_from
                    .filter(|_| col.has_flag(&ColumnFlag::Inherit))
                    .and_then(|main| main.field(&col.id));
                match (inherited, &col.default) {
                    (Some(value), _) => value.clone(),
                    (None, _) if is_numeric_time => Value::from(now_epoch()),
                    (None, Some(default)) => default.clone(),
                    (None, None) if col.is_required() => {
                        return Err(ApiError::ValidationFailed(format!(
                            "{}^{} is required",
                            desc.topic_name, col.id
                        )))
                    }
                    (None, None) => col.col_type.empty_value(),
                }
            }
        };
        fields.insert(col.id.clone(), value);
    }
    Ok(fields)
}

/// Type and enum membership of a supplied value. No coercion.
fn check_value(desc: &TopicDesc, col: &ColumnDesc, value: &Value) -> Result<(), ApiError> {
    if !col.col_type.matches(value) {
        return Err(ApiError::ValidationFailed(format!(
            "{}^{}: expected {}, got {}",
            desc.topic_name, col.id, col.col_type, value
        )));
    }
    if let Some(allowed) = &col.enum_values {
        let ok = match value {
            Value::Array(items) if col.col_type == ColumnType::Array => {
                items.iter().all(|v| allowed.contains(v))
            }
            other => allowed.contains(other),
        };
        if !ok {
            return Err(ApiError::ValidationFailed(format!(
                "{}^{}: {} is not an allowed value",
                desc.topic_name, col.id, value
            )));
        }
    }
    Ok(())
}

fn effective_filter(filter: &Map<String, Value>) -> &Map<String, Value> {
    filter
        .get("__filter__")
        .and_then(Value::as_object)
        .unwrap_or(filter)
}

/// Non-empty string value of a key
pub(crate) fn kw_str<'a>(kw: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    kw.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
