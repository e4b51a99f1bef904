//! Snapshot Manager
//!
//! A snapshot is a `__snaps__` node whose rowid is the tag written on a copy of every user
//! record. Activation takes effect when the treedb is next opened.

use crate::error::ApiError;
use crate::graph::{Node, NodeSlot};
use crate::schema::system::SNAPS_TOPIC;
use crate::treedb::Treedb;
use crate::types::SnapTag;
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Snapshot name that deactivates the active snapshot
pub const CLEAR_SNAP: &str = "__clear__";

impl Treedb {
    /// Tag every user record under a new snapshot `name`.
    pub fn shoot_snap(&mut self, name: &str, description: &str) -> Result<Node, ApiError> {
        self.ensure_master()?;
        if self.find_snap(name).is_some() {
            return Err(ApiError::SnapshotExists(name.to_string()));
        }

        let mut kw = Map::new();
        kw.insert("name".to_string(), Value::String(name.to_string()));
        kw.insert(
            "date".to_string(),
            Value::String(chrono::Utc::now().to_rfc2822()),
        );
        kw.insert(
            "description".to_string(),
            Value::String(description.to_string()),
        );
        kw.insert("active".to_string(), Value::Bool(false));
        let snap = self.create_node(SNAPS_TOPIC, &kw)?;
        let tag = snap_tag(&snap)?;

        let mut tagged = 0;
        let topics: Vec<String> = self
            .registry
            .topics()
            .iter()
            .filter(|t| !t.is_system())
            .map(|t| t.topic_name.clone())
            .collect();
        for topic_name in topics {
            let slots = self.topic_index(&topic_name)?.slots();
            for slot in slots {
                self.save_instance(&NodeSlot::new(&topic_name, slot), tag)?;
                tagged += 1;
            }
        }
        self.store.flush()?;

        info!(treedb_name = %self.name, snap = %name, tag, records = tagged, "Snapshot shot");
        Ok(snap)
    }

    /// Mark `name` as the active snapshot and return its tag. [`CLEAR_SNAP`] deactivates the
    /// active one and returns 0.
    pub fn activate_snap(&mut self, name: &str) -> Result<SnapTag, ApiError> {
        self.ensure_master()?;
        if name == CLEAR_SNAP {
            for id in self.active_snap_ids() {
                self.set_snap_active(&id, false)?;
            }
            info!(treedb_name = %self.name, "Snapshot deactivated");
            return Ok(0);
        }

        let snap = self
            .find_snap(name)
            .ok_or_else(|| ApiError::SnapshotNotFound(name.to_string()))?;
        let tag = snap_tag(snap)?;
        let id = snap.id().to_string();
        if is_active(snap) {
            return Ok(tag);
        }

        for other in self.active_snap_ids() {
            self.set_snap_active(&other, false)?;
        }
        self.set_snap_active(&id, true)?;
        info!(treedb_name = %self.name, snap = %name, tag, "Snapshot activated");
        Ok(tag)
    }

    pub fn deactivate_snap(&mut self) -> Result<SnapTag, ApiError> {
        self.activate_snap(CLEAR_SNAP)
    }

    /// Snapshots matching `filter`
    pub fn list_snaps(&self, filter: &Map<String, Value>) -> Result<Vec<&Node>, ApiError> {
        self.list_nodes(SNAPS_TOPIC, filter)
    }

    /// Pick the snapshot that frames this session. With several active, only the newest
    /// stays active.
    pub(crate) fn resolve_active_snap(&mut self) -> Result<SnapTag, ApiError> {
        let mut active: Vec<(SnapTag, String)> = self
            .active_snap_ids()
            .into_iter()
            .filter_map(|id| id.parse().ok().map(|tag| (tag, id)))
            .collect();
        active.sort();

        let Some((tag, _)) = active.last().cloned() else {
            return Ok(0);
        };
        for (stale, id) in &active[..active.len() - 1] {
            warn!(treedb_name = %self.name, tag = *stale, "More than one active snapshot");
            if self.master {
                self.set_snap_active(id, false)?;
            }
        }
        Ok(tag)
    }

    fn find_snap(&self, name: &str) -> Option<&Node> {
        self.graph
            .topic(SNAPS_TOPIC)?
            .primaries()
            .find(|snap| snap.field("name").and_then(Value::as_str) == Some(name))
    }

    fn active_snap_ids(&self) -> Vec<String> {
        self.graph
            .topic(SNAPS_TOPIC)
            .map(|index| {
                index
                    .primaries()
                    .filter(|snap| is_active(snap))
                    .map(|snap| snap.id().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_snap_active(&mut self, id: &str, active: bool) -> Result<(), ApiError> {
        let index = self.topic_index(SNAPS_TOPIC)?;
        let slot = index
            .primary_slot(id)
            .ok_or_else(|| ApiError::SnapshotNotFound(id.to_string()))?;
        if let Some(snap) = self.graph.instance_mut(&NodeSlot::new(SNAPS_TOPIC, slot)) {
            snap.set_field("active", Value::Bool(active));
        }
        self.save_instance(&NodeSlot::new(SNAPS_TOPIC, slot), 0)
    }
}

fn is_active(snap: &Node) -> bool {
    snap.field("active").and_then(Value::as_bool).unwrap_or(false)
}

fn snap_tag(snap: &Node) -> Result<SnapTag, ApiError> {
    snap.id()
        .parse()
        .map_err(|_| ApiError::ValidationFailed(format!("bad snapshot id '{}'", snap.id())))
}
