//! Open treedbs addressed by opaque integer handles.
//!
//! Each treedb sits behind its own lock: one writer or many readers at a time.

use crate::api::TreedbApi;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Handle of an open treedb
pub type Handle = u64;

pub type SharedTreedb = Arc<RwLock<TreedbApi>>;

/// Registry of open treedbs
pub struct TreedbRegistry {
    next: AtomicU64,
    open: RwLock<HashMap<Handle, SharedTreedb>>,
}

impl TreedbRegistry {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            open: RwLock::new(HashMap::new()),
        }
    }

    /// Register an opened treedb and return its handle
    pub fn insert(&self, api: TreedbApi) -> Handle {
        let handle = self.next.fetch_add(1, Ordering::SeqCst);
        let name = api.treedb().name().to_string();
        self.open.write().insert(handle, Arc::new(RwLock::new(api)));
        info!(handle, treedb_name = %name, "Treedb registered");
        handle
    }

    pub fn get(&self, handle: Handle) -> Option<SharedTreedb> {
        self.open.read().get(&handle).cloned()
    }

    /// Handle of the treedb called `name`
    pub fn find(&self, name: &str) -> Option<Handle> {
        self.open
            .read()
            .iter()
            .find(|(_, api)| api.read().treedb().name() == name)
            .map(|(handle, _)| *handle)
    }

    /// Names of the open treedbs, sorted
    pub fn treedbs(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .open
            .read()
            .values()
            .map(|api| api.read().treedb().name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Drop a handle. The treedb closes once the last clone of it is gone.
    pub fn close(&self, handle: Handle) -> bool {
        let removed = self.open.write().remove(&handle);
        if removed.is_some() {
            info!(handle, "Treedb closed");
        }
        removed.is_some()
    }
}

impl Default for TreedbRegistry {
    fn default() -> Self {
        Self::new()
    }
}
