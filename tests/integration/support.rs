use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use treedb::{OpenOptions, RecordStore, SledRecordStore, Treedb};

/// Departments own users and a self-referential department tree; roles form their own tree.
pub fn schema() -> Value {
    json!({
        "id": "org",
        "schema_version": "1",
        "topics": [
            {
                "topic_name": "departments",
                "cols": {
                    "id": {"type": "string", "flag": ["persistent", "required"]},
                    "name": {"type": "string", "flag": "persistent", "default": ""},
                    "departments": {
                        "type": "dict",
                        "flag": "hook",
                        "hook": {"departments": "department_id", "users": "department_id"}
                    },
                    "department_id": {"type": "string", "flag": "fkey"}
                }
            },
            {
                "topic_name": "roles",
                "cols": {
                    "id": {"type": "string", "flag": ["persistent", "required"]},
                    "realm_id": {"type": "string", "flag": "persistent", "default": "*"},
                    "service": {"type": "string", "flag": "persistent", "default": "*"},
                    "disabled": {"type": "boolean", "flag": "persistent", "default": false},
                    "permission": {"type": "string", "flag": "persistent", "default": ""},
                    "deny": {"type": "boolean", "flag": "persistent", "default": false},
                    "permissions": {"type": "array", "flag": "persistent"},
                    "roles": {"type": "dict", "flag": "hook", "hook": {"roles": "parent_role_id"}},
                    "parent_role_id": {"type": "array", "flag": "fkey"},
                    "users": {"type": "dict", "flag": "hook", "hook": {"users": "roles"}}
                }
            },
            {
                "topic_name": "users",
                "pkey2s": ["session"],
                "cols": {
                    "id": {"type": "string", "flag": ["persistent", "required"]},
                    "session": {"type": "string", "flag": "persistent"},
                    "email": {"type": "string", "flag": "persistent"},
                    "level": {"type": "integer", "flag": ["persistent", "inherit"], "default": 1},
                    "department_id": {"type": "string", "flag": "fkey"},
                    "roles": {"type": "array", "flag": "fkey"}
                }
            }
        ]
    })
}

pub fn open_store(path: &Path) -> Arc<dyn RecordStore> {
    Arc::new(SledRecordStore::new(path).unwrap())
}

pub fn open(store: &Arc<dyn RecordStore>) -> Treedb {
    Treedb::open(store.clone(), &schema(), OpenOptions::master("org")).unwrap()
}

pub fn temporary() -> Treedb {
    let store: Arc<dyn RecordStore> = Arc::new(SledRecordStore::temporary().unwrap());
    open(&store)
}

pub fn kw(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

pub fn id(id: &str) -> Map<String, Value> {
    kw(json!({ "id": id }))
}
