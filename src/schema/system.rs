//! System topics present in every treedb.

use super::{ColumnDesc, ColumnFlag, ColumnType, TopicDesc};
use crate::types::PKEY;
use serde_json::Value;

/// Snapshot registry topic
pub const SNAPS_TOPIC: &str = "__snaps__";

/// Graph registry topic
pub const GRAPHS_TOPIC: &str = "__graphs__";

fn col(id: &str, col_type: ColumnType, flags: &[ColumnFlag], default: Option<Value>) -> ColumnDesc {
    ColumnDesc {
        id: id.to_string(),
        header: id.to_string(),
        col_type,
        flags: flags.to_vec(),
        default,
        hook: Vec::new(),
        enum_values: None,
    }
}

fn system_topic(topic_name: &str, cols: Vec<ColumnDesc>) -> TopicDesc {
    TopicDesc {
        topic_name: topic_name.to_string(),
        pkey: PKEY.to_string(),
        pkey2s: Vec::new(),
        tkey: None,
        topic_version: "1".to_string(),
        cols,
    }
}

/// `__snaps__`: one node per snapshot, its rowid is the snapshot tag.
pub fn snaps_topic() -> TopicDesc {
    use ColumnFlag::*;
    system_topic(
        SNAPS_TOPIC,
        vec![
            col(PKEY, ColumnType::String, &[Persistent, Rowid], None),
            col("name", ColumnType::String, &[Persistent, Required], None),
            col("date", ColumnType::String, &[Persistent], None),
            col(
                "active",
                ColumnType::Boolean,
                &[Persistent],
                Some(Value::Bool(false)),
            ),
            col("description", ColumnType::String, &[Persistent], None),
        ],
    )
}

/// `__graphs__`: named graph descriptions kept alongside the data.
pub fn graphs_topic() -> TopicDesc {
    use ColumnFlag::*;
    system_topic(
        GRAPHS_TOPIC,
        vec![
            col(PKEY, ColumnType::String, &[Persistent, Required], None),
            col("name", ColumnType::String, &[Persistent], None),
            col("description", ColumnType::String, &[Persistent], None),
            col("properties", ColumnType::Dict, &[Persistent], None),
        ],
    )
}
