//! Record Store
//!
//! Append-only, per-topic record log consumed by the treedb engine. Every write appends a new
//! version; deletion only flips a flag on an existing record. Snapshot tags are given at append.

pub mod persistence;

use crate::error::StorageError;
use crate::types::{Rowid, SnapTag};
use serde_json::Value;

pub use persistence::SledRecordStore;

/// One version of a record as held by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub rowid: Rowid,
    /// Primary key of the record
    pub key: String,
    /// Append time, epoch seconds
    pub t: i64,
    pub tag: SnapTag,
    pub deleted: bool,
    /// False for secondary instances sharing the key
    pub primary: bool,
    pub payload: Value,
}

/// Options for `RecordStore::append`
#[derive(Debug, Clone, Copy)]
pub struct AppendOptions {
    pub tag: SnapTag,
    pub primary: bool,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            tag: 0,
            primary: true,
        }
    }
}

/// Match condition for `RecordStore::iterate`
#[derive(Debug, Clone, Default)]
pub struct MatchCond {
    /// Newest first
    pub backward: bool,
    /// Only records carrying this tag
    pub tag: Option<SnapTag>,
}

/// Record store interface
pub trait RecordStore: Send + Sync {
    /// Append a new record version; returns the stored record with its rowid.
    fn append(
        &self,
        topic: &str,
        key: &str,
        record: &Value,
        options: AppendOptions,
    ) -> Result<StoredRecord, StorageError>;

    /// Soft delete: flag the record as deleted
    fn mark_deleted(&self, topic: &str, rowid: Rowid) -> Result<(), StorageError>;

    /// Records of a topic matching `cond`, finite and restartable per call
    fn iterate(&self, topic: &str, cond: &MatchCond) -> Result<Vec<StoredRecord>, StorageError>;

    /// Highest rowid appended to a topic (0 when empty)
    fn last_rowid(&self, topic: &str) -> Result<Rowid, StorageError>;

    /// Treedb-level metadata (schemas)
    fn get_meta(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn put_meta(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    fn flush(&self) -> Result<(), StorageError>;
}
