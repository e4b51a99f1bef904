//! Sled-backed record store.
//!
//! One tree per topic keyed by big-endian rowid and a `meta` tree.

use super::{AppendOptions, MatchCond, RecordStore, StoredRecord};
use crate::error::StorageError;
use crate::types::{now_epoch, Rowid, SnapTag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

const META_TREE: &str = "meta";

/// On-disk form of a record. The payload is JSON text inside the bincode envelope.
#[derive(Debug, Serialize, Deserialize)]
struct RecordEnvelope {
    key: String,
    t: i64,
    tag: SnapTag,
    deleted: bool,
    primary: bool,
    payload: String,
}

/// Record store over a sled database
pub struct SledRecordStore {
    db: sled::Db,
}

impl SledRecordStore {
    /// Open (or create) a store at `path`.
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Store that lives only as long as the process
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn records(&self, topic: &str) -> Result<sled::Tree, StorageError> {
        Ok(self.db.open_tree(format!("records/{}", topic))?)
    }

    fn decode(topic: &str, rowid: Rowid, bytes: &[u8]) -> Result<StoredRecord, StorageError> {
        let envelope: RecordEnvelope = bincode::deserialize(bytes)?;
        let payload = serde_json::from_str(&envelope.payload).map_err(|e| {
            StorageError::CorruptRecord {
                topic: topic.to_string(),
                rowid,
                reason: e.to_string(),
            }
        })?;
        Ok(StoredRecord {
            rowid,
            key: envelope.key,
            t: envelope.t,
            tag: envelope.tag,
            deleted: envelope.deleted,
            primary: envelope.primary,
            payload,
        })
    }

    fn encode(record: &StoredRecord) -> Result<Vec<u8>, StorageError> {
        let envelope = RecordEnvelope {
            key: record.key.clone(),
            t: record.t,
            tag: record.tag,
            deleted: record.deleted,
            primary: record.primary,
            payload: serde_json::to_string(&record.payload)?,
        };
        Ok(bincode::serialize(&envelope)?)
    }

    fn rowid_from_key(topic: &str, key: &[u8]) -> Result<Rowid, StorageError> {
        let bytes: [u8; 8] = key.try_into().map_err(|_| StorageError::CorruptRecord {
            topic: topic.to_string(),
            rowid: 0,
            reason: format!("bad rowid key of {} bytes", key.len()),
        })?;
        Ok(Rowid::from_be_bytes(bytes))
    }

    /// Read-modify-write of one record
    fn update_record<F>(&self, topic: &str, rowid: Rowid, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut StoredRecord),
    {
        let tree = self.records(topic)?;
        let bytes = tree
            .get(rowid.to_be_bytes())?
            .ok_or_else(|| StorageError::RecordNotFound {
                topic: topic.to_string(),
                rowid,
            })?;
        let mut record = Self::decode(topic, rowid, &bytes)?;
        f(&mut record);
        tree.insert(rowid.to_be_bytes(), Self::encode(&record)?)?;
        Ok(())
    }
}

impl RecordStore for SledRecordStore {
    fn append(
        &self,
        topic: &str,
        key: &str,
        record: &Value,
        options: AppendOptions,
    ) -> Result<StoredRecord, StorageError> {
        let tree = self.records(topic)?;
        let rowid = self.last_rowid(topic)? + 1;
        let stored = StoredRecord {
            rowid,
            key: key.to_string(),
            t: now_epoch(),
            tag: options.tag,
            deleted: false,
            primary: options.primary,
            payload: record.clone(),
        };
        tree.insert(rowid.to_be_bytes(), Self::encode(&stored)?)?;
        debug!(topic = %topic, key = %key, rowid, "Record appended");
        Ok(stored)
    }

    fn mark_deleted(&self, topic: &str, rowid: Rowid) -> Result<(), StorageError> {
        self.update_record(topic, rowid, |r| r.deleted = true)
    }

    fn iterate(&self, topic: &str, cond: &MatchCond) -> Result<Vec<StoredRecord>, StorageError> {
        let tree = self.records(topic)?;
        let iter: Box<dyn Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>> =
            if cond.backward {
                Box::new(tree.iter().rev())
            } else {
                Box::new(tree.iter())
            };

        let mut out = Vec::new();
        for entry in iter {
            let (k, v) = entry?;
            let rowid = Self::rowid_from_key(topic, &k)?;
            let record = Self::decode(topic, rowid, &v)?;
            if let Some(tag) = cond.tag {
                if record.tag != tag {
                    continue;
                }
            }
            out.push(record);
        }
        Ok(out)
    }

    fn last_rowid(&self, topic: &str) -> Result<Rowid, StorageError> {
        match self.records(topic)?.last()? {
            Some((k, _)) => Self::rowid_from_key(topic, &k),
            None => Ok(0),
        }
    }

    fn get_meta(&self, key: &str) -> Result<Option<Value>, StorageError> {
        match self.db.open_tree(META_TREE)?.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_meta(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.db
            .open_tree(META_TREE)?
            .insert(key.as_bytes(), serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
