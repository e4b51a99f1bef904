//! Error types for the treedb engine.
//!
//! `StorageError` covers the record store, `SchemaError` schema documents and `ApiError`
//! everything a caller of the public operations can observe.

use thiserror::Error;

/// Result code for a successful operation.
pub const RESULT_OK: i32 = 0;
/// Result code for a generic failure.
pub const RESULT_FAILED: i32 = -1;
/// Result code for an authorization denial.
pub const RESULT_UNAUTHORIZED: i32 = -403;
/// Result code for a missing topic, node or snapshot.
pub const RESULT_NOT_FOUND: i32 = -404;

/// Errors raised by the record store layer
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Record encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt record {rowid} in topic {topic}: {reason}")]
    CorruptRecord {
        topic: String,
        rowid: u64,
        reason: String,
    },

    #[error("Record not found: topic {topic}, rowid {rowid}")]
    RecordNotFound { topic: String, rowid: u64 },
}

/// Errors found while parsing or validating a schema document
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Invalid schema document: {0}")]
    InvalidDocument(String),

    #[error("Topic {topic}: {reason}")]
    InvalidTopic { topic: String, reason: String },

    #[error("Topic {topic}, column {column}: {reason}")]
    InvalidColumn {
        topic: String,
        column: String,
        reason: String,
    },

    #[error("Topic {topic}, hook {hook}: {reason}")]
    InvalidHook {
        topic: String,
        hook: String,
        reason: String,
    },
}

/// Errors returned by treedb operations
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Node not found: topic {topic}, id {id}")]
    NodeNotFound { topic: String, id: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Duplicate key: topic {topic}, id {id}")]
    DuplicateKey { topic: String, id: String },

    #[error("Node has dependents: topic {topic}, id {id}: {reason}")]
    HasDependents {
        topic: String,
        id: String,
        reason: String,
    },

    #[error("Link error: {0}")]
    LinkError(String),

    #[error("Snapshot already exists: {0}")]
    SnapshotExists(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Treedb {0} is not master, writes are rejected")]
    NotMaster(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ApiError {
    /// Numeric result code carried in replies
    pub fn result_code(&self) -> i32 {
        match self {
            ApiError::Unauthorized(_) => RESULT_UNAUTHORIZED,
            ApiError::TopicNotFound(_)
            | ApiError::NodeNotFound { .. }
            | ApiError::SnapshotNotFound(_) => RESULT_NOT_FOUND,
            _ => RESULT_FAILED,
        }
    }

    pub(crate) fn node_not_found(topic: &str, id: &str) -> Self {
        ApiError::NodeNotFound {
            topic: topic.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
