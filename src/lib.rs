//! treedb: hierarchical resource graphs
//!
//! Typed nodes organized in topics, linked parent-to-child through hook columns and
//! child-to-parent through fkey columns, persisted as versioned records in an append-only
//! record store.

pub mod api;
pub mod authz;
pub mod config;
pub mod error;
pub mod graph;
pub mod handles;
pub mod logging;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod tooling;
pub mod transfer;
pub mod traversal;
pub mod treedb;
pub mod types;
pub mod views;

pub use api::{Reply, TreedbApi};
pub use authz::{AllowAll, Authorizer, AuthzQuery, StaticAuthorizer};
pub use error::{ApiError, SchemaError, StorageError};
pub use graph::{LinkSpec, Node};
pub use handles::{Handle, TreedbRegistry};
pub use store::{persistence::SledRecordStore, RecordStore};
pub use transfer::{IfResourceExists, ImportReport};
pub use traversal::TraversalOptions;
pub use treedb::{OpenOptions, Treedb, WriteOptions};
pub use views::ViewOptions;
