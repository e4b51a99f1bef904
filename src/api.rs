//! Service API
//!
//! [`TreedbApi`] puts the authorizer in front of a [`Treedb`] and turns every outcome into a
//! [`Reply`] carrying the numeric result code.

use crate::authz::{Authorizer, AuthzQuery};
use crate::error::{ApiError, RESULT_NOT_FOUND, RESULT_OK};
use crate::graph::LinkSpec;
use crate::schema::system::SNAPS_TOPIC;
use crate::transfer::IfResourceExists;
use crate::traversal::TraversalOptions;
use crate::treedb::{Treedb, WriteOptions};
use crate::views::ViewOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// 0 ok, -1 failure, -403 unauthorized, -404 not found
    pub result: i32,
    pub comment: String,
    pub data: Value,
}

impl Reply {
    pub fn ok(data: Value) -> Self {
        Self {
            result: RESULT_OK,
            comment: String::new(),
            data,
        }
    }

    pub fn from_error(err: &ApiError) -> Self {
        Self {
            result: err.result_code(),
            comment: err.to_string(),
            data: Value::Null,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == RESULT_OK
    }
}

impl From<Result<Value, ApiError>> for Reply {
    fn from(result: Result<Value, ApiError>) -> Self {
        match result {
            Ok(data) => Reply::ok(data),
            Err(err) => {
                debug!(code = err.result_code(), error = %err, "Request failed");
                Reply::from_error(&err)
            }
        }
    }
}

/// A treedb served on behalf of one principal
pub struct TreedbApi {
    db: Treedb,
    authorizer: Arc<dyn Authorizer>,
    principal: String,
}

impl TreedbApi {
    pub fn new(db: Treedb, authorizer: Arc<dyn Authorizer>, principal: &str) -> Self {
        Self {
            db,
            authorizer,
            principal: principal.to_string(),
        }
    }

    pub fn treedb(&self) -> &Treedb {
        &self.db
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    fn authorize(&self, action: &str, topic_name: &str) -> Result<(), ApiError> {
        if self.authorizer.authorize(&self.principal, action, topic_name) {
            return Ok(());
        }
        warn!(
            principal = %self.principal,
            action = %action,
            topic_name = %topic_name,
            "Not authorized"
        );
        Err(ApiError::Unauthorized(format!(
            "{} may not {} on {}",
            self.principal, action, topic_name
        )))
    }

    // Introspection

    pub fn topics(&self) -> Reply {
        Reply::ok(json!(self.db.topics()))
    }

    pub fn topic_desc(&self, topic_name: &str) -> Reply {
        self.db.topic_desc(topic_name).map(|desc| desc.to_json()).into()
    }

    pub fn topic_links(&self, topic_name: &str) -> Reply {
        self.db.topic_links(topic_name).map(|links| json!(links)).into()
    }

    pub fn topic_hooks(&self, topic_name: &str) -> Reply {
        self.db.topic_hooks(topic_name).map(|hooks| json!(hooks)).into()
    }

    pub fn topic_pkey2s(&self, topic_name: &str) -> Reply {
        self.db.topic_pkey2s(topic_name).map(|pkey2s| json!(pkey2s)).into()
    }

    pub fn topic_size(&self, topic_name: &str) -> Reply {
        self.db.topic_size(topic_name).map(|size| json!(size)).into()
    }

    // Node store

    pub fn create_node(&mut self, topic_name: &str, kw: &Map<String, Value>, options: &Value) -> Reply {
        let result = self.authorize("create_node", topic_name).and_then(|_| {
            let node = self.db.create_node(topic_name, kw)?;
            self.db.view(&node, &ViewOptions::from_json(options))
        });
        result.into()
    }

    pub fn update_node(&mut self, topic_name: &str, kw: &Map<String, Value>, options: &Value) -> Reply {
        let result = self.authorize("update_node", topic_name).and_then(|_| {
            let node = self
                .db
                .update_node(topic_name, kw, WriteOptions::from_json(options))?;
            self.db.view(&node, &ViewOptions::from_json(options))
        });
        result.into()
    }

    pub fn delete_node(&mut self, topic_name: &str, kw: &Map<String, Value>, options: &Value) -> Reply {
        let result = self.authorize("delete_node", topic_name).and_then(|_| {
            self.db
                .delete_node(topic_name, kw, WriteOptions::from_json(options))
                .map(|deleted| json!(deleted))
        });
        result.into()
    }

    pub fn get_node(&self, topic_name: &str, kw: &Map<String, Value>, options: &Value) -> Reply {
        let result = self.db.get_node(topic_name, kw).and_then(|found| match found {
            Some(node) => self.db.view(node, &ViewOptions::from_json(options)),
            None => Err(ApiError::node_not_found(
                topic_name,
                kw.get("id").and_then(Value::as_str).unwrap_or_default(),
            )),
        });
        result.into()
    }

    pub fn list_nodes(&self, topic_name: &str, filter: &Map<String, Value>, options: &Value) -> Reply {
        let view = ViewOptions::from_json(options);
        let result = self.db.list_nodes(topic_name, filter).and_then(|nodes| {
            nodes
                .into_iter()
                .map(|node| self.db.view(node, &view))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        });
        result.into()
    }

    pub fn list_instances(
        &self,
        topic_name: &str,
        pkey2: Option<&str>,
        filter: &Map<String, Value>,
        options: &Value,
    ) -> Reply {
        let view = ViewOptions::from_json(options);
        let result = self
            .db
            .list_instances(topic_name, pkey2, filter)
            .and_then(|nodes| {
                nodes
                    .into_iter()
                    .map(|node| self.db.view(node, &view))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            });
        result.into()
    }

    // Links

    pub fn link_nodes(&mut self, spec: &LinkSpec<'_>) -> Reply {
        let result = self
            .authorize("link_nodes", spec.parent_topic)
            .and_then(|_| self.db.link_nodes(spec).map(Value::Bool));
        result.into()
    }

    pub fn unlink_nodes(&mut self, spec: &LinkSpec<'_>) -> Reply {
        let result = self
            .authorize("unlink_nodes", spec.parent_topic)
            .and_then(|_| self.db.unlink_nodes(spec).map(Value::Bool));
        result.into()
    }

    // Traversal

    pub fn node_parents(
        &self,
        topic_name: &str,
        kw: &Map<String, Value>,
        fkey: Option<&str>,
        options: &Value,
    ) -> Reply {
        self.db
            .node_parents(topic_name, kw, fkey, &TraversalOptions::from_json(options))
            .map(Value::Array)
            .into()
    }

    pub fn node_children(
        &self,
        topic_name: &str,
        kw: &Map<String, Value>,
        hook: &str,
        filter: &Map<String, Value>,
        options: &Value,
    ) -> Reply {
        self.db
            .node_children(topic_name, kw, hook, filter, &TraversalOptions::from_json(options))
            .map(Value::Array)
            .into()
    }

    pub fn topic_jtree(
        &self,
        topic_name: &str,
        hook: &str,
        rename_hook: Option<&str>,
        kw: &Map<String, Value>,
        filter: &Map<String, Value>,
        options: &Value,
    ) -> Reply {
        self.db
            .topic_jtree(
                topic_name,
                hook,
                rename_hook,
                kw,
                filter,
                &TraversalOptions::from_json(options),
            )
            .into()
    }

    pub fn user_roles(&self, user_id: &str, query: &AuthzQuery) -> Reply {
        self.db.user_roles(user_id, query).map(Value::Object).into()
    }

    pub fn user_permissions(&self, user_id: &str, query: &AuthzQuery) -> Reply {
        self.db.user_permissions(user_id, query).map(Value::Object).into()
    }

    // Snapshots

    pub fn shoot_snap(&mut self, name: &str, description: &str) -> Reply {
        let result = self.authorize("shoot_snap", SNAPS_TOPIC).and_then(|_| {
            let snap = self.db.shoot_snap(name, description)?;
            self.db.view(&snap, &ViewOptions::default())
        });
        result.into()
    }

    pub fn activate_snap(&mut self, name: &str) -> Reply {
        let result = self
            .authorize("activate_snap", SNAPS_TOPIC)
            .and_then(|_| self.db.activate_snap(name).map(|tag| json!(tag)));
        result.into()
    }

    pub fn list_snaps(&self, filter: &Map<String, Value>) -> Reply {
        let result = self.db.list_snaps(filter).and_then(|snaps| {
            snaps
                .into_iter()
                .map(|snap| self.db.view(snap, &ViewOptions::default()))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        });
        result.into()
    }

    // Import / export

    pub fn export_db(&self, options: &Value) -> Reply {
        self.db.export_db(options).map(Value::Object).into()
    }

    pub fn import_db(&mut self, db: &Map<String, Value>, if_exists: IfResourceExists) -> Reply {
        let result = self.authorize("import_db", "").and_then(|_| {
            let report = self.db.import_db(db, if_exists)?;
            serde_json::to_value(&report)
                .map_err(|e| ApiError::ValidationFailed(format!("import report: {}", e)))
        });
        result.into()
    }
}

/// Whether a reply is the not-found outcome
pub fn is_not_found(reply: &Reply) -> bool {
    reply.result == RESULT_NOT_FOUND
}
