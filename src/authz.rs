//! Authorization: the principal check in front of mutating calls, and the role and
//! permission aggregations read from the `users`/`roles` topics.

use crate::error::ApiError;
use crate::graph::Node;
use crate::traversal::TraversalOptions;
use crate::treedb::Treedb;
use crate::types::PKEY;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Topic of users
pub const USERS_TOPIC: &str = "users";
/// Topic of roles
pub const ROLES_TOPIC: &str = "roles";
/// User fkey to its roles, and the role hook to its sub-roles
pub const ROLES_LINK: &str = "roles";

/// Wildcard accepted in role realm/service columns and authorizer grants
pub const ANY: &str = "*";

/// Decides whether a principal may run an action on a topic.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, principal: &str, action: &str, topic_name: &str) -> bool;
}

/// Grants everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _principal: &str, _action: &str, _topic_name: &str) -> bool {
        true
    }
}

/// Fixed grants: principal to allowed actions. `*` matches any principal or action.
#[derive(Debug, Default, Clone)]
pub struct StaticAuthorizer {
    grants: HashMap<String, HashSet<String>>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, principal: &str, action: &str) -> Self {
        self.grants
            .entry(principal.to_string())
            .or_default()
            .insert(action.to_string());
        self
    }
}

impl Authorizer for StaticAuthorizer {
    fn authorize(&self, principal: &str, action: &str, _topic_name: &str) -> bool {
        [principal, ANY].iter().any(|p| {
            self.grants
                .get(*p)
                .map_or(false, |actions| actions.contains(action) || actions.contains(ANY))
        })
    }
}

/// Target of a role or permission aggregation
#[derive(Debug, Clone, Default)]
pub struct AuthzQuery {
    pub realm_id: String,
    pub service: String,
    /// Services whose roles are collected alongside `service`
    pub required_services: Vec<String>,
}

impl AuthzQuery {
    pub fn new(realm_id: &str, service: &str) -> Self {
        Self {
            realm_id: realm_id.to_string(),
            service: service.to_string(),
            required_services: Vec::new(),
        }
    }

    pub fn with_required(mut self, services: &[&str]) -> Self {
        self.required_services = services.iter().map(|s| s.to_string()).collect();
        self
    }

    fn services(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.service.as_str()).chain(self.required_services.iter().map(String::as_str))
    }
}

impl Treedb {
    /// Role ids of a user per service: `{service: [role ids]}`.
    pub fn user_roles(&self, user_id: &str, query: &AuthzQuery) -> Result<Map<String, Value>, ApiError> {
        let mut roles = Map::new();
        for role in self.effective_roles(user_id)? {
            for service in query.services() {
                append_role(&mut roles, role, &query.realm_id, service);
            }
        }
        Ok(roles)
    }

    /// Permissions of a user: `{permission: granted}`. The first entry naming a permission wins.
    pub fn user_permissions(
        &self,
        user_id: &str,
        query: &AuthzQuery,
    ) -> Result<Map<String, Value>, ApiError> {
        let mut permissions = Map::new();
        for role in self.effective_roles(user_id)? {
            for service in query.services() {
                append_permission(&mut permissions, role, &query.realm_id, service);
            }
        }
        Ok(permissions)
    }

    /// Direct enabled roles of a user, each followed by its enabled sub-roles, in scan order.
    fn effective_roles(&self, user_id: &str) -> Result<Vec<&Node>, ApiError> {
        let Some(user) = self.graph.node(USERS_TOPIC, user_id) else {
            warn!(treedb_name = %self.name, user = %user_id, "User not found");
            return Ok(Vec::new());
        };

        let mut enabled = Map::new();
        enabled.insert("disabled".to_string(), Value::Bool(false));
        let options = TraversalOptions::recursive();

        let mut roles = Vec::new();
        for parent in user.fkey_refs(ROLES_LINK) {
            let Some(role) = self.graph.node(&parent.topic_name, &parent.id) else {
                warn!(user = %user_id, role = %parent, "Role not found");
                continue;
            };
            if is_disabled(role) {
                continue;
            }
            roles.push(role);

            let mut kw = Map::new();
            kw.insert(PKEY.to_string(), Value::String(role.id().to_string()));
            roles.extend(self.children_of(role.topic_name(), &kw, ROLES_LINK, &enabled, &options)?);
        }
        Ok(roles)
    }
}

fn is_disabled(role: &Node) -> bool {
    role.field("disabled").and_then(Value::as_bool).unwrap_or(false)
}

fn matches_target(role: &Node, realm_id: &str, service: &str) -> bool {
    let column_is = |name: &str, target: &str| {
        role.field(name)
            .and_then(Value::as_str)
            .map_or(false, |v| v == target || v == ANY)
    };
    !is_disabled(role) && column_is("realm_id", realm_id) && column_is("service", service)
}

fn append_role(roles: &mut Map<String, Value>, role: &Node, realm_id: &str, service: &str) {
    if !matches_target(role, realm_id, service) {
        return;
    }
    let entry = roles
        .entry(service.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(ids) = entry {
        let id = Value::String(role.id().to_string());
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
}

fn append_permission(permissions: &mut Map<String, Value>, role: &Node, realm_id: &str, service: &str) {
    if !matches_target(role, realm_id, service) {
        return;
    }
    let mut grant = |permission: Option<&str>, deny: Option<&Value>| {
        if let Some(permission) = permission.filter(|p| !p.is_empty()) {
            let deny = deny.and_then(Value::as_bool).unwrap_or(false);
            permissions
                .entry(permission.to_string())
                .or_insert(Value::Bool(!deny));
        }
    };

    grant(role.field("permission").and_then(Value::as_str), role.field("deny"));
    if let Some(Value::Array(items)) = role.field("permissions") {
        for item in items {
            grant(item.get("permission").and_then(Value::as_str), item.get("deny"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LinkSpec;
    use crate::store::SledRecordStore;
    use crate::treedb::OpenOptions;
    use serde_json::json;
    use std::sync::Arc;

    fn kw(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    fn authz_db() -> Treedb {
        let store = Arc::new(SledRecordStore::temporary().unwrap());
        let mut db = Treedb::open(
            store,
            &json!({
                "topics": [
                    {
                        "topic_name": "roles",
                        "cols": {
                            "id": {"type": "string", "flag": ["persistent", "required"]},
                            "realm_id": {"type": "string", "flag": "persistent", "default": "*"},
                            "service": {"type": "string", "flag": "persistent", "default": "*"},
                            "disabled": {"type": "boolean", "flag": "persistent", "default": false},
                            "permission": {"type": "string", "flag": "persistent"},
                            "deny": {"type": "boolean", "flag": "persistent", "default": false},
                            "permissions": {"type": "array", "flag": "persistent"},
                            "roles": {"type": "dict", "flag": "hook", "hook": {"roles": "parent_role_id"}},
                            "parent_role_id": {"type": "array", "flag": "fkey"},
                            "users": {"type": "dict", "flag": "hook", "hook": {"users": "roles"}}
                        }
                    },
                    {
                        "topic_name": "users",
                        "cols": {
                            "id": {"type": "string", "flag": ["persistent", "required"]},
                            "roles": {"type": "array", "flag": "fkey"}
                        }
                    }
                ]
            }),
            OpenOptions::master("authzs"),
        )
        .unwrap();

        db.create_node("roles", &kw(json!({"id": "owner", "service": "treedb", "permission": "write"})))
            .unwrap();
        db.create_node(
            "roles",
            &kw(json!({
                "id": "reader",
                "service": "treedb",
                "permissions": [{"permission": "read"}, {"permission": "write", "deny": true}]
            })),
        )
        .unwrap();
        db.create_node("roles", &kw(json!({"id": "old", "disabled": true, "permission": "admin"})))
            .unwrap();
        db.create_node("roles", &kw(json!({"id": "metrics", "service": "stats", "permission": "view"})))
            .unwrap();
        db.create_node("users", &kw(json!({"id": "alice"}))).unwrap();

        for (parent, child) in [("owner", "reader"), ("owner", "old"), ("owner", "metrics")] {
            db.link_nodes(&LinkSpec {
                hook: "roles",
                parent_topic: "roles",
                parent_id: parent,
                child_topic: "roles",
                child_id: child,
            })
            .unwrap();
        }
        db.link_nodes(&LinkSpec {
            hook: "users",
            parent_topic: "roles",
            parent_id: "owner",
            child_topic: "users",
            child_id: "alice",
        })
        .unwrap();
        db
    }

    #[test]
    fn test_user_roles_inherit_sub_roles() {
        let db = authz_db();
        let roles = db
            .user_roles("alice", &AuthzQuery::new("realm1", "treedb"))
            .unwrap();
        assert_eq!(Value::Object(roles), json!({"treedb": ["owner", "reader"]}));

        let with_stats = db
            .user_roles(
                "alice",
                &AuthzQuery::new("realm1", "treedb").with_required(&["stats"]),
            )
            .unwrap();
        assert_eq!(with_stats["stats"], json!(["metrics"]));
    }

    #[test]
    fn test_user_permissions_first_match_wins() {
        let db = authz_db();
        let permissions = db
            .user_permissions("alice", &AuthzQuery::new("realm1", "treedb"))
            .unwrap();
        assert_eq!(
            Value::Object(permissions),
            json!({"write": true, "read": true})
        );
    }

    #[test]
    fn test_unknown_user_is_empty() {
        let db = authz_db();
        assert!(db
            .user_roles("bob", &AuthzQuery::new("realm1", "treedb"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_static_authorizer() {
        let authz = StaticAuthorizer::new()
            .grant("admin", ANY)
            .grant(ANY, "get_node");
        assert!(authz.authorize("admin", "delete_node", "users"));
        assert!(authz.authorize("guest", "get_node", "users"));
        assert!(!authz.authorize("guest", "delete_node", "users"));
        assert!(AllowAll.authorize("guest", "delete_node", "users"));
    }
}
