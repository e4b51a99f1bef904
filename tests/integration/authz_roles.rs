use crate::integration::support::{id, kw, temporary};
use serde_json::json;
use std::sync::Arc;
use treedb::{AllowAll, AuthzQuery, LinkSpec, Treedb, TreedbApi, WriteOptions};

fn autolink() -> WriteOptions {
    WriteOptions {
        autolink: true,
        ..Default::default()
    }
}

/// admin (manage) -> editor (edit) -> auditor (disabled); u1 holds admin
fn org() -> Treedb {
    let mut db = temporary();
    db.create_node("roles", &kw(json!({"id": "admin", "service": "svc", "permission": "manage"})))
        .unwrap();
    db.create_node("roles", &kw(json!({"id": "editor", "service": "svc", "permission": "edit"})))
        .unwrap();
    db.create_node(
        "roles",
        &kw(json!({"id": "auditor", "service": "svc", "permission": "audit", "disabled": true})),
    )
    .unwrap();
    for (parent, child) in [("admin", "editor"), ("editor", "auditor")] {
        db.link_nodes(&LinkSpec {
            hook: "roles",
            parent_topic: "roles",
            parent_id: parent,
            child_topic: "roles",
            child_id: child,
        })
        .unwrap();
    }
    db.create_node("users", &id("u1")).unwrap();
    db.update_node("users", &kw(json!({"id": "u1", "roles": ["admin"]})), autolink())
        .unwrap();
    db
}

#[test]
fn inherited_roles_grant_their_permissions() {
    let db = org();
    let query = AuthzQuery::new("*", "svc");

    let permissions = db.user_permissions("u1", &query).unwrap();
    assert_eq!(json!(permissions), json!({"manage": true, "edit": true}));

    let roles = db.user_roles("u1", &query).unwrap();
    assert_eq!(json!(roles), json!({"svc": ["admin", "editor"]}));
}

#[test]
fn other_services_see_nothing_unless_required() {
    let mut db = org();
    db.create_node("roles", &kw(json!({"id": "viewer", "service": "stats", "permission": "view"})))
        .unwrap();
    db.update_node(
        "users",
        &kw(json!({"id": "u1", "roles": ["admin", "viewer"]})),
        autolink(),
    )
    .unwrap();

    let reports = db
        .user_permissions("u1", &AuthzQuery::new("*", "reports"))
        .unwrap();
    assert!(reports.is_empty());

    let with_stats = AuthzQuery::new("*", "svc").with_required(&["stats"]);
    let permissions = db.user_permissions("u1", &with_stats).unwrap();
    assert_eq!(permissions["view"], json!(true));
    assert_eq!(permissions["manage"], json!(true));

    let roles = db.user_roles("u1", &with_stats).unwrap();
    assert_eq!(roles["stats"], json!(["viewer"]));
}

#[test]
fn sub_role_deny_does_not_revoke_parent_grant() {
    let mut db = org();
    db.update_node(
        "roles",
        &kw(json!({
            "id": "editor",
            "permissions": [{"permission": "manage", "deny": true}]
        })),
        WriteOptions::default(),
    )
    .unwrap();

    let permissions = db.user_permissions("u1", &AuthzQuery::new("*", "svc")).unwrap();
    assert_eq!(permissions["manage"], json!(true));
    assert_eq!(permissions["edit"], json!(true));
}

#[test]
fn earlier_deny_is_not_lifted_by_later_grant() {
    let mut db = org();
    db.update_node(
        "roles",
        &kw(json!({"id": "admin", "permission": "edit", "deny": true})),
        WriteOptions::default(),
    )
    .unwrap();

    let permissions = db.user_permissions("u1", &AuthzQuery::new("*", "svc")).unwrap();
    assert_eq!(json!(permissions), json!({"edit": false}));
}

#[test]
fn unknown_user_has_no_roles_through_the_api() {
    let api = TreedbApi::new(org(), Arc::new(AllowAll), "auth");
    let reply = api.user_roles("ghost", &AuthzQuery::new("*", "svc"));
    assert!(reply.is_ok());
    assert_eq!(reply.data, json!({}));

    let reply = api.user_permissions("u1", &AuthzQuery::new("*", "svc"));
    assert_eq!(reply.data["manage"], json!(true));
}
