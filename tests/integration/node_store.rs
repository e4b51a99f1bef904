use crate::integration::support::{id, kw, open, open_store, schema, temporary};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use treedb::{
    AllowAll, ApiError, LinkSpec, OpenOptions, Treedb, TreedbApi, TraversalOptions, WriteOptions,
};

fn forced() -> WriteOptions {
    WriteOptions {
        force: true,
        ..Default::default()
    }
}

fn department_user(db: &mut Treedb) {
    db.create_node("departments", &kw(json!({"id": "eng", "name": "Engineering"})))
        .unwrap();
    db.create_node("users", &kw(json!({"id": "u1", "email": "u1@example.org"})))
        .unwrap();
    db.link_nodes(&LinkSpec {
        hook: "departments",
        parent_topic: "departments",
        parent_id: "eng",
        child_topic: "users",
        child_id: "u1",
    })
    .unwrap();
}

#[test]
fn created_node_reads_back_with_defaults() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("store"));
    {
        let mut db = open(&store);
        db.create_node("users", &kw(json!({"id": "u1", "email": "u1@example.org"})))
            .unwrap();
    }

    let db = open(&store);
    let node = db.get_node("users", &id("u1")).unwrap().unwrap();
    assert_eq!(node.field("email"), Some(&json!("u1@example.org")));
    assert_eq!(node.field("level"), Some(&json!(1)));
    assert_eq!(node.field("session"), Some(&json!("")));
    assert!(node.fkey_refs("department_id").is_empty());
}

#[test]
fn duplicate_id_is_rejected() {
    let mut db = temporary();
    db.create_node("departments", &id("eng")).unwrap();
    let err = db.create_node("departments", &id("eng")).unwrap_err();
    assert!(matches!(err, ApiError::DuplicateKey { .. }));
    assert_eq!(db.topic_size("departments").unwrap(), 1);
}

#[test]
fn update_changes_fields_and_create_option_inserts() {
    let mut db = temporary();
    db.create_node("departments", &kw(json!({"id": "eng", "name": "Eng"})))
        .unwrap();

    let updated = db
        .update_node(
            "departments",
            &kw(json!({"id": "eng", "name": "Engineering"})),
            WriteOptions::default(),
        )
        .unwrap();
    assert_eq!(updated.field("name"), Some(&json!("Engineering")));

    let missing = db.update_node("departments", &id("ops"), WriteOptions::default());
    assert!(matches!(missing, Err(ApiError::NodeNotFound { .. })));

    let create = WriteOptions {
        create: true,
        ..Default::default()
    };
    db.update_node("departments", &kw(json!({"id": "ops", "name": "Ops"})), create)
        .unwrap();
    assert_eq!(db.topic_size("departments").unwrap(), 2);
}

#[test]
fn delete_with_links_needs_force() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("store"));
    {
        let mut db = open(&store);
        department_user(&mut db);

        let err = db
            .delete_node("departments", &id("eng"), WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::HasDependents { .. }));
        let err = db
            .delete_node("users", &id("u1"), WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::HasDependents { .. }));

        assert_eq!(db.delete_node("departments", &id("eng"), forced()).unwrap(), 1);
        let parents = db
            .node_parents("users", &id("u1"), None, &TraversalOptions::default())
            .unwrap();
        assert!(parents.is_empty());
    }

    // the severed fkey was persisted
    let db = open(&store);
    assert!(db.get_node("departments", &id("eng")).unwrap().is_none());
    let u1 = db.get_node("users", &id("u1")).unwrap().unwrap();
    assert!(u1.fkey_refs("department_id").is_empty());
}

#[test]
fn delete_by_secondary_key_removes_one_instance() {
    let mut db = temporary();
    db.create_node("users", &kw(json!({"id": "u1", "session": "s1", "level": 3})))
        .unwrap();
    let s2 = db
        .create_node("users", &kw(json!({"id": "u1", "session": "s2"})))
        .unwrap();
    assert!(!s2.is_primary());
    assert_eq!(s2.field("level"), Some(&json!(3)));

    let deleted = db
        .delete_node("users", &kw(json!({"id": "u1", "session": "s2"})), WriteOptions::default())
        .unwrap();
    assert_eq!(deleted, 1);
    let left = db.list_instances("users", None, &Default::default()).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].field("session"), Some(&json!("s1")));

    let unknown = db.delete_node(
        "users",
        &kw(json!({"id": "u1", "session": "s9"})),
        WriteOptions::default(),
    );
    assert!(matches!(unknown, Err(ApiError::NodeNotFound { .. })));

    db.create_node("users", &kw(json!({"id": "u1", "session": "s2"})))
        .unwrap();
    assert_eq!(
        db.delete_node("users", &id("u1"), WriteOptions::default()).unwrap(),
        2
    );
    assert!(db.get_node("users", &id("u1")).unwrap().is_none());
    assert!(db
        .list_instances("users", Some("session"), &Default::default())
        .unwrap()
        .is_empty());
}

#[test]
fn get_node_finds_secondary_by_key() {
    let mut db = temporary();
    db.create_node("users", &kw(json!({"id": "u1", "session": "s1"})))
        .unwrap();
    db.create_node("users", &kw(json!({"id": "u1", "session": "s2", "email": "b@x"})))
        .unwrap();

    let found = db
        .get_node("users", &kw(json!({"id": "u1", "session": "s2"})))
        .unwrap()
        .unwrap();
    assert_eq!(found.field("email"), Some(&json!("b@x")));
    assert_eq!(db.topic_size("users").unwrap(), 1);

    assert_eq!(db.topic_pkey2s("users").unwrap(), ["session".to_string()]);
    assert!(db.list_instances("users", Some("email"), &Default::default()).is_err());
}

#[test]
fn replica_rejects_writes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("store"));
    open(&store).create_node("departments", &id("eng")).unwrap();

    let replica = Treedb::open(store.clone(), &schema(), OpenOptions::replica("org")).unwrap();
    assert!(!replica.is_master());
    assert_eq!(replica.topic_size("departments").unwrap(), 1);

    let mut api = TreedbApi::new(replica, Arc::new(AllowAll), "ops");
    let reply = api.create_node("departments", &id("ops"), &json!({}));
    assert_eq!(reply.result, -1);
    assert!(reply.comment.contains("not master"));
}
