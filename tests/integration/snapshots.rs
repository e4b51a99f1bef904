use crate::integration::support::{id, kw, open, open_store};
use serde_json::{json, Map};
use std::sync::Arc;
use tempfile::TempDir;
use treedb::{AllowAll, ApiError, LinkSpec, TreedbApi, WriteOptions};

const ENG_U1: LinkSpec<'static> = LinkSpec {
    hook: "departments",
    parent_topic: "departments",
    parent_id: "eng",
    child_topic: "users",
    child_id: "u1",
};

#[test]
fn activated_snapshot_frames_next_open() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("store"));
    {
        let mut db = open(&store);
        db.create_node("departments", &kw(json!({"id": "eng", "name": "Engineering"})))
            .unwrap();
        db.create_node("users", &id("u1")).unwrap();
        db.link_nodes(&ENG_U1).unwrap();
        db.shoot_snap("v1", "before the reorg").unwrap();

        db.unlink_nodes(&ENG_U1).unwrap();
        db.update_node(
            "departments",
            &kw(json!({"id": "eng", "name": "Platform"})),
            WriteOptions::default(),
        )
        .unwrap();
        db.create_node("departments", &id("ops")).unwrap();

        let tag = db.activate_snap("v1").unwrap();
        assert!(tag > 0);
        // the running session keeps the present
        assert_eq!(db.active_tag(), 0);
        assert_eq!(db.topic_size("departments").unwrap(), 2);
    }

    {
        let db = open(&store);
        assert!(db.active_tag() > 0);
        assert_eq!(db.topic_size("departments").unwrap(), 1);
        let eng = db.get_node("departments", &id("eng")).unwrap().unwrap();
        assert_eq!(eng.field("name"), Some(&json!("Engineering")));
        assert_eq!(eng.hook_refs("departments").len(), 1);
        let u1 = db.get_node("users", &id("u1")).unwrap().unwrap();
        assert_eq!(u1.fkey_refs("department_id")[0].id, "eng");
    }

    {
        let mut db = open(&store);
        assert_eq!(db.deactivate_snap().unwrap(), 0);
    }
    let db = open(&store);
    assert_eq!(db.active_tag(), 0);
    assert_eq!(db.topic_size("departments").unwrap(), 2);
    assert_eq!(
        db.get_node("departments", &id("eng")).unwrap().unwrap().field("name"),
        Some(&json!("Platform"))
    );
}

#[test]
fn snapshot_names_are_unique_and_listed() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("store"));
    let mut api = TreedbApi::new(open(&store), Arc::new(AllowAll), "ops");

    assert!(api.shoot_snap("v1", "first").is_ok());
    assert_eq!(api.shoot_snap("v1", "again").result, -1);
    assert!(api.shoot_snap("v2", "second").is_ok());

    let snaps = api.list_snaps(&Map::new());
    let names: Vec<_> = snaps
        .data
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("v1"), json!("v2")]);

    let missing = api.activate_snap("v9");
    assert_eq!(missing.result, -404);
}

#[test]
fn tagged_nodes_need_force_to_delete() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("store"));
    let mut db = open(&store);
    db.create_node("departments", &id("eng")).unwrap();
    db.shoot_snap("v1", "").unwrap();

    let err = db
        .delete_node("departments", &id("eng"), WriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, ApiError::ValidationFailed(_)));

    let force = WriteOptions {
        force: true,
        ..Default::default()
    };
    assert_eq!(db.delete_node("departments", &id("eng"), force).unwrap(), 1);
}
