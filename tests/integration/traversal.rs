use crate::integration::support::{id, kw, open, open_store, temporary};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::TempDir;
use treedb::{AllowAll, LinkSpec, Treedb, TreedbApi};

fn link_roles(db: &mut Treedb, parent: &str, child: &str) {
    db.link_nodes(&LinkSpec {
        hook: "roles",
        parent_topic: "roles",
        parent_id: parent,
        child_topic: "roles",
        child_id: child,
    })
    .unwrap();
}

/// a -> b, c; b -> d; c -> d
fn diamond() -> TreedbApi {
    let mut db = temporary();
    for role in ["a", "b", "c", "d"] {
        db.create_node("roles", &id(role)).unwrap();
    }
    link_roles(&mut db, "a", "b");
    link_roles(&mut db, "a", "c");
    link_roles(&mut db, "b", "d");
    link_roles(&mut db, "c", "d");
    TreedbApi::new(db, Arc::new(AllowAll), "reader")
}

fn ids(data: &Value) -> Vec<&str> {
    data.as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap())
        .collect()
}

#[test]
fn recursive_children_repeat_shared_descendants() {
    let api = diamond();
    let reply = api.node_children("roles", &id("a"), "roles", &Map::new(), &json!({"recursive": true}));
    assert!(reply.is_ok(), "{}", reply.comment);
    assert_eq!(ids(&reply.data), vec!["b", "d", "c", "d"]);

    let deduped = api.node_children(
        "roles",
        &id("a"),
        "roles",
        &Map::new(),
        &json!({"recursive": true, "dedup": true}),
    );
    assert_eq!(ids(&deduped.data), vec!["b", "d", "c"]);

    let direct = api.node_children("roles", &id("a"), "roles", &Map::new(), &json!({}));
    assert_eq!(ids(&direct.data), vec!["b", "c"]);
}

#[test]
fn children_filter_prunes_subtrees() {
    let mut db = temporary();
    for role in ["a", "b", "d"] {
        db.create_node("roles", &id(role)).unwrap();
    }
    db.update_node(
        "roles",
        &kw(json!({"id": "b", "disabled": true})),
        Default::default(),
    )
    .unwrap();
    link_roles(&mut db, "a", "b");
    link_roles(&mut db, "b", "d");

    let api = TreedbApi::new(db, Arc::new(AllowAll), "reader");
    let reply = api.node_children(
        "roles",
        &id("a"),
        "roles",
        &kw(json!({"disabled": false})),
        &json!({"recursive": true}),
    );
    assert!(ids(&reply.data).is_empty());
}

#[test]
fn parents_in_every_shape() {
    let api = diamond();
    let refs = api.node_parents("roles", &id("d"), Some("parent_role_id"), &json!({"refs": true}));
    assert_eq!(refs.data, json!(["roles^b^roles", "roles^c^roles"]));

    let only_id = api.node_parents("roles", &id("d"), None, &json!({"only_id": true}));
    assert_eq!(only_id.data, json!(["b", "c"]));

    let collapsed = api.node_parents("roles", &id("d"), None, &json!({"collapsed_view": true}));
    assert_eq!(ids(&collapsed.data), vec!["b", "c"]);

    let bad = api.node_parents("roles", &id("d"), Some("permission"), &json!({}));
    assert_eq!(bad.result, -1);
}

#[test]
fn default_views_pass_links_through_as_stored() {
    let api = diamond();

    let d = api.get_node("roles", &id("d"), &json!({}));
    assert_eq!(d.data["parent_role_id"], json!(["roles^b^roles", "roles^c^roles"]));
    assert_eq!(d.data["roles"], json!({}));
    assert!(d.data.get("__md_treedb__").is_none());

    let b = api.get_node("roles", &id("b"), &json!({}));
    assert_eq!(b.data["roles"], json!({"d": "roles"}));
    assert_eq!(b.data["users"], json!({}));

    let parents = api.node_parents("roles", &id("d"), None, &json!({}));
    assert_eq!(parents.data, json!(["roles^b^roles", "roles^c^roles"]));

    let shaped = api.get_node("roles", &id("d"), &json!({"fkey_list_dict": true}));
    assert_eq!(
        shaped.data["parent_role_id"][1],
        json!({"id": "c", "topic_name": "roles", "hook_name": "roles"})
    );
}

#[test]
fn hook_views_keep_insertion_order() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("store"));
    let render = |db: Treedb| {
        let api = TreedbApi::new(db, Arc::new(AllowAll), "reader");
        let only_id = api.get_node("departments", &id("root"), &json!({"only_id": true}));
        let list_dict = api.get_node("departments", &id("root"), &json!({"list_dict": true}));
        (only_id.data, list_dict.data)
    };

    {
        let mut db = open(&store);
        db.create_node("departments", &id("root")).unwrap();
        for child in ["k2", "k1"] {
            db.create_node("departments", &id(child)).unwrap();
            db.link_nodes(&LinkSpec {
                hook: "departments",
                parent_topic: "departments",
                parent_id: "root",
                child_topic: "departments",
                child_id: child,
            })
            .unwrap();
        }
        let (only_id, list_dict) = render(db);
        assert_eq!(only_id["departments"], json!(["k2", "k1"]));
        assert_eq!(
            list_dict["departments"],
            json!([
                {"id": "k2", "topic_name": "departments"},
                {"id": "k1", "topic_name": "departments"}
            ])
        );
    }

    // rebuilt on load, in child id order
    let first = render(open(&store));
    assert_eq!(first.0["departments"], json!(["k1", "k2"]));
    assert_eq!(render(open(&store)), first);
}

#[test]
fn jtree_nests_children_under_renamed_key() {
    let api = diamond();
    let tree = api.topic_jtree("roles", "roles", Some("children"), &Map::new(), &Map::new(), &json!({}));
    assert!(tree.is_ok(), "{}", tree.comment);

    let root = &tree.data;
    assert_eq!(root["id"], json!("a"));
    assert_eq!(root["__path__"], json!("a"));
    assert!(root.get("roles").is_none());

    let b = &root["children"][0];
    assert_eq!(b["id"], json!("b"));
    assert_eq!(b["children"][0]["__path__"], json!("a`b`d"));
    assert_eq!(root["children"][1]["children"][0]["__path__"], json!("a`c`d"));
}

#[test]
fn jtree_from_explicit_root() {
    let api = diamond();
    let tree = api.topic_jtree("roles", "roles", None, &id("c"), &Map::new(), &json!({}));
    assert_eq!(tree.data["__path__"], json!("c"));
    assert_eq!(tree.data["roles"][0]["id"], json!("d"));
    assert_eq!(tree.data["roles"][0]["roles"], json!([]));
}
