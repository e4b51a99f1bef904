use crate::integration::support::schema;
use clap::Parser;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use treedb::tooling::format::OutputFormat;
use treedb::tooling::{Cli, CliContext, Commands};

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("schema.yaml"),
        serde_yaml::to_string(&schema()).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("treedb.toml"),
        r#"
[system.storage]
store_path = "data/store"

[treedb]
name = "org"
schema_path = "schema.yaml"
"#,
    )
    .unwrap();
    dir
}

fn context(dir: &Path) -> CliContext {
    CliContext::new(dir.to_path_buf(), None).unwrap()
}

fn run(ctx: &CliContext, args: &[&str]) -> (i32, String) {
    let argv = std::iter::once("treedb").chain(args.iter().copied());
    let cli = Cli::try_parse_from(argv).unwrap();
    let out = ctx.execute(&cli.command).unwrap();
    (out.result, out.text)
}

fn json_of(text: &str) -> Value {
    serde_json::from_str(text).unwrap()
}

#[test]
fn workspace_config_opens_yaml_schema() {
    let dir = workspace();
    let ctx = context(dir.path());
    assert!(dir.path().join("data/store").exists());

    let (code, text) = run(&ctx, &["topics"]);
    assert_eq!(code, 0);
    let topics = json_of(&text);
    for topic in ["departments", "roles", "users"] {
        assert!(topics.as_array().unwrap().contains(&json!(topic)), "{}", text);
    }

    let (_, text) = run(&ctx, &["treedbs"]);
    assert_eq!(json_of(&text), json!(["org"]));
}

#[test]
fn global_flags_parse_around_subcommands() {
    let cli = Cli::try_parse_from([
        "treedb", "--format", "table", "delete-node", "users", "u1", "--force", "--yes",
    ])
    .unwrap();
    assert_eq!(cli.format, OutputFormat::Table);
    match cli.command {
        Commands::DeleteNode { topic, key, force, yes } => {
            assert_eq!((topic.as_str(), key.as_str(), force, yes), ("users", "u1", true, true));
        }
        _ => panic!("expected delete-node"),
    }

    let cli = Cli::try_parse_from([
        "treedb",
        "user-permissions",
        "u1",
        "--service",
        "svc",
        "--required-services",
        "stats,billing",
    ])
    .unwrap();
    match cli.command {
        Commands::UserPermissions { realm, required_services, .. } => {
            assert_eq!(realm, "*");
            assert_eq!(required_services, vec!["stats", "billing"]);
        }
        _ => panic!("expected user-permissions"),
    }

    assert!(Cli::try_parse_from(["treedb", "link-nodes", "departments"]).is_err());
}

#[test]
fn link_then_delete_reports_result_codes() {
    let dir = workspace();
    let ctx = context(dir.path());

    run(&ctx, &["create-node", "departments", r#"{"id": "eng"}"#]);
    run(&ctx, &["create-node", "users", r#"{"id": "u1", "email": "u1@example.org"}"#]);
    let (code, text) = run(&ctx, &["link-nodes", "departments", "departments^eng", "users^u1"]);
    assert_eq!(code, 0, "{}", text);

    let (_, text) = run(&ctx, &["children", "departments", "eng", "departments", "--recursive"]);
    assert_eq!(json_of(&text)[0]["id"], json!("u1"));

    let (code, text) = run(&ctx, &["delete-node", "departments", "eng", "--yes"]);
    assert_eq!(code, -1);
    assert!(json_of(&text)["comment"].as_str().unwrap().contains("dependents"));

    let (code, _) = run(&ctx, &["delete-node", "departments", "eng", "--yes", "--force"]);
    assert_eq!(code, 0);
    let (code, _) = run(&ctx, &["get-node", "departments", "eng"]);
    assert_eq!(code, -404);
    let (_, text) = run(&ctx, &["parents", "users", "u1"]);
    assert_eq!(json_of(&text), json!([]));
}

#[test]
fn table_output_lists_records() {
    let dir = workspace();
    let ctx = context(dir.path()).with_format(OutputFormat::Table);
    run(&ctx, &["create-node", "departments", r#"{"id": "eng", "name": "Engineering"}"#]);

    let (code, text) = run(&ctx, &["list-nodes", "departments"]);
    assert_eq!(code, 0);
    assert!(text.contains("Engineering"));
    assert!(text.contains("eng"));

    let (code, text) = run(&ctx, &["get-node", "departments", "ops"]);
    assert_eq!(code, -404);
    assert!(text.starts_with("Error (-404)"));
}

#[test]
fn export_import_through_files() {
    let dir = workspace();
    let export = dir.path().join("org.json");
    {
        let ctx = context(dir.path());
        run(&ctx, &["create-node", "departments", r#"{"id": "eng"}"#]);
        run(&ctx, &["create-node", "users", r#"{"id": "u1"}"#]);
        run(&ctx, &["link-nodes", "departments", "departments^eng", "users^u1"]);
        let (code, _) = run(&ctx, &["export-db", "--output", export.to_str().unwrap()]);
        assert_eq!(code, 0);
    }

    let other = TempDir::new().unwrap();
    std::fs::copy(dir.path().join("schema.yaml"), other.path().join("schema.yaml")).unwrap();
    std::fs::copy(dir.path().join("treedb.toml"), other.path().join("treedb.toml")).unwrap();
    let ctx = context(other.path());

    let (code, text) = run(&ctx, &["import-db", export.to_str().unwrap()]);
    assert_eq!(code, 0, "{}", text);
    let report = json_of(&text);
    assert_eq!(report["added"], json!(2));
    assert_eq!(report["link_failure"], json!(0));

    let (_, text) = run(&ctx, &["parents", "users", "u1", "--options", r#"{"only_id": true}"#]);
    assert_eq!(json_of(&text), json!(["eng"]));

    let (_, text) = run(
        &ctx,
        &["import-db", export.to_str().unwrap(), "--if-resource-exists", "skip"],
    );
    assert_eq!(json_of(&text)["ignored"], json!(2));
}
