//! CLI Tooling
//!
//! Command-line interface over one treedb of a workspace. Node arguments and options are
//! JSON objects; replies are printed as JSON or as tables.

use crate::api::{Reply, TreedbApi};
use crate::authz::{AllowAll, AuthzQuery};
use crate::config::TreedbConfig;
use crate::error::{ApiError, StorageError, RESULT_OK};
use crate::graph::LinkSpec;
use crate::handles::{Handle, TreedbRegistry};
use crate::schema::read_document;
use crate::store::SledRecordStore;
use crate::tooling::format::{render, OutputFormat};
use crate::transfer::IfResourceExists;
use crate::treedb::Treedb;
use crate::types::{ChildRef, PKEY};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// treedb CLI - hierarchical resource graphs over a record store
#[derive(Parser)]
#[command(name = "treedb")]
#[command(about = "Hierarchical resource graph database")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Apply the logging flags on top of the loaded configuration.
    pub fn apply_log_overrides(&self, config: &mut TreedbConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.logging.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the effective configuration as TOML
    Config,
    /// List open treedbs
    Treedbs,
    /// List topics
    Topics,
    /// Show a topic description
    Desc { topic: String },
    /// List the fkey columns of a topic
    Links { topic: String },
    /// List the hook columns of a topic
    Hooks { topic: String },
    /// Create a node
    CreateNode {
        topic: String,
        /// Node fields as a JSON object
        data: String,
        #[arg(long)]
        options: Option<String>,
    },
    /// Update a node (options: create, autolink, volatil)
    UpdateNode {
        topic: String,
        data: String,
        #[arg(long)]
        options: Option<String>,
    },
    /// Delete a node (options: force)
    DeleteNode {
        topic: String,
        /// Node key as a JSON object, or a bare id
        key: String,
        #[arg(long)]
        force: bool,
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Link a child under a parent hook
    LinkNodes {
        hook: String,
        /// Parent as topic^id
        parent: String,
        /// Child as topic^id
        child: String,
    },
    /// Remove a link
    UnlinkNodes {
        hook: String,
        parent: String,
        child: String,
    },
    /// Show one node
    GetNode {
        topic: String,
        key: String,
        #[arg(long)]
        options: Option<String>,
    },
    /// List nodes matching a filter
    ListNodes {
        topic: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        options: Option<String>,
    },
    /// List secondary-key instances
    Instances {
        topic: String,
        /// Restrict to one pkey2 index
        #[arg(long)]
        pkey2: Option<String>,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        options: Option<String>,
    },
    /// Parents of a node
    Parents {
        topic: String,
        key: String,
        /// Only this fkey column
        #[arg(long)]
        fkey: Option<String>,
        #[arg(long)]
        options: Option<String>,
    },
    /// Children of a node through a hook
    Children {
        topic: String,
        key: String,
        hook: String,
        #[arg(long)]
        filter: Option<String>,
        /// Walk the hook down every level
        #[arg(long)]
        recursive: bool,
        #[arg(long)]
        options: Option<String>,
    },
    /// Tree of a topic under a hook
    Jtree {
        topic: String,
        hook: String,
        /// Root node; the first node without a parent when absent
        #[arg(long)]
        root: Option<String>,
        /// Name the children field differently from the hook
        #[arg(long)]
        rename_hook: Option<String>,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        options: Option<String>,
    },
    /// List snapshots
    Snaps {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Tag every record under a new snapshot
    ShootSnap {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Load a snapshot on next open
    ActivateSnap {
        name: String,
        #[arg(long)]
        yes: bool,
    },
    /// Return to the present on next open
    DeactivateSnap {
        #[arg(long)]
        yes: bool,
    },
    /// Export every topic
    ExportDb {
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        with_metadata: bool,
        #[arg(long)]
        without_rowid: bool,
    },
    /// Import an exported document
    ImportDb {
        input: PathBuf,
        /// abort, skip or overwrite
        #[arg(long, default_value = "abort")]
        if_resource_exists: String,
        #[arg(long)]
        yes: bool,
    },
    /// Roles of a user per service
    UserRoles {
        user: String,
        #[arg(long, default_value = "*")]
        realm: String,
        #[arg(long)]
        service: String,
        #[arg(long, value_delimiter = ',')]
        required_services: Vec<String>,
    },
    /// Permissions of a user
    UserPermissions {
        user: String,
        #[arg(long, default_value = "*")]
        realm: String,
        #[arg(long)]
        service: String,
        #[arg(long, value_delimiter = ',')]
        required_services: Vec<String>,
    },
}

/// Rendered outcome of a command
#[derive(Debug, Clone, PartialEq)]
pub struct CliOutput {
    pub text: String,
    /// Result code of the reply, 0 on success
    pub result: i32,
}

impl CliOutput {
    fn message(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            result: RESULT_OK,
        }
    }
}

/// Load the configuration of a workspace, or of one explicit file.
pub fn load_config(workspace_root: &Path, config_path: Option<&Path>) -> Result<TreedbConfig, ApiError> {
    Ok(TreedbConfig::load(workspace_root, config_path)?)
}

/// CLI context: the open treedb of a workspace
pub struct CliContext {
    config: TreedbConfig,
    registry: TreedbRegistry,
    handle: Handle,
    format: OutputFormat,
}

impl CliContext {
    /// Create a new CLI context
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = load_config(&workspace_root, config_path.as_deref())?;
        Self::from_config(&workspace_root, &config)
    }

    /// Open the configured treedb
    pub fn from_config(workspace_root: &Path, config: &TreedbConfig) -> Result<Self, ApiError> {
        let store_path = config.store_path(workspace_root)?;
        std::fs::create_dir_all(&store_path).map_err(StorageError::IoError)?;
        let store = Arc::new(SledRecordStore::new(&store_path)?);

        let schema = match config.schema_path(workspace_root) {
            Some(path) => read_document(&path)?,
            // stored schema of the treedb, if any
            None => json!({"topics": []}),
        };
        let db = Treedb::open(store, &schema, config.open_options())?;
        info!(
            treedb_name = %config.treedb.name,
            store = %store_path.display(),
            master = config.system.master,
            "Treedb opened"
        );

        let registry = TreedbRegistry::new();
        let handle = registry.insert(TreedbApi::new(
            db,
            Arc::new(AllowAll),
            &config.treedb.principal,
        ));
        Ok(Self {
            config: config.clone(),
            registry,
            handle,
            format: OutputFormat::Json,
        })
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<CliOutput, ApiError> {
        let shared = self
            .registry
            .get(self.handle)
            .ok_or_else(|| ApiError::ConfigError("treedb is not open".to_string()))?;

        let (reply, heading) = match command {
            Commands::Config => {
                let text = toml::to_string_pretty(&self.config)
                    .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))?;
                return Ok(CliOutput::message(text));
            }
            Commands::Treedbs => (Reply::ok(json!(self.registry.treedbs())), None),
            Commands::Topics => (shared.read().topics(), None),
            Commands::Desc { topic } => (shared.read().topic_desc(topic), Some(topic.as_str())),
            Commands::Links { topic } => (shared.read().topic_links(topic), None),
            Commands::Hooks { topic } => (shared.read().topic_hooks(topic), None),
            Commands::CreateNode { topic, data, options } => {
                let kw = parse_object(data, "data")?;
                let options = parse_options(options.as_deref())?;
                (shared.write().create_node(topic, &kw, &options), Some(topic.as_str()))
            }
            Commands::UpdateNode { topic, data, options } => {
                let kw = parse_object(data, "data")?;
                let options = parse_options(options.as_deref())?;
                (shared.write().update_node(topic, &kw, &options), Some(topic.as_str()))
            }
            Commands::DeleteNode { topic, key, force, yes } => {
                let kw = parse_key(key)?;
                if !yes && !confirm(&format!("Delete {} {}?", topic, key))? {
                    return Ok(CliOutput::message("Deletion cancelled"));
                }
                let options = json!({ "force": force });
                (shared.write().delete_node(topic, &kw, &options), None)
            }
            Commands::LinkNodes { hook, parent, child } => {
                let (parent, child) = (parse_ref(parent)?, parse_ref(child)?);
                (shared.write().link_nodes(&link_spec(hook, &parent, &child)), None)
            }
            Commands::UnlinkNodes { hook, parent, child } => {
                let (parent, child) = (parse_ref(parent)?, parse_ref(child)?);
                (shared.write().unlink_nodes(&link_spec(hook, &parent, &child)), None)
            }
            Commands::GetNode { topic, key, options } => {
                let kw = parse_key(key)?;
                let options = parse_options(options.as_deref())?;
                (shared.read().get_node(topic, &kw, &options), Some(topic.as_str()))
            }
            Commands::ListNodes { topic, filter, options } => {
                let filter = parse_filter(filter.as_deref())?;
                let options = parse_options(options.as_deref())?;
                (shared.read().list_nodes(topic, &filter, &options), Some(topic.as_str()))
            }
            Commands::Instances { topic, pkey2, filter, options } => {
                let filter = parse_filter(filter.as_deref())?;
                let options = parse_options(options.as_deref())?;
                let reply = shared
                    .read()
                    .list_instances(topic, pkey2.as_deref(), &filter, &options);
                (reply, Some(topic.as_str()))
            }
            Commands::Parents { topic, key, fkey, options } => {
                let kw = parse_key(key)?;
                let options = parse_options(options.as_deref())?;
                (shared.read().node_parents(topic, &kw, fkey.as_deref(), &options), None)
            }
            Commands::Children { topic, key, hook, filter, recursive, options } => {
                let kw = parse_key(key)?;
                let filter = parse_filter(filter.as_deref())?;
                let mut options = parse_options(options.as_deref())?;
                if *recursive {
                    options["recursive"] = Value::Bool(true);
                }
                (shared.read().node_children(topic, &kw, hook, &filter, &options), None)
            }
            Commands::Jtree { topic, hook, root, rename_hook, filter, options } => {
                let kw = match root {
                    Some(root) => parse_key(root)?,
                    None => Map::new(),
                };
                let filter = parse_filter(filter.as_deref())?;
                let options = parse_options(options.as_deref())?;
                let reply = shared.read().topic_jtree(
                    topic,
                    hook,
                    rename_hook.as_deref(),
                    &kw,
                    &filter,
                    &options,
                );
                (reply, None)
            }
            Commands::Snaps { filter } => {
                let filter = parse_filter(filter.as_deref())?;
                (shared.read().list_snaps(&filter), Some("Snapshots"))
            }
            Commands::ShootSnap { name, description } => {
                (shared.write().shoot_snap(name, description), None)
            }
            Commands::ActivateSnap { name, yes } => {
                if !yes && !confirm(&format!("Activate snapshot {} on next open?", name))? {
                    return Ok(CliOutput::message("Activation cancelled"));
                }
                (shared.write().activate_snap(name), None)
            }
            Commands::DeactivateSnap { yes } => {
                if !yes && !confirm("Deactivate the active snapshot?")? {
                    return Ok(CliOutput::message("Deactivation cancelled"));
                }
                (shared.write().activate_snap(crate::snapshot::CLEAR_SNAP), None)
            }
            Commands::ExportDb { output, with_metadata, without_rowid } => {
                let options = json!({
                    "with_metadata": with_metadata,
                    "without_rowid": without_rowid,
                });
                let reply = shared.read().export_db(&options);
                if let (Some(path), true) = (output, reply.is_ok()) {
                    write_json(path, &reply.data)?;
                    return Ok(CliOutput::message(format!("Exported to {}", path.display())));
                }
                (reply, None)
            }
            Commands::ImportDb { input, if_resource_exists, yes } => {
                let if_exists: IfResourceExists = if_resource_exists.parse()?;
                let db = read_object(input)?;
                if if_exists == IfResourceExists::Overwrite
                    && !yes
                    && !confirm("Overwrite existing records?")?
                {
                    return Ok(CliOutput::message("Import cancelled"));
                }
                (shared.write().import_db(&db, if_exists), None)
            }
            Commands::UserRoles { user, realm, service, required_services } => {
                let query = authz_query(realm, service, required_services);
                (shared.read().user_roles(user, &query), None)
            }
            Commands::UserPermissions { user, realm, service, required_services } => {
                let query = authz_query(realm, service, required_services);
                (shared.read().user_permissions(user, &query), None)
            }
        };
        Ok(self.finish(reply, heading))
    }

    fn finish(&self, reply: Reply, heading: Option<&str>) -> CliOutput {
        if !reply.is_ok() {
            let text = match self.format {
                OutputFormat::Json => serde_json::to_string_pretty(&reply)
                    .unwrap_or_else(|_| reply.comment.clone()),
                OutputFormat::Table => format!("Error ({}): {}", reply.result, reply.comment),
            };
            return CliOutput {
                text,
                result: reply.result,
            };
        }
        CliOutput::message(render(&reply.data, self.format, heading))
    }
}

fn confirm(prompt: &str) -> Result<bool, ApiError> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| ApiError::ConfigError(format!("Failed to get user input: {}", e)))
}

fn parse_object(arg: &str, what: &str) -> Result<Map<String, Value>, ApiError> {
    match serde_json::from_str::<Value>(arg) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::ValidationFailed(format!("{} must be a JSON object", what))),
        Err(e) => Err(ApiError::ValidationFailed(format!("bad {} JSON: {}", what, e))),
    }
}

fn parse_filter(arg: Option<&str>) -> Result<Map<String, Value>, ApiError> {
    arg.map_or_else(|| Ok(Map::new()), |f| parse_object(f, "filter"))
}

fn parse_options(arg: Option<&str>) -> Result<Value, ApiError> {
    parse_filter(arg.map(str::trim).filter(|s| !s.is_empty()))
        .map(Value::Object)
        .map_err(|_| ApiError::ValidationFailed("options must be a JSON object".to_string()))
}

/// A JSON object, or a bare id
fn parse_key(arg: &str) -> Result<Map<String, Value>, ApiError> {
    if arg.trim_start().starts_with('{') {
        return parse_object(arg, "key");
    }
    let mut kw = Map::new();
    kw.insert(PKEY.to_string(), Value::String(arg.to_string()));
    Ok(kw)
}

fn parse_ref(arg: &str) -> Result<ChildRef, ApiError> {
    ChildRef::decode(arg, "")
        .filter(|r| !r.topic_name.is_empty())
        .ok_or_else(|| ApiError::ValidationFailed(format!("expected topic^id, got '{}'", arg)))
}

fn link_spec<'a>(hook: &'a str, parent: &'a ChildRef, child: &'a ChildRef) -> LinkSpec<'a> {
    LinkSpec {
        hook,
        parent_topic: &parent.topic_name,
        parent_id: &parent.id,
        child_topic: &child.topic_name,
        child_id: &child.id,
    }
}

fn authz_query(realm: &str, service: &str, required: &[String]) -> AuthzQuery {
    AuthzQuery {
        realm_id: realm.to_string(),
        service: service.to_string(),
        required_services: required.to_vec(),
    }
}

fn read_object(path: &Path) -> Result<Map<String, Value>, ApiError> {
    let text = std::fs::read_to_string(path).map_err(StorageError::IoError)?;
    parse_object(&text, "import")
}

fn write_json(path: &Path, data: &Value) -> Result<(), ApiError> {
    let text = serde_json::to_string_pretty(data).map_err(StorageError::Json)?;
    std::fs::write(path, text).map_err(StorageError::IoError)?;
    Ok(())
}
