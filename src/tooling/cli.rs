//! CLI Tooling
//!
//! Command-line interface over a `Branch` session. Each invocation opens the
//! configured store, runs one command and prints its result.

use crate::branch::Branch;
use crate::config::{BranchConfig, ConfigLoader};
use crate::error::ApiError;
use crate::store::Filter;
use crate::value::{Document, Value};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;

/// BranchDB CLI - hierarchical namespace over a flat document store
#[derive(Parser)]
#[command(name = "branchdb")]
#[command(about = "Hierarchical path-indexed namespace over a flat document store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Store directory (overrides storage.path)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Enable the cache mirror for this session
    #[arg(long, global = true)]
    pub cache: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a document from JSON
    Create {
        value: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Read a document
    Read {
        id: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Merge JSON fields into a document
    Update {
        id: String,
        value: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Delete a document
    Delete {
        id: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Find the first document matching a JSON query
    Search {
        query: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Check whether a document matching a JSON query exists
    Exists {
        query: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// List every document of a node
    Objects {
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Manage child nodes
    Child {
        #[command(subcommand)]
        command: ChildCommands,
    },
    /// Check whether a node has descendants
    Ancestor {
        id: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Print the path of a node id
    Path { node: String },
    /// Print the nested structure below a path
    Tree {
        #[arg(long, default_value = "/")]
        path: String,
        /// Start below the child of this document instead
        #[arg(long)]
        id: Option<String>,
    },
    /// List collections
    Collections {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum ChildCommands {
    /// Create the child node of a document
    Create {
        id: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Delete the child node of a document
    Delete {
        id: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Print the node id of a document's child
    Get {
        id: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// List the documents of a document's child node
    List {
        id: String,
        #[arg(long, default_value = "/")]
        path: String,
    },
}

/// CLI execution context
pub struct CliContext {
    branch: Branch,
}

impl CliContext {
    /// Load configuration and fold the CLI overrides into it
    pub fn load_config(cli: &Cli) -> Result<BranchConfig, ApiError> {
        let mut config = match &cli.config {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        if let Some(store) = &cli.store {
            config.storage.path = Some(store.clone());
        }
        if cli.cache {
            config.cache.enabled = true;
        }
        if let Some(level) = &cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            config.logging.format = format.clone();
        }
        if let Some(output) = &cli.log_output {
            config.logging.output = output.clone();
        }
        if let Some(file) = &cli.log_file {
            config.logging.file = Some(file.clone());
        }
        Ok(config)
    }

    pub fn new(config: &BranchConfig) -> Result<Self, ApiError> {
        Ok(Self {
            branch: Branch::open(config)?,
        })
    }

    pub fn from_branch(branch: Branch) -> Self {
        Self { branch }
    }

    pub fn branch(&self) -> &Branch {
        &self.branch
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        debug!(command = command_name(command), "Executing command");
        let output = self.execute_inner(command)?;
        self.branch.flush()?;
        Ok(output)
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Create { value, path } => {
                self.branch.create_object(value.as_str(), path)
            }
            Commands::Read { id, path } => {
                let document = self.branch.read_object(id, path)?;
                format_document(&document)
            }
            Commands::Update { id, value, path } => {
                self.branch.update_object(id, value.as_str(), path)?;
                Ok(format!("Updated {}", id))
            }
            Commands::Delete { id, path } => {
                self.branch.delete_object(id, path)?;
                Ok(format!("Deleted {}", id))
            }
            Commands::Search { query, path } => {
                let filter = Filter::from_query(Value::from(query.as_str()))?;
                match self.branch.search_object(&filter, path)? {
                    Some(document) => format_document(&document),
                    None => Ok("null".to_string()),
                }
            }
            Commands::Exists { query, path } => {
                let filter = Filter::from_query(Value::from(query.as_str()))?;
                Ok(self.branch.object_exists(&filter, path)?.to_string())
            }
            Commands::Objects { path } => format_documents(&self.branch.get_objects(path)?),
            Commands::Child { command } => self.handle_child_command(command),
            Commands::Ancestor { id, path } => Ok(self.branch.is_ancestor(id, path)?.to_string()),
            Commands::Path { node } => self.branch.get_path(node),
            Commands::Tree { path, id } => {
                let structure = match id {
                    Some(id) => self.branch.get_descendants(id, path)?,
                    None => self.branch.get_structure(path)?,
                };
                to_pretty_json(&structure)
            }
            Commands::Collections { format } => self.handle_collections(format),
        }
    }

    fn handle_child_command(&self, command: &ChildCommands) -> Result<String, ApiError> {
        match command {
            ChildCommands::Create { id, path } => self.branch.create_child(id, path),
            ChildCommands::Delete { id, path } => {
                self.branch.delete_child(id, path)?;
                Ok(format!("Deleted child of {}", id))
            }
            ChildCommands::Get { id, path } => Ok(self
                .branch
                .get_child(id, path)?
                .unwrap_or_else(|| "null".to_string())),
            ChildCommands::List { id, path } => {
                format_documents(&self.branch.get_children(id, path)?)
            }
        }
    }

    fn handle_collections(&self, format: &str) -> Result<String, ApiError> {
        let collections = self.branch.collections()?;
        match format {
            "json" => to_pretty_json(&json!({
                "cache": format!("{:?}", self.branch.cache_status()),
                "collections": collections,
            })),
            "text" => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Collection", "Path"]);
                for name in &collections {
                    let path = self
                        .branch
                        .get_path(name)
                        .unwrap_or_else(|_| "(unindexed)".to_string());
                    table.add_row(vec![name.clone(), path]);
                }
                Ok(table.to_string())
            }
            other => Err(ApiError::ConfigError(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::InvalidValue(format!("Failed to serialize output: {}", e)))
}

fn format_document(document: &Document) -> Result<String, ApiError> {
    to_pretty_json(document)
}

fn format_documents(documents: &[Document]) -> Result<String, ApiError> {
    to_pretty_json(&documents)
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Create { .. } => "create",
        Commands::Read { .. } => "read",
        Commands::Update { .. } => "update",
        Commands::Delete { .. } => "delete",
        Commands::Search { .. } => "search",
        Commands::Exists { .. } => "exists",
        Commands::Objects { .. } => "objects",
        Commands::Child { command } => match command {
            ChildCommands::Create { .. } => "child.create",
            ChildCommands::Delete { .. } => "child.delete",
            ChildCommands::Get { .. } => "child.get",
            ChildCommands::List { .. } => "child.list",
        },
        Commands::Ancestor { .. } => "ancestor",
        Commands::Path { .. } => "path",
        Commands::Tree { .. } => "tree",
        Commands::Collections { .. } => "collections",
    }
}
