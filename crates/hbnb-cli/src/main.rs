//! hbnb storage console.
//!
//! Provides the `hbnb` binary with subcommands that create, inspect, update
//! and destroy entities through the same [`Repository`] the application uses.
//! The backend comes from the `HBNB_*` environment variables; the global
//! `--storage`, `--file` and `--db` flags override them.
//!
//! Exit codes: 0 = success, 1 = usage error or no such instance,
//! 2 = storage error.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use hbnb_core::{Attributes, ClassRegistry, CoreError, Entity, EntityRef};
use hbnb_storage::{BackendKind, Repository, StorageConfig, StorageError};

/// hbnb storage console.
#[derive(Parser)]
#[command(name = "hbnb", about = "Inspect and edit hbnb storage")]
struct Cli {
    /// Backend to use: file or db (default: $HBNB_TYPE_STORAGE, else file).
    #[arg(long, global = true)]
    storage: Option<String>,

    /// JSON document path for the file backend.
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    /// SQLite database path for the db backend.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Create an instance and print its id.
    Create {
        class: String,
        /// Initial attributes as key=value.
        #[arg(value_name = "KEY=VALUE")]
        attributes: Vec<String>,
    },
    /// Print one instance.
    Show { class: String, id: String },
    /// Delete one instance.
    Destroy { class: String, id: String },
    /// Print every instance, optionally of one class.
    All { class: Option<String> },
    /// Print the number of instances, optionally of one class.
    Count { class: Option<String> },
    /// Set one attribute on an instance.
    Update {
        class: String,
        id: String,
        attribute: String,
        value: String,
    },
}

/// Why a command failed; decides the exit code.
#[derive(Debug)]
enum Failure {
    Usage(String),
    NotFound,
    Storage(StorageError),
    Output(io::Error),
}

impl Failure {
    fn exit_code(&self) -> i32 {
        match self {
            Failure::Usage(_) | Failure::NotFound => 1,
            Failure::Storage(StorageError::UnknownBackend(_)) => 1,
            Failure::Storage(e) if e.is_unknown_type() => 1,
            Failure::Storage(_) | Failure::Output(_) => 2,
        }
    }

    fn report(&self) {
        match self {
            Failure::Usage(msg) => eprintln!("Error: {}", msg),
            Failure::NotFound => eprintln!("** no instance found **"),
            Failure::Storage(e) => eprintln!("Error: {}", e),
            Failure::Output(e) => eprintln!("Error: failed to write output: {}", e),
        }
    }
}

impl From<StorageError> for Failure {
    fn from(e: StorageError) -> Self {
        Failure::Storage(e)
    }
}

impl From<CoreError> for Failure {
    fn from(e: CoreError) -> Self {
        match e {
            // Bad input from the command line, not a storage fault.
            CoreError::UnknownAttribute { .. }
            | CoreError::ReadOnlyAttribute { .. }
            | CoreError::InvalidRecord { .. } => Failure::Usage(e.to_string()),
            other => Failure::Storage(other.into()),
        }
    }
}

impl From<io::Error> for Failure {
    fn from(e: io::Error) -> Self {
        Failure::Output(e)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut stdout = io::stdout().lock();
    if let Err(failure) = run(cli, &mut stdout) {
        failure.report();
        process::exit(failure.exit_code());
    }
}

/// Resolves the storage configuration: environment first, then flags.
fn storage_config(cli: &Cli) -> Result<StorageConfig, Failure> {
    let mut config = StorageConfig::from_env()?;
    if let Some(storage) = &cli.storage {
        config.backend = storage.parse::<BackendKind>()?;
    }
    if let Some(file) = &cli.file {
        config.file_path = file.clone();
    }
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    debug!(
        backend = %config.backend,
        file = %config.file_path.display(),
        db = %config.db_path.display(),
        "resolved storage config"
    );
    Ok(config)
}

fn run(cli: Cli, out: &mut dyn Write) -> Result<(), Failure> {
    let config = storage_config(&cli)?;
    let repo = Repository::open(&config, Arc::new(ClassRegistry::standard()))?;
    let result = execute(&repo, cli.command, out);
    finish(result, repo.close())
}

/// The command's own failure wins over a failure to close afterwards.
fn finish(result: Result<(), Failure>, closed: Result<(), StorageError>) -> Result<(), Failure> {
    result?;
    closed?;
    Ok(())
}

fn execute(repo: &Repository, command: Commands, out: &mut dyn Write) -> Result<(), Failure> {
    match command {
        Commands::Create { class, attributes } => {
            let entry = repo.registry().resolve(&class)?;
            let defaults = entry.defaults()?;
            let mut overrides = Attributes::new();
            for assignment in &attributes {
                let (name, raw) = parse_assignment(assignment)?;
                overrides.insert(name.to_string(), coerce(&defaults, name, raw));
            }
            let entity = entry.instantiate(overrides)?;
            let id = entity.id().to_string();
            repo.new(entity)?;
            repo.save()?;
            writeln!(out, "{}", id)?;
        }
        Commands::Show { class, id } => {
            let entity = find(repo, &class, &id)?;
            let json = serde_json::to_string_pretty(&entity.to_attributes()?)
                .map_err(StorageError::from)?;
            writeln!(out, "{}", json)?;
        }
        Commands::Destroy { class, id } => {
            let entity = find(repo, &class, &id)?;
            repo.delete(Some(entity.as_ref()))?;
            repo.save()?;
        }
        Commands::All { class } => {
            let mut listing = serde_json::Map::new();
            for (key, entity) in repo.all(class.as_deref())? {
                listing.insert(key.to_string(), Value::Object(entity.to_attributes()?));
            }
            let json = serde_json::to_string_pretty(&listing).map_err(StorageError::from)?;
            writeln!(out, "{}", json)?;
        }
        Commands::Count { class } => {
            writeln!(out, "{}", repo.count(class.as_deref())?)?;
        }
        Commands::Update {
            class,
            id,
            attribute,
            value,
        } => {
            let entity = find(repo, &class, &id)?;
            let entry = repo.registry().resolve(&class)?;
            let mut changes = Attributes::new();
            let value = coerce(&entry.defaults()?, &attribute, &value);
            changes.insert(attribute, value);
            repo.new(entry.revise(entity.as_ref(), changes)?)?;
            repo.save()?;
        }
    }
    Ok(())
}

fn find(repo: &Repository, class: &str, id: &str) -> Result<EntityRef, Failure> {
    repo.get(class, id)?.ok_or(Failure::NotFound)
}

/// Splits `key=value`.
fn parse_assignment(s: &str) -> Result<(&str, &str), Failure> {
    match s.split_once('=') {
        Some((name, raw)) if !name.is_empty() => Ok((name, raw)),
        _ => Err(Failure::Usage(format!(
            "invalid attribute '{}', expected key=value",
            s
        ))),
    }
}

/// Reads `raw` as a value for attribute `name`: verbatim for string
/// attributes, otherwise with [`parse_value`].
fn coerce(defaults: &Attributes, name: &str, raw: &str) -> Value {
    match defaults.get(name) {
        Some(Value::String(_)) => Value::String(raw.to_string()),
        _ => parse_value(raw),
    }
}

/// JSON when the text parses as JSON, otherwise a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
