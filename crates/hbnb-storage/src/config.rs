//! Backend selection and locations, read from the environment.
//!
//! - `HBNB_TYPE_STORAGE`: `file` (default) or `db`
//! - `HBNB_FILE_PATH`: JSON document path (default: "file.json")
//! - `HBNB_DB_PATH`: SQLite database path (default: "hbnb.db")
//! - `HBNB_ENV`: `test` drops all managed tables when the db backend opens

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::StorageError;

pub const DEFAULT_FILE_PATH: &str = "file.json";
pub const DEFAULT_DB_PATH: &str = "hbnb.db";

/// Which backend a [`Repository`](crate::Repository) is opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// JSON document backend.
    #[default]
    File,
    /// SQLite session backend.
    Db,
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "db" => Ok(BackendKind::Db),
            _ => Err(StorageError::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::File => "file",
            BackendKind::Db => "db",
        })
    }
}

/// Everything needed to open a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub file_path: PathBuf,
    pub db_path: PathBuf,
    /// Start the db backend from empty tables.
    pub test_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: BackendKind::File,
            file_path: PathBuf::from(DEFAULT_FILE_PATH),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            test_mode: false,
        }
    }
}

impl StorageConfig {
    /// Reads the `HBNB_*` variables from the process environment.
    pub fn from_env() -> Result<Self, StorageError> {
        StorageConfig::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source. Unset variables take their
    /// defaults; an unrecognized `HBNB_TYPE_STORAGE` is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StorageError> {
        let defaults = StorageConfig::default();
        let backend = match lookup("HBNB_TYPE_STORAGE") {
            Some(value) => value.parse()?,
            None => defaults.backend,
        };
        Ok(StorageConfig {
            backend,
            file_path: lookup("HBNB_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_path),
            db_path: lookup("HBNB_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            test_mode: lookup("HBNB_ENV").is_some_and(|env| env == "test"),
        })
    }
}
