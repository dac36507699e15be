//! Storage abstraction for hbnb entities.
//!
//! Provides the [`Storage`] trait defining the contract every backend
//! implements, the [`FileStore`] and [`SqliteStore`] backends, and the
//! [`Repository`] facade application code is written against.
//!
//! # Architecture
//!
//! Startup is always: construct a backend, `reload()` it, then serve traffic
//! through the [`Repository`]. [`Repository::open`] does all three from a
//! [`StorageConfig`].
//!
//! - The **document backend** keeps an explicit working set in memory and
//!   rewrites one JSON document on `save`.
//! - The **session backend** keeps no mirror: it stages changes in a SQLite
//!   transaction owned by a pooled [`Session`] and commits on `save`.
//!
//! Both backends stage deletes; nothing is durable until `save`.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: the `Objects` result map
//! - [`traits`]: Storage trait definition
//! - [`file`]: FileStore implementation
//! - [`engine`]: connection pool and Session guard
//! - [`schema`]: per-type DDL for the session backend
//! - [`sqlite`]: SqliteStore implementation
//! - [`config`]: environment-driven backend selection
//! - [`repository`]: Repository facade

pub mod config;
pub mod engine;
pub mod error;
pub mod file;
pub mod repository;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use config::{BackendKind, StorageConfig};
pub use engine::{Engine, Session};
pub use error::StorageError;
pub use file::FileStore;
pub use repository::Repository;
pub use sqlite::SqliteStore;
pub use traits::Storage;
pub use types::Objects;
