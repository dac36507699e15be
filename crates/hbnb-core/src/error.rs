//! Core error types for hbnb-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! all anticipated failure modes in the entity model and class registry.

use thiserror::Error;

/// Core errors produced by the hbnb-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A type name (from a filter or a stored record) is not registered.
    #[error("unknown type: '{name}'")]
    UnknownType { name: String },

    /// Attempting to register a type name that already exists in the registry.
    #[error("duplicate type name: '{name}'")]
    DuplicateTypeName { name: String },

    /// A model declared a table name that is not a plain SQL identifier.
    #[error("invalid table name: '{table}'")]
    InvalidTableName { table: String },

    /// A composite key string is not of the form `TypeName.id`.
    #[error("invalid object key: '{key}'")]
    InvalidKey { key: String },

    /// An attribute mapping carries no `__class__` entry.
    #[error("record has no '__class__' attribute")]
    MissingClass,

    /// An attribute mapping could not be turned into an entity of its type.
    #[error("invalid {type_name} record: {reason}")]
    InvalidRecord { type_name: String, reason: String },

    /// An attribute name the type does not declare.
    #[error("{type_name} has no attribute '{name}'")]
    UnknownAttribute { type_name: String, name: String },

    /// An identity or timestamp attribute was given a new value.
    #[error("{type_name} attribute '{name}' is read-only")]
    ReadOnlyAttribute { type_name: String, name: String },

    /// JSON serialization of an entity failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
