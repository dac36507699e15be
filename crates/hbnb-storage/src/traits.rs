//! The [`Storage`] trait defining the contract every backend honors.
//!
//! Class filters arrive already normalized: the [`Repository`] resolves the
//! caller's type name or type through the registry and hands backends either
//! `None` (all types) or the single [`ClassEntry`] to restrict to.
//!
//! All backends implement this trait with identical observable semantics, so
//! they are swappable without changing calling code.
//!
//! [`Repository`]: crate::repository::Repository

use hbnb_core::{ClassEntry, ClassRegistry, Entity, EntityRef};

use crate::error::StorageError;
use crate::types::Objects;

/// The storage contract for hbnb entities.
///
/// Methods take `&self`; each backend serializes access internally so one
/// instance can be shared behind an `Arc`.
pub trait Storage: Send + Sync {
    /// Registry used to rebuild stored records.
    fn registry(&self) -> &ClassRegistry;

    /// Every live entity, optionally restricted to one type.
    fn all(&self, class: Option<&ClassEntry>) -> Result<Objects, StorageError>;

    /// Inserts or overwrites an entity. Not durable until [`save`](Self::save).
    ///
    /// An entity whose type is not in the registry is rejected with
    /// `UnknownType`.
    fn new(&self, entity: EntityRef) -> Result<(), StorageError>;

    /// Makes every pending change durable.
    fn save(&self) -> Result<(), StorageError>;

    /// Removes an entity if present; `None` is a no-op, as is an entity of a
    /// registered type that is not stored.
    ///
    /// An entity whose type is not in the registry is rejected with
    /// `UnknownType`, the same as [`new`](Self::new) rejects it.
    ///
    /// Staged only: durable on the next [`save`](Self::save).
    fn delete(&self, entity: Option<&dyn Entity>) -> Result<(), StorageError>;

    /// Looks up one entity; `Ok(None)` when absent.
    fn get(&self, class: &ClassEntry, id: &str) -> Result<Option<EntityRef>, StorageError>;

    /// Number of live entities, optionally restricted to one type.
    fn count(&self, class: Option<&ClassEntry>) -> Result<usize, StorageError>;

    /// Rebuilds working state from durable state. Idempotent.
    fn reload(&self) -> Result<(), StorageError>;

    /// Ends the current working state; see each backend for specifics.
    fn close(&self) -> Result<(), StorageError>;
}
