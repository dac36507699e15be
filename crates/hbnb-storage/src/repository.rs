//! The [`Repository`] facade.
//!
//! Application code talks to a `Repository`, never to a backend directly.
//! The facade resolves class filters and type names through the registry and
//! forwards everything else to whichever [`Storage`] it was opened on.

use std::sync::Arc;

use tracing::info;

use hbnb_core::{ClassFilter, ClassRegistry, Entity, EntityRef, Model};

use crate::config::{BackendKind, StorageConfig};
use crate::error::StorageError;
use crate::file::FileStore;
use crate::sqlite::SqliteStore;
use crate::traits::Storage;
use crate::types::Objects;

/// Process-wide handle to the configured backend.
pub struct Repository {
    backend: Box<dyn Storage>,
}

impl Repository {
    /// Constructs the backend `config` selects and reloads it, so the
    /// repository is ready to serve.
    pub fn open(config: &StorageConfig, registry: Arc<ClassRegistry>) -> Result<Self, StorageError> {
        let backend: Box<dyn Storage> = match config.backend {
            BackendKind::File => Box::new(FileStore::new(&config.file_path, registry)),
            BackendKind::Db => Box::new(SqliteStore::new(
                &config.db_path,
                registry,
                config.test_mode,
            )?),
        };
        backend.reload()?;
        info!(backend = %config.backend, "storage ready");
        Ok(Repository { backend })
    }

    /// Wraps an already constructed backend. The caller is responsible for
    /// the initial `reload`.
    pub fn with_backend(backend: impl Storage + 'static) -> Self {
        Repository {
            backend: Box::new(backend),
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        self.backend.registry()
    }

    pub fn backend(&self) -> &dyn Storage {
        self.backend.as_ref()
    }

    /// Every live entity, or only those of the type `class` names.
    ///
    /// A name the registry does not know is an `UnknownType` error, not an
    /// empty result.
    pub fn all(&self, class: impl Into<ClassFilter>) -> Result<Objects, StorageError> {
        let entry = self.registry().normalize(&class.into())?;
        self.backend.all(entry)
    }

    pub fn new(&self, entity: EntityRef) -> Result<(), StorageError> {
        self.backend.new(entity)
    }

    pub fn save(&self) -> Result<(), StorageError> {
        self.backend.save()
    }

    pub fn delete(&self, entity: Option<&dyn Entity>) -> Result<(), StorageError> {
        self.backend.delete(entity)
    }

    /// Looks up one entity by type name and id.
    pub fn get(&self, type_name: &str, id: &str) -> Result<Option<EntityRef>, StorageError> {
        let entry = self.registry().resolve(type_name)?;
        self.backend.get(entry, id)
    }

    /// Typed lookup: the stored entity cloned out as `M`.
    pub fn get_as<M: Model>(&self, id: &str) -> Result<Option<M>, StorageError> {
        let entry = self.registry().resolve_type::<M>()?;
        let found = self.backend.get(entry, id)?;
        Ok(found.and_then(|entity| entity.downcast_ref::<M>().cloned()))
    }

    pub fn count(&self, class: impl Into<ClassFilter>) -> Result<usize, StorageError> {
        let entry = self.registry().normalize(&class.into())?;
        self.backend.count(entry)
    }

    pub fn reload(&self) -> Result<(), StorageError> {
        self.backend.reload()
    }

    pub fn close(&self) -> Result<(), StorageError> {
        self.backend.close()
    }
}
