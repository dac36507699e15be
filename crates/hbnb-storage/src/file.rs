//! Document-backed implementation of [`Storage`].
//!
//! [`FileStore`] keeps the working set in memory, keyed by object key, and
//! treats one JSON document as its durable state:
//!
//! ```json
//! {"User.u1": {"__class__": "User", "id": "u1", "email": "...", ...}}
//! ```
//!
//! `save` rewrites the whole document through a temp file and a rename, so a
//! concurrent reader sees either the old or the new document, never a torn
//! one. `reload` rebuilds the working set wholesale from that document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use hbnb_core::{Attributes, ClassEntry, ClassRegistry, Entity, EntityRef, ObjectKey};

use crate::error::StorageError;
use crate::traits::Storage;
use crate::types::{key_of, Objects};

/// The document as it sits on disk: object key → attribute mapping.
type Document = IndexMap<String, Attributes>;

/// JSON-document implementation of [`Storage`].
///
/// Every operation runs under one mutex over the working set, so mutations
/// and `save` never interleave.
pub struct FileStore {
    path: PathBuf,
    registry: Arc<ClassRegistry>,
    objects: Mutex<Objects>,
    corrupt_reloads: AtomicU64,
}

impl FileStore {
    /// Creates a store over the document at `path`.
    ///
    /// Nothing is read until [`reload`](Storage::reload).
    pub fn new(path: impl Into<PathBuf>, registry: Arc<ClassRegistry>) -> Self {
        FileStore {
            path: path.into(),
            registry,
            objects: Mutex::new(Objects::new()),
            corrupt_reloads: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How many reloads found an unreadable document and started empty.
    pub fn corrupt_reloads(&self) -> u64 {
        self.corrupt_reloads.load(Ordering::Relaxed)
    }

    /// Empties the working set and saves an empty document.
    pub fn delete_all(&self) -> Result<(), StorageError> {
        let mut objects = self.lock();
        objects.clear();
        self.write_document(&objects)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// A panic while holding the lock cannot leave the map half-built, so a
    /// poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Objects> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Serializes `objects` and atomically replaces the document.
    fn write_document(&self, objects: &Objects) -> Result<(), StorageError> {
        let mut document = Document::with_capacity(objects.len());
        for (key, entity) in objects {
            document.insert(key.to_string(), entity.to_attributes()?);
        }
        let bytes = serde_json::to_vec(&document)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;

        // The temp file must live in the target directory for the rename to
        // be atomic.
        let permissions = self.document_permissions()?;
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        if let Some(permissions) = permissions {
            temp.as_file()
                .set_permissions(permissions)
                .map_err(|e| self.io_error(e))?;
        }
        temp.write_all(&bytes).map_err(|e| self.io_error(e))?;
        temp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        temp.persist(&self.path).map_err(|e| self.io_error(e.error))?;

        debug!(path = %self.path.display(), count = objects.len(), "saved document");
        Ok(())
    }

    /// Permissions for the rewritten document: those of the current one, or
    /// the platform default for a new one. Temp files start owner-only.
    fn document_permissions(&self) -> Result<Option<fs::Permissions>, StorageError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.permissions())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(new_document_permissions()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Reads the raw document; `None` when it does not exist yet.
    fn read_document(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn parse_document(&self, bytes: &[u8]) -> Result<Document, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::CorruptDocument {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Turns parsed records back into live entities through the registry.
    fn rebuild(&self, document: Document) -> Result<Objects, StorageError> {
        let mut objects = Objects::with_capacity(document.len());
        for (raw_key, attributes) in document {
            let key = ObjectKey::decode(&raw_key)?;
            let entity = self.registry.construct(attributes)?;
            let derived = key_of(entity.as_ref());
            if derived != key {
                return Err(StorageError::Integrity {
                    reason: format!("record stored under '{key}' describes '{derived}'"),
                });
            }
            objects.insert(key, entity);
        }
        Ok(objects)
    }
}

#[cfg(unix)]
fn new_document_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_document_permissions() -> Option<fs::Permissions> {
    None
}

impl Storage for FileStore {
    fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    fn all(&self, class: Option<&ClassEntry>) -> Result<Objects, StorageError> {
        let objects = self.lock();
        Ok(match class {
            None => objects.clone(),
            Some(entry) => objects
                .iter()
                .filter(|(_, entity)| entity.type_name() == entry.name())
                .map(|(key, entity)| (key.clone(), Arc::clone(entity)))
                .collect(),
        })
    }

    fn new(&self, entity: EntityRef) -> Result<(), StorageError> {
        self.registry.entry_for(entity.as_ref())?;
        let key = key_of(entity.as_ref());
        self.lock().insert(key, entity);
        Ok(())
    }

    fn save(&self) -> Result<(), StorageError> {
        let objects = self.lock();
        self.write_document(&objects)
    }

    fn delete(&self, entity: Option<&dyn Entity>) -> Result<(), StorageError> {
        if let Some(entity) = entity {
            self.registry.entry_for(entity)?;
            self.lock().shift_remove(&key_of(entity));
        }
        Ok(())
    }

    fn get(&self, class: &ClassEntry, id: &str) -> Result<Option<EntityRef>, StorageError> {
        let key = ObjectKey::encode(class.name(), id);
        Ok(self.lock().get(&key).cloned())
    }

    fn count(&self, class: Option<&ClassEntry>) -> Result<usize, StorageError> {
        let objects = self.lock();
        Ok(match class {
            None => objects.len(),
            Some(entry) => objects
                .values()
                .filter(|entity| entity.type_name() == entry.name())
                .count(),
        })
    }

    fn reload(&self) -> Result<(), StorageError> {
        let mut objects = self.lock();
        objects.clear();

        let Some(bytes) = self.read_document()? else {
            debug!(path = %self.path.display(), "no document yet; starting empty");
            return Ok(());
        };

        let document = match self.parse_document(&bytes) {
            Ok(document) => document,
            Err(err) => {
                self.corrupt_reloads.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "discarding unreadable document; working set is empty");
                return Ok(());
            }
        };

        *objects = self.rebuild(document)?;
        debug!(path = %self.path.display(), count = objects.len(), "reloaded document");
        Ok(())
    }

    /// Discards unsaved changes by reloading the last saved document.
    fn close(&self) -> Result<(), StorageError> {
        self.reload()
    }
}
