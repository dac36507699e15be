//! SQLite implementation of [`Storage`].
//!
//! [`SqliteStore`] keeps no copy of the working set. It owns one [`Session`]
//! on a pooled [`Engine`] connection: `new` and `delete` stage statements in
//! the session's transaction, `save` commits it, and reads go straight to the
//! database through the same connection, so they see staged changes.
//!
//! `reload` releases the previous session (rolling back anything unsaved),
//! ensures the schema and starts a fresh one. `close` releases the session;
//! every operation then fails with [`StorageError::SessionClosed`] until the
//! next `reload`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use hbnb_core::{Attributes, ClassEntry, ClassRegistry, Entity, EntityRef};

use crate::engine::{Engine, Session};
use crate::error::StorageError;
use crate::schema;
use crate::traits::Storage;
use crate::types::{key_of, Objects};

/// SQLite-backed implementation of [`Storage`].
pub struct SqliteStore {
    engine: Engine,
    registry: Arc<ClassRegistry>,
    session: Mutex<Option<Session>>,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    ///
    /// With `test_mode` every managed table is dropped first. The store has no
    /// session until [`reload`](Storage::reload).
    pub fn new(
        path: impl Into<PathBuf>,
        registry: Arc<ClassRegistry>,
        test_mode: bool,
    ) -> Result<Self, StorageError> {
        SqliteStore::with_engine(Engine::open(path)?, registry, test_mode)
    }

    /// Builds a store over an existing engine.
    ///
    /// Stores sharing one engine share its connection pool but each holds its
    /// own session, which is how separate threads get separate units of work.
    pub fn with_engine(
        engine: Engine,
        registry: Arc<ClassRegistry>,
        test_mode: bool,
    ) -> Result<Self, StorageError> {
        if test_mode {
            engine.with_connection(|conn| schema::drop_all(conn, &registry))?;
        }
        Ok(SqliteStore {
            engine,
            registry,
            session: Mutex::new(None),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// True between a `reload` and the next `close`.
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Discards everything staged since the last `save`.
    pub fn rollback(&self) -> Result<(), StorageError> {
        self.with_session(Session::rollback)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<T>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self.lock();
        let session = guard.as_mut().ok_or(StorageError::SessionClosed)?;
        f(session)
    }

    /// The entries a normalized class filter covers.
    fn entries<'a>(&'a self, class: Option<&'a ClassEntry>) -> Vec<&'a ClassEntry> {
        match class {
            Some(entry) => vec![entry],
            None => self.registry.entries().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Row operations
// ---------------------------------------------------------------------------

fn upsert(conn: &Connection, entry: &ClassEntry, entity: &dyn Entity) -> Result<(), StorageError> {
    let attributes_json = serde_json::to_string(&entity.to_attributes()?)?;
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT INTO \"{}\" (id, attributes_json) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET attributes_json = excluded.attributes_json",
        entry.table()
    ))?;
    stmt.execute(params![entity.id(), attributes_json])?;
    Ok(())
}

fn remove(conn: &Connection, entry: &ClassEntry, id: &str) -> Result<(), StorageError> {
    let mut stmt = conn.prepare_cached(&format!("DELETE FROM \"{}\" WHERE id = ?1", entry.table()))?;
    stmt.execute(params![id])?;
    Ok(())
}

fn rebuild(entry: &ClassEntry, attributes_json: &str) -> Result<EntityRef, StorageError> {
    let attributes: Attributes = serde_json::from_str(attributes_json)?;
    Ok(entry.construct(attributes)?)
}

fn fetch_all(conn: &Connection, entry: &ClassEntry) -> Result<Vec<EntityRef>, StorageError> {
    let mut stmt = conn.prepare_cached(&format!("SELECT attributes_json FROM \"{}\"", entry.table()))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut result = Vec::new();
    for row in rows {
        result.push(rebuild(entry, &row?)?);
    }
    Ok(result)
}

fn fetch_one(
    conn: &Connection,
    entry: &ClassEntry,
    id: &str,
) -> Result<Option<EntityRef>, StorageError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT attributes_json FROM \"{}\" WHERE id = ?1",
        entry.table()
    ))?;
    let row: Option<String> = stmt.query_row(params![id], |row| row.get(0)).optional()?;
    row.map(|json| rebuild(entry, &json)).transpose()
}

fn count_rows(conn: &Connection, entry: &ClassEntry) -> Result<usize, StorageError> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM \"{}\"", entry.table()),
        [],
        |row| row.get(0),
    )?;
    // COUNT(*) is never negative.
    Ok(usize::try_from(count).unwrap_or_default())
}

impl Storage for SqliteStore {
    fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    fn all(&self, class: Option<&ClassEntry>) -> Result<Objects, StorageError> {
        let entries = self.entries(class);
        self.with_session(|session| {
            let conn = session.connection()?;
            let mut objects = Objects::new();
            for entry in entries {
                for entity in fetch_all(conn, entry)? {
                    objects.insert(key_of(entity.as_ref()), entity);
                }
            }
            Ok(objects)
        })
    }

    fn new(&self, entity: EntityRef) -> Result<(), StorageError> {
        let entry = self.registry.entry_for(entity.as_ref())?;
        self.with_session(|session| upsert(session.begin()?, entry, entity.as_ref()))
    }

    fn save(&self) -> Result<(), StorageError> {
        self.with_session(Session::commit)
    }

    fn delete(&self, entity: Option<&dyn Entity>) -> Result<(), StorageError> {
        let Some(entity) = entity else {
            return Ok(());
        };
        let entry = self.registry.entry_for(entity)?;
        self.with_session(|session| remove(session.begin()?, entry, entity.id()))
    }

    fn get(&self, class: &ClassEntry, id: &str) -> Result<Option<EntityRef>, StorageError> {
        self.with_session(|session| fetch_one(session.connection()?, class, id))
    }

    fn count(&self, class: Option<&ClassEntry>) -> Result<usize, StorageError> {
        let entries = self.entries(class);
        self.with_session(|session| {
            let conn = session.connection()?;
            let mut total = 0;
            for entry in entries {
                total += count_rows(conn, entry)?;
            }
            Ok(total)
        })
    }

    fn reload(&self) -> Result<(), StorageError> {
        let mut guard = self.lock();
        // Release first: the old session may hold the write lock.
        drop(guard.take());
        self.engine
            .with_connection(|conn| schema::create_all(conn, &self.registry))?;
        *guard = Some(self.engine.session()?);
        debug!(path = %self.engine.path().display(), "session established");
        Ok(())
    }

    /// Releases the session; uncommitted work is rolled back.
    fn close(&self) -> Result<(), StorageError> {
        if self.lock().take().is_some() {
            debug!(path = %self.engine.path().display(), "session released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hbnb_core::{Base, Model, Place, State, User};
    use tempfile::TempDir;

    fn setup() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(
            dir.path().join("hbnb.db"),
            Arc::new(ClassRegistry::standard()),
            false,
        )
        .unwrap();
        store.reload().unwrap();
        (store, dir)
    }

    fn sibling(store: &SqliteStore) -> SqliteStore {
        let other = SqliteStore::with_engine(
            store.engine().clone(),
            Arc::new(ClassRegistry::standard()),
            false,
        )
        .unwrap();
        other.reload().unwrap();
        other
    }

    fn state(id: &str, name: &str) -> State {
        State {
            base: Base::with_id(id),
            name: name.into(),
        }
    }

    #[test]
    fn operations_require_a_session() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(
            dir.path().join("hbnb.db"),
            Arc::new(ClassRegistry::standard()),
            false,
        )
        .unwrap();
        assert!(!store.is_open());
        assert!(matches!(store.count(None), Err(StorageError::SessionClosed)));

        store.reload().unwrap();
        assert!(store.is_open());
        store.close().unwrap();
        assert!(matches!(store.save(), Err(StorageError::SessionClosed)));
    }

    #[test]
    fn staged_writes_are_private_until_save() {
        let (store, _dir) = setup();
        let other = sibling(&store);

        store.new(state("s1", "Texas").into_ref()).unwrap();
        assert_eq!(store.count(None).unwrap(), 1);
        assert_eq!(other.count(None).unwrap(), 0);

        store.save().unwrap();
        assert_eq!(other.count(None).unwrap(), 1);
    }

    #[test]
    fn close_rolls_back_unsaved_work() {
        let (store, _dir) = setup();
        store.new(state("s1", "Texas").into_ref()).unwrap();
        store.close().unwrap();
        store.reload().unwrap();
        assert_eq!(store.count(None).unwrap(), 0);
    }

    #[test]
    fn rollback_discards_staged_work() {
        let (store, _dir) = setup();
        store.new(state("s1", "Texas").into_ref()).unwrap();
        store.save().unwrap();
        store.new(state("s2", "Ohio").into_ref()).unwrap();
        store.delete(Some(&state("s1", "Texas"))).unwrap();

        store.rollback().unwrap();
        let states = store.all(None).unwrap();
        assert_eq!(states.len(), 1);
        assert!(states.keys().all(|key| key.id() == "s1"));
    }

    #[test]
    fn new_overwrites_existing_row() {
        let (store, _dir) = setup();
        store.new(state("s1", "Texas").into_ref()).unwrap();
        store.save().unwrap();
        store.new(state("s1", "Lone Star").into_ref()).unwrap();
        store.save().unwrap();

        let entry = store.registry().resolve("State").unwrap();
        let found = store.get(entry, "s1").unwrap().unwrap();
        assert_eq!(found.downcast_ref::<State>().unwrap().name, "Lone Star");
        assert_eq!(store.count(None).unwrap(), 1);
    }

    #[test]
    fn count_is_pushed_down_per_table() {
        let (store, _dir) = setup();
        store.new(state("s1", "Texas").into_ref()).unwrap();
        store.new(Place::default().into_ref()).unwrap();
        store.new(User::default().into_ref()).unwrap();
        store.save().unwrap();

        let registry = ClassRegistry::standard();
        let place = registry.resolve("Place").unwrap();
        assert_eq!(store.count(Some(place)).unwrap(), 1);
        assert_eq!(store.count(None).unwrap(), store.all(None).unwrap().len());
    }

    #[test]
    fn test_mode_drops_existing_tables() {
        let (store, dir) = setup();
        store.new(state("s1", "Texas").into_ref()).unwrap();
        store.save().unwrap();
        store.close().unwrap();

        let fresh = SqliteStore::new(
            dir.path().join("hbnb.db"),
            Arc::new(ClassRegistry::standard()),
            true,
        )
        .unwrap();
        fresh.reload().unwrap();
        assert_eq!(fresh.count(None).unwrap(), 0);
    }

    #[test]
    fn reload_and_close_do_not_leak_connections() {
        let (store, _dir) = setup();
        for _ in 0..10 {
            store.reload().unwrap();
        }
        assert_eq!(store.engine().idle_connections(), 0);
        store.close().unwrap();
        assert_eq!(store.engine().idle_connections(), 1);
    }

    #[test]
    fn reload_discards_unsaved_work() {
        let (store, _dir) = setup();
        store.new(state("s1", "Texas").into_ref()).unwrap();
        store.reload().unwrap();
        assert_eq!(store.count(None).unwrap(), 0);
    }

    #[test]
    fn per_thread_stores_share_one_engine() {
        let (store, _dir) = setup();
        let engine = store.engine().clone();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    let local = SqliteStore::with_engine(
                        engine,
                        Arc::new(ClassRegistry::standard()),
                        false,
                    )
                    .unwrap();
                    local.reload().unwrap();
                    for i in 0..10 {
                        local
                            .new(state(&format!("{t}-{i}"), "Somewhere").into_ref())
                            .unwrap();
                        local.save().unwrap();
                    }
                    local.close().unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count(None).unwrap(), 40);
    }

    #[test]
    fn store_accepts_work_after_a_failed_save() {
        let (store, _dir) = setup();
        store
            .with_session(|session| {
                let conn = session.connection()?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.execute_batch(
                    "CREATE TABLE parent (id INTEGER PRIMARY KEY);
                     CREATE TABLE child (
                         parent_id INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED
                     );",
                )?;
                Ok(())
            })
            .unwrap();

        store.new(state("s1", "Texas").into_ref()).unwrap();
        store
            .with_session(|session| {
                session
                    .begin()?
                    .execute("INSERT INTO child (parent_id) VALUES (1)", [])?;
                Ok(())
            })
            .unwrap();
        assert!(matches!(store.save(), Err(StorageError::Transaction { .. })));
        assert_eq!(store.count(None).unwrap(), 0);

        store.new(state("s2", "Ohio").into_ref()).unwrap();
        store.save().unwrap();
        let states = store.all(None).unwrap();
        assert_eq!(states.len(), 1);
        assert!(states.keys().all(|key| key.id() == "s2"));
    }
}
