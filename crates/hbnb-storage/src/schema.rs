//! SQL schema for the session backend.
//!
//! Every registered type gets one table named after its `TABLE` constant:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "users" (
//!     id TEXT PRIMARY KEY NOT NULL,
//!     attributes_json TEXT NOT NULL
//! )
//! ```
//!
//! The full attribute mapping is stored as JSON TEXT via serde_json; the id
//! column is the only thing queried on. There are no migrations: the schema
//! is created if absent and dropped wholesale in test mode.

use rusqlite::Connection;
use tracing::{debug, info};

use hbnb_core::ClassRegistry;

use crate::error::StorageError;

/// Creates the table for every registered type if it does not exist yet.
pub fn create_all(conn: &Connection, registry: &ClassRegistry) -> Result<(), StorageError> {
    for entry in registry.entries() {
        // Table names are validated as plain identifiers at registration.
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                id TEXT PRIMARY KEY NOT NULL,
                attributes_json TEXT NOT NULL
            )",
            entry.table()
        ))?;
    }
    debug!(tables = registry.len(), "ensured schema");
    Ok(())
}

/// Drops the table of every registered type. Destroys all stored data.
pub fn drop_all(conn: &Connection, registry: &ClassRegistry) -> Result<(), StorageError> {
    for entry in registry.entries() {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", entry.table()))?;
    }
    info!(tables = registry.len(), "dropped all managed tables");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn create_all_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let registry = ClassRegistry::standard();
        create_all(&conn, &registry).unwrap();
        create_all(&conn, &registry).unwrap();
        assert_eq!(
            table_names(&conn),
            ["amenities", "base_models", "cities", "places", "reviews", "states", "users"]
        );
    }

    #[test]
    fn drop_all_removes_managed_tables_only() {
        let conn = Connection::open_in_memory().unwrap();
        let registry = ClassRegistry::standard();
        create_all(&conn, &registry).unwrap();
        conn.execute_batch("CREATE TABLE unrelated (x INTEGER)").unwrap();

        drop_all(&conn, &registry).unwrap();
        assert_eq!(table_names(&conn), ["unrelated"]);
    }
}
