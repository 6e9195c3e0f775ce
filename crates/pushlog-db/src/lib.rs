//! Relational store for pushlog.
//!
//! Provides a `Database` struct that owns the SQLite connection and hands
//! out domain-specific stores for repositories, changesets and pushes.

mod changesets;
mod pushes;
mod repositories;

pub use changesets::{ChangesetRecord, Changesets, NewChangeset, FILE_BATCH_SIZE};
pub use pushes::{NewPush, PushFilter, PushRecord, Pushes};
pub use repositories::{NewRepository, Repositories, RepositoryRecord};

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Id of the pre-seeded `default` branch row.
pub const DEFAULT_BRANCH_ID: i64 = 1;

/// The main database struct that owns the SQLite connection.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the default location.
    ///
    /// The default location is `~/.local/share/pushlog/pushlog.db`.
    pub fn open() -> Result<Self, rusqlite::Error> {
        Self::open_at(&Self::default_path())
    }

    /// Open or create a database at a specific path.
    pub fn open_at(path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        tracing::debug!(path = %path.display(), "Opened database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get the default database path.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pushlog")
            .join("pushlog.db")
    }

    /// Access the repositories store.
    pub fn repositories(&self) -> Repositories<'_> {
        let conn = self.conn.lock().expect("Database lock poisoned");
        Repositories::new(conn)
    }

    /// Access the changesets store.
    pub fn changesets(&self) -> Changesets<'_> {
        let conn = self.conn.lock().expect("Database lock poisoned");
        Changesets::new(conn)
    }

    /// Access the pushes store.
    pub fn pushes(&self) -> Pushes<'_> {
        let conn = self.conn.lock().expect("Database lock poisoned");
        Pushes::new(conn)
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS repositories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                fork_of INTEGER REFERENCES repositories(id),
                forest TEXT,
                archived INTEGER NOT NULL DEFAULT 0,
                last_known_push INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS branches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            INSERT OR IGNORE INTO branches (id, name) VALUES (1, 'default');

            CREATE TABLE IF NOT EXISTS changesets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repository_id INTEGER NOT NULL REFERENCES repositories(id),
                revision TEXT NOT NULL,
                user TEXT NOT NULL,
                description TEXT NOT NULL,
                branch_id INTEGER NOT NULL DEFAULT 1 REFERENCES branches(id),
                UNIQUE (repository_id, revision)
            );

            CREATE TABLE IF NOT EXISTS changeset_parents (
                child_id INTEGER NOT NULL REFERENCES changesets(id),
                parent_id INTEGER NOT NULL REFERENCES changesets(id),
                PRIMARY KEY (child_id, parent_id)
            );

            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS changeset_files (
                changeset_id INTEGER NOT NULL REFERENCES changesets(id),
                file_id INTEGER NOT NULL REFERENCES files(id),
                PRIMARY KEY (changeset_id, file_id)
            );

            CREATE TABLE IF NOT EXISTS pushes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repository_id INTEGER NOT NULL REFERENCES repositories(id),
                push_id INTEGER NOT NULL,
                user TEXT NOT NULL,
                push_date TEXT NOT NULL,
                UNIQUE (repository_id, push_id)
            );

            CREATE TABLE IF NOT EXISTS push_changesets (
                push_id INTEGER NOT NULL REFERENCES pushes(id),
                changeset_id INTEGER NOT NULL REFERENCES changesets(id),
                position INTEGER NOT NULL,
                PRIMARY KEY (push_id, position)
            );

            CREATE INDEX IF NOT EXISTS idx_changesets_revision ON changesets(revision);
            CREATE INDEX IF NOT EXISTS idx_pushes_repository ON pushes(repository_id, push_id);
            "#,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_branch_is_seeded() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        let name: String = conn
            .query_row(
                "SELECT name FROM branches WHERE id = ?1",
                [DEFAULT_BRANCH_ID],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(name, "default");
    }

    #[test]
    fn test_open_at_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pushlog.db");

        let db = Database::open_at(&path).unwrap();
        assert!(path.exists());
        assert!(db.repositories().list(true).unwrap().is_empty());

        // Schema creation is repeatable
        drop(db);
        Database::open_at(&path).unwrap();
    }
}
