//! Tracked repositories and their push watermarks.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::MutexGuard;

/// A tracked repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryRecord {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub fork_of: Option<i64>,
    pub forest: Option<String>,
    pub archived: bool,
    /// Highest push id ingested so far
    pub last_known_push: i64,
}

/// Input for [`Repositories::create`].
#[derive(Debug, Clone, Default)]
pub struct NewRepository {
    pub name: String,
    pub url: String,
    pub fork_of: Option<i64>,
    pub forest: Option<String>,
}

const COLUMNS: &str = "id, name, url, fork_of, forest, archived, last_known_push";

/// Repositories store with a borrowed connection.
pub struct Repositories<'db> {
    conn: MutexGuard<'db, Connection>,
}

impl<'db> Repositories<'db> {
    pub(crate) fn new(conn: MutexGuard<'db, Connection>) -> Self {
        Self { conn }
    }

    pub fn create(&self, repo: &NewRepository) -> Result<RepositoryRecord, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO repositories (name, url, fork_of, forest) VALUES (?1, ?2, ?3, ?4)",
            params![repo.name, repo.url, repo.fork_of, repo.forest],
        )?;

        Ok(RepositoryRecord {
            id: self.conn.last_insert_rowid(),
            name: repo.name.clone(),
            url: repo.url.clone(),
            fork_of: repo.fork_of,
            forest: repo.forest.clone(),
            archived: false,
            last_known_push: 0,
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<RepositoryRecord>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM repositories WHERE id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<RepositoryRecord>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM repositories WHERE name = ?1"),
                params![name],
                row_to_record,
            )
            .optional()
    }

    /// List repositories ordered by name.
    pub fn list(&self, include_archived: bool) -> Result<Vec<RepositoryRecord>, rusqlite::Error> {
        let mut sql = format!("SELECT {COLUMNS} FROM repositories");
        if !include_archived {
            sql.push_str(" WHERE archived = 0");
        }
        sql.push_str(" ORDER BY name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect()
    }

    /// Repositories in the same fork family: the one it was forked from,
    /// its forks, and its siblings.
    pub fn related(&self, id: i64) -> Result<Vec<RepositoryRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {COLUMNS} FROM repositories
            WHERE id != ?1 AND (
                fork_of = ?1
                OR id = (SELECT fork_of FROM repositories WHERE id = ?1)
                OR fork_of = (SELECT fork_of FROM repositories WHERE id = ?1)
            )
            ORDER BY name
            "#
        ))?;
        let rows = stmt.query_map(params![id], row_to_record)?;
        rows.collect()
    }

    /// Mark a repository archived. Returns false if no such repository.
    pub fn archive(&self, name: &str) -> Result<bool, rusqlite::Error> {
        let rows = self.conn.execute(
            "UPDATE repositories SET archived = 1 WHERE name = ?1",
            params![name],
        )?;
        Ok(rows > 0)
    }

    /// Raise the push watermark. Lower values are ignored; returns whether
    /// the watermark moved.
    pub fn raise_last_known_push(&self, id: i64, push_id: i64) -> Result<bool, rusqlite::Error> {
        let rows = self.conn.execute(
            "UPDATE repositories SET last_known_push = ?2 WHERE id = ?1 AND last_known_push < ?2",
            params![id, push_id],
        )?;
        Ok(rows > 0)
    }
}

fn row_to_record(row: &rusqlite::Row) -> Result<RepositoryRecord, rusqlite::Error> {
    Ok(RepositoryRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        fork_of: row.get(3)?,
        forest: row.get(4)?,
        archived: row.get::<_, i64>(5)? != 0,
        last_known_push: row.get(6)?,
    })
}
