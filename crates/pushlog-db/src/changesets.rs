//! Changesets, their parents, branches and touched files.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::MutexGuard;

use crate::DEFAULT_BRANCH_ID;

/// Upper bound on paths per statement, below SQLite's bound-parameter limit.
pub const FILE_BATCH_SIZE: usize = 900;

/// A stored changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangesetRecord {
    pub id: i64,
    pub repository_id: i64,
    pub revision: String,
    pub user: String,
    pub description: String,
    pub branch: String,
}

/// Changeset metadata read from the VCS, ready to be stored.
#[derive(Debug, Clone, Default)]
pub struct NewChangeset {
    pub revision: String,
    pub user: String,
    pub description: String,
    pub branch: String,
    /// Parent revisions; parents not yet stored are skipped
    pub parents: Vec<String>,
    /// Touched paths, byte-exact
    pub files: Vec<String>,
}

/// Changesets store with a borrowed connection.
pub struct Changesets<'db> {
    conn: MutexGuard<'db, Connection>,
}

impl<'db> Changesets<'db> {
    pub(crate) fn new(conn: MutexGuard<'db, Connection>) -> Self {
        Self { conn }
    }

    pub fn find(
        &self,
        repository_id: i64,
        revision: &str,
    ) -> Result<Option<ChangesetRecord>, rusqlite::Error> {
        self.conn
            .query_row(
                r#"
                SELECT c.id, c.repository_id, c.revision, c.user, c.description, b.name
                FROM changesets c JOIN branches b ON b.id = c.branch_id
                WHERE c.repository_id = ?1 AND c.revision = ?2
                "#,
                params![repository_id, revision],
                row_to_record,
            )
            .optional()
    }

    /// Store a changeset with its branch, parents and files in one
    /// transaction. Nothing is written if any step fails.
    pub fn insert(
        &self,
        repository_id: i64,
        changeset: &NewChangeset,
    ) -> Result<ChangesetRecord, rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;

        let branch_id = branch_id(&tx, &changeset.branch)?;
        tx.execute(
            r#"
            INSERT INTO changesets (repository_id, revision, user, description, branch_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                repository_id,
                changeset.revision,
                changeset.user,
                changeset.description,
                branch_id,
            ],
        )?;
        let id = tx.last_insert_rowid();

        for parent in &changeset.parents {
            tx.execute(
                r#"
                INSERT OR IGNORE INTO changeset_parents (child_id, parent_id)
                SELECT ?1, id FROM changesets WHERE repository_id = ?2 AND revision = ?3
                "#,
                params![id, repository_id, parent],
            )?;
        }

        let file_ids = file_ids(&tx, &changeset.files)?;
        for file_id in &file_ids {
            tx.execute(
                "INSERT OR IGNORE INTO changeset_files (changeset_id, file_id) VALUES (?1, ?2)",
                params![id, file_id],
            )?;
        }

        tx.commit()?;

        tracing::debug!(
            revision = %changeset.revision,
            files = file_ids.len(),
            "Stored changeset"
        );

        Ok(ChangesetRecord {
            id,
            repository_id,
            revision: changeset.revision.clone(),
            user: changeset.user.clone(),
            description: changeset.description.clone(),
            branch: changeset.branch.clone(),
        })
    }

    /// Revisions of the stored parents of a changeset.
    pub fn parents(&self, id: i64) -> Result<Vec<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.revision FROM changeset_parents p
            JOIN changesets c ON c.id = p.parent_id
            WHERE p.child_id = ?1
            ORDER BY c.id
            "#,
        )?;
        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        rows.collect()
    }

    /// Paths touched by a changeset, sorted.
    pub fn files(&self, id: i64) -> Result<Vec<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT f.path FROM changeset_files cf
            JOIN files f ON f.id = cf.file_id
            WHERE cf.changeset_id = ?1
            ORDER BY f.path
            "#,
        )?;
        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        rows.collect()
    }

    /// Number of changesets stored for a repository.
    pub fn count(&self, repository_id: i64) -> Result<i64, rusqlite::Error> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM changesets WHERE repository_id = ?1",
            params![repository_id],
            |row| row.get(0),
        )
    }

    /// Ids of repositories holding a changeset whose revision starts with
    /// `prefix`.
    pub fn repositories_with_revision(&self, prefix: &str) -> Result<Vec<i64>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT repository_id FROM changesets
            WHERE substr(revision, 1, length(?1)) = ?1
            ORDER BY repository_id
            "#,
        )?;
        let rows = stmt.query_map(params![prefix], |row| row.get(0))?;
        rows.collect()
    }
}

fn branch_id(tx: &Transaction<'_>, name: &str) -> Result<i64, rusqlite::Error> {
    if name.is_empty() || name == "default" {
        return Ok(DEFAULT_BRANCH_ID);
    }
    tx.execute(
        "INSERT OR IGNORE INTO branches (name) VALUES (?1)",
        params![name],
    )?;
    tx.query_row(
        "SELECT id FROM branches WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
}

/// Resolve or create file rows for `paths`.
///
/// Paths with trailing whitespace are looked up one at a time and compared
/// byte for byte; the rest go through batched `IN (...)` statements.
fn file_ids(tx: &Transaction<'_>, paths: &[String]) -> Result<Vec<i64>, rusqlite::Error> {
    let (spaced, plain): (Vec<&String>, Vec<&String>) = paths
        .iter()
        .partition(|path| path.len() != path.trim_end().len());

    let mut ids = Vec::with_capacity(paths.len());

    for chunk in plain.chunks(FILE_BATCH_SIZE) {
        let placeholders = vec!["(?)"; chunk.len()].join(", ");
        tx.execute(
            &format!("INSERT OR IGNORE INTO files (path) VALUES {placeholders}"),
            params_from_iter(chunk.iter()),
        )?;

        let placeholders = vec!["?"; chunk.len()].join(", ");
        let mut stmt =
            tx.prepare(&format!("SELECT path, id FROM files WHERE path IN ({placeholders})"))?;
        let found = stmt
            .query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;

        for path in chunk {
            if let Some(id) = found.get(path.as_str()) {
                ids.push(*id);
            }
        }
    }

    for path in spaced {
        let existing = {
            let mut stmt = tx.prepare("SELECT id, path FROM files WHERE path = ?1")?;
            let rows = stmt.query_map(params![path], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut matched = None;
            for row in rows {
                let (id, stored) = row?;
                if stored.as_bytes() == path.as_bytes() {
                    matched = Some(id);
                }
            }
            matched
        };

        let id = match existing {
            Some(id) => id,
            None => {
                tx.execute("INSERT INTO files (path) VALUES (?1)", params![path])?;
                tx.last_insert_rowid()
            }
        };
        ids.push(id);
    }

    Ok(ids)
}

fn row_to_record(row: &rusqlite::Row) -> Result<ChangesetRecord, rusqlite::Error> {
    Ok(ChangesetRecord {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        revision: row.get(2)?,
        user: row.get(3)?,
        description: row.get(4)?,
        branch: row.get(5)?,
    })
}
