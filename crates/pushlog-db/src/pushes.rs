//! Pushes and their ordered changesets.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::MutexGuard;

/// A stored push with the revisions it carried, in push order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushRecord {
    pub id: i64,
    pub repository_id: i64,
    pub push_id: i64,
    pub user: String,
    pub date: DateTime<Utc>,
    pub changesets: Vec<String>,
}

/// Input for [`Pushes::create`].
#[derive(Debug, Clone)]
pub struct NewPush {
    pub push_id: i64,
    pub user: String,
    pub date: DateTime<Utc>,
}

/// Filter options for listing pushes.
#[derive(Debug, Default, Clone)]
pub struct PushFilter {
    /// Only pushes with a push id greater than this
    pub after: Option<i64>,
    pub limit: Option<usize>,
}

/// Pushes store with a borrowed connection.
pub struct Pushes<'db> {
    conn: MutexGuard<'db, Connection>,
}

impl<'db> Pushes<'db> {
    pub(crate) fn new(conn: MutexGuard<'db, Connection>) -> Self {
        Self { conn }
    }

    /// Create a push linked to `changeset_ids` in order.
    ///
    /// Returns false without writing anything if the push id is already
    /// known for the repository.
    pub fn create(
        &self,
        repository_id: i64,
        push: &NewPush,
        changeset_ids: &[i64],
    ) -> Result<bool, rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;

        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO pushes (repository_id, push_id, user, push_date)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                repository_id,
                push.push_id,
                push.user,
                push.date.to_rfc3339()
            ],
        )?;
        if inserted == 0 {
            return Ok(false);
        }

        let id = tx.last_insert_rowid();
        for (position, changeset_id) in changeset_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO push_changesets (push_id, changeset_id, position) VALUES (?1, ?2, ?3)",
                params![id, changeset_id, position as i64],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    pub fn get(
        &self,
        repository_id: i64,
        push_id: i64,
    ) -> Result<Option<PushRecord>, rusqlite::Error> {
        let push = self
            .conn
            .query_row(
                r#"
                SELECT id, repository_id, push_id, user, push_date FROM pushes
                WHERE repository_id = ?1 AND push_id = ?2
                "#,
                params![repository_id, push_id],
                row_to_record,
            )
            .optional()?;

        match push {
            Some(mut push) => {
                push.changesets = self.revisions(push.id)?;
                Ok(Some(push))
            }
            None => Ok(None),
        }
    }

    /// List pushes of a repository in push id order.
    pub fn list(
        &self,
        repository_id: i64,
        filter: &PushFilter,
    ) -> Result<Vec<PushRecord>, rusqlite::Error> {
        let mut sql = String::from(
            "SELECT id, repository_id, push_id, user, push_date FROM pushes WHERE repository_id = ?",
        );
        let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(repository_id)];

        if let Some(after) = filter.after {
            sql.push_str(" AND push_id > ?");
            param_values.push(Box::new(after));
        }

        sql.push_str(" ORDER BY push_id");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params: Vec<&dyn rusqlite::ToSql> = param_values.iter().map(|p| p.as_ref()).collect();

        let mut pushes = {
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params.as_slice(), row_to_record)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        for push in &mut pushes {
            push.changesets = self.revisions(push.id)?;
        }

        Ok(pushes)
    }

    /// Number of pushes stored for a repository.
    pub fn count(&self, repository_id: i64) -> Result<i64, rusqlite::Error> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM pushes WHERE repository_id = ?1",
            params![repository_id],
            |row| row.get(0),
        )
    }

    fn revisions(&self, push_row_id: i64) -> Result<Vec<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.revision FROM push_changesets pc
            JOIN changesets c ON c.id = pc.changeset_id
            WHERE pc.push_id = ?1
            ORDER BY pc.position
            "#,
        )?;
        let rows = stmt.query_map(params![push_row_id], |row| row.get(0))?;
        rows.collect()
    }
}

fn row_to_record(row: &rusqlite::Row) -> Result<PushRecord, rusqlite::Error> {
    let date: String = row.get(4)?;
    let date = DateTime::parse_from_rfc3339(&date)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(PushRecord {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        push_id: row.get(2)?,
        user: row.get(3)?,
        date,
        changesets: Vec::new(),
    })
}
