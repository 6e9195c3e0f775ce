use std::path::PathBuf;
use std::sync::Arc;

use chrono::DateTime;
use pushlog_db::{Database, NewChangeset, NewPush, RepositoryRecord};
use pushlog_vcs::WorkingCopy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::IngestError;
use crate::locks::RepoLocks;
use crate::sync::RepoSync;

/// One push as reported by the remote pushlog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub id: i64,
    /// Seconds since the epoch
    pub date: i64,
    pub user: String,
    /// Revisions in push order
    pub changesets: Vec<String>,
}

/// What one non-empty ingestion did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub pushes: usize,
    pub last_known_push: i64,
    /// Set when the working copy had to be cloned first
    pub cloned: Option<PathBuf>,
}

/// Records pushes and their changesets, idempotently.
#[derive(Clone)]
pub struct PushIngestor {
    db: Arc<Database>,
    sync: Arc<RepoSync>,
    locks: RepoLocks,
}

impl PushIngestor {
    pub fn new(db: Arc<Database>, sync: Arc<RepoSync>, locks: RepoLocks) -> Self {
        Self { db, sync, locks }
    }

    /// Ingest `pushes` for a repository and return how many were processed.
    ///
    /// `None` means there was nothing to ingest.
    pub async fn ingest(
        &self,
        repository_id: i64,
        pushes: Vec<PushPayload>,
    ) -> Result<Option<usize>, IngestError> {
        Ok(self
            .ingest_with_outcome(repository_id, pushes)
            .await?
            .map(|outcome| outcome.pushes))
    }

    pub async fn ingest_with_outcome(
        &self,
        repository_id: i64,
        pushes: Vec<PushPayload>,
    ) -> Result<Option<IngestOutcome>, IngestError> {
        if pushes.is_empty() {
            return Ok(None);
        }

        let guard = self.locks.get(repository_id).write_owned().await;
        let db = self.db.clone();
        let sync = self.sync.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            ingest_blocking(&db, &sync, repository_id, &pushes).map(Some)
        })
        .await
        .map_err(|e| IngestError::Task(e.to_string()))?
    }
}

fn ingest_blocking(
    db: &Database,
    sync: &RepoSync,
    repository_id: i64,
    pushes: &[PushPayload],
) -> Result<IngestOutcome, IngestError> {
    let record = db
        .repositories()
        .get(repository_id)?
        .ok_or(IngestError::UnknownRepository(repository_id))?;

    let local = sync.ensure(&record)?;
    let cloned = local.cloned.then(|| sync.path_for(&record));
    let repo = local.repo;

    if let Some(last) = pushes.iter().rev().find_map(|p| p.changesets.last()) {
        if sync.ensure_revision(repo.as_ref(), &record, last)?.is_none() {
            return Err(IngestError::MissingRevision {
                repository: record.name.clone(),
                revision: last.clone(),
            });
        }
    }

    let mut highest = record.last_known_push;
    for push in pushes {
        let date = DateTime::from_timestamp(push.date, 0).ok_or_else(|| {
            IngestError::InvalidPush {
                push_id: push.id,
                message: format!("date {} out of range", push.date),
            }
        })?;

        let mut changeset_ids = Vec::with_capacity(push.changesets.len());
        for revision in &push.changesets {
            changeset_ids.push(changeset_id(db, repo.as_ref(), &record, revision)?);
        }

        let created = db.pushes().create(
            record.id,
            &NewPush {
                push_id: push.id,
                user: push.user.clone(),
                date,
            },
            &changeset_ids,
        )?;
        if created {
            debug!(
                repository = %record.name,
                push = push.id,
                changesets = changeset_ids.len(),
                "Stored push"
            );
        }
        highest = highest.max(push.id);
    }

    db.repositories().raise_last_known_push(record.id, highest)?;

    info!(
        repository = %record.name,
        pushes = pushes.len(),
        last_known_push = highest,
        "Ingested pushes"
    );

    Ok(IngestOutcome {
        pushes: pushes.len(),
        last_known_push: highest,
        cloned,
    })
}

/// Row id of the stored changeset for `revision`, reading it from the
/// working copy and storing it if it is new.
fn changeset_id(
    db: &Database,
    repo: &dyn WorkingCopy,
    record: &RepositoryRecord,
    revision: &str,
) -> Result<i64, IngestError> {
    if let Some(known) = db.changesets().find(record.id, revision)? {
        return Ok(known.id);
    }

    let vcs_error = |source| IngestError::Vcs {
        revision: revision.to_string(),
        source,
    };
    let rev = repo.lookup(revision).map_err(vcs_error)?;
    if let Some(known) = db.changesets().find(record.id, rev.as_str())? {
        return Ok(known.id);
    }

    let ctx = repo.changectx(&rev).map_err(vcs_error)?;
    let stored = db.changesets().insert(
        record.id,
        &NewChangeset {
            revision: ctx.revision.as_str().to_string(),
            user: ctx.author,
            description: ctx.description,
            branch: ctx.branch,
            parents: ctx
                .parents
                .iter()
                .map(|parent| parent.as_str().to_string())
                .collect(),
            files: ctx.files,
        },
    )?;
    Ok(stored.id)
}

/// Parse push data in either the list form or the hg `json-pushes` map
/// form (`{"<id>": {date, user, changesets}}`), ordered by push id.
pub fn parse_pushes(body: &str) -> Result<Vec<PushPayload>, serde_json::Error> {
    #[derive(Deserialize)]
    struct MapEntry {
        date: i64,
        user: String,
        changesets: Vec<String>,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Body {
        List(Vec<PushPayload>),
        Map(std::collections::BTreeMap<String, MapEntry>),
    }

    let mut pushes = match serde_json::from_str::<Body>(body)? {
        Body::List(pushes) => pushes,
        Body::Map(map) => {
            let mut pushes = Vec::with_capacity(map.len());
            for (id, entry) in map {
                let id = id.parse::<i64>().map_err(|_| {
                    <serde_json::Error as serde::de::Error>::custom(format!(
                        "push id '{}' is not a number",
                        id
                    ))
                })?;
                pushes.push(PushPayload {
                    id,
                    date: entry.date,
                    user: entry.user,
                    changesets: entry.changesets,
                });
            }
            pushes
        }
    };
    pushes.sort_by_key(|push| push.id);
    Ok(pushes)
}
