use std::sync::Arc;

use pushlog_db::{Database, RepositoryRecord};
use pushlog_diff::{DataTree, EntityDiffEngine, FileDiff};
use pushlog_vcs::{PathTracker, RevisionField, RevisionId, RevisionResolver, WorkingCopy};
use serde::Deserialize;
use tracing::debug;

use crate::error::DiffError;
use crate::locks::RepoLocks;
use crate::sync::RepoSync;

/// Shortest token considered when looking for a revision in other
/// repositories of the same fork family.
const MIN_FOREIGN_PREFIX: usize = 4;

/// Query parameters of a diff request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiffRequest {
    pub repo: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl DiffRequest {
    pub fn new(repo: &str, from: &str, to: &str) -> Self {
        Self {
            repo: Some(repo.to_string()),
            from: Some(from.to_string()),
            to: Some(to.to_string()),
        }
    }
}

/// Computes entity diffs between two revisions of a tracked repository.
#[derive(Clone)]
pub struct DiffService {
    db: Arc<Database>,
    sync: Arc<RepoSync>,
    locks: RepoLocks,
}

impl DiffService {
    pub fn new(db: Arc<Database>, sync: Arc<RepoSync>, locks: RepoLocks) -> Self {
        Self { db, sync, locks }
    }

    pub async fn diff(&self, request: DiffRequest) -> Result<DataTree<FileDiff>, DiffError> {
        let name = required(request.repo, "repo")?;
        let record = self
            .db
            .repositories()
            .get_by_name(&name)?
            .ok_or(DiffError::UnknownRepository(name))?;
        let from = required(request.from, "from")?;
        let to = required(request.to, "to")?;

        let guard = self.locks.get(record.id).read_owned().await;
        let db = self.db.clone();
        let sync = self.sync.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            diff_blocking(&db, &sync, &record, &from, &to)
        })
        .await
        .map_err(|e| DiffError::Task(e.to_string()))?
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, DiffError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(DiffError::MissingParameter(name)),
    }
}

fn diff_blocking(
    db: &Database,
    sync: &RepoSync,
    record: &RepositoryRecord,
    from: &str,
    to: &str,
) -> Result<DataTree<FileDiff>, DiffError> {
    let repo = sync.open(record)?;
    let from = resolve(db, repo.as_ref(), record, RevisionField::From, from)?;
    let to = resolve(db, repo.as_ref(), record, RevisionField::To, to)?;

    debug!(repository = %record.name, from = from.short(), to = to.short(), "Computing diff");

    let changed = PathTracker::new(repo.as_ref()).paths_between(from, to)?;
    Ok(EntityDiffEngine::new(repo.as_ref(), &changed).diff_tree()?)
}

/// Resolve a token, reporting revisions that only exist in a related
/// fork separately from plain unknown ones.
fn resolve(
    db: &Database,
    repo: &dyn WorkingCopy,
    record: &RepositoryRecord,
    field: RevisionField,
    token: &str,
) -> Result<RevisionId, DiffError> {
    let bad = match RevisionResolver::new(repo).resolve(field, token) {
        Ok(rev) => return Ok(rev),
        Err(bad) => bad,
    };

    match foreign_owner(db, record, token)? {
        Some(owner) => Err(DiffError::CrossRepository {
            field,
            token: token.to_string(),
            owner,
            requested: record.name.clone(),
        }),
        None => Err(DiffError::BadRevision(bad)),
    }
}

fn foreign_owner(
    db: &Database,
    record: &RepositoryRecord,
    token: &str,
) -> Result<Option<String>, DiffError> {
    let token = token.trim();
    if token.len() < MIN_FOREIGN_PREFIX || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(None);
    }

    let holders = db
        .changesets()
        .repositories_with_revision(&token.to_ascii_lowercase())?;
    if holders.is_empty() {
        return Ok(None);
    }

    let related = db.repositories().related(record.id)?;
    Ok(related
        .into_iter()
        .find(|repo| holders.contains(&repo.id))
        .map(|repo| repo.name))
}
