use std::path::{Path, PathBuf};
use std::sync::Arc;

use pushlog_db::RepositoryRecord;
use pushlog_vcs::{RevisionId, VcsClient, WorkingCopy};
use tracing::{debug, info};

use crate::error::SyncError;

/// A working copy made available by [`RepoSync`].
pub struct LocalRepo {
    pub repo: Box<dyn WorkingCopy>,
    /// Whether it was cloned by this call
    pub cloned: bool,
}

/// Keeps local working copies of tracked repositories under one base
/// directory, at `<base>/<repository name>`.
pub struct RepoSync {
    client: Arc<dyn VcsClient>,
    base: PathBuf,
    update: bool,
}

impl RepoSync {
    pub fn new(client: Arc<dyn VcsClient>, base: impl Into<PathBuf>) -> Self {
        Self {
            client,
            base: base.into(),
            update: true,
        }
    }

    /// Whether to move working trees forward after pulling.
    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn path_for(&self, record: &RepositoryRecord) -> PathBuf {
        self.base.join(&record.name)
    }

    /// Open the working copy, cloning it first if it does not exist yet.
    pub fn ensure(&self, record: &RepositoryRecord) -> Result<LocalRepo, SyncError> {
        let path = self.path_for(record);
        let unavailable = |source| SyncError::RepoUnavailable {
            name: record.name.clone(),
            source,
        };

        if path.exists() {
            let repo = self.client.open(&path).map_err(unavailable)?;
            return Ok(LocalRepo {
                repo,
                cloned: false,
            });
        }

        info!(
            repository = %record.name,
            url = %record.url,
            path = %path.display(),
            "Cloning repository"
        );
        let repo = self
            .client
            .clone_repo(&record.url, &path)
            .map_err(unavailable)?;

        let push_url = push_url_for(&record.url);
        if repo.add_push_url(&push_url).map_err(unavailable)? {
            debug!(repository = %record.name, push_url = %push_url, "Added push url");
        }

        Ok(LocalRepo { repo, cloned: true })
    }

    /// Open an existing working copy without cloning.
    pub fn open(&self, record: &RepositoryRecord) -> Result<Box<dyn WorkingCopy>, SyncError> {
        self.client
            .open(&self.path_for(record))
            .map_err(|source| SyncError::RepoUnavailable {
                name: record.name.clone(),
                source,
            })
    }

    /// Make sure `revision` is known locally, pulling once if it is not.
    ///
    /// Returns `None` when the revision is still unknown after the pull.
    pub fn ensure_revision(
        &self,
        repo: &dyn WorkingCopy,
        record: &RepositoryRecord,
        revision: &str,
    ) -> Result<Option<RevisionId>, SyncError> {
        if let Ok(rev) = repo.lookup(revision) {
            return Ok(Some(rev));
        }

        let unavailable = |source| SyncError::RepoUnavailable {
            name: record.name.clone(),
            source,
        };

        debug!(repository = %record.name, revision, "Revision unknown, pulling");
        repo.pull(&record.url).map_err(unavailable)?;
        if self.update {
            repo.update().map_err(unavailable)?;
        }

        Ok(repo.lookup(revision).ok())
    }
}

/// The push-capable URL recorded for a clone of `url`.
///
/// `http(s)://host/path` becomes `ssh://host/path`; anything else is
/// used as is.
pub fn push_url_for(url: &str) -> String {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .map(|rest| format!("ssh://{}", rest))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_url_for() {
        assert_eq!(
            push_url_for("https://hg.example.com/l10n/de/"),
            "ssh://hg.example.com/l10n/de/"
        );
        assert_eq!(
            push_url_for("http://hg.example.com/l10n/de/"),
            "ssh://hg.example.com/l10n/de/"
        );
        assert_eq!(push_url_for("/srv/repos/de"), "/srv/repos/de");
        assert_eq!(
            push_url_for("ssh://hg.example.com/de"),
            "ssh://hg.example.com/de"
        );
    }
}
