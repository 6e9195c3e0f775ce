use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::client::{PathStatus, RevisionId, VcsError, WorkingCopy};
use crate::resolve::{BadRevision, RevisionField, RevisionResolver};

#[derive(Error, Debug)]
pub enum PathsError {
    #[error(transparent)]
    BadRevision(#[from] BadRevision),

    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Changed paths between two resolved revisions.
#[derive(Debug, Clone)]
pub struct ChangedPaths {
    pub from: RevisionId,
    pub to: RevisionId,
    /// In the order the VCS reported them
    pub paths: Vec<(String, PathStatus)>,
    /// Moved target -> origin
    pub moved: BTreeMap<String, String>,
    /// Copied target -> origin
    pub copied: BTreeMap<String, String>,
}

impl ChangedPaths {
    /// Where the old content of `path` lives at `from`.
    ///
    /// Moved and copied targets did not exist before, so their old content
    /// is read from the origin path.
    pub fn old_path<'p>(&'p self, path: &'p str) -> &'p str {
        self.moved
            .get(path)
            .or_else(|| self.copied.get(path))
            .map(String::as_str)
            .unwrap_or(path)
    }
}

/// Computes path-level changes between two revision tokens.
pub struct PathTracker<'a> {
    repo: &'a dyn WorkingCopy,
}

impl<'a> PathTracker<'a> {
    pub fn new(repo: &'a dyn WorkingCopy) -> Self {
        Self { repo }
    }

    pub fn paths(&self, from: &str, to: &str) -> Result<ChangedPaths, PathsError> {
        let resolver = RevisionResolver::new(self.repo);
        let from = resolver.resolve(RevisionField::From, from)?;
        let to = resolver.resolve(RevisionField::To, to)?;
        self.paths_between(from, to)
    }

    /// Same as [`paths`](Self::paths) for already resolved revisions.
    pub fn paths_between(
        &self,
        from: RevisionId,
        to: RevisionId,
    ) -> Result<ChangedPaths, PathsError> {
        let mut changed = ChangedPaths {
            paths: Vec::new(),
            moved: BTreeMap::new(),
            copied: BTreeMap::new(),
            from,
            to,
        };

        for entry in self.repo.changed_paths(&changed.from, &changed.to)? {
            match (entry.status, entry.origin) {
                (PathStatus::Moved, Some(origin)) => {
                    changed.moved.insert(entry.path.clone(), origin);
                }
                (PathStatus::Copied, Some(origin)) => {
                    changed.copied.insert(entry.path.clone(), origin);
                }
                _ => {}
            }
            changed.paths.push((entry.path, entry.status));
        }

        debug!(
            paths = changed.paths.len(),
            moved = changed.moved.len(),
            copied = changed.copied.len(),
            "Tracked paths"
        );

        Ok(changed)
    }
}
