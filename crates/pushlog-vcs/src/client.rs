use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name recorded for changesets on the repository's main line.
pub const DEFAULT_BRANCH: &str = "default";

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Not a repository: {0}")]
    NotARepo(String),

    #[error("Unknown revision: {0}")]
    UnknownRevision(String),

    #[error("Ambiguous revision: {0}")]
    AmbiguousRevision(String),

    #[error("Path '{path}' does not exist at {revision}")]
    PathNotFound { path: String, revision: String },

    #[error("Git operation failed: {0}")]
    GitOperationFailed(#[from] git2::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Canonical (full hex) revision identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, as shown in push logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a path changed between two revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStatus {
    Added,
    Changed,
    Removed,
    Copied,
    Moved,
}

impl PathStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathStatus::Added => "added",
            PathStatus::Changed => "changed",
            PathStatus::Removed => "removed",
            PathStatus::Copied => "copied",
            PathStatus::Moved => "moved",
        }
    }
}

impl fmt::Display for PathStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a path-level diff between two revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPath {
    pub path: String,
    pub status: PathStatus,
    /// Source path for copied and moved entries
    pub origin: Option<String>,
}

/// Metadata of a single changeset as recorded by the VCS.
#[derive(Debug, Clone)]
pub struct ChangeContext {
    pub revision: RevisionId,
    pub author: String,
    pub description: String,
    pub branch: String,
    pub parents: Vec<RevisionId>,
    /// Paths touched by the changeset, byte-exact (trailing whitespace kept)
    pub files: Vec<String>,
}

/// Entry point into a version control system.
pub trait VcsClient: Send + Sync {
    /// Open an existing working copy
    fn open(&self, path: &Path) -> Result<Box<dyn WorkingCopy>, VcsError>;

    /// Clone `url` into `path`, creating parent directories as needed
    fn clone_repo(&self, url: &str, path: &Path) -> Result<Box<dyn WorkingCopy>, VcsError>;
}

/// A local working copy of a tracked repository.
///
/// Implementations are not required to tolerate concurrent mutation;
/// callers serialize `pull`/`update` per repository.
pub trait WorkingCopy: Send {
    fn path(&self) -> &Path;

    /// Fetch new history from `url` without touching the working tree
    fn pull(&self, url: &str) -> Result<(), VcsError>;

    /// Move the working tree to the newest fetched head of its branch
    fn update(&self) -> Result<(), VcsError>;

    /// Record a push-capable remote URL. Returns false if one was already set.
    fn add_push_url(&self, push_url: &str) -> Result<bool, VcsError>;

    /// The repository head (`tip`)
    fn head(&self) -> Result<RevisionId, VcsError>;

    /// Resolve a full or abbreviated hex revision
    fn lookup(&self, rev: &str) -> Result<RevisionId, VcsError>;

    /// Head of the named branch, if such a branch exists
    fn branch_head(&self, name: &str) -> Result<Option<RevisionId>, VcsError>;

    fn changectx(&self, rev: &RevisionId) -> Result<ChangeContext, VcsError>;

    fn parents(&self, rev: &RevisionId) -> Result<Vec<RevisionId>, VcsError>;

    fn file_content(&self, path: &str, rev: &RevisionId) -> Result<Vec<u8>, VcsError>;

    /// Path-level diff between two revisions with copy and move detection
    fn changed_paths(&self, from: &RevisionId, to: &RevisionId)
        -> Result<Vec<ChangedPath>, VcsError>;
}
