use pushlog_vcs::{BadRevision, PathsError, RevisionField, VcsError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Repository '{name}' unavailable: {source}")]
    RepoUnavailable {
        name: String,
        #[source]
        source: VcsError,
    },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unknown repository id {0}")]
    UnknownRepository(i64),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Revision {revision} not found in '{repository}' after pulling")]
    MissingRevision { repository: String, revision: String },

    #[error("Cannot read changeset {revision}: {source}")]
    Vcs {
        revision: String,
        #[source]
        source: VcsError,
    },

    #[error("Invalid push {push_id}: {message}")]
    InvalidPush { push_id: i64, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Ingestion task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Missing '{0}' parameter")]
    MissingParameter(&'static str),

    #[error("Repository not found: {0}")]
    UnknownRepository(String),

    #[error(transparent)]
    BadRevision(#[from] BadRevision),

    #[error("Revision '{token}' for '{field}' belongs to '{owner}', not to '{requested}'")]
    CrossRepository {
        field: RevisionField,
        token: String,
        owner: String,
        requested: String,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("VCS error: {0}")]
    Vcs(#[from] VcsError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Diff task failed: {0}")]
    Task(String),
}

impl DiffError {
    /// Caused by the request rather than by the server.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            DiffError::MissingParameter(_)
                | DiffError::BadRevision(_)
                | DiffError::CrossRepository { .. }
        )
    }
}

impl From<PathsError> for DiffError {
    fn from(err: PathsError) -> Self {
        match err {
            PathsError::BadRevision(bad) => DiffError::BadRevision(bad),
            PathsError::Vcs(vcs) => DiffError::Vcs(vcs),
        }
    }
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Fetching {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid push data from {url}: {source}")]
    InvalidPayload {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Poller was interrupted")]
    Interrupted,
}
