//! # pushlog-core
//!
//! Ties the store, the working copies and the diff engine together.
//!
//! ## Key Types
//!
//! - [`RepoSync`] - Clones and pulls working copies on demand
//! - [`PushIngestor`] - Records pushes and changesets idempotently
//! - [`DiffService`] - Answers diff requests against a tracked repository
//! - [`Poller`] - Fetches new pushes for every repository on an interval
//! - [`RepoLocks`] - Per-repository lock shared by all of the above
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pushlog_core::{PushIngestor, RepoLocks, RepoSync};
//!
//! let sync = Arc::new(RepoSync::new(Arc::new(GitClient::new()), "/srv/repos"));
//! let ingestor = PushIngestor::new(db.clone(), sync, RepoLocks::new());
//! let count = ingestor.ingest(repo.id, parse_pushes(&body)?).await?;
//! ```

mod diff;
mod error;
mod ingest;
mod locks;
mod poller;
mod source;
mod sync;

pub use diff::{DiffRequest, DiffService};
pub use error::{DiffError, IngestError, PollError, SyncError};
pub use ingest::{parse_pushes, IngestOutcome, PushIngestor, PushPayload};
pub use locks::RepoLocks;
pub use poller::{CycleReport, ForestSource, PollConfig, Poller};
pub use source::{forest_repository, parse_forest, pushes_url, HttpPushSource, PushSource};
pub use sync::{push_url_for, LocalRepo, RepoSync};
