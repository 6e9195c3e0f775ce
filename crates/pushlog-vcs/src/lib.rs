//! # pushlog-vcs
//!
//! Version control access for pushlog.
//!
//! The rest of the workspace never talks to a VCS library directly. It goes
//! through the narrow [`VcsClient`] / [`WorkingCopy`] contract defined here,
//! which [`GitClient`] implements on top of libgit2.
//!
//! ## Key Types
//!
//! - [`VcsClient`] - Opens and clones local working copies
//! - [`WorkingCopy`] - Read access to one working copy plus pull/update
//! - [`RevisionResolver`] - Turns user tokens (`tip`, short hashes, branch
//!   names) into canonical revision ids
//! - [`PathTracker`] - Changed paths between two revisions, with copy and
//!   move origins
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pushlog_vcs::{GitClient, PathTracker, VcsClient};
//!
//! let client = GitClient::new();
//! let repo = client.open(Path::new("/srv/repos/gaia-l10n/de"))?;
//! let changed = PathTracker::new(repo.as_ref()).paths("abc123", "tip")?;
//! for (path, status) in &changed.paths {
//!     println!("{status} {path}");
//! }
//! ```

mod client;
mod git;
mod paths;
mod resolve;

pub use client::{
    ChangeContext, ChangedPath, PathStatus, RevisionId, VcsClient, VcsError, WorkingCopy,
    DEFAULT_BRANCH,
};
pub use git::{GitClient, GitWorkingCopy};
pub use paths::{ChangedPaths, PathTracker, PathsError};
pub use resolve::{BadRevision, RevisionField, RevisionResolver};
