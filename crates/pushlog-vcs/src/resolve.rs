use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::client::{RevisionId, VcsError, WorkingCopy};

/// Which side of a comparison a revision token was given for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionField {
    From,
    To,
}

impl fmt::Display for RevisionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionField::From => f.write_str("from"),
            RevisionField::To => f.write_str("to"),
        }
    }
}

/// A user supplied revision token that does not name exactly one revision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Bad revision for '{field}': {token}")]
pub struct BadRevision {
    pub field: RevisionField,
    pub token: String,
}

/// Resolves user facing revision tokens to canonical revision ids.
///
/// Accepted tokens, tried in this order:
/// - `tip` and `default`, both meaning the repository head
/// - full or abbreviated (4+ digits) hex hashes
/// - branch names, local first, then `origin/<name>`
pub struct RevisionResolver<'a> {
    repo: &'a dyn WorkingCopy,
}

impl<'a> RevisionResolver<'a> {
    pub const TIP: &'static str = "tip";
    pub const DEFAULT: &'static str = "default";

    pub fn new(repo: &'a dyn WorkingCopy) -> Self {
        Self { repo }
    }

    pub fn resolve(&self, field: RevisionField, token: &str) -> Result<RevisionId, BadRevision> {
        let bad = || BadRevision {
            field,
            token: token.to_string(),
        };

        let token = token.trim();
        if token.is_empty() {
            return Err(bad());
        }

        // tip and default are synonyms for the head
        if token == Self::TIP || token == Self::DEFAULT {
            return self.repo.head().map_err(|e| {
                debug!(%field, token, error = %e, "Could not resolve head");
                bad()
            });
        }

        match self.repo.lookup(token) {
            Ok(rev) => return Ok(rev),
            Err(VcsError::AmbiguousRevision(_)) => {
                debug!(%field, token, "Ambiguous revision prefix");
                return Err(bad());
            }
            Err(e) => debug!(%field, token, error = %e, "Not a known hash, trying branches"),
        }

        match self.repo.branch_head(token) {
            Ok(Some(rev)) => Ok(rev),
            Ok(None) => Err(bad()),
            Err(e) => {
                debug!(%field, token, error = %e, "Branch lookup failed");
                Err(bad())
            }
        }
    }
}
