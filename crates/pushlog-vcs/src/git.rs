use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    BranchType, Commit, ConfigLevel, Delta, DiffFindOptions, DiffOptions, ErrorCode, Oid,
    Repository,
};
use tracing::debug;

use crate::client::{
    ChangeContext, ChangedPath, PathStatus, RevisionId, VcsClient, VcsError, WorkingCopy,
    DEFAULT_BRANCH,
};

/// [`VcsClient`] backed by libgit2.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitClient;

impl GitClient {
    pub fn new() -> Self {
        Self
    }
}

impl VcsClient for GitClient {
    fn open(&self, path: &Path) -> Result<Box<dyn WorkingCopy>, VcsError> {
        let repo = Repository::open(path).map_err(|e| match e.code() {
            ErrorCode::NotFound => VcsError::NotARepo(path.display().to_string()),
            _ => VcsError::GitOperationFailed(e),
        })?;
        Ok(Box::new(GitWorkingCopy::new(repo, path)))
    }

    fn clone_repo(&self, url: &str, path: &Path) -> Result<Box<dyn WorkingCopy>, VcsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let repo = Repository::clone(url, path)?;
        debug!(url, path = %path.display(), "Cloned repository");
        Ok(Box::new(GitWorkingCopy::new(repo, path)))
    }
}

/// A git working copy opened through [`GitClient`].
pub struct GitWorkingCopy {
    repo: Repository,
    path: PathBuf,
}

impl GitWorkingCopy {
    pub fn new(repo: Repository, path: &Path) -> Self {
        Self {
            repo,
            path: path.to_path_buf(),
        }
    }

    fn find_commit(&self, rev: &RevisionId) -> Result<Commit<'_>, VcsError> {
        let oid = Oid::from_str(rev.as_str())
            .map_err(|_| VcsError::UnknownRevision(rev.to_string()))?;
        self.repo.find_commit(oid).map_err(|e| match e.code() {
            ErrorCode::NotFound => VcsError::UnknownRevision(rev.to_string()),
            _ => VcsError::GitOperationFailed(e),
        })
    }

    /// Symbolic target of HEAD, e.g. `refs/heads/main`. None when detached.
    fn head_ref_name(&self) -> Result<Option<String>, VcsError> {
        let head = self.repo.find_reference("HEAD")?;
        Ok(head.symbolic_target().map(String::from))
    }

    /// Paths touched by a commit relative to its first parent.
    fn touched_files(&self, commit: &Commit<'_>) -> Result<Vec<String>, VcsError> {
        let new_tree = commit.tree()?;
        let old_tree = match commit.parent_count() {
            0 => None,
            _ => Some(commit.parent(0)?.tree()?),
        };

        let diff = self
            .repo
            .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), None)?;

        let mut files = Vec::new();
        for delta in diff.deltas() {
            let file = match delta.status() {
                Delta::Deleted => delta.old_file(),
                _ => delta.new_file(),
            };
            if let Some(bytes) = file.path_bytes() {
                files.push(String::from_utf8_lossy(bytes).into_owned());
            }
        }
        Ok(files)
    }

    /// Git does not store a branch per commit. A commit reachable from the
    /// checked-out branch (or its upstream) is on `default`; otherwise the
    /// alphabetically first branch containing it wins.
    fn branch_of(&self, oid: Oid) -> Result<String, VcsError> {
        let default_name = self
            .head_ref_name()?
            .map(|name| name.trim_start_matches("refs/heads/").to_string());

        let mut names = Vec::new();
        for entry in self.repo.branches(None)? {
            let (branch, kind) = entry?;
            let Some(tip) = branch.get().target() else {
                continue;
            };
            let Some(name) = branch.name()? else {
                continue;
            };
            let name = match kind {
                BranchType::Remote => match name.strip_prefix("origin/") {
                    Some("HEAD") | None => continue,
                    Some(stripped) => stripped,
                },
                BranchType::Local => name,
            };
            if tip == oid || self.repo.graph_descendant_of(tip, oid)? {
                if default_name.as_deref() == Some(name) {
                    return Ok(DEFAULT_BRANCH.to_string());
                }
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string()))
    }
}

impl WorkingCopy for GitWorkingCopy {
    fn path(&self) -> &Path {
        &self.path
    }

    fn pull(&self, url: &str) -> Result<(), VcsError> {
        let mut remote = match self.repo.find_remote("origin") {
            Ok(remote) => remote,
            Err(e) if e.code() == ErrorCode::NotFound => self.repo.remote("origin", url)?,
            Err(e) => return Err(e.into()),
        };
        remote.fetch(&[] as &[&str], None, None)?;
        debug!(url, path = %self.path.display(), "Pulled repository");
        Ok(())
    }

    fn update(&self) -> Result<(), VcsError> {
        let Some(head_name) = self.head_ref_name()? else {
            // Detached HEAD, nothing to fast-forward
            return Ok(());
        };
        let branch = head_name.trim_start_matches("refs/heads/");
        let upstream = format!("refs/remotes/origin/{}", branch);

        let target = match self.repo.find_reference(&upstream) {
            Ok(reference) => reference.peel_to_commit()?.id(),
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.repo
            .reference(&head_name, target, true, "pushlog: update")?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;

        debug!(branch, revision = %target, "Updated working copy");
        Ok(())
    }

    fn add_push_url(&self, push_url: &str) -> Result<bool, VcsError> {
        let mut config = self.repo.config()?.open_level(ConfigLevel::Local)?;
        match config.get_entry("remote.origin.pushurl") {
            Ok(_) => return Ok(false),
            Err(e) if e.code() == ErrorCode::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        config.set_str("remote.origin.pushurl", push_url)?;
        Ok(true)
    }

    fn head(&self) -> Result<RevisionId, VcsError> {
        let head = self.repo.head().map_err(|e| match e.code() {
            ErrorCode::UnbornBranch | ErrorCode::NotFound => {
                VcsError::UnknownRevision("tip".to_string())
            }
            _ => VcsError::GitOperationFailed(e),
        })?;
        Ok(RevisionId::new(head.peel_to_commit()?.id().to_string()))
    }

    fn lookup(&self, rev: &str) -> Result<RevisionId, VcsError> {
        let is_hex =
            rev.len() >= 4 && rev.len() <= 40 && rev.chars().all(|c| c.is_ascii_hexdigit());
        if !is_hex {
            return Err(VcsError::UnknownRevision(rev.to_string()));
        }

        let object = self.repo.revparse_single(rev).map_err(|e| match e.code() {
            ErrorCode::Ambiguous => VcsError::AmbiguousRevision(rev.to_string()),
            ErrorCode::NotFound | ErrorCode::InvalidSpec => {
                VcsError::UnknownRevision(rev.to_string())
            }
            _ => VcsError::GitOperationFailed(e),
        })?;
        let commit = object
            .peel_to_commit()
            .map_err(|_| VcsError::UnknownRevision(rev.to_string()))?;

        Ok(RevisionId::new(commit.id().to_string()))
    }

    fn branch_head(&self, name: &str) -> Result<Option<RevisionId>, VcsError> {
        let remote_name = format!("origin/{}", name);
        let candidates = [(name, BranchType::Local), (remote_name.as_str(), BranchType::Remote)];

        for (candidate, kind) in candidates {
            match self.repo.find_branch(candidate, kind) {
                Ok(branch) => {
                    let commit = branch.get().peel_to_commit()?;
                    return Ok(Some(RevisionId::new(commit.id().to_string())));
                }
                Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                    continue
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(None)
    }

    fn changectx(&self, rev: &RevisionId) -> Result<ChangeContext, VcsError> {
        let commit = self.find_commit(rev)?;

        let signature = commit.author();
        let author = format!(
            "{} <{}>",
            String::from_utf8_lossy(signature.name_bytes()),
            String::from_utf8_lossy(signature.email_bytes())
        );
        let description = String::from_utf8_lossy(commit.message_bytes())
            .trim_end()
            .to_string();
        let parents = commit
            .parent_ids()
            .map(|oid| RevisionId::new(oid.to_string()))
            .collect();

        Ok(ChangeContext {
            revision: RevisionId::new(commit.id().to_string()),
            author,
            description,
            branch: self.branch_of(commit.id())?,
            parents,
            files: self.touched_files(&commit)?,
        })
    }

    fn parents(&self, rev: &RevisionId) -> Result<Vec<RevisionId>, VcsError> {
        let commit = self.find_commit(rev)?;
        Ok(commit
            .parent_ids()
            .map(|oid| RevisionId::new(oid.to_string()))
            .collect())
    }

    fn file_content(&self, path: &str, rev: &RevisionId) -> Result<Vec<u8>, VcsError> {
        let tree = self.find_commit(rev)?.tree()?;
        let entry = tree.get_path(Path::new(path)).map_err(|e| match e.code() {
            ErrorCode::NotFound => VcsError::PathNotFound {
                path: path.to_string(),
                revision: rev.to_string(),
            },
            _ => VcsError::GitOperationFailed(e),
        })?;
        let blob = entry.to_object(&self.repo)?.peel_to_blob()?;
        Ok(blob.content().to_vec())
    }

    fn changed_paths(
        &self,
        from: &RevisionId,
        to: &RevisionId,
    ) -> Result<Vec<ChangedPath>, VcsError> {
        let old_tree = self.find_commit(from)?.tree()?;
        let new_tree = self.find_commit(to)?.tree()?;

        // Copy detection from unmodified sources needs the unmodified entries
        let mut opts = DiffOptions::new();
        opts.include_unmodified(true);
        let mut diff =
            self.repo
                .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;

        let mut find = DiffFindOptions::new();
        find.renames(true).copies(true).copies_from_unmodified(true);
        diff.find_similar(Some(&mut find))?;

        let path_of = |bytes: Option<&[u8]>| bytes.map(|b| String::from_utf8_lossy(b).into_owned());

        let mut changed = Vec::new();
        for delta in diff.deltas() {
            let old_path = path_of(delta.old_file().path_bytes());
            let new_path = path_of(delta.new_file().path_bytes());

            let entry = match (delta.status(), old_path, new_path) {
                (Delta::Added, _, Some(path)) => ChangedPath {
                    path,
                    status: PathStatus::Added,
                    origin: None,
                },
                (Delta::Deleted, Some(path), _) => ChangedPath {
                    path,
                    status: PathStatus::Removed,
                    origin: None,
                },
                (Delta::Modified | Delta::Typechange, _, Some(path)) => ChangedPath {
                    path,
                    status: PathStatus::Changed,
                    origin: None,
                },
                (Delta::Renamed | Delta::Copied, Some(origin), Some(path)) => {
                    // Moved iff the origin is gone at the newer revision
                    let status = if new_tree.get_path(Path::new(&origin)).is_ok() {
                        PathStatus::Copied
                    } else {
                        PathStatus::Moved
                    };
                    ChangedPath {
                        path,
                        status,
                        origin: Some(origin),
                    }
                }
                _ => continue,
            };
            changed.push(entry);
        }

        debug!(
            from = from.short(),
            to = to.short(),
            paths = changed.len(),
            "Computed changed paths"
        );

        Ok(changed)
    }
}
