use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;

/// Per-repository critical sections around working copies.
///
/// Ingestion holds a repository's lock exclusively while it pulls and
/// writes; diffs share it. Different repositories never contend.
#[derive(Debug, Clone, Default)]
pub struct RepoLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<RwLock<()>>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `repository_id`, created on first use.
    pub fn get(&self, repository_id: i64) -> Arc<RwLock<()>> {
        let mut locks = self.inner.lock().expect("Repository lock map poisoned");
        locks.entry(repository_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_repository_shares_lock() {
        let locks = RepoLocks::new();
        let a = locks.get(1);
        let b = locks.get(1);
        let other = locks.get(2);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));

        let _write = a.clone().write_owned().await;
        assert!(b.try_read().is_err());
        assert!(other.try_write().is_ok());
    }

    #[tokio::test]
    async fn test_readers_share() {
        let locks = RepoLocks::new();
        let _first = locks.get(7).read_owned().await;
        assert!(locks.get(7).try_read().is_ok());
        assert!(locks.get(7).try_write().is_err());
    }
}
