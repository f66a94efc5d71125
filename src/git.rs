use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use git2::Repository;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::debug;

use crate::{client::CommitId, errors::GitError};

pub const HEAD_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Id of the commit checked out in the repository containing `path`.
pub fn head_commit(path: &Path) -> Result<CommitId, GitError> {
    let repo = Repository::discover(path).map_err(|source| GitError::NotARepository {
        path: path.to_path_buf(),
        source,
    })?;
    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Err(GitError::NoHead),
        Err(e) => return Err(e.into()),
    };
    let commit = head.peel_to_commit()?;
    Ok(commit.id().to_string())
}

/// `head_commit` on the blocking pool; repository discovery walks the
/// filesystem.
pub async fn resolve_head(path: PathBuf) -> Result<CommitId, GitError> {
    tokio::task::spawn_blocking(move || head_commit(&path)).await?
}

/// Publishes the checked-out commit on a watch channel, polling the
/// repository every `every`.
pub struct HeadWatcher {
    rx: watch::Receiver<Option<CommitId>>,
    task: JoinHandle<()>,
}

impl HeadWatcher {
    pub fn spawn(repo: PathBuf, every: Duration) -> Self {
        let (tx, rx) = watch::channel(head_commit(&repo).ok());
        let task = tokio::spawn(async move {
            let mut ticker = time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let current = match resolve_head(repo.clone()).await {
                    Ok(id) => Some(id),
                    Err(e) => {
                        debug!(event = "git.head_unresolved", error = %e);
                        None
                    }
                };
                let changed = tx.send_if_modified(|last| {
                    if *last != current {
                        *last = current.clone();
                        true
                    } else {
                        false
                    }
                });
                if changed {
                    debug!(event = "git.head_changed", commit = ?current);
                }
            }
        });
        Self { rx, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CommitId>> {
        self.rx.clone()
    }
}

impl Drop for HeadWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}


#[cfg(test)]
mod git_tests {
    use super::*;
    use super::testing::commit_file;

    #[test]
    fn not_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            head_commit(dir.path()),
            Err(GitError::NotARepository { .. })
        ));
    }

    #[test]
    fn unborn_branch_has_no_head() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        assert!(matches!(head_commit(dir.path()), Err(GitError::NoHead)));
    }

    #[test]
    fn resolves_head_from_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let oid = commit_file(&repo, "a.txt", "first");
        let sub = dir.path().join("nested");
        std::fs::create_dir(&sub).unwrap();
        assert_eq!(head_commit(&sub).unwrap(), oid.to_string());
    }

    #[tokio::test]
    async fn resolve_head_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let oid = commit_file(&repo, "a.txt", "first");
        assert_eq!(
            resolve_head(dir.path().to_path_buf()).await.unwrap(),
            oid.to_string()
        );

        let outside = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_head(outside.path().to_path_buf()).await,
            Err(GitError::NotARepository { .. })
        ));
    }

    #[tokio::test]
    async fn watcher_reports_new_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit_file(&repo, "a.txt", "first");

        let watcher = HeadWatcher::spawn(dir.path().to_path_buf(), Duration::from_millis(20));
        let mut rx = watcher.subscribe();
        assert_eq!(*rx.borrow_and_update(), Some(first.to_string()));

        let second = commit_file(&repo, "b.txt", "second");
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*rx.borrow(), Some(second.to_string()));
    }
}
