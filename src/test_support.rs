//! Helpers shared by the unit tests: throwaway repositories and a fake `GitOps`.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::git_utils::{GitError, GitOps, MergedSet, WorktreeEntry};

/// Run git in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A repository on branch `main` with one commit.
pub fn init_git_repo() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    git(tmp.path(), &["init", "-q"]);
    git(tmp.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(tmp.path(), &["config", "user.email", "test@test.com"]);
    git(tmp.path(), &["config", "user.name", "Test"]);
    git(tmp.path(), &["config", "commit.gpgsign", "false"]);
    commit_file(tmp.path(), "README.md", "init\n", "initial");
    tmp
}

pub fn commit_file(repo: &Path, name: &str, content: &str, message: &str) {
    std::fs::write(repo.join(name), content).unwrap();
    git(repo, &["add", name]);
    git(repo, &["commit", "-q", "-m", message]);
}

/// In-memory stand-in for a repository.
#[derive(Default)]
pub struct FakeGit {
    pub root: PathBuf,
    pub worktrees: Vec<WorktreeEntry>,
    pub branches: HashSet<String>,
    pub default_branch: Option<String>,
    pub dirty: HashSet<PathBuf>,
    pub ahead_behind: HashMap<(String, String), (usize, usize)>,
    pub merged: HashMap<String, MergedSet>,
    pub merge_subjects: Vec<String>,
    pub heads: HashMap<PathBuf, String>,
    pub refs: HashSet<String>,
    pub fetch_fails: bool,
    pub fetches: Cell<usize>,
    pub merged_queries: Cell<usize>,
    pub meta: RefCell<HashMap<String, HashMap<String, String>>>,
    pub repo_config: RefCell<HashMap<String, String>>,
    pub removed: RefCell<Vec<PathBuf>>,
    pub deleted_branches: RefCell<Vec<String>>,
}

impl FakeGit {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Register a live worktree with metadata directory `name`.
    pub fn add_worktree_entry(&mut self, name: &str, path: impl Into<PathBuf>, branch: &str, head: &str) {
        let path = path.into();
        self.worktrees.push(WorktreeEntry {
            path: path.clone(),
            branch: branch.to_string(),
            head: head.to_string(),
            bare: false,
        });
        self.heads.insert(path, head.to_string());
        self.branches.insert(branch.to_string());
        self.meta.borrow_mut().entry(name.to_string()).or_default();
    }

    pub fn set_meta(&self, name: &str, key: &str, value: &str) {
        self.meta
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }
}

impl GitOps for FakeGit {
    fn repo_root(&self) -> &Path {
        &self.root
    }

    fn list_worktrees(&self) -> Result<Vec<WorktreeEntry>, GitError> {
        let mut all = vec![WorktreeEntry {
            path: self.root.clone(),
            branch: "main".to_string(),
            head: "0000".to_string(),
            bare: false,
        }];
        all.extend(self.worktrees.iter().cloned());
        Ok(all)
    }

    fn branch_exists(&self, branch: &str) -> bool {
        self.branches.contains(branch)
    }

    fn current_branch(&self, path: &Path) -> Option<String> {
        self.worktrees
            .iter()
            .find(|w| w.path == path)
            .map(|w| w.branch.clone())
            .filter(|b| !b.is_empty())
    }

    fn default_branch(&self) -> Option<String> {
        self.default_branch.clone()
    }

    fn is_dirty(&self, path: &Path) -> Result<bool, GitError> {
        Ok(self.dirty.contains(path))
    }

    fn has_unpushed_commits(&self, _path: &Path) -> bool {
        false
    }

    fn ahead_behind(&self, branch: &str, base: &str) -> (usize, usize) {
        self.ahead_behind
            .get(&(branch.to_string(), base.to_string()))
            .copied()
            .unwrap_or((0, 0))
    }

    fn merged_branches(&self, base: &str) -> MergedSet {
        self.merged_queries.set(self.merged_queries.get() + 1);
        self.merged.get(base).cloned().unwrap_or_default()
    }

    fn merge_subjects(&self, _base: &str, limit: usize) -> Result<Vec<String>, GitError> {
        Ok(self.merge_subjects.iter().take(limit).cloned().collect())
    }

    fn head_commit(&self, path: &Path) -> Option<String> {
        self.heads.get(path).cloned()
    }

    fn ref_exists(&self, reference: &str) -> bool {
        self.refs.contains(reference)
    }

    fn fetch_quiet(&self, remote: &str) -> Result<(), GitError> {
        self.fetches.set(self.fetches.get() + 1);
        if self.fetch_fails {
            return Err(GitError::Command {
                args: format!("fetch --quiet {remote}"),
                detail: "could not resolve host".to_string(),
            });
        }
        Ok(())
    }

    fn update_remote_head(&self, _remote: &str) -> Result<(), GitError> {
        Ok(())
    }

    fn worktree_meta_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.meta.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    fn worktree_config_get(&self, name: &str, key: &str) -> Option<String> {
        self.meta.borrow().get(name)?.get(key).cloned()
    }

    fn worktree_config_set(&self, name: &str, key: &str, value: &str) -> Result<(), GitError> {
        let mut meta = self.meta.borrow_mut();
        let entry = meta
            .get_mut(name)
            .ok_or_else(|| GitError::MissingMetadata(self.root.join(".git/worktrees").join(name)))?;
        entry.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn repo_config_get(&self, key: &str) -> Option<String> {
        self.repo_config.borrow().get(key).cloned()
    }

    fn repo_config_set(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.repo_config
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn add_worktree(&self, _path: &Path, _branch: &str, _new_branch: bool) -> Result<(), GitError> {
        Ok(())
    }

    fn remove_worktree(&self, path: &Path, _force: bool) -> Result<(), GitError> {
        self.removed.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    fn prune_worktrees(&self) -> Result<(), GitError> {
        Ok(())
    }

    fn delete_branch(&self, branch: &str, _force: bool) -> Result<(), GitError> {
        self.deleted_branches.borrow_mut().push(branch.to_string());
        Ok(())
    }
}
