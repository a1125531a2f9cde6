//! Managed worktree discovery.
//!
//! A managed worktree lives directly under `<repo>/<worktree_dir>/`; its name
//! is the first path component below that directory and is never stored.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::git_utils::{GitError, GitOps};
use crate::hooks::HookEnv;

/// A worktree under the configured worktree directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedWorktree {
    pub name: String,
    pub path: PathBuf,
    /// Empty for detached HEAD.
    pub branch: String,
    #[serde(skip)]
    pub head: String,
}

impl ManagedWorktree {
    /// Hook environment for this worktree; a missing index is exported as 0.
    pub fn hook_env(&self, repo_root: &Path, worktree_dir: &str, index: Option<u32>) -> HookEnv {
        HookEnv {
            name: self.name.clone(),
            path: self.path.clone(),
            branch: self.branch.clone(),
            repo_root: repo_root.to_path_buf(),
            worktree_dir: worktree_dir.to_string(),
            index: index.unwrap_or(0),
        }
    }
}

/// Name of the worktree at `path`: the first component below the worktree directory.
pub fn worktree_name(repo_root: &Path, path: &Path, worktree_dir: &str) -> String {
    let base = repo_root.join(worktree_dir);
    match path.strip_prefix(&base).ok().and_then(first_component) {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
    }
}

/// Whether `path` is strictly inside the worktree directory.
pub fn is_inside_worktree(repo_root: &Path, path: &Path, worktree_dir: &str) -> bool {
    let base = repo_root.join(worktree_dir);
    path.strip_prefix(&base)
        .ok()
        .and_then(first_component)
        .is_some()
}

/// Name of the managed worktree containing `cwd`, if any.
pub fn detect_from_cwd(repo_root: &Path, cwd: &Path, worktree_dir: &str) -> Option<String> {
    let base = repo_root.join(worktree_dir);
    cwd.strip_prefix(&base).ok().and_then(first_component)
}

/// Whether `path` is `dir` itself or somewhere below it.
pub fn path_within(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}

fn first_component(rel: &Path) -> Option<String> {
    match rel.components().next()? {
        Component::Normal(name) => Some(name.to_string_lossy().to_string()),
        _ => None,
    }
}

/// All managed worktrees in listing order, excluding the main working tree.
pub fn managed_worktrees(git: &dyn GitOps, worktree_dir: &str) -> Result<Vec<ManagedWorktree>, GitError> {
    let repo_root = git.repo_root();
    let worktrees = git
        .list_worktrees()?
        .into_iter()
        .filter(|wt| !wt.bare && wt.path != repo_root)
        .filter(|wt| is_inside_worktree(repo_root, &wt.path, worktree_dir))
        .map(|wt| ManagedWorktree {
            name: worktree_name(repo_root, &wt.path, worktree_dir),
            path: wt.path,
            branch: wt.branch,
            head: wt.head,
        })
        .collect();
    Ok(worktrees)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeGit;

    #[test]
    fn name_is_first_component_below_worktree_dir() {
        let root = Path::new("/repo");
        assert_eq!(worktree_name(root, Path::new("/repo/worktrees/feat"), "worktrees"), "feat");
        assert_eq!(
            worktree_name(root, Path::new("/repo/worktrees/feat/src/lib"), "worktrees"),
            "feat"
        );
        assert_eq!(worktree_name(root, Path::new("/elsewhere/thing"), "worktrees"), "thing");
        assert_eq!(worktree_name(root, Path::new("/repo/.trees/x"), ".trees"), "x");
    }

    #[test]
    fn inside_worktree_checks() {
        let root = Path::new("/repo");
        assert!(is_inside_worktree(root, Path::new("/repo/worktrees/feat"), "worktrees"));
        assert!(is_inside_worktree(root, Path::new("/repo/worktrees/feat/deep"), "worktrees"));
        assert!(!is_inside_worktree(root, Path::new("/repo/worktrees"), "worktrees"));
        assert!(!is_inside_worktree(root, Path::new("/repo"), "worktrees"));
        assert!(!is_inside_worktree(root, Path::new("/repo/worktrees-old/x"), "worktrees"));
        assert!(!is_inside_worktree(root, Path::new("/other/worktrees/x"), "worktrees"));
    }

    #[test]
    fn detect_from_cwd_extracts_name() {
        let root = Path::new("/repo");
        assert_eq!(
            detect_from_cwd(root, Path::new("/repo/worktrees/feat/src"), "worktrees").as_deref(),
            Some("feat")
        );
        assert_eq!(detect_from_cwd(root, Path::new("/repo/src"), "worktrees"), None);
    }

    #[test]
    fn path_within_is_component_wise() {
        assert!(path_within(Path::new("/repo/worktrees/a"), Path::new("/repo/worktrees/a")));
        assert!(path_within(Path::new("/repo/worktrees/a/b"), Path::new("/repo/worktrees/a")));
        assert!(!path_within(Path::new("/repo/worktrees/ab"), Path::new("/repo/worktrees/a")));
    }

    #[test]
    fn managed_worktrees_skip_main_and_foreign() {
        let mut fake = FakeGit::new("/repo");
        fake.add_worktree_entry("feat", "/repo/worktrees/feat", "feat", "aaa");
        fake.add_worktree_entry("elsewhere", "/tmp/elsewhere", "other", "bbb");
        fake.add_worktree_entry("fix", "/repo/worktrees/fix", "fix-branch", "ccc");

        let managed = managed_worktrees(&fake, "worktrees").unwrap();
        let names: Vec<_> = managed.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["feat", "fix"]);
        assert_eq!(managed[1].branch, "fix-branch");
    }
}
