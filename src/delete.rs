//! `wt delete`: guarded removal of one worktree.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::compare;
use crate::config::RepoConfig;
use crate::git_utils::{GitError, GitOps};
use crate::hooks::{self, HookError, HookEvent};
use crate::index;
use crate::user_config::UserConfig;
use crate::worktree::{self, ManagedWorktree};

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Detected from the current directory when absent.
    pub name: Option<String>,
    pub force: bool,
    pub keep_branch: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error("not in a worktree (specify a name or cd into a worktree)")]
    NotInWorktree,
    #[error("worktree {0:?} does not exist")]
    NotFound(String),
    #[error("cannot delete worktree {name:?}:\n{}\n\nUse --force to delete anyway.", format_violations(.violations))]
    Guards { name: String, violations: Vec<String> },
}

fn format_violations(violations: &[String]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Why a single worktree could not be torn down.
#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    #[error("pre-delete hook failed: {0}")]
    PreDelete(#[source] HookError),
    #[error("failed to remove worktree: {0}")]
    Remove(#[source] GitError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    pub name: String,
    /// The caller's directory was inside the removed worktree.
    pub return_to_root: bool,
}

/// The worktree named `name`, or the one containing `cwd`.
pub fn resolve_target(
    git: &dyn GitOps,
    cfg: &RepoConfig,
    name: Option<&str>,
    cwd: &Path,
) -> Result<ManagedWorktree, DeleteError> {
    let repo_root = git.repo_root();
    let name = match name {
        Some(name) => name.to_string(),
        None => worktree::detect_from_cwd(repo_root, cwd, &cfg.worktree_dir)
            .ok_or(DeleteError::NotInWorktree)?,
    };
    let path = cfg.worktree_path(repo_root, &name);
    if !path.exists() {
        return Err(DeleteError::NotFound(name));
    }
    Ok(ManagedWorktree {
        branch: git.current_branch(&path).unwrap_or_default(),
        head: git.head_commit(&path).unwrap_or_default(),
        name,
        path,
    })
}

/// Every safety guard `target` violates against `comparison_ref`.
pub fn guard_violations(
    git: &dyn GitOps,
    target: &ManagedWorktree,
    comparison_ref: &str,
) -> Result<Vec<String>, GitError> {
    let mut violations = Vec::new();
    if git.is_dirty(&target.path)? {
        violations.push("has uncommitted changes (modified or untracked files)".to_string());
    }

    // detached worktrees are measured by their HEAD commit
    let tip = if target.branch.is_empty() {
        target.head.as_str()
    } else {
        target.branch.as_str()
    };
    let (ahead, _) = git.ahead_behind(tip, comparison_ref);
    match ahead {
        0 => {}
        1 => violations.push(format!("has 1 commit not merged into {comparison_ref}")),
        n => violations.push(format!("has {n} commits not merged into {comparison_ref}")),
    }
    Ok(violations)
}

/// pre_delete hooks, worktree removal, branch deletion, post_delete hooks.
///
/// With `force`, a failing pre_delete hook is downgraded to a warning and git
/// is told to remove the worktree and branch regardless of their state.
pub fn teardown(
    git: &dyn GitOps,
    cfg: &RepoConfig,
    target: &ManagedWorktree,
    force: bool,
    keep_branch: bool,
    out: &mut dyn Write,
) -> Result<(), TeardownError> {
    let repo_root = git.repo_root();
    let env = target.hook_env(repo_root, &cfg.worktree_dir, index::get(git, &target.name));

    if let Err(e) = hooks::run_event(&cfg.hooks, HookEvent::PreDelete, &env, out) {
        if !force {
            return Err(TeardownError::PreDelete(e));
        }
        log::warn!("pre-delete hook failed for {}: {e}", target.name);
    }

    let _ = writeln!(out, "Deleting worktree {:?}...", target.name);
    git.remove_worktree(&target.path, force)
        .map_err(TeardownError::Remove)?;

    if !keep_branch && !target.branch.is_empty() {
        let _ = writeln!(out, "Deleting branch {:?}...", target.branch);
        if let Err(e) = git.delete_branch(&target.branch, force) {
            log::warn!("failed to delete branch {}: {e}", target.branch);
        }
    }

    if let Err(e) = hooks::run_event(&cfg.hooks, HookEvent::PostDelete, &env, out) {
        log::warn!("post-delete hook failed for {}: {e}", target.name);
    }
    Ok(())
}

/// Delete one worktree, refusing dirty or unmerged ones unless forced.
pub fn delete(
    git: &dyn GitOps,
    cfg: &RepoConfig,
    user_cfg: &UserConfig,
    opts: &DeleteOptions,
    cwd: &Path,
    out: &mut dyn Write,
) -> Result<Deleted> {
    let target = resolve_target(git, cfg, opts.name.as_deref(), cwd)?;

    if !opts.force {
        let ctx = compare::resolve(git, cfg, user_cfg, out);
        let violations = guard_violations(git, &target, &ctx.comparison_ref)
            .context("failed to check worktree state")?;
        if !violations.is_empty() {
            return Err(DeleteError::Guards {
                name: target.name,
                violations,
            }
            .into());
        }
    }

    let return_to_root = worktree::path_within(cwd, &target.path);
    teardown(git, cfg, &target, opts.force, opts.keep_branch, out)?;

    let _ = writeln!(out, "Worktree {:?} deleted successfully", target.name);
    Ok(Deleted {
        name: target.name,
        return_to_root,
    })
}
