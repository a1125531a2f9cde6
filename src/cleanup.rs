//! `wt cleanup`: remove every worktree whose work has landed.
//!
//! Candidates must be clean, not new, have nothing ahead of the comparison
//! ref, and be merged into it. The batch is confirmed once and then processed
//! sequentially; one worktree failing does not stop the others.

use anyhow::{bail, Result};
use std::io::Write;
use std::path::Path;

use crate::config::RepoConfig;
use crate::delete::{self, TeardownError};
use crate::git_utils::{GitError, GitOps};
use crate::prompt::Confirm;
use crate::status::{self, WorktreeStatus};
use crate::worktree::{self, ManagedWorktree};

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupOptions {
    pub dry_run: bool,
    /// Skip confirmation and push through pre_delete failures.
    pub force: bool,
    pub keep_branch: bool,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub worktree: ManagedWorktree,
    pub status: WorktreeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub candidates: Vec<String>,
    pub deleted: Vec<String>,
    /// Skipped because a pre_delete hook failed without `force`.
    pub skipped: Vec<CleanupFailure>,
    pub failed: Vec<CleanupFailure>,
    /// The caller's directory was inside a removed worktree.
    pub return_to_root: bool,
}

/// Managed worktrees eligible for cleanup, in listing order.
///
/// The merged set is computed once for the whole scan.
pub fn find_candidates(
    git: &dyn GitOps,
    cfg: &RepoConfig,
    comparison_ref: &str,
) -> Result<Vec<Candidate>, GitError> {
    let merged = git.merged_branches(comparison_ref);
    let mut candidates = Vec::new();
    for wt in worktree::managed_worktrees(git, &cfg.worktree_dir)? {
        if wt.branch.is_empty() {
            continue;
        }
        let status = status::compute(git, &wt, comparison_ref, Some(&merged));
        if status.is_cleanup_candidate() {
            candidates.push(Candidate {
                worktree: wt,
                status,
            });
        }
    }
    Ok(candidates)
}

fn render_candidates(candidates: &[Candidate]) -> String {
    let name_width = candidates
        .iter()
        .map(|c| c.worktree.name.len())
        .chain(["NAME".len()])
        .max()
        .unwrap_or(0);
    let branch_width = candidates
        .iter()
        .map(|c| c.worktree.branch.len())
        .chain(["BRANCH".len()])
        .max()
        .unwrap_or(0);

    let mut table = format!("  {:<name_width$}  {:<branch_width$}  STATUS\n", "NAME", "BRANCH");
    for c in candidates {
        table.push_str(&format!(
            "  {:<name_width$}  {:<branch_width$}  {}\n",
            c.worktree.name,
            c.worktree.branch,
            status::format_compact(&c.status)
        ));
    }
    table
}

fn batch_summary(count: usize, keep_branch: bool) -> String {
    if keep_branch {
        format!("{count} worktree(s)")
    } else {
        format!("{count} worktree(s) and their branches")
    }
}

/// Find and remove eligible worktrees.
///
/// Nothing is mutated on a dry run. Declining the confirmation aborts with an
/// error before anything is removed.
pub fn cleanup(
    git: &dyn GitOps,
    cfg: &RepoConfig,
    comparison_ref: &str,
    opts: CleanupOptions,
    cwd: &Path,
    confirm: &mut dyn Confirm,
    out: &mut dyn Write,
) -> Result<CleanupReport> {
    let candidates = find_candidates(git, cfg, comparison_ref)?;
    let mut report = CleanupReport {
        candidates: candidates.iter().map(|c| c.worktree.name.clone()).collect(),
        ..Default::default()
    };
    if candidates.is_empty() {
        let _ = writeln!(out, "No worktrees eligible for cleanup");
        return Ok(report);
    }

    let _ = writeln!(out, "Worktrees eligible for cleanup:\n");
    let _ = writeln!(out, "{}", render_candidates(&candidates));

    let summary = batch_summary(candidates.len(), opts.keep_branch);
    if opts.dry_run {
        let _ = writeln!(out, "Would delete {summary}");
        return Ok(report);
    }
    if !opts.force {
        let _ = writeln!(out, "Delete {summary}?");
        if !confirm.confirm("Proceed?") {
            bail!("aborted");
        }
    }

    for c in &candidates {
        let name = &c.worktree.name;
        match delete::teardown(git, cfg, &c.worktree, opts.force, opts.keep_branch, out) {
            Ok(()) => {
                report.return_to_root |= worktree::path_within(cwd, &c.worktree.path);
                report.deleted.push(name.clone());
            }
            Err(e @ TeardownError::PreDelete(_)) => {
                let _ = writeln!(out, "Skipping {name}: {e}");
                report.skipped.push(CleanupFailure {
                    name: name.clone(),
                    error: e.to_string(),
                });
            }
            Err(e) => {
                log::warn!("failed to delete {name}: {e}");
                report.failed.push(CleanupFailure {
                    name: name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    let _ = writeln!(out, "Cleaned up {} worktree(s)", report.deleted.len());
    Ok(report)
}
