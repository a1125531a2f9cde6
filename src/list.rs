//! `wt list`: managed worktrees with their status.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::RepoConfig;
use crate::git_utils::{GitError, GitOps};
use crate::hooks;
use crate::index;
use crate::status::{self, WorktreeStatus};
use crate::worktree;

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub path: PathBuf,
    pub branch: String,
    pub index: Option<u32>,
    /// The current directory is inside this worktree.
    pub current: bool,
    pub status: WorktreeStatus,
    /// Output of the `info` hooks, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

/// Gather every managed worktree's status against `comparison_ref`.
pub fn collect(
    git: &dyn GitOps,
    cfg: &RepoConfig,
    comparison_ref: &str,
    cwd: &Path,
    with_info: bool,
) -> Result<Vec<ListEntry>, GitError> {
    let repo_root = git.repo_root();
    let merged = git.merged_branches(comparison_ref);
    let mut entries = Vec::new();

    for wt in worktree::managed_worktrees(git, &cfg.worktree_dir)? {
        let status = status::compute(git, &wt, comparison_ref, Some(&merged));
        let index = index::get(git, &wt.name);
        let info = if with_info {
            hooks::capture_info(&cfg.hooks, &wt.hook_env(repo_root, &cfg.worktree_dir, index))
        } else {
            None
        };
        entries.push(ListEntry {
            current: worktree::path_within(cwd, &wt.path),
            name: wt.name,
            path: wt.path,
            branch: wt.branch,
            index,
            status,
            info,
        });
    }
    Ok(entries)
}

fn marker(entry: &ListEntry) -> &'static str {
    if entry.current {
        "* "
    } else {
        "  "
    }
}

/// Aligned `NAME INDEX BRANCH STATUS` table.
pub fn render_compact(entries: &[ListEntry]) -> String {
    let name_width = entries
        .iter()
        .map(|e| e.name.len())
        .chain(["NAME".len()])
        .max()
        .unwrap_or(0);
    let branch_width = entries
        .iter()
        .map(|e| e.branch.len())
        .chain(["BRANCH".len()])
        .max()
        .unwrap_or(0);

    let mut out = format!(
        "  {:<name_width$}  {:>5}  {:<branch_width$}  STATUS\n",
        "NAME", "INDEX", "BRANCH"
    );
    for e in entries {
        let index = e.index.map_or_else(|| "-".to_string(), |i| i.to_string());
        let line = format!(
            "{}{:<name_width$}  {:>5}  {:<branch_width$}  {}",
            marker(e),
            e.name,
            index,
            e.branch,
            status::format_compact(&e.status)
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// One block per worktree, separated by rules.
pub fn render_verbose(entries: &[ListEntry], now: DateTime<Utc>) -> String {
    let rule = "=".repeat(80);
    let mut out = String::new();
    for e in entries {
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!("{}{}\n", marker(e), e.name));
        out.push_str(&format!("  Branch: {}\n", e.branch));
        if let Some(index) = e.index {
            out.push_str(&format!("  Index: {index}\n"));
        }
        for line in status::format_verbose(&e.status, now) {
            out.push_str(&format!("  {line}\n"));
        }
        if let Some(info) = &e.info {
            for line in info.lines() {
                out.push_str(&format!("  {line}\n"));
            }
        }
    }
    out.push_str(&rule);
    out.push('\n');
    out
}

pub fn render_json(entries: &[ListEntry]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(entries)
}
