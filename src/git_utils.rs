//! Git query facade.
//!
//! Lightweight functions that shell out to `git` and interpret its porcelain
//! output. Read queries are best-effort: when a query is simply inapplicable
//! (detached HEAD, no upstream, unrelated history) they return a zero value
//! instead of an error. Everything sits behind [`GitOps`] so the status
//! classifier and comparison resolver can run against a fake repository.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;

/// How many merge commits of the comparison branch are scanned for PR numbers.
pub const MERGE_SCAN_LIMIT: usize = 100;

pub const CREATED_AT_KEY: &str = "wt.createdAt";
pub const INITIAL_COMMIT_KEY: &str = "wt.initialCommit";

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("not in a git repository")]
    NotARepository,
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("git {args} failed: {detail}")]
    Command { args: String, detail: String },
    #[error("worktree metadata directory not found: {}", .0.display())]
    MissingMetadata(PathBuf),
}

/// A worktree entry from `git worktree list --porcelain`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// Branch without the `refs/heads/` prefix, empty for detached HEAD.
    pub branch: String,
    pub head: String,
    pub bare: bool,
}

/// Local branches whose tip is reachable from a comparison ref.
pub type MergedSet = HashSet<String>;

/// The repository operations the rest of the crate is written against.
pub trait GitOps {
    /// Root of the main working tree.
    fn repo_root(&self) -> &Path;

    fn list_worktrees(&self) -> Result<Vec<WorktreeEntry>, GitError>;
    fn branch_exists(&self, branch: &str) -> bool;
    /// Returns `None` for detached HEAD or git failures.
    fn current_branch(&self, path: &Path) -> Option<String>;
    /// Remote HEAD of `origin`, else `main`, else `master`.
    fn default_branch(&self) -> Option<String>;
    fn is_dirty(&self, path: &Path) -> Result<bool, GitError>;
    fn has_unpushed_commits(&self, path: &Path) -> bool;
    /// `(ahead, behind)` of `branch` relative to `base`; `(0, 0)` when not comparable.
    fn ahead_behind(&self, branch: &str, base: &str) -> (usize, usize);
    fn merged_branches(&self, base: &str) -> MergedSet;
    /// Subject lines of the most recent `limit` merge commits reachable from `base`.
    fn merge_subjects(&self, base: &str, limit: usize) -> Result<Vec<String>, GitError>;
    fn head_commit(&self, path: &Path) -> Option<String>;
    fn ref_exists(&self, reference: &str) -> bool;

    fn fetch_quiet(&self, remote: &str) -> Result<(), GitError>;
    fn update_remote_head(&self, remote: &str) -> Result<(), GitError>;

    /// Names of the per-worktree metadata directories (`<common-dir>/worktrees/*`).
    fn worktree_meta_names(&self) -> Vec<String>;
    fn worktree_config_get(&self, name: &str, key: &str) -> Option<String>;
    /// Fails when the worktree's metadata directory does not exist yet.
    fn worktree_config_set(&self, name: &str, key: &str, value: &str) -> Result<(), GitError>;
    fn repo_config_get(&self, key: &str) -> Option<String>;
    fn repo_config_set(&self, key: &str, value: &str) -> Result<(), GitError>;

    /// `git worktree add`, creating `branch` when `new_branch` is set.
    fn add_worktree(&self, path: &Path, branch: &str, new_branch: bool) -> Result<(), GitError>;
    fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), GitError>;
    fn prune_worktrees(&self) -> Result<(), GitError>;
    fn delete_branch(&self, branch: &str, force: bool) -> Result<(), GitError>;

    fn is_branch_merged(&self, branch: &str, base: &str) -> bool {
        self.merged_branches(base).contains(branch)
    }

    /// PR references (`#123`) from merge commits on `base` that mention `branch`.
    fn merge_prs(&self, branch: &str, base: &str) -> Vec<String> {
        match self.merge_subjects(base, MERGE_SCAN_LIMIT) {
            Ok(subjects) => prs_for_branch(&subjects, branch),
            Err(e) => {
                log::debug!("merge commit scan on {base} failed: {e}");
                Vec::new()
            }
        }
    }

    fn created_at(&self, name: &str) -> Option<DateTime<Utc>> {
        let raw = self.worktree_config_get(name, CREATED_AT_KEY)?;
        let secs = raw.trim().parse::<i64>().ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }

    fn set_created_at(&self, name: &str, at: DateTime<Utc>) -> Result<(), GitError> {
        self.worktree_config_set(name, CREATED_AT_KEY, &at.timestamp().to_string())
    }

    fn initial_commit(&self, name: &str) -> Option<String> {
        self.worktree_config_get(name, INITIAL_COMMIT_KEY)
            .filter(|sha| !sha.is_empty())
    }

    fn set_initial_commit(&self, name: &str, sha: &str) -> Result<(), GitError> {
        self.worktree_config_set(name, INITIAL_COMMIT_KEY, sha)
    }

    /// Last successful fetch of `remote`, stored in the main repository's config.
    fn last_fetch(&self, remote: &str) -> Option<DateTime<Utc>> {
        let raw = self.repo_config_get(&last_fetch_key(remote))?;
        let secs = raw.trim().parse::<i64>().ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }

    fn set_last_fetch(&self, remote: &str, at: DateTime<Utc>) -> Result<(), GitError> {
        self.repo_config_set(&last_fetch_key(remote), &at.timestamp().to_string())
    }
}

/// Config key holding the last fetch time of `remote` (`wt.<remote>.lastFetch`).
pub fn last_fetch_key(remote: &str) -> String {
    format!("wt.{remote}.lastFetch")
}

/// A repository driven through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
    common_dir: PathBuf,
}

impl GitRepo {
    /// Locate the main repository from any directory inside it or one of its worktrees.
    pub fn discover(start: &Path) -> Result<Self, GitError> {
        let raw = run_git_command(start, &["rev-parse", "--git-common-dir"])
            .ok_or(GitError::NotARepository)?;
        let common = if Path::new(&raw).is_absolute() {
            PathBuf::from(&raw)
        } else {
            start.join(&raw)
        };
        let common_dir = common.canonicalize()?;
        let root = if common_dir.file_name().is_some_and(|n| n == ".git") {
            common_dir
                .parent()
                .map(Path::to_path_buf)
                .ok_or(GitError::NotARepository)?
        } else {
            // bare repository: the common dir is the repository
            common_dir.clone()
        };
        Ok(Self { root, common_dir })
    }

    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    fn meta_dir(&self, name: &str) -> PathBuf {
        self.common_dir.join("worktrees").join(name)
    }
}

/// Main repository root for `dir`, even when `dir` is inside a linked worktree.
pub fn repo_root_from(dir: &Path) -> Result<PathBuf, GitError> {
    GitRepo::discover(dir).map(|repo| repo.root)
}

impl GitOps for GitRepo {
    fn repo_root(&self) -> &Path {
        &self.root
    }

    fn list_worktrees(&self) -> Result<Vec<WorktreeEntry>, GitError> {
        let output = run_git_checked(&self.root, &["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&output))
    }

    fn branch_exists(&self, branch: &str) -> bool {
        git_succeeds(
            &self.root,
            &["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")],
        )
    }

    fn current_branch(&self, path: &Path) -> Option<String> {
        let branch = run_git_command(path, &["branch", "--show-current"])?;
        if branch.is_empty() {
            None // detached HEAD
        } else {
            Some(branch)
        }
    }

    fn default_branch(&self) -> Option<String> {
        if let Some(head) = run_git_command(&self.root, &["symbolic-ref", "refs/remotes/origin/HEAD"]) {
            if let Some(branch) = head.strip_prefix("refs/remotes/origin/") {
                return Some(branch.to_string());
            }
        }
        ["main", "master"]
            .into_iter()
            .find(|b| self.branch_exists(b))
            .map(String::from)
    }

    fn is_dirty(&self, path: &Path) -> Result<bool, GitError> {
        let text = run_git_checked(path, &["status", "--porcelain"])?;
        Ok(text.lines().any(|l| !l.is_empty()))
    }

    fn has_unpushed_commits(&self, path: &Path) -> bool {
        let Some(branch) = self.current_branch(path) else {
            return false;
        };
        let upstream = format!("{branch}@{{upstream}}");
        if !git_succeeds(path, &["rev-parse", "--abbrev-ref", &upstream]) {
            return false;
        }
        run_git_command(path, &["rev-list", "--count", &format!("{upstream}..HEAD")])
            .is_some_and(|count| count != "0")
    }

    fn ahead_behind(&self, branch: &str, base: &str) -> (usize, usize) {
        if branch.is_empty() {
            return (0, 0);
        }
        // --left-right prints "<behind>\t<ahead>" for base...branch in one invocation
        let range = format!("{base}...{branch}");
        run_git_command(&self.root, &["rev-list", "--count", "--left-right", &range, "--"])
            .and_then(|out| parse_left_right(&out))
            .map(|(behind, ahead)| (ahead, behind))
            .unwrap_or((0, 0))
    }

    fn merged_branches(&self, base: &str) -> MergedSet {
        let Some(output) = run_git_command(
            &self.root,
            &["branch", "--format=%(refname)", "--merged", base],
        ) else {
            return MergedSet::new();
        };
        output
            .lines()
            .filter_map(|line| line.trim().strip_prefix("refs/heads/"))
            .filter(|name| !name.is_empty() && *name != base)
            .map(String::from)
            .collect()
    }

    fn merge_subjects(&self, base: &str, limit: usize) -> Result<Vec<String>, GitError> {
        let limit = limit.to_string();
        let output = run_git_checked(
            &self.root,
            &["log", "--merges", "-n", &limit, "--pretty=%s", base, "--"],
        )?;
        Ok(output.lines().map(String::from).collect())
    }

    fn head_commit(&self, path: &Path) -> Option<String> {
        run_git_command(path, &["rev-parse", "HEAD"]).filter(|sha| !sha.is_empty())
    }

    fn ref_exists(&self, reference: &str) -> bool {
        git_succeeds(
            &self.root,
            &["rev-parse", "--verify", "--quiet", &format!("{reference}^{{commit}}")],
        )
    }

    fn fetch_quiet(&self, remote: &str) -> Result<(), GitError> {
        run_git_checked(&self.root, &["fetch", "--quiet", remote]).map(|_| ())
    }

    fn update_remote_head(&self, remote: &str) -> Result<(), GitError> {
        run_git_checked(&self.root, &["remote", "set-head", remote, "--auto"]).map(|_| ())
    }

    fn worktree_meta_names(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.common_dir.join("worktrees")) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    fn worktree_config_get(&self, name: &str, key: &str) -> Option<String> {
        let config = self.meta_dir(name).join("config");
        let config = config.to_str()?;
        run_git_command(&self.root, &["config", "--file", config, "--get", key])
    }

    fn worktree_config_set(&self, name: &str, key: &str, value: &str) -> Result<(), GitError> {
        let dir = self.meta_dir(name);
        if !dir.is_dir() {
            return Err(GitError::MissingMetadata(dir));
        }
        let config = dir.join("config");
        let config = config.to_string_lossy();
        run_git_checked(&self.root, &["config", "--file", &config, key, value]).map(|_| ())
    }

    fn repo_config_get(&self, key: &str) -> Option<String> {
        run_git_command(&self.root, &["config", "--local", "--get", key])
    }

    fn repo_config_set(&self, key: &str, value: &str) -> Result<(), GitError> {
        run_git_checked(&self.root, &["config", "--local", key, value]).map(|_| ())
    }

    fn add_worktree(&self, path: &Path, branch: &str, new_branch: bool) -> Result<(), GitError> {
        let path = path.to_string_lossy();
        if new_branch {
            run_git_passthrough(&self.root, &["worktree", "add", "-b", branch, &path])
        } else {
            run_git_passthrough(&self.root, &["worktree", "add", &path, branch])
        }
    }

    fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), GitError> {
        let path = path.to_string_lossy();
        let mut args = vec!["worktree", "remove", path.as_ref()];
        if force {
            args.push("--force");
        }
        run_git_passthrough(&self.root, &args)
    }

    fn prune_worktrees(&self) -> Result<(), GitError> {
        run_git_passthrough(&self.root, &["worktree", "prune"])
    }

    fn delete_branch(&self, branch: &str, force: bool) -> Result<(), GitError> {
        let flag = if force { "-D" } else { "-d" };
        run_git_passthrough(&self.root, &["branch", flag, branch])
    }
}

/// Helper to run a git command and return stdout as a String.
/// Returns None if command fails or output is invalid UTF-8.
fn run_git_command(repo_path: &Path, args: &[&str]) -> Option<String> {
    log::debug!("$ git {} [{}]", args.join(" "), repo_path.display());
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Like [`run_git_command`], but keeps git's stderr as the error detail.
fn run_git_checked(repo_path: &Path, args: &[&str]) -> Result<String, GitError> {
    log::debug!("$ git {} [{}]", args.join(" "), repo_path.display());
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .stdin(Stdio::null())
        .output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(GitError::Command {
            args: args.join(" "),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Run a mutating git command with its output shown to the user.
/// git's stdout is redirected to stderr so our stdout stays parseable.
fn run_git_passthrough(repo_path: &Path, args: &[&str]) -> Result<(), GitError> {
    log::debug!("$ git {} [{}]", args.join(" "), repo_path.display());
    let status = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .stdin(Stdio::null())
        .stdout(std::io::stderr())
        .status()?;

    if status.success() {
        Ok(())
    } else {
        Err(GitError::Command {
            args: args.join(" "),
            detail: status.to_string(),
        })
    }
}

fn git_succeeds(repo_path: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Parse `git worktree list --porcelain`.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut worktrees = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            worktrees.extend(current.take());
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                ..Default::default()
            });
        } else if let Some(entry) = current.as_mut() {
            if let Some(head) = line.strip_prefix("HEAD ") {
                entry.head = head.to_string();
            } else if let Some(branch) = line.strip_prefix("branch ") {
                entry.branch = branch.trim_start_matches("refs/heads/").to_string();
            } else if line == "bare" {
                entry.bare = true;
            }
        }
    }
    worktrees.extend(current);
    worktrees
}

/// Parse the two counts printed by `rev-list --count --left-right`.
fn parse_left_right(output: &str) -> Option<(usize, usize)> {
    let mut parts = output.split_whitespace();
    let left = parts.next()?.parse().ok()?;
    let right = parts.next()?.parse().ok()?;
    Some((left, right))
}

fn pr_number_regex() -> &'static Regex {
    static PR_NUMBER: OnceLock<Regex> = OnceLock::new();
    PR_NUMBER.get_or_init(|| {
        Regex::new(r"(?i)pull request #(\d+)").expect("BUG: PR number pattern is invalid")
    })
}

/// Distinct PR references from merge subjects that mention `branch`, in discovery order.
pub fn prs_for_branch(subjects: &[String], branch: &str) -> Vec<String> {
    let mut prs: Vec<String> = Vec::new();
    for subject in subjects {
        if !subject_mentions_branch(subject, branch) {
            continue;
        }
        if let Some(caps) = pr_number_regex().captures(subject) {
            let pr = format!("#{}", &caps[1]);
            if !prs.contains(&pr) {
                prs.push(pr);
            }
        }
    }
    prs
}

/// Whether a merge subject references exactly `branch`.
///
/// Recognizes the hosted-platform shape `... from owner/branch` (owner optional)
/// and git's native `Merge branch 'branch'`.
pub fn subject_mentions_branch(subject: &str, branch: &str) -> bool {
    if let Some(idx) = subject.find("from ") {
        if let Some(token) = subject[idx + 5..].split_whitespace().next() {
            if token == branch {
                return true;
            }
            // strip only the owner segment: "owner/feature/x" -> "feature/x"
            if token.split_once('/').is_some_and(|(_, rest)| rest == branch) {
                return true;
            }
        }
    }
    subject.contains(&format!("'{branch}'"))
}
