//! Comparison ref resolution.
//!
//! Worktree branches are compared either against the local default branch or,
//! when a remote is configured, against `<remote>/<branch>` after an
//! interval-gated fetch. Any remote trouble degrades to the local branch.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::RepoConfig;
use crate::git_utils::GitOps;
use crate::spinner::Spinner;
use crate::user_config::{self, FetchInterval, UserConfig};

const FALLBACK_BRANCH: &str = "main";

/// Result of resolving what to compare worktrees against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonContext {
    pub repo_root: PathBuf,
    /// Local comparison branch.
    pub branch: String,
    /// Configured remote; empty for local comparison.
    pub remote: String,
    /// `branch` or `<remote>/<branch>`.
    pub comparison_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    Disabled,
    Skip { since: Duration },
    Fetch,
}

/// Whether to fetch now, given the configured interval and the last fetch time.
pub fn fetch_decision(
    interval: FetchInterval,
    last_fetch: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> FetchDecision {
    match interval {
        FetchInterval::Never => FetchDecision::Disabled,
        FetchInterval::Always => FetchDecision::Fetch,
        FetchInterval::Every(every) => {
            // a fetch time in the future (clock skew) counts as just fetched
            let since = last_fetch.map(|last| (now - last).to_std().unwrap_or(Duration::ZERO));
            match since {
                Some(since) if since < every => FetchDecision::Skip { since },
                _ => FetchDecision::Fetch,
            }
        }
    }
}

/// Repository override, else the detected default branch, else `main`.
pub fn comparison_branch(git: &dyn GitOps, repo_cfg: &RepoConfig) -> String {
    repo_cfg
        .default_branch
        .clone()
        .filter(|b| !b.is_empty())
        .or_else(|| git.default_branch())
        .unwrap_or_else(|| FALLBACK_BRANCH.to_string())
}

/// Resolve the comparison ref, fetching the remote when the interval allows.
///
/// Progress lines go to `err`. Never fails: fetch errors and missing remote
/// refs are logged and local comparison is used instead.
pub fn resolve(
    git: &dyn GitOps,
    repo_cfg: &RepoConfig,
    user_cfg: &UserConfig,
    err: &mut dyn Write,
) -> ComparisonContext {
    let repo_root = git.repo_root().to_path_buf();
    let remote = user_cfg.remote_for_repo(&repo_root);
    let branch = comparison_branch(git, repo_cfg);

    if remote.is_empty() {
        return ComparisonContext {
            repo_root,
            comparison_ref: branch.clone(),
            branch,
            remote,
        };
    }

    let interval = user_cfg.fetch_interval_for_repo(&repo_root);
    match fetch_decision(interval, git.last_fetch(&remote), Utc::now()) {
        FetchDecision::Disabled => log::debug!("fetching from {remote} is disabled"),
        FetchDecision::Skip { since } => {
            let _ = writeln!(err, "Skipping fetch (last fetch {} ago)", format_duration(since));
        }
        FetchDecision::Fetch => fetch(git, &remote, err),
    }

    let remote_ref = format!("{remote}/{branch}");
    let comparison_ref = if git.ref_exists(&remote_ref) {
        remote_ref
    } else {
        log::warn!("{remote_ref} does not exist, comparing to local {branch}");
        branch.clone()
    };

    ComparisonContext {
        repo_root,
        branch,
        remote,
        comparison_ref,
    }
}

fn fetch(git: &dyn GitOps, remote: &str, err: &mut dyn Write) {
    let spinner = Spinner::start(format!("Fetching from {remote}..."));
    let result = git.fetch_quiet(remote);
    spinner.stop();

    match result {
        Ok(()) => {
            if let Err(e) = git.set_last_fetch(remote, Utc::now()) {
                log::debug!("could not record fetch time: {e}");
            }
            if let Err(e) = git.update_remote_head(remote) {
                log::debug!("could not update {remote}/HEAD: {e}");
            }
            let _ = writeln!(err, "Fetched from {remote}");
        }
        Err(e) => log::warn!("failed to fetch from {remote}: {e}"),
    }
}

/// Load the user configuration, falling back to defaults with a warning.
pub fn load_user_config() -> UserConfig {
    user_config::load().unwrap_or_else(|e| {
        log::warn!("{e:#} (using defaults)");
        UserConfig::default()
    })
}

/// Resolve and announce the comparison for `list` and `cleanup`.
pub fn setup(git: &dyn GitOps, repo_cfg: &RepoConfig, err: &mut dyn Write) -> ComparisonContext {
    let _ = writeln!(err, "Repository: {}", git.repo_root().display());
    let ctx = resolve(git, repo_cfg, &load_user_config(), err);
    let _ = writeln!(err, "Comparing to: {}", ctx.comparison_ref);
    let _ = writeln!(err);
    ctx
}

/// Short elapsed time: `42s`, `7m`, `2h`, `1h15m`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if (s / 60) % 60 == 0 => format!("{}h", s / 3600),
        s => format!("{}h{}m", s / 3600, (s / 60) % 60),
    }
}
