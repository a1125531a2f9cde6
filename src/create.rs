//! `wt create`: new worktree with metadata, index and hooks.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::io::Write;
use std::path::PathBuf;

use crate::config::RepoConfig;
use crate::git_utils::GitOps;
use crate::hooks::{self, HookEnv, HookEvent};
use crate::index;

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub name: String,
    /// Check out this existing branch instead of creating one.
    pub existing_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub name: String,
    pub path: PathBuf,
    pub branch: String,
    pub index: Option<u32>,
}

/// Worktree names become a single directory under the worktree dir.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        bail!("invalid worktree name {name:?}");
    }
    if name.contains('/') || name.contains('\\') {
        bail!("invalid worktree name {name:?}: must not contain path separators");
    }
    Ok(())
}

/// Create the worktree described by `opts`.
///
/// Precondition failures and pre_create hook failures abort before anything
/// is created. Once the worktree exists, metadata, index and post_create
/// problems are only warnings.
pub fn create(
    git: &dyn GitOps,
    cfg: &RepoConfig,
    opts: &CreateOptions,
    out: &mut dyn Write,
) -> Result<Created> {
    let name = opts.name.as_str();
    validate_name(name)?;

    let repo_root = git.repo_root();
    let path = cfg.worktree_path(repo_root, name);
    if path.exists() {
        bail!("worktree {name:?} already exists at {}", path.display());
    }

    let (branch, new_branch) = match &opts.existing_branch {
        Some(existing) => {
            if !git.branch_exists(existing) {
                bail!("branch {existing:?} does not exist");
            }
            (existing.clone(), false)
        }
        None => {
            let branch = cfg.branch_for(name);
            if git.branch_exists(&branch) {
                bail!("branch {branch:?} already exists (use --branch to check out an existing branch)");
            }
            (branch, true)
        }
    };

    let mut env = HookEnv {
        name: name.to_string(),
        path: path.clone(),
        branch: branch.clone(),
        repo_root: repo_root.to_path_buf(),
        worktree_dir: cfg.worktree_dir.clone(),
        index: 0,
    };

    hooks::run_event(&cfg.hooks, HookEvent::PreCreate, &env, out)
        .context("pre-create hook failed")?;

    if new_branch {
        let _ = writeln!(out, "Creating worktree {name:?} with new branch {branch:?}...");
    } else {
        let _ = writeln!(out, "Creating worktree {name:?} from branch {branch:?}...");
    }
    git.add_worktree(&path, &branch, new_branch)
        .context("failed to create worktree")?;

    record_metadata(git, name, &path);

    let assigned = index::allocate(git, cfg.index.max)
        .and_then(|i| index::set(git, name, i).map(|()| i));
    let index = match assigned {
        Ok(i) => Some(i),
        Err(e) => {
            log::warn!("could not assign index: {e}");
            None
        }
    };
    env.index = index.unwrap_or(0);

    if let Err(e) = hooks::run_event(&cfg.hooks, HookEvent::PostCreate, &env, out) {
        log::warn!("post-create hook failed: {e}");
    }

    let _ = writeln!(out, "Worktree {name:?} created successfully");
    Ok(Created {
        name: name.to_string(),
        path,
        branch,
        index,
    })
}

fn record_metadata(git: &dyn GitOps, name: &str, path: &std::path::Path) {
    if let Err(e) = git.set_created_at(name, Utc::now()) {
        log::warn!("could not store creation time: {e}");
    }
    match git.head_commit(path) {
        Some(head) => {
            if let Err(e) = git.set_initial_commit(name, &head) {
                log::warn!("could not store initial commit: {e}");
            }
        }
        None => log::warn!("could not read HEAD of {}", path.display()),
    }
}
