//! Worktree index allocation.
//!
//! Every managed worktree gets a small positive integer, stored as `wt.index`
//! in its git metadata directory. The set of used indexes is recomputed from
//! the live metadata on each allocation, so removing a worktree frees its
//! index without an explicit release step.
//!
//! Allocation and persistence are two separate steps and are not atomic
//! across concurrent `wt` processes.

use std::collections::BTreeSet;

use crate::git_utils::{GitError, GitOps};

pub const INDEX_KEY: &str = "wt.index";

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no free worktree index (all of 1..={max} are in use)")]
    Exhausted { max: u32 },
    #[error("failed to store worktree index: {0}")]
    Persist(#[from] GitError),
}

/// Indexes currently held by worktrees with live metadata.
pub fn used_indexes(git: &dyn GitOps) -> BTreeSet<u32> {
    git.worktree_meta_names()
        .iter()
        .filter_map(|name| get(git, name))
        .collect()
}

/// Smallest index >= 1 not in `used`, bounded by `max` when it is non-zero.
pub fn lowest_unused(used: &BTreeSet<u32>, max: u32) -> Result<u32, IndexError> {
    let candidate = (1..)
        .find(|i| !used.contains(i))
        .ok_or(IndexError::Exhausted { max })?;
    if max > 0 && candidate > max {
        return Err(IndexError::Exhausted { max });
    }
    Ok(candidate)
}

/// Choose an index for a new worktree. Nothing is written.
pub fn allocate(git: &dyn GitOps, max: u32) -> Result<u32, IndexError> {
    lowest_unused(&used_indexes(git), max)
}

/// The stored index of `name`, or `None` when it never got one.
pub fn get(git: &dyn GitOps, name: &str) -> Option<u32> {
    git.worktree_config_get(name, INDEX_KEY)?
        .trim()
        .parse()
        .ok()
        .filter(|i| *i > 0)
}

/// Store `index` for `name`. The worktree must already exist.
pub fn set(git: &dyn GitOps, name: &str, index: u32) -> Result<(), IndexError> {
    git.worktree_config_set(name, INDEX_KEY, &index.to_string())?;
    Ok(())
}
