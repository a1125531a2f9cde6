//! Repository configuration (`.wt.yaml` at the main repository root).
//!
//! Defines where managed worktrees live, how branch names are derived,
//! index bounds, and the hook scripts for each lifecycle event.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::hooks::HookEvent;

pub const CONFIG_FILE_NAME: &str = ".wt.yaml";

const DEFAULT_WORKTREE_DIR: &str = "worktrees";
const DEFAULT_BRANCH_PATTERN: &str = "{name}";

/// The `.wt.yaml` file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub version: u32,
    pub worktree_dir: String,
    pub branch_pattern: String,
    /// Comparison branch override; auto-detected when unset.
    pub default_branch: Option<String>,
    pub index: IndexConfig,
    pub hooks: HooksConfig,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            version: 1,
            worktree_dir: DEFAULT_WORKTREE_DIR.to_string(),
            branch_pattern: DEFAULT_BRANCH_PATTERN.to_string(),
            default_branch: None,
            index: IndexConfig::default(),
            hooks: HooksConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Highest index that may be allocated; 0 means unbounded.
    pub max: u32,
}

/// Hook scripts per lifecycle event, run in the listed order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    pub pre_create: Vec<HookEntry>,
    pub post_create: Vec<HookEntry>,
    pub pre_delete: Vec<HookEntry>,
    pub post_delete: Vec<HookEntry>,
    pub info: Vec<HookEntry>,
}

impl HooksConfig {
    pub fn entries(&self, event: HookEvent) -> &[HookEntry] {
        match event {
            HookEvent::PreCreate => &self.pre_create,
            HookEvent::PostCreate => &self.post_create,
            HookEvent::PreDelete => &self.pre_delete,
            HookEvent::PostDelete => &self.post_delete,
            HookEvent::Info => &self.info,
        }
    }
}

/// A single hook script plus extra environment for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEntry {
    pub script: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl RepoConfig {
    /// Branch name for a new worktree called `name`.
    pub fn branch_for(&self, name: &str) -> String {
        self.branch_pattern.replace("{name}", name)
    }

    /// Absolute directory holding the managed worktrees.
    pub fn worktrees_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.worktree_dir)
    }

    pub fn worktree_path(&self, repo_root: &Path, name: &str) -> PathBuf {
        self.worktrees_path(repo_root).join(name)
    }

    fn apply_defaults(mut self) -> Self {
        if self.worktree_dir.is_empty() {
            self.worktree_dir = DEFAULT_WORKTREE_DIR.to_string();
        }
        if self.branch_pattern.is_empty() {
            self.branch_pattern = DEFAULT_BRANCH_PATTERN.to_string();
        }
        self
    }
}

pub fn config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(CONFIG_FILE_NAME)
}

pub fn exists(repo_root: &Path) -> bool {
    config_path(repo_root).is_file()
}

/// Parse `.wt.yaml` contents.
pub fn parse_repo_config(contents: &str) -> Result<RepoConfig, serde_yaml::Error> {
    if contents.trim().is_empty() {
        return Ok(RepoConfig::default());
    }
    let config: RepoConfig = serde_yaml::from_str(contents)?;
    Ok(config.apply_defaults())
}

/// Load `.wt.yaml`, failing when the file is missing.
pub fn load(repo_root: &Path) -> anyhow::Result<RepoConfig> {
    let path = config_path(repo_root);
    let contents = std::fs::read_to_string(&path).with_context(|| {
        format!(
            "Failed to read {} (is {CONFIG_FILE_NAME} present?)",
            path.display()
        )
    })?;
    parse_repo_config(&contents)
        .with_context(|| format!("Failed to parse YAML config file: {}", path.display()))
}

/// Load `.wt.yaml`, using defaults when the file does not exist.
pub fn load_or_default(repo_root: &Path) -> anyhow::Result<RepoConfig> {
    if exists(repo_root) {
        load(repo_root)
    } else {
        Ok(RepoConfig::default())
    }
}
