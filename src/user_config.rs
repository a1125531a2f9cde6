//! User configuration (`~/.config/wt/config.yaml`).
//!
//! Holds the comparison remote and fetch interval, globally and per
//! repository. Per-repository values win over global ones.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_FETCH_INTERVAL: &str = "5m";
const FETCH_NEVER: &str = "never";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown config key: {0} (valid keys: remote, fetch_interval)")]
    UnknownKey(String),
    #[error("invalid fetch_interval {0:?}: expected a duration like '30s', '5m', '1h', or '0' / 'never'")]
    InvalidFetchInterval(String),
}

/// How often the comparison remote may be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchInterval {
    Never,
    Always,
    Every(Duration),
}

impl FetchInterval {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        if value == FETCH_NEVER {
            return Ok(FetchInterval::Never);
        }
        if value == "0" {
            return Ok(FetchInterval::Always);
        }
        match humantime::parse_duration(value) {
            Ok(d) if d.is_zero() => Ok(FetchInterval::Always),
            Ok(d) => Ok(FetchInterval::Every(d)),
            Err(_) => Err(ConfigError::InvalidFetchInterval(value.to_string())),
        }
    }
}

/// Keys accepted by `wt config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Remote,
    FetchInterval,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 2] = [ConfigKey::Remote, ConfigKey::FetchInterval];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Remote => "remote",
            ConfigKey::FetchInterval => "fetch_interval",
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote" => Ok(ConfigKey::Remote),
            "fetch_interval" => Ok(ConfigKey::FetchInterval),
            other => Err(ConfigError::UnknownKey(other.to_string())),
        }
    }
}

/// Where an effective value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Repo,
    Global,
    Default,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Origin::Repo => "repo",
            Origin::Global => "global",
            Origin::Default => "default",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_interval: Option<String>,
}

impl RepoOverrides {
    fn is_empty(&self) -> bool {
        self.remote.is_none() && self.fetch_interval.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Empty means compare against the local branch.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_interval: Option<String>,
    /// Keyed by absolute repository root.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub repos: BTreeMap<String, RepoOverrides>,
}

fn repo_key(repo: &Path) -> String {
    repo.to_string_lossy().to_string()
}

impl UserConfig {
    fn repo(&self, repo: &Path) -> Option<&RepoOverrides> {
        self.repos.get(&repo_key(repo))
    }

    /// Remote to compare against in `repo`; empty for local comparison.
    pub fn remote_for_repo(&self, repo: &Path) -> String {
        self.repo(repo)
            .and_then(|r| r.remote.clone())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.remote.clone())
    }

    /// Effective fetch interval for `repo`. Unparseable values fetch every time.
    pub fn fetch_interval_for_repo(&self, repo: &Path) -> FetchInterval {
        let (raw, _) = self.effective(repo, ConfigKey::FetchInterval);
        FetchInterval::parse(&raw).unwrap_or_else(|e| {
            log::debug!("{e}; fetching every time");
            FetchInterval::Always
        })
    }

    /// Effective value of `key` for `repo` and where it came from.
    pub fn effective(&self, repo: &Path, key: ConfigKey) -> (String, Origin) {
        if let Some(value) = self.get_for_repo(repo, key) {
            return (value, Origin::Repo);
        }
        match key {
            ConfigKey::Remote if self.remote.is_empty() => (String::new(), Origin::Default),
            ConfigKey::Remote => (self.remote.clone(), Origin::Global),
            ConfigKey::FetchInterval => match self.fetch_interval.as_deref().filter(|v| !v.is_empty()) {
                Some(value) => (value.to_string(), Origin::Global),
                None => (DEFAULT_FETCH_INTERVAL.to_string(), Origin::Default),
            },
        }
    }

    pub fn get_global(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::Remote => self.remote.clone(),
            ConfigKey::FetchInterval => self
                .fetch_interval
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_FETCH_INTERVAL.to_string()),
        }
    }

    /// Per-repository value, if one is set.
    pub fn get_for_repo(&self, repo: &Path, key: ConfigKey) -> Option<String> {
        let overrides = self.repo(repo)?;
        match key {
            ConfigKey::Remote => overrides.remote.clone().filter(|r| !r.is_empty()),
            ConfigKey::FetchInterval => overrides.fetch_interval.clone(),
        }
    }

    pub fn set_global(&mut self, key: ConfigKey, value: &str) -> Result<(), ConfigError> {
        match key {
            ConfigKey::Remote => self.remote = value.to_string(),
            ConfigKey::FetchInterval => {
                FetchInterval::parse(value)?;
                self.fetch_interval = Some(value.to_string());
            }
        }
        Ok(())
    }

    pub fn set_for_repo(&mut self, repo: &Path, key: ConfigKey, value: &str) -> Result<(), ConfigError> {
        if key == ConfigKey::FetchInterval {
            FetchInterval::parse(value)?;
        }
        let overrides = self.repos.entry(repo_key(repo)).or_default();
        match key {
            ConfigKey::Remote => overrides.remote = Some(value.to_string()),
            ConfigKey::FetchInterval => overrides.fetch_interval = Some(value.to_string()),
        }
        Ok(())
    }

    pub fn unset_global(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::Remote => self.remote.clear(),
            ConfigKey::FetchInterval => self.fetch_interval = None,
        }
    }

    /// Remove a per-repository value, dropping the repository entry once empty.
    pub fn unset_for_repo(&mut self, repo: &Path, key: ConfigKey) {
        let repo_key = repo_key(repo);
        let Some(overrides) = self.repos.get_mut(&repo_key) else {
            return;
        };
        match key {
            ConfigKey::Remote => overrides.remote = None,
            ConfigKey::FetchInterval => overrides.fetch_interval = None,
        }
        if overrides.is_empty() {
            self.repos.remove(&repo_key);
        }
    }

    /// Explicitly configured values, one `key = value (scope)` line each.
    pub fn list_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.remote.is_empty() {
            lines.push(format!("remote = {} (global)", self.remote));
        }
        if let Some(interval) = &self.fetch_interval {
            lines.push(format!("fetch_interval = {interval} (global)"));
        }
        for (path, overrides) in &self.repos {
            if let Some(remote) = &overrides.remote {
                lines.push(format!("repos.{path}.remote = {remote}"));
            }
            if let Some(interval) = &overrides.fetch_interval {
                lines.push(format!("repos.{path}.fetch_interval = {interval}"));
            }
        }
        lines
    }
}

/// `~/.config/wt/config.yaml`
pub fn config_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("wt").join("config.yaml"))
}

/// Load the user configuration; a missing file yields defaults.
pub fn load() -> anyhow::Result<UserConfig> {
    load_from(&config_path()?)
}

pub fn load_from(path: &Path) -> anyhow::Result<UserConfig> {
    if !path.exists() {
        return Ok(UserConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read user config: {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(UserConfig::default());
    }
    serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse user config: {}", path.display()))
}

pub fn save(config: &UserConfig) -> anyhow::Result<()> {
    save_to(config, &config_path()?)
}

/// Write atomically: temp file in the same directory, then rename over.
pub fn save_to(config: &UserConfig, path: &Path) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .context("User config path has no parent directory")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

    let yaml = serde_yaml::to_string(config).context("Failed to serialize user config")?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(yaml.as_bytes())
        .context("Failed to write user config")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to save user config: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPO: &str = "/work/app";

    #[test]
    fn fetch_interval_sentinels() {
        assert_eq!(FetchInterval::parse("never").unwrap(), FetchInterval::Never);
        assert_eq!(FetchInterval::parse("0").unwrap(), FetchInterval::Always);
        assert_eq!(FetchInterval::parse("0s").unwrap(), FetchInterval::Always);
        assert_eq!(
            FetchInterval::parse("5m").unwrap(),
            FetchInterval::Every(Duration::from_secs(300))
        );
        assert_eq!(
            FetchInterval::parse("1h 30m").unwrap(),
            FetchInterval::Every(Duration::from_secs(5400))
        );
        assert!(matches!(
            FetchInterval::parse("soon"),
            Err(ConfigError::InvalidFetchInterval(_))
        ));
    }

    #[test]
    fn defaults_are_local_and_five_minutes() {
        let cfg = UserConfig::default();
        let repo = Path::new(REPO);
        assert_eq!(cfg.remote_for_repo(repo), "");
        assert_eq!(
            cfg.fetch_interval_for_repo(repo),
            FetchInterval::Every(Duration::from_secs(300))
        );
        assert_eq!(cfg.effective(repo, ConfigKey::Remote).1, Origin::Default);
        assert_eq!(cfg.get_global(ConfigKey::FetchInterval), "5m");
    }

    #[test]
    fn repo_overrides_win() {
        let mut cfg = UserConfig::default();
        let repo = Path::new(REPO);
        cfg.set_global(ConfigKey::Remote, "origin").unwrap();
        cfg.set_global(ConfigKey::FetchInterval, "1h").unwrap();
        assert_eq!(cfg.remote_for_repo(repo), "origin");
        assert_eq!(cfg.effective(repo, ConfigKey::Remote), ("origin".into(), Origin::Global));

        cfg.set_for_repo(repo, ConfigKey::Remote, "upstream").unwrap();
        cfg.set_for_repo(repo, ConfigKey::FetchInterval, "0").unwrap();
        assert_eq!(cfg.remote_for_repo(repo), "upstream");
        assert_eq!(cfg.fetch_interval_for_repo(repo), FetchInterval::Always);
        assert_eq!(cfg.effective(repo, ConfigKey::FetchInterval).1, Origin::Repo);

        // other repositories still see the global values
        assert_eq!(cfg.remote_for_repo(Path::new("/work/other")), "origin");
    }

    #[test]
    fn unparseable_interval_fetches_every_time() {
        let cfg: UserConfig = serde_yaml::from_str("fetch_interval: whenever\n").unwrap();
        assert_eq!(cfg.fetch_interval_for_repo(Path::new(REPO)), FetchInterval::Always);
    }

    #[test]
    fn set_validates_interval_and_key() {
        let mut cfg = UserConfig::default();
        assert!(cfg.set_global(ConfigKey::FetchInterval, "often").is_err());
        assert!(cfg
            .set_for_repo(Path::new(REPO), ConfigKey::FetchInterval, "often")
            .is_err());
        assert!(cfg.repos.is_empty());
        assert_eq!(
            "colour".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey("colour".into()))
        );
    }

    #[test]
    fn unsetting_last_repo_key_drops_entry() {
        let mut cfg = UserConfig::default();
        let repo = Path::new(REPO);
        cfg.set_for_repo(repo, ConfigKey::Remote, "origin").unwrap();
        cfg.set_for_repo(repo, ConfigKey::FetchInterval, "never").unwrap();
        cfg.unset_for_repo(repo, ConfigKey::Remote);
        assert!(cfg.repos.contains_key(REPO));
        cfg.unset_for_repo(repo, ConfigKey::FetchInterval);
        assert!(cfg.repos.is_empty());
        // unsetting again is harmless
        cfg.unset_for_repo(repo, ConfigKey::FetchInterval);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.yaml");
        assert_eq!(load_from(&path).unwrap(), UserConfig::default());

        let mut cfg = UserConfig::default();
        cfg.set_global(ConfigKey::Remote, "origin").unwrap();
        cfg.set_for_repo(Path::new(REPO), ConfigKey::FetchInterval, "never").unwrap();
        save_to(&cfg, &path).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.fetch_interval_for_repo(Path::new(REPO)), FetchInterval::Never);
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name() != "config.yaml")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn list_lines_show_scopes() {
        let mut cfg = UserConfig::default();
        cfg.set_global(ConfigKey::Remote, "origin").unwrap();
        cfg.set_for_repo(Path::new(REPO), ConfigKey::FetchInterval, "10m").unwrap();
        assert_eq!(
            cfg.list_lines(),
            vec![
                "remote = origin (global)".to_string(),
                format!("repos.{REPO}.fetch_interval = 10m"),
            ]
        );
    }
}
