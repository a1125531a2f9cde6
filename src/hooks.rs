//! Lifecycle hook execution.
//!
//! Hook scripts run one after another through `bash`, with the `WT_*`
//! variables describing the worktree. The first failing script stops the
//! rest of its list.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use crate::config::{HookEntry, HooksConfig};

const SHELL: &str = "bash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    PreCreate,
    PostCreate,
    PreDelete,
    PostDelete,
    Info,
}

impl HookEvent {
    pub fn name(self) -> &'static str {
        match self {
            HookEvent::PreCreate => "pre-create",
            HookEvent::PostCreate => "post-create",
            HookEvent::PreDelete => "pre-delete",
            HookEvent::PostDelete => "post-delete",
            HookEvent::Info => "info",
        }
    }

    /// Directory the event's scripts run in.
    ///
    /// Events that happen while the worktree exists run inside it; the rest
    /// run at the repository root.
    pub fn working_dir(self, env: &HookEnv) -> &Path {
        match self {
            HookEvent::PreCreate | HookEvent::PostDelete => &env.repo_root,
            HookEvent::PostCreate | HookEvent::PreDelete | HookEvent::Info => &env.path,
        }
    }
}

/// Values exported to every hook script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookEnv {
    pub name: String,
    pub path: PathBuf,
    pub branch: String,
    pub repo_root: PathBuf,
    pub worktree_dir: String,
    /// 0 when the worktree has no index.
    pub index: u32,
}

impl HookEnv {
    pub fn vars(&self) -> [(&'static str, String); 6] {
        [
            ("WT_NAME", self.name.clone()),
            ("WT_PATH", self.path.to_string_lossy().to_string()),
            ("WT_BRANCH", self.branch.clone()),
            ("WT_REPO_ROOT", self.repo_root.to_string_lossy().to_string()),
            ("WT_WORKTREE_DIR", self.worktree_dir.clone()),
            ("WT_INDEX", self.index.to_string()),
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("hook script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),
    #[error("failed to run hook {}: {source}", script.display())]
    Spawn {
        script: PathBuf,
        source: std::io::Error,
    },
    #[error("hook {} failed ({status})", script.display())]
    Failed { script: PathBuf, status: ExitStatus },
}

/// Run `entries` in order inside `work_dir`, stopping at the first failure.
pub fn run(entries: &[HookEntry], env: &HookEnv, work_dir: &Path) -> Result<(), HookError> {
    entries
        .iter()
        .try_for_each(|entry| run_entry(entry, env, work_dir))
}

/// Run the scripts configured for `event`, announcing them on `out`.
pub fn run_event(
    hooks: &HooksConfig,
    event: HookEvent,
    env: &HookEnv,
    out: &mut dyn Write,
) -> Result<(), HookError> {
    let entries = hooks.entries(event);
    if entries.is_empty() {
        return Ok(());
    }
    let _ = writeln!(out, "Running {} hooks...", event.name());
    run(entries, env, event.working_dir(env))
}

/// Collect the stdout of the `info` hooks for display.
///
/// Exit status is ignored; only output matters. A missing script ends the
/// collection with whatever was gathered so far.
pub fn capture_info(hooks: &HooksConfig, env: &HookEnv) -> Option<String> {
    let mut collected = String::new();
    for entry in &hooks.info {
        let mut cmd = match command_for(entry, env, HookEvent::Info.working_dir(env)) {
            Ok(cmd) => cmd,
            Err(e) => {
                log::debug!("skipping info hooks: {e}");
                break;
            }
        };
        match cmd.stdin(Stdio::null()).stderr(Stdio::null()).output() {
            Ok(output) => collected.push_str(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => log::debug!("info hook {} did not run: {e}", entry.script),
        }
    }
    let trimmed = collected.trim_end();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn run_entry(entry: &HookEntry, env: &HookEnv, work_dir: &Path) -> Result<(), HookError> {
    let mut cmd = command_for(entry, env, work_dir)?;
    let script = resolve_script(&entry.script, &env.repo_root);
    log::debug!("running hook {} in {}", script.display(), work_dir.display());

    // stdout goes to stderr so shell wrappers reading our stdout are not confused
    let status = cmd
        .stdout(std::io::stderr())
        .status()
        .map_err(|source| HookError::Spawn {
            script: script.clone(),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(HookError::Failed { script, status })
    }
}

fn command_for(entry: &HookEntry, env: &HookEnv, work_dir: &Path) -> Result<Command, HookError> {
    let script = resolve_script(&entry.script, &env.repo_root);
    if !script.is_file() {
        return Err(HookError::ScriptNotFound(script));
    }

    let mut cmd = Command::new(SHELL);
    cmd.arg(&script).current_dir(work_dir);
    cmd.envs(env.vars());
    // entry-specific values come last so they win over the fixed ones
    cmd.envs(&entry.env);
    Ok(cmd)
}

/// Relative script paths are taken from the repository root.
pub fn resolve_script(script: &str, repo_root: &Path) -> PathBuf {
    let path = Path::new(script);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        repo_root.join(path)
    }
}
