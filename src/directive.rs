//! Asking the calling shell to change directory.
//!
//! A child process cannot move its parent shell, so the shell wrapper sets
//! `WT_CD_FILE` and `cd`s into whatever path we leave there.

use std::io::Write;
use std::path::Path;

use anyhow::Context;

pub const CD_FILE_ENV: &str = "WT_CD_FILE";

/// Request a `cd` to `path`; `purpose` completes "Run `cd <path>` to ...".
pub fn request_cd(path: &Path, purpose: &str) -> anyhow::Result<()> {
    match std::env::var_os(CD_FILE_ENV).filter(|v| !v.is_empty()) {
        Some(file) => write_cd_file(Path::new(&file), path),
        None => {
            eprintln!("\nRun `cd {}` to {purpose}", path.display());
            Ok(())
        }
    }
}

/// Write `path` followed by a newline to `file`, readable only by the owner.
pub fn write_cd_file(file: &Path, path: &Path) -> anyhow::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut out = options
        .open(file)
        .with_context(|| format!("Failed to open {CD_FILE_ENV} file {}", file.display()))?;
    writeln!(out, "{}", path.display())
        .with_context(|| format!("Failed to write {}", file.display()))?;
    Ok(())
}
