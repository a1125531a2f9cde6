use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::io::Write;
use std::path::{Path, PathBuf};

use wt_cli::cleanup::{self, CleanupOptions};
use wt_cli::compare;
use wt_cli::config;
use wt_cli::create::{self, CreateOptions};
use wt_cli::delete::{self, DeleteOptions};
use wt_cli::directive;
use wt_cli::git_utils::{self, GitOps, GitRepo};
use wt_cli::list;
use wt_cli::prompt::StdinConfirm;
use wt_cli::user_config::{self, ConfigKey};

#[derive(Parser)]
#[command(name = "wt", author, version, about = "Git worktree manager", long_about = None)]
struct Cli {
    #[arg(long, help = "Show debug logging (git and hook invocations)")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a worktree with its own branch
    Create {
        name: String,
        #[arg(short, long, help = "Check out an existing branch instead of creating one")]
        branch: Option<String>,
    },
    /// Delete a worktree (the current one when no name is given)
    #[command(alias = "rm")]
    Delete {
        name: Option<String>,
        #[arg(short, long, help = "Delete even with uncommitted or unmerged changes")]
        force: bool,
        #[arg(short, long, help = "Keep the worktree's branch")]
        keep_branch: bool,
    },
    /// Remove worktrees whose branches have been merged
    Cleanup {
        #[arg(short = 'n', long, help = "Show what would be deleted without deleting")]
        dry_run: bool,
        #[arg(short, long, help = "Skip confirmation and ignore pre-delete hook failures")]
        force: bool,
        #[arg(short, long, help = "Keep the associated branches")]
        keep_branch: bool,
    },
    /// List worktrees with their status
    #[command(alias = "ls")]
    List {
        #[arg(short, long, help = "Detailed output including age and info hooks")]
        verbose: bool,
        #[arg(long, help = "Output JSON", conflicts_with = "verbose")]
        json: bool,
    },
    /// Print the path of a worktree
    Cd { name: String },
    /// Print the repository root to leave the current worktree
    Exit,
    /// Print the main repository root
    Root,
    /// Get or set user configuration
    Config(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, help = "Use the global value instead of the current repository's")]
    global: bool,
    #[arg(long, help = "Remove the value", conflicts_with = "value")]
    unset: bool,
    #[arg(long, help = "List configured values", conflicts_with_all = ["key", "unset", "show_origin"])]
    list: bool,
    #[arg(long, help = "Show effective values and where they come from", conflicts_with_all = ["key", "unset"])]
    show_origin: bool,
    key: Option<String>,
    value: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format(|buf, record| {
            let level = match record.level() {
                log::Level::Error => "error".red().bold(),
                log::Level::Warn => "warning".yellow().bold(),
                other => other.to_string().to_lowercase().normal(),
            };
            writeln!(buf, "{level}: {}", record.args())
        })
        .init();
}

fn current_dir() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    // the repository root is canonical, so compare against a canonical cwd
    Ok(cwd.canonicalize().unwrap_or(cwd))
}

fn open_repo(cwd: &Path) -> Result<GitRepo> {
    GitRepo::discover(cwd).context("not in a git repository")
}

fn run(command: Commands) -> Result<()> {
    let cwd = current_dir()?;
    let mut err = std::io::stderr();

    match command {
        Commands::Create { name, branch } => {
            let repo = open_repo(&cwd)?;
            let cfg = config::load(repo.repo_root())?;
            let opts = CreateOptions {
                name,
                existing_branch: branch,
            };
            let created = create::create(&repo, &cfg, &opts, &mut err)?;
            directive::request_cd(&created.path, "open your new worktree")?;
        }
        Commands::Delete {
            name,
            force,
            keep_branch,
        } => {
            let repo = open_repo(&cwd)?;
            let cfg = config::load(repo.repo_root())?;
            let opts = DeleteOptions {
                name,
                force,
                keep_branch,
            };
            let user_cfg = compare::load_user_config();
            let deleted = delete::delete(&repo, &cfg, &user_cfg, &opts, &cwd, &mut err)?;
            if deleted.return_to_root {
                directive::request_cd(repo.repo_root(), "return to the repository root")?;
            }
        }
        Commands::Cleanup {
            dry_run,
            force,
            keep_branch,
        } => {
            let repo = open_repo(&cwd)?;
            let cfg = config::load_or_default(repo.repo_root())?;
            let ctx = compare::setup(&repo, &cfg, &mut err);
            let opts = CleanupOptions {
                dry_run,
                force,
                keep_branch,
            };
            let report = cleanup::cleanup(
                &repo,
                &cfg,
                &ctx.comparison_ref,
                opts,
                &cwd,
                &mut StdinConfirm,
                &mut err,
            )?;
            if report.return_to_root {
                directive::request_cd(repo.repo_root(), "return to the repository root")?;
            }
        }
        Commands::List { verbose, json } => {
            let repo = open_repo(&cwd)?;
            let cfg = config::load_or_default(repo.repo_root())?;
            let ctx = compare::setup(&repo, &cfg, &mut err);
            let entries = list::collect(&repo, &cfg, &ctx.comparison_ref, &cwd, verbose)
                .context("failed to list worktrees")?;
            if json {
                println!("{}", list::render_json(&entries)?);
            } else if entries.is_empty() {
                println!("No worktrees");
            } else if verbose {
                print!("{}", list::render_verbose(&entries, chrono::Utc::now()));
            } else {
                print!("{}", list::render_compact(&entries));
            }
        }
        Commands::Cd { name } => {
            let repo = open_repo(&cwd)?;
            let cfg = config::load(repo.repo_root())?;
            let path = cfg.worktree_path(repo.repo_root(), &name);
            if !path.is_dir() {
                bail!("worktree {name:?} does not exist");
            }
            println!("{}", path.display());
        }
        Commands::Exit => {
            let repo = open_repo(&cwd)?;
            config::load(repo.repo_root())?;
            println!("{}", repo.repo_root().display());
        }
        Commands::Root => {
            let root = git_utils::repo_root_from(&cwd).context("not in a git repository")?;
            println!("{}", root.display());
        }
        Commands::Config(args) => run_config(args, &cwd)?,
    }
    Ok(())
}

fn run_config(args: ConfigArgs, cwd: &Path) -> Result<()> {
    let mut user_cfg = user_config::load()?;
    let repo_root = git_utils::repo_root_from(cwd).ok();

    if args.list {
        for line in user_cfg.list_lines() {
            println!("{line}");
        }
        return Ok(());
    }

    if args.show_origin {
        for key in ConfigKey::ALL {
            match &repo_root {
                Some(root) if !args.global => {
                    let (value, origin) = user_cfg.effective(root, key);
                    println!("{} = {:<16} ({origin})", key.as_str(), display_value(&value));
                }
                _ => println!("{} = {:<16} (global)", key.as_str(), display_value(&user_cfg.get_global(key))),
            }
        }
        if let Some(root) = &repo_root {
            if let Ok(cfg) = config::load(root) {
                if let Some(branch) = cfg.default_branch {
                    println!("default_branch = {branch:<8} (.wt.yaml)");
                }
            }
        }
        return Ok(());
    }

    let Some(key) = args.key.as_deref() else {
        bail!("usage: wt config [--global] <key> [value]\n       wt config --list\n       wt config --show-origin");
    };
    let key: ConfigKey = key.parse()?;
    let repo = || {
        repo_root
            .clone()
            .context("not in a git repository (use --global for global config)")
    };

    if args.unset {
        if args.global {
            user_cfg.unset_global(key);
        } else {
            user_cfg.unset_for_repo(&repo()?, key);
        }
        return user_config::save(&user_cfg);
    }

    match args.value {
        None if args.global => println!("{}", user_cfg.get_global(key)),
        None => println!("{}", user_cfg.effective(&repo()?, key).0),
        Some(value) => {
            if args.global {
                user_cfg.set_global(key, &value)?;
            } else {
                user_cfg.set_for_repo(&repo()?, key, &value)?;
            }
            user_config::save(&user_cfg)?;
        }
    }
    Ok(())
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "\"\""
    } else {
        value
    }
}
