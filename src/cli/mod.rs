//! CLI surface for memsync.
//!
//! Thin handlers over the library: `backup` runs the full workflow, `merge`
//! and `validate` work on files offline, `id` mints a composite id.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use crate::config::{self, Config};
use crate::{Error, Result};

mod commands;
mod render;

pub use commands::Commands;

// =============================================================================
// Entry + global options
// =============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "memsync",
    version,
    about = "Lossless merge and git backup of shared memory stores",
    infer_subcommands = true,
    infer_long_args = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Machine-readable JSON output.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Repository path (default: discover from cwd).
    #[arg(long, global = true, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// Host name recorded as `source_host` (default: config, then hostname).
    #[arg(long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// More log output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

// =============================================================================
// Public API
// =============================================================================

/// Parse CLI from raw args, tolerating `--snake_case` flag spellings.
pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let raw: Vec<OsString> = args.into_iter().map(|t| t.into()).collect();
    Cli::parse_from(normalize_args(raw))
}

/// Repository root for this invocation: `--repo`, else the repository
/// around the cwd, else the cwd.
pub fn resolve_repo(repo: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().map_err(|source| Error::Io {
        path: PathBuf::from("."),
        source,
    })?;
    let start = match repo {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => cwd.join(p),
        None => cwd,
    };
    let root = config::discover_repo_root(&start).unwrap_or(start);
    Ok(std::fs::canonicalize(&root).unwrap_or(root))
}

/// Layered config for `repo_root` with CLI flags applied last.
pub fn load_config(cli: &Cli, repo_root: Option<&Path>) -> Result<Config> {
    let mut cfg = config::load_for_repo(repo_root)?;
    if let Some(host) = cli.host.as_ref() {
        cfg.host = Some(host.clone());
    }
    Ok(cfg)
}

/// Run the CLI (used by bin). Returns the process exit code.
pub fn run(cli: Cli, cfg: Config) -> Result<i32> {
    let ctx = Ctx {
        repo: cli.repo.clone(),
        json: cli.json,
        config: cfg,
    };
    commands::dispatch(&ctx, cli.command)
}

// =============================================================================
// Context + helpers
// =============================================================================

struct Ctx {
    repo: Option<PathBuf>,
    json: bool,
    config: Config,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Core(crate::core::CoreError::Encode(e)))?;
    println!("{out}");
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn normalize_args(mut raw: Vec<OsString>) -> Vec<OsString> {
    if raw.is_empty() {
        return raw;
    }

    let mut out = Vec::with_capacity(raw.len());
    out.push(raw.remove(0)); // program name

    for arg in raw {
        let s = arg.to_string_lossy();
        if s.starts_with("--") {
            let mut pieces = s.splitn(2, '=');
            let flag = pieces.next().unwrap_or("");
            let canon = flag.to_lowercase().replace('_', "-");
            match pieces.next() {
                Some(v) => out.push(OsString::from(format!("{canon}={v}"))),
                None => out.push(OsString::from(canon)),
            }
        } else {
            out.push(arg);
        }
    }
    out
}
