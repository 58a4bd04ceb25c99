use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use super::super::{Ctx, print_json, read_file, render};
use crate::core::{CoreError, parse_store, serialize_store};
use crate::merge::{ConflictRecord, MergeEngine, MergeStats, TieBreakPolicy};
use crate::integrity::RejectedEntry;
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Local store file.
    #[arg(value_name = "LOCAL")]
    pub local: PathBuf,

    /// Remote store file.
    #[arg(value_name = "REMOTE")]
    pub remote: PathBuf,

    /// Write the merged store here instead of stdout.
    #[arg(long, short = 'o', value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Tie-break policy (default: config).
    #[arg(long, value_name = "POLICY")]
    pub tie_break: Option<TieBreakPolicy>,
}

#[derive(Serialize)]
struct MergeSummary<'a> {
    policy: TieBreakPolicy,
    counts: MergeStats,
    conflicts: &'a [ConflictRecord],
    rejected: &'a [RejectedEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    out: Option<&'a Path>,
}

pub(crate) fn handle(ctx: &Ctx, args: MergeArgs) -> Result<i32> {
    let local = parse_store(&read_file(&args.local)?).map_err(CoreError::from)?;
    let remote = parse_store(&read_file(&args.remote)?).map_err(CoreError::from)?;

    let policy = args.tie_break.unwrap_or(ctx.config.merge.tie_break);
    let op = MergeEngine::new(policy).merge(&local, &remote);
    let bytes = serialize_store(&op.merged)?;

    match args.out.as_deref() {
        Some(path) => write_atomic(path, &bytes)?,
        None => std::io::stdout()
            .write_all(&bytes)
            .map_err(|source| Error::Io {
                path: PathBuf::from("<stdout>"),
                source,
            })?,
    }

    let summary = MergeSummary {
        policy,
        counts: op.stats(),
        conflicts: &op.conflicts_detected,
        rejected: &op.rejected_entries,
        out: args.out.as_deref(),
    };
    // The merged store owns stdout unless it went to a file.
    if args.out.is_some() {
        if ctx.json {
            print_json(&summary)?;
        } else {
            println!("{}", render::render_merge(&op));
        }
    } else if !ctx.json {
        eprintln!("{}", render::render_merge(&op));
    }

    Ok(if op.has_rejections() { 2 } else { 0 })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
