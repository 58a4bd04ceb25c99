use std::path::PathBuf;

use clap::Args;

use super::super::{Ctx, print_json, render, resolve_repo};
use crate::backup::{BackupManager, BackupReport};
use crate::git::{Git2Remote, SyncError};
use crate::Result;

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Memory file, relative to the repository root (default: config).
    #[arg(long, value_name = "PATH")]
    pub file: Option<String>,

    /// Remote branch holding the shared store (default: config).
    #[arg(long, value_name = "REF")]
    pub branch: Option<String>,

    /// Directory for backups, quarantine files and drafts (default: config).
    #[arg(long, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,
}

pub(crate) fn handle(ctx: &Ctx, args: BackupArgs) -> Result<i32> {
    let mut config = ctx.config.clone();
    if let Some(file) = args.file {
        config.sync.file = file;
    }
    if let Some(branch) = args.branch {
        config.sync.branch = branch;
    }
    if let Some(dir) = args.backup_dir {
        config.backup.dir = Some(dir);
    }

    let start = resolve_repo(ctx.repo.as_deref())?;
    let remote = match Git2Remote::open(&start, &config.sync.remote) {
        Ok(remote) => remote,
        Err(e) => {
            let err = SyncError::from(e);
            tracing::debug!(error = %err, "repository could not be opened");
            let report = BackupReport::not_started(
                &config.host(),
                &config.sync.branch,
                &config.local_path(&start),
                &err,
            );
            emit(ctx, &report)?;
            return Ok(report.exit_code());
        }
    };
    let root = remote.root();
    tracing::debug!(root = %root.display(), remote = remote.remote_name(), "repository opened");

    let local_path = config.local_path(&root);
    let manager = BackupManager::new(remote, config.workflow_options(&root));
    let report = manager.run_backup(&local_path, &config.sync.branch);
    emit(ctx, &report)?;
    Ok(report.exit_code())
}

fn emit(ctx: &Ctx, report: &BackupReport) -> Result<()> {
    if ctx.json {
        print_json(report)
    } else {
        println!("{}", render::render_backup(report));
        Ok(())
    }
}
