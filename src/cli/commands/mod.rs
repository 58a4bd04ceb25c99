use clap::Subcommand;

use super::Ctx;
use crate::Result;

pub(super) mod backup;
pub(super) mod id;
pub(super) mod merge;
pub(super) mod validate;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up, merge with the remote branch, and publish the memory file.
    #[command(alias = "sync")]
    Backup(backup::BackupArgs),

    /// Merge two store files offline.
    Merge(merge::MergeArgs),

    /// Check every entry of a store file.
    #[command(alias = "check")]
    Validate(validate::ValidateArgs),

    /// Print the composite id for an entry.
    Id(id::IdArgs),
}

pub(super) fn dispatch(ctx: &Ctx, cmd: Commands) -> Result<i32> {
    match cmd {
        Commands::Backup(args) => backup::handle(ctx, args),
        Commands::Merge(args) => merge::handle(ctx, args),
        Commands::Validate(args) => validate::handle(ctx, args),
        Commands::Id(args) => id::handle(ctx, args),
    }
}
