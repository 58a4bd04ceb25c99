use std::path::PathBuf;

use crate::merge::TieBreakPolicy;

use super::{Config, ConfigLayer};

pub fn merge_layers(user: Option<ConfigLayer>, repo: Option<ConfigLayer>) -> Config {
    let mut config = Config::default();
    if let Some(layer) = user {
        layer.apply_to(&mut config);
    }
    if let Some(layer) = repo {
        layer.apply_to(&mut config);
    }
    config
}

/// Apply `MEMSYNC_*` variables from the process environment.
pub fn apply_env_overrides(config: &mut Config) {
    apply_env_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`. Blank values are ignored, invalid
/// ones are logged and ignored.
pub fn apply_env_overrides_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(host) = var("MEMSYNC_HOST") {
        config.host = Some(host);
    }
    if let Some(remote) = var("MEMSYNC_REMOTE") {
        config.sync.remote = remote;
    }
    if let Some(branch) = var("MEMSYNC_BRANCH") {
        config.sync.branch = branch;
    }
    if let Some(file) = var("MEMSYNC_FILE") {
        config.sync.file = file;
    }
    if let Some(dir) = var("MEMSYNC_BACKUP_DIR") {
        config.backup.dir = Some(PathBuf::from(dir));
    }
    if let Some(raw) = var("MEMSYNC_TIE_BREAK") {
        match raw.parse::<TieBreakPolicy>() {
            Ok(policy) => config.merge.tie_break = policy,
            Err(err) => tracing::warn!("invalid MEMSYNC_TIE_BREAK, ignoring: {err}"),
        }
    }
    if let Some(filter) = var("MEMSYNC_LOG") {
        config.logging.filter = Some(filter);
    }
}
