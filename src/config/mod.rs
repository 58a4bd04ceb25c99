//! Config loading and persistence.

mod load;
mod merge;
mod schema;

pub use load::{
    ConfigError, config_path, discover_repo_root, load_for_repo, load_repo_config,
    load_user_config, repo_config_path, write_config,
};
pub use merge::{apply_env_overrides, apply_env_overrides_from, merge_layers};
pub use schema::{
    BackupConfig, Config, ConfigLayer, DEFAULT_MEMORY_FILE, DEFAULT_REMOTE, FileLoggingConfig,
    FileLoggingConfigOverride, LogFormat, LogRotation, LoggingConfig, LoggingConfigOverride,
    MergeConfig, MergeConfigOverride, SyncConfig, SyncConfigOverride, default_host,
};
